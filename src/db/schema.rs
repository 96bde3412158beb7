pub const SCHEMA: &str = r#"
-- tracked users (followees)
CREATE TABLE IF NOT EXISTS users (
    id TEXT PRIMARY KEY,
    handle TEXT NOT NULL,
    name TEXT NOT NULL,
    headline TEXT,
    avatar_url TEXT,
    last_fetched_at INTEGER,
    created_at INTEGER NOT NULL DEFAULT (unixepoch())
);

CREATE INDEX IF NOT EXISTS idx_users_last_fetched_at ON users(last_fetched_at);

-- normalized content items
CREATE TABLE IF NOT EXISTS contents (
    id TEXT PRIMARY KEY,
    kind TEXT NOT NULL,
    title TEXT NOT NULL,
    excerpt TEXT NOT NULL DEFAULT '',
    body TEXT NOT NULL DEFAULT '',
    url TEXT NOT NULL,
    author_id TEXT NOT NULL,
    author_name TEXT NOT NULL,
    word_count INTEGER NOT NULL DEFAULT 0,
    voteup_count INTEGER NOT NULL DEFAULT 0,
    comment_count INTEGER NOT NULL DEFAULT 0,
    created_time INTEGER NOT NULL,
    updated_time INTEGER NOT NULL,
    fetched_at INTEGER NOT NULL DEFAULT (unixepoch())
);

CREATE INDEX IF NOT EXISTS idx_contents_author_id ON contents(author_id);

-- create/like edges between users and contents
CREATE TABLE IF NOT EXISTS activities (
    user_id TEXT NOT NULL REFERENCES users(id),
    content_id TEXT NOT NULL REFERENCES contents(id),
    action_kind TEXT NOT NULL,
    action_time INTEGER NOT NULL,
    UNIQUE(user_id, content_id, action_kind)
);

CREATE INDEX IF NOT EXISTS idx_activities_content_id ON activities(content_id);

-- ranked feed, one row per content item
CREATE TABLE IF NOT EXISTS feed_items (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    content_id TEXT NOT NULL UNIQUE REFERENCES contents(id),
    score REAL NOT NULL,
    is_filtered INTEGER NOT NULL DEFAULT 0,
    filter_reason TEXT,
    added_at INTEGER NOT NULL DEFAULT (unixepoch())
);

CREATE INDEX IF NOT EXISTS idx_feed_items_score ON feed_items(score DESC);

-- content filtering rules
CREATE TABLE IF NOT EXISTS filter_rules (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    kind TEXT NOT NULL,
    value TEXT NOT NULL,
    enabled INTEGER NOT NULL DEFAULT 1
);

-- scheduler cursor, single JSON blob under a fixed key
CREATE TABLE IF NOT EXISTS fetch_state (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL,
    updated_at INTEGER NOT NULL DEFAULT (unixepoch())
);
"#;
