use std::collections::HashMap;

use rusqlite::{params, params_from_iter, OptionalExtension, Row};
use tokio_rusqlite::Connection;

use crate::error::Result;
use crate::models::{
    ActionKind, Activity, Content, ContentKind, FeedItem, FetchState, FetchStatePatch,
    FilterRule, NewFilterRule, RuleKind, SourceRef, TrackedUser,
};

use super::schema::SCHEMA;

const FETCH_STATE_KEY: &str = "state";

/// The keyed state store: tracked users, contents, activity edges, filter
/// rules, the ranked feed and the scheduler cursor. All writes are
/// idempotent upserts.
#[derive(Clone)]
pub struct Repository {
    conn: Connection,
}

impl Repository {
    pub async fn new(db_path: &str) -> Result<Self> {
        let conn = Connection::open(db_path).await?;

        conn.call(|conn| {
            conn.execute_batch(SCHEMA)?;
            Ok(())
        })
        .await?;

        Ok(Self { conn })
    }

    // User operations

    /// Bulk upsert of the tracked-user set. Existing users keep their
    /// `last_fetched_at`; a re-sync must not reset fetch fairness.
    pub async fn upsert_users(&self, users: Vec<TrackedUser>) -> Result<()> {
        self.conn
            .call(move |conn| {
                let mut stmt = conn.prepare(
                    r#"INSERT INTO users (id, handle, name, headline, avatar_url)
                       VALUES (?1, ?2, ?3, ?4, ?5)
                       ON CONFLICT(id) DO UPDATE SET
                           handle = excluded.handle,
                           name = excluded.name,
                           headline = excluded.headline,
                           avatar_url = excluded.avatar_url"#,
                )?;
                for user in &users {
                    stmt.execute(params![
                        user.id,
                        user.handle,
                        user.name,
                        user.headline,
                        user.avatar_url,
                    ])?;
                }
                Ok(())
            })
            .await?;
        Ok(())
    }

    /// Users due for fetching: never-fetched first, then least recently
    /// fetched, id as the deterministic tie-break.
    pub async fn users_due_for_fetch(&self, limit: u32, offset: u32) -> Result<Vec<TrackedUser>> {
        let users = self
            .conn
            .call(move |conn| {
                let mut stmt = conn.prepare(
                    r#"SELECT id, handle, name, headline, avatar_url, last_fetched_at
                       FROM users
                       ORDER BY last_fetched_at ASC NULLS FIRST, id ASC
                       LIMIT ?1 OFFSET ?2"#,
                )?;
                let users = stmt
                    .query_map(params![limit, offset], user_from_row)?
                    .collect::<std::result::Result<Vec<_>, _>>()?;
                Ok(users)
            })
            .await?;
        Ok(users)
    }

    pub async fn mark_user_fetched(&self, user_id: &str, fetched_at: i64) -> Result<()> {
        let user_id = user_id.to_string();
        self.conn
            .call(move |conn| {
                conn.execute(
                    "UPDATE users SET last_fetched_at = ?1 WHERE id = ?2",
                    params![fetched_at, user_id],
                )?;
                Ok(())
            })
            .await?;
        Ok(())
    }

    pub async fn user_count(&self) -> Result<u32> {
        let count = self
            .conn
            .call(|conn| {
                let count: u32 =
                    conn.query_row("SELECT COUNT(*) FROM users", [], |row| row.get(0))?;
                Ok(count)
            })
            .await?;
        Ok(count)
    }

    // Content operations

    /// Bulk upsert of observed contents. Engagement counters and text are
    /// last-write-wins; identity, kind, author and `created_time` stay as
    /// first observed.
    pub async fn upsert_contents(&self, contents: Vec<Content>) -> Result<()> {
        self.conn
            .call(move |conn| {
                let mut stmt = conn.prepare(
                    r#"INSERT INTO contents
                       (id, kind, title, excerpt, body, url, author_id, author_name,
                        word_count, voteup_count, comment_count, created_time, updated_time)
                       VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)
                       ON CONFLICT(id) DO UPDATE SET
                           title = excluded.title,
                           excerpt = excluded.excerpt,
                           body = excluded.body,
                           word_count = excluded.word_count,
                           voteup_count = excluded.voteup_count,
                           comment_count = excluded.comment_count,
                           updated_time = excluded.updated_time,
                           fetched_at = unixepoch()"#,
                )?;
                for content in &contents {
                    stmt.execute(params![
                        content.id,
                        content.kind.as_str(),
                        content.title,
                        content.excerpt,
                        content.body,
                        content.url,
                        content.author_id,
                        content.author_name,
                        content.word_count,
                        content.voteup_count,
                        content.comment_count,
                        content.created_time,
                        content.updated_time,
                    ])?;
                }
                Ok(())
            })
            .await?;
        Ok(())
    }

    pub async fn content_count(&self) -> Result<u32> {
        let count = self
            .conn
            .call(|conn| {
                let count: u32 =
                    conn.query_row("SELECT COUNT(*) FROM contents", [], |row| row.get(0))?;
                Ok(count)
            })
            .await?;
        Ok(count)
    }

    // Activity operations

    /// Upsert one create/like edge; re-observation refreshes the action
    /// time only.
    pub async fn upsert_activity(&self, activity: Activity) -> Result<()> {
        self.conn
            .call(move |conn| {
                conn.execute(
                    r#"INSERT INTO activities (user_id, content_id, action_kind, action_time)
                       VALUES (?1, ?2, ?3, ?4)
                       ON CONFLICT(user_id, content_id, action_kind) DO UPDATE SET
                           action_time = excluded.action_time"#,
                    params![
                        activity.user_id,
                        activity.content_id,
                        activity.action_kind.as_str(),
                        activity.action_time
                    ],
                )?;
                Ok(())
            })
            .await?;
        Ok(())
    }

    /// All recorded producers per content id, across every tracked user
    /// that created or liked the item.
    pub async fn sources_for(
        &self,
        content_ids: Vec<String>,
    ) -> Result<HashMap<String, Vec<SourceRef>>> {
        if content_ids.is_empty() {
            return Ok(HashMap::new());
        }

        let map = self
            .conn
            .call(move |conn| {
                let placeholders = content_ids
                    .iter()
                    .map(|_| "?")
                    .collect::<Vec<_>>()
                    .join(",");
                let sql = format!(
                    r#"SELECT a.content_id, u.name, a.action_kind
                       FROM activities a
                       JOIN users u ON a.user_id = u.id
                       WHERE a.content_id IN ({placeholders})"#
                );
                let mut stmt = conn.prepare(&sql)?;
                let rows = stmt.query_map(params_from_iter(content_ids.iter()), |row| {
                    let content_id: String = row.get(0)?;
                    let user_name: String = row.get(1)?;
                    let action_kind: String = row.get(2)?;
                    Ok((content_id, user_name, action_kind))
                })?;

                // Edges with an unrecognized action kind are skipped rather
                // than failing the lookup.
                let mut map: HashMap<String, Vec<SourceRef>> = HashMap::new();
                for row in rows {
                    let (content_id, user_name, action_kind) = row?;
                    if let Some(action_kind) = ActionKind::parse(&action_kind) {
                        map.entry(content_id).or_default().push(SourceRef {
                            user_name,
                            action_kind,
                        });
                    }
                }
                Ok(map)
            })
            .await?;
        Ok(map)
    }

    // Filter rule operations

    pub async fn enabled_filter_rules(&self) -> Result<Vec<FilterRule>> {
        let rules = self
            .conn
            .call(|conn| {
                let mut stmt = conn.prepare(
                    "SELECT id, kind, value, enabled FROM filter_rules WHERE enabled = 1",
                )?;
                let rows = stmt.query_map([], |row| {
                    let id: i64 = row.get(0)?;
                    let kind: String = row.get(1)?;
                    let value: String = row.get(2)?;
                    let enabled: bool = row.get(3)?;
                    Ok((id, kind, value, enabled))
                })?;

                let mut rules = Vec::new();
                for row in rows {
                    let (id, kind, value, enabled) = row?;
                    if let Some(kind) = RuleKind::parse(&kind) {
                        rules.push(FilterRule {
                            id,
                            kind,
                            value,
                            enabled,
                        });
                    }
                }
                Ok(rules)
            })
            .await?;
        Ok(rules)
    }

    pub async fn add_filter_rule(&self, rule: NewFilterRule) -> Result<()> {
        self.conn
            .call(move |conn| {
                conn.execute(
                    "INSERT INTO filter_rules (kind, value, enabled) VALUES (?1, ?2, ?3)",
                    params![rule.kind.as_str(), rule.value, rule.enabled],
                )?;
                Ok(())
            })
            .await?;
        Ok(())
    }

    // Feed operations

    /// Upsert the ranked feed row for one content item. Exactly one row per
    /// content id; reprocessing overwrites in place.
    pub async fn upsert_feed_item(
        &self,
        content_id: &str,
        score: f64,
        is_filtered: bool,
        filter_reason: Option<String>,
    ) -> Result<()> {
        let content_id = content_id.to_string();
        self.conn
            .call(move |conn| {
                conn.execute(
                    r#"INSERT INTO feed_items (content_id, score, is_filtered, filter_reason)
                       VALUES (?1, ?2, ?3, ?4)
                       ON CONFLICT(content_id) DO UPDATE SET
                           score = excluded.score,
                           is_filtered = excluded.is_filtered,
                           filter_reason = excluded.filter_reason"#,
                    params![content_id, score, is_filtered, filter_reason],
                )?;
                Ok(())
            })
            .await?;
        Ok(())
    }

    pub async fn feed_items(&self, limit: u32, include_filtered: bool) -> Result<Vec<FeedItem>> {
        let items = self
            .conn
            .call(move |conn| {
                let where_clause = if include_filtered {
                    ""
                } else {
                    "WHERE is_filtered = 0"
                };
                let sql = format!(
                    r#"SELECT content_id, score, is_filtered, filter_reason, added_at
                       FROM feed_items
                       {where_clause}
                       ORDER BY score DESC, added_at DESC
                       LIMIT ?1"#
                );
                let mut stmt = conn.prepare(&sql)?;
                let items = stmt
                    .query_map(params![limit], feed_item_from_row)?
                    .collect::<std::result::Result<Vec<_>, _>>()?;
                Ok(items)
            })
            .await?;
        Ok(items)
    }

    /// Feed rows joined with their content, ranked for display.
    pub async fn ranked_feed(
        &self,
        limit: u32,
        include_filtered: bool,
    ) -> Result<Vec<(FeedItem, Content)>> {
        let items = self
            .conn
            .call(move |conn| {
                let where_clause = if include_filtered {
                    ""
                } else {
                    "WHERE f.is_filtered = 0"
                };
                let sql = format!(
                    r#"SELECT f.content_id, f.score, f.is_filtered, f.filter_reason, f.added_at,
                              c.id, c.kind, c.title, c.excerpt, c.body, c.url,
                              c.author_id, c.author_name, c.word_count,
                              c.voteup_count, c.comment_count, c.created_time, c.updated_time
                       FROM feed_items f
                       JOIN contents c ON f.content_id = c.id
                       {where_clause}
                       ORDER BY f.score DESC, f.added_at DESC
                       LIMIT ?1"#
                );
                let mut stmt = conn.prepare(&sql)?;
                let items = stmt
                    .query_map(params![limit], |row| {
                        Ok((feed_item_from_row(row)?, content_from_row(row, 5)?))
                    })?
                    .collect::<std::result::Result<Vec<_>, _>>()?;
                Ok(items)
            })
            .await?;
        Ok(items)
    }

    pub async fn feed_count(&self) -> Result<u32> {
        let count = self
            .conn
            .call(|conn| {
                let count: u32 = conn.query_row(
                    "SELECT COUNT(*) FROM feed_items WHERE is_filtered = 0",
                    [],
                    |row| row.get(0),
                )?;
                Ok(count)
            })
            .await?;
        Ok(count)
    }

    // Fetch state operations

    pub async fn read_fetch_state(&self) -> Result<FetchState> {
        let blob = self
            .conn
            .call(|conn| {
                let blob: Option<String> = conn
                    .query_row(
                        "SELECT value FROM fetch_state WHERE key = ?1",
                        params![FETCH_STATE_KEY],
                        |row| row.get(0),
                    )
                    .optional()?;
                Ok(blob)
            })
            .await?;

        match blob {
            Some(blob) => Ok(serde_json::from_str(&blob)?),
            None => Ok(FetchState::default()),
        }
    }

    /// Merge-patch write of the scheduler cursor: fields absent from the
    /// patch keep their stored value.
    pub async fn write_fetch_state(&self, patch: FetchStatePatch) -> Result<()> {
        let mut state = self.read_fetch_state().await?;
        state.apply(patch);
        let blob = serde_json::to_string(&state)?;

        self.conn
            .call(move |conn| {
                conn.execute(
                    r#"INSERT INTO fetch_state (key, value, updated_at)
                       VALUES (?1, ?2, unixepoch())
                       ON CONFLICT(key) DO UPDATE SET
                           value = excluded.value,
                           updated_at = excluded.updated_at"#,
                    params![FETCH_STATE_KEY, blob],
                )?;
                Ok(())
            })
            .await?;
        Ok(())
    }
}

fn user_from_row(row: &Row) -> rusqlite::Result<TrackedUser> {
    Ok(TrackedUser {
        id: row.get(0)?,
        handle: row.get(1)?,
        name: row.get(2)?,
        headline: row.get(3)?,
        avatar_url: row.get(4)?,
        last_fetched_at: row.get(5)?,
    })
}

fn feed_item_from_row(row: &Row) -> rusqlite::Result<FeedItem> {
    Ok(FeedItem {
        content_id: row.get(0)?,
        score: row.get(1)?,
        is_filtered: row.get::<_, i64>(2)? != 0,
        filter_reason: row.get(3)?,
        added_at: row.get(4)?,
    })
}

fn content_from_row(row: &Row, base: usize) -> rusqlite::Result<Content> {
    let kind: String = row.get(base + 1)?;
    let kind = ContentKind::parse(&kind).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            base + 1,
            rusqlite::types::Type::Text,
            format!("unknown content kind: {kind}").into(),
        )
    })?;
    Ok(Content {
        id: row.get(base)?,
        kind,
        title: row.get(base + 2)?,
        excerpt: row.get(base + 3)?,
        body: row.get(base + 4)?,
        url: row.get(base + 5)?,
        author_id: row.get(base + 6)?,
        author_name: row.get(base + 7)?,
        word_count: row.get(base + 8)?,
        voteup_count: row.get(base + 9)?,
        comment_count: row.get(base + 10)?,
        created_time: row.get(base + 11)?,
        updated_time: row.get(base + 12)?,
    })
}
