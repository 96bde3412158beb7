use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentKind {
    Article,
    Answer,
    Shortform,
}

impl ContentKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContentKind::Article => "article",
            ContentKind::Answer => "answer",
            ContentKind::Shortform => "shortform",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "article" => Some(ContentKind::Article),
            "answer" => Some(ContentKind::Answer),
            "shortform" => Some(ContentKind::Shortform),
            _ => None,
        }
    }
}

/// Normalized content item observed at the content source.
///
/// Engagement counters are last-write-wins on re-observation; identity and
/// `created_time` are immutable once stored.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Content {
    pub id: String,
    pub kind: ContentKind,
    pub title: String,
    pub excerpt: String,
    pub body: String,
    pub url: String,
    pub author_id: String,
    pub author_name: String,
    pub word_count: u32,
    pub voteup_count: u32,
    pub comment_count: u32,
    /// Epoch seconds.
    pub created_time: i64,
    pub updated_time: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    Create,
    Like,
}

impl ActionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionKind::Create => "create",
            ActionKind::Like => "like",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "create" => Some(ActionKind::Create),
            "like" => Some(ActionKind::Like),
            _ => None,
        }
    }
}

/// Edge recording that a tracked user created or liked a piece of content.
/// Unique per `(user_id, content_id, action_kind)`; re-observation only
/// refreshes `action_time`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Activity {
    pub user_id: String,
    pub content_id: String,
    pub action_kind: ActionKind,
    pub action_time: i64,
}

/// One recorded producer of a piece of content, as used for scoring.
#[derive(Debug, Clone)]
pub struct SourceRef {
    pub user_name: String,
    pub action_kind: ActionKind,
}
