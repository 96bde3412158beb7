use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleKind {
    KeywordBlacklist,
    MinWordCount,
    ContentTypeAllow,
    AuthorBlacklist,
}

impl RuleKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            RuleKind::KeywordBlacklist => "keyword_blacklist",
            RuleKind::MinWordCount => "min_word_count",
            RuleKind::ContentTypeAllow => "content_type_allow",
            RuleKind::AuthorBlacklist => "author_blacklist",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "keyword_blacklist" => Some(RuleKind::KeywordBlacklist),
            "min_word_count" => Some(RuleKind::MinWordCount),
            "content_type_allow" => Some(RuleKind::ContentTypeAllow),
            "author_blacklist" => Some(RuleKind::AuthorBlacklist),
            _ => None,
        }
    }
}

/// Stored filtering rule. `value` grammar depends on `kind`: a
/// comma-separated list for the blacklists and the type allow-list, a
/// numeric threshold for `min_word_count`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FilterRule {
    pub id: i64,
    pub kind: RuleKind,
    pub value: String,
    pub enabled: bool,
}

#[derive(Debug, Clone)]
pub struct NewFilterRule {
    pub kind: RuleKind,
    pub value: String,
    pub enabled: bool,
}

/// Ranked feed row, exactly one per content id. Reprocessing overwrites
/// score and filter state in place.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedItem {
    pub content_id: String,
    pub score: f64,
    pub is_filtered: bool,
    pub filter_reason: Option<String>,
    pub added_at: i64,
}
