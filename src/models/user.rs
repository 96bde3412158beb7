use serde::{Deserialize, Serialize};

/// A followed content producer whose activity is ingested into the feed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackedUser {
    pub id: String,
    /// Stable URL handle at the content source.
    pub handle: String,
    pub name: String,
    pub headline: Option<String>,
    pub avatar_url: Option<String>,
    /// Epoch seconds of the last successful activity fetch. Never-fetched
    /// users sort first in the due ordering.
    pub last_fetched_at: Option<i64>,
}
