mod zhihu;

pub use zhihu::ZhihuSource;

use async_trait::async_trait;

use crate::error::Result;
use crate::models::{ActionKind, Content, TrackedUser};

/// One page of a followee listing.
#[derive(Debug, Clone)]
pub struct FolloweePage {
    pub users: Vec<TrackedUser>,
    pub is_end: bool,
}

/// One observed create/like action together with its normalized content.
#[derive(Debug, Clone)]
pub struct ActivityRecord {
    pub content: Content,
    pub action_kind: ActionKind,
    /// Epoch seconds.
    pub action_time: i64,
}

/// The upstream content platform: paginated followee listing and recent
/// per-user activity. Implementations map credential rejections to
/// [`AppError::Auth`](crate::error::AppError::Auth) and transient failures
/// to [`AppError::Upstream`](crate::error::AppError::Upstream).
#[async_trait]
pub trait ContentSource: Send + Sync {
    async fn followees(&self, root_handle: &str, offset: u32, limit: u32)
        -> Result<FolloweePage>;

    async fn recent_activity(&self, handle: &str, limit: u32) -> Result<Vec<ActivityRecord>>;
}
