mod content;
mod rule;
mod state;
mod user;

pub use content::{ActionKind, Activity, Content, ContentKind, SourceRef};
pub use rule::{FeedItem, FilterRule, NewFilterRule, RuleKind};
pub use state::{FetchState, FetchStatePatch};
pub use user::TrackedUser;
