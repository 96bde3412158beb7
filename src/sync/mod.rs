mod scheduler;
mod throttle;

pub use scheduler::{BatchOutcome, FetchScheduler, SyncOutcome};
pub use throttle::{FixedDelay, NoThrottle, Throttle};
