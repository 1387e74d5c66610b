//! Rate limiting logic and state management.

mod key;
mod limiter;
mod set;
mod sweeper;
mod window;

pub use key::{HeaderSource, KeyExtractor};
pub use limiter::{Decision, QuotaExceeded, RateLimiter};
pub use set::LimiterSet;
pub use sweeper::Sweeper;
pub use window::SlidingWindow;
