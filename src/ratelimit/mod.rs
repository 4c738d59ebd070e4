//! Rate limiting logic and state management.

mod actor;
mod backend;
mod key;
mod limiter;
mod quota;
mod rate;
mod registry;
pub mod window;

pub use actor::{ActorContext, Decision, HydrationPolicy, LimiterActor};
pub use backend::LimiterBackend;
pub use key::LimiterKey;
pub use limiter::Limiter;
pub use quota::{QuotaLimiterActor, QuotaParams, QuotaState};
pub use rate::{RateLimiterActor, RateParams, RateState, DEFAULT_RATE_MS};
pub use registry::{ActorHandle, ActorRegistry};
pub use window::{IntervalUnit, WindowSpec};
