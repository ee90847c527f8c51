//! Delivery core: admission, resolution, dispatch and the run loop.

pub mod clock;
pub mod dispatcher;
pub mod orchestrator;
pub mod outcome;
pub mod rate_limit;
pub mod resolver;
pub mod state;

pub use clock::{CancelSignal, Clock, MonotonicClock, SystemClock};
pub use dispatcher::{MessageDispatcher, Sent};
pub use orchestrator::{DeliveryOrchestrator, RunFailure};
pub use outcome::{DeliveryOutcome, OutcomeKind};
pub use rate_limit::{Admission, DenyReason, RateLimiter, WindowUsage};
pub use resolver::{ContactResolver, MatchStrategy, ResolvedHandle};
pub use state::{RecordProgress, RecordState, StateTransition};
