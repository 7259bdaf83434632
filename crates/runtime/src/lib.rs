//! Concurrency primitives shared by the session bridge.
//!
//! Nothing here knows about the conversation protocol:
//! * [`queue`]: push-to-pull buffer with sticky terminal states
//! * [`timeout`]: deadline races that leave the raced call running
//! * [`retry`]: bounded retries with exponential backoff

pub mod queue;
pub mod retry;
pub mod timeout;

pub use queue::TerminatingQueue;
pub use retry::{RetryPolicy, with_retry};
pub use timeout::{TimeoutError, budget_from_millis, with_timeout};
