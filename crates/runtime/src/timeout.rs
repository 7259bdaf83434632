//! Deadline races for native calls that cannot be cancelled.
//!
//! The raced future is spawned onto the runtime rather than polled in place,
//! so an expired deadline only stops the caller from waiting. The native call
//! keeps running detached and its late result is dropped with the task.

use std::future::Future;
use std::time::Duration;

use thiserror::Error;
use tokio::task::JoinError;

/// A timeout-wrapped call exceeded its budget.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{label} timed out after {}ms", budget.as_millis())]
pub struct TimeoutError {
	/// What was being waited on (e.g. "poll next event").
	pub label: &'static str,
	pub budget: Duration,
}

/// Converts a configured millisecond budget; `None` and `0` mean "no deadline".
pub fn budget_from_millis(timeout_ms: Option<u64>) -> Option<Duration> {
	timeout_ms.filter(|ms| *ms > 0).map(Duration::from_millis)
}

/// Awaits `operation`, giving up after `budget` if one is set.
///
/// Without a budget the operation is awaited directly, with no task spawn and
/// no timer. With a budget the operation runs as its own task; on expiry a
/// [`TimeoutError`] is returned and the task is left to finish on its own.
/// A panic inside the operation is resumed on the caller.
pub async fn with_timeout<F>(label: &'static str, budget: Option<Duration>, operation: F) -> Result<F::Output, TimeoutError>
where
	F: Future + Send + 'static,
	F::Output: Send + 'static,
{
	let Some(budget) = budget.filter(|budget| !budget.is_zero()) else {
		return Ok(operation.await);
	};

	let task = tokio::spawn(operation);
	match tokio::time::timeout(budget, task).await {
		Ok(joined) => match settle(joined) {
			Some(value) => Ok(value),
			None => {
				// Only runtime shutdown cancels the task; the caller is torn down with it.
				tracing::debug!(target = "codex_bridge.runtime", label, "timed call cancelled by runtime shutdown");
				std::future::pending().await
			}
		},
		Err(_) => {
			tracing::debug!(target = "codex_bridge.runtime", label, budget_ms = budget.as_millis() as u64, "deadline elapsed; detaching call");
			Err(TimeoutError { label, budget })
		}
	}
}

/// Resumes a panic from the joined task; `None` means the task was cancelled.
fn settle<T>(joined: Result<T, JoinError>) -> Option<T> {
	match joined {
		Ok(value) => Some(value),
		Err(err) if err.is_panic() => std::panic::resume_unwind(err.into_panic()),
		Err(_) => None,
	}
}
