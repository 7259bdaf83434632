//! Bounded retries with exponential backoff.

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Retry settings for connection establishment.
///
/// A failed attempt `n` (zero-based) waits `initial_delay_ms * backoff_factor^n`
/// before attempt `n + 1`; at most `max_retries` extra attempts are made.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RetryPolicy {
	pub max_retries: u32,
	pub initial_delay_ms: u64,
	pub backoff_factor: f64,
}

impl Default for RetryPolicy {
	fn default() -> Self {
		Self {
			max_retries: 2,
			initial_delay_ms: 200,
			backoff_factor: 2.0,
		}
	}
}

impl RetryPolicy {
	/// A policy that tries exactly once.
	pub fn none() -> Self {
		Self {
			max_retries: 0,
			..Self::default()
		}
	}

	/// Delay before the retry that follows failed attempt `attempt`.
	pub fn delay_for(&self, attempt: u32) -> Duration {
		let factor = self.backoff_factor.powi(attempt as i32);
		let millis = self.initial_delay_ms as f64 * factor;
		if !millis.is_finite() || millis <= 0.0 {
			return Duration::ZERO;
		}
		Duration::from_millis(millis.min(u64::MAX as f64) as u64)
	}
}

/// Runs `attempt` until it succeeds or the policy is exhausted.
///
/// The final failure is returned unchanged.
pub async fn with_retry<T, E, F, Fut>(label: &'static str, policy: &RetryPolicy, mut attempt: F) -> Result<T, E>
where
	F: FnMut() -> Fut,
	Fut: Future<Output = Result<T, E>>,
	E: Display,
{
	let mut index = 0;
	loop {
		match attempt().await {
			Ok(value) => return Ok(value),
			Err(err) if index < policy.max_retries => {
				let delay = policy.delay_for(index);
				tracing::debug!(
					target = "codex_bridge.runtime",
					label,
					attempt = index + 1,
					max_retries = policy.max_retries,
					delay_ms = delay.as_millis() as u64,
					error = %err,
					"attempt failed; retrying"
				);
				tokio::time::sleep(delay).await;
				index += 1;
			}
			Err(err) => {
				tracing::warn!(target = "codex_bridge.runtime", label, attempts = index + 1, error = %err, "retries exhausted");
				return Err(err);
			}
		}
	}
}
