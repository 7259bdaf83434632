//! Plugin hooks around submissions, events, and loop failures.
//!
//! Every hook has a no-op default, so a plugin only pays for the extension
//! points it overrides. Hooks run in registration order. A hook that fails or
//! panics loses only its own effect: the failure is logged and the pipeline
//! carries on.

use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use async_trait::async_trait;
use codex_bridge_protocol::{EventEnvelope, Submission};
use futures_util::FutureExt;
use parking_lot::RwLock;
use tracing::{debug, warn};

use crate::config::BridgeConfig;
use crate::error::Error;

/// Context handed to [`Plugin::initialize`].
#[derive(Debug, Clone)]
pub struct PluginContext {
	pub config: BridgeConfig,
	/// Version string reported by the native engine.
	pub native_version: String,
}

#[async_trait]
pub trait Plugin: Send + Sync {
	/// Name used in diagnostics.
	fn name(&self) -> &str;

	/// Runs once after the connection is established, before conversations can be created.
	async fn initialize(&self, _ctx: &PluginContext) -> anyhow::Result<()> {
		Ok(())
	}

	/// Sees every outgoing submission; the returned envelope is passed to the next plugin.
	async fn before_submit(&self, submission: Submission) -> anyhow::Result<Submission> {
		Ok(submission)
	}

	/// Sees every incoming event after subscribers received it.
	async fn after_event(&self, _event: &EventEnvelope) -> anyhow::Result<()> {
		Ok(())
	}

	/// Runs once per fatal polling-loop error.
	async fn on_error(&self, _error: &Error) -> anyhow::Result<()> {
		Ok(())
	}
}

/// Ordered plugin list shared by a client.
#[derive(Default)]
pub(crate) struct PluginRegistry {
	plugins: RwLock<Vec<Arc<dyn Plugin>>>,
}

impl PluginRegistry {
	pub(crate) fn register(&self, plugin: Arc<dyn Plugin>) {
		debug!(target = "codex_bridge.plugin", plugin = plugin.name(), "registered plugin");
		self.plugins.write().push(plugin);
	}

	pub(crate) fn len(&self) -> usize {
		self.plugins.read().len()
	}

	// Hooks run against a snapshot so the lock is never held across an await.
	fn snapshot(&self) -> Vec<Arc<dyn Plugin>> {
		self.plugins.read().clone()
	}

	pub(crate) async fn initialize_all(&self, ctx: &PluginContext) {
		for plugin in self.snapshot() {
			initialize_one(plugin.as_ref(), ctx).await;
		}
	}

	pub(crate) async fn before_submit(&self, mut submission: Submission) -> Submission {
		for plugin in self.snapshot() {
			let carried = submission.clone();
			submission = run_hook(plugin.as_ref(), "before_submit", plugin.before_submit(submission))
				.await
				.unwrap_or(carried);
		}
		submission
	}

	pub(crate) async fn after_event(&self, event: &EventEnvelope) {
		for plugin in self.snapshot() {
			run_hook(plugin.as_ref(), "after_event", plugin.after_event(event)).await;
		}
	}

	pub(crate) async fn on_error(&self, error: &Error) {
		for plugin in self.snapshot() {
			run_hook(plugin.as_ref(), "on_error", plugin.on_error(error)).await;
		}
	}
}

pub(crate) async fn initialize_one(plugin: &dyn Plugin, ctx: &PluginContext) {
	if run_hook(plugin, "initialize", plugin.initialize(ctx)).await.is_some() {
		debug!(target = "codex_bridge.plugin", plugin = plugin.name(), "initialized plugin");
	}
}

async fn run_hook<T, F>(plugin: &dyn Plugin, hook: &'static str, call: F) -> Option<T>
where
	F: Future<Output = anyhow::Result<T>>,
{
	match AssertUnwindSafe(call).catch_unwind().await {
		Ok(Ok(value)) => Some(value),
		Ok(Err(err)) => {
			warn!(target = "codex_bridge.plugin", plugin = plugin.name(), hook, error = %format!("{err:#}"), "plugin hook failed");
			None
		}
		Err(payload) => {
			warn!(target = "codex_bridge.plugin", plugin = plugin.name(), hook, error = %panic_message(&*payload), "plugin hook panicked");
			None
		}
	}
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
	if let Some(message) = payload.downcast_ref::<&str>() {
		(*message).to_string()
	} else if let Some(message) = payload.downcast_ref::<String>() {
		message.clone()
	} else {
		"unknown panic".to_string()
	}
}

#[cfg(test)]
mod tests {
	use std::sync::atomic::{AtomicU32, Ordering};

	use codex_bridge_protocol::{InputItem, Op};

	use super::*;

	struct Tagger(&'static str);

	#[async_trait]
	impl Plugin for Tagger {
		fn name(&self) -> &str {
			self.0
		}

		async fn before_submit(&self, mut submission: Submission) -> anyhow::Result<Submission> {
			submission.id.push_str(self.0);
			Ok(submission)
		}
	}

	struct Failing;

	#[async_trait]
	impl Plugin for Failing {
		fn name(&self) -> &str {
			"failing"
		}

		async fn before_submit(&self, _submission: Submission) -> anyhow::Result<Submission> {
			anyhow::bail!("rejected")
		}

		async fn after_event(&self, _event: &EventEnvelope) -> anyhow::Result<()> {
			panic!("after_event exploded")
		}
	}

	#[derive(Default)]
	struct Counter {
		events: AtomicU32,
	}

	#[async_trait]
	impl Plugin for Counter {
		fn name(&self) -> &str {
			"counter"
		}

		async fn after_event(&self, _event: &EventEnvelope) -> anyhow::Result<()> {
			self.events.fetch_add(1, Ordering::SeqCst);
			Ok(())
		}
	}

	fn submission() -> Submission {
		Submission::new(
			"s",
			Op::UserInput {
				items: vec![InputItem::Text { text: "hi".into() }],
			},
		)
	}

	#[tokio::test]
	async fn transformations_compose_in_registration_order() {
		let registry = PluginRegistry::default();
		registry.register(Arc::new(Tagger("-a")));
		registry.register(Arc::new(Tagger("-b")));

		assert_eq!(registry.before_submit(submission()).await.id, "s-a-b");
	}

	#[tokio::test]
	async fn failing_hook_carries_previous_envelope_forward() {
		let registry = PluginRegistry::default();
		registry.register(Arc::new(Tagger("-a")));
		registry.register(Arc::new(Failing));
		registry.register(Arc::new(Tagger("-c")));

		assert_eq!(registry.before_submit(submission()).await.id, "s-a-c");
	}

	#[tokio::test]
	async fn panicking_hook_does_not_stop_later_plugins() {
		let registry = PluginRegistry::default();
		let counter = Arc::new(Counter::default());
		registry.register(Arc::new(Failing));
		registry.register(counter.clone());

		let event = EventEnvelope::parse(r#"{"id":"1","msg":{"type":"task_started"}}"#).unwrap();
		registry.after_event(&event).await;

		assert_eq!(counter.events.load(Ordering::SeqCst), 1);
		assert_eq!(registry.len(), 2);
	}
}
