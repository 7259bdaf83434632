//! Plugin pipeline behavior through a live client.

mod common;

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use codex_bridge::native::fake::{FakeCall, FakeEngineBuilder};
use codex_bridge::protocol::{EventEnvelope, Submission};
use codex_bridge::{BridgeConfig, CLOSE_GRACE_PERIOD, Client, Error, Plugin, PluginContext};
use common::in_conversation;
use serde_json::json;
use tokio::sync::mpsc;
use tokio::time::Instant;

/// Reports every hook invocation on a channel.
struct Recorder {
	seen: mpsc::UnboundedSender<String>,
	initialized: AtomicU32,
}

impl Recorder {
	fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<String>) {
		let (seen, rx) = mpsc::unbounded_channel();
		let recorder = Arc::new(Self {
			seen,
			initialized: AtomicU32::new(0),
		});
		(recorder, rx)
	}
}

#[async_trait]
impl Plugin for Recorder {
	fn name(&self) -> &str {
		"recorder"
	}

	async fn initialize(&self, ctx: &PluginContext) -> anyhow::Result<()> {
		self.initialized.fetch_add(1, Ordering::SeqCst);
		let _ = self.seen.send(format!("init:{}", ctx.native_version));
		Ok(())
	}

	async fn after_event(&self, event: &EventEnvelope) -> anyhow::Result<()> {
		let _ = self.seen.send(format!("event:{}", event.kind()));
		Ok(())
	}

	async fn on_error(&self, error: &Error) -> anyhow::Result<()> {
		let _ = self.seen.send(format!("error:{error}"));
		Ok(())
	}
}

struct Tagger(&'static str);

#[async_trait]
impl Plugin for Tagger {
	fn name(&self) -> &str {
		"tagger"
	}

	async fn before_submit(&self, mut submission: Submission) -> anyhow::Result<Submission> {
		submission.id.push_str(self.0);
		Ok(submission)
	}
}

/// Fails or panics in every hook.
struct Broken {
	panics: bool,
}

#[async_trait]
impl Plugin for Broken {
	fn name(&self) -> &str {
		"broken"
	}

	async fn initialize(&self, _ctx: &PluginContext) -> anyhow::Result<()> {
		anyhow::bail!("missing credentials")
	}

	async fn before_submit(&self, _submission: Submission) -> anyhow::Result<Submission> {
		if self.panics {
			panic!("before_submit blew up");
		}
		anyhow::bail!("refusing submission")
	}

	async fn after_event(&self, _event: &EventEnvelope) -> anyhow::Result<()> {
		anyhow::bail!("cannot observe")
	}

	async fn on_error(&self, _error: &Error) -> anyhow::Result<()> {
		anyhow::bail!("cannot handle")
	}
}

#[tokio::test]
async fn failing_before_submit_keeps_prior_envelope() {
	let (engine, controller) = FakeEngineBuilder::new().build();
	let client = Client::builder(engine)
		.plugin(Arc::new(Broken { panics: false }))
		.plugin(Arc::new(Tagger("-a")))
		.plugin(Arc::new(Broken { panics: true }))
		.plugin(Arc::new(Tagger("-b")))
		.build()
		.unwrap();
	client.connect().await.unwrap();
	client.create_conversation(Vec::new()).await.unwrap();

	let id = client.submit_text("hi", &[]).await.unwrap();

	assert!(id.ends_with("-a-b"));
	let sent = controller.submitted();
	assert_eq!(sent.len(), 1);
	assert_eq!(sent[0]["id"], json!(id));
	assert_eq!(sent[0]["op"]["items"][0]["text"], "hi");
}

#[tokio::test]
async fn plugins_initialize_on_connect_despite_failures() {
	let (engine, _controller) = FakeEngineBuilder::new().build();
	let (recorder, mut seen) = Recorder::new();
	let client = Client::builder(engine)
		.plugin(Arc::new(Broken { panics: false }))
		.plugin(recorder.clone())
		.build()
		.unwrap();
	assert_eq!(recorder.initialized.load(Ordering::SeqCst), 0);

	client.connect().await.unwrap();
	client.connect().await.unwrap();

	assert!(client.is_connected());
	assert_eq!(recorder.initialized.load(Ordering::SeqCst), 1);
	assert_eq!(seen.recv().await.unwrap(), "init:0.0.0-fake");
}

#[tokio::test]
async fn late_registration_initializes_immediately() {
	let (engine, _controller) = FakeEngineBuilder::new().build();
	let client = Client::builder(engine).build().unwrap();

	let (early, _early_seen) = Recorder::new();
	client.register_plugin(early.clone()).await;
	assert_eq!(early.initialized.load(Ordering::SeqCst), 0);

	client.connect().await.unwrap();
	assert_eq!(early.initialized.load(Ordering::SeqCst), 1);

	let (late, _late_seen) = Recorder::new();
	client.register_plugin(late.clone()).await;
	assert_eq!(late.initialized.load(Ordering::SeqCst), 1);
	assert_eq!(early.initialized.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn after_event_runs_for_each_event_and_failures_do_not_block_delivery() {
	let (client, controller) = in_conversation().await;
	let (recorder, mut seen) = Recorder::new();
	client.register_plugin(Arc::new(Broken { panics: false })).await;
	client.register_plugin(recorder).await;
	assert_eq!(seen.recv().await.unwrap(), "init:0.0.0-fake");

	let mut events = client.subscribe(None);
	controller.inject_event(json!({ "type": "task_started" }));
	controller.inject_event(json!({ "type": "agent_message", "message": "ok" }));

	assert!(events.next().await.unwrap().is_ok());
	assert!(events.next().await.unwrap().is_ok());
	assert_eq!(seen.recv().await.unwrap(), "event:task_started");
	assert_eq!(seen.recv().await.unwrap(), "event:agent_message");
}

#[tokio::test]
async fn loop_failure_runs_on_error_once() {
	let (client, controller) = in_conversation().await;
	let (recorder, mut seen) = Recorder::new();
	client.register_plugin(Arc::new(Broken { panics: false })).await;
	client.register_plugin(recorder).await;
	seen.recv().await.unwrap();

	controller.fail_poll("engine crashed");

	let reported = seen.recv().await.unwrap();
	assert!(reported.starts_with("error:"));
	assert!(reported.contains("engine crashed"));

	// The loop is gone: nothing else is polled or reported.
	controller.inject_event(json!({ "type": "agent_message", "message": "late" }));
	tokio::task::yield_now().await;
	assert!(seen.try_recv().is_err());
	assert_eq!(controller.calls(FakeCall::Poll), 1);
}

#[tokio::test]
async fn unobserved_loop_failure_does_not_disturb_the_client() {
	let (client, controller) = in_conversation().await;
	controller.fail_poll("engine crashed");
	tokio::task::yield_now().await;

	client.interrupt().await.unwrap();
	client.close().await.unwrap();
	assert!(!client.has_active_session());
}

#[tokio::test(start_paused = true)]
async fn close_during_after_event_does_not_poll_again() {
	struct Slow(mpsc::UnboundedSender<()>);

	#[async_trait]
	impl Plugin for Slow {
		fn name(&self) -> &str {
			"slow"
		}

		async fn after_event(&self, _event: &EventEnvelope) -> anyhow::Result<()> {
			let _ = self.0.send(());
			tokio::time::sleep(Duration::from_millis(100)).await;
			Ok(())
		}
	}

	let (client, controller) = in_conversation().await;
	let (tx, mut entered) = mpsc::unbounded_channel();
	client.register_plugin(Arc::new(Slow(tx))).await;

	controller.inject_event(json!({ "type": "task_started" }));
	entered.recv().await.unwrap();

	// A further poll would never return.
	controller.hang(FakeCall::Poll);
	let polls = controller.calls(FakeCall::Poll);

	let started = Instant::now();
	client.close().await.unwrap();

	assert!(started.elapsed() < CLOSE_GRACE_PERIOD);
	assert_eq!(controller.calls(FakeCall::Poll), polls);
	assert!(!client.has_active_session());
}

#[tokio::test]
async fn plugin_context_carries_config() {
	struct ModelCheck(mpsc::UnboundedSender<Option<String>>);

	#[async_trait]
	impl Plugin for ModelCheck {
		fn name(&self) -> &str {
			"model-check"
		}

		async fn initialize(&self, ctx: &PluginContext) -> anyhow::Result<()> {
			let _ = self.0.send(ctx.config.default_model.clone());
			Ok(())
		}
	}

	let (tx, mut rx) = mpsc::unbounded_channel();
	let (engine, _controller) = FakeEngineBuilder::new().build();
	let client = Client::builder(engine)
		.config(BridgeConfig {
			default_model: Some("o3".into()),
			..BridgeConfig::default()
		})
		.plugin(Arc::new(ModelCheck(tx)))
		.build()
		.unwrap();
	client.connect().await.unwrap();

	assert_eq!(rx.recv().await.unwrap().as_deref(), Some("o3"));
}
