//! In-memory native engine for exercising the bridge without the real engine.
//!
//! # Example
//!
//! ```ignore
//! let (engine, controller) = FakeEngineBuilder::new().build();
//! let client = Client::builder(engine).build()?;
//!
//! client.create_conversation(Vec::new()).await?;
//! controller.inject_event(json!({ "type": "agent_message", "message": "hi" }));
//! controller.end_stream();
//! ```

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use serde_json::{Value as JsonValue, json};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use super::{ConnectOptions, NativeConnection, NativeEngine, NativeError, NativeFuture, NativeSession};
use crate::config::ConfigOverride;

/// Native call kinds that can be delayed, stalled, failed, or counted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FakeCall {
	Connect,
	CreateSession,
	Submit,
	Poll,
	Close,
}

#[derive(Debug, Clone, Copy)]
enum Behavior {
	Delay(Duration),
	Hang,
}

enum Scripted {
	Line(String),
	End,
	Fail(NativeError),
}

struct Shared {
	inbound_rx: tokio::sync::Mutex<mpsc::UnboundedReceiver<Scripted>>,
	submitted: Mutex<Vec<String>>,
	overrides: Mutex<Vec<Vec<ConfigOverride>>>,
	connect_options: Mutex<Option<ConnectOptions>>,
	behaviors: Mutex<HashMap<FakeCall, Behavior>>,
	failures: Mutex<HashMap<FakeCall, NativeError>>,
	counts: Mutex<HashMap<FakeCall, u32>>,
	connect_failures: AtomicU32,
	session_seq: AtomicU32,
	model: String,
	emit_session_configured: bool,
}

impl Shared {
	fn record(&self, call: FakeCall) {
		*self.counts.lock().entry(call).or_default() += 1;
	}

	async fn stall(&self, call: FakeCall) {
		let behavior = self.behaviors.lock().get(&call).copied();
		match behavior {
			Some(Behavior::Delay(delay)) => tokio::time::sleep(delay).await,
			Some(Behavior::Hang) => std::future::pending::<()>().await,
			None => {}
		}
	}

	fn failure(&self, call: FakeCall) -> Option<NativeError> {
		self.failures.lock().get(&call).cloned()
	}
}

/// Builder for fake engine instances.
pub struct FakeEngineBuilder {
	connect_failures: u32,
	model: String,
	emit_session_configured: bool,
}

impl FakeEngineBuilder {
	pub fn new() -> Self {
		Self {
			connect_failures: 0,
			model: "gpt-5-codex".to_string(),
			emit_session_configured: true,
		}
	}

	/// Makes the first `attempts` connection attempts fail.
	pub fn fail_connects(mut self, attempts: u32) -> Self {
		self.connect_failures = attempts;
		self
	}

	/// Model reported in the synthesized `session_configured` event.
	pub fn model(mut self, model: impl Into<String>) -> Self {
		self.model = model.into();
		self
	}

	/// Skips the `session_configured` event new sessions normally yield first.
	pub fn without_session_configured(mut self) -> Self {
		self.emit_session_configured = false;
		self
	}

	/// Builds the engine and a controller for scripting it.
	pub fn build(self) -> (Arc<FakeEngine>, FakeEngineController) {
		let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
		let shared = Arc::new(Shared {
			inbound_rx: tokio::sync::Mutex::new(inbound_rx),
			submitted: Mutex::new(Vec::new()),
			overrides: Mutex::new(Vec::new()),
			connect_options: Mutex::new(None),
			behaviors: Mutex::new(HashMap::new()),
			failures: Mutex::new(HashMap::new()),
			counts: Mutex::new(HashMap::new()),
			connect_failures: AtomicU32::new(self.connect_failures),
			session_seq: AtomicU32::new(0),
			model: self.model,
			emit_session_configured: self.emit_session_configured,
		});

		let engine = Arc::new(FakeEngine {
			shared: Arc::clone(&shared),
		});
		let controller = FakeEngineController { inbound_tx, shared };
		(engine, controller)
	}
}

impl Default for FakeEngineBuilder {
	fn default() -> Self {
		Self::new()
	}
}

/// Controller for injecting events and failures and inspecting native calls.
pub struct FakeEngineController {
	inbound_tx: mpsc::UnboundedSender<Scripted>,
	shared: Arc<Shared>,
}

impl FakeEngineController {
	/// Queues an event message (`{"type": ..}`) with an empty envelope id.
	pub fn inject_event(&self, msg: JsonValue) {
		self.inject_event_with_id("", msg);
	}

	pub fn inject_event_with_id(&self, id: &str, msg: JsonValue) {
		self.inject_raw(json!({ "id": id, "msg": msg }).to_string());
	}

	/// Queues a raw payload line exactly as the engine would yield it.
	pub fn inject_raw(&self, line: impl Into<String>) {
		let _ = self.inbound_tx.send(Scripted::Line(line.into()));
	}

	/// Queues engine end-of-stream (`next_event` resolves to `None`).
	pub fn end_stream(&self) {
		let _ = self.inbound_tx.send(Scripted::End);
	}

	/// Queues a poll failure.
	pub fn fail_poll(&self, message: &str) {
		let _ = self.inbound_tx.send(Scripted::Fail(NativeError::new(message)));
	}

	/// Makes every call of `call` wait `delay` before doing its work.
	pub fn set_delay(&self, call: FakeCall, delay: Duration) {
		self.shared.behaviors.lock().insert(call, Behavior::Delay(delay));
	}

	/// Makes every call of `call` block forever.
	pub fn hang(&self, call: FakeCall) {
		self.shared.behaviors.lock().insert(call, Behavior::Hang);
	}

	pub fn clear_behavior(&self, call: FakeCall) {
		self.shared.behaviors.lock().remove(&call);
	}

	/// Makes every call of `call` fail with `message` until cleared.
	pub fn fail_call(&self, call: FakeCall, message: &str) {
		self.shared.failures.lock().insert(call, NativeError::new(message));
	}

	pub fn clear_failure(&self, call: FakeCall) {
		self.shared.failures.lock().remove(&call);
	}

	/// How many times `call` has been invoked.
	pub fn calls(&self, call: FakeCall) -> u32 {
		self.shared.counts.lock().get(&call).copied().unwrap_or(0)
	}

	/// Submissions received so far, parsed back into JSON.
	pub fn submitted(&self) -> Vec<JsonValue> {
		self.shared
			.submitted
			.lock()
			.iter()
			.filter_map(|raw| serde_json::from_str(raw).ok())
			.collect()
	}

	/// Takes all received submissions, clearing the buffer.
	pub fn take_submitted(&self) -> Vec<JsonValue> {
		std::mem::take(&mut *self.shared.submitted.lock())
			.iter()
			.filter_map(|raw| serde_json::from_str(raw).ok())
			.collect()
	}

	/// Overrides passed to each `create_session`, in call order.
	pub fn session_overrides(&self) -> Vec<Vec<ConfigOverride>> {
		self.shared.overrides.lock().clone()
	}

	pub fn last_connect_options(&self) -> Option<ConnectOptions> {
		self.shared.connect_options.lock().clone()
	}
}

/// Fake [`NativeEngine`] driven by a [`FakeEngineController`].
pub struct FakeEngine {
	shared: Arc<Shared>,
}

impl NativeEngine for FakeEngine {
	fn connect(&self, options: ConnectOptions) -> NativeFuture<Arc<dyn NativeConnection>> {
		let shared = Arc::clone(&self.shared);
		Box::pin(async move {
			shared.record(FakeCall::Connect);
			*shared.connect_options.lock() = Some(options);
			shared.stall(FakeCall::Connect).await;

			if shared.connect_failures.fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1)).is_ok() {
				return Err(NativeError::new("failed to load native module"));
			}
			if let Some(err) = shared.failure(FakeCall::Connect) {
				return Err(err);
			}
			Ok(Arc::new(FakeConnection { shared }) as Arc<dyn NativeConnection>)
		})
	}

	fn version(&self) -> String {
		"0.0.0-fake".to_string()
	}
}

struct FakeConnection {
	shared: Arc<Shared>,
}

impl NativeConnection for FakeConnection {
	fn create_session(&self, overrides: Vec<ConfigOverride>) -> NativeFuture<Arc<dyn NativeSession>> {
		let shared = Arc::clone(&self.shared);
		Box::pin(async move {
			shared.record(FakeCall::CreateSession);
			shared.overrides.lock().push(overrides);
			shared.stall(FakeCall::CreateSession).await;
			if let Some(err) = shared.failure(FakeCall::CreateSession) {
				return Err(err);
			}

			let seq = shared.session_seq.fetch_add(1, Ordering::SeqCst) + 1;
			let conversation_id = format!("fake-conversation-{seq}");

			let mut pending = VecDeque::new();
			if shared.emit_session_configured {
				let configured = json!({
					"id": "",
					"msg": {
						"type": "session_configured",
						"session_id": conversation_id,
						"model": shared.model,
						"history_log_id": 0,
						"history_entry_count": 0
					}
				});
				pending.push_back(configured.to_string());
			}

			Ok(Arc::new(FakeSession {
				conversation_id,
				state: Arc::new(SessionState {
					pending: Mutex::new(pending),
					closed: CancellationToken::new(),
				}),
				shared,
			}) as Arc<dyn NativeSession>)
		})
	}
}

struct SessionState {
	pending: Mutex<VecDeque<String>>,
	closed: CancellationToken,
}

struct FakeSession {
	conversation_id: String,
	state: Arc<SessionState>,
	shared: Arc<Shared>,
}

impl NativeSession for FakeSession {
	fn conversation_id(&self) -> String {
		self.conversation_id.clone()
	}

	fn next_event(&self) -> NativeFuture<Option<String>> {
		let shared = Arc::clone(&self.shared);
		let state = Arc::clone(&self.state);
		Box::pin(async move {
			shared.record(FakeCall::Poll);
			shared.stall(FakeCall::Poll).await;

			if let Some(line) = state.pending.lock().pop_front() {
				return Ok(Some(line));
			}
			if state.closed.is_cancelled() {
				return Ok(None);
			}

			let mut inbound = shared.inbound_rx.lock().await;
			tokio::select! {
				_ = state.closed.cancelled() => Ok(None),
				scripted = inbound.recv() => match scripted {
					Some(Scripted::Line(line)) => Ok(Some(line)),
					Some(Scripted::Fail(err)) => Err(err),
					Some(Scripted::End) | None => Ok(None),
				},
			}
		})
	}

	fn submit(&self, submission_json: String) -> NativeFuture<()> {
		let shared = Arc::clone(&self.shared);
		Box::pin(async move {
			shared.record(FakeCall::Submit);
			shared.stall(FakeCall::Submit).await;
			if let Some(err) = shared.failure(FakeCall::Submit) {
				return Err(err);
			}
			shared.submitted.lock().push(submission_json);
			Ok(())
		})
	}

	fn close(&self) -> NativeFuture<()> {
		let shared = Arc::clone(&self.shared);
		let state = Arc::clone(&self.state);
		Box::pin(async move {
			shared.record(FakeCall::Close);
			shared.stall(FakeCall::Close).await;
			state.closed.cancel();
			match shared.failure(FakeCall::Close) {
				Some(err) => Err(err),
				None => Ok(()),
			}
		})
	}
}
