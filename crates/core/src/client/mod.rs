//! The session engine: connection, conversation lifecycle, submissions, and subscriptions.
//!
//! A [`Client`] owns one native connection and at most one active session.
//! While a session is active a single polling loop drains its events into an
//! internal bus; every [`Client::subscribe`] call is an independent tap on
//! that bus.

mod poll_loop;

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use codex_bridge_protocol::{InputItem, Op, ReviewDecision, Submission};
use codex_bridge_runtime::{with_retry, with_timeout};
use parking_lot::Mutex;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::bus::{EventBus, EventStream};
use crate::config::{BridgeConfig, ConfigOverride, validate_overrides};
use crate::error::{Error, Result};
use crate::model::{DefaultModelResolver, ModelResolver, TurnOverrides};
use crate::native::{ConnectOptions, NativeConnection, NativeEngine, NativeSession};
use crate::plugin::{Plugin, PluginContext, PluginRegistry, initialize_one};
use crate::router::RoutedEvent;

/// How long `close` waits for an in-flight poll before abandoning the loop.
pub const CLOSE_GRACE_PERIOD: Duration = Duration::from_secs(2);

const ROUTED_CAPACITY: usize = 256;

/// Answer to an approval request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApprovalDecision {
	Approve,
	Reject,
}

impl From<ApprovalDecision> for ReviewDecision {
	fn from(decision: ApprovalDecision) -> Self {
		match decision {
			ApprovalDecision::Approve => ReviewDecision::Approved,
			ApprovalDecision::Reject => ReviewDecision::Denied,
		}
	}
}

/// Which kind of request an approval answers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApprovalKind {
	/// A command execution (`exec_approval_request`).
	Exec,
	/// A file patch (`apply_patch_approval_request`).
	Patch,
}

struct ActiveSession {
	id: String,
	handle: Arc<dyn NativeSession>,
}

struct LoopHandle {
	generation: u64,
	abort: Arc<AtomicBool>,
	task: JoinHandle<()>,
}

pub(crate) struct ClientInner {
	engine: Arc<dyn NativeEngine>,
	config: BridgeConfig,
	resolver: Arc<dyn ModelResolver>,
	plugins: PluginRegistry,
	connection: tokio::sync::Mutex<Option<Arc<dyn NativeConnection>>>,
	connected: AtomicBool,
	// Serializes create_conversation and close.
	lifecycle: tokio::sync::Mutex<()>,
	session: Mutex<Option<ActiveSession>>,
	poll_loop: Mutex<Option<LoopHandle>>,
	bus: Arc<EventBus>,
	routed: broadcast::Sender<RoutedEvent>,
	request_seq: AtomicU64,
	generation: AtomicU64,
}

impl ClientInner {
	fn finish_loop(&self, generation: u64) {
		let mut slot = self.poll_loop.lock();
		if slot.as_ref().is_some_and(|handle| handle.generation == generation) {
			*slot = None;
			drop(slot);
			self.bus.end();
		}
	}
}

/// Builder for [`Client`].
pub struct ClientBuilder {
	engine: Arc<dyn NativeEngine>,
	config: BridgeConfig,
	plugins: Vec<Arc<dyn Plugin>>,
	resolver: Arc<dyn ModelResolver>,
}

impl ClientBuilder {
	pub fn config(mut self, config: BridgeConfig) -> Self {
		self.config = config;
		self
	}

	pub fn plugin(mut self, plugin: Arc<dyn Plugin>) -> Self {
		self.plugins.push(plugin);
		self
	}

	pub fn model_resolver(mut self, resolver: Arc<dyn ModelResolver>) -> Self {
		self.resolver = resolver;
		self
	}

	/// Validates the configuration and builds the client. No native call is made.
	pub fn build(self) -> Result<Client> {
		self.config.validate()?;

		let plugins = PluginRegistry::default();
		for plugin in self.plugins {
			plugins.register(plugin);
		}
		let (routed, _) = broadcast::channel(ROUTED_CAPACITY);

		Ok(Client {
			inner: Arc::new(ClientInner {
				engine: self.engine,
				config: self.config,
				resolver: self.resolver,
				plugins,
				connection: tokio::sync::Mutex::new(None),
				connected: AtomicBool::new(false),
				lifecycle: tokio::sync::Mutex::new(()),
				session: Mutex::new(None),
				poll_loop: Mutex::new(None),
				bus: Arc::new(EventBus::default()),
				routed,
				request_seq: AtomicU64::new(0),
				generation: AtomicU64::new(0),
			}),
		})
	}
}

/// Handle to one session engine. Clones share the same connection and session.
#[derive(Clone)]
pub struct Client {
	inner: Arc<ClientInner>,
}

impl Client {
	pub fn builder(engine: Arc<dyn NativeEngine>) -> ClientBuilder {
		ClientBuilder {
			engine,
			config: BridgeConfig::default(),
			plugins: Vec::new(),
			resolver: Arc::new(DefaultModelResolver),
		}
	}

	pub fn config(&self) -> &BridgeConfig {
		&self.inner.config
	}

	/// Version string reported by the native engine.
	pub fn native_version(&self) -> String {
		self.inner.engine.version()
	}

	/// Loads the native engine and runs plugin initialization.
	///
	/// Retried per the configured policy. A no-op once connected. On failure
	/// no connection is installed.
	pub async fn connect(&self) -> Result<()> {
		let mut slot = self.inner.connection.lock().await;
		if slot.is_some() {
			debug!(target = "codex_bridge.connection", "already connected");
			return Ok(());
		}

		let config = &self.inner.config;
		let options = ConnectOptions {
			home_directory: config.resolve_home_directory(),
			module_override_path: config.native_module_override_path.clone(),
		};
		let budget = config.timeout();
		info!(target = "codex_bridge.connection", home = ?options.home_directory, "connecting to native engine");

		let engine = &self.inner.engine;
		let connection = with_retry("connect", &config.retry_policy, || {
			let attempt = engine.connect(options.clone());
			async move {
				match with_timeout("connect", budget, attempt).await {
					Ok(result) => result.map_err(Error::Connection),
					Err(timeout) => Err(Error::from(timeout)),
				}
			}
		})
		.await?;

		let ctx = PluginContext {
			config: config.clone(),
			native_version: self.native_version(),
		};
		self.inner.plugins.initialize_all(&ctx).await;

		*slot = Some(connection);
		self.inner.connected.store(true, Ordering::SeqCst);
		info!(target = "codex_bridge.connection", plugins = self.inner.plugins.len(), "connected to native engine");
		Ok(())
	}

	pub fn is_connected(&self) -> bool {
		self.inner.connected.load(Ordering::SeqCst)
	}

	/// Adds a plugin after construction. Runs its `initialize` right away when already connected.
	pub async fn register_plugin(&self, plugin: Arc<dyn Plugin>) {
		let slot = self.inner.connection.lock().await;
		self.inner.plugins.register(Arc::clone(&plugin));
		if slot.is_some() {
			let ctx = PluginContext {
				config: self.inner.config.clone(),
				native_version: self.native_version(),
			};
			initialize_one(plugin.as_ref(), &ctx).await;
		}
	}

	/// Opens a conversation and starts its polling loop, closing any current one first.
	pub async fn create_conversation(&self, overrides: Vec<ConfigOverride>) -> Result<String> {
		validate_overrides(&overrides)?;
		let connection = self.inner.connection.lock().await.clone().ok_or(Error::NotConnected)?;

		let _lifecycle = self.inner.lifecycle.lock().await;
		self.close_session().await;

		let budget = self.inner.config.timeout();
		let handle = with_timeout("create session", budget, connection.create_session(overrides))
			.await?
			.map_err(|err| Error::session("create", err))?;
		let id = handle.conversation_id();

		*self.inner.session.lock() = Some(ActiveSession {
			id: id.clone(),
			handle: Arc::clone(&handle),
		});
		self.start_loop(handle);

		info!(target = "codex_bridge.session", session = %id, "conversation created");
		Ok(id)
	}

	fn start_loop(&self, handle: Arc<dyn NativeSession>) {
		let generation = self.inner.generation.fetch_add(1, Ordering::SeqCst) + 1;
		let abort = Arc::new(AtomicBool::new(false));

		// Hold the slot while spawning so the loop cannot finish before it is recorded.
		let mut slot = self.inner.poll_loop.lock();
		let task = tokio::spawn(poll_loop::run(
			Arc::downgrade(&self.inner),
			handle,
			generation,
			Arc::clone(&abort),
			self.inner.config.timeout(),
		));
		*slot = Some(LoopHandle { generation, abort, task });
	}

	pub fn session_id(&self) -> Option<String> {
		self.inner.session.lock().as_ref().map(|session| session.id.clone())
	}

	pub fn has_active_session(&self) -> bool {
		self.inner.session.lock().is_some()
	}

	fn active_handle(&self) -> Result<Arc<dyn NativeSession>> {
		if !self.is_connected() {
			return Err(Error::NotConnected);
		}
		self.inner
			.session
			.lock()
			.as_ref()
			.map(|session| Arc::clone(&session.handle))
			.ok_or(Error::NoActiveSession)
	}

	fn next_request_id(&self) -> String {
		let millis = SystemTime::now().duration_since(UNIX_EPOCH).map(|elapsed| elapsed.as_millis()).unwrap_or_default();
		let seq = self.inner.request_seq.fetch_add(1, Ordering::Relaxed) + 1;
		format!("{millis}-{seq}")
	}

	/// Sends one operation through the `before_submit` hooks to the active session.
	///
	/// Returns the id of the submission actually sent.
	pub async fn submit(&self, op: Op) -> Result<String> {
		let handle = self.active_handle()?;
		let submission = self.inner.plugins.before_submit(Submission::new(self.next_request_id(), op)).await;
		let payload = serde_json::to_string(&submission)?;

		debug!(target = "codex_bridge.session", id = %submission.id, op = submission.op.kind(), "submitting");
		with_timeout("submit", self.inner.config.timeout(), handle.submit(payload))
			.await?
			.map_err(|err| Error::session("submit", err))?;
		Ok(submission.id)
	}

	/// Sends user text with optional local images, using the session's current turn context.
	pub async fn submit_text(&self, text: &str, images: &[PathBuf]) -> Result<String> {
		if text.trim().is_empty() && images.is_empty() {
			return Err(Error::validation("text", "must not be empty without images"));
		}
		if images.iter().any(|path| path.as_os_str().is_empty()) {
			return Err(Error::validation("images", "paths must not be empty"));
		}

		let mut items = Vec::with_capacity(images.len() + 1);
		if !text.trim().is_empty() {
			items.push(InputItem::Text { text: text.to_string() });
		}
		items.extend(images.iter().map(|path| InputItem::LocalImage { path: path.clone() }));
		self.submit(Op::UserInput { items }).await
	}

	/// Sends user text as a full turn: cwd, policies, model, and effort resolved per call.
	pub async fn submit_turn(&self, text: &str, overrides: TurnOverrides) -> Result<String> {
		if text.trim().is_empty() {
			return Err(Error::validation("text", "must not be empty"));
		}
		let cwd = match overrides.cwd {
			Some(cwd) if cwd.as_os_str().is_empty() => return Err(Error::validation("cwd", "must not be empty")),
			Some(cwd) => cwd,
			None => std::env::current_dir().map_err(|err| Error::validation("cwd", err.to_string()))?,
		};

		let config = &self.inner.config;
		let selection = self.inner.resolver.resolve(overrides.model.as_deref(), overrides.effort, config);
		let op = Op::UserTurn {
			items: vec![InputItem::Text { text: text.to_string() }],
			cwd,
			approval_policy: overrides.approval_policy.unwrap_or(config.default_approval_policy),
			sandbox_policy: overrides.sandbox_policy.unwrap_or_else(|| config.default_sandbox_policy.clone()),
			model: selection.model,
			effort: Some(selection.effort),
			summary: overrides.summary.unwrap_or_default(),
		};
		self.submit(op).await
	}

	pub async fn interrupt(&self) -> Result<String> {
		self.submit(Op::Interrupt).await
	}

	/// Answers the approval request whose event envelope carried `id`.
	pub async fn respond_to_approval(&self, id: &str, decision: ApprovalDecision, kind: ApprovalKind) -> Result<String> {
		if id.is_empty() {
			return Err(Error::validation("id", "must not be empty"));
		}
		let id = id.to_string();
		let decision = ReviewDecision::from(decision);
		let op = match kind {
			ApprovalKind::Exec => Op::ExecApproval { id, decision },
			ApprovalKind::Patch => Op::PatchApproval { id, decision },
		};
		self.submit(op).await
	}

	/// Asks for one persisted history entry; the answer arrives as a `get_history_entry_response` event.
	pub async fn request_history_entry(&self, offset: usize, log_id: u64) -> Result<String> {
		self.submit(Op::GetHistoryEntryRequest { offset, log_id }).await
	}

	/// Events from now on, until the session ends, the token fires, or the stream is dropped.
	pub fn subscribe(&self, cancel: Option<CancellationToken>) -> EventStream {
		self.inner.bus.subscribe(cancel)
	}

	pub fn subscriber_count(&self) -> usize {
		self.inner.bus.subscriber_count()
	}

	/// Typed signals for well-known event kinds.
	pub fn routed_events(&self) -> broadcast::Receiver<RoutedEvent> {
		self.inner.routed.subscribe()
	}

	/// Closes the active session, if any. Never fails; native close errors are logged.
	pub async fn close(&self) -> Result<()> {
		let _lifecycle = self.inner.lifecycle.lock().await;
		self.close_session().await;
		Ok(())
	}

	async fn close_session(&self) {
		let Some(session) = self.inner.session.lock().take() else {
			debug!(target = "codex_bridge.session", "no active session to close");
			return;
		};
		let poll_loop = self.inner.poll_loop.lock().take();
		if let Some(handle) = &poll_loop {
			handle.abort.store(true, Ordering::SeqCst);
		}
		info!(target = "codex_bridge.session", session = %session.id, "closing session");

		match with_timeout("close session", self.inner.config.timeout(), session.handle.close()).await {
			Ok(Ok(())) => {}
			Ok(Err(err)) => warn!(target = "codex_bridge.session", session = %session.id, error = %err, "native close failed"),
			Err(err) => warn!(target = "codex_bridge.session", session = %session.id, error = %err, "native close timed out"),
		}

		if let Some(handle) = poll_loop {
			let generation = handle.generation;
			if tokio::time::timeout(CLOSE_GRACE_PERIOD, handle.task).await.is_err() {
				warn!(target = "codex_bridge.session", generation, "polling loop still running after grace period, abandoning");
			}
		}
		self.inner.bus.end();
	}
}
