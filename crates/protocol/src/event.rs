//! Incoming event envelopes and the typed payloads of routed event kinds.
//!
//! Every line yielded by the native session is one envelope:
//! ```json
//! {
//!   "id": "1718000000000-3",
//!   "msg": { "type": "agent_message", "message": "2" }
//! }
//! ```
//!
//! [`EventMsg`] stays open: any `type` parses, and the remaining fields are
//! kept as a JSON object. Typed access goes through [`EventMsg::decode`], which
//! acts as a shape guard and returns `None` for payloads that do not match.

use std::collections::HashMap;
use std::path::PathBuf;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Wire tags of the event kinds the bridge routes to typed signals.
pub mod kinds {
	pub const SESSION_CONFIGURED: &str = "session_configured";
	pub const TASK_STARTED: &str = "task_started";
	pub const TASK_COMPLETE: &str = "task_complete";
	pub const AGENT_MESSAGE: &str = "agent_message";
	pub const TOKEN_COUNT: &str = "token_count";
	pub const EXEC_APPROVAL_REQUEST: &str = "exec_approval_request";
	pub const APPLY_PATCH_APPROVAL_REQUEST: &str = "apply_patch_approval_request";
	pub const GET_HISTORY_ENTRY_RESPONSE: &str = "get_history_entry_response";
	pub const ERROR: &str = "error";
}

/// One parsed unit of the native engine's output stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventEnvelope {
	/// Id of the submission this event answers; empty for unsolicited events.
	#[serde(default)]
	pub id: String,
	#[serde(alias = "message")]
	pub msg: EventMsg,
}

impl EventEnvelope {
	pub fn new(id: impl Into<String>, msg: EventMsg) -> Self {
		Self { id: id.into(), msg }
	}

	/// Parses one raw payload line.
	pub fn parse(raw: &str) -> serde_json::Result<Self> {
		serde_json::from_str(raw)
	}

	pub fn kind(&self) -> &str {
		&self.msg.kind
	}
}

/// Event message tagged by its `type` field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventMsg {
	#[serde(rename = "type")]
	pub kind: String,
	#[serde(flatten)]
	pub fields: Map<String, Value>,
}

impl EventMsg {
	/// Builds a message from a kind and a JSON object of fields.
	///
	/// Non-object `fields` values produce a message without fields.
	pub fn new(kind: impl Into<String>, fields: Value) -> Self {
		let fields = match fields {
			Value::Object(map) => map,
			_ => Map::new(),
		};
		Self { kind: kind.into(), fields }
	}

	pub fn is(&self, kind: &str) -> bool {
		self.kind == kind
	}

	pub fn field(&self, name: &str) -> Option<&Value> {
		self.fields.get(name)
	}

	/// Decodes the fields into a typed payload, or `None` if the shape does not match.
	pub fn decode<T: DeserializeOwned>(&self) -> Option<T> {
		serde_json::from_value(Value::Object(self.fields.clone())).ok()
	}
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionConfiguredEvent {
	pub session_id: String,
	pub model: String,
	#[serde(default)]
	pub reasoning_effort: Option<String>,
	#[serde(default)]
	pub history_log_id: u64,
	#[serde(default)]
	pub history_entry_count: usize,
	#[serde(default)]
	pub rollout_path: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskStartedEvent {
	#[serde(default)]
	pub model_context_window: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskCompleteEvent {
	#[serde(default)]
	pub last_agent_message: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentMessageEvent {
	pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TokenUsage {
	#[serde(default)]
	pub input_tokens: u64,
	#[serde(default)]
	pub cached_input_tokens: u64,
	#[serde(default)]
	pub output_tokens: u64,
	#[serde(default)]
	pub reasoning_output_tokens: u64,
	#[serde(default)]
	pub total_tokens: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenUsageInfo {
	pub total_token_usage: TokenUsage,
	pub last_token_usage: TokenUsage,
	#[serde(default)]
	pub model_context_window: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenCountEvent {
	#[serde(default)]
	pub info: Option<TokenUsageInfo>,
	/// Rate-limit snapshot as reported by the API, passed through untouched.
	#[serde(default)]
	pub rate_limits: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecApprovalRequestEvent {
	pub call_id: String,
	pub command: Vec<String>,
	pub cwd: PathBuf,
	#[serde(default)]
	pub reason: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApplyPatchApprovalRequestEvent {
	pub call_id: String,
	#[serde(default)]
	pub changes: HashMap<PathBuf, Value>,
	#[serde(default)]
	pub reason: Option<String>,
	#[serde(default)]
	pub grant_root: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
	pub conversation_id: String,
	pub ts: u64,
	pub text: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GetHistoryEntryResponseEvent {
	pub offset: usize,
	pub log_id: u64,
	#[serde(default)]
	pub entry: Option<HistoryEntry>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorEvent {
	pub message: String,
}
