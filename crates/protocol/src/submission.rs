//! Outgoing submission envelopes.
//!
//! Format matches the native engine's submission queue:
//! ```json
//! {
//!   "id": "1718000000000-3",
//!   "op": { "type": "user_input", "items": [{ "type": "text", "text": "hi" }] }
//! }
//! ```

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::policy::{AskForApproval, ReasoningEffort, ReasoningSummary, SandboxPolicy};

/// One outgoing request to the native engine.
///
/// The `id` only correlates responses; ordering is the order of submission.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Submission {
	pub id: String,
	pub op: Op,
}

impl Submission {
	pub fn new(id: impl Into<String>, op: Op) -> Self {
		Self { id: id.into(), op }
	}
}

/// Operation carried by a [`Submission`], tagged by `type`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Op {
	/// Plain user input using the session's current turn context.
	UserInput { items: Vec<InputItem> },
	/// User input with a full per-turn context.
	UserTurn {
		items: Vec<InputItem>,
		cwd: PathBuf,
		approval_policy: AskForApproval,
		sandbox_policy: SandboxPolicy,
		model: String,
		#[serde(default, skip_serializing_if = "Option::is_none")]
		effort: Option<ReasoningEffort>,
		summary: ReasoningSummary,
	},
	/// Abort the running task.
	Interrupt,
	/// Answer an `exec_approval_request`.
	ExecApproval { id: String, decision: ReviewDecision },
	/// Answer an `apply_patch_approval_request`.
	PatchApproval { id: String, decision: ReviewDecision },
	/// Ask for one entry of the persistent message history.
	GetHistoryEntryRequest { offset: usize, log_id: u64 },
	/// Ask the engine to shut the conversation down.
	Shutdown,
}

impl Op {
	/// Wire tag of this operation.
	pub fn kind(&self) -> &'static str {
		match self {
			Op::UserInput { .. } => "user_input",
			Op::UserTurn { .. } => "user_turn",
			Op::Interrupt => "interrupt",
			Op::ExecApproval { .. } => "exec_approval",
			Op::PatchApproval { .. } => "patch_approval",
			Op::GetHistoryEntryRequest { .. } => "get_history_entry_request",
			Op::Shutdown => "shutdown",
		}
	}
}

/// One piece of user input.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InputItem {
	Text { text: String },
	/// Pre-encoded image, usually a `data:` URL.
	Image { image_url: String },
	/// Image on local disk, read by the engine.
	LocalImage { path: PathBuf },
}

/// Decision sent back for an approval request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReviewDecision {
	Approved,
	ApprovedForSession,
	#[default]
	Denied,
	Abort,
}
