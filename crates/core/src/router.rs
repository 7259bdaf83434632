//! Typed re-routing of well-known event kinds.
//!
//! Every event reaches subscribers as a raw [`EventEnvelope`]. Events whose
//! kind is listed here are additionally decoded into their payload type and
//! published as a [`RoutedEvent`]. A payload that does not match its type is
//! not re-routed.

use codex_bridge_protocol::{
	AgentMessageEvent, ApplyPatchApprovalRequestEvent, ErrorEvent, EventEnvelope, ExecApprovalRequestEvent,
	GetHistoryEntryResponseEvent, SessionConfiguredEvent, TaskCompleteEvent, TaskStartedEvent, TokenCountEvent, kinds,
};

/// Narrowly typed signal derived from one event.
#[derive(Debug, Clone, PartialEq)]
pub enum RoutedEvent {
	SessionConfigured(SessionConfiguredEvent),
	TaskStarted(TaskStartedEvent),
	TaskComplete(TaskCompleteEvent),
	AgentMessage(AgentMessageEvent),
	TokenCount(TokenCountEvent),
	/// `id` is the envelope id to answer with [`crate::Client::respond_to_approval`].
	ExecApprovalRequest { id: String, request: ExecApprovalRequestEvent },
	ApplyPatchApprovalRequest { id: String, request: ApplyPatchApprovalRequestEvent },
	HistoryEntryResponse(GetHistoryEntryResponseEvent),
	Error(ErrorEvent),
}

impl RoutedEvent {
	/// Wire kind this signal was derived from.
	pub fn kind(&self) -> &'static str {
		match self {
			RoutedEvent::SessionConfigured(_) => kinds::SESSION_CONFIGURED,
			RoutedEvent::TaskStarted(_) => kinds::TASK_STARTED,
			RoutedEvent::TaskComplete(_) => kinds::TASK_COMPLETE,
			RoutedEvent::AgentMessage(_) => kinds::AGENT_MESSAGE,
			RoutedEvent::TokenCount(_) => kinds::TOKEN_COUNT,
			RoutedEvent::ExecApprovalRequest { .. } => kinds::EXEC_APPROVAL_REQUEST,
			RoutedEvent::ApplyPatchApprovalRequest { .. } => kinds::APPLY_PATCH_APPROVAL_REQUEST,
			RoutedEvent::HistoryEntryResponse(_) => kinds::GET_HISTORY_ENTRY_RESPONSE,
			RoutedEvent::Error(_) => kinds::ERROR,
		}
	}
}

/// Decodes `event` into its typed signal, if its kind is guarded and its payload matches.
pub fn route(event: &EventEnvelope) -> Option<RoutedEvent> {
	let msg = &event.msg;
	match msg.kind.as_str() {
		kinds::SESSION_CONFIGURED => msg.decode().map(RoutedEvent::SessionConfigured),
		kinds::TASK_STARTED => msg.decode().map(RoutedEvent::TaskStarted),
		kinds::TASK_COMPLETE => msg.decode().map(RoutedEvent::TaskComplete),
		kinds::AGENT_MESSAGE => msg.decode().map(RoutedEvent::AgentMessage),
		kinds::TOKEN_COUNT => msg.decode().map(RoutedEvent::TokenCount),
		kinds::EXEC_APPROVAL_REQUEST => msg.decode().map(|request| RoutedEvent::ExecApprovalRequest {
			id: event.id.clone(),
			request,
		}),
		kinds::APPLY_PATCH_APPROVAL_REQUEST => msg.decode().map(|request| RoutedEvent::ApplyPatchApprovalRequest {
			id: event.id.clone(),
			request,
		}),
		kinds::GET_HISTORY_ENTRY_RESPONSE => msg.decode().map(RoutedEvent::HistoryEntryResponse),
		kinds::ERROR => msg.decode().map(RoutedEvent::Error),
		_ => None,
	}
}
