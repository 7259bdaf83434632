//! Model and effort selection for user turns.

use std::path::PathBuf;

use codex_bridge_protocol::{AskForApproval, ReasoningEffort, ReasoningSummary, SandboxPolicy};

use crate::config::BridgeConfig;

pub const DEFAULT_MODEL: &str = "gpt-5-codex";
pub const DEFAULT_EFFORT: ReasoningEffort = ReasoningEffort::Medium;

/// Per-turn settings for [`crate::Client::submit_turn`]. Unset fields fall back to configuration.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TurnOverrides {
	pub cwd: Option<PathBuf>,
	pub approval_policy: Option<AskForApproval>,
	pub sandbox_policy: Option<SandboxPolicy>,
	pub model: Option<String>,
	pub effort: Option<ReasoningEffort>,
	pub summary: Option<ReasoningSummary>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelSelection {
	pub model: String,
	pub effort: ReasoningEffort,
}

/// Picks the model and reasoning effort for a turn.
pub trait ModelResolver: Send + Sync {
	fn resolve(&self, requested_model: Option<&str>, requested_effort: Option<ReasoningEffort>, config: &BridgeConfig) -> ModelSelection;
}

/// Explicit request, then configured default, then built-in default.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultModelResolver;

impl ModelResolver for DefaultModelResolver {
	fn resolve(&self, requested_model: Option<&str>, requested_effort: Option<ReasoningEffort>, config: &BridgeConfig) -> ModelSelection {
		let model = requested_model
			.filter(|model| !model.trim().is_empty())
			.or(config.default_model.as_deref())
			.unwrap_or(DEFAULT_MODEL)
			.to_string();
		let effort = requested_effort.or(config.default_effort).unwrap_or(DEFAULT_EFFORT);
		ModelSelection { model, effort }
	}
}
