//! Approval, sandbox, and reasoning policy values.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Error returned when a policy string does not name a known variant.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown {kind} '{value}'")]
pub struct UnknownVariant {
	pub kind: &'static str,
	pub value: String,
}

/// When the engine must ask before running a command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AskForApproval {
	/// Only known-safe read commands run without asking.
	#[serde(rename = "untrusted")]
	UnlessTrusted,
	/// Run in the sandbox and ask only when the sandboxed attempt fails.
	OnFailure,
	/// The model decides when to ask.
	#[default]
	OnRequest,
	/// Never ask; failures are returned to the model.
	Never,
}

impl AskForApproval {
	pub fn as_str(self) -> &'static str {
		match self {
			Self::UnlessTrusted => "untrusted",
			Self::OnFailure => "on-failure",
			Self::OnRequest => "on-request",
			Self::Never => "never",
		}
	}
}

impl fmt::Display for AskForApproval {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

impl FromStr for AskForApproval {
	type Err = UnknownVariant;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s {
			"untrusted" => Ok(Self::UnlessTrusted),
			"on-failure" => Ok(Self::OnFailure),
			"on-request" => Ok(Self::OnRequest),
			"never" => Ok(Self::Never),
			other => Err(UnknownVariant {
				kind: "approval policy",
				value: other.to_string(),
			}),
		}
	}
}

/// Filesystem and network restrictions applied to executed commands.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "kebab-case")]
pub enum SandboxPolicy {
	DangerFullAccess,
	ReadOnly,
	WorkspaceWrite {
		#[serde(default, skip_serializing_if = "Vec::is_empty")]
		writable_roots: Vec<PathBuf>,
		#[serde(default)]
		network_access: bool,
		#[serde(default)]
		exclude_tmpdir_env_var: bool,
		#[serde(default)]
		exclude_slash_tmp: bool,
	},
}

impl SandboxPolicy {
	/// Workspace-write with no extra roots and no network.
	pub fn workspace_write() -> Self {
		Self::WorkspaceWrite {
			writable_roots: Vec::new(),
			network_access: false,
			exclude_tmpdir_env_var: false,
			exclude_slash_tmp: false,
		}
	}

	pub fn mode(&self) -> &'static str {
		match self {
			Self::DangerFullAccess => "danger-full-access",
			Self::ReadOnly => "read-only",
			Self::WorkspaceWrite { .. } => "workspace-write",
		}
	}
}

impl Default for SandboxPolicy {
	fn default() -> Self {
		Self::workspace_write()
	}
}

impl FromStr for SandboxPolicy {
	type Err = UnknownVariant;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s {
			"danger-full-access" => Ok(Self::DangerFullAccess),
			"read-only" => Ok(Self::ReadOnly),
			"workspace-write" => Ok(Self::workspace_write()),
			other => Err(UnknownVariant {
				kind: "sandbox mode",
				value: other.to_string(),
			}),
		}
	}
}

/// Reasoning effort requested from reasoning-capable models.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReasoningEffort {
	Minimal,
	Low,
	#[default]
	Medium,
	High,
}

impl ReasoningEffort {
	pub fn as_str(self) -> &'static str {
		match self {
			Self::Minimal => "minimal",
			Self::Low => "low",
			Self::Medium => "medium",
			Self::High => "high",
		}
	}
}

impl fmt::Display for ReasoningEffort {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

impl FromStr for ReasoningEffort {
	type Err = UnknownVariant;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s {
			"minimal" => Ok(Self::Minimal),
			"low" => Ok(Self::Low),
			"medium" => Ok(Self::Medium),
			"high" => Ok(Self::High),
			other => Err(UnknownVariant {
				kind: "reasoning effort",
				value: other.to_string(),
			}),
		}
	}
}

/// Verbosity of reasoning summaries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReasoningSummary {
	#[default]
	Auto,
	Concise,
	Detailed,
	None,
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn approval_policy_wire_names() {
		assert_eq!(serde_json::to_value(AskForApproval::UnlessTrusted).unwrap(), "untrusted");
		assert_eq!(serde_json::to_value(AskForApproval::OnFailure).unwrap(), "on-failure");
		assert_eq!("never".parse::<AskForApproval>().unwrap(), AskForApproval::Never);
		assert!("sometimes".parse::<AskForApproval>().is_err());
	}

	#[test]
	fn sandbox_policy_is_tagged_by_mode() {
		let value = serde_json::to_value(SandboxPolicy::workspace_write()).unwrap();
		assert_eq!(value["mode"], "workspace-write");
		assert_eq!(value["network_access"], false);

		let parsed: SandboxPolicy = serde_json::from_str(r#"{"mode":"read-only"}"#).unwrap();
		assert_eq!(parsed, SandboxPolicy::ReadOnly);
	}

	#[test]
	fn effort_parses_lowercase() {
		assert_eq!("low".parse::<ReasoningEffort>().unwrap(), ReasoningEffort::Low);
		assert_eq!(ReasoningEffort::High.to_string(), "high");
		let err = "extreme".parse::<ReasoningEffort>().unwrap_err();
		assert_eq!(err.to_string(), "unknown reasoning effort 'extreme'");
	}

	#[test]
	fn unknown_variant_boxes_as_std_error() {
		let err: Box<dyn std::error::Error + Send + Sync> = "sandboxed".parse::<SandboxPolicy>().unwrap_err().into();
		assert_eq!(err.to_string(), "unknown sandbox mode 'sandboxed'");
		assert!(err.source().is_none());
	}
}
