//! Client configuration and per-session overrides.
//!
//! Configuration is plain data read fresh by each operation. It can be built
//! in code or loaded from a JSON file:
//!
//! ```json
//! {
//!   "homeDirectory": "/home/me/.codex",
//!   "retryPolicy": { "maxRetries": 3, "initialDelayMs": 100, "backoffFactor": 2.0 },
//!   "timeoutMs": 30000,
//!   "defaultApprovalPolicy": "on-request",
//!   "defaultSandboxPolicy": { "mode": "workspace-write" },
//!   "defaultModel": "gpt-5-codex",
//!   "defaultEffort": "medium"
//! }
//! ```

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use codex_bridge_protocol::{AskForApproval, ReasoningEffort, SandboxPolicy};
use codex_bridge_runtime::{RetryPolicy, budget_from_millis};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Environment variable consulted when no home directory is configured.
pub const HOME_ENV: &str = "CODEX_HOME";

/// Upper bound accepted for `retryPolicy.maxRetries`.
pub const MAX_RETRIES_LIMIT: u32 = 10;

/// Recognized client options.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BridgeConfig {
	pub home_directory: Option<PathBuf>,
	pub native_module_override_path: Option<PathBuf>,
	pub retry_policy: RetryPolicy,
	/// Budget for each native call; unset or `0` disables timeouts.
	pub timeout_ms: Option<u64>,
	pub default_approval_policy: AskForApproval,
	pub default_sandbox_policy: SandboxPolicy,
	pub default_model: Option<String>,
	pub default_effort: Option<ReasoningEffort>,
}

impl BridgeConfig {
	/// Loads and validates a JSON configuration file.
	pub fn from_file(path: &Path) -> Result<Self> {
		let content = fs::read_to_string(path).map_err(|e| Error::Config {
			path: path.to_path_buf(),
			reason: e.to_string(),
		})?;
		let config: Self = serde_json::from_str(&content).map_err(|e| Error::Config {
			path: path.to_path_buf(),
			reason: e.to_string(),
		})?;
		config.validate()?;
		Ok(config)
	}

	/// Rejects malformed option values before any native call is made.
	pub fn validate(&self) -> Result<()> {
		let retry = &self.retry_policy;
		if !retry.backoff_factor.is_finite() || retry.backoff_factor < 1.0 {
			return Err(Error::validation(
				"retryPolicy.backoffFactor",
				format!("must be a finite number >= 1.0, got {}", retry.backoff_factor),
			));
		}
		if retry.max_retries > MAX_RETRIES_LIMIT {
			return Err(Error::validation(
				"retryPolicy.maxRetries",
				format!("must be at most {MAX_RETRIES_LIMIT}, got {}", retry.max_retries),
			));
		}
		if self.default_model.as_deref().is_some_and(|model| model.trim().is_empty()) {
			return Err(Error::validation("defaultModel", "must not be empty"));
		}
		if self.home_directory.as_deref().is_some_and(is_empty_path) {
			return Err(Error::validation("homeDirectory", "must not be empty"));
		}
		if self.native_module_override_path.as_deref().is_some_and(is_empty_path) {
			return Err(Error::validation("nativeModuleOverridePath", "must not be empty"));
		}
		Ok(())
	}

	/// Timeout budget applied to each native call.
	pub fn timeout(&self) -> Option<Duration> {
		budget_from_millis(self.timeout_ms)
	}

	/// Engine home: explicit setting, then `$CODEX_HOME`, then `~/.codex`.
	pub fn resolve_home_directory(&self) -> Option<PathBuf> {
		if let Some(home) = &self.home_directory {
			return Some(home.clone());
		}
		if let Some(home) = std::env::var_os(HOME_ENV).filter(|value| !value.is_empty()) {
			return Some(PathBuf::from(home));
		}
		dirs::home_dir().map(|home| home.join(".codex"))
	}
}

fn is_empty_path(path: &Path) -> bool {
	path.as_os_str().is_empty()
}

/// One `key = value` override applied when a session is created.
///
/// Keys are dotted paths into the engine's configuration (`model`,
/// `sandbox_workspace_write.network_access`, ...). Values are TOML literals;
/// anything that does not parse as one is taken as a plain string.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigOverride {
	pub key: String,
	pub value: String,
}

impl ConfigOverride {
	pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
		Self {
			key: key.into(),
			value: value.into(),
		}
	}

	/// Parses `key=value` as written on a command line.
	pub fn parse(raw: &str) -> Result<Self> {
		let Some((key, value)) = raw.split_once('=') else {
			return Err(Error::validation("override", format!("expected key=value, got '{raw}'")));
		};
		let parsed = Self::new(key.trim(), value.trim());
		parsed.validate()?;
		Ok(parsed)
	}

	pub fn validate(&self) -> Result<()> {
		if self.key.is_empty() {
			return Err(Error::validation("override", "key must not be empty"));
		}
		if self.key.split('.').any(|segment| segment.is_empty() || segment.chars().any(char::is_whitespace)) {
			return Err(Error::validation("override", format!("malformed key '{}'", self.key)));
		}
		Ok(())
	}

	/// Interprets the value as a TOML literal, falling back to a string.
	pub fn parsed_value(&self) -> toml::Value {
		let wrapped = format!("_x_ = {}", self.value);
		toml::from_str::<toml::Table>(&wrapped)
			.ok()
			.and_then(|mut table| table.remove("_x_"))
			.unwrap_or_else(|| toml::Value::String(self.value.clone()))
	}
}

pub(crate) fn validate_overrides(overrides: &[ConfigOverride]) -> Result<()> {
	overrides.iter().try_for_each(ConfigOverride::validate)
}
