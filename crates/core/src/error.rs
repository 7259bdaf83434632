//! Error types for the session bridge.

use std::path::PathBuf;

use codex_bridge_runtime::TimeoutError;
use thiserror::Error;

use crate::native::NativeError;

/// Errors surfaced by the bridge.
///
/// `Clone` so that a single polling-loop failure can be delivered to every
/// active subscriber.
#[derive(Debug, Clone, Error)]
pub enum Error {
	/// Loading the native engine or constructing the connection failed after retries.
	#[error("failed to connect to native engine: {0}")]
	Connection(#[source] NativeError),

	/// Session creation, submission, polling, or close failed at the native boundary.
	#[error("session {operation} failed: {source}")]
	Session {
		operation: &'static str,
		#[source]
		source: NativeError,
	},

	/// A timeout-wrapped native call exceeded its budget.
	#[error(transparent)]
	Timeout(#[from] TimeoutError),

	/// Caller supplied a malformed option value.
	#[error("invalid {field}: {reason}")]
	Validation { field: &'static str, reason: String },

	/// A single event payload was not valid structured data.
	#[error("failed to parse event payload: {0}")]
	Parse(String),

	/// Configuration file could not be read or parsed.
	#[error("failed to load config {path}: {reason}")]
	Config { path: PathBuf, reason: String },

	#[error("not connected to native engine")]
	NotConnected,

	#[error("no active session")]
	NoActiveSession,
}

/// Result type alias for bridge operations.
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
	pub(crate) fn validation(field: &'static str, reason: impl Into<String>) -> Self {
		Self::Validation {
			field,
			reason: reason.into(),
		}
	}

	pub(crate) fn session(operation: &'static str, source: NativeError) -> Self {
		Self::Session { operation, source }
	}

	pub fn is_timeout(&self) -> bool {
		matches!(self, Error::Timeout(_))
	}

	pub fn is_connection(&self) -> bool {
		matches!(self, Error::Connection(_))
	}

	pub fn is_validation(&self) -> bool {
		matches!(self, Error::Validation { .. })
	}

	/// Session-level failures, including use of a missing session.
	pub fn is_session(&self) -> bool {
		matches!(self, Error::Session { .. } | Error::NoActiveSession | Error::NotConnected)
	}
}

impl From<serde_json::Error> for Error {
	fn from(err: serde_json::Error) -> Self {
		Error::Parse(err.to_string())
	}
}
