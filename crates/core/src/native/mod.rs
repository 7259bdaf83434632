//! Boundary to the native execution engine.
//!
//! The engine is a black box with a small poll-style contract: build a
//! connection, open a session on it, then `next_event` / `submit` / `close`
//! on the session. Every call returns a boxed `'static` future so a call that
//! outlives its timeout can keep running detached.

pub mod fake;

use std::future::Future;
use std::path::PathBuf;
use std::pin::Pin;
use std::sync::Arc;

use thiserror::Error;

use crate::config::ConfigOverride;

/// Future returned by every native call.
pub type NativeFuture<T> = Pin<Box<dyn Future<Output = Result<T, NativeError>> + Send + 'static>>;

/// Failure reported by the native engine.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct NativeError {
	message: String,
	stream_closed: bool,
}

impl NativeError {
	pub fn new(message: impl Into<String>) -> Self {
		Self {
			message: message.into(),
			stream_closed: false,
		}
	}

	/// The session's event stream was closed by the engine.
	///
	/// A poll that fails this way is treated as end-of-stream, not as an error.
	pub fn stream_closed() -> Self {
		Self {
			message: "StreamClosed".to_string(),
			stream_closed: true,
		}
	}

	pub fn message(&self) -> &str {
		&self.message
	}

	pub fn is_stream_closed(&self) -> bool {
		self.stream_closed || self.message.contains("StreamClosed")
	}
}

/// Options passed when constructing a connection.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConnectOptions {
	/// Engine home (config, auth, history). `None` lets the engine pick its default.
	pub home_directory: Option<PathBuf>,
	/// Alternate location of the native module to load.
	pub module_override_path: Option<PathBuf>,
}

/// Loader for native engine connections.
pub trait NativeEngine: Send + Sync {
	/// Loads the engine and constructs a connection.
	fn connect(&self, options: ConnectOptions) -> NativeFuture<Arc<dyn NativeConnection>>;

	/// Version string reported by the engine build.
	fn version(&self) -> String {
		"0.0.0".to_string()
	}
}

/// A loaded engine instance.
pub trait NativeConnection: Send + Sync {
	fn create_session(&self, overrides: Vec<ConfigOverride>) -> NativeFuture<Arc<dyn NativeSession>>;
}

/// One conversation on a connection.
pub trait NativeSession: Send + Sync {
	fn conversation_id(&self) -> String;

	/// Blocks until the next serialized event, `None` at engine end-of-stream.
	fn next_event(&self) -> NativeFuture<Option<String>>;

	fn submit(&self, submission_json: String) -> NativeFuture<()>;

	fn close(&self) -> NativeFuture<()>;
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn stream_closed_is_detected_by_flag_or_message() {
		assert!(NativeError::stream_closed().is_stream_closed());
		assert!(NativeError::new("conversation error: StreamClosed").is_stream_closed());
		assert!(!NativeError::new("model overloaded").is_stream_closed());
	}
}
