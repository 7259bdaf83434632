//! Async session bridge over a poll-style native conversation engine.
//!
//! The native engine exposes one blocking "next event" call per session. This
//! crate turns it into:
//! * a single polling loop per session, fanned out to any number of
//!   cancellable [`EventStream`]s,
//! * typed [`RoutedEvent`] signals for well-known event kinds,
//! * timeout-bounded native calls that keep running detached on expiry,
//! * retried connection setup,
//! * an ordered [`Plugin`] pipeline whose failures never break the session.
//!
//! ```ignore
//! let client = Client::builder(engine).config(BridgeConfig::default()).build()?;
//! client.connect().await?;
//! client.create_conversation(Vec::new()).await?;
//!
//! let mut events = client.subscribe(None);
//! client.submit_turn("what is 1 + 1?", TurnOverrides::default()).await?;
//! while let Some(event) = events.next().await {
//!     println!("{}", event?.kind());
//! }
//! ```

mod bus;
pub mod client;
pub mod config;
pub mod error;
pub mod model;
pub mod native;
pub mod plugin;
pub mod router;

pub use bus::EventStream;
pub use client::{ApprovalDecision, ApprovalKind, CLOSE_GRACE_PERIOD, Client, ClientBuilder};
pub use codex_bridge_protocol as protocol;
pub use codex_bridge_runtime::{RetryPolicy, TimeoutError};
pub use config::{BridgeConfig, ConfigOverride};
pub use error::{Error, Result};
pub use model::{DefaultModelResolver, ModelResolver, ModelSelection, TurnOverrides};
pub use native::{ConnectOptions, NativeConnection, NativeEngine, NativeError, NativeFuture, NativeSession};
pub use plugin::{Plugin, PluginContext};
pub use router::RoutedEvent;
pub use tokio_util::sync::CancellationToken;

/// Version of this bridge build, as reported by the build environment when set.
pub fn version() -> &'static str {
	option_env!("CODEX_BRIDGE_VERSION").unwrap_or(env!("CARGO_PKG_VERSION"))
}
