//! The per-session polling loop.
//!
//! Exactly one native poll is in flight per session. Each payload is parsed,
//! fanned out to subscribers, handed to `after_event` hooks, and routed. A
//! poll failure is delivered once and ends the loop; a parse failure only
//! skips its payload.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use codex_bridge_protocol::EventEnvelope;
use codex_bridge_runtime::with_timeout;
use tracing::{debug, warn};

use super::ClientInner;
use crate::error::Error;
use crate::native::NativeSession;
use crate::router::route;

pub(super) async fn run(
	inner: Weak<ClientInner>,
	session: Arc<dyn NativeSession>,
	generation: u64,
	abort: Arc<AtomicBool>,
	budget: Option<Duration>,
) {
	debug!(target = "codex_bridge.session", generation, "polling loop started");

	loop {
		// Close may raise the flag while hooks run; never poll a closed session.
		if aborted(&abort, generation) {
			return;
		}
		let polled = with_timeout("poll next event", budget, session.next_event()).await;

		// Close owns the end-of-stream once it raised the flag.
		if aborted(&abort, generation) {
			return;
		}
		let Some(client) = inner.upgrade() else {
			return;
		};

		let payload = match polled {
			Ok(Ok(payload)) => payload,
			Ok(Err(err)) if err.is_stream_closed() => None,
			Ok(Err(err)) => {
				fail(&client, Error::session("poll", err), generation).await;
				break;
			}
			Err(timeout) => {
				fail(&client, Error::from(timeout), generation).await;
				break;
			}
		};

		let Some(raw) = payload.filter(|raw| !raw.trim().is_empty()) else {
			debug!(target = "codex_bridge.session", generation, "native end of stream");
			break;
		};

		let event = match EventEnvelope::parse(&raw) {
			Ok(event) => event,
			Err(err) => {
				warn!(target = "codex_bridge.events", error = %err, "skipping unparsable event payload");
				continue;
			}
		};

		client.bus.emit(&event);
		client.plugins.after_event(&event).await;
		if let Some(routed) = route(&event) {
			// No receivers is fine.
			let _ = client.routed.send(routed);
		}
	}

	if let Some(client) = inner.upgrade() {
		client.finish_loop(generation);
	}
}

fn aborted(abort: &AtomicBool, generation: u64) -> bool {
	let aborted = abort.load(Ordering::SeqCst);
	if aborted {
		debug!(target = "codex_bridge.session", generation, "polling loop aborted");
	}
	aborted
}

async fn fail(client: &ClientInner, err: Error, generation: u64) {
	warn!(target = "codex_bridge.session", generation, error = %err, "polling loop failed");
	client.bus.emit_error(&err);
	client.plugins.on_error(&err).await;
}
