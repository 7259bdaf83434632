//! Fan-out from the single polling loop to independent subscribers.
//!
//! Each subscriber owns a [`TerminatingQueue`]; the loop pushes every event
//! into every queue within the same turn, so delivery order matches native
//! emission order for all subscribers.

use std::collections::HashMap;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::task::{Context, Poll};

use codex_bridge_protocol::EventEnvelope;
use codex_bridge_runtime::TerminatingQueue;
use futures_util::stream::{self, BoxStream, Stream, StreamExt};
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error};

use crate::error::{Error, Result};

type SubscriberQueue = Arc<TerminatingQueue<EventEnvelope, Error>>;

#[derive(Default)]
pub(crate) struct EventBus {
	subscribers: Mutex<HashMap<u64, SubscriberQueue>>,
	next_id: AtomicU64,
}

impl EventBus {
	pub(crate) fn subscribe(self: &Arc<Self>, cancel: Option<CancellationToken>) -> EventStream {
		let id = self.next_id.fetch_add(1, Ordering::Relaxed);
		let queue: SubscriberQueue = Arc::new(TerminatingQueue::new());
		self.subscribers.lock().insert(id, Arc::clone(&queue));
		debug!(target = "codex_bridge.events", subscriber = id, "subscriber attached");

		EventStream::new(
			Arc::new(Subscription {
				id,
				queue,
				bus: Arc::downgrade(self),
				detached: AtomicBool::new(false),
			}),
			cancel,
		)
	}

	pub(crate) fn subscriber_count(&self) -> usize {
		self.subscribers.lock().len()
	}

	pub(crate) fn emit(&self, event: &EventEnvelope) {
		for queue in self.subscribers.lock().values() {
			queue.enqueue(event.clone());
		}
	}

	/// Fails every subscriber. Returns `false` when nobody was listening.
	pub(crate) fn emit_error(&self, err: &Error) -> bool {
		let failed: Vec<_> = self.subscribers.lock().drain().map(|(_, queue)| queue).collect();
		if failed.is_empty() {
			error!(target = "codex_bridge.events", error = %err, "polling loop failed with no subscribers");
			return false;
		}
		for queue in failed {
			queue.fail(err.clone());
		}
		true
	}

	/// Ends every current subscriber's sequence.
	pub(crate) fn end(&self) {
		let ended: Vec<_> = self.subscribers.lock().drain().map(|(_, queue)| queue).collect();
		debug!(target = "codex_bridge.events", subscribers = ended.len(), "end of stream");
		for queue in ended {
			queue.close();
		}
	}

	fn detach(&self, id: u64) {
		if self.subscribers.lock().remove(&id).is_some() {
			debug!(target = "codex_bridge.events", subscriber = id, "subscriber detached");
		}
	}
}

struct Subscription {
	id: u64,
	queue: SubscriberQueue,
	bus: Weak<EventBus>,
	detached: AtomicBool,
}

impl Subscription {
	fn detach(&self) {
		if self.detached.swap(true, Ordering::SeqCst) {
			return;
		}
		if let Some(bus) = self.bus.upgrade() {
			bus.detach(self.id);
		}
		self.queue.close();
	}
}

impl Drop for Subscription {
	fn drop(&mut self) {
		self.detach();
	}
}

/// A subscriber's view of session events, starting from the moment it subscribed.
///
/// Ends when the session's event stream ends, when the cancellation token
/// fires, or after yielding a loop failure. Dropping the stream detaches it.
pub struct EventStream {
	subscription: Arc<Subscription>,
	inner: BoxStream<'static, Result<EventEnvelope>>,
}

impl EventStream {
	fn new(subscription: Arc<Subscription>, cancel: Option<CancellationToken>) -> Self {
		let state = (Arc::clone(&subscription), cancel, false);
		let inner = stream::unfold(state, |(subscription, cancel, done)| async move {
			if done {
				return None;
			}
			let next = match &cancel {
				Some(token) => tokio::select! {
					biased;
					_ = token.cancelled() => Ok(None),
					next = subscription.queue.next() => next,
				},
				None => subscription.queue.next().await,
			};
			match next {
				Ok(Some(event)) => Some((Ok(event), (subscription, cancel, false))),
				Ok(None) => {
					subscription.detach();
					None
				}
				Err(err) => {
					subscription.detach();
					Some((Err(err), (subscription, cancel, true)))
				}
			}
		})
		.boxed();

		Self { subscription, inner }
	}

	/// Next event, `None` once the sequence has ended.
	pub async fn next(&mut self) -> Option<Result<EventEnvelope>> {
		self.inner.next().await
	}

	/// Detaches from the bus. Events already buffered are still yielded.
	pub fn cancel(&self) {
		self.subscription.detach();
	}
}

impl Stream for EventStream {
	type Item = Result<EventEnvelope>;

	fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
		self.inner.poll_next_unpin(cx)
	}
}
