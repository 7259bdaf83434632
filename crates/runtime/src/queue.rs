//! Push-to-pull buffer with sticky terminal states.
//!
//! A [`TerminatingQueue`] bridges a producer that pushes values (or a final
//! failure/close) to a consumer that pulls them one at a time with
//! [`TerminatingQueue::next`].
//!
//! # Invariants
//!
//! * At most one of {buffered values, pending waiters} is non-empty.
//! * The first terminal transition wins; later `enqueue`/`fail`/`close` calls
//!   are no-ops.
//! * Values buffered before the terminal transition are drained in order
//!   before the terminal signal is surfaced.

use std::collections::VecDeque;

use parking_lot::Mutex;
use tokio::sync::oneshot;

type Waiter<T, E> = oneshot::Sender<Result<Option<T>, E>>;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Terminal<E> {
	Closed,
	Failed(E),
}

struct State<T, E> {
	values: VecDeque<T>,
	waiters: VecDeque<Waiter<T, E>>,
	terminal: Option<Terminal<E>>,
}

/// Single-consumer buffer with `closed` and `failed` terminal states.
pub struct TerminatingQueue<T, E> {
	state: Mutex<State<T, E>>,
}

impl<T, E> TerminatingQueue<T, E>
where
	T: Send,
	E: Clone + Send,
{
	pub fn new() -> Self {
		Self {
			state: Mutex::new(State {
				values: VecDeque::new(),
				waiters: VecDeque::new(),
				terminal: None,
			}),
		}
	}

	/// Hands `value` to the oldest live waiter, or buffers it.
	///
	/// Dropped after a terminal transition.
	pub fn enqueue(&self, mut value: T) {
		let mut state = self.state.lock();
		if state.terminal.is_some() {
			return;
		}

		while let Some(waiter) = state.waiters.pop_front() {
			match waiter.send(Ok(Some(value))) {
				Ok(()) => return,
				// Receiver went away (cancelled `next`); try the next waiter.
				Err(Ok(Some(returned))) => value = returned,
				Err(_) => return,
			}
		}
		state.values.push_back(value);
	}

	/// Records `error` and rejects every pending waiter with it.
	///
	/// Buffered values are kept and still drained first.
	pub fn fail(&self, error: E) {
		let mut state = self.state.lock();
		if state.terminal.is_some() {
			return;
		}
		state.terminal = Some(Terminal::Failed(error.clone()));
		for waiter in state.waiters.drain(..) {
			let _ = waiter.send(Err(error.clone()));
		}
	}

	/// Marks the queue closed and resolves every pending waiter with end-of-stream.
	pub fn close(&self) {
		let mut state = self.state.lock();
		if state.terminal.is_some() {
			return;
		}
		state.terminal = Some(Terminal::Closed);
		for waiter in state.waiters.drain(..) {
			let _ = waiter.send(Ok(None));
		}
	}

	/// Pulls the next value.
	///
	/// Returns `Ok(Some(value))` while values remain, `Ok(None)` once closed
	/// and drained, and `Err(error)` on every call once failed and drained.
	pub async fn next(&self) -> Result<Option<T>, E> {
		let rx = {
			let mut state = self.state.lock();
			if let Some(value) = state.values.pop_front() {
				return Ok(Some(value));
			}
			match &state.terminal {
				Some(Terminal::Failed(error)) => return Err(error.clone()),
				Some(Terminal::Closed) => return Ok(None),
				None => {}
			}
			let (tx, rx) = oneshot::channel();
			state.waiters.push_back(tx);
			rx
		};

		// The sender only disappears if the queue itself is dropped.
		rx.await.unwrap_or(Ok(None))
	}

	/// Number of buffered, undelivered values.
	pub fn len(&self) -> usize {
		self.state.lock().values.len()
	}

	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}

	/// Returns `true` once `close` or `fail` has been called.
	pub fn is_terminated(&self) -> bool {
		self.state.lock().terminal.is_some()
	}

	#[cfg(test)]
	fn pending_waiters(&self) -> usize {
		self.state.lock().waiters.len()
	}
}

impl<T, E> Default for TerminatingQueue<T, E>
where
	T: Send,
	E: Clone + Send,
{
	fn default() -> Self {
		Self::new()
	}
}
