use crate::error::{Error, Result};
use crate::frame::{self, Payload};
use async_stream::stream;
use futures::Stream;
use log::*;
use serde::Serialize;
use std::collections::VecDeque;
use std::mem;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::Notify;

#[derive(Default)]
struct State {
    /// Encoded frames waiting for the consumer, in send order.
    pending: Vec<String>,
    /// Batch swapped out of `pending` by the consumer, not yet yielded.
    /// Lives here rather than in the stream so a restarted `drain` resumes it.
    in_flight: VecDeque<String>,
    /// Flips false -> true exactly once.
    closed: bool,
}

#[derive(Default)]
struct Shared {
    state: Mutex<State>,
    /// Wake signal for the consumer. `Notify` keeps a single permit when
    /// nobody is waiting, so a send that lands between the consumer taking
    /// the buffer and starting to wait is never lost.
    signal: Notify,
}

/// Buffer of outbound SSE frames shared by one producer and one consumer.
///
/// The producer (a stream handler) calls [`send`](Self::send), which encodes the
/// payload and appends it without ever suspending. The consumer (the response
/// body) polls [`drain`](Self::drain), which swaps the whole buffer out on every
/// wake-up and yields frames in the order they were sent.
///
/// Cloning the channel clones the handle, not the buffer.
#[derive(Clone, Default)]
pub struct EventChannel {
    shared: Arc<Shared>,
}

impl EventChannel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Encodes `payload` as a frame, optionally tagged with an `event:` name,
    /// and queues it for the consumer.
    ///
    /// Fails with [`Error::BrokenChannel`] once the channel is closed.
    pub fn send(&self, payload: impl Into<Payload>, event: Option<&str>) -> Result<()> {
        {
            let mut state = lock(&self.shared);
            if state.closed {
                warn!("Dropping event sent on a closed channel");
                return Err(Error::BrokenChannel);
            }
            let frame = frame::encode(payload.into(), event)?;
            state.pending.push(frame);
        }

        self.shared.signal.notify_one();
        Ok(())
    }

    /// Serializes `value` to JSON and sends it.
    pub fn send_json<T: Serialize + ?Sized>(&self, value: &T, event: Option<&str>) -> Result<()> {
        self.send(Payload::json(value)?, event)
    }

    /// Marks the channel closed and wakes the consumer. Frames already queued
    /// are still delivered. Closing twice is a no-op.
    pub fn close(&self) {
        let was_open = {
            let mut state = lock(&self.shared);
            !mem::replace(&mut state.closed, true)
        };

        if was_open {
            trace!("Event channel closed");
            self.shared.signal.notify_one();
        }
    }

    pub fn is_closed(&self) -> bool {
        lock(&self.shared).closed
    }

    /// Number of accepted frames not yet yielded to a consumer.
    pub fn pending_len(&self) -> usize {
        let state = lock(&self.shared);
        state.pending.len() + state.in_flight.len()
    }

    /// Returns a stream of encoded frames.
    ///
    /// While the channel is open the stream never ends: it waits for the wake
    /// signal, takes everything queued so far and yields it in order. Once the
    /// channel is closed the stream yields what is left and terminates.
    ///
    /// Each call returns a fresh stream over the same buffer. A stream dropped
    /// in the middle of a batch leaves the rest of that batch to the next one.
    pub fn drain(&self) -> impl Stream<Item = String> + Send + 'static {
        let shared = Arc::clone(&self.shared);

        stream! {
            loop {
                let (next, closed) = {
                    let mut state = lock(&shared);
                    if state.in_flight.is_empty() {
                        state.in_flight = VecDeque::from(mem::take(&mut state.pending));
                    }
                    (state.in_flight.pop_front(), state.closed)
                };

                match next {
                    Some(frame) => {
                        yield frame;
                    }
                    None if closed => break,
                    None => shared.signal.notified().await,
                }
            }
        }
    }
}

// The state is never left half-updated, so a panic elsewhere while holding
// the lock does not invalidate it.
fn lock(shared: &Shared) -> MutexGuard<'_, State> {
    shared.state.lock().unwrap_or_else(PoisonError::into_inner)
}
