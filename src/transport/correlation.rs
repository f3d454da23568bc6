//! Request/response correlation.
//!
//! One [`CorrelationTable`] per connection maps each in-flight
//! [`RequestId`] to the sink its frames are delivered into. Every mutation
//! happens under a single mutex. Sends into a sink happen outside it, so a
//! slow consumer never blocks registration or teardown.
//!
//! An entry is removed exactly once: on terminal-frame delivery, on
//! timeout/abandonment by its stream, or by [`CorrelationTable::fail_all`]
//! at connection teardown.
//!
//! A failure is parked beside the sink rather than pushed into it, so a
//! consumer whose buffer is full still receives the real teardown error
//! after draining what was already delivered.

// ============================================================================
// Imports
// ============================================================================

use std::future::poll_fn;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::{SendTimeoutError, TrySendError};
use tracing::{debug, trace};

use crate::error::{Error, Result};
use crate::identifiers::RequestId;
use crate::protocol::Response;

// ============================================================================
// Types
// ============================================================================

/// Item carried by a request's sink.
pub(crate) type SinkItem = Result<Response>;

/// Sending half of a request's sink.
type Sink = mpsc::Sender<SinkItem>;

/// Terminal error shared by an entry and its receiver.
type FailureSlot = Arc<Mutex<Option<Error>>>;

/// A registered request.
struct Entry {
    sink: Sink,
    failure: FailureSlot,
    /// Set once a SASL answer has been sent for this request.
    authenticating: bool,
}

impl Entry {
    /// Parks `error` and closes the sink by dropping it.
    fn fail(self, error: Error) {
        *self.failure.lock() = Some(error);
    }
}

/// Receiving half handed to the submitter.
#[derive(Debug)]
pub(crate) struct SinkReceiver {
    rx: mpsc::Receiver<SinkItem>,
    failure: FailureSlot,
}

impl SinkReceiver {
    /// Polls for the next item.
    ///
    /// Buffered frames come first. Once the sink is closed, the parked
    /// failure is yielded if there is one, then `None`.
    pub(crate) fn poll_recv(&mut self, cx: &mut Context<'_>) -> Poll<Option<SinkItem>> {
        match self.rx.poll_recv(cx) {
            Poll::Ready(None) => Poll::Ready(self.failure.lock().take().map(Err)),
            other => other,
        }
    }

    /// Receives the next item.
    pub(crate) async fn recv(&mut self) -> Option<SinkItem> {
        poll_fn(|cx| self.poll_recv(cx)).await
    }
}

/// Outcome of [`CorrelationTable::deliver`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Delivery {
    /// Frame handed to the sink.
    Delivered,
    /// No entry for the id (late frame after timeout or teardown).
    Unknown,
    /// The consumer dropped its stream; entry removed.
    Abandoned,
    /// The sink stayed full past the allowed wait.
    Full,
}

// ============================================================================
// CorrelationTable
// ============================================================================

/// Map from in-flight request id to response sink.
pub(crate) struct CorrelationTable {
    entries: Mutex<FxHashMap<RequestId, Entry>>,
    sink_capacity: usize,
}

impl CorrelationTable {
    /// Creates an empty table whose sinks buffer `sink_capacity` frames.
    #[must_use]
    pub fn new(sink_capacity: usize) -> Self {
        Self {
            entries: Mutex::new(FxHashMap::default()),
            sink_capacity: sink_capacity.max(1),
        }
    }

    /// Registers `id` and returns the receiving end of its sink.
    ///
    /// # Errors
    ///
    /// - [`Error::DuplicateRequest`] if `id` is already registered
    /// - [`Error::TooManyPending`] if `max_in_flight` entries exist
    pub(crate) fn register(&self, id: RequestId, max_in_flight: usize) -> Result<SinkReceiver> {
        let mut entries = self.entries.lock();

        if entries.contains_key(&id) {
            return Err(Error::duplicate_request(id));
        }
        if entries.len() >= max_in_flight {
            return Err(Error::TooManyPending {
                pending: entries.len(),
                max: max_in_flight,
            });
        }

        let (sink, rx) = mpsc::channel(self.sink_capacity);
        let failure = FailureSlot::default();
        entries.insert(
            id,
            Entry {
                sink,
                failure: Arc::clone(&failure),
                authenticating: false,
            },
        );
        trace!(request_id = %id, pending = entries.len(), "Registered request");

        Ok(SinkReceiver { rx, failure })
    }

    /// Routes a frame to the sink for `id`.
    ///
    /// A `terminal` frame removes the entry before sending. If the sink is
    /// full, waits up to `max_wait` for the consumer before reporting
    /// [`Delivery::Full`].
    pub(crate) async fn deliver(
        &self,
        id: RequestId,
        item: SinkItem,
        terminal: bool,
        max_wait: Duration,
    ) -> Delivery {
        let sink = {
            let mut entries = self.entries.lock();
            if terminal {
                entries.remove(&id).map(|entry| entry.sink)
            } else {
                entries.get(&id).map(|entry| entry.sink.clone())
            }
        };

        let Some(sink) = sink else {
            return Delivery::Unknown;
        };

        let item = match sink.try_send(item) {
            Ok(()) => return Delivery::Delivered,
            Err(TrySendError::Closed(_)) => {
                self.remove(id);
                return Delivery::Abandoned;
            }
            Err(TrySendError::Full(item)) => item,
        };

        match sink.send_timeout(item, max_wait).await {
            Ok(()) => Delivery::Delivered,
            Err(SendTimeoutError::Closed(_)) => {
                self.remove(id);
                Delivery::Abandoned
            }
            Err(SendTimeoutError::Timeout(_)) => Delivery::Full,
        }
    }

    /// Removes `id` and hands its waiter `error` instead of a frame.
    ///
    /// Returns `false` if `id` was not registered.
    pub fn fail(&self, id: RequestId, error: Error) -> bool {
        let Some(entry) = self.entries.lock().remove(&id) else {
            return false;
        };
        entry.fail(error);
        true
    }

    /// Removes every entry, failing each with an error from `make_error`.
    ///
    /// Returns the number of entries failed.
    pub fn fail_all(&self, make_error: impl Fn() -> Error) -> usize {
        let drained: Vec<_> = self.entries.lock().drain().collect();
        let count = drained.len();

        for (_, entry) in drained {
            entry.fail(make_error());
        }

        if count > 0 {
            debug!(count, "Failed pending requests");
        }
        count
    }

    /// Removes `id` without notifying its waiter.
    ///
    /// Returns `false` if `id` was not registered.
    pub fn remove(&self, id: RequestId) -> bool {
        self.entries.lock().remove(&id).is_some()
    }

    /// Marks `id` as answering a SASL challenge.
    ///
    /// Returns `true` only the first time for a registered id.
    pub(crate) fn begin_authentication(&self, id: RequestId) -> bool {
        match self.entries.lock().get_mut(&id) {
            Some(entry) if !entry.authenticating => {
                entry.authenticating = true;
                true
            }
            _ => false,
        }
    }

    /// Returns `true` if `id` is registered.
    #[inline]
    #[must_use]
    pub fn contains(&self, id: RequestId) -> bool {
        self.entries.lock().contains_key(&id)
    }

    /// Number of registered requests.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// Returns `true` if nothing is registered.
    #[cfg(test)]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

// ============================================================================
// Tests
// ============================================================================
