//! Streamed responses for a single request.
//!
//! [`ResponseStream`] yields one [`AsyncResponse`] per frame, in the order
//! the server sent them, and ends after the final frame or after a single
//! error element. It cannot be restarted.
//!
//! Dropping an unfinished stream removes its correlation entry, so frames
//! that arrive afterwards are discarded by the read loop.

// ============================================================================
// Imports
// ============================================================================

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use futures_util::{Stream, StreamExt};
use tokio::time::{Instant, Sleep, sleep_until};
use tracing::debug;

use crate::error::{Error, Result};
use crate::identifiers::RequestId;
use crate::protocol::{AsyncResponse, Response};

use super::correlation::{CorrelationTable, SinkReceiver};

// ============================================================================
// ResponseStream
// ============================================================================

/// Lazy, finite sequence of response frames for one request.
///
/// # Example
///
/// ```ignore
/// use futures_util::StreamExt;
///
/// let mut stream = connection.submit_streaming(request).await?;
/// while let Some(element) = stream.next().await {
///     let batch = element.into_result()?;
///     println!("{} -> {}", batch.code(), batch.data().as_str());
/// }
/// ```
pub struct ResponseStream {
    request_id: RequestId,
    rx: SinkReceiver,
    table: Arc<CorrelationTable>,
    deadline: Pin<Box<Sleep>>,
    timeout: Duration,
    sequence: usize,
    done: bool,
}

impl ResponseStream {
    pub(crate) fn new(
        request_id: RequestId,
        rx: SinkReceiver,
        table: Arc<CorrelationTable>,
        deadline: Instant,
        timeout: Duration,
    ) -> Self {
        Self {
            request_id,
            rx,
            table,
            deadline: Box::pin(sleep_until(deadline)),
            timeout,
            sequence: 0,
            done: false,
        }
    }

    /// The request this stream belongs to.
    #[inline]
    #[must_use]
    pub fn request_id(&self) -> RequestId {
        self.request_id
    }

    /// Returns `true` once the terminal element has been yielded.
    #[inline]
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.done
    }

    /// Drains the stream into an ordered list of frames.
    ///
    /// # Errors
    ///
    /// Returns the first error element: a server status error, a timeout,
    /// or a connection failure.
    pub async fn collect_all(mut self) -> Result<Vec<Response>> {
        let mut batches = Vec::new();
        while let Some(element) = self.next().await {
            batches.push(element.into_result()?);
        }
        Ok(batches)
    }

    /// Wraps an item with the next sequence number.
    fn emit(&mut self, result: Result<Response>) -> AsyncResponse {
        let element = AsyncResponse {
            sequence: self.sequence,
            result,
        };
        self.sequence += 1;
        if element.is_final() {
            self.done = true;
        }
        element
    }
}

impl Stream for ResponseStream {
    type Item = AsyncResponse;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();

        if this.done {
            return Poll::Ready(None);
        }

        match this.rx.poll_recv(cx) {
            Poll::Ready(Some(item)) => Poll::Ready(Some(this.emit(item))),
            Poll::Ready(None) => {
                // Sink closed with neither a terminal frame nor a parked failure.
                this.table.remove(this.request_id);
                Poll::Ready(Some(this.emit(Err(Error::ConnectionClosed))))
            }
            Poll::Pending => {
                if this.deadline.as_mut().poll(cx).is_pending() {
                    return Poll::Pending;
                }
                this.table.remove(this.request_id);
                debug!(request_id = %this.request_id, "Request deadline expired");
                let err = Error::request_timeout(this.request_id, this.timeout.as_millis() as u64);
                Poll::Ready(Some(this.emit(Err(err))))
            }
        }
    }
}

impl Drop for ResponseStream {
    fn drop(&mut self) {
        if !self.done && self.table.remove(self.request_id) {
            debug!(request_id = %self.request_id, "Stream dropped before final frame");
        }
    }
}

impl std::fmt::Debug for ResponseStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResponseStream")
            .field("request_id", &self.request_id)
            .field("sequence", &self.sequence)
            .field("done", &self.done)
            .finish()
    }
}

// ============================================================================
// Tests
// ============================================================================
