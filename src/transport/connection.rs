//! WebSocket connection and event loop.
//!
//! This module handles one WebSocket session to a Gremlin server,
//! including request/response correlation and partial-result streaming.
//!
//! # Event Loop
//!
//! The connection spawns one tokio task per socket half:
//!
//! - The writer drains the command queue and writes frames one at a time,
//!   including SASL answers (407) and keepalive pings
//! - The reader decodes inbound frames, routes them by `requestId` and
//!   watches for inbound silence
//!
//! A single writer means frames are never interleaved. A single reader
//! means frames for one request reach its consumer in server-send order.
//! A slow consumer can hold up the reader for at most `sink_send_timeout`,
//! and never holds up writes.
//!
//! # Teardown
//!
//! Any transport error, undecodable frame, idle expiry or backpressure
//! fault ends the loop. Every request still registered is then failed
//! with the same error and the state moves to [`ConnectionState::Closed`].

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::future::pending;
use std::sync::Arc;
use std::time::Duration;

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::{Instant, Interval, MissedTickBehavior, interval_at, sleep_until, timeout, timeout_at};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{WebSocketStream, connect_async};
use tracing::{debug, error, trace, warn};
use url::Url;

use crate::client::ConnectionOptions;
use crate::error::{Error, Result};
use crate::identifiers::RequestId;
use crate::protocol::{Codec, Request, Response, StatusCode};

use super::correlation::{CorrelationTable, Delivery};
use super::stream::ResponseStream;

// ============================================================================
// Types
// ============================================================================

/// Write half of the socket, owned by the writer task.
type WsWriter<S> = SplitSink<WebSocketStream<S>, Message>;

/// Read half of the socket, owned by the reader loop.
type WsReader<S> = SplitStream<WebSocketStream<S>>;

/// SASL answer handed from the reader to the writer.
type AuthFrame = (RequestId, Vec<u8>);

// ============================================================================
// Constants
// ============================================================================

/// Stand-in for deadlines too far out to represent.
const FAR_FUTURE: Duration = Duration::from_secs(86_400 * 365 * 30);

// ============================================================================
// ConnectionState
// ============================================================================

/// Lifecycle of a connection.
///
/// `Disconnected → Connecting → Ready → Closing → Closed`. `Connecting`
/// and `Ready` may jump straight to `Closed` on a fatal error. `Closed` is
/// terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    /// Not yet dialed.
    #[default]
    Disconnected,
    /// Handshake in progress.
    Connecting,
    /// Accepting submissions.
    Ready,
    /// Shutdown requested, teardown in progress.
    Closing,
    /// Terminal.
    Closed,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Ready => "ready",
            Self::Closing => "closing",
            Self::Closed => "closed",
        };
        f.write_str(name)
    }
}

// ============================================================================
// ConnectionCommand
// ============================================================================

/// Internal commands for the event loop.
enum ConnectionCommand {
    /// Write an encoded request frame.
    Write {
        request_id: RequestId,
        frame: Vec<u8>,
        written_tx: oneshot::Sender<Result<()>>,
    },
    /// Close the socket and tear down.
    Shutdown,
}

// ============================================================================
// Teardown
// ============================================================================

/// Why the event loop stopped.
#[derive(Debug, Clone)]
enum Teardown {
    /// Local `close()` or all handles dropped.
    Closed,
    /// Read or write failed, or the peer went away.
    Transport(String),
    /// An inbound frame could not be decoded.
    Protocol(String),
    /// No inbound traffic within the idle bound.
    Idle(Duration),
    /// A consumer left its sink full past the allowed wait.
    Backpressure(RequestId),
}

impl Teardown {
    /// Error handed to every request still waiting.
    fn to_error(&self) -> Error {
        match self {
            Self::Closed => Error::ConnectionClosed,
            Self::Transport(message) => Error::connection(message.clone()),
            Self::Protocol(message) => Error::protocol(message.clone()),
            Self::Idle(idle) => Error::connection_timeout(idle.as_millis() as u64),
            Self::Backpressure(id) => {
                Error::connection(format!("response sink for {id} stayed full"))
            }
        }
    }
}

// ============================================================================
// Connection
// ============================================================================

/// WebSocket connection to a Gremlin server.
///
/// Cheap to clone; clones share the same socket and event loop. The loop
/// stops when [`close`](Self::close) is called, on a fatal error, or when
/// the last clone is dropped.
///
/// # Thread Safety
///
/// `Connection` is `Send + Sync`. Any number of tasks may submit
/// concurrently.
#[derive(Clone)]
pub struct Connection {
    /// Channel for sending commands to the event loop.
    command_tx: mpsc::UnboundedSender<ConnectionCommand>,
    /// Correlation table (shared with event loop and streams).
    table: Arc<CorrelationTable>,
    /// Lifecycle state (written by the loop and `close`).
    state: Arc<watch::Sender<ConnectionState>>,
    /// Options the connection was created with.
    options: Arc<ConnectionOptions>,
}

// ============================================================================
// Connection - Constructors
// ============================================================================

impl Connection {
    /// Dials `url` and performs the WebSocket handshake.
    ///
    /// # Errors
    ///
    /// - [`Error::Config`] if the options are inconsistent or the scheme is not `ws`/`wss`
    /// - [`Error::InvalidUrl`] if `url` does not parse
    /// - [`Error::ConnectionTimeout`] if the handshake exceeds `connect_timeout`
    /// - [`Error::Connection`] if the handshake fails
    pub async fn connect(url: &str, options: ConnectionOptions) -> Result<Self> {
        options.validate()?;
        let url = parse_ws_url(url)?;

        let (state, _) = watch::channel(ConnectionState::Disconnected);
        state.send_replace(ConnectionState::Connecting);
        debug!(url = %url, "Connecting");

        let connect_timeout = options.connect_timeout;
        let (ws_stream, _) = timeout(connect_timeout, connect_async(url.as_str()))
            .await
            .map_err(|_| Error::connection_timeout(connect_timeout.as_millis() as u64))?
            .map_err(|e| Error::connection(format!("WebSocket handshake with {url} failed: {e}")))?;

        debug!(url = %url, "WebSocket connection established");
        Ok(Self::spawn(ws_stream, options, state))
    }

    /// Wraps an already-established WebSocket stream.
    ///
    /// Spawns the event loop task internally.
    pub fn new<S>(ws_stream: WebSocketStream<S>, options: ConnectionOptions) -> Self
    where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        let (state, _) = watch::channel(ConnectionState::Connecting);
        Self::spawn(ws_stream, options, state)
    }

    fn spawn<S>(
        ws_stream: WebSocketStream<S>,
        options: ConnectionOptions,
        state: watch::Sender<ConnectionState>,
    ) -> Self
    where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let table = Arc::new(CorrelationTable::new(options.sink_capacity));
        let state = Arc::new(state);
        let options = Arc::new(options);

        state.send_replace(ConnectionState::Ready);

        tokio::spawn(Self::run_event_loop(
            ws_stream,
            command_rx,
            Arc::clone(&table),
            Arc::clone(&state),
            Arc::clone(&options),
        ));

        Self {
            command_tx,
            table,
            state,
            options,
        }
    }
}

// ============================================================================
// Connection - Public API
// ============================================================================

impl Connection {
    /// Submits a request and waits for its complete result.
    ///
    /// Uses the connection's default request timeout.
    ///
    /// # Errors
    ///
    /// See [`submit_with_timeout`](Self::submit_with_timeout).
    pub async fn submit(&self, request: Request) -> Result<Vec<Response>> {
        self.submit_with_timeout(request, self.options.request_timeout)
            .await
    }

    /// Submits a request and waits for its complete result.
    ///
    /// Partial frames are collected in arrival order; the final frame is
    /// the last element.
    ///
    /// # Errors
    ///
    /// - [`Error::EmptyScript`] / [`Error::UnsupportedBinding`] before anything is sent
    /// - [`Error::DuplicateRequest`] if the id is still in flight
    /// - [`Error::Server`] if the server answers with an error status
    /// - [`Error::RequestTimeout`] if no final frame arrives in time
    /// - [`Error::ConnectionClosed`] / [`Error::Connection`] if the connection dies
    pub async fn submit_with_timeout(
        &self,
        request: Request,
        request_timeout: Duration,
    ) -> Result<Vec<Response>> {
        self.submit_streaming_with_timeout(request, request_timeout)
            .await?
            .collect_all()
            .await
    }

    /// Submits a request and returns its frames as a stream.
    ///
    /// Uses the connection's default request timeout.
    ///
    /// # Errors
    ///
    /// See [`submit_streaming_with_timeout`](Self::submit_streaming_with_timeout).
    pub async fn submit_streaming(&self, request: Request) -> Result<ResponseStream> {
        self.submit_streaming_with_timeout(request, self.options.request_timeout)
            .await
    }

    /// Submits a request and returns its frames as a stream.
    ///
    /// Returns once the request frame is written; frames are yielded as
    /// they arrive. `request_timeout` bounds the whole exchange.
    ///
    /// # Errors
    ///
    /// - [`Error::EmptyScript`] / [`Error::UnsupportedBinding`] before anything is sent
    /// - [`Error::DuplicateRequest`] / [`Error::TooManyPending`] on registration
    /// - [`Error::ConnectionClosed`] if the connection is not ready
    /// - [`Error::RequestTimeout`] if the frame could not be written in time
    pub async fn submit_streaming_with_timeout(
        &self,
        request: Request,
        request_timeout: Duration,
    ) -> Result<ResponseStream> {
        let request_id = request.id;

        // Encode first: bad input never reaches the table or the socket.
        let frame = self.options.codec.encode_request(&request)?;

        if !self.is_ready() {
            return Err(Error::ConnectionClosed);
        }

        let deadline = deadline_after(Instant::now(), request_timeout);
        let rx = self.table.register(request_id, self.options.max_in_flight)?;
        let stream = ResponseStream::new(
            request_id,
            rx,
            Arc::clone(&self.table),
            deadline,
            request_timeout,
        );

        let (written_tx, written_rx) = oneshot::channel();
        self.command_tx
            .send(ConnectionCommand::Write {
                request_id,
                frame,
                written_tx,
            })
            .map_err(|_| Error::ConnectionClosed)?;

        // On any error below, dropping `stream` removes the entry.
        match timeout_at(deadline, written_rx).await {
            Ok(Ok(Ok(()))) => Ok(stream),
            Ok(Ok(Err(e))) => Err(e),
            Ok(Err(_)) => Err(Error::ConnectionClosed),
            Err(_) => Err(Error::request_timeout(
                request_id,
                request_timeout.as_millis() as u64,
            )),
        }
    }

    /// Closes the connection.
    ///
    /// Stops the event loop, fails every pending request with
    /// [`Error::ConnectionClosed`] and releases the socket. Returns after
    /// teardown completes. Calling it again is a no-op.
    pub async fn close(&self) {
        let transitioned = self.state.send_if_modified(|state| {
            if matches!(state, ConnectionState::Connecting | ConnectionState::Ready) {
                *state = ConnectionState::Closing;
                true
            } else {
                false
            }
        });

        if !transitioned {
            return;
        }

        // The loop may already be tearing down on its own.
        let _ = self.command_tx.send(ConnectionCommand::Shutdown);
        self.closed().await;
    }

    /// Resolves once the connection reaches [`ConnectionState::Closed`].
    pub async fn closed(&self) {
        let mut rx = self.subscribe_state();
        let _ = rx.wait_for(|state| *state == ConnectionState::Closed).await;
    }

    /// Receiver that observes lifecycle transitions.
    pub(crate) fn subscribe_state(&self) -> watch::Receiver<ConnectionState> {
        self.state.subscribe()
    }

    /// Current lifecycle state.
    #[inline]
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    /// Returns `true` while submissions are accepted.
    #[inline]
    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.state() == ConnectionState::Ready
    }

    /// Number of requests awaiting a terminal frame.
    #[inline]
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.table.len()
    }

    /// Returns `true` if `request_id` is still registered.
    #[inline]
    #[must_use]
    pub fn is_pending(&self, request_id: RequestId) -> bool {
        self.table.contains(request_id)
    }

    /// Options this connection was created with.
    #[inline]
    #[must_use]
    pub fn options(&self) -> &ConnectionOptions {
        &self.options
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("state", &self.state())
            .field("pending", &self.pending_count())
            .finish()
    }
}

// ============================================================================
// Connection - Event Loop
// ============================================================================

impl Connection {
    /// Runs the writer and reader until either stops, then tears down.
    async fn run_event_loop<S>(
        ws_stream: WebSocketStream<S>,
        command_rx: mpsc::UnboundedReceiver<ConnectionCommand>,
        table: Arc<CorrelationTable>,
        state: Arc<watch::Sender<ConnectionState>>,
        options: Arc<ConnectionOptions>,
    ) where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        let (ws_write, ws_read) = ws_stream.split();
        let (auth_tx, auth_rx) = mpsc::unbounded_channel();

        let mut writer = tokio::spawn(Self::run_writer(
            ws_write,
            command_rx,
            auth_rx,
            Arc::clone(&table),
            options.ping_interval,
        ));

        let (reason, writer_running) = tokio::select! {
            reason = Self::run_reader(ws_read, auth_tx, &table, &options) => (reason, true),
            joined = &mut writer => {
                let reason = joined.unwrap_or_else(|e| {
                    Teardown::Transport(format!("writer task failed: {e}"))
                });
                (reason, false)
            }
        };

        state.send_if_modified(|current| {
            if *current == ConnectionState::Closing {
                false
            } else {
                *current = ConnectionState::Closing;
                true
            }
        });

        // Queued writes must not outlive the teardown below.
        if writer_running {
            writer.abort();
            let _ = writer.await;
        }

        let failed = table.fail_all(|| reason.to_error());
        state.send_replace(ConnectionState::Closed);

        match reason {
            Teardown::Closed => debug!(failed, "Connection closed"),
            ref other => warn!(failed, reason = ?other, "Connection torn down"),
        }
    }

    /// Sole writer of the socket.
    ///
    /// Returns when a write fails, on shutdown, or once every handle is
    /// dropped.
    async fn run_writer<S>(
        mut ws_write: WsWriter<S>,
        mut command_rx: mpsc::UnboundedReceiver<ConnectionCommand>,
        mut auth_rx: mpsc::UnboundedReceiver<AuthFrame>,
        table: Arc<CorrelationTable>,
        ping_interval: Option<Duration>,
    ) -> Teardown
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let mut ping = ping_interval.map(|period| {
            let mut ticker = interval_at(deadline_after(Instant::now(), period), period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            ticker
        });

        loop {
            tokio::select! {
                // Commands from the public API
                command = command_rx.recv() => {
                    match command {
                        Some(ConnectionCommand::Write { request_id, frame, written_tx }) => {
                            match ws_write.send(Message::Binary(frame.into())).await {
                                Ok(()) => {
                                    trace!(%request_id, "Request sent");
                                    let _ = written_tx.send(Ok(()));
                                }
                                Err(e) => {
                                    let message = e.to_string();
                                    error!(%request_id, error = %message, "WebSocket write failed");
                                    table.fail(request_id, Error::connection(message.clone()));
                                    let _ = written_tx.send(Err(Error::connection(message.clone())));
                                    return Teardown::Transport(message);
                                }
                            }
                        }

                        Some(ConnectionCommand::Shutdown) => {
                            debug!("Shutdown command received");
                            let _ = ws_write.close().await;
                            return Teardown::Closed;
                        }

                        None => {
                            debug!("All connection handles dropped");
                            let _ = ws_write.close().await;
                            return Teardown::Closed;
                        }
                    }
                }

                // SASL answers from the reader
                Some((request_id, frame)) = auth_rx.recv() => {
                    if let Err(e) = ws_write.send(Message::Binary(frame.into())).await {
                        error!(%request_id, error = %e, "Failed to send authentication");
                        return Teardown::Transport(e.to_string());
                    }
                    debug!(%request_id, "Answered authentication challenge");
                }

                // Keepalive
                () = next_tick(&mut ping) => {
                    trace!("Sending keepalive ping");
                    if let Err(e) = ws_write.send(Message::Ping(Default::default())).await {
                        error!(error = %e, "Keepalive ping failed");
                        return Teardown::Transport(e.to_string());
                    }
                }
            }
        }
    }

    /// Sole reader of the socket.
    ///
    /// Returns the reason the connection became unusable.
    async fn run_reader<S>(
        mut ws_read: WsReader<S>,
        auth_tx: mpsc::UnboundedSender<AuthFrame>,
        table: &CorrelationTable,
        options: &ConnectionOptions,
    ) -> Teardown
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let mut last_inbound = Instant::now();

        loop {
            tokio::select! {
                // Incoming frames from the server
                message = ws_read.next() => {
                    let message = match message {
                        Some(Ok(message)) => message,
                        Some(Err(e)) => {
                            error!(error = %e, "WebSocket read failed");
                            return Teardown::Transport(e.to_string());
                        }
                        None => {
                            debug!("WebSocket stream ended");
                            return Teardown::Transport("connection closed by server".to_string());
                        }
                    };
                    last_inbound = Instant::now();

                    let decoded = match message {
                        Message::Binary(bytes) => options.codec.decode_response(&bytes),
                        Message::Text(text) => Codec::decode_response_body(text.as_str().as_bytes()),
                        Message::Close(frame) => {
                            debug!(?frame, "WebSocket closed by server");
                            return Teardown::Transport("connection closed by server".to_string());
                        }
                        // Ping, Pong, raw frames: traffic only
                        _ => continue,
                    };

                    let response = match decoded {
                        Ok(response) => response,
                        Err(e) => {
                            error!(error = %e, "Undecodable frame, dropping connection");
                            return Teardown::Protocol(e.to_string());
                        }
                    };

                    if let Some(reason) = Self::dispatch(response, &auth_tx, table, options).await {
                        return reason;
                    }
                }

                // Inbound silence
                () = idle_expired(last_inbound, options.idle_timeout) => {
                    let idle = options.idle_timeout.unwrap_or_default();
                    warn!(idle_ms = idle.as_millis() as u64, "No traffic within idle bound");
                    return Teardown::Idle(idle);
                }
            }
        }
    }

    /// Routes one decoded frame.
    ///
    /// Returns a teardown reason if the frame made the connection unusable.
    async fn dispatch(
        response: Response,
        auth_tx: &mpsc::UnboundedSender<AuthFrame>,
        table: &CorrelationTable,
        options: &ConnectionOptions,
    ) -> Option<Teardown> {
        let request_id = response.request_id;
        let code = response.code();

        if code == StatusCode::AUTHENTICATE
            && let Some(credentials) = &options.credentials
            && table.begin_authentication(request_id)
        {
            let frame = match options
                .codec
                .encode_authentication(request_id, &credentials.sasl_token())
            {
                Ok(frame) => frame,
                Err(e) => {
                    table.fail(request_id, e);
                    return None;
                }
            };

            if auth_tx.send((request_id, frame)).is_err() {
                return Some(Teardown::Transport("writer stopped".to_string()));
            }
            return None;
        }

        let terminal = response.is_final();
        let item = response.into_result();

        match table
            .deliver(request_id, item, terminal, options.sink_send_timeout)
            .await
        {
            Delivery::Delivered => {
                trace!(%request_id, code = code.as_u16(), terminal, "Frame delivered");
                None
            }
            Delivery::Unknown => {
                warn!(%request_id, code = code.as_u16(), "Frame for unknown request dropped");
                None
            }
            Delivery::Abandoned => {
                debug!(%request_id, "Consumer gone, request abandoned");
                None
            }
            Delivery::Full => {
                error!(%request_id, "Consumer too slow, dropping connection");
                Some(Teardown::Backpressure(request_id))
            }
        }
    }
}

// ============================================================================
// Helpers
// ============================================================================

/// Parses a server URL, accepting only `ws` and `wss`.
pub(crate) fn parse_ws_url(url: &str) -> Result<Url> {
    let url = Url::parse(url)?;
    match url.scheme() {
        "ws" | "wss" => Ok(url),
        other => Err(Error::config(format!(
            "unsupported scheme '{other}', expected ws or wss"
        ))),
    }
}

/// Waits for the next keepalive tick, or forever if pings are disabled.
async fn next_tick(ping: &mut Option<Interval>) {
    match ping {
        Some(ticker) => {
            ticker.tick().await;
        }
        None => pending::<()>().await,
    }
}

/// `start + span`, clamped to a far-future instant instead of overflowing.
fn deadline_after(start: Instant, span: Duration) -> Instant {
    start
        .checked_add(span)
        .or_else(|| start.checked_add(FAR_FUTURE))
        .unwrap_or(start)
}

/// Resolves when `idle` has passed since `last_inbound`, or never.
async fn idle_expired(last_inbound: Instant, idle: Option<Duration>) {
    match idle {
        Some(idle) => sleep_until(deadline_after(last_inbound, idle)).await,
        None => pending::<()>().await,
    }
}

// ============================================================================
// Tests
// ============================================================================
