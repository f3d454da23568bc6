//! Scripted Gremlin server for tests.
//!
//! Binds `127.0.0.1:0`, accepts any number of WebSocket clients and answers
//! each inbound frame with the actions returned by a handler closure.
//! Actions for one frame run on their own task, so replies to concurrent
//! requests interleave on the wire.

// ============================================================================
// Imports
// ============================================================================

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tracing::debug;
use tracing_subscriber::EnvFilter;

use crate::protocol::codec::ClientMessage;
use crate::protocol::{Codec, Response};

// ============================================================================
// Types
// ============================================================================

/// Frame seen by the mock server.
pub(crate) type Inbound = ClientMessage;

/// What the server does in reply to one inbound frame.
#[derive(Debug, Clone)]
pub(crate) enum Action {
    /// Send an encoded response frame.
    Reply(Response),
    /// Pause before the next action.
    Delay(Duration),
    /// Send nothing.
    Silence,
    /// Close the WebSocket.
    Close,
    /// Send raw bytes as a binary frame.
    Raw(Vec<u8>),
}

type Handler = Arc<dyn Fn(Inbound) -> Vec<Action> + Send + Sync>;

/// Writer-task command.
enum Outbound {
    Frame(Message),
    Close,
}

struct Shared {
    handler: Handler,
    codec: Codec,
    frames: AtomicUsize,
    accepted: AtomicUsize,
    sessions: Mutex<Vec<JoinHandle<()>>>,
}

// ============================================================================
// Functions
// ============================================================================

/// Installs a test log subscriber once; `RUST_LOG` picks the level.
pub(crate) fn init_logging() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("gremlin_socket=warn"));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_test_writer()
        .try_init();
}

// ============================================================================
// MockServer
// ============================================================================

pub(crate) struct MockServer {
    addr: SocketAddr,
    shared: Arc<Shared>,
    accept_task: JoinHandle<()>,
}

impl MockServer {
    /// Starts a server that answers with `handler`.
    pub(crate) async fn start<F>(handler: F) -> Self
    where
        F: Fn(Inbound) -> Vec<Action> + Send + Sync + 'static,
    {
        init_logging();

        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind mock server");
        let addr = listener.local_addr().expect("mock server address");

        let shared = Arc::new(Shared {
            handler: Arc::new(handler),
            codec: Codec::default(),
            frames: AtomicUsize::new(0),
            accepted: AtomicUsize::new(0),
            sessions: Mutex::new(Vec::new()),
        });

        let accept_task = tokio::spawn(accept_loop(listener, Arc::clone(&shared)));
        debug!(%addr, "Mock server bound");

        Self {
            addr,
            shared,
            accept_task,
        }
    }

    /// `ws://` URL clients should dial.
    pub(crate) fn url(&self) -> String {
        format!("ws://{}/gremlin", self.addr)
    }

    /// Client frames decoded so far, across all sessions.
    pub(crate) fn frames_received(&self) -> usize {
        self.shared.frames.load(Ordering::SeqCst)
    }

    /// WebSocket sessions accepted so far.
    pub(crate) fn connections_accepted(&self) -> usize {
        self.shared.accepted.load(Ordering::SeqCst)
    }

    /// Stops accepting and drops every open session.
    pub(crate) fn shutdown(&self) {
        self.accept_task.abort();
        for session in self.shared.sessions.lock().drain(..) {
            session.abort();
        }
    }
}

impl Drop for MockServer {
    fn drop(&mut self) {
        self.shutdown();
    }
}

// ============================================================================
// Accept Loop
// ============================================================================

async fn accept_loop(listener: TcpListener, shared: Arc<Shared>) {
    while let Ok((stream, addr)) = listener.accept().await {
        let session = tokio::spawn(serve(stream, addr, Arc::clone(&shared)));
        shared.sessions.lock().push(session);
    }
}

async fn serve(stream: TcpStream, addr: SocketAddr, shared: Arc<Shared>) {
    let Ok(ws_stream) = tokio_tungstenite::accept_async(stream).await else {
        return;
    };
    shared.accepted.fetch_add(1, Ordering::SeqCst);
    debug!(?addr, "Mock session accepted");

    let (mut ws_write, mut ws_read) = ws_stream.split();
    let (out_tx, mut out_rx) = mpsc::unbounded_channel();

    let writer = tokio::spawn(async move {
        while let Some(outbound) = out_rx.recv().await {
            match outbound {
                Outbound::Frame(message) => {
                    if ws_write.send(message).await.is_err() {
                        break;
                    }
                }
                Outbound::Close => {
                    let _ = ws_write.close().await;
                    break;
                }
            }
        }
    });
    shared.sessions.lock().push(writer);

    while let Some(Ok(message)) = ws_read.next().await {
        let bytes = match message {
            Message::Binary(bytes) => bytes,
            Message::Ping(payload) => {
                let _ = out_tx.send(Outbound::Frame(Message::Pong(payload)));
                continue;
            }
            Message::Close(_) => break,
            _ => continue,
        };

        let Ok(inbound) = shared.codec.decode_client_message(&bytes) else {
            continue;
        };
        shared.frames.fetch_add(1, Ordering::SeqCst);

        let actions = (shared.handler)(inbound);
        let out_tx = out_tx.clone();
        let codec = shared.codec.clone();
        tokio::spawn(async move {
            for action in actions {
                let outbound = match action {
                    Action::Reply(response) => match codec.encode_response(&response) {
                        Ok(frame) => Outbound::Frame(Message::Binary(frame.into())),
                        Err(_) => continue,
                    },
                    Action::Raw(bytes) => Outbound::Frame(Message::Binary(bytes.into())),
                    Action::Delay(pause) => {
                        tokio::time::sleep(pause).await;
                        continue;
                    }
                    Action::Silence => continue,
                    Action::Close => Outbound::Close,
                };
                if out_tx.send(outbound).is_err() {
                    break;
                }
            }
        });
    }

    let _ = out_tx.send(Outbound::Close);
}
