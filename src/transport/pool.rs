//! Connection pool over several WebSocket sessions.
//!
//! Holds a fixed number of [`Connection`]s to one server and spreads
//! submissions across them round-robin.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────┐
//! │             ConnectionPool               │
//! │  cursor ──► ┌──────────────────────────┐ │
//! │             │ #0 Connection  healthy   │ │
//! │             │ #1 Connection  unhealthy │─┼──► close + replace (async)
//! │             │ #2 Connection  healthy   │ │
//! │             └──────────────────────────┘ │
//! └──────────────────────────────────────────┘
//! ```
//!
//! # Health
//!
//! A member is demoted when a submission on it fails with a connection
//! error, or when its connection reaches `Closed` for any reason. Demoted
//! members are skipped by selection. If replacement is enabled, a fresh
//! connection is dialed in the background with exponential backoff and
//! swapped into the same slot under the membership write lock.
//!
//! The pool never retries a failed submission.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

use futures_util::future::{join_all, try_join_all};
use parking_lot::{Mutex, RwLock};
use tracing::{debug, error, info, warn};

use crate::client::{ConnectionOptions, PoolBuilder};
use crate::error::{Error, Result};
use crate::identifiers::{IdGenerator, UuidGenerator};
use crate::protocol::{Request, Response};

use super::connection::{Connection, ConnectionState, parse_ws_url};
use super::stream::ResponseStream;

// ============================================================================
// Constants
// ============================================================================

/// Members in a pool unless configured otherwise.
pub const DEFAULT_POOL_SIZE: usize = 4;

/// First delay between replacement attempts.
pub const DEFAULT_RECONNECT_DELAY: Duration = Duration::from_millis(100);

/// Ceiling for the replacement backoff.
pub const DEFAULT_MAX_RECONNECT_DELAY: Duration = Duration::from_secs(5);

/// Replacement attempts before a slot is given up.
pub const DEFAULT_MAX_RECONNECT_ATTEMPTS: u32 = 5;

// ============================================================================
// PoolConfig
// ============================================================================

/// Pool sizing and replacement policy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolConfig {
    /// Number of members.
    pub size: usize,
    /// Dial a fresh connection when a member dies.
    pub replace_dead: bool,
    /// First backoff delay.
    pub reconnect_delay: Duration,
    /// Backoff ceiling.
    pub max_reconnect_delay: Duration,
    /// Attempts per dead member (`None` retries forever).
    pub max_reconnect_attempts: Option<u32>,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            size: DEFAULT_POOL_SIZE,
            replace_dead: true,
            reconnect_delay: DEFAULT_RECONNECT_DELAY,
            max_reconnect_delay: DEFAULT_MAX_RECONNECT_DELAY,
            max_reconnect_attempts: Some(DEFAULT_MAX_RECONNECT_ATTEMPTS),
        }
    }
}

impl PoolConfig {
    /// Checks the policy for consistency.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] for an empty pool, a zero delay, or a
    /// ceiling below the initial delay.
    pub fn validate(&self) -> Result<()> {
        if self.size == 0 {
            return Err(Error::config("pool size must be at least 1"));
        }
        if self.reconnect_delay.is_zero() {
            return Err(Error::config("reconnect_delay must be non-zero"));
        }
        if self.max_reconnect_delay < self.reconnect_delay {
            return Err(Error::config(
                "max_reconnect_delay must not be shorter than reconnect_delay",
            ));
        }
        Ok(())
    }
}

// ============================================================================
// Member
// ============================================================================

/// One pool slot.
struct Member {
    index: usize,
    connection: Connection,
    healthy: AtomicBool,
    /// Set once replacement (or giving up) has been decided for this member.
    retired: AtomicBool,
    last_used: Mutex<Instant>,
}

impl Member {
    fn new(index: usize, connection: Connection) -> Arc<Self> {
        Arc::new(Self {
            index,
            connection,
            healthy: AtomicBool::new(true),
            retired: AtomicBool::new(false),
            last_used: Mutex::new(Instant::now()),
        })
    }

    fn is_available(&self) -> bool {
        self.healthy.load(Ordering::Acquire) && self.connection.is_ready()
    }

    fn status(&self) -> MemberStatus {
        MemberStatus {
            index: self.index,
            healthy: self.healthy.load(Ordering::Acquire),
            state: self.connection.state(),
            pending: self.connection.pending_count(),
            last_used: *self.last_used.lock(),
        }
    }
}

/// Point-in-time view of one pool member.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemberStatus {
    /// Slot index.
    pub index: usize,
    /// Whether selection will consider this member.
    pub healthy: bool,
    /// Connection lifecycle state.
    pub state: ConnectionState,
    /// Requests in flight on the member.
    pub pending: usize,
    /// Last time the member was selected.
    pub last_used: Instant,
}

// ============================================================================
// ConnectionPool
// ============================================================================

/// Fixed-size set of connections to one Gremlin server.
///
/// Offers the same submission calls as [`Connection`]. Thread-safe; share
/// it behind the returned `Arc`.
///
/// # Example
///
/// ```ignore
/// let pool = ConnectionPool::builder()
///     .url("ws://localhost:8182/gremlin")
///     .size(4)
///     .build()
///     .await?;
///
/// let batches = pool.submit(Request::eval("g.V().count()")).await?;
/// pool.close().await;
/// ```
pub struct ConnectionPool {
    url: String,
    options: ConnectionOptions,
    config: PoolConfig,
    id_generator: Arc<dyn IdGenerator>,
    members: RwLock<Vec<Arc<Member>>>,
    cursor: AtomicUsize,
    closed: AtomicBool,
}

// ============================================================================
// ConnectionPool - Constructors
// ============================================================================

impl ConnectionPool {
    /// Returns a builder for configuring a pool.
    #[inline]
    #[must_use]
    pub fn builder() -> PoolBuilder {
        PoolBuilder::new()
    }

    /// Connects every member and starts health monitoring.
    ///
    /// # Errors
    ///
    /// - [`Error::Config`] / [`Error::InvalidUrl`] for bad settings
    /// - Any connect error from the first member that fails to connect
    pub async fn connect(
        url: &str,
        options: ConnectionOptions,
        config: PoolConfig,
    ) -> Result<Arc<Self>> {
        Self::connect_with_generator(url, options, config, Arc::new(UuidGenerator)).await
    }

    /// Like [`connect`](Self::connect), minting `execute*` request ids
    /// from `id_generator`.
    ///
    /// # Errors
    ///
    /// See [`connect`](Self::connect).
    pub async fn connect_with_generator(
        url: &str,
        options: ConnectionOptions,
        config: PoolConfig,
        id_generator: Arc<dyn IdGenerator>,
    ) -> Result<Arc<Self>> {
        config.validate()?;
        options.validate()?;
        let url = parse_ws_url(url)?.to_string();

        debug!(url = %url, size = config.size, "Connecting pool members");

        let connections = try_join_all(
            (0..config.size).map(|_| Connection::connect(&url, options.clone())),
        )
        .await?;

        let members = connections
            .into_iter()
            .enumerate()
            .map(|(index, connection)| Member::new(index, connection))
            .collect::<Vec<_>>();

        let pool = Arc::new(Self {
            url,
            options,
            config,
            id_generator,
            members: RwLock::new(members.clone()),
            cursor: AtomicUsize::new(0),
            closed: AtomicBool::new(false),
        });

        for member in &members {
            pool.monitor(member);
        }

        info!(url = %pool.url, size = pool.config.size, "ConnectionPool started");
        Ok(pool)
    }
}

// ============================================================================
// ConnectionPool - Public API
// ============================================================================

impl ConnectionPool {
    /// Submits through the next healthy member and waits for all frames.
    ///
    /// # Errors
    ///
    /// - [`Error::PoolExhausted`] if no member is healthy
    /// - Anything [`Connection::submit_with_timeout`] returns
    pub async fn submit(&self, request: Request) -> Result<Vec<Response>> {
        self.submit_with_timeout(request, self.options.request_timeout)
            .await
    }

    /// Like [`submit`](Self::submit) with an explicit deadline.
    ///
    /// # Errors
    ///
    /// See [`submit`](Self::submit).
    pub async fn submit_with_timeout(
        &self,
        request: Request,
        request_timeout: Duration,
    ) -> Result<Vec<Response>> {
        let member = self.select()?;
        let result = member
            .connection
            .submit_with_timeout(request, request_timeout)
            .await;
        if let Err(e) = &result {
            self.observe_failure(&member, e);
        }
        result
    }

    /// Submits through the next healthy member and streams the frames.
    ///
    /// # Errors
    ///
    /// - [`Error::PoolExhausted`] if no member is healthy
    /// - Anything [`Connection::submit_streaming_with_timeout`] returns
    pub async fn submit_streaming(&self, request: Request) -> Result<ResponseStream> {
        self.submit_streaming_with_timeout(request, self.options.request_timeout)
            .await
    }

    /// Like [`submit_streaming`](Self::submit_streaming) with an explicit deadline.
    ///
    /// # Errors
    ///
    /// See [`submit_streaming`](Self::submit_streaming).
    pub async fn submit_streaming_with_timeout(
        &self,
        request: Request,
        request_timeout: Duration,
    ) -> Result<ResponseStream> {
        let member = self.select()?;
        let result = member
            .connection
            .submit_streaming_with_timeout(request, request_timeout)
            .await;
        if let Err(e) = &result {
            self.observe_failure(&member, e);
        }
        result
    }

    /// Closes every member. Calling it again is a no-op.
    pub async fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }

        info!(url = %self.url, "ConnectionPool shutting down");

        let members: Vec<_> = self.members.read().clone();
        for member in &members {
            member.healthy.store(false, Ordering::Release);
        }
        join_all(members.iter().map(|member| member.connection.close())).await;

        info!(url = %self.url, "ConnectionPool shutdown complete");
    }

    /// Returns `true` once [`close`](Self::close) has been called.
    #[inline]
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Configured number of members.
    #[inline]
    #[must_use]
    pub fn size(&self) -> usize {
        self.config.size
    }

    /// Members currently eligible for selection.
    #[must_use]
    pub fn healthy_count(&self) -> usize {
        self.members
            .read()
            .iter()
            .filter(|member| member.is_available())
            .count()
    }

    /// Snapshot of every member.
    #[must_use]
    pub fn members(&self) -> Vec<MemberStatus> {
        self.members.read().iter().map(|member| member.status()).collect()
    }

    /// Server URL the members dial.
    #[inline]
    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Options every member was created with.
    #[inline]
    #[must_use]
    pub fn options(&self) -> &ConnectionOptions {
        &self.options
    }

    /// Generator for ids of requests built by the pool.
    #[inline]
    #[must_use]
    pub fn id_generator(&self) -> &dyn IdGenerator {
        self.id_generator.as_ref()
    }
}

impl fmt::Debug for ConnectionPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionPool")
            .field("url", &self.url)
            .field("size", &self.config.size)
            .field("healthy", &self.healthy_count())
            .field("closed", &self.is_closed())
            .finish()
    }
}

// ============================================================================
// ConnectionPool - Selection
// ============================================================================

impl ConnectionPool {
    /// Picks the next healthy member, starting from the rotating cursor.
    fn select(&self) -> Result<Arc<Member>> {
        if self.is_closed() {
            return Err(Error::ConnectionClosed);
        }

        let members = self.members.read();
        let count = members.len();
        let start = self.cursor.fetch_add(1, Ordering::Relaxed);

        for offset in 0..count {
            // Reduce first: the cursor wraps at usize::MAX.
            let member = &members[(start % count + offset) % count];
            if member.is_available() {
                *member.last_used.lock() = Instant::now();
                return Ok(Arc::clone(member));
            }
        }

        warn!(size = count, "No healthy pool member");
        Err(Error::pool_exhausted(count))
    }

    /// Demotes `member` if `error` means its connection is unusable.
    fn observe_failure(&self, member: &Arc<Member>, error: &Error) {
        if !error.is_connection_error() {
            return;
        }

        if member.healthy.swap(false, Ordering::AcqRel) {
            warn!(member = member.index, error = %error, "Pool member demoted");
            let connection = member.connection.clone();
            // Reaching Closed wakes the monitor, which handles replacement.
            tokio::spawn(async move { connection.close().await });
        }
    }
}

// ============================================================================
// ConnectionPool - Health & Replacement
// ============================================================================

impl ConnectionPool {
    /// Watches `member` and retires it once its connection closes.
    fn monitor(self: &Arc<Self>, member: &Arc<Member>) {
        let pool = Arc::downgrade(self);
        let weak_member = Arc::downgrade(member);
        let mut state = member.connection.subscribe_state();

        tokio::spawn(async move {
            let _ = state
                .wait_for(|state| *state == ConnectionState::Closed)
                .await;

            if let (Some(pool), Some(member)) = (pool.upgrade(), weak_member.upgrade()) {
                pool.retire(&member);
            }
        });
    }

    /// Takes a closed member out of rotation and schedules its replacement.
    fn retire(self: &Arc<Self>, member: &Arc<Member>) {
        member.healthy.store(false, Ordering::Release);

        if self.is_closed() || member.retired.swap(true, Ordering::AcqRel) {
            return;
        }

        warn!(member = member.index, "Pool member closed");

        if self.config.replace_dead {
            tokio::spawn(Self::replace(Arc::downgrade(self), Arc::clone(member)));
        }
    }

    /// Dials a successor for `dead` with exponential backoff.
    async fn replace(pool: Weak<Self>, dead: Arc<Member>) {
        let index = dead.index;
        let mut attempt: u32 = 0;

        let Some((mut delay, max_delay, max_attempts)) = pool.upgrade().map(|pool| {
            (
                pool.config.reconnect_delay,
                pool.config.max_reconnect_delay,
                pool.config.max_reconnect_attempts,
            )
        }) else {
            return;
        };

        loop {
            tokio::time::sleep(delay).await;
            attempt += 1;

            let Some(strong) = pool.upgrade() else {
                return;
            };
            if strong.is_closed() {
                return;
            }

            debug!(member = index, attempt, "Replacing pool member");
            match Connection::connect(&strong.url, strong.options.clone()).await {
                Ok(connection) => {
                    strong.install(&dead, connection).await;
                    return;
                }
                Err(e) => {
                    warn!(member = index, attempt, error = %e, "Replacement connect failed");
                }
            }

            if max_attempts.is_some_and(|max| attempt >= max) {
                error!(member = index, attempt, "Giving up on pool member");
                return;
            }
            delay = delay.saturating_mul(2).min(max_delay);
        }
    }

    /// Swaps `connection` into the slot held by `dead`.
    async fn install(self: &Arc<Self>, dead: &Arc<Member>, connection: Connection) {
        let successor = Member::new(dead.index, connection);

        let installed = {
            let mut members = self.members.write();
            match members.get_mut(dead.index) {
                Some(slot) if Arc::ptr_eq(slot, dead) && !self.is_closed() => {
                    *slot = Arc::clone(&successor);
                    true
                }
                _ => false,
            }
        };

        if installed {
            self.monitor(&successor);
            info!(member = dead.index, "Pool member replaced");
        } else {
            successor.connection.close().await;
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use serde_json::json;

    use crate::protocol::{ResultData, StatusCode};
    use crate::transport::mock::{Action, Inbound, MockServer};

    fn quiet() -> ConnectionOptions {
        ConnectionOptions::new().without_ping().without_idle_timeout()
    }

    fn config(size: usize, replace_dead: bool) -> PoolConfig {
        PoolConfig {
            size,
            replace_dead,
            reconnect_delay: Duration::from_millis(10),
            max_reconnect_delay: Duration::from_millis(50),
            max_reconnect_attempts: Some(3),
        }
    }

    /// Echoes the script, or closes the session when it is `die`.
    fn handler(inbound: Inbound) -> Vec<Action> {
        match inbound {
            Inbound::Eval(request) if request.script == "die" => vec![Action::Close],
            Inbound::Eval(request) => vec![Action::Reply(Response::new(
                request.id,
                StatusCode::SUCCESS,
                ResultData::from_json(&json!([request.script])).expect("data"),
            ))],
            Inbound::Authentication { .. } => Vec::new(),
        }
    }

    async fn eventually(mut check: impl FnMut() -> bool) {
        for _ in 0..200 {
            if check() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("condition not reached");
    }

    #[test]
    fn test_config_validation() {
        assert!(PoolConfig::default().validate().is_ok());
        assert!(config(0, true).validate().is_err());

        let inverted = PoolConfig {
            max_reconnect_delay: Duration::from_millis(1),
            ..config(2, true)
        };
        assert!(inverted.validate().is_err());
    }

    #[tokio::test]
    async fn test_connects_all_members() {
        let server = MockServer::start(handler).await;
        let pool = ConnectionPool::connect(&server.url(), quiet(), config(3, false))
            .await
            .expect("pool");

        assert_eq!(pool.size(), 3);
        assert_eq!(pool.healthy_count(), 3);
        assert_eq!(server.connections_accepted(), 3);

        let indexes: Vec<_> = pool.members().iter().map(|m| m.index).collect();
        assert_eq!(indexes, vec![0, 1, 2]);
        pool.close().await;
    }

    #[tokio::test]
    async fn test_round_robin_is_fair() {
        let server = MockServer::start(handler).await;
        let pool = ConnectionPool::connect(&server.url(), quiet(), config(3, false))
            .await
            .expect("pool");

        let picks: Vec<_> = (0..6)
            .map(|_| pool.select().expect("select").index)
            .collect();
        assert_eq!(picks, vec![0, 1, 2, 0, 1, 2]);
        pool.close().await;
    }

    #[tokio::test]
    async fn test_select_after_cursor_wraps() {
        let server = MockServer::start(handler).await;
        let pool = ConnectionPool::connect(&server.url(), quiet(), config(3, false))
            .await
            .expect("pool");

        // Member 0 dies, so selection has to step past it.
        let err = pool.submit(Request::eval("die")).await.unwrap_err();
        assert!(err.is_connection_error());

        pool.cursor.store(usize::MAX, Ordering::Relaxed);
        let first = usize::MAX % 3;
        let expected = if first == 0 { 1 } else { first };
        assert_eq!(pool.select().expect("select").index, expected);
        // Cursor is now 0: member 0 is skipped again.
        assert_eq!(pool.select().expect("select").index, 1);
        pool.close().await;
    }

    #[tokio::test]
    async fn test_survives_all_but_one_dead() {
        let server = MockServer::start(handler).await;
        let pool = ConnectionPool::connect(&server.url(), quiet(), config(3, false))
            .await
            .expect("pool");

        for _ in 0..2 {
            let err = pool.submit(Request::eval("die")).await.unwrap_err();
            assert!(err.is_connection_error());
        }
        assert_eq!(pool.healthy_count(), 1);

        for n in 0..5 {
            let script = format!("g.V().limit({n})");
            let batches = pool.submit(Request::eval(script.clone())).await.expect("submit");
            let data: Vec<String> = batches[0].data().decode().expect("decode");
            assert_eq!(data, vec![script]);
        }
        pool.close().await;
    }

    #[tokio::test]
    async fn test_dead_member_is_replaced() {
        let server = MockServer::start(handler).await;
        let pool = ConnectionPool::connect(&server.url(), quiet(), config(2, true))
            .await
            .expect("pool");

        assert!(pool.submit(Request::eval("die")).await.is_err());

        eventually(|| pool.healthy_count() == 2).await;
        assert_eq!(server.connections_accepted(), 3);
        assert!(pool.members().iter().all(|m| m.state == ConnectionState::Ready));
        pool.close().await;
    }

    #[tokio::test]
    async fn test_exhausted_when_no_member_healthy() {
        let server = MockServer::start(handler).await;
        let pool = ConnectionPool::connect(&server.url(), quiet(), config(2, false))
            .await
            .expect("pool");

        server.shutdown();
        eventually(|| pool.healthy_count() == 0).await;

        let err = pool.submit(Request::eval("g.V()")).await.unwrap_err();
        assert!(matches!(err, Error::PoolExhausted { size: 2 }));
        pool.close().await;
    }

    #[tokio::test]
    async fn test_server_error_keeps_member_healthy() {
        let server = MockServer::start(|inbound| match inbound {
            Inbound::Eval(request) => vec![Action::Reply(Response::error(
                request.id,
                StatusCode::SERVER_ERROR,
                "boom",
            ))],
            Inbound::Authentication { .. } => Vec::new(),
        })
        .await;
        let pool = ConnectionPool::connect(&server.url(), quiet(), config(2, false))
            .await
            .expect("pool");

        let err = pool.submit(Request::eval("g.V()")).await.unwrap_err();
        assert!(err.is_server_error());
        assert_eq!(pool.healthy_count(), 2);
        pool.close().await;
    }

    #[tokio::test]
    async fn test_close_is_idempotent() {
        let server = MockServer::start(handler).await;
        let pool = ConnectionPool::connect(&server.url(), quiet(), config(2, true))
            .await
            .expect("pool");

        pool.close().await;
        pool.close().await;

        assert!(pool.is_closed());
        assert_eq!(pool.healthy_count(), 0);
        assert!(pool.members().iter().all(|m| m.state == ConnectionState::Closed));
        assert!(matches!(
            pool.submit(Request::eval("g.V()")).await,
            Err(Error::ConnectionClosed)
        ));

        // No replacement after an explicit close.
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(server.connections_accepted(), 2);
    }

    #[tokio::test]
    async fn test_initial_connect_failure_fails_pool() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let port = listener.local_addr().expect("addr").port();
        drop(listener);

        let err = ConnectionPool::connect(
            &format!("ws://127.0.0.1:{port}/gremlin"),
            quiet(),
            config(2, true),
        )
        .await
        .unwrap_err();
        assert!(err.is_connection_error());
    }

    #[tokio::test]
    async fn test_rejects_non_websocket_url() {
        let err = ConnectionPool::connect("http://localhost:8182", quiet(), config(1, false))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Config { .. }));
    }
}
