//! Client-facing API.
//!
//! [`Executor`] is the submission contract shared by a single
//! [`Connection`] and a [`ConnectionPool`], so callers can switch between
//! them without code changes. It also carries the convenience calls that
//! build a [`Request`] from a script string or a [`ScriptSource`].
//!
//! # Example
//!
//! ```no_run
//! use gremlin_socket::{ConnectionPool, Executor, Value};
//! use gremlin_socket::protocol::Bindings;
//!
//! # async fn example() -> gremlin_socket::Result<()> {
//! let pool = ConnectionPool::builder()
//!     .url("ws://localhost:8182/gremlin")
//!     .build()
//!     .await?;
//!
//! let mut bindings = Bindings::new();
//! bindings.insert("name".into(), Value::from("marko"));
//! let batches = pool
//!     .execute_with_bindings("g.V().has('name', name)", bindings, Default::default())
//!     .await?;
//!
//! for batch in &batches {
//!     println!("{}", batch.data().as_str());
//! }
//! pool.close().await;
//! # Ok(())
//! # }
//! ```

// ============================================================================
// Submodules
// ============================================================================

/// Pool builder.
pub mod builder;

/// Connection options and credentials.
pub mod options;

/// Script sources.
pub mod script;

// ============================================================================
// Imports
// ============================================================================

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;

use crate::error::Result;
use crate::identifiers::{IdGenerator, UuidGenerator};
use crate::protocol::{Bindings, Request, Response};
use crate::transport::{Connection, ConnectionPool, ResponseStream};

// ============================================================================
// Re-exports
// ============================================================================

pub use builder::PoolBuilder;
pub use options::{
    ConnectionOptions, Credentials, DEFAULT_CONNECT_TIMEOUT, DEFAULT_IDLE_TIMEOUT,
    DEFAULT_MAX_IN_FLIGHT, DEFAULT_PING_INTERVAL, DEFAULT_REQUEST_TIMEOUT, DEFAULT_SINK_CAPACITY,
    DEFAULT_SINK_SEND_TIMEOUT,
};
pub use script::{FsScriptSource, ScriptSource};

// ============================================================================
// Executor
// ============================================================================

/// Something that can run Gremlin requests.
#[async_trait]
pub trait Executor: Send + Sync {
    /// Deadline used when a call carries none.
    fn default_timeout(&self) -> Duration;

    /// Sends `request` and collects every frame up to the terminal one.
    async fn submit_with_timeout(
        &self,
        request: Request,
        request_timeout: Duration,
    ) -> Result<Vec<Response>>;

    /// Sends `request` and returns its frames as a stream.
    async fn submit_streaming_with_timeout(
        &self,
        request: Request,
        request_timeout: Duration,
    ) -> Result<ResponseStream>;

    /// Releases the underlying connection(s).
    async fn close(&self);

    /// Mints ids for requests built by the `execute*` calls.
    fn id_generator(&self) -> &dyn IdGenerator {
        &UuidGenerator
    }

    /// [`submit_with_timeout`](Self::submit_with_timeout) with the default deadline.
    async fn submit(&self, request: Request) -> Result<Vec<Response>> {
        self.submit_with_timeout(request, self.default_timeout())
            .await
    }

    /// [`submit_streaming_with_timeout`](Self::submit_streaming_with_timeout)
    /// with the default deadline.
    async fn submit_streaming(&self, request: Request) -> Result<ResponseStream> {
        self.submit_streaming_with_timeout(request, self.default_timeout())
            .await
    }

    /// Evaluates `script` without bindings.
    async fn execute(&self, script: &str) -> Result<Vec<Response>> {
        self.submit(Request::eval_with(self.id_generator(), script)).await
    }

    /// Evaluates `script` with bindings and traversal-source aliases.
    async fn execute_with_bindings(
        &self,
        script: &str,
        bindings: Bindings,
        aliases: BTreeMap<String, String>,
    ) -> Result<Vec<Response>> {
        let request = Request::eval_with(self.id_generator(), script)
            .with_bindings(bindings)
            .with_aliases(aliases);
        self.submit(request).await
    }

    /// Evaluates `script` and streams the result batches.
    async fn execute_streaming(&self, script: &str) -> Result<ResponseStream> {
        self.submit_streaming(Request::eval_with(self.id_generator(), script))
            .await
    }

    /// Loads `identifier` from `source` and evaluates it.
    async fn execute_script(
        &self,
        source: &dyn ScriptSource,
        identifier: &str,
    ) -> Result<Vec<Response>> {
        let script = source.load(identifier).await?;
        self.submit(Request::eval_with(self.id_generator(), script)).await
    }

    /// Loads `identifier` from `source` and evaluates it with bindings.
    async fn execute_script_with_bindings(
        &self,
        source: &dyn ScriptSource,
        identifier: &str,
        bindings: Bindings,
    ) -> Result<Vec<Response>> {
        let script = source.load(identifier).await?;
        self.submit(Request::eval_with(self.id_generator(), script).with_bindings(bindings))
            .await
    }
}

#[async_trait]
impl Executor for Connection {
    fn default_timeout(&self) -> Duration {
        self.options().request_timeout
    }

    async fn submit_with_timeout(
        &self,
        request: Request,
        request_timeout: Duration,
    ) -> Result<Vec<Response>> {
        Connection::submit_with_timeout(self, request, request_timeout).await
    }

    async fn submit_streaming_with_timeout(
        &self,
        request: Request,
        request_timeout: Duration,
    ) -> Result<ResponseStream> {
        Connection::submit_streaming_with_timeout(self, request, request_timeout).await
    }

    async fn close(&self) {
        Connection::close(self).await;
    }
}

#[async_trait]
impl Executor for ConnectionPool {
    fn default_timeout(&self) -> Duration {
        self.options().request_timeout
    }

    async fn submit_with_timeout(
        &self,
        request: Request,
        request_timeout: Duration,
    ) -> Result<Vec<Response>> {
        ConnectionPool::submit_with_timeout(self, request, request_timeout).await
    }

    async fn submit_streaming_with_timeout(
        &self,
        request: Request,
        request_timeout: Duration,
    ) -> Result<ResponseStream> {
        ConnectionPool::submit_streaming_with_timeout(self, request, request_timeout).await
    }

    async fn close(&self) {
        ConnectionPool::close(self).await;
    }

    fn id_generator(&self) -> &dyn IdGenerator {
        ConnectionPool::id_generator(self)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::Arc;

    use futures_util::StreamExt;
    use serde_json::json;
    use tokio_test::{assert_err, assert_ok};

    use crate::error::Error;
    use crate::identifiers::{RequestId, SequentialGenerator};
    use crate::protocol::{ResultData, StatusCode, Value};
    use crate::transport::mock::{Action, Inbound, MockServer};

    fn quiet() -> ConnectionOptions {
        ConnectionOptions::new().without_ping().without_idle_timeout()
    }

    /// Replies with `[script, bindings, aliases]` so tests can see what was sent.
    fn mirror(inbound: Inbound) -> Vec<Action> {
        match inbound {
            Inbound::Eval(request) => {
                let payload = json!([request.script, request.bindings, request.aliases]);
                vec![
                    Action::Reply(Response::new(
                        request.id,
                        StatusCode::PARTIAL_CONTENT,
                        ResultData::from_json(&json!([])).expect("data"),
                    )),
                    Action::Reply(Response::new(
                        request.id,
                        StatusCode::SUCCESS,
                        ResultData::from_json(&payload).expect("data"),
                    )),
                ]
            }
            Inbound::Authentication { .. } => Vec::new(),
        }
    }

    async fn run_all(executor: &dyn Executor) -> anyhow::Result<()> {
        let batches = executor.execute("g.V().count()").await?;
        assert_eq!(batches.len(), 2);
        let (script, _, _): (String, serde_json::Value, serde_json::Value) =
            batches[1].data().decode()?;
        assert_eq!(script, "g.V().count()");

        let mut bindings = Bindings::new();
        bindings.insert("x".into(), Value::from(7));
        let mut aliases = BTreeMap::new();
        aliases.insert("g".to_string(), "social".to_string());
        let batches = executor
            .execute_with_bindings("g.V(x)", bindings, aliases)
            .await?;
        let sent: serde_json::Value = batches[1].data().decode()?;
        assert_eq!(sent, json!(["g.V(x)", {"x": 7}, {"g": "social"}]));

        let elements: Vec<_> = executor.execute_streaming("g.E()").await?.collect().await;
        assert_eq!(elements.len(), 2);
        assert!(elements[1].is_final());

        executor.close().await;
        assert_err!(executor.execute("g.V()").await);
        Ok(())
    }

    #[tokio::test]
    async fn test_connection_executor() -> anyhow::Result<()> {
        let server = MockServer::start(mirror).await;
        let connection = Connection::connect(&server.url(), quiet()).await?;
        assert_eq!(Executor::default_timeout(&connection), DEFAULT_REQUEST_TIMEOUT);
        run_all(&connection).await
    }

    #[tokio::test]
    async fn test_pool_executor() -> anyhow::Result<()> {
        let server = MockServer::start(mirror).await;
        let pool: Arc<ConnectionPool> = ConnectionPool::builder()
            .url(server.url())
            .size(2)
            .options(quiet())
            .build()
            .await?;
        run_all(pool.as_ref()).await
    }

    #[tokio::test]
    async fn test_pool_uses_configured_id_generator() -> anyhow::Result<()> {
        let server = MockServer::start(|inbound| match inbound {
            Inbound::Eval(request) => vec![Action::Reply(Response::new(
                request.id,
                StatusCode::SUCCESS,
                ResultData::from_json(&json!([request.id])).expect("data"),
            ))],
            Inbound::Authentication { .. } => Vec::new(),
        })
        .await;
        let pool = ConnectionPool::builder()
            .url(server.url())
            .size(1)
            .options(quiet())
            .id_generator(Arc::new(SequentialGenerator::new()))
            .build()
            .await?;

        for expected in 1..=3u128 {
            let batches = pool.execute("g.V()").await?;
            let ids: Vec<RequestId> = batches[0].data().decode()?;
            assert_eq!(ids[0].as_uuid().as_u128(), expected);
        }
        pool.close().await;
        Ok(())
    }

    #[tokio::test]
    async fn test_execute_script_from_source() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        std::fs::write(dir.path().join("count.groovy"), "g.V().hasLabel(label).count()")?;
        let source = FsScriptSource::new(dir.path());

        let server = MockServer::start(mirror).await;
        let connection = Connection::connect(&server.url(), quiet()).await?;

        let mut bindings = Bindings::new();
        bindings.insert("label".into(), Value::from("person"));
        let batches = assert_ok!(
            connection
                .execute_script_with_bindings(&source, "count.groovy", bindings)
                .await
        );
        let sent: serde_json::Value = batches[1].data().decode()?;
        assert_eq!(sent[0], "g.V().hasLabel(label).count()");
        assert_eq!(sent[1], json!({"label": "person"}));

        let err = connection.execute_script(&source, "nope.groovy").await.unwrap_err();
        assert!(matches!(err, Error::ScriptNotFound { .. }));
        assert_eq!(server.frames_received(), 1);
        Ok(())
    }
}
