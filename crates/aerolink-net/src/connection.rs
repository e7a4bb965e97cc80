//! [`Connection`] – the one process-wide simulator connection state.
//!
//! Owns the host, the fixed RPC port, the `connected` flag, and the live
//! client handle. The handle is replaced wholesale on reconnect; an old
//! handle held by a concurrent caller (e.g. an in-flight frame capture)
//! simply fails its next call and is treated as an ordinary failure by that
//! caller.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use aerolink_rpc::{SimClient, SimClientFactory};
use aerolink_types::AeroError;
use tokio::sync::RwLock;
use tracing::{info, warn};

use crate::resolver::EndpointResolver;

struct ActiveSession {
    host: String,
    client: Arc<dyn SimClient>,
}

/// Shared connection state. Exactly one instance per running process,
/// created at startup and shared by the command executor and the frame
/// pipeline through an `Arc`.
pub struct Connection {
    resolver: EndpointResolver,
    factory: Arc<dyn SimClientFactory>,
    connected: AtomicBool,
    session: RwLock<Option<ActiveSession>>,
}

impl Connection {
    pub fn new(resolver: EndpointResolver, factory: Arc<dyn SimClientFactory>) -> Self {
        Self {
            resolver,
            factory,
            connected: AtomicBool::new(false),
            session: RwLock::new(None),
        }
    }

    /// Whether the last connect/reconnect succeeded and has not been
    /// superseded by a failure.
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    /// Host of the current session, if any.
    pub async fn host(&self) -> Option<String> {
        self.session.read().await.as_ref().map(|s| s.host.clone())
    }

    /// The live client handle, if a session has ever been established.
    ///
    /// The handle may belong to a session that has since gone dead; callers
    /// treat per-call failures as ordinary errors.
    pub async fn client(&self) -> Option<Arc<dyn SimClient>> {
        self.session.read().await.as_ref().map(|s| Arc::clone(&s.client))
    }

    /// Resolve an endpoint and connect to it. Returns the connected host.
    pub async fn resolve_and_connect(&self) -> Result<String, AeroError> {
        let host = self.resolver.resolve().await;
        self.connect(&host).await?;
        Ok(host)
    }

    /// Open a session against `host` and confirm RPC liveness with one
    /// lightweight round-trip before marking the connection established.
    /// A TCP-reachable host whose RPC service does not answer is rejected
    /// here.
    ///
    /// On failure the `connected` flag is lowered but an existing handle is
    /// left in place (last-writer-wins under concurrent reconnects).
    pub async fn connect(&self, host: &str) -> Result<(), AeroError> {
        let port = self.resolver.port();
        let client = match self.factory.dial(host, port).await {
            Ok(client) => client,
            Err(e) => {
                self.connected.store(false, Ordering::SeqCst);
                warn!(host = %host, port, error = %e, "dial failed");
                return Err(e);
            }
        };

        if let Err(e) = client.ping().await {
            self.connected.store(false, Ordering::SeqCst);
            warn!(host = %host, error = %e, "endpoint reachable but RPC liveness check failed");
            return Err(AeroError::Connection(format!(
                "simulator at {host}:{port} accepted the connection but did not answer: {e}"
            )));
        }

        *self.session.write().await = Some(ActiveSession {
            host: host.to_string(),
            client,
        });
        self.connected.store(true, Ordering::SeqCst);
        info!(host = %host, port, "simulator connection established");
        Ok(())
    }

    /// Re-establish the connection. When `host` is `None` resolution is
    /// re-run from scratch. The stored session is replaced only on success.
    pub async fn reconnect(&self, host: Option<&str>) -> Result<String, AeroError> {
        match host {
            Some(h) => {
                self.connect(h).await?;
                Ok(h.to_string())
            }
            None => self.resolve_and_connect().await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aerolink_rpc::{StubClient, StubFactory};
    use std::time::Duration;

    fn resolver_with_override(host: &str) -> EndpointResolver {
        EndpointResolver::new(
            Some(host.to_string()),
            Duration::from_millis(100),
            vec![],
            41451,
        )
    }

    #[tokio::test]
    async fn connect_establishes_session_and_flag() {
        let conn = Connection::new(resolver_with_override("sim-host"), StubFactory::new());
        assert!(!conn.is_connected());

        let host = conn.resolve_and_connect().await.unwrap();
        assert_eq!(host, "sim-host");
        assert!(conn.is_connected());
        assert_eq!(conn.host().await.as_deref(), Some("sim-host"));
        assert!(conn.client().await.is_some());
    }

    #[tokio::test]
    async fn dial_failure_leaves_disconnected() {
        let conn = Connection::new(resolver_with_override("sim-host"), StubFactory::refusing());
        let err = conn.resolve_and_connect().await.unwrap_err();
        assert!(matches!(err, AeroError::Connection(_)));
        assert!(!conn.is_connected());
        assert!(conn.client().await.is_none());
    }

    #[tokio::test]
    async fn rpc_dead_host_is_rejected_after_dial() {
        // TCP handshake succeeds (dial ok) but the liveness ping fails; the
        // connection must not be marked established.
        let client = StubClient::new();
        client.set_ping_dead(true);
        let factory = StubFactory::with_client(client);

        let conn = Connection::new(resolver_with_override("half-dead"), factory);
        let err = conn.connect("half-dead").await.unwrap_err();
        assert!(matches!(err, AeroError::Connection(_)));
        assert!(!conn.is_connected());
    }

    #[tokio::test]
    async fn reconnect_replaces_handle_wholesale() {
        let factory = StubFactory::new();
        let conn = Connection::new(resolver_with_override("sim-host"), factory);

        conn.resolve_and_connect().await.unwrap();
        let first = conn.client().await.unwrap();

        conn.reconnect(Some("other-host")).await.unwrap();
        let second = conn.client().await.unwrap();

        assert!(!Arc::ptr_eq(&first, &second));
        assert_eq!(conn.host().await.as_deref(), Some("other-host"));
    }

    #[tokio::test]
    async fn failed_reconnect_keeps_old_handle_but_lowers_flag() {
        let factory = StubFactory::new();
        let conn = Connection::new(resolver_with_override("sim-host"), Arc::clone(&factory) as _);

        conn.resolve_and_connect().await.unwrap();
        let before = conn.client().await.unwrap();
        assert!(conn.is_connected());

        factory.set_refusing(true);
        assert!(conn.reconnect(None).await.is_err());

        assert!(!conn.is_connected());
        let after = conn.client().await.unwrap();
        assert!(Arc::ptr_eq(&before, &after), "good handle must not be discarded");
    }

    #[tokio::test]
    async fn reconnect_with_explicit_host_skips_resolution() {
        let factory = StubFactory::new();
        let conn = Connection::new(resolver_with_override("resolved-host"), Arc::clone(&factory) as _);

        conn.reconnect(Some("pinned-host")).await.unwrap();
        assert_eq!(factory.last_host().as_deref(), Some("pinned-host"));
    }
}
