//! RPC client construction, including the socket-first endpoint fallback.

use crate::config::{self, DEFAULT_CONFIG_FILE, RpcConfig};
use crate::error::{Error, Result};
use crate::transport::{InetTransport, Transport, UnixTransport};
use crate::value::Value;
use std::path::Path;
use std::sync::Arc;
use tokio::net::{TcpStream, UnixStream};
use tracing::debug;

/// A handle to one supervisord daemon.
///
/// Cheap to clone; clones share the underlying transport. Higher-level
/// wrappers ([`ProcessControl`](crate::ProcessControl),
/// [`DaemonControl`](crate::DaemonControl)) are built on top of it.
#[derive(Clone)]
pub struct RpcClient {
    transport: Arc<dyn Transport>,
}

impl std::fmt::Debug for RpcClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RpcClient").finish_non_exhaustive()
    }
}

impl RpcClient {
    /// Wraps an already-constructed transport.
    pub fn with_transport(transport: Arc<dyn Transport>) -> Self {
        Self { transport }
    }

    /// Talks to the daemon over its Unix socket.
    pub fn unix(path: impl AsRef<Path>) -> Self {
        Self::with_transport(Arc::new(UnixTransport::new(path.as_ref())))
    }

    /// Talks to the daemon's `inet_http_server` with HTTP basic auth.
    /// Pass empty credentials when the server has none configured.
    pub fn http(address: impl Into<String>, username: &str, password: &str) -> Self {
        Self::with_transport(Arc::new(InetTransport::new(address, username, password)))
    }

    /// Reads RPC endpoints from a supervisord.conf and connects to the first
    /// reachable one, socket first, then the HTTP server.
    pub async fn from_config_file(path: impl AsRef<Path>) -> Result<Self> {
        let rpc_config = config::parse_rpc_config(path)?;
        Self::from_rpc_config(rpc_config).await
    }

    /// [`Self::from_config_file`] with supervisord's default config path.
    pub async fn from_default_config() -> Result<Self> {
        Self::from_config_file(DEFAULT_CONFIG_FILE).await
    }

    /// Sequential probe over the configured endpoints: the Unix socket wins if
    /// it accepts a connection, otherwise the inet server is tried.
    pub async fn from_rpc_config(rpc_config: RpcConfig) -> Result<Self> {
        if let Some(socket) = &rpc_config.unix_socket {
            match UnixStream::connect(socket).await {
                Ok(_) => return Ok(Self::unix(socket)),
                Err(e) => {
                    debug!(path = %socket.display(), error = %e, "unix socket probe failed");
                }
            }
        }

        if let Some(http) = &rpc_config.inet_http_server {
            match TcpStream::connect(&http.server_url).await {
                Ok(_) => {
                    return Ok(Self::http(
                        http.server_url.clone(),
                        http.username.as_deref().unwrap_or_default(),
                        http.password.as_deref().unwrap_or_default(),
                    ));
                }
                Err(e) => {
                    debug!(address = %http.server_url, error = %e, "inet server probe failed");
                }
            }
        }

        Err(Error::Config(
            "no reachable RPC endpoint: inet_http_server is disabled and the unix socket \
             did not accept a connection"
                .to_string(),
        ))
    }

    /// Invokes a raw XML-RPC method. The typed wrappers cover the supervisor
    /// namespace; this is the escape hatch for anything else (e.g. plugins).
    pub async fn call(&self, method: &str, params: Vec<Value>) -> Result<Value> {
        self.transport.invoke(method, params).await
    }

    pub(crate) fn transport(&self) -> Arc<dyn Transport> {
        Arc::clone(&self.transport)
    }
}
