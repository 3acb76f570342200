//! RPC transports: how a method call reaches the daemon.
//!
//! Everything above this module only sees [`Transport::invoke`]; the tail
//! machinery, process control and daemon control are all transport-agnostic,
//! which is also what makes them testable against a scripted transport.

use crate::error::Result;
use crate::http;
use crate::value::Value;
use crate::xmlrpc;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use futures::future::BoxFuture;
use std::path::{Path, PathBuf};
use tokio::net::{TcpStream, UnixStream};
use tracing::debug;

/// Capability to invoke one XML-RPC method and get its decoded reply.
pub trait Transport: Send + Sync {
    fn invoke<'a>(&'a self, method: &'a str, params: Vec<Value>) -> BoxFuture<'a, Result<Value>>;
}

/// XML-RPC over TCP, with optional HTTP basic auth.
pub struct InetTransport {
    address: String,
    authorization: Option<String>,
}

impl InetTransport {
    /// `address` is a `host:port` pair as found in `[inet_http_server] port`.
    pub fn new(address: impl Into<String>, username: &str, password: &str) -> Self {
        let authorization = if username.is_empty() && password.is_empty() {
            None
        } else {
            Some(BASE64.encode(format!("{username}:{password}")))
        };
        Self {
            address: address.into(),
            authorization,
        }
    }

    pub fn address(&self) -> &str {
        &self.address
    }
}

impl Transport for InetTransport {
    fn invoke<'a>(&'a self, method: &'a str, params: Vec<Value>) -> BoxFuture<'a, Result<Value>> {
        Box::pin(async move {
            debug!(method, address = %self.address, "rpc call over tcp");
            let body = xmlrpc::encode_call(method, &params);
            let mut stream = TcpStream::connect(&self.address).await?;
            let reply = http::post_rpc(
                &mut stream,
                &self.address,
                self.authorization.as_deref(),
                &body,
            )
            .await?;
            xmlrpc::parse_response(&reply)
        })
    }
}

/// XML-RPC over supervisord's Unix socket (HTTP on the socket).
pub struct UnixTransport {
    path: PathBuf,
}

impl UnixTransport {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Transport for UnixTransport {
    fn invoke<'a>(&'a self, method: &'a str, params: Vec<Value>) -> BoxFuture<'a, Result<Value>> {
        Box::pin(async move {
            debug!(method, path = %self.path.display(), "rpc call over unix socket");
            let body = xmlrpc::encode_call(method, &params);
            let mut stream = UnixStream::connect(&self.path).await?;
            // The socket has no authority; supervisord only wants a Host header.
            let reply = http::post_rpc(&mut stream, "localhost", None, &body).await?;
            xmlrpc::parse_response(&reply)
        })
    }
}
