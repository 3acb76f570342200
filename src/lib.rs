//! An async client for supervisord's XML-RPC interface.
//!
//! This library wraps the `supervisor.*` RPC namespace (process lifecycle,
//! daemon control, config reread) and turns the daemon's pull-based log
//! snapshot calls into continuous line streams, as if tailing a local file.
//!
//! # Example
//!
//! ```rust,no_run
//! use supervisord_client::{ProcessControl, RpcClient, TailOptions};
//! use tokio_stream::StreamExt;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = RpcClient::from_default_config().await?;
//!     let processes = ProcessControl::new(client);
//!
//!     let mut log = processes
//!         .tail_stdout_log("worker", TailOptions::default())
//!         .await?;
//!
//!     while let Some(line) = log.next().await {
//!         match line {
//!             Ok(content) => print!("{}", content),
//!             Err(e) => eprintln!("tail ended: {}", e),
//!         }
//!     }
//!
//!     Ok(())
//! }
//! ```

// Internal modules - not part of public API
mod client;
mod daemon;
mod http;
mod process;
mod pump;
mod reconcile;
mod stream;
mod xmlrpc;

// Public building blocks
pub mod config;
pub mod transport;
pub mod value;

mod error;

#[cfg(test)]
mod test_helpers;

// Public API exports
pub use client::RpcClient;
pub use config::{DEFAULT_CONFIG_FILE, RpcConfig};
pub use daemon::{DaemonControl, DaemonState};
pub use error::{Error, Result};
pub use process::{
    ConfigChanges, ProcessControl, ProcessInfo, ProcessState, StartStopResult, TailOptions,
};
pub use stream::TailStream;
pub use transport::Transport;
pub use value::Value;
