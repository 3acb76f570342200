//! Daemon-level control: version, state, shutdown, restart.

use crate::client::RpcClient;
use crate::error::{Error, Result};
use crate::value::Value;

const METHOD_API_VERSION: &str = "supervisor.getAPIVersion";
const METHOD_SUPERVISOR_VERSION: &str = "supervisor.getSupervisorVersion";
const METHOD_STATE: &str = "supervisor.getState";
const METHOD_SHUTDOWN: &str = "supervisor.shutdown";
const METHOD_RESTART: &str = "supervisor.restart";

/// The `getState` struct.
#[derive(Debug, Clone, PartialEq)]
pub struct DaemonState {
    pub state_code: i64,
    pub state_name: String,
}

/// Daemon-level operations on one supervisord instance.
#[derive(Clone)]
pub struct DaemonControl {
    client: RpcClient,
}

impl DaemonControl {
    pub fn new(client: RpcClient) -> Self {
        Self { client }
    }

    /// The RPC API version (not the daemon version).
    pub async fn api_version(&self) -> Result<String> {
        let reply = self.client.call(METHOD_API_VERSION, vec![]).await?;
        string_reply(reply, "getAPIVersion")
    }

    pub async fn supervisord_version(&self) -> Result<String> {
        let reply = self.client.call(METHOD_SUPERVISOR_VERSION, vec![]).await?;
        string_reply(reply, "getSupervisorVersion")
    }

    pub async fn state(&self) -> Result<DaemonState> {
        let reply = self.client.call(METHOD_STATE, vec![]).await?;
        Ok(DaemonState {
            state_code: reply.i64_member("statecode")?,
            state_name: reply.str_member("statename")?,
        })
    }

    pub async fn shutdown(&self) -> Result<()> {
        self.client.call(METHOD_SHUTDOWN, vec![]).await?;
        Ok(())
    }

    pub async fn restart(&self) -> Result<()> {
        self.client.call(METHOD_RESTART, vec![]).await?;
        Ok(())
    }
}

fn string_reply(reply: Value, method: &str) -> Result<String> {
    reply
        .as_str()
        .map(str::to_string)
        .ok_or_else(|| Error::Protocol(format!("{method} reply is not a string")))
}
