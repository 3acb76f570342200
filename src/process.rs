//! Process lifecycle control and the tail session entry points.
//!
//! Everything except the tails is one-shot RPC mapping onto the
//! `supervisor.*` namespace, with the same state prechecks supervisorctl
//! applies (starting a RUNNING process is a no-op, not a fault).

use crate::client::RpcClient;
use crate::config;
use crate::error::{Error, Result};
use crate::pump::{self, PumpConfig};
use crate::stream::TailStream;
use crate::value::Value;
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

pub(crate) const METHOD_START: &str = "supervisor.startProcess";
pub(crate) const METHOD_START_ALL: &str = "supervisor.startAllProcesses";
pub(crate) const METHOD_STOP: &str = "supervisor.stopProcess";
pub(crate) const METHOD_STOP_ALL: &str = "supervisor.stopAllProcesses";
pub(crate) const METHOD_INFO: &str = "supervisor.getProcessInfo";
pub(crate) const METHOD_ALL_INFO: &str = "supervisor.getAllProcessInfo";
pub(crate) const METHOD_RELOAD_CONFIG: &str = "supervisor.reloadConfig";
pub(crate) const METHOD_ADD_GROUP: &str = "supervisor.addProcessGroup";
pub(crate) const METHOD_REMOVE_GROUP: &str = "supervisor.removeProcessGroup";
pub(crate) const METHOD_TAIL_STDOUT: &str = "supervisor.tailProcessStdoutLog";
pub(crate) const METHOD_TAIL_STDERR: &str = "supervisor.tailProcessStderrLog";

/// supervisord's BAD_NAME fault code (unknown process or group).
pub(crate) const FAULT_BAD_NAME: i32 = 10;
/// Per-result status in start-all/stop-all replies meaning success.
const STATUS_SUCCESS: i64 = 80;

/// A supervisord process state, by state name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessState {
    Stopped,
    Starting,
    Running,
    Backoff,
    Stopping,
    Exited,
    Fatal,
    Unknown,
}

impl ProcessState {
    pub fn from_name(name: &str) -> Self {
        match name {
            "STOPPED" => ProcessState::Stopped,
            "STARTING" => ProcessState::Starting,
            "RUNNING" => ProcessState::Running,
            "BACKOFF" => ProcessState::Backoff,
            "STOPPING" => ProcessState::Stopping,
            "EXITED" => ProcessState::Exited,
            "FATAL" => ProcessState::Fatal,
            _ => ProcessState::Unknown,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            ProcessState::Stopped => "STOPPED",
            ProcessState::Starting => "STARTING",
            ProcessState::Running => "RUNNING",
            ProcessState::Backoff => "BACKOFF",
            ProcessState::Stopping => "STOPPING",
            ProcessState::Exited => "EXITED",
            ProcessState::Fatal => "FATAL",
            ProcessState::Unknown => "UNKNOWN",
        }
    }

    /// RUNNING or STARTING: the states where a start is redundant and a stop
    /// is meaningful.
    pub fn is_active(&self) -> bool {
        matches!(self, ProcessState::Running | ProcessState::Starting)
    }
}

impl std::fmt::Display for ProcessState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// The `getProcessInfo` struct.
#[derive(Debug, Clone, PartialEq)]
pub struct ProcessInfo {
    pub name: String,
    pub group: String,
    pub description: String,
    pub start: i64,
    pub stop: i64,
    pub now: i64,
    pub state: i64,
    pub state_name: String,
    pub spawn_err: String,
    pub exit_status: i64,
    pub log_file: String,
    pub stdout_log_file: String,
    pub stderr_log_file: String,
    pub pid: i64,
}

impl ProcessInfo {
    fn from_value(value: &Value) -> Result<Self> {
        Ok(Self {
            name: value.str_member("name")?,
            group: value.str_member("group")?,
            description: value.str_member("description")?,
            start: value.i64_member("start")?,
            stop: value.i64_member("stop")?,
            now: value.i64_member("now")?,
            state: value.i64_member("state")?,
            state_name: value.str_member("statename")?,
            spawn_err: value.str_member("spawnerr")?,
            exit_status: value.i64_member("exitstatus")?,
            log_file: value.str_member("logfile")?,
            stdout_log_file: value.str_member("stdout_logfile")?,
            stderr_log_file: value.str_member("stderr_logfile")?,
            pid: value.i64_member("pid")?,
        })
    }

    pub fn process_state(&self) -> ProcessState {
        ProcessState::from_name(&self.state_name)
    }
}

/// One entry of a start-all/stop-all reply.
#[derive(Debug, Clone, PartialEq)]
pub struct StartStopResult {
    pub name: String,
    pub group: String,
    pub status: i64,
    pub description: String,
}

impl StartStopResult {
    fn from_value(value: &Value) -> Result<Self> {
        Ok(Self {
            name: value.str_member("name")?,
            group: value.str_member("group")?,
            status: value.i64_member("status")?,
            description: value.str_member("description")?,
        })
    }

    pub fn is_success(&self) -> bool {
        self.status == STATUS_SUCCESS
    }
}

/// Result of `reloadConfig`: which groups were added, changed or removed on
/// disk since the running config was loaded.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConfigChanges {
    pub added: Vec<String>,
    pub changed: Vec<String>,
    pub removed: Vec<String>,
}

/// Options for one tail session, immutable once the session starts.
#[derive(Debug, Clone)]
pub struct TailOptions {
    /// Bytes requested per poll; the remote window size.
    pub read_buf_size: usize,
    /// How many trailing lines to seed the stream with on the first poll.
    pub seed_lines: usize,
    /// Poll cadence.
    pub poll_interval: Duration,
}

impl Default for TailOptions {
    fn default() -> Self {
        Self {
            read_buf_size: 8192,
            seed_lines: 10,
            poll_interval: Duration::from_secs(1),
        }
    }
}

/// Process lifecycle operations on one daemon.
#[derive(Clone)]
pub struct ProcessControl {
    client: RpcClient,
}

impl ProcessControl {
    pub fn new(client: RpcClient) -> Self {
        Self { client }
    }

    /// Starts a process unless it is already RUNNING or STARTING.
    pub async fn start(&self, name: &str) -> Result<()> {
        if self.status(name).await?.is_active() {
            return Ok(());
        }
        self.client
            .call(METHOD_START, vec![Value::from(name)])
            .await?;
        Ok(())
    }

    /// Starts every process; per-process results, success is status 80.
    pub async fn start_all(&self) -> Result<Vec<StartStopResult>> {
        let reply = self.client.call(METHOD_START_ALL, vec![]).await?;
        decode_start_stop_results(&reply)
    }

    /// Stops a process if it is RUNNING or STARTING; otherwise a no-op.
    pub async fn stop(&self, name: &str) -> Result<()> {
        if !self.status(name).await?.is_active() {
            return Ok(());
        }
        self.client
            .call(METHOD_STOP, vec![Value::from(name)])
            .await?;
        Ok(())
    }

    /// Stops every process; per-process results, success is status 80.
    pub async fn stop_all(&self) -> Result<Vec<StartStopResult>> {
        let reply = self.client.call(METHOD_STOP_ALL, vec![]).await?;
        decode_start_stop_results(&reply)
    }

    /// Stop followed by start, with the same prechecks as each.
    pub async fn restart(&self, name: &str) -> Result<()> {
        self.stop(name).await?;
        self.start(name).await
    }

    pub async fn status(&self, name: &str) -> Result<ProcessState> {
        Ok(self.info(name).await?.process_state())
    }

    pub async fn info(&self, name: &str) -> Result<ProcessInfo> {
        let reply = self
            .client
            .call(METHOD_INFO, vec![Value::from(name)])
            .await
            .map_err(|e| bad_name_to_not_found(e, name))?;
        ProcessInfo::from_value(&reply)
    }

    pub async fn all_info(&self) -> Result<Vec<ProcessInfo>> {
        let reply = self.client.call(METHOD_ALL_INFO, vec![]).await?;
        reply
            .as_array()
            .ok_or_else(|| Error::Protocol("getAllProcessInfo reply is not an array".to_string()))?
            .iter()
            .map(ProcessInfo::from_value)
            .collect()
    }

    /// Re-reads the config files on disk without applying anything.
    pub async fn reread(&self) -> Result<ConfigChanges> {
        let reply = self.client.call(METHOD_RELOAD_CONFIG, vec![]).await?;
        decode_config_changes(&reply)
    }

    pub async fn add(&self, name: &str) -> Result<()> {
        self.client
            .call(METHOD_ADD_GROUP, vec![Value::from(name)])
            .await?;
        Ok(())
    }

    /// Stops the process first, then removes its group.
    pub async fn remove(&self, name: &str) -> Result<()> {
        self.stop(name).await?;
        self.client
            .call(METHOD_REMOVE_GROUP, vec![Value::from(name)])
            .await?;
        Ok(())
    }

    /// `supervisorctl update`: reread, drop removed and changed groups, add
    /// added and changed groups. Returns what reread reported.
    pub async fn update(&self) -> Result<ConfigChanges> {
        let changes = self.reread().await?;

        for name in changes.removed.iter().chain(&changes.changed) {
            self.remove(name).await?;
        }
        for name in changes.added.iter().chain(&changes.changed) {
            self.add(name).await?;
        }
        Ok(changes)
    }

    /// Reads a `[program:NAME]` section from a local supervisord config file.
    pub fn program_options(
        &self,
        name: &str,
        config_file: impl AsRef<Path>,
    ) -> Result<HashMap<String, String>> {
        config::program_options(config_file, name)
    }

    /// Tails a process's stdout log as a line stream.
    ///
    /// Resolves the process first: an unknown name fails here, before any
    /// polling begins. The returned stream owns its poll task; dropping it or
    /// calling [`TailStream::cancel`] ends the session.
    pub async fn tail_stdout_log(&self, name: &str, options: TailOptions) -> Result<TailStream> {
        self.tail_log(name, METHOD_TAIL_STDOUT, options).await
    }

    /// Tails a process's stderr log as a line stream.
    pub async fn tail_stderr_log(&self, name: &str, options: TailOptions) -> Result<TailStream> {
        self.tail_log(name, METHOD_TAIL_STDERR, options).await
    }

    async fn tail_log(
        &self,
        name: &str,
        method: &'static str,
        options: TailOptions,
    ) -> Result<TailStream> {
        // Fail fast on unknown names instead of erroring one tick later
        self.info(name).await?;

        Ok(TailStream::spawn(
            self.client.transport(),
            PumpConfig {
                name: name.to_string(),
                method,
                read_buf_size: options.read_buf_size,
                seed_lines: options.seed_lines,
                poll_interval: options.poll_interval,
            },
        ))
    }
}

fn bad_name_to_not_found(error: Error, name: &str) -> Error {
    if error.is_bad_name() {
        Error::ProcessNotFound(name.to_string())
    } else {
        error
    }
}

fn decode_start_stop_results(reply: &Value) -> Result<Vec<StartStopResult>> {
    reply
        .as_array()
        .ok_or_else(|| Error::Protocol("start/stop-all reply is not an array".to_string()))?
        .iter()
        .map(StartStopResult::from_value)
        .collect()
}

/// reloadConfig replies `[[added, changed, removed]]`, each a string array.
fn decode_config_changes(reply: &Value) -> Result<ConfigChanges> {
    let groups = reply
        .as_array()
        .and_then(|outer| outer.first())
        .and_then(Value::as_array)
        .ok_or_else(|| Error::Protocol("reloadConfig reply is not a nested array".to_string()))?;

    let names = |index: usize| -> Result<Vec<String>> {
        groups
            .get(index)
            .and_then(Value::as_array)
            .ok_or_else(|| Error::Protocol("reloadConfig group list missing".to_string()))?
            .iter()
            .map(|v| {
                v.as_str()
                    .map(str::to_string)
                    .ok_or_else(|| Error::Protocol("reloadConfig name is not a string".to_string()))
            })
            .collect()
    };

    Ok(ConfigChanges {
        added: names(0)?,
        changed: names(1)?,
        removed: names(2)?,
    })
}
