//! Test utilities: a scripted transport and reply builders.

use crate::error::{Error, Result};
use crate::transport::Transport;
use crate::value::Value;
use futures::future::BoxFuture;
use std::collections::VecDeque;
use std::sync::Mutex;

/// A [`Transport`] that replays scripted replies in order and records every
/// call. Replies run out -> protocol error, which tails treat as terminal.
pub(crate) struct MockTransport {
    replies: Mutex<VecDeque<Result<Value>>>,
    invocations: Mutex<Vec<(String, Vec<Value>)>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self {
            replies: Mutex::new(VecDeque::new()),
            invocations: Mutex::new(Vec::new()),
        }
    }

    pub fn push_ok(&self, value: Value) {
        self.replies.lock().unwrap().push_back(Ok(value));
    }

    pub fn push_err(&self, error: Error) {
        self.replies.lock().unwrap().push_back(Err(error));
    }

    /// Scripts `count` polls that report no growth past `offset`.
    pub fn push_many_empty_ok(&self, offset: i64, count: usize) {
        for _ in 0..count {
            self.push_ok(tail_reply("", offset, false));
        }
    }

    /// Method names of every invocation so far, in order.
    pub fn calls(&self) -> Vec<String> {
        self.invocations
            .lock()
            .unwrap()
            .iter()
            .map(|(method, _)| method.clone())
            .collect()
    }

    pub fn call_count(&self) -> usize {
        self.invocations.lock().unwrap().len()
    }

    /// The offset argument of every tail invocation so far.
    pub fn offsets(&self) -> Vec<i64> {
        self.invocations
            .lock()
            .unwrap()
            .iter()
            .filter_map(|(_, params)| params.get(1).and_then(Value::as_i64))
            .collect()
    }
}

impl Transport for MockTransport {
    fn invoke<'a>(&'a self, method: &'a str, params: Vec<Value>) -> BoxFuture<'a, Result<Value>> {
        self.invocations
            .lock()
            .unwrap()
            .push((method.to_string(), params));
        let reply = self
            .replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(Error::Protocol("mock transport exhausted".to_string())));
        Box::pin(async move { reply })
    }
}

/// Builds the `(chunk, end_offset, overflowed)` tuple a tail call returns.
pub(crate) fn tail_reply(chunk: &str, end_offset: i64, overflowed: bool) -> Value {
    Value::Array(vec![
        Value::from(chunk),
        Value::Int(end_offset),
        Value::Bool(overflowed),
    ])
}

/// Builds a `getProcessInfo` struct reply.
pub(crate) fn process_info_value(name: &str, state_name: &str, pid: i64) -> Value {
    let state_code = match state_name {
        "STOPPED" => 0,
        "STARTING" => 10,
        "RUNNING" => 20,
        "BACKOFF" => 30,
        "STOPPING" => 40,
        "EXITED" => 100,
        "FATAL" => 200,
        _ => 1000,
    };
    Value::Struct(vec![
        ("name".to_string(), Value::from(name)),
        ("group".to_string(), Value::from(name)),
        (
            "description".to_string(),
            Value::from(format!("pid {pid}, uptime 0:05:00")),
        ),
        ("start".to_string(), Value::Int(1_700_000_000)),
        ("stop".to_string(), Value::Int(0)),
        ("now".to_string(), Value::Int(1_700_000_300)),
        ("state".to_string(), Value::Int(state_code)),
        ("statename".to_string(), Value::from(state_name)),
        ("spawnerr".to_string(), Value::from("")),
        ("exitstatus".to_string(), Value::Int(0)),
        ("logfile".to_string(), Value::from(format!("/var/log/{name}.log"))),
        (
            "stdout_logfile".to_string(),
            Value::from(format!("/var/log/{name}.log")),
        ),
        (
            "stderr_logfile".to_string(),
            Value::from(format!("/var/log/{name}_err.log")),
        ),
        ("pid".to_string(), Value::Int(pid)),
    ])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_transport_replays_in_order() {
        let mock = MockTransport::new();
        mock.push_ok(Value::from("first"));
        mock.push_err(Error::Http { status: 500 });

        let first = mock.invoke("a.method", vec![]).await.unwrap();
        assert_eq!(first.as_str(), Some("first"));

        let second = mock.invoke("b.method", vec![Value::Int(1)]).await;
        assert!(matches!(second, Err(Error::Http { status: 500 })));

        // Exhausted
        let third = mock.invoke("c.method", vec![]).await;
        assert!(matches!(third, Err(Error::Protocol(_))));

        assert_eq!(mock.calls(), vec!["a.method", "b.method", "c.method"]);
        assert_eq!(mock.call_count(), 3);
    }

    #[tokio::test]
    async fn test_mock_transport_records_offsets() {
        let mock = MockTransport::new();
        mock.push_many_empty_ok(0, 2);

        for offset in [0i64, 64] {
            mock.invoke(
                "supervisor.tailProcessStdoutLog",
                vec![Value::from("worker"), Value::Int(offset), Value::Int(8192)],
            )
            .await
            .unwrap();
        }

        assert_eq!(mock.offsets(), vec![0, 64]);
    }

    #[test]
    fn test_tail_reply_shape() {
        let reply = tail_reply("data\n", 42, true);
        let items = reply.as_array().unwrap();
        assert_eq!(items[0].as_str(), Some("data\n"));
        assert_eq!(items[1].as_i64(), Some(42));
        assert_eq!(items[2].as_bool(), Some(true));
    }

    #[test]
    fn test_process_info_value_decodes() {
        let value = process_info_value("worker", "RUNNING", 4711);
        assert_eq!(value.str_member("statename").unwrap(), "RUNNING");
        assert_eq!(value.i64_member("state").unwrap(), 20);
        assert_eq!(value.i64_member("pid").unwrap(), 4711);
    }
}
