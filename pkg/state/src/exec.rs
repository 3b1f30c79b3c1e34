//! Client side of the platform's pod exec protocol.
//!
//! Exec is a WebSocket upgrade of `GET .../pods/{name}/exec` with the
//! command and container as query parameters. Every binary frame starts
//! with a channel byte: 1 carries stdout, 2 stderr and 3 a final status
//! object reporting how the command exited.

use pkg_types::kind::Kind;
use reqwest::Url;
use serde::Deserialize;

use crate::client::ExecOutput;
use crate::error::StoreError;

/// Sub-protocols offered on upgrade, most recent first.
pub const EXEC_PROTOCOLS: &str = "v5.channel.k8s.io, v4.channel.k8s.io";

const STDOUT_CHANNEL: u8 = 1;
const STDERR_CHANNEL: u8 = 2;
const STATUS_CHANNEL: u8 = 3;

/// `wss://` (or `ws://`) URL of a non-interactive exec of `command`.
pub fn exec_url(
    server: &str,
    namespace: &str,
    pod: &str,
    container: &str,
    command: &[String],
) -> Result<Url, StoreError> {
    let base = format!("{}{}/exec", server, Kind::Pod.object_path(namespace, pod));
    let mut url = Url::parse(&base).map_err(|e| StoreError::Exec {
        pod: format!("{}/{}", namespace, pod),
        message: format!("invalid exec url {}: {}", base, e),
    })?;
    {
        let mut query = url.query_pairs_mut();
        query.append_pair("container", container);
        query.append_pair("stdout", "true");
        query.append_pair("stderr", "true");
        for arg in command {
            query.append_pair("command", arg);
        }
    }
    let scheme = if url.scheme() == "https" { "wss" } else { "ws" };
    // http(s) and ws(s) are all special schemes, so this cannot fail.
    let _ = url.set_scheme(scheme);
    Ok(url)
}

/// Output collected from the channel frames of one exec session.
#[derive(Debug, Default)]
pub struct ExecStreams {
    stdout: Vec<u8>,
    stderr: Vec<u8>,
    status: Vec<u8>,
}

impl ExecStreams {
    pub fn push(&mut self, frame: &[u8]) {
        let Some((channel, data)) = frame.split_first() else {
            return;
        };
        match *channel {
            STDOUT_CHANNEL => self.stdout.extend_from_slice(data),
            STDERR_CHANNEL => self.stderr.extend_from_slice(data),
            STATUS_CHANNEL => self.status.extend_from_slice(data),
            _ => {}
        }
    }

    /// The command's output, or an error when it did not exit cleanly.
    /// `pod` is `namespace/name`, used in error messages.
    pub fn finish(self, pod: &str) -> Result<ExecOutput, StoreError> {
        let stdout = String::from_utf8_lossy(&self.stdout).into_owned();
        let stderr = String::from_utf8_lossy(&self.stderr).into_owned();
        let failed = |message: String| StoreError::Exec {
            pod: pod.to_string(),
            message,
        };

        if self.status.is_empty() {
            return Err(failed("session closed without an exit status".to_string()));
        }
        let status: ExecStatus = serde_json::from_slice(&self.status)?;
        if status.status == "Success" {
            return Ok(ExecOutput {
                stdout,
                stderr,
                exit_code: 0,
            });
        }

        match status.exit_code() {
            Some(code) => Err(failed(format!("exit code {}: {}", code, stderr.trim()))),
            None => Err(failed(status.message.unwrap_or(status.status))),
        }
    }
}

/// Status object sent on the status channel when the command ends.
#[derive(Debug, Deserialize)]
struct ExecStatus {
    #[serde(default)]
    status: String,
    #[serde(default)]
    reason: Option<String>,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    details: Option<StatusDetails>,
}

#[derive(Debug, Default, Deserialize)]
struct StatusDetails {
    #[serde(default)]
    causes: Vec<StatusCause>,
}

#[derive(Debug, Deserialize)]
struct StatusCause {
    #[serde(default)]
    reason: String,
    #[serde(default)]
    message: String,
}

impl ExecStatus {
    fn exit_code(&self) -> Option<i32> {
        if self.reason.as_deref() != Some("NonZeroExitCode") {
            return None;
        }
        self.details
            .as_ref()?
            .causes
            .iter()
            .find(|c| c.reason == "ExitCode")
            .and_then(|c| c.message.parse().ok())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(channel: u8, data: &str) -> Vec<u8> {
        let mut frame = vec![channel];
        frame.extend_from_slice(data.as_bytes());
        frame
    }

    #[test]
    fn url_carries_command_as_query() {
        let url = exec_url(
            "https://10.0.0.1:6443",
            "test",
            "db-rs0-0",
            "mongod",
            &["mongo".to_string(), "--eval".to_string(), "rs.initiate({})".to_string()],
        )
        .unwrap();
        assert_eq!(url.scheme(), "wss");
        assert_eq!(url.path(), "/api/v1/namespaces/test/pods/db-rs0-0/exec");
        let commands: Vec<String> = url
            .query_pairs()
            .filter(|(k, _)| k == "command")
            .map(|(_, v)| v.into_owned())
            .collect();
        assert_eq!(commands, vec!["mongo", "--eval", "rs.initiate({})"]);
        assert!(url.query_pairs().any(|(k, v)| k == "container" && v == "mongod"));

        let plain = exec_url("http://127.0.0.1:8080", "test", "p", "c", &[]).unwrap();
        assert_eq!(plain.scheme(), "ws");
    }

    #[test]
    fn successful_session_collects_output() {
        let mut streams = ExecStreams::default();
        streams.push(&frame(1, "{\"ok\":"));
        streams.push(&frame(1, "1}\n"));
        streams.push(&frame(2, "warning\n"));
        streams.push(&[]);
        streams.push(&frame(3, r#"{"metadata":{},"status":"Success"}"#));
        let output = streams.finish("test/p").unwrap();
        assert_eq!(output.stdout, "{\"ok\":1}\n");
        assert_eq!(output.stderr, "warning\n");
        assert_eq!(output.exit_code, 0);
    }

    #[test]
    fn non_zero_exit_is_an_error() {
        let mut streams = ExecStreams::default();
        streams.push(&frame(2, "boom"));
        streams.push(&frame(
            3,
            r#"{"status":"Failure","reason":"NonZeroExitCode","message":"command terminated with non-zero exit code","details":{"causes":[{"reason":"ExitCode","message":"2"}]}}"#,
        ));
        match streams.finish("test/p").unwrap_err() {
            StoreError::Exec { pod, message } => {
                assert_eq!(pod, "test/p");
                assert_eq!(message, "exit code 2: boom");
            }
            other => panic!("unexpected error: {}", other),
        }
    }

    #[test]
    fn other_failures_carry_the_server_message() {
        let mut streams = ExecStreams::default();
        streams.push(&frame(
            3,
            r#"{"status":"Failure","message":"container not found (\"mongod\")"}"#,
        ));
        let err = streams.finish("test/p").unwrap_err();
        assert!(err.to_string().contains("container not found"));
    }

    #[test]
    fn missing_status_is_an_error() {
        let mut streams = ExecStreams::default();
        streams.push(&frame(1, "partial"));
        assert!(matches!(
            streams.finish("test/p"),
            Err(StoreError::Exec { .. })
        ));
    }
}
