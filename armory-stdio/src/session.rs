//! Subprocess session state machine and pipe plumbing.

use std::fmt;
use std::process::Stdio;

use armory_primitives::SessionId;
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tracing::{debug, warn};

use crate::protocol::{ClientIdentity, RpcRequest, RpcResponse, handshake_request};

/// Result alias for session operations.
pub type SessionResult<T> = Result<T, SessionError>;

/// Errors surfaced by subprocess sessions.
#[derive(Debug, Error)]
pub enum SessionError {
    /// A required argument was missing or malformed. Detected before any
    /// process interaction; always caller-recoverable.
    #[error("invalid arguments: {reason}")]
    InvalidArguments {
        /// What was wrong with the input.
        reason: String,
    },

    /// The server or one of its preconditions is not usable right now.
    /// Surfaced descriptively so the caller can pick an alternate tool.
    #[error("tool server unavailable: {reason}")]
    Unavailable {
        /// Why the server cannot be used.
        reason: String,
    },

    /// Spawn, pipe, or framing failure. The session is `Failed` afterwards.
    #[error("tool server transport error: {reason}")]
    Transport {
        /// Additional context about the failure.
        reason: String,
    },

    /// A structurally valid response carried an explicit error payload.
    /// The session remains `Ready`.
    #[error("tool server error: {detail}")]
    Protocol {
        /// The server's error payload, verbatim.
        detail: String,
    },
}

impl SessionError {
    /// Convenience constructor for validation failures.
    #[must_use]
    pub fn invalid_arguments(reason: impl Into<String>) -> Self {
        Self::InvalidArguments {
            reason: reason.into(),
        }
    }

    /// Convenience constructor for availability failures.
    #[must_use]
    pub fn unavailable(reason: impl Into<String>) -> Self {
        Self::Unavailable {
            reason: reason.into(),
        }
    }

    /// Convenience constructor for transport failures.
    #[must_use]
    pub fn transport(reason: impl Into<String>) -> Self {
        Self::Transport {
            reason: reason.into(),
        }
    }
}

/// States a subprocess session can occupy.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionState {
    /// No process has been spawned yet.
    NotStarted,
    /// The process is being spawned and the handshake is in flight.
    Starting,
    /// The handshake succeeded; the session accepts calls.
    Ready,
    /// The last start or call failed; the process has been torn down.
    /// A later start attempt may recover the session.
    Failed,
}

impl SessionState {
    /// Returns `true` when the session accepts calls.
    #[must_use]
    pub const fn is_ready(self) -> bool {
        matches!(self, Self::Ready)
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::NotStarted => "not started",
            Self::Starting => "starting",
            Self::Ready => "ready",
            Self::Failed => "failed",
        })
    }
}

/// How to launch a tool-server process.
///
/// Environment entries are handed to the child verbatim and may include
/// credentials; `Debug` therefore prints variable names only.
pub struct LaunchSpec {
    program: String,
    args: Vec<String>,
    env: Vec<(String, String)>,
}

impl LaunchSpec {
    /// Creates a launch spec for the supplied program.
    #[must_use]
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            env: Vec::new(),
        }
    }

    /// Sets the program arguments.
    #[must_use]
    pub fn with_args(mut self, args: Vec<String>) -> Self {
        self.args = args;
        self
    }

    /// Adds one environment variable to the child's private environment.
    #[must_use]
    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    /// Returns the program to execute.
    #[must_use]
    pub fn program(&self) -> &str {
        &self.program
    }
}

impl fmt::Debug for LaunchSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let env_keys: Vec<_> = self.env.iter().map(|(key, _)| key.as_str()).collect();
        f.debug_struct("LaunchSpec")
            .field("program", &self.program)
            .field("args", &self.args)
            .field("env", &env_keys)
            .finish()
    }
}

/// Live state backing one subprocess-hosted integration.
///
/// A session correlates requests to responses purely by read order: every
/// call writes one line and then performs exactly one blocking line-read,
/// and nothing else touches the pipes. That guarantee only holds while a
/// single caller drives the session, so sessions must never be shared
/// across concurrent callers — wrap them in the owning client's mutex and
/// never hand them out. A canceled or timed-out call can leave a response
/// line in flight with no way to resynchronize; tear the session down and
/// recreate it rather than reuse it.
pub struct StdioSession {
    id: SessionId,
    state: SessionState,
    child: Option<Child>,
    stdin: Option<ChildStdin>,
    stdout: Option<BufReader<ChildStdout>>,
    next_id: u64,
}

impl Default for StdioSession {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for StdioSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StdioSession")
            .field("id", &self.id)
            .field("state", &self.state)
            .field("next_id", &self.next_id)
            .finish()
    }
}

impl StdioSession {
    /// Creates a session with no process attached.
    #[must_use]
    pub fn new() -> Self {
        Self {
            id: SessionId::random(),
            state: SessionState::NotStarted,
            child: None,
            stdin: None,
            stdout: None,
            next_id: 0,
        }
    }

    /// Returns the session identifier used in log correlation.
    #[must_use]
    pub const fn id(&self) -> SessionId {
        self.id
    }

    /// Returns the current session state.
    #[must_use]
    pub const fn state(&self) -> SessionState {
        self.state
    }

    /// Spawns the tool-server process and performs the handshake.
    ///
    /// Safe to call from `NotStarted` or `Failed`; a `Failed` session gets
    /// a fresh process and can recover to `Ready`.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Transport`] when the spawn, pipes, or
    /// handshake exchange fail, or [`SessionError::Protocol`] when the
    /// handshake response carries an error payload. Either way the process
    /// is killed, the pipes are closed, and the session is left `Failed`.
    pub async fn start(
        &mut self,
        launch: &LaunchSpec,
        identity: &ClientIdentity,
    ) -> SessionResult<()> {
        self.advance(SessionState::Starting);

        let mut command = Command::new(&launch.program);
        command
            .args(&launch.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped());
        for (key, value) in &launch.env {
            command.env(key, value);
        }

        let mut child = match command.spawn() {
            Ok(child) => child,
            Err(err) => {
                let reason = format!("failed to spawn `{}`: {err}", launch.program);
                self.fail(&reason);
                return Err(SessionError::transport(reason));
            }
        };

        let Some(stdin) = child.stdin.take() else {
            self.fail("child stdin unavailable");
            return Err(SessionError::transport("child stdin unavailable"));
        };
        let Some(stdout) = child.stdout.take() else {
            self.fail("child stdout unavailable");
            return Err(SessionError::transport("child stdout unavailable"));
        };

        self.child = Some(child);
        self.stdin = Some(stdin);
        self.stdout = Some(BufReader::new(stdout));

        let handshake = handshake_request(self.next_call_id(), identity);
        match self.request(&handshake).await {
            Ok(response) => {
                // The handshake response is only checked for the absence
                // of an error.
                if let Some(error) = response.error() {
                    let detail = error.to_string();
                    self.fail(&detail);
                    return Err(SessionError::Protocol { detail });
                }
            }
            // Transport failures have already torn the session down.
            Err(err) => return Err(err),
        }

        self.advance(SessionState::Ready);
        Ok(())
    }

    /// Sends one request and reads exactly one response line.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Unavailable`] unless the session is `Ready`,
    /// or [`SessionError::Transport`] when the exchange fails (the session
    /// is `Failed` afterwards). A response carrying an error payload is
    /// returned as-is; interpreting it is the caller's concern.
    pub async fn call(&mut self, method: &str, params: serde_json::Value) -> SessionResult<RpcResponse> {
        if !self.state.is_ready() {
            return Err(SessionError::unavailable(format!(
                "session is {}",
                self.state
            )));
        }

        let request = RpcRequest::new(self.next_call_id(), method, params);
        self.request(&request).await
    }

    /// Closes the child's stdin and kills the process if running.
    pub fn stop(&mut self) {
        debug!(session = %self.id, "session stopped");
        self.teardown();
        self.advance(SessionState::NotStarted);
    }

    fn next_call_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }

    async fn request(&mut self, request: &RpcRequest) -> SessionResult<RpcResponse> {
        let line = match serde_json::to_string(request) {
            Ok(line) => line,
            Err(err) => {
                let reason = format!("failed to encode request: {err}");
                self.fail(&reason);
                return Err(SessionError::transport(reason));
            }
        };

        debug!(session = %self.id, id = request.id(), method = request.method(), "request sent");

        let Some(stdin) = self.stdin.as_mut() else {
            self.fail("stdin closed");
            return Err(SessionError::transport("stdin closed"));
        };

        let write = async {
            stdin.write_all(line.as_bytes()).await?;
            stdin.write_all(b"\n").await?;
            stdin.flush().await
        };
        if let Err(err) = write.await {
            let reason = format!("failed to write request: {err}");
            self.fail(&reason);
            return Err(SessionError::transport(reason));
        }

        let Some(stdout) = self.stdout.as_mut() else {
            self.fail("stdout closed");
            return Err(SessionError::transport("stdout closed"));
        };

        let mut response_line = String::new();
        match stdout.read_line(&mut response_line).await {
            Ok(0) => {
                self.fail("server closed its output stream");
                return Err(SessionError::transport("server closed its output stream"));
            }
            Ok(_) => {}
            Err(err) => {
                let reason = format!("failed to read response: {err}");
                self.fail(&reason);
                return Err(SessionError::transport(reason));
            }
        }

        match serde_json::from_str(&response_line) {
            Ok(response) => Ok(response),
            Err(err) => {
                let reason = format!("malformed response line: {err}");
                self.fail(&reason);
                Err(SessionError::transport(reason))
            }
        }
    }

    fn fail(&mut self, reason: &str) {
        warn!(session = %self.id, reason, "session failed");
        self.teardown();
        self.advance(SessionState::Failed);
    }

    fn teardown(&mut self) {
        self.stdin.take();
        self.stdout.take();
        if let Some(mut child) = self.child.take() {
            let _ = child.start_kill();
        }
    }

    fn advance(&mut self, next: SessionState) {
        if next != self.state {
            debug!(session = %self.id, from = %self.state, to = %next, "session state transition");
            self.state = next;
        }
    }
}

impl Drop for StdioSession {
    fn drop(&mut self) {
        self.teardown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_session_is_not_started() {
        let session = StdioSession::new();
        assert_eq!(session.state(), SessionState::NotStarted);
        assert!(!session.state().is_ready());
    }

    #[tokio::test]
    async fn call_before_start_is_unavailable() {
        let mut session = StdioSession::new();
        let err = session
            .call("tools/list", serde_json::json!({}))
            .await
            .expect_err("should be unavailable");
        assert!(matches!(err, SessionError::Unavailable { .. }));
    }

    #[test]
    fn launch_spec_debug_hides_env_values() {
        let launch = LaunchSpec::new("server").with_env("API_TOKEN", "super-secret");
        let printed = format!("{launch:?}");
        assert!(printed.contains("API_TOKEN"));
        assert!(!printed.contains("super-secret"));
    }
}
