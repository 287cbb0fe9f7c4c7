//! Tool-server client: one session, one mutex, serialized calls.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tokio::sync::Mutex;

use crate::protocol::ClientIdentity;
use crate::session::{LaunchSpec, SessionError, SessionResult, SessionState, StdioSession};

/// Where the tool server's access credential comes from and how it reaches
/// the child process.
///
/// The credential travels exclusively through the child's private
/// environment: it is never placed in a request payload, never logged, and
/// never returned to callers.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CredentialConfig {
    /// Environment variable the child reads the credential from.
    pub env_var: String,
    /// Provider key passed to the credential provider.
    pub provider: String,
    /// Service key passed to the credential provider.
    pub service: String,
    /// Fallback credential used when no provider is injected.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fallback: Option<String>,
}

impl fmt::Debug for CredentialConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialConfig")
            .field("env_var", &self.env_var)
            .field("provider", &self.provider)
            .field("service", &self.service)
            .field("fallback", &self.fallback.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

/// Launch parameters for one subprocess tool server.
///
/// Loading this from disk is the caller's concern; the client only needs
/// the resolved value.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Program to execute.
    pub command: String,
    /// Arguments passed to the program.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub args: Vec<String>,
    /// Additional (non-secret) environment for the child.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub env: BTreeMap<String, String>,
    /// Credential wiring, when the server needs one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credential: Option<CredentialConfig>,
}

/// Source of access credentials injected at runtime.
///
/// Credentials obtained here are used only to populate the child process
/// environment; they must never be exposed to the model or the caller.
#[async_trait]
pub trait CredentialProvider: Send + Sync {
    /// Resolves the access credential for the supplied provider/service pair.
    async fn credential(&self, provider: &str, service: &str) -> SessionResult<String>;
}

/// Client owning one subprocess tool-server session.
///
/// All calls are serialized through the session's mutex, which is what
/// upholds the session's read-order correlation invariant. Run one client
/// per external service; never share a client's session across services.
/// The client imposes no internal timeout — cancellation is the caller's
/// concern, and a canceled call is grounds to [`stop`](Self::stop) and
/// restart the session rather than reuse it.
pub struct ToolServerClient {
    config: ServerConfig,
    identity: ClientIdentity,
    credentials: Option<Arc<dyn CredentialProvider>>,
    session: Mutex<StdioSession>,
}

impl fmt::Debug for ToolServerClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ToolServerClient")
            .field("command", &self.config.command)
            .field("credential_provider", &self.credentials.is_some())
            .finish_non_exhaustive()
    }
}

impl ToolServerClient {
    /// Creates a client for the supplied server configuration.
    #[must_use]
    pub fn new(config: ServerConfig) -> Self {
        Self {
            config,
            identity: ClientIdentity::default(),
            credentials: None,
            session: Mutex::new(StdioSession::new()),
        }
    }

    /// Installs a credential provider consulted ahead of the config fallback.
    #[must_use]
    pub fn with_credential_provider(mut self, provider: Arc<dyn CredentialProvider>) -> Self {
        self.credentials = Some(provider);
        self
    }

    /// Overrides the identity presented during the handshake.
    #[must_use]
    pub fn with_identity(mut self, identity: ClientIdentity) -> Self {
        self.identity = identity;
        self
    }

    /// Returns the current session state.
    pub async fn state(&self) -> SessionState {
        self.session.lock().await.state()
    }

    /// Starts the tool server if it is not already running.
    ///
    /// Idempotent under concurrent callers: the session mutex makes
    /// repeated calls observe either a `Ready` session or a fresh start
    /// attempt, never a half-started one.
    ///
    /// # Errors
    ///
    /// Propagates availability, transport, and protocol failures from the
    /// spawn and handshake.
    pub async fn ensure_started(&self) -> SessionResult<()> {
        let mut session = self.session.lock().await;
        self.ensure_started_locked(&mut session).await
    }

    /// Issues one call against the running session, starting it on demand.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Protocol`] when the server reports an error,
    /// or availability/transport errors from the session itself.
    pub async fn call(&self, method: &str, params: Value) -> SessionResult<Value> {
        let mut session = self.session.lock().await;
        self.ensure_started_locked(&mut session).await?;
        session.call(method, params).await?.into_result()
    }

    /// Invokes a named tool on the server via `tools/call`.
    ///
    /// # Errors
    ///
    /// Same failure modes as [`call`](Self::call).
    pub async fn call_tool(&self, name: &str, arguments: Value) -> SessionResult<Value> {
        self.call(
            "tools/call",
            json!({
                "name": name,
                "arguments": arguments,
            }),
        )
        .await
    }

    /// Stops the tool server: closes its stdin and kills the process.
    pub async fn stop(&self) {
        self.session.lock().await.stop();
    }

    async fn ensure_started_locked(&self, session: &mut StdioSession) -> SessionResult<()> {
        if session.state().is_ready() {
            return Ok(());
        }

        if self.config.command.is_empty() {
            return Err(SessionError::unavailable(
                "no tool server command configured",
            ));
        }

        let mut launch =
            LaunchSpec::new(&self.config.command).with_args(self.config.args.clone());
        for (key, value) in &self.config.env {
            launch = launch.with_env(key, value);
        }

        if let Some(credential) = &self.config.credential {
            let secret = self.resolve_credential(credential).await?;
            launch = launch.with_env(&credential.env_var, secret);
        }

        session.start(&launch, &self.identity).await
    }

    async fn resolve_credential(&self, config: &CredentialConfig) -> SessionResult<String> {
        let secret = match &self.credentials {
            Some(provider) => {
                provider
                    .credential(&config.provider, &config.service)
                    .await?
            }
            None => config.fallback.clone().ok_or_else(|| {
                SessionError::unavailable(format!(
                    "no credential configured for {}/{}",
                    config.provider, config.service
                ))
            })?,
        };

        if secret.is_empty() {
            return Err(SessionError::unavailable(format!(
                "empty credential for {}/{}",
                config.provider, config.service
            )));
        }

        Ok(secret)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn missing_command_is_unavailable() {
        let client = ToolServerClient::new(ServerConfig::default());
        let err = client.ensure_started().await.expect_err("should fail");
        assert!(matches!(err, SessionError::Unavailable { .. }));
        assert_eq!(client.state().await, SessionState::NotStarted);
    }

    #[tokio::test]
    async fn missing_credential_is_unavailable_before_spawn() {
        let config = ServerConfig {
            command: "definitely-not-a-real-binary".to_owned(),
            credential: Some(CredentialConfig {
                env_var: "API_TOKEN".to_owned(),
                provider: "notion".to_owned(),
                service: "database".to_owned(),
                fallback: None,
            }),
            ..ServerConfig::default()
        };

        let client = ToolServerClient::new(config);
        let err = client.ensure_started().await.expect_err("should fail");
        assert!(matches!(err, SessionError::Unavailable { .. }));
        // Credential resolution fails before any spawn attempt.
        assert_eq!(client.state().await, SessionState::NotStarted);
    }

    #[test]
    fn credential_debug_is_redacted() {
        let credential = CredentialConfig {
            env_var: "API_TOKEN".to_owned(),
            provider: "notion".to_owned(),
            service: "database".to_owned(),
            fallback: Some("super-secret".to_owned()),
        };

        let printed = format!("{credential:?}");
        assert!(!printed.contains("super-secret"));
        assert!(printed.contains("<redacted>"));
    }

    #[test]
    fn server_config_deserializes_from_json() {
        let config: ServerConfig = serde_json::from_str(
            r#"{
                "command": "npx",
                "args": ["-y", "@notionhq/notion-mcp-server"],
                "credential": {
                    "env_var": "NOTION_API_KEY",
                    "provider": "notion",
                    "service": "database"
                }
            }"#,
        )
        .unwrap();

        assert_eq!(config.command, "npx");
        assert_eq!(config.args.len(), 2);
        assert!(config.credential.is_some());
    }
}
