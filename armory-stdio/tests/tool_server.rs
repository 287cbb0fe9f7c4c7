//! End-to-end tests against real child processes.
//!
//! The servers here are tiny `awk`/`sh` line responders: they read one
//! request line and emit one response line, which is exactly the contract
//! the session relies on.

use std::sync::Arc;

use armory_primitives::{JsonSchema, SessionId};
use armory_registry::tool::{Tool, ToolCategory, ToolMetadata, ToolOptionality};
use armory_stdio::client::{
    CredentialConfig, CredentialProvider, ServerConfig, ToolServerClient,
};
use armory_stdio::remote::RemoteTool;
use armory_stdio::session::{SessionError, SessionResult, SessionState};
use async_trait::async_trait;
use serde_json::json;

/// Responds to every request line with `{"result": {"seq": N}}` where N is
/// the 1-based line number, so tests can observe the write→read cycling.
const SEQ_RESPONDER: &str =
    r#"{ printf "{\"jsonrpc\":\"2.0\",\"id\":%d,\"result\":{\"seq\":%d}}\n", NR, NR; fflush() }"#;

/// Accepts the handshake, then answers every later request with an error.
const ERROR_RESPONDER: &str = r#"NR == 1 { printf "{\"jsonrpc\":\"2.0\",\"id\":1,\"result\":{}}\n"; fflush(); next } { printf "{\"jsonrpc\":\"2.0\",\"id\":%d,\"error\":{\"code\":-32601,\"message\":\"method not found\"}}\n", NR; fflush() }"#;

fn seq_server() -> ServerConfig {
    ServerConfig {
        command: "awk".to_owned(),
        args: vec![SEQ_RESPONDER.to_owned()],
        ..ServerConfig::default()
    }
}

#[tokio::test]
async fn handshake_then_strict_call_cycling() {
    let client = ToolServerClient::new(seq_server());

    // The handshake consumes line 1, so calls observe lines 2 and 3.
    let first = client.call("tools/list", json!({})).await.unwrap();
    assert_eq!(first, json!({"seq": 2}));
    assert_eq!(client.state().await, SessionState::Ready);

    let second = client.call("tools/list", json!({})).await.unwrap();
    assert_eq!(second, json!({"seq": 3}));

    client.stop().await;
    assert_eq!(client.state().await, SessionState::NotStarted);
}

#[tokio::test]
async fn ensure_started_is_idempotent() {
    let client = ToolServerClient::new(seq_server());

    client.ensure_started().await.unwrap();
    client.ensure_started().await.unwrap();

    // Only the single handshake line has been consumed.
    let result = client.call("tools/list", json!({})).await.unwrap();
    assert_eq!(result, json!({"seq": 2}));
}

#[tokio::test]
async fn protocol_error_leaves_session_ready() {
    let client = ToolServerClient::new(ServerConfig {
        command: "awk".to_owned(),
        args: vec![ERROR_RESPONDER.to_owned()],
        ..ServerConfig::default()
    });

    let err = client
        .call("tools/call", json!({"name": "search"}))
        .await
        .expect_err("server reports an error");

    match err {
        SessionError::Protocol { detail } => assert!(detail.contains("method not found")),
        other => panic!("unexpected error: {other:?}"),
    }

    // An explicit error payload is not a transport failure; the session
    // stays usable.
    assert_eq!(client.state().await, SessionState::Ready);
}

#[tokio::test]
async fn spawn_failure_marks_session_failed() {
    let client = ToolServerClient::new(ServerConfig {
        command: "armory-no-such-binary".to_owned(),
        ..ServerConfig::default()
    });

    let err = client.ensure_started().await.expect_err("spawn must fail");
    assert!(matches!(err, SessionError::Transport { .. }));
    assert_eq!(client.state().await, SessionState::Failed);
}

#[tokio::test]
async fn exiting_server_fails_handshake() {
    let client = ToolServerClient::new(ServerConfig {
        command: "sh".to_owned(),
        args: vec!["-c".to_owned(), "exit 1".to_owned()],
        ..ServerConfig::default()
    });

    let err = client.ensure_started().await.expect_err("handshake must fail");
    assert!(matches!(err, SessionError::Transport { .. }));
    assert_eq!(client.state().await, SessionState::Failed);
}

#[tokio::test]
async fn failed_handshake_recovers_on_retry() {
    // The first launch dies before the handshake; every later launch
    // becomes a working responder.
    let marker = std::env::temp_dir().join(format!("armory-retry-{}", SessionId::random()));
    let script = format!(
        r#"if [ ! -e "$ARMORY_RETRY_MARKER" ]; then : > "$ARMORY_RETRY_MARKER"; exit 1; fi; exec awk '{SEQ_RESPONDER}'"#
    );

    let mut config = ServerConfig {
        command: "sh".to_owned(),
        args: vec!["-c".to_owned(), script],
        ..ServerConfig::default()
    };
    config.env.insert(
        "ARMORY_RETRY_MARKER".to_owned(),
        marker.display().to_string(),
    );

    let client = ToolServerClient::new(config);

    let err = client.ensure_started().await.expect_err("first start fails");
    assert!(matches!(err, SessionError::Transport { .. }));
    assert_eq!(client.state().await, SessionState::Failed);

    client.ensure_started().await.expect("retry succeeds");
    assert_eq!(client.state().await, SessionState::Ready);

    let _ = std::fs::remove_file(marker);
}

struct StaticProvider {
    secret: &'static str,
}

#[async_trait]
impl CredentialProvider for StaticProvider {
    async fn credential(&self, _provider: &str, _service: &str) -> SessionResult<String> {
        Ok(self.secret.to_owned())
    }
}

#[tokio::test]
async fn credential_reaches_child_env_but_never_the_wire() {
    // The responder refuses to start unless the credential arrived in its
    // environment, and kills itself if the handshake line leaks it.
    let script = concat!(
        r#"[ "$API_TOKEN" = "token-from-provider" ] || exit 1; "#,
        r#"read line; case "$line" in *token-from-provider*) exit 1 ;; esac; "#,
        r#"printf '{"jsonrpc":"2.0","id":1,"result":{}}\n'; "#,
        r#"exec awk '{ printf "{\"jsonrpc\":\"2.0\",\"id\":%d,\"result\":{\"ok\":true}}\n", NR; fflush() }'"#,
    );

    let config = ServerConfig {
        command: "sh".to_owned(),
        args: vec!["-c".to_owned(), script.to_owned()],
        credential: Some(CredentialConfig {
            env_var: "API_TOKEN".to_owned(),
            provider: "notion".to_owned(),
            service: "database".to_owned(),
            fallback: None,
        }),
        ..ServerConfig::default()
    };

    let client = ToolServerClient::new(config).with_credential_provider(Arc::new(StaticProvider {
        secret: "token-from-provider",
    }));

    client.ensure_started().await.unwrap();
    let result = client.call("tools/list", json!({})).await.unwrap();
    assert_eq!(result, json!({"ok": true}));
}

#[tokio::test]
async fn credential_fallback_is_used_without_a_provider() {
    let script = concat!(
        r#"[ "$API_TOKEN" = "fallback-token" ] || exit 1; "#,
        r#"exec awk '{ printf "{\"jsonrpc\":\"2.0\",\"id\":%d,\"result\":{}}\n", NR; fflush() }'"#,
    );

    let config = ServerConfig {
        command: "sh".to_owned(),
        args: vec!["-c".to_owned(), script.to_owned()],
        credential: Some(CredentialConfig {
            env_var: "API_TOKEN".to_owned(),
            provider: "notion".to_owned(),
            service: "database".to_owned(),
            fallback: Some("fallback-token".to_owned()),
        }),
        ..ServerConfig::default()
    };

    let client = ToolServerClient::new(config);
    client.ensure_started().await.unwrap();
    assert_eq!(client.state().await, SessionState::Ready);
}

#[tokio::test]
async fn remote_tool_round_trip() {
    let client = Arc::new(ToolServerClient::new(seq_server()));
    let tool = RemoteTool::new("search", "Remote search", client).with_metadata(
        ToolMetadata::new(ToolCategory::Research, ToolOptionality::Optional).with_schema(
            JsonSchema::object()
                .with_property("query", JsonSchema::string())
                .with_required(["query"]),
        ),
    );

    let outcome = tool.execute(json!({"query": "rust"})).await.unwrap();
    assert!(outcome.success);
    assert!(outcome.output.contains("seq"));
}

#[tokio::test]
async fn invalid_input_never_spawns_a_process() {
    let client = Arc::new(ToolServerClient::new(ServerConfig {
        command: "armory-no-such-binary".to_owned(),
        ..ServerConfig::default()
    }));

    let tool = RemoteTool::new("search", "Remote search", Arc::clone(&client)).with_metadata(
        ToolMetadata::new(ToolCategory::Research, ToolOptionality::Optional).with_schema(
            JsonSchema::object()
                .with_property("query", JsonSchema::string())
                .with_required(["query"]),
        ),
    );

    let outcome = tool.execute(json!({})).await.unwrap();
    assert!(!outcome.success);
    assert_eq!(outcome.error.as_deref(), Some("query is required"));

    // Validation failed fast: the broken command was never launched.
    assert_eq!(client.state().await, SessionState::NotStarted);
}

#[tokio::test]
async fn unavailable_server_surfaces_as_failed_outcome() {
    let client = Arc::new(ToolServerClient::new(ServerConfig {
        command: "armory-no-such-binary".to_owned(),
        ..ServerConfig::default()
    }));

    let tool = RemoteTool::new("search", "Remote search", client);
    let outcome = tool.execute(json!({"query": "rust"})).await.unwrap();

    assert!(!outcome.success);
    assert!(outcome.error.unwrap().contains("armory-no-such-binary"));
}
