//! Wire envelopes for the line-delimited tool-server protocol.

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::session::{SessionError, SessionResult};

/// Protocol version advertised during the handshake.
pub const PROTOCOL_VERSION: &str = "2024-11-05";

const JSONRPC_VERSION: &str = "2.0";

/// Identity the client presents to the tool server during the handshake.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientIdentity {
    name: String,
    version: String,
}

impl ClientIdentity {
    /// Creates an identity from a client name and version string.
    #[must_use]
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
        }
    }

    /// Returns the client name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the client version string.
    #[must_use]
    pub fn version(&self) -> &str {
        &self.version
    }
}

impl Default for ClientIdentity {
    fn default() -> Self {
        Self::new("armory", env!("CARGO_PKG_VERSION"))
    }
}

/// One request line sent to the tool server.
#[derive(Debug, Serialize)]
pub struct RpcRequest {
    jsonrpc: &'static str,
    id: u64,
    method: String,
    params: Value,
}

impl RpcRequest {
    /// Builds a request envelope for the supplied call id and method.
    #[must_use]
    pub fn new(id: u64, method: impl Into<String>, params: Value) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION,
            id,
            method: method.into(),
            params,
        }
    }

    /// Returns the call id.
    #[must_use]
    pub const fn id(&self) -> u64 {
        self.id
    }

    /// Returns the method name.
    #[must_use]
    pub fn method(&self) -> &str {
        &self.method
    }
}

/// Builds the `initialize` handshake request.
#[must_use]
pub fn handshake_request(id: u64, identity: &ClientIdentity) -> RpcRequest {
    RpcRequest::new(
        id,
        "initialize",
        json!({
            "protocolVersion": PROTOCOL_VERSION,
            "capabilities": {},
            "clientInfo": {
                "name": identity.name(),
                "version": identity.version(),
            },
        }),
    )
}

/// One response line read back from the tool server.
#[derive(Debug, Deserialize)]
pub struct RpcResponse {
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<Value>,
}

impl RpcResponse {
    /// Returns the error payload, if the server reported one.
    #[must_use]
    pub fn error(&self) -> Option<&Value> {
        self.error.as_ref()
    }

    /// Returns the result payload, if present.
    #[must_use]
    pub fn result(&self) -> Option<&Value> {
        self.result.as_ref()
    }

    /// Extracts the result payload.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Protocol`] carrying the server's error
    /// payload verbatim, or a protocol error when the envelope holds
    /// neither result nor error.
    pub fn into_result(self) -> SessionResult<Value> {
        if let Some(error) = self.error {
            return Err(SessionError::Protocol {
                detail: error.to_string(),
            });
        }

        self.result.ok_or_else(|| SessionError::Protocol {
            detail: "response carried neither result nor error".to_owned(),
        })
    }
}
