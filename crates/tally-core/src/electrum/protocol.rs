use serde::{Deserialize, Serialize};

use crate::error::ElectrumError;

#[derive(Debug, Clone, Serialize)]
pub(crate) struct Request {
    pub(crate) jsonrpc: &'static str,
    pub(crate) id: u64,
    pub(crate) method: String,
    pub(crate) params: Vec<serde_json::Value>,
}

impl Request {
    pub(crate) fn new(id: u64, method: &str, params: Vec<serde_json::Value>) -> Self {
        Self {
            jsonrpc: "2.0",
            id,
            method: method.to_owned(),
            params,
        }
    }
}

/// An incoming message. Responses carry `id`; server notifications carry
/// `method` and no `id`.
#[derive(Debug, Deserialize)]
pub(crate) struct Response {
    #[serde(default)]
    pub(crate) id: Option<serde_json::Value>,
    #[serde(default)]
    pub(crate) method: Option<String>,
    #[serde(default)]
    pub(crate) result: Option<serde_json::Value>,
    #[serde(default)]
    pub(crate) error: Option<serde_json::Value>,
}

impl Response {
    pub(crate) fn into_result(self) -> Result<serde_json::Value, ElectrumError> {
        match self.error {
            Some(err) if !err.is_null() => Err(parse_jsonrpc_error(err)),
            _ => Ok(self.result.unwrap_or(serde_json::Value::Null)),
        }
    }
}

/// Parse a JSON-RPC error value into a structured `ElectrumError`.
///
/// Well-formed errors are `{"code": <int>, "message": <string>}`. Some
/// servers send a bare string; anything else becomes `InvalidResponse`.
pub(crate) fn parse_jsonrpc_error(err: serde_json::Value) -> ElectrumError {
    #[derive(Deserialize)]
    struct JsonRpcError {
        code: i64,
        message: String,
    }

    if let Some(message) = err.as_str() {
        return ElectrumError::ServerError {
            code: 0,
            message: message.to_owned(),
        };
    }

    match serde_json::from_value::<JsonRpcError>(err.clone()) {
        Ok(parsed) => ElectrumError::ServerError {
            code: parsed.code,
            message: parsed.message,
        },
        Err(_) => ElectrumError::InvalidResponse(format!("non-standard JSON-RPC error: {err}")),
    }
}

/// Response ids are echoed back as sent (a number), but some servers
/// stringify them.
pub(crate) fn parse_response_id(id: &serde_json::Value) -> Option<u64> {
    if let Some(n) = id.as_u64() {
        return Some(n);
    }
    id.as_str().and_then(|s| s.parse::<u64>().ok())
}

// ==============================================================================
// Method Names
// ==============================================================================

/// Which generation of address-indexed methods to call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProtocolFlavor {
    /// `blockchain.scripthash.*`, keyed by scripthash (protocol 1.1+).
    #[default]
    Scripthash,
    /// Deprecated `blockchain.address.*`, keyed by the address string.
    LegacyAddress,
}

impl ProtocolFlavor {
    pub(crate) fn history_method(self) -> &'static str {
        match self {
            Self::Scripthash => "blockchain.scripthash.get_history",
            Self::LegacyAddress => "blockchain.address.get_history",
        }
    }

    pub(crate) fn balance_method(self) -> &'static str {
        match self {
            Self::Scripthash => "blockchain.scripthash.get_balance",
            Self::LegacyAddress => "blockchain.address.get_balance",
        }
    }

    pub(crate) fn header_method(self) -> &'static str {
        match self {
            Self::Scripthash => "blockchain.block.header",
            Self::LegacyAddress => "blockchain.block.get_header",
        }
    }
}

pub(crate) const SERVER_VERSION: &str = "server.version";
pub(crate) const TRANSACTION_GET: &str = "blockchain.transaction.get";
