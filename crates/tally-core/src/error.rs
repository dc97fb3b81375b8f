use std::time::Duration;

use bitcoin::Txid;

#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error(transparent)]
    Electrum(#[from] ElectrumError),

    #[error("invalid address `{address}`: {reason}")]
    InvalidAddress { address: String, reason: String },

    #[error("transaction not found: {0}")]
    TxNotFound(Txid),

    #[error("invalid transaction data: {0}")]
    InvalidTxData(String),

    #[error("invalid configuration: {0}")]
    Config(String),
}

impl CoreError {
    /// `true` when the failure concerns a single address rather than the
    /// session it was issued on. Multi-address lookups record these per
    /// address and keep going.
    pub fn is_address_scoped(&self) -> bool {
        matches!(
            self,
            Self::InvalidAddress { .. } | Self::Electrum(ElectrumError::ServerError { .. })
        )
    }
}

/// Failures of the Electrum transport and JSON-RPC layer.
#[derive(Debug, thiserror::Error)]
pub enum ElectrumError {
    /// Every peer in the registry failed to produce a secure session.
    #[error("could not connect to any of {attempts} peer(s); last failure from {peer}: {source}")]
    Connection {
        attempts: usize,
        peer: String,
        #[source]
        source: std::io::Error,
    },

    #[error("peer registry is empty")]
    NoPeers,

    /// The peer answered with a well-formed `{code, message}` error object.
    #[error("server error {code}: {message}")]
    ServerError { code: i64, message: String },

    #[error("connection closed without response")]
    StreamClosed,

    #[error("`{method}` timed out after {timeout:?}")]
    Timeout {
        method: String,
        timeout: Duration,
    },

    #[error("`{method}` was cancelled")]
    Cancelled { method: String },

    #[error("invalid response: {0}")]
    InvalidResponse(String),

    #[error("transport error: {0}")]
    Transport(#[from] std::io::Error),
}
