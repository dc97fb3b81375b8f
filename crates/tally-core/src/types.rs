//! Domain types for Tally's address and transaction model.
//!
//! Contains the decoded transaction types (`Transaction`, `TxInput`,
//! `TxOutput`), address history and balance results, and the request/report
//! types of the batched transaction aggregator.

use bitcoin::block::Header;
use bitcoin::{Amount, BlockHash, OutPoint, Script, ScriptBuf, SignedAmount, Txid, Wtxid};
use serde::{Deserialize, Serialize};

// ==============================================================================
// Script Type Classification
// ==============================================================================

/// Classifies a script output type. Delegates detection to the `bitcoin` crate's
/// `Script::is_p2pkh()`, `is_p2sh()`, etc. methods.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScriptType {
    P2pkh,
    P2sh,
    P2wpkh,
    P2wsh,
    P2tr,
    BareMultisig,
    OpReturn,
    Unknown,
}

impl ScriptType {
    pub fn classify(script: &Script) -> Self {
        if script.is_p2pkh() {
            Self::P2pkh
        } else if script.is_p2sh() {
            Self::P2sh
        } else if script.is_p2wpkh() {
            Self::P2wpkh
        } else if script.is_p2wsh() {
            Self::P2wsh
        } else if script.is_p2tr() {
            Self::P2tr
        } else if script.is_multisig() {
            Self::BareMultisig
        } else if script.is_op_return() {
            Self::OpReturn
        } else {
            Self::Unknown
        }
    }
}

impl std::fmt::Display for ScriptType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::P2pkh => write!(f, "p2pkh"),
            Self::P2sh => write!(f, "p2sh"),
            Self::P2wpkh => write!(f, "p2wpkh"),
            Self::P2wsh => write!(f, "p2wsh"),
            Self::P2tr => write!(f, "p2tr"),
            Self::BareMultisig => write!(f, "bare_multisig"),
            Self::OpReturn => write!(f, "op_return"),
            Self::Unknown => write!(f, "unknown"),
        }
    }
}

// ==============================================================================
// Address History and Balance
// ==============================================================================

/// One `(tx_hash, height)` pair of an address history.
///
/// `height` is whatever the peer reported: positive for confirmed entries,
/// `0` or `-1` for mempool entries. It is informational only; confirmation
/// filtering uses the transaction's own confirmation count.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub tx_hash: Txid,
    pub height: i64,
    /// Mempool entries carry the fee paid, in satoshis.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fee: Option<u64>,
}

/// Confirmed and unconfirmed totals for an address, in satoshis.
///
/// The unconfirmed part is negative when mempool transactions spend more
/// from the address than they pay into it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Balance {
    #[serde(default)]
    pub confirmed: i64,
    #[serde(default)]
    pub unconfirmed: i64,
}

impl Balance {
    pub fn total(&self) -> SignedAmount {
        SignedAmount::from_sat(self.confirmed.saturating_add(self.unconfirmed))
    }
}

/// Result of the `server.version` handshake.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerVersion {
    pub server_software: String,
    pub protocol_version: String,
}

/// A block header fetched by height.
#[derive(Debug, Clone, Serialize)]
pub struct BlockHeaderInfo {
    pub height: u32,
    pub block_hash: BlockHash,
    pub header: Header,
}

// ==============================================================================
// Transaction Types
// ==============================================================================

/// A verbose transaction as returned by `blockchain.transaction.get`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transaction {
    pub txid: Txid,
    pub wtxid: Option<Wtxid>,
    pub version: i32,
    pub locktime: u32,
    pub size: u64,
    pub vsize: Option<u64>,
    pub weight: Option<u64>,
    /// Blocks mined on top of (and including) the containing block.
    /// `0` for mempool transactions.
    pub confirmations: u64,
    pub block_hash: Option<BlockHash>,
    pub block_time: Option<u64>,
    pub inputs: Vec<TxInput>,
    pub outputs: Vec<TxOutput>,
}

impl Transaction {
    /// A coinbase transaction has exactly one input whose prevout is `None`.
    pub fn is_coinbase(&self) -> bool {
        self.inputs.len() == 1 && self.inputs[0].prevout.is_none()
    }
}

/// A transaction input. For coinbase inputs, `prevout` is `None`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TxInput {
    pub prevout: Option<OutPoint>,
    pub sequence: u32,
}

/// A transaction output.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TxOutput {
    pub value: Amount,
    pub script_pub_key: ScriptBuf,
    pub script_type: ScriptType,
    /// Address encoding of the script on the client's network, when one exists.
    pub address: Option<String>,
}

// ==============================================================================
// Batch Aggregation
// ==============================================================================

/// Parameters of a batched history-to-transactions lookup.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct TransactionQuery {
    pub min_confirmations: u64,
    pub batch_size: usize,
}

impl Default for TransactionQuery {
    fn default() -> Self {
        Self {
            min_confirmations: 3,
            batch_size: 10,
        }
    }
}

/// A history entry whose transaction could not be fetched.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchFailure {
    pub txid: Txid,
    pub error: String,
}

/// Partition of one batch's items into fetched transactions and failures.
#[derive(Debug, Default)]
pub struct BatchOutcome {
    pub fetched: Vec<Transaction>,
    pub failed: Vec<FetchFailure>,
}

/// Result of a batched transaction lookup for one address.
///
/// Every history entry missing from `transactions` is listed either in
/// `below_threshold` or in `failures`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TransactionReport {
    pub transactions: Vec<Transaction>,
    pub below_threshold: Vec<Txid>,
    pub failures: Vec<FetchFailure>,
}

impl TransactionReport {
    pub fn is_partial(&self) -> bool {
        !self.failures.is_empty()
    }
}

/// Per-address entry of a multi-address lookup. `error` is set when the
/// address itself could not be resolved; the report is then empty.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AddressTransactions {
    pub address: String,
    #[serde(flatten)]
    pub report: TransactionReport,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}
