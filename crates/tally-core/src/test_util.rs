//! Shared test helpers for `tally-core` unit tests.
//!
//! Builders for the JSON shapes Electrum servers return (verbose
//! transactions, histories, headers) so tests across modules share a single
//! source of truth for dummy data.

use bitcoin::hashes::Hash;
use bitcoin::Txid;

// ==============================================================================
// Txid Helpers
// ==============================================================================

/// Create a deterministic `Txid` from a single distinguishing byte.
pub fn txid_from_byte(b: u8) -> Txid {
    let mut bytes = [0u8; 32];
    bytes[0] = b;
    Txid::from_byte_array(bytes)
}

// ==============================================================================
// JSON Fixtures
// ==============================================================================

/// Address whose scripthash is documented by the Electrum protocol.
pub const GENESIS_ADDRESS: &str = "1A1zP1eP5QGefi2DMPTfTL5SLmv7DivfNa";
pub const GENESIS_SCRIPTHASH: &str =
    "8b01df4e368ea28f8dc0423bcf7a4923e3a12d307c875e47a0cfbf90b5c39161";

/// Serialized mainnet genesis block header.
pub const GENESIS_HEADER_HEX: &str = "0100000000000000000000000000000000000000000000000000000000000000000000003ba3edfd7a7b12b27ac72c3e67768f617fc81bc3888a51323a9fb8aa4b1e5e4a29ab5f49ffff001d1dac2b7c";
pub const GENESIS_BLOCK_HASH: &str =
    "000000000019d6689c085ae165831e934ff763ae46a2a6c172b3f1b60a8ce26f";

/// A verbose `blockchain.transaction.get` result spending one outpoint into
/// one P2WPKH output of 5000 sats.
pub fn verbose_tx_json(txid: Txid, confirmations: u64) -> serde_json::Value {
    let mut tx = serde_json::json!({
        "txid": txid.to_string(),
        "hash": txid.to_string(),
        "version": 2,
        "size": 222,
        "vsize": 141,
        "weight": 561,
        "locktime": 0,
        "hex": "02000000000101",
        "vin": [{
            "txid": txid_from_byte(0xee).to_string(),
            "vout": 1,
            "scriptSig": {"asm": "", "hex": ""},
            "txinwitness": ["3044", "02aa"],
            "sequence": 4294967293u64,
        }],
        "vout": [{
            "value": 0.00005,
            "n": 0,
            "scriptPubKey": {
                "asm": "0 0102030405060708090a0b0c0d0e0f1011121314",
                "hex": "00140102030405060708090a0b0c0d0e0f1011121314",
                "type": "witness_v0_keyhash",
            },
        }],
    });
    if confirmations > 0 {
        tx["confirmations"] = serde_json::json!(confirmations);
        tx["blockhash"] = serde_json::json!(GENESIS_BLOCK_HASH);
        tx["blocktime"] = serde_json::json!(1_700_000_000u64);
        tx["time"] = serde_json::json!(1_700_000_000u64);
    }
    tx
}

/// A `get_history` result listing `entries` as `(txid, height)`.
pub fn history_json(entries: &[(Txid, i64)]) -> serde_json::Value {
    serde_json::Value::Array(
        entries
            .iter()
            .map(|(txid, height)| serde_json::json!({"tx_hash": txid.to_string(), "height": height}))
            .collect(),
    )
}
