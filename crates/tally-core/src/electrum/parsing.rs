use bitcoin::block::{Header, Version};
use bitcoin::hashes::Hash;
use bitcoin::{
    Address, Amount, BlockHash, CompactTarget, Network, OutPoint, ScriptBuf, TxMerkleNode, Txid,
    Wtxid,
};

use crate::error::{CoreError, ElectrumError};
use crate::types::{
    Balance, BlockHeaderInfo, HistoryEntry, ScriptType, ServerVersion, Transaction, TxInput,
    TxOutput,
};

// ==============================================================================
// Transactions
// ==============================================================================

/// Decode a verbose `blockchain.transaction.get` result.
///
/// Mempool transactions omit `confirmations`, `blockhash` and `blocktime`;
/// a missing confirmation count is read as zero.
pub(super) fn parse_transaction(
    raw: serde_json::Value,
    network: Network,
) -> Result<Transaction, CoreError> {
    if !raw.is_object() {
        return Err(CoreError::InvalidTxData(format!(
            "expected verbose transaction object, got: {raw}"
        )));
    }

    let txid = parse_txid(raw.get("txid"), "txid")?;
    let wtxid = raw
        .get("hash")
        .and_then(serde_json::Value::as_str)
        .and_then(|s| s.parse::<Wtxid>().ok());
    let vin = raw
        .get("vin")
        .and_then(serde_json::Value::as_array)
        .ok_or_else(|| CoreError::InvalidTxData("missing vin".into()))?;
    let vout = raw
        .get("vout")
        .and_then(serde_json::Value::as_array)
        .ok_or_else(|| CoreError::InvalidTxData("missing vout".into()))?;

    Ok(Transaction {
        txid,
        wtxid,
        version: parse_integer_required::<i32, true>(raw.get("version"), "version")?,
        locktime: parse_integer_required::<u32, false>(raw.get("locktime"), "locktime")?,
        size: parse_integer_required::<u64, false>(raw.get("size"), "size")?,
        vsize: parse_integer_optional::<u64, false>(raw.get("vsize")),
        weight: parse_integer_optional::<u64, false>(raw.get("weight")),
        confirmations: parse_integer_optional::<u64, false>(raw.get("confirmations"))
            .unwrap_or(0),
        block_hash: parse_opt_block_hash(raw.get("blockhash"))?,
        block_time: parse_integer_optional::<u64, false>(raw.get("blocktime")),
        inputs: parse_vin(vin)?,
        outputs: parse_vout(vout, network)?,
    })
}

/// Non-verbose `blockchain.transaction.get` returns the serialized hex.
pub(super) fn parse_raw_transaction(raw: serde_json::Value) -> Result<String, CoreError> {
    match raw {
        serde_json::Value::String(hex) if !hex.is_empty() => Ok(hex),
        other => Err(CoreError::InvalidTxData(format!(
            "expected raw transaction hex, got: {other}"
        ))),
    }
}

fn parse_txid(value: Option<&serde_json::Value>, field: &str) -> Result<Txid, CoreError> {
    let value = value
        .and_then(serde_json::Value::as_str)
        .ok_or_else(|| CoreError::InvalidTxData(format!("missing {field}")))?;
    value
        .parse()
        .map_err(|e| CoreError::InvalidTxData(format!("invalid {field}: {e}")))
}

fn parse_opt_block_hash(value: Option<&serde_json::Value>) -> Result<Option<BlockHash>, CoreError> {
    match value.and_then(serde_json::Value::as_str) {
        None => Ok(None),
        Some(s) => s
            .parse()
            .map(Some)
            .map_err(|e| CoreError::InvalidTxData(format!("invalid blockhash: {e}"))),
    }
}

fn parse_integer_required<T, const SIGNED: bool>(
    value: Option<&serde_json::Value>,
    field: &str,
) -> Result<T, CoreError>
where
    T: TryFrom<i64> + TryFrom<u64>,
{
    parse_integer::<T, SIGNED, true>(value, field)?
        .ok_or_else(|| CoreError::InvalidTxData(format!("missing {field}")))
}

fn parse_integer_optional<T, const SIGNED: bool>(value: Option<&serde_json::Value>) -> Option<T>
where
    T: TryFrom<i64> + TryFrom<u64>,
{
    parse_integer::<T, SIGNED, false>(value, "value")
        .ok()
        .flatten()
}

// `REQUIRED=false` treats missing/null/type-mismatch as `Ok(None)`.
fn parse_integer<T, const SIGNED: bool, const REQUIRED: bool>(
    value: Option<&serde_json::Value>,
    field: &str,
) -> Result<Option<T>, CoreError>
where
    T: TryFrom<i64> + TryFrom<u64>,
{
    let missing_or_none = || {
        if REQUIRED {
            Err(CoreError::InvalidTxData(format!("missing {field}")))
        } else {
            Ok(None)
        }
    };

    let Some(value) = value else {
        return missing_or_none();
    };

    if SIGNED {
        let Some(n) = value.as_i64() else {
            return missing_or_none();
        };
        T::try_from(n)
            .map(Some)
            .map_err(|_| CoreError::InvalidTxData(format!("{field} out of range: {n}")))
    } else {
        let Some(n) = value.as_u64() else {
            return missing_or_none();
        };
        T::try_from(n)
            .map(Some)
            .map_err(|_| CoreError::InvalidTxData(format!("{field} out of range: {n}")))
    }
}

fn parse_vin(vin: &[serde_json::Value]) -> Result<Vec<TxInput>, CoreError> {
    vin.iter()
        .map(|input| {
            let sequence = parse_integer_required::<u32, false>(input.get("sequence"), "sequence")?;
            let prevout = if input.get("coinbase").is_some() {
                None
            } else {
                let prev_txid = parse_txid(input.get("txid"), "vin.txid")?;
                let prev_vout =
                    parse_integer_required::<u32, false>(input.get("vout"), "vin.vout")?;
                Some(OutPoint::new(prev_txid, prev_vout))
            };
            Ok(TxInput { prevout, sequence })
        })
        .collect()
}

fn parse_vout(vout: &[serde_json::Value], network: Network) -> Result<Vec<TxOutput>, CoreError> {
    vout.iter()
        .map(|output| {
            let value = parse_btc_amount(
                output
                    .get("value")
                    .ok_or_else(|| CoreError::InvalidTxData("missing value in vout".into()))?,
            )?;
            let script_pub_key =
                parse_script_pubkey_from_json(output.get("scriptPubKey").ok_or_else(|| {
                    CoreError::InvalidTxData("missing scriptPubKey in vout".into())
                })?)?;
            let script_type = ScriptType::classify(&script_pub_key);
            let address = Address::from_script(&script_pub_key, network)
                .ok()
                .map(|a| a.to_string());

            Ok(TxOutput {
                value,
                script_pub_key,
                script_type,
                address,
            })
        })
        .collect()
}

fn parse_script_pubkey_from_json(spk: &serde_json::Value) -> Result<ScriptBuf, CoreError> {
    let hex_str = spk
        .get("hex")
        .and_then(serde_json::Value::as_str)
        .ok_or_else(|| CoreError::InvalidTxData("missing hex in scriptPubKey".into()))?;
    ScriptBuf::from_hex(hex_str)
        .map_err(|e| CoreError::InvalidTxData(format!("invalid scriptPubKey hex: {e}")))
}

/// Parse a BTC amount from a JSON value.
///
/// Number values are parsed via `Amount::from_float_in` to support scientific
/// notation, while string values are parsed via `Amount::from_str_in`.
fn parse_btc_amount(value: &serde_json::Value) -> Result<Amount, CoreError> {
    match value {
        serde_json::Value::Number(n) => {
            let parsed = n
                .as_f64()
                .ok_or_else(|| CoreError::InvalidTxData(format!("invalid BTC amount `{value}`")))?;
            Amount::from_float_in(parsed, bitcoin::Denomination::Bitcoin)
                .map_err(|e| CoreError::InvalidTxData(format!("invalid BTC amount `{value}`: {e}")))
        }
        serde_json::Value::String(s) => Amount::from_str_in(s, bitcoin::Denomination::Bitcoin)
            .map_err(|e| CoreError::InvalidTxData(format!("invalid BTC amount `{s}`: {e}"))),
        _ => Err(CoreError::InvalidTxData(format!(
            "expected numeric BTC amount, got: {value}"
        ))),
    }
}

// ==============================================================================
// Address Queries
// ==============================================================================

pub(super) fn parse_history(raw: serde_json::Value) -> Result<Vec<HistoryEntry>, ElectrumError> {
    if raw.is_null() {
        return Ok(Vec::new());
    }
    serde_json::from_value(raw).map_err(|e| ElectrumError::InvalidResponse(format!("history: {e}")))
}

/// An absent balance (`null`) is an address with nothing on it.
pub(super) fn parse_balance(raw: serde_json::Value) -> Result<Balance, ElectrumError> {
    if raw.is_null() {
        return Ok(Balance::default());
    }
    serde_json::from_value(raw).map_err(|e| ElectrumError::InvalidResponse(format!("balance: {e}")))
}

// ==============================================================================
// Server and Headers
// ==============================================================================

/// `server.version` answers `[server_software, protocol_version]`.
pub(super) fn parse_server_version(raw: serde_json::Value) -> Result<ServerVersion, ElectrumError> {
    let (server_software, protocol_version): (String, String) = serde_json::from_value(raw)
        .map_err(|e| ElectrumError::InvalidResponse(format!("server.version: {e}")))?;
    Ok(ServerVersion {
        server_software,
        protocol_version,
    })
}

/// Decode a header result: protocol 1.4 servers send the 80-byte header as
/// hex, older ones (`blockchain.block.get_header`) send a JSON object.
pub(super) fn parse_block_header(
    raw: serde_json::Value,
    height: u32,
) -> Result<BlockHeaderInfo, ElectrumError> {
    let header = match raw {
        serde_json::Value::String(hex) => {
            bitcoin::consensus::encode::deserialize_hex::<Header>(&hex)
                .map_err(|e| ElectrumError::InvalidResponse(format!("block header hex: {e}")))?
        }
        serde_json::Value::Object(_) => parse_legacy_header(&raw)?,
        other => {
            return Err(ElectrumError::InvalidResponse(format!(
                "unexpected block header shape: {other}"
            )))
        }
    };

    Ok(BlockHeaderInfo {
        height,
        block_hash: header.block_hash(),
        header,
    })
}

fn parse_legacy_header(raw: &serde_json::Value) -> Result<Header, ElectrumError> {
    let field = |name: &str| {
        raw.get(name)
            .ok_or_else(|| ElectrumError::InvalidResponse(format!("block header missing {name}")))
    };
    let u32_field = |name: &str| -> Result<u32, ElectrumError> {
        field(name)?
            .as_u64()
            .and_then(|n| u32::try_from(n).ok())
            .ok_or_else(|| ElectrumError::InvalidResponse(format!("block header {name} not a u32")))
    };

    let version = field("version")?
        .as_i64()
        .and_then(|n| i32::try_from(n).ok())
        .ok_or_else(|| ElectrumError::InvalidResponse("block header version not an i32".into()))?;
    // The genesis header reports a null previous hash.
    let prev_blockhash = match raw.get("prev_block_hash").and_then(serde_json::Value::as_str) {
        Some(s) => s
            .parse::<BlockHash>()
            .map_err(|e| ElectrumError::InvalidResponse(format!("prev_block_hash: {e}")))?,
        None => BlockHash::all_zeros(),
    };
    let merkle_root = field("merkle_root")?
        .as_str()
        .ok_or_else(|| ElectrumError::InvalidResponse("merkle_root not a string".into()))?
        .parse::<TxMerkleNode>()
        .map_err(|e| ElectrumError::InvalidResponse(format!("merkle_root: {e}")))?;

    Ok(Header {
        version: Version::from_consensus(version),
        prev_blockhash,
        merkle_root,
        time: u32_field("timestamp")?,
        bits: CompactTarget::from_consensus(u32_field("bits")?),
        nonce: u32_field("nonce")?,
    })
}
