//! Address to Electrum scripthash conversion.
//!
//! Electrum indexes histories and balances by the SHA-256 of the output
//! script, hex-encoded in reversed byte order.

use std::str::FromStr;

use bitcoin::address::NetworkUnchecked;
use bitcoin::hashes::{sha256, Hash};
use bitcoin::hex::DisplayHex;
use bitcoin::{Address, Network, Script};

use crate::error::CoreError;

/// Parse `address` and check it belongs to `network`.
pub fn parse_address(address: &str, network: Network) -> Result<Address, CoreError> {
    let unchecked = Address::<NetworkUnchecked>::from_str(address).map_err(|e| {
        CoreError::InvalidAddress {
            address: address.to_owned(),
            reason: e.to_string(),
        }
    })?;
    unchecked
        .require_network(network)
        .map_err(|e| CoreError::InvalidAddress {
            address: address.to_owned(),
            reason: e.to_string(),
        })
}

pub fn script_hash(script: &Script) -> String {
    let mut bytes = sha256::Hash::hash(script.as_bytes()).to_byte_array();
    bytes.reverse();
    bytes.to_lower_hex_string()
}

/// Electrum scripthash of `address`'s output script.
pub fn address_to_scripthash(address: &str, network: Network) -> Result<String, CoreError> {
    let address = parse_address(address, network)?;
    Ok(script_hash(address.script_pubkey().as_script()))
}
