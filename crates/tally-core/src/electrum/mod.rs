//! Electrum protocol client.
//!
//! Defines the [`ChainSource`] trait (the query surface the HTTP layer is
//! written against) and its implementation over public Electrum servers:
//! ordered peer failover ([`Connector`]), TLS transport ([`TlsDialer`]),
//! newline-framed JSON-RPC sessions ([`Session`]), and the typed operations
//! of [`ElectrumClient`].

mod balance;
mod batch;
mod client;
mod codec;
mod connector;
#[cfg(test)]
pub mod mock;
mod parsing;
mod protocol;
mod session;
mod tls;

pub use client::{ClientConfig, ElectrumClient};
pub use connector::Connector;
pub use protocol::ProtocolFlavor;
pub use session::{Session, SessionConfig};
pub use tls::{Dialer, TlsDialer, Transport};

use async_trait::async_trait;
use bitcoin::{SignedAmount, Txid};

use crate::error::CoreError;
use crate::types::{
    AddressTransactions, Balance, BlockHeaderInfo, HistoryEntry, ServerVersion, Transaction,
    TransactionQuery, TransactionReport,
};

/// Address and transaction queries against some view of the chain.
///
/// Each call is self-contained: implementations acquire and release
/// whatever connection they need.
#[async_trait]
pub trait ChainSource: Send + Sync {
    async fn server_version(&self) -> Result<ServerVersion, CoreError>;

    async fn get_address_balance(&self, address: &str) -> Result<Balance, CoreError>;

    /// Confirmed plus unconfirmed balance.
    async fn get_balance(&self, address: &str) -> Result<SignedAmount, CoreError> {
        Ok(self.get_address_balance(address).await?.total())
    }

    async fn get_address_history(&self, address: &str) -> Result<Vec<HistoryEntry>, CoreError>;

    async fn get_transactions(
        &self,
        address: &str,
        query: &TransactionQuery,
    ) -> Result<TransactionReport, CoreError>;

    async fn get_transactions_for_addresses(
        &self,
        addresses: &[String],
        query: &TransactionQuery,
    ) -> Result<Vec<AddressTransactions>, CoreError>;

    async fn get_transaction(&self, txid: Txid) -> Result<Transaction, CoreError>;

    async fn get_raw_transaction(&self, txid: Txid) -> Result<String, CoreError>;

    async fn get_block_header(&self, height: u32) -> Result<BlockHeaderInfo, CoreError>;
}

#[async_trait]
impl ChainSource for ElectrumClient {
    async fn server_version(&self) -> Result<ServerVersion, CoreError> {
        ElectrumClient::server_version(self, None).await
    }

    async fn get_address_balance(&self, address: &str) -> Result<Balance, CoreError> {
        ElectrumClient::get_address_balance(self, address, None).await
    }

    async fn get_balance(&self, address: &str) -> Result<SignedAmount, CoreError> {
        ElectrumClient::get_balance(self, address, None).await
    }

    async fn get_address_history(&self, address: &str) -> Result<Vec<HistoryEntry>, CoreError> {
        ElectrumClient::get_address_history(self, address, None).await
    }

    async fn get_transactions(
        &self,
        address: &str,
        query: &TransactionQuery,
    ) -> Result<TransactionReport, CoreError> {
        ElectrumClient::get_transactions(self, address, query, None).await
    }

    async fn get_transactions_for_addresses(
        &self,
        addresses: &[String],
        query: &TransactionQuery,
    ) -> Result<Vec<AddressTransactions>, CoreError> {
        ElectrumClient::get_transactions_for_addresses(self, addresses, query, None).await
    }

    async fn get_transaction(&self, txid: Txid) -> Result<Transaction, CoreError> {
        ElectrumClient::get_transaction(self, txid, None).await
    }

    async fn get_raw_transaction(&self, txid: Txid) -> Result<String, CoreError> {
        ElectrumClient::get_raw_transaction(self, txid, None).await
    }

    async fn get_block_header(&self, height: u32) -> Result<BlockHeaderInfo, CoreError> {
        ElectrumClient::get_block_header(self, height, None).await
    }
}
