use std::time::Duration;

use bitcoin::{Network, Txid};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::error::{CoreError, ElectrumError};
use crate::scripthash::{address_to_scripthash, parse_address};
use crate::types::{BlockHeaderInfo, HistoryEntry, ServerVersion, Transaction};

use super::connector::Connector;
use super::parsing;
use super::protocol::{ProtocolFlavor, SERVER_VERSION, TRANSACTION_GET};
use super::session::{Session, SessionConfig};

const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
const DEFAULT_PROTOCOL_VERSION: &str = "1.4";

/// Client-wide settings. Peers and dialing live in the [`Connector`].
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Network addresses are validated against, and output addresses are
    /// encoded for.
    pub network: Network,
    pub flavor: ProtocolFlavor,
    pub request_timeout: Duration,
    /// Name sent with `server.version`.
    pub client_name: String,
    pub protocol_version: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            network: Network::Bitcoin,
            flavor: ProtocolFlavor::default(),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            client_name: concat!("tally/", env!("CARGO_PKG_VERSION")).to_owned(),
            protocol_version: DEFAULT_PROTOCOL_VERSION.to_owned(),
        }
    }
}

// ==============================================================================
// Session Ownership
// ==============================================================================

/// A session used for one operation. `Managed` sessions were opened by the
/// client and are closed by [`SessionLease::release`]; `External` sessions
/// belong to the caller and are never closed here.
pub(crate) enum SessionLease<'a> {
    Managed(Session),
    External(&'a Session),
}

impl SessionLease<'_> {
    pub(crate) fn session(&self) -> &Session {
        match self {
            Self::Managed(session) => session,
            Self::External(session) => session,
        }
    }

    pub(crate) async fn release(self) {
        if let Self::Managed(session) = self {
            session.close().await;
        }
    }
}

// ==============================================================================
// Client
// ==============================================================================

/// Typed Electrum operations over sessions from a [`Connector`].
///
/// Every operation takes an optional caller-owned [`Session`]. Without one,
/// a session is opened for that operation alone and closed on every exit
/// path before the result is returned.
pub struct ElectrumClient {
    connector: Connector,
    config: ClientConfig,
}

impl ElectrumClient {
    pub fn new(connector: Connector, config: ClientConfig) -> Self {
        let connector = connector.with_session_config(SessionConfig {
            request_timeout: config.request_timeout,
        });
        Self { connector, config }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn connector(&self) -> &Connector {
        &self.connector
    }

    /// Open a session the caller owns. Pass it to any operation to reuse it;
    /// the caller is responsible for closing it.
    pub async fn connect(&self) -> Result<Session, CoreError> {
        Ok(self.connector.connect().await?)
    }

    pub(crate) async fn lease<'a>(
        &self,
        session: Option<&'a Session>,
    ) -> Result<SessionLease<'a>, CoreError> {
        match session {
            Some(session) => Ok(SessionLease::External(session)),
            None => Ok(SessionLease::Managed(self.connector.connect().await?)),
        }
    }

    /// The key the configured protocol flavor indexes address queries by.
    pub(crate) fn lookup_key(&self, address: &str) -> Result<String, CoreError> {
        match self.config.flavor {
            ProtocolFlavor::Scripthash => address_to_scripthash(address, self.config.network),
            ProtocolFlavor::LegacyAddress => {
                parse_address(address, self.config.network)?;
                Ok(address.to_owned())
            }
        }
    }

    // ==========================================================================
    // Facade
    // ==========================================================================

    pub async fn server_version(
        &self,
        session: Option<&Session>,
    ) -> Result<ServerVersion, CoreError> {
        let lease = self.lease(session).await?;
        let result = self.fetch_server_version(lease.session()).await;
        lease.release().await;
        result
    }

    pub async fn get_address_history(
        &self,
        address: &str,
        session: Option<&Session>,
    ) -> Result<Vec<HistoryEntry>, CoreError> {
        let key = self.lookup_key(address)?;
        let lease = self.lease(session).await?;
        let result = self.fetch_history(lease.session(), &key, None).await;
        lease.release().await;
        result
    }

    pub async fn get_transaction(
        &self,
        txid: Txid,
        session: Option<&Session>,
    ) -> Result<Transaction, CoreError> {
        let lease = self.lease(session).await?;
        let result = self.fetch_transaction(lease.session(), txid, None).await;
        lease.release().await;
        result
    }

    /// Serialized transaction, hex-encoded.
    pub async fn get_raw_transaction(
        &self,
        txid: Txid,
        session: Option<&Session>,
    ) -> Result<String, CoreError> {
        let lease = self.lease(session).await?;
        let result = self.fetch_raw_transaction(lease.session(), txid).await;
        lease.release().await;
        result
    }

    pub async fn get_block_header(
        &self,
        height: u32,
        session: Option<&Session>,
    ) -> Result<BlockHeaderInfo, CoreError> {
        let lease = self.lease(session).await?;
        let result = self.fetch_block_header(lease.session(), height).await;
        lease.release().await;
        result
    }

    // ==========================================================================
    // Single calls on an open session
    // ==========================================================================

    pub(crate) async fn fetch_server_version(
        &self,
        session: &Session,
    ) -> Result<ServerVersion, CoreError> {
        let raw = session
            .call(
                SERVER_VERSION,
                vec![
                    serde_json::json!(self.config.client_name),
                    serde_json::json!(self.config.protocol_version),
                ],
            )
            .await?;
        Ok(parsing::parse_server_version(raw)?)
    }

    pub(crate) async fn fetch_history(
        &self,
        session: &Session,
        key: &str,
        cancel: Option<&CancellationToken>,
    ) -> Result<Vec<HistoryEntry>, CoreError> {
        let raw = session
            .call_with_cancel(
                self.config.flavor.history_method(),
                vec![serde_json::json!(key)],
                cancel,
            )
            .await?;
        let history = parsing::parse_history(raw)?;
        debug!(peer = %session.peer(), entries = history.len(), "fetched address history");
        Ok(history)
    }

    pub(crate) async fn fetch_transaction(
        &self,
        session: &Session,
        txid: Txid,
        cancel: Option<&CancellationToken>,
    ) -> Result<Transaction, CoreError> {
        let raw = session
            .call_with_cancel(
                TRANSACTION_GET,
                vec![serde_json::json!(txid.to_string()), serde_json::json!(true)],
                cancel,
            )
            .await
            .map_err(|err| normalize_transaction_get_error(&txid, err))?;
        parsing::parse_transaction(raw, self.config.network)
    }

    pub(crate) async fn fetch_raw_transaction(
        &self,
        session: &Session,
        txid: Txid,
    ) -> Result<String, CoreError> {
        let raw = session
            .call(
                TRANSACTION_GET,
                vec![serde_json::json!(txid.to_string()), serde_json::json!(false)],
            )
            .await
            .map_err(|err| normalize_transaction_get_error(&txid, err))?;
        parsing::parse_raw_transaction(raw)
    }

    pub(crate) async fn fetch_balance(
        &self,
        session: &Session,
        key: &str,
    ) -> Result<crate::types::Balance, CoreError> {
        let raw = session
            .call(self.config.flavor.balance_method(), vec![serde_json::json!(key)])
            .await?;
        Ok(parsing::parse_balance(raw)?)
    }

    pub(crate) async fn fetch_block_header(
        &self,
        session: &Session,
        height: u32,
    ) -> Result<BlockHeaderInfo, CoreError> {
        let raw = session
            .call(self.config.flavor.header_method(), vec![serde_json::json!(height)])
            .await?;
        Ok(parsing::parse_block_header(raw, height)?)
    }
}

fn normalize_transaction_get_error(txid: &Txid, err: ElectrumError) -> CoreError {
    match err {
        ElectrumError::ServerError { ref message, .. } if is_tx_not_found_message(message) => {
            CoreError::TxNotFound(*txid)
        }
        other => other.into(),
    }
}

// Servers wrap the daemon's error in their own code, so only the message is
// reliable.
fn is_tx_not_found_message(message: &str) -> bool {
    let msg = message.to_ascii_lowercase();
    msg.contains("not found") || msg.contains("no such mempool or blockchain transaction")
}
