use bitcoin::SignedAmount;
use tracing::debug;

use crate::error::CoreError;
use crate::types::Balance;

use super::client::ElectrumClient;
use super::session::Session;

impl ElectrumClient {
    /// Confirmed and unconfirmed satoshi totals for `address`.
    pub async fn get_address_balance(
        &self,
        address: &str,
        session: Option<&Session>,
    ) -> Result<Balance, CoreError> {
        let key = self.lookup_key(address)?;
        let lease = self.lease(session).await?;
        let result = self.fetch_balance(lease.session(), &key).await;
        lease.release().await;
        let balance = result?;
        debug!(
            %address,
            confirmed = balance.confirmed,
            unconfirmed = balance.unconfirmed,
            "fetched balance"
        );
        Ok(balance)
    }

    /// Confirmed plus unconfirmed balance of `address`. Read it in BTC with
    /// [`SignedAmount::to_btc`]. An address the peer knows nothing about has
    /// a zero balance.
    pub async fn get_balance(
        &self,
        address: &str,
        session: Option<&Session>,
    ) -> Result<SignedAmount, CoreError> {
        Ok(self.get_address_balance(address, session).await?.total())
    }
}
