//! History-to-transactions aggregation.
//!
//! The history is split into consecutive batches of at most `batch_size`
//! entries. Batches run one after another; the detail fetches inside a batch
//! are issued concurrently over the same session. A failed fetch is recorded
//! and never aborts the batch or the operation.

use futures::future::join_all;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::{CoreError, ElectrumError};
use crate::types::{
    AddressTransactions, BatchOutcome, FetchFailure, HistoryEntry, TransactionQuery,
    TransactionReport,
};

use super::client::ElectrumClient;
use super::protocol::TRANSACTION_GET;
use super::session::Session;

impl ElectrumClient {
    /// Fetch every transaction in `address`'s history and keep those with at
    /// least `query.min_confirmations` confirmations.
    ///
    /// Entries dropped for being too shallow are listed in
    /// `below_threshold`; entries that could not be fetched are listed in
    /// `failures`. Only failures of the history lookup itself (or of opening
    /// the session) are returned as `Err`.
    pub async fn get_transactions(
        &self,
        address: &str,
        query: &TransactionQuery,
        session: Option<&Session>,
    ) -> Result<TransactionReport, CoreError> {
        self.get_transactions_with_cancel(address, query, session, None)
            .await
    }

    /// Like [`ElectrumClient::get_transactions`], but stops with `Cancelled`
    /// once `cancel` fires. In-flight fetches of the current batch release
    /// their waiters; a caller-supplied session stays open.
    pub async fn get_transactions_with_cancel(
        &self,
        address: &str,
        query: &TransactionQuery,
        session: Option<&Session>,
        cancel: Option<&CancellationToken>,
    ) -> Result<TransactionReport, CoreError> {
        validate_query(query)?;
        let key = self.lookup_key(address)?;
        let lease = self.lease(session).await?;
        let result = self
            .collect_transactions(lease.session(), address, &key, query, cancel)
            .await;
        lease.release().await;
        result
    }

    /// Run [`ElectrumClient::get_transactions`] for each address in turn over
    /// one session.
    ///
    /// Failures that concern a single address (an unparseable address, a
    /// server error for its history) are recorded on that address's entry.
    /// Anything else means the session is unusable and fails the call.
    pub async fn get_transactions_for_addresses(
        &self,
        addresses: &[String],
        query: &TransactionQuery,
        session: Option<&Session>,
    ) -> Result<Vec<AddressTransactions>, CoreError> {
        validate_query(query)?;
        if addresses.is_empty() {
            return Ok(Vec::new());
        }

        let lease = self.lease(session).await?;
        let mut results = Vec::with_capacity(addresses.len());
        for address in addresses {
            let result = match self.lookup_key(address) {
                Ok(key) => {
                    self.collect_transactions(lease.session(), address, &key, query, None)
                        .await
                }
                Err(err) => Err(err),
            };
            match result {
                Ok(report) => results.push(AddressTransactions {
                    address: address.clone(),
                    report,
                    error: None,
                }),
                Err(err) if err.is_address_scoped() => {
                    warn!(%address, error = %err, "address lookup failed");
                    results.push(AddressTransactions {
                        address: address.clone(),
                        report: TransactionReport::default(),
                        error: Some(err.to_string()),
                    });
                }
                Err(err) => {
                    lease.release().await;
                    return Err(err);
                }
            }
        }
        lease.release().await;
        Ok(results)
    }

    async fn collect_transactions(
        &self,
        session: &Session,
        address: &str,
        key: &str,
        query: &TransactionQuery,
        cancel: Option<&CancellationToken>,
    ) -> Result<TransactionReport, CoreError> {
        ensure_not_cancelled(cancel)?;
        let history = self.fetch_history(session, key, cancel).await?;
        if history.is_empty() {
            debug!(%address, "empty history, nothing to fetch");
            return Ok(TransactionReport::default());
        }

        let batches = history.len().div_ceil(query.batch_size);
        let mut report = TransactionReport::default();
        for (index, batch) in history.chunks(query.batch_size).enumerate() {
            ensure_not_cancelled(cancel)?;
            debug!(%address, batch = index + 1, batches, size = batch.len(), "fetching batch");

            let outcome = self.fetch_batch(session, batch, cancel).await;
            if !outcome.failed.is_empty() {
                warn!(
                    %address,
                    batch = index + 1,
                    failed = outcome.failed.len(),
                    fetched = outcome.fetched.len(),
                    "partial batch failure"
                );
            }

            for tx in outcome.fetched {
                if tx.confirmations >= query.min_confirmations {
                    report.transactions.push(tx);
                } else {
                    report.below_threshold.push(tx.txid);
                }
            }
            report.failures.extend(outcome.failed);
        }
        ensure_not_cancelled(cancel)?;

        debug!(
            %address,
            history = history.len(),
            kept = report.transactions.len(),
            below_threshold = report.below_threshold.len(),
            failed = report.failures.len(),
            "address transactions collected"
        );
        Ok(report)
    }

    /// Fetch one batch concurrently. Results keep the batch's order.
    async fn fetch_batch(
        &self,
        session: &Session,
        batch: &[HistoryEntry],
        cancel: Option<&CancellationToken>,
    ) -> BatchOutcome {
        let results = join_all(
            batch
                .iter()
                .map(|entry| self.fetch_transaction(session, entry.tx_hash, cancel)),
        )
        .await;

        let mut outcome = BatchOutcome::default();
        for (entry, result) in batch.iter().zip(results) {
            match result {
                Ok(tx) => outcome.fetched.push(tx),
                Err(err) => {
                    debug!(txid = %entry.tx_hash, error = %err, "transaction fetch failed");
                    outcome.failed.push(FetchFailure {
                        txid: entry.tx_hash,
                        error: err.to_string(),
                    });
                }
            }
        }
        outcome
    }
}

fn validate_query(query: &TransactionQuery) -> Result<(), CoreError> {
    if query.batch_size == 0 {
        return Err(CoreError::Config("batch_size must be at least 1".into()));
    }
    Ok(())
}

fn ensure_not_cancelled(cancel: Option<&CancellationToken>) -> Result<(), CoreError> {
    match cancel {
        Some(token) if token.is_cancelled() => Err(ElectrumError::Cancelled {
            method: TRANSACTION_GET.to_owned(),
        }
        .into()),
        _ => Ok(()),
    }
}
