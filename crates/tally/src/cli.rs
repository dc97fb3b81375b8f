use bitcoin::Network;
use clap::Parser;

use tally_core::Peer;

/// Tally: Bitcoin address balances, histories and transactions from public
/// Electrum servers, over a small HTTP API.
#[derive(Parser)]
#[command(version, about)]
pub struct Cli {
    /// Electrum server as `host:port` (repeatable, tried in the given order).
    /// Defaults to the built-in list of public mainnet servers.
    #[arg(long = "peer", env = "TALLY_PEERS", value_delimiter = ',')]
    pub peers: Vec<Peer>,

    /// Skip TLS certificate validation. Many public servers use self-signed
    /// certificates; with this flag the connection is encrypted but the
    /// server is not authenticated.
    #[arg(long, env = "TALLY_ACCEPT_INVALID_CERTS")]
    pub accept_invalid_certs: bool,

    /// Try peers in random order instead of the configured order.
    #[arg(long, env = "TALLY_SHUFFLE_PEERS")]
    pub shuffle_peers: bool,

    /// Use the deprecated `blockchain.address.*` methods for servers that
    /// predate scripthash queries.
    #[arg(long, env = "TALLY_LEGACY_ADDRESS_METHODS")]
    pub legacy_address_methods: bool,

    /// Bitcoin network addresses are validated against.
    #[arg(long, default_value = "bitcoin", env = "TALLY_NETWORK")]
    pub network: Network,

    /// Deadline for each Electrum request, in seconds.
    #[arg(long, default_value = "30", env = "TALLY_REQUEST_TIMEOUT_SECS")]
    pub request_timeout_secs: u64,

    /// Deadline for TCP connect plus TLS handshake per peer, in seconds.
    #[arg(long, default_value = "10", env = "TALLY_CONNECT_TIMEOUT_SECS")]
    pub connect_timeout_secs: u64,

    /// Default minimum confirmations for transaction queries.
    #[arg(long, default_value = "3", env = "TALLY_MIN_CONFIRMATIONS")]
    pub min_confirmations: u64,

    /// Default number of transactions fetched concurrently per batch.
    #[arg(long, default_value = "10", env = "TALLY_BATCH_SIZE")]
    pub batch_size: usize,

    /// Address to bind the web server to.
    #[arg(long, default_value = "127.0.0.1", env = "TALLY_BIND")]
    pub bind: String,

    /// Port to listen on.
    #[arg(long, default_value = "3080", env = "TALLY_PORT")]
    pub port: u16,
}
