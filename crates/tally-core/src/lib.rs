pub mod electrum;
pub mod error;
pub mod peers;
pub mod scripthash;
#[cfg(test)]
pub(crate) mod test_util;
pub mod types;

pub use electrum::{ChainSource, ClientConfig, Connector, ElectrumClient, ProtocolFlavor, TlsDialer};
pub use error::{CoreError, ElectrumError};
pub use peers::{Ordered, Peer, PeerRegistry, PeerSelection, Shuffled, TlsPolicy};
pub use types::TransactionQuery;
