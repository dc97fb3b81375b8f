//! Peer registry and peer selection policies.

use std::fmt;
use std::str::FromStr;

use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};

use crate::error::CoreError;

// ==============================================================================
// Peer
// ==============================================================================

/// How the TLS handshake treats the peer's certificate chain.
///
/// Many public Electrum servers use self-signed certificates, so reaching
/// them requires `AcceptInvalidCerts`. Choosing it means the transport is
/// encrypted but the peer is not authenticated.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TlsPolicy {
    #[default]
    Verify,
    AcceptInvalidCerts,
}

/// One candidate Electrum server. Identity is `(host, port)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Peer {
    pub host: String,
    pub port: u16,
    pub tls: TlsPolicy,
}

impl Peer {
    pub fn new(host: impl Into<String>, port: u16, tls: TlsPolicy) -> Self {
        Self {
            host: host.into(),
            port,
            tls,
        }
    }

    pub fn with_tls(mut self, tls: TlsPolicy) -> Self {
        self.tls = tls;
        self
    }
}

impl PartialEq for Peer {
    fn eq(&self, other: &Self) -> bool {
        self.host == other.host && self.port == other.port
    }
}

impl Eq for Peer {}

impl fmt::Display for Peer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.host.contains(':') {
            write!(f, "[{}]:{}", self.host, self.port)
        } else {
            write!(f, "{}:{}", self.host, self.port)
        }
    }
}

impl FromStr for Peer {
    type Err = CoreError;

    /// Parses `host:port`, with IPv6 literals bracketed (`[::1]:50002`).
    /// The TLS policy defaults to `Verify`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (host, port) = s.rsplit_once(':').ok_or_else(|| {
            CoreError::Config(format!("invalid peer `{s}`: expected `host:port`"))
        })?;
        let host = match host.strip_prefix('[') {
            Some(inner) => inner.strip_suffix(']').ok_or_else(|| {
                CoreError::Config(format!("invalid peer `{s}`: unclosed `[`"))
            })?,
            None if host.contains(':') => {
                return Err(CoreError::Config(format!(
                    "invalid peer `{s}`: IPv6 hosts must be written as `[addr]:port`"
                )))
            }
            None => host,
        };
        if host.is_empty() {
            return Err(CoreError::Config(format!("invalid peer `{s}`: empty host")));
        }
        let port = port
            .parse::<u16>()
            .map_err(|e| CoreError::Config(format!("invalid peer `{s}`: bad port ({e})")))?;
        Ok(Self::new(host, port, TlsPolicy::default()))
    }
}

// ==============================================================================
// Registry
// ==============================================================================

/// Ordered list of candidate peers. Order is a preference: the connector
/// tries peers front to back under the default selection policy.
#[derive(Debug, Clone)]
pub struct PeerRegistry {
    peers: Vec<Peer>,
}

impl PeerRegistry {
    pub fn new(peers: Vec<Peer>) -> Self {
        Self { peers }
    }

    /// Well-known public mainnet servers.
    pub fn public() -> Self {
        Self::new(vec![
            Peer::new("elx.bitske.com", 50002, TlsPolicy::Verify),
            Peer::new("electrum.jochen-hoenucke.de", 50002, TlsPolicy::Verify),
            Peer::new("electrum1.bluewallet.io", 443, TlsPolicy::Verify),
            Peer::new("electrum.acinq.co", 50002, TlsPolicy::Verify),
            Peer::new("electrum.bitaroo.net", 50002, TlsPolicy::Verify),
        ])
    }

    /// Apply `tls` to every peer.
    pub fn with_tls_policy(self, tls: TlsPolicy) -> Self {
        Self::new(self.peers.into_iter().map(|p| p.with_tls(tls)).collect())
    }

    pub fn peers(&self) -> &[Peer] {
        &self.peers
    }

    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }

    pub fn len(&self) -> usize {
        self.peers.len()
    }
}

// ==============================================================================
// Selection
// ==============================================================================

/// Decides the order in which the connector attempts peers.
pub trait PeerSelection: Send + Sync {
    fn order(&self, peers: &[Peer]) -> Vec<Peer>;
}

/// Registry order, every time.
#[derive(Debug, Default, Clone, Copy)]
pub struct Ordered;

impl PeerSelection for Ordered {
    fn order(&self, peers: &[Peer]) -> Vec<Peer> {
        peers.to_vec()
    }
}

/// A fresh random order per connect, spreading load across peers while still
/// failing over through all of them.
#[derive(Debug, Default, Clone, Copy)]
pub struct Shuffled;

impl PeerSelection for Shuffled {
    fn order(&self, peers: &[Peer]) -> Vec<Peer> {
        let mut order = peers.to_vec();
        order.shuffle(&mut rand::thread_rng());
        order
    }
}
