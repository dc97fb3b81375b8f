use std::sync::Arc;

use tracing::{info, warn};

use crate::error::ElectrumError;
use crate::peers::{Ordered, PeerRegistry, PeerSelection};

use super::session::{Session, SessionConfig};
use super::tls::Dialer;

/// Opens sessions by trying peers one at a time, in the order chosen by the
/// selection policy, until one completes its handshake.
pub struct Connector {
    registry: PeerRegistry,
    dialer: Arc<dyn Dialer>,
    selection: Arc<dyn PeerSelection>,
    session_config: SessionConfig,
}

impl Connector {
    pub fn new(registry: PeerRegistry, dialer: Arc<dyn Dialer>) -> Self {
        Self {
            registry,
            dialer,
            selection: Arc::new(Ordered),
            session_config: SessionConfig::default(),
        }
    }

    pub fn with_selection(mut self, selection: Arc<dyn PeerSelection>) -> Self {
        self.selection = selection;
        self
    }

    pub fn with_session_config(mut self, config: SessionConfig) -> Self {
        self.session_config = config;
        self
    }

    pub fn registry(&self) -> &PeerRegistry {
        &self.registry
    }

    pub async fn connect(&self) -> Result<Session, ElectrumError> {
        let candidates = self.selection.order(self.registry.peers());
        let mut last_failure = None;

        for (index, peer) in candidates.into_iter().enumerate() {
            let attempt = index + 1;
            match self.dialer.dial(&peer).await {
                Ok(transport) => {
                    info!(%peer, attempt, "electrum session established");
                    return Ok(Session::open(transport, peer, self.session_config));
                }
                Err(err) => {
                    warn!(%peer, attempt, error = %err, "electrum peer unavailable");
                    last_failure = Some((attempt, peer, err));
                }
            }
        }

        match last_failure {
            Some((attempts, peer, source)) => Err(ElectrumError::Connection {
                attempts,
                peer: peer.to_string(),
                source,
            }),
            None => Err(ElectrumError::NoPeers),
        }
    }
}
