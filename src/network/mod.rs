// Network module
//
// This module connects a node to its peers:
// - Peer registry with URL normalization and failure accounting
// - HTTP peer client
// - Broadcasting of new transactions and blocks
// - Periodic longest-chain sync

pub mod broadcast;
pub mod client;
pub mod peers;
pub mod sync;

use log::{debug, info};

use std::sync::Arc;

pub use broadcast::HttpBroadcaster;
pub use client::{HttpPeerClient, PeerTransport};
pub use peers::{PeerError, PeerRegistry};
pub use sync::{spawn_sync_task, sync_once, SyncReport};

/// The peer registry together with the transport used to reach peers
#[derive(Clone)]
pub struct PeerNetwork {
    registry: Arc<PeerRegistry>,
    transport: Arc<dyn PeerTransport>,
}

impl PeerNetwork {
    pub fn new(registry: Arc<PeerRegistry>, transport: Arc<dyn PeerTransport>) -> Self {
        PeerNetwork { registry, transport }
    }

    pub fn registry(&self) -> &PeerRegistry {
        &self.registry
    }

    pub fn transport(&self) -> &dyn PeerTransport {
        self.transport.as_ref()
    }

    /// Counts the outcome of a contact against the peer
    pub fn record<T>(&self, peer: &str, result: &Result<T, PeerError>) {
        match result {
            Ok(_) => self.registry.record_success(peer),
            Err(err) if err.is_unreachable() => {
                debug!("Peer {} failed: {}", peer, err);
                self.registry.record_failure(peer);
            }
            Err(err) => debug!("Peer {} refused request: {}", peer, err),
        }
    }

    /// Registers a peer after checking it answers.
    ///
    /// # Returns
    ///
    /// The normalized URL and whether the peer was new
    pub async fn register(&self, raw: &str) -> Result<(String, bool), PeerError> {
        let url = self.registry.prepare(raw)?;
        if self.registry.contains(&url) {
            return Ok((url, false));
        }

        self.transport.ping(&url).await?;
        let inserted = self.registry.insert(url.clone());
        Ok((url, inserted))
    }

    /// Asks `peer` to register this node and shares the known peer list
    pub async fn introduce(&self, peer: &str) {
        let result = self.transport.announce(peer, self.registry.self_url()).await;
        self.record(peer, &result);

        let result = self.transport.gossip(peer, &self.registry.list()).await;
        self.record(peer, &result);
    }

    /// Registers the startup peers and introduces this node to them
    pub async fn bootstrap<I, S>(&self, peers: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for raw in peers {
            match self.register(raw.as_ref()).await {
                Ok((url, _)) => self.introduce(&url).await,
                Err(err) => info!("Skipping startup peer {:?}: {}", raw.as_ref(), err),
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use async_trait::async_trait;
    use dashmap::DashMap;

    use std::sync::{Arc, Mutex};

    use super::{PeerError, PeerTransport};
    use crate::blockchain::{Block, BlockReception, Node, Transaction};

    /// Routes peer requests straight into in-process nodes
    #[derive(Default)]
    pub struct LocalTransport {
        nodes: DashMap<String, Arc<Node>>,
        pub announced: Mutex<Vec<(String, String)>>,

        /// Peers whose mempool endpoint answers 503 while the rest works
        pub broken_mempools: Mutex<Vec<String>>,
    }

    impl LocalTransport {
        pub fn attach(&self, url: &str, node: Arc<Node>) {
            self.nodes.insert(url.to_string(), node);
        }

        fn node(&self, peer: &str) -> Result<Arc<Node>, PeerError> {
            self.nodes
                .get(peer)
                .map(|entry| entry.value().clone())
                .ok_or_else(|| PeerError::Status {
                    peer: peer.to_string(),
                    status: 503,
                })
        }

        fn refused(peer: &str, status: u16) -> PeerError {
            PeerError::Status {
                peer: peer.to_string(),
                status,
            }
        }
    }

    #[async_trait]
    impl PeerTransport for LocalTransport {
        async fn fetch_chain(&self, peer: &str) -> Result<Vec<Block>, PeerError> {
            Ok(self.node(peer)?.chain())
        }

        async fn fetch_mempool(&self, peer: &str) -> Result<Vec<Transaction>, PeerError> {
            let node = self.node(peer)?;
            let broken = self
                .broken_mempools
                .lock()
                .map_or(false, |broken| broken.iter().any(|url| url == peer));
            if broken {
                return Err(Self::refused(peer, 503));
            }
            Ok(node.mempool())
        }

        async fn ping(&self, peer: &str) -> Result<(), PeerError> {
            self.node(peer).map(|_| ())
        }

        async fn post_transaction(&self, peer: &str, transaction: &Transaction) -> Result<(), PeerError> {
            self.node(peer)?
                .receive_transaction(transaction.clone())
                .map(|_| ())
                .map_err(|_| Self::refused(peer, 400))
        }

        async fn post_block(&self, peer: &str, block: &Block) -> Result<(), PeerError> {
            match self.node(peer)?.receive_block(block.clone()) {
                Ok(BlockReception::Detached) => Err(Self::refused(peer, 409)),
                Ok(_) => Ok(()),
                Err(_) => Err(Self::refused(peer, 400)),
            }
        }

        async fn announce(&self, peer: &str, self_url: &str) -> Result<(), PeerError> {
            self.node(peer)?;
            if let Ok(mut announced) = self.announced.lock() {
                announced.push((peer.to_string(), self_url.to_string()));
            }
            Ok(())
        }

        async fn gossip(&self, peer: &str, _peers: &[String]) -> Result<(), PeerError> {
            self.node(peer).map(|_| ())
        }
    }
}
