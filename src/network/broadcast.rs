use futures::future::join_all;
use log::debug;
use tokio::runtime::Handle;

use std::future::Future;
use std::sync::Arc;

use super::client::PeerTransport;
use super::peers::PeerError;
use super::PeerNetwork;
use crate::blockchain::{Block, Broadcaster, Transaction};

/// Pushes new transactions and blocks to every known peer.
///
/// Sends run as a detached task on `runtime`, so callers on blocking threads
/// (mining) never wait on the network. Failures count against the peer and
/// are otherwise ignored.
pub struct HttpBroadcaster {
    network: PeerNetwork,
    runtime: Handle,
}

impl HttpBroadcaster {
    pub fn new(network: PeerNetwork, runtime: Handle) -> Self {
        HttpBroadcaster { network, runtime }
    }

    fn fan_out<F, Fut>(&self, what: &'static str, send: F)
    where
        F: Fn(Arc<dyn PeerTransport>, String) -> Fut + Send + 'static,
        Fut: Future<Output = Result<(), PeerError>> + Send + 'static,
    {
        let peers = self.network.registry().list();
        if peers.is_empty() {
            return;
        }

        let network = self.network.clone();
        self.runtime.spawn(async move {
            debug!("Broadcasting {} to {} peers", what, peers.len());
            let transport = network.transport.clone();
            let results = join_all(peers.iter().map(|peer| send(transport.clone(), peer.clone()))).await;

            for (peer, result) in peers.iter().zip(results) {
                network.record(peer, &result);
            }
        });
    }
}

impl Broadcaster for HttpBroadcaster {
    fn broadcast_transaction(&self, transaction: &Transaction) {
        let transaction = transaction.clone();
        self.fan_out("transaction", move |transport, peer| {
            let transaction = transaction.clone();
            async move { transport.post_transaction(&peer, &transaction).await }
        });
    }

    fn broadcast_block(&self, block: &Block) {
        let block = block.clone();
        self.fan_out("block", move |transport, peer| {
            let block = block.clone();
            async move { transport.post_block(&peer, &block).await }
        });
    }
}
