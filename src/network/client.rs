use async_trait::async_trait;
use reqwest::{Client, Response};
use serde::de::DeserializeOwned;
use serde::Serialize;

use std::time::Duration;

use super::peers::PeerError;
use crate::api::routes::API_PREFIX;
use crate::api::schema::{ChainResponse, GossipRequest, PeerRequest};
use crate::blockchain::{Block, Transaction};

/// Requests one node sends to another
#[async_trait]
pub trait PeerTransport: Send + Sync {
    async fn fetch_chain(&self, peer: &str) -> Result<Vec<Block>, PeerError>;

    async fn fetch_mempool(&self, peer: &str) -> Result<Vec<Transaction>, PeerError>;

    async fn ping(&self, peer: &str) -> Result<(), PeerError>;

    async fn post_transaction(&self, peer: &str, transaction: &Transaction) -> Result<(), PeerError>;

    async fn post_block(&self, peer: &str, block: &Block) -> Result<(), PeerError>;

    /// Asks `peer` to register this node
    async fn announce(&self, peer: &str, self_url: &str) -> Result<(), PeerError>;

    /// Shares this node's peer list with `peer`
    async fn gossip(&self, peer: &str, peers: &[String]) -> Result<(), PeerError>;
}

/// `PeerTransport` over the node's own REST API
#[derive(Debug, Clone)]
pub struct HttpPeerClient {
    http: Client,
}

impl HttpPeerClient {
    pub fn new(timeout: Duration) -> Result<Self, PeerError> {
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|source| PeerError::Request {
                peer: String::new(),
                source,
            })?;
        Ok(HttpPeerClient { http })
    }

    fn endpoint(peer: &str, path: &str) -> String {
        format!("{}{}{}", peer, API_PREFIX, path)
    }

    fn checked(peer: &str, result: reqwest::Result<Response>) -> Result<Response, PeerError> {
        let response = result.map_err(|source| PeerError::Request {
            peer: peer.to_string(),
            source,
        })?;

        if !response.status().is_success() {
            return Err(PeerError::Status {
                peer: peer.to_string(),
                status: response.status().as_u16(),
            });
        }
        Ok(response)
    }

    async fn get_json<T: DeserializeOwned>(&self, peer: &str, path: &str) -> Result<T, PeerError> {
        let response = Self::checked(peer, self.http.get(Self::endpoint(peer, path)).send().await)?;
        response.json().await.map_err(|source| PeerError::Request {
            peer: peer.to_string(),
            source,
        })
    }

    async fn post_json<T: Serialize + ?Sized>(&self, peer: &str, path: &str, body: &T) -> Result<(), PeerError> {
        let result = self.http.post(Self::endpoint(peer, path)).json(body).send().await;
        Self::checked(peer, result).map(|_| ())
    }
}

#[async_trait]
impl PeerTransport for HttpPeerClient {
    async fn fetch_chain(&self, peer: &str) -> Result<Vec<Block>, PeerError> {
        let response: ChainResponse = self.get_json(peer, "/chain").await?;
        Ok(response.chain)
    }

    async fn fetch_mempool(&self, peer: &str) -> Result<Vec<Transaction>, PeerError> {
        self.get_json(peer, "/mempool").await
    }

    async fn ping(&self, peer: &str) -> Result<(), PeerError> {
        let result = self.http.get(Self::endpoint(peer, "/ping")).send().await;
        Self::checked(peer, result).map(|_| ())
    }

    async fn post_transaction(&self, peer: &str, transaction: &Transaction) -> Result<(), PeerError> {
        self.post_json(peer, "/transactions/receive", transaction).await
    }

    async fn post_block(&self, peer: &str, block: &Block) -> Result<(), PeerError> {
        self.post_json(peer, "/blocks/receive", block).await
    }

    async fn announce(&self, peer: &str, self_url: &str) -> Result<(), PeerError> {
        let body = PeerRequest {
            peer: self_url.to_string(),
        };
        self.post_json(peer, "/peers", &body).await
    }

    async fn gossip(&self, peer: &str, peers: &[String]) -> Result<(), PeerError> {
        let body = GossipRequest { peers: peers.to_vec() };
        self.post_json(peer, "/peers/gossip", &body).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint() {
        assert_eq!(
            HttpPeerClient::endpoint("http://localhost:5001", "/chain"),
            "http://localhost:5001/api/v1/chain"
        );
    }

    #[actix_web::test]
    async fn test_unreachable_peer_is_an_error() {
        let client = HttpPeerClient::new(Duration::from_millis(200)).unwrap();
        let result = client.ping("http://localhost:1").await;
        assert!(matches!(result, Err(PeerError::Request { .. })));
    }
}
