use dashmap::DashMap;
use log::{debug, info};
use reqwest::Url;
use thiserror::Error;

/// Consecutive failed contacts after which a peer is forgotten
pub const MAX_FAILURES: u32 = 3;

/// Errors that can occur when talking to or registering peers
#[derive(Debug, Error)]
pub enum PeerError {
    #[error("Invalid peer URL: {0:?}")]
    InvalidUrl(String),

    #[error("Cannot add self as peer")]
    SelfPeer,

    #[error("Request to {peer} failed: {source}")]
    Request {
        peer: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("Peer {peer} answered with status {status}")]
    Status { peer: String, status: u16 },
}

impl PeerError {
    pub fn kind(&self) -> &'static str {
        match self {
            PeerError::InvalidUrl(_) => "InvalidPeerUrl",
            PeerError::SelfPeer => "SelfPeer",
            PeerError::Request { .. } | PeerError::Status { .. } => "PeerUnreachable",
        }
    }

    /// True when the peer could not be reached or failed internally, as
    /// opposed to answering that it disagrees with the request
    pub fn is_unreachable(&self) -> bool {
        match self {
            PeerError::Request { .. } => true,
            PeerError::Status { status, .. } => *status >= 500,
            PeerError::InvalidUrl(_) | PeerError::SelfPeer => false,
        }
    }
}

/// Normalizes a peer URL to `scheme://host:port`.
///
/// A missing scheme means `http`, loopback addresses are folded to
/// `localhost` and any path is dropped, so one peer has one key.
pub fn normalize_peer_url(raw: &str) -> Result<String, PeerError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(PeerError::InvalidUrl(raw.to_string()));
    }

    let with_scheme = if trimmed.contains("://") {
        trimmed.to_string()
    } else {
        format!("http://{}", trimmed)
    };

    let url = Url::parse(&with_scheme).map_err(|_| PeerError::InvalidUrl(raw.to_string()))?;
    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(PeerError::InvalidUrl(raw.to_string()));
    }

    let host = match url.host_str() {
        Some("127.0.0.1") | Some("[::1]") | Some("localhost") => "localhost",
        Some(host) => host,
        None => return Err(PeerError::InvalidUrl(raw.to_string())),
    };
    let port = url
        .port_or_known_default()
        .ok_or_else(|| PeerError::InvalidUrl(raw.to_string()))?;

    Ok(format!("{}://{}:{}", url.scheme(), host, port))
}

/// Known peers keyed by normalized URL, with consecutive failure counters
#[derive(Debug)]
pub struct PeerRegistry {
    self_url: String,
    peers: DashMap<String, u32>,
}

impl PeerRegistry {
    pub fn new(self_url: &str) -> Self {
        let self_url = normalize_peer_url(self_url).unwrap_or_else(|_| self_url.to_string());
        PeerRegistry {
            self_url,
            peers: DashMap::new(),
        }
    }

    pub fn self_url(&self) -> &str {
        &self.self_url
    }

    /// Normalizes `raw` and rejects this node's own URL
    pub fn prepare(&self, raw: &str) -> Result<String, PeerError> {
        let url = normalize_peer_url(raw)?;
        if url == self.self_url {
            return Err(PeerError::SelfPeer);
        }
        Ok(url)
    }

    /// Inserts an already prepared URL; returns false if it was known
    pub fn insert(&self, url: String) -> bool {
        if self.peers.contains_key(&url) {
            return false;
        }
        info!("Registered peer {}", url);
        self.peers.insert(url, 0);
        true
    }

    /// Prepares and inserts in one step
    pub fn add(&self, raw: &str) -> Result<(String, bool), PeerError> {
        let url = self.prepare(raw)?;
        let inserted = self.insert(url.clone());
        Ok((url, inserted))
    }

    /// Merges a peer list received from another node, skipping invalid
    /// entries and this node itself
    pub fn gossip<I, S>(&self, incoming: I) -> usize
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut added = 0;
        for raw in incoming {
            match self.add(raw.as_ref()) {
                Ok((_, true)) => added += 1,
                Ok((_, false)) => {}
                Err(err) => debug!("Skipping gossiped peer {:?}: {}", raw.as_ref(), err),
            }
        }
        added
    }

    pub fn contains(&self, url: &str) -> bool {
        self.peers.contains_key(url)
    }

    /// Sorted list of peer URLs
    pub fn list(&self) -> Vec<String> {
        let mut peers: Vec<String> = self.peers.iter().map(|entry| entry.key().clone()).collect();
        peers.sort();
        peers
    }

    pub fn len(&self) -> usize {
        self.peers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }

    pub fn record_success(&self, url: &str) {
        if let Some(mut failures) = self.peers.get_mut(url) {
            *failures = 0;
        }
    }

    /// Counts a failed contact; returns true if the peer was removed
    pub fn record_failure(&self, url: &str) -> bool {
        let failures = match self.peers.get_mut(url) {
            Some(mut failures) => {
                *failures += 1;
                *failures
            }
            None => return false,
        };

        if failures >= MAX_FAILURES {
            self.peers.remove(url);
            info!("Removed peer {} after {} failed contacts", url, failures);
            return true;
        }
        false
    }
}
