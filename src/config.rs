use clap::Parser;
use thiserror::Error;

use std::time::Duration;

use crate::blockchain::amount::{Amount, AmountError};
use crate::blockchain::chain::{ChainConfig, DEFAULT_DIFFICULTY, DEFAULT_MINING_REWARD};

/// Largest difficulty a SHA-256 hex digest can express
pub const MAX_DIFFICULTY: u8 = 64;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Difficulty must be between 1 and 64, got {0}")]
    Difficulty(u8),

    #[error("Invalid mining reward: {0}")]
    MiningReward(#[from] AmountError),

    #[error("Mining reward must be positive")]
    ZeroMiningReward,

    #[error("Sync interval must be at least one second")]
    SyncInterval,
}

/// Command line and environment configuration of a node
#[derive(Debug, Clone, Parser)]
#[command(name = "ledger_node")]
#[command(about = "Proof-of-work ledger node with a REST API and peer sync")]
#[command(version)]
pub struct NodeConfig {
    /// Interface to bind the HTTP server to
    #[arg(long, env = "NODE_HOST", default_value = "127.0.0.1")]
    pub host: String,

    /// Port to bind the HTTP server to
    #[arg(long, env = "NODE_PORT", default_value_t = 5000)]
    pub port: u16,

    /// Number of leading zero hex characters a block hash needs
    #[arg(long, env = "NODE_DIFFICULTY", default_value_t = DEFAULT_DIFFICULTY)]
    pub difficulty: u8,

    /// Coins paid to the miner of each block
    #[arg(long, env = "NODE_MINING_REWARD", default_value_t = f64::from(DEFAULT_MINING_REWARD))]
    pub mining_reward: f64,

    /// Peers to register at startup, comma separated
    #[arg(long, env = "NODE_PEERS", value_delimiter = ',')]
    pub peers: Vec<String>,

    /// Seconds between two background syncs with peers
    #[arg(long, env = "NODE_SYNC_INTERVAL", default_value_t = 5)]
    pub sync_interval_secs: u64,

    /// URL other nodes should use to reach this one
    #[arg(long, env = "NODE_PUBLIC_URL")]
    pub public_url: Option<String>,

    /// Timeout for every request sent to a peer
    #[arg(long, env = "NODE_PEER_TIMEOUT_MS", default_value_t = 2000)]
    pub peer_timeout_ms: u64,
}

impl NodeConfig {
    /// Validates the consensus parameters
    pub fn chain_config(&self) -> Result<ChainConfig, ConfigError> {
        if self.difficulty == 0 || self.difficulty > MAX_DIFFICULTY {
            return Err(ConfigError::Difficulty(self.difficulty));
        }

        let mining_reward = Amount::from_decimal(self.mining_reward)?;
        if mining_reward.is_zero() {
            return Err(ConfigError::ZeroMiningReward);
        }

        Ok(ChainConfig {
            difficulty: self.difficulty,
            mining_reward,
        })
    }

    pub fn sync_interval(&self) -> Result<Duration, ConfigError> {
        if self.sync_interval_secs == 0 {
            return Err(ConfigError::SyncInterval);
        }
        Ok(Duration::from_secs(self.sync_interval_secs))
    }

    pub fn peer_timeout(&self) -> Duration {
        Duration::from_millis(self.peer_timeout_ms)
    }

    /// The URL this node advertises to peers
    pub fn advertised_url(&self) -> String {
        match &self.public_url {
            Some(url) => url.clone(),
            None => format!("http://{}:{}", self.host, self.port),
        }
    }
}
