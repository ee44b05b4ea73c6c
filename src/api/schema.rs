use actix_web::http::StatusCode;
use actix_web::HttpResponse;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use std::fmt::Display;

use crate::blockchain::Block;

/// Body of every error response
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ErrorResponse {
    /// Human readable message
    pub error: String,

    /// Machine readable error kind
    #[schema(example = "InsufficientFunds")]
    pub kind: String,
}

impl ErrorResponse {
    pub fn new(kind: &str, error: impl Display) -> Self {
        ErrorResponse {
            error: error.to_string(),
            kind: kind.to_string(),
        }
    }

    pub fn respond(self, status: StatusCode) -> HttpResponse {
        HttpResponse::build(status).json(self)
    }
}

/// Response for the chain endpoint; also what peers fetch during sync
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ChainResponse {
    /// The length of the chain
    pub length: usize,

    /// The blocks in the chain, genesis first
    pub chain: Vec<Block>,
}

/// Request to register a peer
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct PeerRequest {
    /// Base URL of the peer
    #[schema(example = "http://localhost:5001")]
    pub peer: String,
}

/// A peer list shared between nodes
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct GossipRequest {
    pub peers: Vec<String>,
}
