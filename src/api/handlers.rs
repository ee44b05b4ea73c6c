use actix_web::http::StatusCode;
use actix_web::{web, HttpResponse, Responder};
use log::{error, info};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::schema::{ChainResponse, ErrorResponse, GossipRequest, PeerRequest};
use crate::blockchain::crypto::{KeyMaterial, Wallet};
use crate::blockchain::miner::{self, MiningError};
use crate::blockchain::{
    Address, Amount, Block, BlockReception, Node, Resolution, Transaction, TransactionError,
};
use crate::network::{sync_once, PeerError, PeerNetwork};

/// Shared node state
pub type NodeData = web::Data<Node>;

/// Shared peer registry and transport
pub type NetworkData = web::Data<PeerNetwork>;

/// Response for the validate endpoint
#[derive(Serialize, Deserialize, ToSchema)]
pub struct ValidationResponse {
    /// Whether the local chain passes full validation
    pub valid: bool,
}

/// Response for the balance endpoint
#[derive(Serialize, Deserialize, ToSchema)]
pub struct BalanceResponse {
    pub address: String,

    /// Confirmed balance; pending transactions are not counted
    pub balance: f64,
}

/// Request for the transaction signing endpoint
#[derive(Serialize, Deserialize, ToSchema)]
pub struct SignTransactionRequest {
    /// The sender's private key, hex encoded
    pub private_key: String,

    /// The recipient's address
    pub receiver: String,

    /// The amount to transfer
    #[schema(example = 25.5)]
    pub amount: f64,
}

/// Response for the transaction endpoints
#[derive(Serialize, Deserialize, ToSchema)]
pub struct TransactionResponse {
    /// The message
    pub message: String,

    /// The transaction as stored in the mempool
    pub transaction: Transaction,
}

/// Response for the receive block endpoint
#[derive(Serialize, Deserialize, ToSchema)]
pub struct BlockResponse {
    /// The message
    pub message: String,

    /// The length of the chain after the block was handled
    pub length: usize,
}

/// Request for the mine endpoint
#[derive(Serialize, Deserialize, ToSchema)]
pub struct MineRequest {
    /// The miner's address
    pub miner_address: String,
}

/// Response for the mine endpoint
#[derive(Serialize, Deserialize, ToSchema)]
pub struct MineResponse {
    /// The message
    pub message: String,

    /// The newly mined block
    pub block: Block,
}

/// Request to resolve against explicitly supplied chains
#[derive(Serialize, Deserialize, ToSchema)]
pub struct ResolveRequest {
    pub chains: Vec<Vec<Block>>,
}

/// Response for the resolve endpoints
#[derive(Serialize, Deserialize, ToSchema)]
pub struct ResolveResponse {
    /// Whether the local chain was replaced
    pub replaced: bool,

    /// The length of the chain after resolving
    pub length: usize,

    /// Pending transactions dropped because the new chain confirmed or
    /// invalidated them
    pub dropped_pending: usize,

    /// Peer transactions merged into the mempool
    pub merged: usize,
}

impl ResolveResponse {
    fn new(resolution: Resolution, merged: usize) -> Self {
        match resolution {
            Resolution::Adopted {
                length,
                dropped_pending,
            } => ResolveResponse {
                replaced: true,
                length,
                dropped_pending,
                merged,
            },
            Resolution::Kept { length } => ResolveResponse {
                replaced: false,
                length,
                dropped_pending: 0,
                merged,
            },
        }
    }
}

/// Request for the mempool merge endpoint
#[derive(Serialize, Deserialize, ToSchema)]
pub struct MergeRequest {
    pub transactions: Vec<Transaction>,
}

/// Response for the mempool merge endpoint
#[derive(Serialize, Deserialize, ToSchema)]
pub struct MergeResponse {
    /// Transactions that were new and valid
    pub merged: usize,

    /// Size of the mempool after merging
    pub pending: usize,
}

/// Response for the peer endpoints
#[derive(Serialize, Deserialize, ToSchema)]
pub struct PeersResponse {
    pub peers: Vec<String>,
}

/// Response for the gossip endpoint
#[derive(Serialize, Deserialize, ToSchema)]
pub struct GossipResponse {
    /// Peers that were not known before
    pub added: usize,
}

fn transaction_error(err: TransactionError) -> HttpResponse {
    let status = match err {
        TransactionError::BadSignature(_) => StatusCode::FORBIDDEN,
        _ => StatusCode::BAD_REQUEST,
    };
    ErrorResponse::new(err.kind(), &err).respond(status)
}

fn mining_error(err: MiningError) -> HttpResponse {
    let status = match err {
        MiningError::InvalidMinerAddress(_) => StatusCode::BAD_REQUEST,
        MiningError::InProgress | MiningError::Interrupted | MiningError::Rejected(_) => StatusCode::CONFLICT,
    };
    ErrorResponse::new(err.kind(), &err).respond(status)
}

fn peer_error(err: PeerError) -> HttpResponse {
    ErrorResponse::new(err.kind(), &err).respond(StatusCode::BAD_REQUEST)
}

/// Liveness check
#[utoipa::path(
    get,
    path = "/api/v1/ping",
    responses(
        (status = 200, description = "The node is up", body = String)
    )
)]
pub async fn ping() -> impl Responder {
    HttpResponse::Ok().body("pong")
}

/// Get the full blockchain
///
/// Returns the entire chain, genesis first
#[utoipa::path(
    get,
    path = "/api/v1/chain",
    responses(
        (status = 200, description = "Blockchain retrieved successfully", body = ChainResponse)
    )
)]
pub async fn get_chain(node: NodeData) -> impl Responder {
    let chain = node.chain();

    HttpResponse::Ok().json(ChainResponse {
        length: chain.len(),
        chain,
    })
}

/// Check if the blockchain is valid
///
/// Re-validates the local chain from genesis
#[utoipa::path(
    get,
    path = "/api/v1/validate",
    responses(
        (status = 200, description = "Blockchain validation status", body = ValidationResponse)
    )
)]
pub async fn validate_chain(node: NodeData) -> impl Responder {
    HttpResponse::Ok().json(ValidationResponse {
        valid: node.is_chain_valid(),
    })
}

/// Get all pending transactions
///
/// Returns the mempool in insertion order
#[utoipa::path(
    get,
    path = "/api/v1/mempool",
    responses(
        (status = 200, description = "Pending transactions retrieved successfully", body = Vec<Transaction>)
    )
)]
pub async fn get_mempool(node: NodeData) -> impl Responder {
    HttpResponse::Ok().json(node.mempool())
}

/// Merge transactions into the mempool
///
/// Invalid and already pending transactions are skipped
#[utoipa::path(
    post,
    path = "/api/v1/mempool/merge",
    request_body = MergeRequest,
    responses(
        (status = 200, description = "Transactions merged", body = MergeResponse)
    )
)]
pub async fn merge_mempool(node: NodeData, merge_req: web::Json<MergeRequest>) -> impl Responder {
    let merged = node.merge(merge_req.into_inner().transactions);

    HttpResponse::Ok().json(MergeResponse {
        merged,
        pending: node.mempool().len(),
    })
}

/// Create a new wallet
///
/// Creates a new wallet with a random keypair
///
/// The private key must be stored by your own
#[utoipa::path(
    get,
    path = "/api/v1/wallet/new",
    responses(
        (status = 200, description = "Wallet created successfully", body = KeyMaterial)
    )
)]
pub async fn create_wallet(node: NodeData) -> impl Responder {
    let wallet = node.create_wallet();
    info!("Created wallet {}", wallet.address);
    HttpResponse::Ok().json(wallet)
}

/// Get the balance of an address
#[utoipa::path(
    get,
    path = "/api/v1/balance/{address}",
    params(
        ("address" = String, Path, description = "Address to look up")
    ),
    responses(
        (status = 200, description = "Balance retrieved successfully", body = BalanceResponse)
    )
)]
pub async fn get_balance(node: NodeData, address: web::Path<String>) -> impl Responder {
    let address = Address(address.into_inner());
    let balance = node.balance_of(&address);

    HttpResponse::Ok().json(BalanceResponse {
        address: address.0,
        balance: balance.to_f64(),
    })
}

/// Submit a signed transaction
///
/// Validates the transaction, adds it to the mempool and broadcasts it to peers
#[utoipa::path(
    post,
    path = "/api/v1/transactions",
    request_body = Transaction,
    responses(
        (status = 201, description = "Transaction accepted", body = TransactionResponse),
        (status = 400, description = "Invalid transaction", body = ErrorResponse),
        (status = 403, description = "Bad signature", body = ErrorResponse)
    )
)]
pub async fn submit_transaction(node: NodeData, transaction: web::Json<Transaction>) -> impl Responder {
    match node.submit_transaction(transaction.into_inner()) {
        Ok(transaction) => HttpResponse::Created().json(TransactionResponse {
            message: "Transaction will be added to the next block".to_string(),
            transaction,
        }),
        Err(err) => transaction_error(err),
    }
}

/// Sign and submit a transaction
///
/// Signs with the given private key on the node; the key is not stored
#[utoipa::path(
    post,
    path = "/api/v1/transactions/new",
    request_body = SignTransactionRequest,
    responses(
        (status = 201, description = "Transaction accepted", body = TransactionResponse),
        (status = 400, description = "Invalid key, amount or transaction", body = ErrorResponse)
    )
)]
pub async fn new_transaction(node: NodeData, transaction_req: web::Json<SignTransactionRequest>) -> impl Responder {
    let transaction_req = transaction_req.into_inner();

    let private_key_bytes = match hex::decode(&transaction_req.private_key) {
        Ok(bytes) => bytes,
        Err(_) => {
            return ErrorResponse::new("InvalidPrivateKey", "Invalid private key format. Must be a hex string.")
                .respond(StatusCode::BAD_REQUEST);
        }
    };

    let wallet = match Wallet::from_secret_key(&private_key_bytes) {
        Ok(wallet) => wallet,
        Err(err) => return ErrorResponse::new("InvalidPrivateKey", err).respond(StatusCode::BAD_REQUEST),
    };

    let amount = match Amount::from_decimal(transaction_req.amount) {
        Ok(amount) => amount,
        Err(err) => return ErrorResponse::new("InvalidAmount", err).respond(StatusCode::BAD_REQUEST),
    };

    let transaction = Transaction::new_signed(&wallet, Address(transaction_req.receiver), amount);
    match node.submit_transaction(transaction) {
        Ok(transaction) => HttpResponse::Created().json(TransactionResponse {
            message: "Transaction will be added to the next block".to_string(),
            transaction,
        }),
        Err(err) => transaction_error(err),
    }
}

/// Receive a transaction relayed by a peer
///
/// Same checks as submitting, without relaying it again
#[utoipa::path(
    post,
    path = "/api/v1/transactions/receive",
    request_body = Transaction,
    responses(
        (status = 200, description = "Transaction accepted", body = TransactionResponse),
        (status = 400, description = "Invalid transaction", body = ErrorResponse),
        (status = 403, description = "Bad signature", body = ErrorResponse)
    )
)]
pub async fn receive_transaction(node: NodeData, transaction: web::Json<Transaction>) -> impl Responder {
    match node.receive_transaction(transaction.into_inner()) {
        Ok(transaction) => HttpResponse::Ok().json(TransactionResponse {
            message: "Transaction received".to_string(),
            transaction,
        }),
        Err(err) => transaction_error(err),
    }
}

/// Receive a block mined by a peer
///
/// A block that does not extend the local tip starts a sync with peers
#[utoipa::path(
    post,
    path = "/api/v1/blocks/receive",
    request_body = Block,
    responses(
        (status = 201, description = "Block appended", body = BlockResponse),
        (status = 200, description = "Block already known", body = BlockResponse),
        (status = 400, description = "Invalid block", body = ErrorResponse),
        (status = 409, description = "Block does not extend the local tip", body = ErrorResponse)
    )
)]
pub async fn receive_block(node: NodeData, network: NetworkData, block: web::Json<Block>) -> impl Responder {
    let block = block.into_inner();
    let index = block.index;

    match node.receive_block(block) {
        Ok(BlockReception::Appended) => {
            info!("Appended block {} from peer", index);
            HttpResponse::Created().json(BlockResponse {
                message: "Block appended".to_string(),
                length: node.chain_length(),
            })
        }
        Ok(BlockReception::Known) => HttpResponse::Ok().json(BlockResponse {
            message: "Block already known".to_string(),
            length: node.chain_length(),
        }),
        Ok(BlockReception::Detached) => {
            // A peer is ahead; work on the current tip would be thrown away
            node.interrupt_mining();
            let node = node.clone();
            let network = network.clone();
            actix_web::rt::spawn(async move {
                sync_once(&node, &network).await;
            });
            ErrorResponse::new("Detached", "Block does not extend the local tip; syncing with peers")
                .respond(StatusCode::CONFLICT)
        }
        Err(err) => ErrorResponse::new(err.kind(), &err).respond(StatusCode::BAD_REQUEST),
    }
}

/// Mine a new block
///
/// Syncs with peers, then mines a block with all pending transactions and
/// broadcasts it
#[utoipa::path(
    post,
    path = "/api/v1/mine",
    request_body = MineRequest,
    responses(
        (status = 201, description = "Block mined successfully", body = MineResponse),
        (status = 400, description = "Invalid miner address", body = ErrorResponse),
        (status = 409, description = "Mining in progress or interrupted", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    )
)]
pub async fn mine_block(node: NodeData, network: NetworkData, mine_req: web::Json<MineRequest>) -> impl Responder {
    let miner_address = mine_req.into_inner().miner_address;
    if let Err(err) = miner::parse_miner_address(&miner_address) {
        return mining_error(err);
    }

    if !network.registry().is_empty() {
        sync_once(&node, &network).await;
    }

    let miner = node.clone();
    match web::block(move || miner.mine(&miner_address)).await {
        Ok(Ok(block)) => HttpResponse::Created().json(MineResponse {
            message: "New Block Mined".to_string(),
            block,
        }),
        Ok(Err(err)) => mining_error(err),
        Err(err) => {
            error!("Mining task failed: {}", err);
            ErrorResponse::new("Internal", err).respond(StatusCode::INTERNAL_SERVER_ERROR)
        }
    }
}

/// Resolve conflicts with peers
///
/// Fetches every peer's chain and mempool, adopts the longest valid chain
/// and merges the peer transactions
#[utoipa::path(
    get,
    path = "/api/v1/resolve",
    responses(
        (status = 200, description = "Conflicts resolved", body = ResolveResponse)
    )
)]
pub async fn resolve_with_peers(node: NodeData, network: NetworkData) -> impl Responder {
    let report = sync_once(&node, &network).await;
    HttpResponse::Ok().json(ResolveResponse::new(report.resolution, report.merged))
}

/// Resolve against supplied chains
///
/// Adopts the longest valid chain if it is longer than the local one
#[utoipa::path(
    post,
    path = "/api/v1/resolve",
    request_body = ResolveRequest,
    responses(
        (status = 200, description = "Conflicts resolved", body = ResolveResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    )
)]
pub async fn resolve_chains(node: NodeData, resolve_req: web::Json<ResolveRequest>) -> impl Responder {
    let chains = resolve_req.into_inner().chains;
    let resolver = node.clone();
    match web::block(move || resolver.resolve(chains)).await {
        Ok(resolution) => HttpResponse::Ok().json(ResolveResponse::new(resolution, 0)),
        Err(err) => {
            error!("Resolve task failed: {}", err);
            ErrorResponse::new("Internal", err).respond(StatusCode::INTERNAL_SERVER_ERROR)
        }
    }
}

/// List known peers
#[utoipa::path(
    get,
    path = "/api/v1/peers",
    responses(
        (status = 200, description = "Known peers", body = PeersResponse)
    )
)]
pub async fn list_peers(network: NetworkData) -> impl Responder {
    HttpResponse::Ok().json(PeersResponse {
        peers: network.registry().list(),
    })
}

/// Register a peer
///
/// The peer must answer a ping. A new peer is asked to register this node
/// and receives the known peer list.
#[utoipa::path(
    post,
    path = "/api/v1/peers",
    request_body = PeerRequest,
    responses(
        (status = 201, description = "Peer added", body = PeersResponse),
        (status = 200, description = "Peer already known", body = PeersResponse),
        (status = 400, description = "Invalid, self or unreachable peer", body = ErrorResponse)
    )
)]
pub async fn add_peer(network: NetworkData, peer_req: web::Json<PeerRequest>) -> impl Responder {
    match network.register(&peer_req.peer).await {
        Ok((url, inserted)) => {
            let peers = PeersResponse {
                peers: network.registry().list(),
            };
            if !inserted {
                return HttpResponse::Ok().json(peers);
            }

            let network = network.clone();
            actix_web::rt::spawn(async move {
                network.introduce(&url).await;
            });
            HttpResponse::Created().json(peers)
        }
        Err(err) => peer_error(err),
    }
}

/// Merge a peer list shared by another node
#[utoipa::path(
    post,
    path = "/api/v1/peers/gossip",
    request_body = GossipRequest,
    responses(
        (status = 200, description = "Peers merged", body = GossipResponse)
    )
)]
pub async fn gossip_peers(network: NetworkData, gossip_req: web::Json<GossipRequest>) -> impl Responder {
    let added = network.registry().gossip(&gossip_req.peers);
    HttpResponse::Ok().json(GossipResponse { added })
}
