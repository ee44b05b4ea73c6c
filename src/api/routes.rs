use actix_web::web;

use super::handlers;

/// Prefix shared by every API route
pub const API_PREFIX: &str = "/api/v1";

/// Configures the API routes
///
/// # Arguments
///
/// * `cfg` - The service configuration
pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope(API_PREFIX)
            .route("/ping", web::get().to(handlers::ping))
            .route("/chain", web::get().to(handlers::get_chain))
            .route("/validate", web::get().to(handlers::validate_chain))
            .route("/mempool", web::get().to(handlers::get_mempool))
            .route("/mempool/merge", web::post().to(handlers::merge_mempool))
            .route("/wallet/new", web::get().to(handlers::create_wallet))
            .route("/balance/{address}", web::get().to(handlers::get_balance))
            .route("/transactions", web::post().to(handlers::submit_transaction))
            .route("/transactions/new", web::post().to(handlers::new_transaction))
            .route("/transactions/receive", web::post().to(handlers::receive_transaction))
            .route("/blocks/receive", web::post().to(handlers::receive_block))
            .route("/mine", web::post().to(handlers::mine_block))
            .route("/resolve", web::get().to(handlers::resolve_with_peers))
            .route("/resolve", web::post().to(handlers::resolve_chains))
            .route("/peers", web::get().to(handlers::list_peers))
            .route("/peers", web::post().to(handlers::add_peer))
            .route("/peers/gossip", web::post().to(handlers::gossip_peers)),
    );
}
