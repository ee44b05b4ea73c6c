use actix_cors::Cors;
use actix_web::{middleware, web, App, HttpServer};
use anyhow::{bail, Context};
use clap::Parser;
use log::info;
use tokio::runtime::Handle;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use std::sync::Arc;

mod api;
mod blockchain;
mod config;
mod network;

use blockchain::Node;
use config::NodeConfig;
use network::{spawn_sync_task, HttpBroadcaster, HttpPeerClient, PeerNetwork, PeerRegistry};

#[derive(OpenApi)]
#[openapi(
    paths(
        api::handlers::ping,
        api::handlers::get_chain,
        api::handlers::validate_chain,
        api::handlers::get_mempool,
        api::handlers::merge_mempool,
        api::handlers::create_wallet,
        api::handlers::get_balance,
        api::handlers::submit_transaction,
        api::handlers::new_transaction,
        api::handlers::receive_transaction,
        api::handlers::receive_block,
        api::handlers::mine_block,
        api::handlers::resolve_with_peers,
        api::handlers::resolve_chains,
        api::handlers::list_peers,
        api::handlers::add_peer,
        api::handlers::gossip_peers
    ),
    components(
        schemas(
            blockchain::Block,
            blockchain::Transaction,
            blockchain::crypto::Address,
            blockchain::crypto::KeyMaterial,
            api::schema::ErrorResponse,
            api::schema::ChainResponse,
            api::schema::PeerRequest,
            api::schema::GossipRequest,
            api::handlers::ValidationResponse,
            api::handlers::BalanceResponse,
            api::handlers::SignTransactionRequest,
            api::handlers::TransactionResponse,
            api::handlers::BlockResponse,
            api::handlers::MineRequest,
            api::handlers::MineResponse,
            api::handlers::ResolveRequest,
            api::handlers::ResolveResponse,
            api::handlers::MergeRequest,
            api::handlers::MergeResponse,
            api::handlers::PeersResponse,
            api::handlers::GossipResponse
        )
    ),
    tags(
        (name = "ledger", description = "Ledger node API endpoints")
    ),
    info(
        title = "Ledger Node API",
        version = "1.0.0",
        description = "A proof-of-work ledger node with longest-chain peer sync",
        license(
            name = "MIT",
            url = "https://opensource.org/licenses/MIT"
        )
    )
)]
struct ApiDoc;

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logger
    env_logger::init_from_env(env_logger::Env::new().default_filter_or("info"));

    let config = NodeConfig::parse();
    let chain_config = config.chain_config().context("Invalid consensus parameters")?;
    let sync_interval = config.sync_interval()?;
    let self_url = config.advertised_url();

    // Peer registry, client and broadcaster
    let registry = Arc::new(PeerRegistry::new(&self_url));
    let transport = HttpPeerClient::new(config.peer_timeout()).context("Failed to build peer client")?;
    let network = PeerNetwork::new(registry, Arc::new(transport));
    let broadcaster = HttpBroadcaster::new(network.clone(), Handle::current());

    let node = Arc::new(Node::with_broadcaster(chain_config, Arc::new(broadcaster)));
    if !node.is_chain_valid() {
        bail!("Local chain failed validation at startup");
    }

    info!(
        "Node {} starting with difficulty {} and mining reward {}",
        self_url, chain_config.difficulty, chain_config.mining_reward
    );

    let startup_peers = config.peers.clone();
    let bootstrap = network.clone();
    actix_web::rt::spawn(async move {
        bootstrap.bootstrap(startup_peers).await;
    });
    spawn_sync_task(node.clone(), network.clone(), sync_interval);

    let node_data = web::Data::from(node);
    let network_data = web::Data::new(network);

    info!("Starting HTTP server at http://{}:{}", config.host, config.port);

    // Start HTTP server
    HttpServer::new(move || {
        // Configure CORS
        let cors = Cors::default()
            .allow_any_origin()
            .allow_any_method()
            .allow_any_header()
            .max_age(3600);

        App::new()
            .wrap(middleware::Logger::default())
            .wrap(cors)
            .app_data(node_data.clone())
            .app_data(network_data.clone())
            // API routes
            .configure(api::configure_routes)
            // Swagger UI
            .service(SwaggerUi::new("/swagger-ui/{_:.*}").url("/api-docs/openapi.json", ApiDoc::openapi()))
    })
    .bind((config.host.as_str(), config.port))
    .with_context(|| format!("Failed to bind {}:{}", config.host, config.port))?
    .run()
    .await?;

    Ok(())
}
