// API module
//
// This module contains the REST API of a node, served under /api/v1

pub mod handlers;
pub mod routes;
pub mod schema;

// Re-export main components for easier access
pub use routes::{configure_routes, API_PREFIX};
