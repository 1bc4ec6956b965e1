//! API Server
//!
//! Router assembly and server startup.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use tower_http::compression::CompressionLayer;
use tower_http::cors::{Any, CorsLayer};

use super::middleware::{request_logging_middleware, security_headers_middleware};
use super::routes::{
    handle_add_shielding_address, handle_check_exists, handle_estimated_fee, handle_health,
    handle_history_by_external_tx, handle_list_shielding_addresses, handle_shield_history,
    handle_stats,
};
use super::stats::RequestStats;
use crate::service::SharedShieldService;

/// Create the portal router
pub fn create_router(service: SharedShieldService) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let stats = Arc::new(RequestStats::new());
    let stats_routes = Router::new()
        .route("/stats", get(handle_stats))
        .with_state(Arc::clone(&stats));

    Router::new()
        .route("/health", get(handle_health))
        .route(
            "/checkportalshieldingaddressexisted",
            get(handle_check_exists),
        )
        .route(
            "/addportalshieldingaddress",
            post(handle_add_shielding_address),
        )
        .route(
            "/getlistportalshieldingaddress",
            get(handle_list_shielding_addresses),
        )
        .route("/getestimatedunshieldingfee", get(handle_estimated_fee))
        .route("/getshieldhistory", post(handle_shield_history))
        .route(
            "/getshieldhistorybyexternaltxid",
            get(handle_history_by_external_tx),
        )
        .merge(stats_routes)
        .layer(middleware::from_fn(security_headers_middleware))
        .layer(middleware::from_fn_with_state(
            stats,
            request_logging_middleware,
        ))
        .layer(CompressionLayer::new().gzip(true))
        .layer(cors)
        .with_state(service)
}

/// Bind `host:port` and serve until the process exits
pub async fn start_server(
    service: SharedShieldService,
    host: &str,
    port: u16,
) -> Result<(), std::io::Error> {
    let app = create_router(service);
    let addr: SocketAddr = format!("{}:{}", host, port)
        .parse()
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidInput, e))?;

    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(target: "shield::api", %addr, "shielding portal API listening");

    axum::serve(listener, app).await
}
