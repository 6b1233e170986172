//! OpenRelay server library.
//!
//! Provides a reusable server function to serve the gateway either from the
//! binary, or from the integration tests.

#![deny(missing_docs)]

mod auth;
mod health;

use std::net::SocketAddr;

use anyhow::anyhow;
use axum::{Router, middleware, routing::get};
use config::Config;
use tokio::net::TcpListener;

/// Configuration for serving the gateway.
pub struct ServeConfig {
    /// The socket address (IP and port) the server will bind to.
    pub listen_address: SocketAddr,
    /// The deserialized TOML configuration.
    pub config: Config,
}

/// Assemble the full application router from configuration.
///
/// The `/v1` API surface sits behind the bearer-token middleware; health
/// and stats endpoints are open.
pub fn app(config: &Config) -> anyhow::Result<Router> {
    let mut router = Router::new().route("/health", get(health::health));

    if config.llm.enabled {
        let gateway = llm::Gateway::new(config)?;
        let auth_state = auth::AuthState::new(&config.server.client_api_keys);

        let api = gateway
            .api_router()
            .route_layer(middleware::from_fn_with_state(auth_state, auth::authenticate));

        router = router.merge(api).merge(gateway.ops_router());
    } else {
        log::warn!("LLM endpoints are disabled in the configuration");
    }

    Ok(router)
}

/// Starts and runs the gateway with the provided configuration.
pub async fn serve(ServeConfig { listen_address, config }: ServeConfig) -> anyhow::Result<()> {
    let app = app(&config)?;

    let listener = TcpListener::bind(listen_address)
        .await
        .map_err(|e| anyhow!("Failed to bind to {listen_address}: {e}"))?;

    log::info!("OpenRelay listening on http://{listen_address}");

    axum::serve(listener, app)
        .await
        .map_err(|e| anyhow!("Failed to start HTTP server: {e}"))?;

    Ok(())
}
