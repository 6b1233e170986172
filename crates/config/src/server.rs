use std::net::SocketAddr;

use secrecy::SecretString;
use serde::Deserialize;

/// HTTP server configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ServerConfig {
    /// The socket address the server binds to. Overridable from the CLI.
    pub listen_address: Option<SocketAddr>,

    /// Bearer tokens accepted from clients on the `/v1` endpoints.
    ///
    /// Every request must carry one of these in the `Authorization` header.
    /// An empty list means no client can authenticate.
    pub client_api_keys: Vec<SecretString>,
}
