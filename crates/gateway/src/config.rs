// Gateway configuration.
//
// Centralizes environment variable parsing with defaults for local
// development. Individual modules (DB pool, CORS) may still read their
// own env vars — this module covers the core server settings.

use std::net::SocketAddr;

/// Core gateway configuration.
///
/// Constructed via [`GatewayConfig::from_env`] which reads environment
/// variables and falls back to sensible development defaults.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// Listen address (host:port).
    pub listen_addr: SocketAddr,
    /// gRPC endpoint of the simulation server.
    pub queen_url: String,
    /// PostgreSQL connection string.
    pub database_url: Option<String>,
    /// JWT signing secret for access tokens.
    pub jwt_secret: String,
    /// Comma-separated CORS origins (or `"*"` for any).
    pub cors_origins: Option<String>,
    /// Log filter directive (e.g. `info`, `hexgate_gateway=debug`).
    pub log_filter: String,
}

impl GatewayConfig {
    /// Parse configuration from environment variables.
    ///
    /// | Variable | Default |
    /// |---|---|
    /// | `HEXGATE_HOST` | `0.0.0.0` |
    /// | `HEXGATE_PORT` | `8080` |
    /// | `HEXGATE_QUEEN_URL` | `http://localhost:50051` |
    /// | `HEXGATE_DATABASE_URL` | *(none — in-memory user store)* |
    /// | `HEXGATE_JWT_SECRET` | dev-only placeholder |
    /// | `HEXGATE_CORS_ORIGINS` | *(none — cors.rs uses dev defaults)* |
    /// | `HEXGATE_LOG_FILTER` | `info` |
    pub fn from_env() -> Self {
        Self::from_env_fn(|key| std::env::var(key))
    }

    /// Testable constructor that accepts an environment lookup function.
    fn from_env_fn<F>(env: F) -> Self
    where
        F: Fn(&str) -> Result<String, std::env::VarError>,
    {
        let host = env("HEXGATE_HOST").unwrap_or_else(|_| "0.0.0.0".into());
        let port: u16 = env("HEXGATE_PORT")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(8080);
        let listen_addr = format!("{host}:{port}")
            .parse()
            .unwrap_or_else(|_| SocketAddr::from(([0, 0, 0, 0], port)));

        let queen_url =
            env("HEXGATE_QUEEN_URL").unwrap_or_else(|_| "http://localhost:50051".into());

        let database_url = env("HEXGATE_DATABASE_URL").ok();

        let jwt_secret = env("HEXGATE_JWT_SECRET").unwrap_or_else(|_| {
            "hexgate_local_development_jwt_secret_must_be_32_chars".into()
        });

        let cors_origins = env("HEXGATE_CORS_ORIGINS").ok();

        let log_filter = env("HEXGATE_LOG_FILTER").unwrap_or_else(|_| "info".into());

        Self {
            listen_addr,
            queen_url,
            database_url,
            jwt_secret,
            cors_origins,
            log_filter,
        }
    }

    /// Returns true when using the development-only JWT secret.
    pub fn is_dev_jwt_secret(&self) -> bool {
        self.jwt_secret == "hexgate_local_development_jwt_secret_must_be_32_chars"
    }
}
