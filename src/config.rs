use anyhow::Result;
use checkout::gateway::{GatewayConfig, HttpGatewayVerifier};
use moka::future::Cache;
use sea_orm::Database;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

use crate::schemas::AppState;
use crate::storage::FileStore;

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

/// Application configuration, read once at startup from the environment.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub bind_address: String,
    /// Root directory for uploaded course material and thumbnails.
    pub upload_dir: String,
    pub jwt_secret: String,
    /// Bearer token lifetime in seconds.
    pub token_ttl_secs: i64,
    pub gateway: GatewayConfig,
    /// Credentials for the bootstrap admin account (`seed-admin` command).
    pub admin_username: String,
    pub admin_email: String,
    pub admin_password: String,
}

impl AppConfig {
    /// Load configuration from the environment, with development defaults
    /// matching the gateway's public sandbox.
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();

        let bind_address = env_or("BIND_ADDRESS", "0.0.0.0:3000");
        let public_base = env_or("PUBLIC_BASE_URL", "http://localhost:3000");

        Self {
            database_url: env_or("DATABASE_URL", "sqlite://coursehub.db"),
            bind_address,
            upload_dir: env_or("UPLOAD_DIR", "uploads"),
            jwt_secret: env_or("JWT_SECRET", "dev-secret-change-me"),
            token_ttl_secs: env_or("TOKEN_TTL_SECS", "3600")
                .parse()
                .unwrap_or(3600),
            gateway: GatewayConfig {
                checkout_url: env_or(
                    "GATEWAY_CHECKOUT_URL",
                    "https://uat.esewa.com.np/epay/main",
                ),
                verify_url: env_or(
                    "GATEWAY_VERIFY_URL",
                    "https://uat.esewa.com.np/epay/transrec",
                ),
                merchant_id: env_or("GATEWAY_MERCHANT_ID", "EPAYTEST"),
                success_url: env_or(
                    "GATEWAY_SUCCESS_URL",
                    &format!("{public_base}/api/v1/payments/success"),
                ),
                failure_url: env_or(
                    "GATEWAY_FAILURE_URL",
                    &format!("{public_base}/api/v1/payments/failure"),
                ),
            },
            admin_username: env_or("ADMIN_USERNAME", "admin"),
            admin_email: env_or("ADMIN_EMAIL", "admin@coursehub.local"),
            admin_password: env_or("ADMIN_PASSWORD", "admin123"),
        }
    }
}

/// Build the shared application state: database connection, upload store,
/// cache for dashboard aggregates, and the gateway verifier.
pub async fn initialize_app_state(config: AppConfig) -> Result<AppState> {
    info!("Connecting to database: {}", config.database_url);
    let db = Database::connect(&config.database_url).await?;
    debug!("Database connection established");

    let store = FileStore::new(&config.upload_dir);
    store.ensure_layout()?;
    debug!("Upload directory ready at {}", config.upload_dir);

    // Dashboard aggregates are expensive to recompute on every request;
    // a short TTL keeps them fresh enough.
    let cache = Cache::builder()
        .max_capacity(100)
        .time_to_live(Duration::from_secs(300))
        .build();

    let verifier = Arc::new(HttpGatewayVerifier::new(&config.gateway));

    Ok(AppState {
        db,
        cache,
        store,
        verifier,
        config,
    })
}
