#[cfg(test)]
pub mod test_utils {
    use crate::auth::hash_password;
    use crate::config::AppConfig;
    use crate::router::create_router;
    use crate::schemas::AppState;
    use crate::storage::FileStore;
    use async_trait::async_trait;
    use axum_test::TestServer;
    use checkout::gateway::{GatewayConfig, GatewayVerifier};
    use migration::{Migrator, MigratorTrait};
    use model::entities::user;
    use moka::future::Cache;
    use rust_decimal::Decimal;
    use sea_orm::{
        ActiveModelTrait, ConnectionTrait, Database, DatabaseConnection, Set, Statement,
    };
    use std::collections::HashMap;
    use std::sync::{Arc, Mutex};
    use tempfile::TempDir;
    use tracing::Level;
    use tracing_subscriber::FmtSubscriber;

    pub const ADMIN_EMAIL: &str = "admin@test.local";
    pub const ADMIN_PASSWORD: &str = "admin123";

    /// Create an in-memory SQLite database for testing
    pub async fn setup_test_db() -> DatabaseConnection {
        let db = Database::connect("sqlite::memory:")
            .await
            .expect("Failed to connect to in-memory database");

        db.execute(Statement::from_string(
            db.get_database_backend(),
            "PRAGMA foreign_keys = ON;".to_owned(),
        ))
        .await
        .expect("Failed to enable foreign keys");

        // Run migrations
        Migrator::up(&db, None)
            .await
            .expect("Failed to run migrations");

        db
    }

    /// Stands in for the payment gateway: confirms exactly the transactions
    /// it was told it captured, at exactly the captured amount.
    #[derive(Debug, Default)]
    pub struct TestVerifier {
        captured: Mutex<HashMap<String, Decimal>>,
    }

    impl TestVerifier {
        pub fn capture(&self, transaction_id: &str, amount: Decimal) {
            self.captured
                .lock()
                .expect("verifier lock poisoned")
                .insert(transaction_id.to_owned(), amount);
        }
    }

    #[async_trait]
    impl GatewayVerifier for TestVerifier {
        async fn verify(
            &self,
            transaction_id: &str,
            amount: Decimal,
            _reference_id: &str,
        ) -> checkout::Result<bool> {
            let captured = self.captured.lock().expect("verifier lock poisoned");
            Ok(captured.get(transaction_id) == Some(&amount))
        }
    }

    /// Everything a test needs to talk to the app and peek behind it.
    pub struct TestContext {
        pub state: AppState,
        pub verifier: Arc<TestVerifier>,
        // Holds the upload directory alive for the test's duration.
        _upload_dir: TempDir,
    }

    fn test_config(upload_dir: &TempDir) -> AppConfig {
        AppConfig {
            database_url: "sqlite::memory:".to_string(),
            bind_address: "127.0.0.1:0".to_string(),
            upload_dir: upload_dir.path().display().to_string(),
            jwt_secret: "test-secret".to_string(),
            token_ttl_secs: 3600,
            gateway: GatewayConfig {
                checkout_url: "http://gateway.test/checkout".to_string(),
                verify_url: "http://gateway.test/verify".to_string(),
                merchant_id: "TESTMERCHANT".to_string(),
                success_url: "http://app.test/api/v1/payments/success".to_string(),
                failure_url: "http://app.test/api/v1/payments/failure".to_string(),
            },
            admin_username: "admin".to_string(),
            admin_email: ADMIN_EMAIL.to_string(),
            admin_password: ADMIN_PASSWORD.to_string(),
        }
    }

    /// Create AppState for testing, with a seeded admin account and a
    /// scripted gateway verifier.
    pub async fn setup_test_context() -> TestContext {
        let _ = init_test_tracing();

        let db = setup_test_db().await;

        let admin = user::ActiveModel {
            username: Set("admin".to_string()),
            email: Set(ADMIN_EMAIL.to_string()),
            password_hash: Set(hash_password(ADMIN_PASSWORD).expect("Failed to hash password")),
            is_admin: Set(true),
            ..Default::default()
        };
        admin.insert(&db).await.expect("Failed to create test admin");

        let upload_dir = TempDir::new().expect("Failed to create upload dir");
        let store = FileStore::new(upload_dir.path());
        store.ensure_layout().expect("Failed to prepare upload dir");

        let cache = Cache::new(100);
        let verifier = Arc::new(TestVerifier::default());

        let state = AppState {
            db,
            cache,
            store,
            verifier: verifier.clone(),
            config: test_config(&upload_dir),
        };

        TestContext {
            state,
            verifier,
            _upload_dir: upload_dir,
        }
    }

    /// Create axum test server for a context
    pub fn test_server(context: &TestContext) -> TestServer {
        TestServer::new(create_router(context.state.clone())).expect("Failed to build test server")
    }

    /// Initialize tracing for tests with output to STDERR.
    ///
    /// The log level is determined by the RUST_LOG environment variable,
    /// defaulting to WARN if not set.
    fn init_test_tracing() -> tracing::subscriber::DefaultGuard {
        let log_level = std::env::var("RUST_LOG")
            .ok()
            .and_then(|level| match level.to_uppercase().as_str() {
                "ERROR" => Some(Level::ERROR),
                "WARN" => Some(Level::WARN),
                "INFO" => Some(Level::INFO),
                "DEBUG" => Some(Level::DEBUG),
                "TRACE" => Some(Level::TRACE),
                _ => None,
            })
            .unwrap_or(Level::WARN);

        let subscriber = FmtSubscriber::builder()
            .with_max_level(log_level)
            .with_writer(std::io::stderr)
            .finish();
        tracing::subscriber::set_default(subscriber)
    }
}
