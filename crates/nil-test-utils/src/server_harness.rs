//! Test server harness
//!
//! Builds the real NIL API router over an in-memory identity store, either
//! for in-process `oneshot` calls or bound to a local port.

use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use nil_api::config::Config;
use nil_api::observability::metrics::init_metrics_recorder;
use nil_api::repositories::{IdentityStore, InMemoryIdentityStore};
use nil_api::routes::{self, AppState};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, OnceLock};
use tokio::task::JoinHandle;

static TEST_METRICS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Issuer the harness configures by default.
pub const TEST_ISSUER: &str = "https://clerk.nil.test";

/// Configuration pointing at `jwks_url` and expecting `TEST_ISSUER`.
pub fn test_config(jwks_url: &str) -> Config {
    test_config_with(jwks_url, &[])
}

/// Like [`test_config`] with extra environment overrides.
pub fn test_config_with(jwks_url: &str, overrides: &[(&str, &str)]) -> Config {
    let mut vars = HashMap::from([
        ("BIND_ADDRESS".to_string(), "127.0.0.1:0".to_string()),
        ("JWKS_URL".to_string(), jwks_url.to_string()),
        ("JWT_ISSUER".to_string(), TEST_ISSUER.to_string()),
    ]);
    for (key, value) in overrides {
        vars.insert((*key).to_string(), (*value).to_string());
    }
    Config::from_vars(&vars).expect("test configuration is valid")
}

/// Metrics handle shared by every router built in this process.
///
/// Installs the global recorder on first use; if another recorder is
/// already installed, falls back to a detached one.
pub fn test_metrics_handle() -> PrometheusHandle {
    TEST_METRICS_HANDLE
        .get_or_init(|| {
            init_metrics_recorder()
                .unwrap_or_else(|_| PrometheusBuilder::new().build_recorder().handle())
        })
        .clone()
}

/// The application router over `store`.
pub fn test_router(config: Config, store: Arc<dyn IdentityStore>) -> axum::Router {
    let state = Arc::new(AppState::new(config, None, store));
    routes::build_routes(state, test_metrics_handle())
}

/// A NIL API server listening on a random local port.
///
/// # Example
/// ```rust,ignore
/// let jwks = MockJwksServer::with_keys(&[&PRIMARY_KEY]).await;
/// let server = TestApiServer::spawn(test_config(&jwks.url())).await?;
///
/// let response = reqwest::get(format!("{}/api/v1/health", server.url())).await?;
/// assert_eq!(response.status(), 200);
/// ```
pub struct TestApiServer {
    addr: SocketAddr,
    store: Arc<InMemoryIdentityStore>,
    config: Config,
    _handle: JoinHandle<()>,
}

impl TestApiServer {
    /// Spawn a server over a fresh in-memory store.
    pub async fn spawn(config: Config) -> Result<Self, anyhow::Error> {
        Self::spawn_with_store(config, Arc::new(InMemoryIdentityStore::new())).await
    }

    /// Spawn a server over `store`.
    pub async fn spawn_with_store(
        config: Config,
        store: Arc<InMemoryIdentityStore>,
    ) -> Result<Self, anyhow::Error> {
        let app = test_router(config.clone(), store.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .map_err(|e| anyhow::anyhow!("Failed to bind test server: {}", e))?;

        let addr = listener
            .local_addr()
            .map_err(|e| anyhow::anyhow!("Failed to get local address: {}", e))?;

        let handle = tokio::spawn(async move {
            let make_service = app.into_make_service_with_connect_info::<SocketAddr>();
            if let Err(e) = axum::serve(listener, make_service).await {
                eprintln!("Test server error: {}", e);
            }
        });

        Ok(Self {
            addr,
            store,
            config,
            _handle: handle,
        })
    }

    /// Base URL of the server.
    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// The identity store behind the server.
    pub fn store(&self) -> &Arc<InMemoryIdentityStore> {
        &self.store
    }

    pub fn config(&self) -> &Config {
        &self.config
    }
}

impl Drop for TestApiServer {
    fn drop(&mut self) {
        self._handle.abort();
    }
}
