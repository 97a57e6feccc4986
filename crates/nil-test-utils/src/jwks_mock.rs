//! Mock key-set endpoint
//!
//! Wraps a `wiremock` server that publishes fixture keys the way the
//! identity provider does.

use crate::crypto_fixtures::TestSigningKey;
use serde_json::json;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Path the mock serves the key set on.
pub const JWKS_PATH: &str = "/.well-known/jwks.json";

pub struct MockJwksServer {
    server: MockServer,
}

impl MockJwksServer {
    /// Start a server with nothing mounted (every request gets 404).
    pub async fn start() -> Self {
        Self {
            server: MockServer::start().await,
        }
    }

    /// Start a server publishing `keys`.
    pub async fn with_keys(keys: &[&TestSigningKey]) -> Self {
        let mock = Self::start().await;
        mock.serve_keys(keys).await;
        mock
    }

    /// Full key-set URL.
    pub fn url(&self) -> String {
        format!("{}{}", self.server.uri(), JWKS_PATH)
    }

    /// Publish `keys`, replacing any previous response.
    ///
    /// Resets the recorded request count.
    pub async fn serve_keys(&self, keys: &[&TestSigningKey]) {
        let body = json!({ "keys": keys.iter().map(|k| k.jwk()).collect::<Vec<_>>() });
        self.serve(ResponseTemplate::new(200).set_body_json(body))
            .await;
    }

    /// Answer with `status` and a raw `body`, replacing any previous response.
    ///
    /// Resets the recorded request count.
    pub async fn serve_raw(&self, status: u16, body: &str) {
        self.serve(ResponseTemplate::new(status).set_body_string(body.to_string()))
            .await;
    }

    /// Number of key-set requests received since the last reset.
    pub async fn request_count(&self) -> usize {
        self.server
            .received_requests()
            .await
            .map(|requests| requests.len())
            .unwrap_or(0)
    }

    async fn serve(&self, response: ResponseTemplate) {
        self.server.reset().await;
        Mock::given(method("GET"))
            .and(path(JWKS_PATH))
            .respond_with(response)
            .mount(&self.server)
            .await;
    }
}
