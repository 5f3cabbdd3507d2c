//! HTTP provisioning-backend client.
//!
//! Each realization is a single `POST {endpoint}/v1/resources` carrying the
//! node identity, its kind and its concrete properties. The backend answers
//! with the published outputs. Failures are reported as-is; retry policy is
//! left to whoever drives the engine.

use async_trait::async_trait;
use reqwest::{header, Client};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, trace};

use crate::error::ProviderError;
use crate::model::{NodeId, Outputs, ResourceKind};

use super::realizer::{Realizer, ResolvedProperties};

/// Default request timeout in seconds.
const DEFAULT_TIMEOUT_SECS: u64 = 300;

/// Path of the provisioning endpoint, relative to the base URL.
const RESOURCES_PATH: &str = "/v1/resources";

/// Realizer backed by a remote provisioning service.
#[derive(Debug, Clone)]
pub struct HttpRealizer {
    /// HTTP client.
    client: Client,
    /// Base URL, without trailing slash.
    endpoint: String,
    /// Optional bearer token.
    token: Option<String>,
}

/// Provisioning request body.
#[derive(Debug, Serialize)]
struct RealizeRequest<'a> {
    identity: &'a NodeId,
    kind: ResourceKind,
    properties: &'a ResolvedProperties,
}

/// Provisioning response body.
#[derive(Debug, Deserialize)]
struct RealizeResponse {
    outputs: Outputs,
}

/// Error body some backends send alongside a non-2xx status.
#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: String,
}

impl HttpRealizer {
    /// Creates a client for the backend at `endpoint`.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be created.
    pub fn new(endpoint: &str) -> Result<Self, ProviderError> {
        Self::with_timeout(endpoint, DEFAULT_TIMEOUT_SECS)
    }

    /// Creates a client with a custom timeout.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be created.
    pub fn with_timeout(endpoint: &str, timeout_secs: u64) -> Result<Self, ProviderError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| ProviderError::network(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            endpoint: endpoint.trim_end_matches('/').to_string(),
            token: None,
        })
    }

    /// Sends `token` as a bearer credential on every request.
    #[must_use]
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    /// Returns the backend base URL.
    #[must_use]
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl Realizer for HttpRealizer {
    async fn realize(
        &self,
        identity: &NodeId,
        kind: ResourceKind,
        properties: &ResolvedProperties,
    ) -> Result<Outputs, ProviderError> {
        let url = format!("{}{RESOURCES_PATH}", self.endpoint);
        trace!("POST {url} for {kind} '{identity}'");

        let mut request = self
            .client
            .post(&url)
            .header(header::CONTENT_TYPE, "application/json")
            .json(&RealizeRequest {
                identity,
                kind,
                properties,
            });
        if let Some(token) = &self.token {
            request = request.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }

        let response = request
            .send()
            .await
            .map_err(|e| ProviderError::network(format!("Request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<ErrorBody>(&body)
                .map(|b| b.message)
                .unwrap_or(body);
            return Err(ProviderError::rejected(status.as_u16(), message));
        }

        let body: RealizeResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::invalid_response(format!("Failed to parse response: {e}")))?;

        debug!("Backend realized '{identity}' with {} outputs", body.outputs.len());
        Ok(body.outputs)
    }

    fn provider_name(&self) -> &'static str {
        "http"
    }

    fn provider_target(&self) -> Option<String> {
        Some(self.endpoint.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn props() -> ResolvedProperties {
        [("engine".to_string(), json!("aurora-postgresql"))].into_iter().collect()
    }

    #[tokio::test]
    async fn test_realize_returns_outputs() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/resources"))
            .and(header("authorization", "Bearer s3cret"))
            .and(body_partial_json(json!({
                "identity": "database",
                "kind": "database-cluster",
                "properties": {"engine": "aurora-postgresql"}
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "outputs": {"endpoint": "db.internal", "port": 5432}
            })))
            .expect(1)
            .mount(&server)
            .await;

        let realizer = HttpRealizer::new(&format!("{}/", server.uri()))
            .unwrap()
            .with_token("s3cret");
        let outputs = realizer
            .realize(&NodeId::from("database"), ResourceKind::DatabaseCluster, &props())
            .await
            .unwrap();

        assert_eq!(outputs["endpoint"], json!("db.internal"));
        assert_eq!(outputs["port"], json!(5432));
    }

    #[tokio::test]
    async fn test_rejection_carries_status_and_message() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(409).set_body_json(json!({"message": "quota exceeded"})))
            .mount(&server)
            .await;

        let realizer = HttpRealizer::new(&server.uri()).unwrap();
        let err = realizer
            .realize(&NodeId::from("cache"), ResourceKind::CacheCluster, &props())
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            ProviderError::Rejected { status: 409, ref message } if message == "quota exceeded"
        ));
    }

    #[tokio::test]
    async fn test_malformed_body_is_invalid_response() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
            .mount(&server)
            .await;

        let realizer = HttpRealizer::new(&server.uri()).unwrap();
        let err = realizer
            .realize(&NodeId::from("vpc"), ResourceKind::Network, &props())
            .await
            .unwrap_err();

        assert!(matches!(err, ProviderError::InvalidResponse { .. }));
    }

    #[tokio::test]
    async fn test_unreachable_backend_is_network_error() {
        let realizer = HttpRealizer::with_timeout("http://127.0.0.1:9", 2).unwrap();
        let err = realizer
            .realize(&NodeId::from("vpc"), ResourceKind::Network, &props())
            .await
            .unwrap_err();

        assert!(matches!(err, ProviderError::Network { .. }));
    }
}
