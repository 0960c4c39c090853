use crate::auth::{AuthorizationResponse, Authorizer};
use crate::types::{DEFAULT_TIMEOUT, PusherError, Result};
use async_trait::async_trait;
use std::time::Duration;

/// Authorizes channels by POSTing to an application endpoint
///
/// Sends `socket_id` and `channel_name` as a form body and expects a JSON
/// [`AuthorizationResponse`] back.
pub struct HttpAuthorizer {
    endpoint: String,
    headers: Vec<(String, String)>,
    timeout: Duration,
    http_client: reqwest::Client,
}

impl HttpAuthorizer {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            headers: Vec::new(),
            timeout: Duration::from_millis(DEFAULT_TIMEOUT),
            http_client: reqwest::Client::new(),
        }
    }

    /// Adds a header to every authorization request (e.g. a session cookie or bearer token)
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Upper bound for one authorization request, connect and body included
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl Authorizer for HttpAuthorizer {
    async fn authorize(&self, channel: &str, socket_id: &str) -> Result<AuthorizationResponse> {
        let mut request = self
            .http_client
            .post(&self.endpoint)
            .timeout(self.timeout)
            .form(&[("socket_id", socket_id), ("channel_name", channel)]);

        for (name, value) in &self.headers {
            request = request.header(name.as_str(), value.as_str());
        }

        let response = request.send().await.map_err(|e| PusherError::Authorization {
            channel: channel.to_string(),
            message: format!("request to {} failed: {}", self.endpoint, e),
        })?;

        if !response.status().is_success() {
            return Err(PusherError::Authorization {
                channel: channel.to_string(),
                message: format!("endpoint returned status {}", response.status()),
            });
        }

        let grant = response
            .json::<AuthorizationResponse>()
            .await
            .map_err(|e| PusherError::Authorization {
                channel: channel.to_string(),
                message: format!("invalid response body: {}", e),
            })?;

        tracing::debug!("Authorized channel {} via HTTP", channel);
        Ok(grant)
    }
}
