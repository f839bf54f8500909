// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! The Console reporter's outbound HTTP client. A thin `reqwest`
//! wrapper: build once, classify the response status into the taxonomy
//! the reporter's tick loop branches on.

use crate::config::{AuthHeaderKind, ConsoleConfig};
use async_trait::async_trait;
use serde::Serialize;

#[derive(Debug, thiserror::Error)]
pub enum ConsoleClientError {
    #[error("agent is not authorized with the console")]
    Unauthorized,
    #[error("the source has been removed from the console")]
    SourceGone,
    #[error("console client error: {0}")]
    Client(String),
    #[error("console server error: {0}")]
    Transient(String),
    #[error("network error: {0}")]
    Network(String),
}

impl ConsoleClientError {
    /// Transient failures are the only ones the reporter retries with
    /// backoff; everything else is fatal or terminal.
    pub fn is_transient(&self) -> bool {
        matches!(self, ConsoleClientError::Transient(_) | ConsoleClientError::Network(_))
    }
}

#[derive(Debug, Serialize)]
pub struct AgentStatusPush<'a> {
    pub status: &'a str,
    pub status_info: Option<&'a str>,
    pub source_id: &'a str,
    pub version: &'a str,
    pub credential_url: Option<&'a str>,
}

#[derive(Debug, Serialize)]
pub struct SourceInventoryPush<'a> {
    pub agent_id: &'a str,
    pub inventory: &'a serde_json::value::RawValue,
}

#[async_trait]
pub trait ConsoleClient: Send + Sync {
    async fn push_status(&self, body: AgentStatusPush<'_>) -> Result<(), ConsoleClientError>;

    async fn push_inventory(&self, body: SourceInventoryPush<'_>) -> Result<(), ConsoleClientError>;
}

pub struct HttpConsoleClient {
    http: reqwest::Client,
    config: ConsoleConfig,
}

impl HttpConsoleClient {
    pub fn new(config: ConsoleConfig) -> Result<Self, reqwest::Error> {
        let http = reqwest::Client::builder().connection_verbose(true).build()?;
        Ok(Self { http, config })
    }

    fn authorize(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match self.config.auth_header {
            AuthHeaderKind::Bearer => builder.bearer_auth(&self.config.token),
            AuthHeaderKind::XAgentToken => builder.header("X-Agent-Token", &self.config.token),
        }
    }

    async fn put_json<B: Serialize + Sync>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<(), ConsoleClientError> {
        let url = self
            .config
            .base_url
            .join(path)
            .map_err(|e| ConsoleClientError::Client(e.to_string()))?;

        let response = self
            .authorize(self.http.put(url))
            .json(body)
            .send()
            .await
            .map_err(|e| ConsoleClientError::Network(e.to_string()))?;

        classify(response).await
    }

    pub async fn push_status_raw(&self, body: &AgentStatusPush<'_>) -> Result<(), ConsoleClientError> {
        self.put_json(&format!("agents/{}/status", self.config.agent_id), body)
            .await
    }

    pub async fn push_inventory_raw(
        &self,
        body: &SourceInventoryPush<'_>,
    ) -> Result<(), ConsoleClientError> {
        self.put_json(&format!("sources/{}/status", self.config.source_id), body)
            .await
    }
}

#[async_trait]
impl ConsoleClient for HttpConsoleClient {
    async fn push_status(&self, body: AgentStatusPush<'_>) -> Result<(), ConsoleClientError> {
        self.push_status_raw(&body).await
    }

    async fn push_inventory(&self, body: SourceInventoryPush<'_>) -> Result<(), ConsoleClientError> {
        self.push_inventory_raw(&body).await
    }
}

/// Classifies a response per spec.md §6: 2xx ok, 401 unauthorized
/// (fatal), 410 gone (fatal), other 4xx client error (fatal), 5xx
/// transient (retried with backoff).
async fn classify(response: reqwest::Response) -> Result<(), ConsoleClientError> {
    let status = response.status();
    if status.is_success() {
        return Ok(());
    }
    if status.as_u16() == 401 {
        return Err(ConsoleClientError::Unauthorized);
    }
    if status.as_u16() == 410 {
        return Err(ConsoleClientError::SourceGone);
    }

    let body = response.text().await.unwrap_or_default();
    if status.is_client_error() {
        Err(ConsoleClientError::Client(format!("{status}: {body}")))
    } else {
        Err(ConsoleClientError::Transient(format!("{status}: {body}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_r::test;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn client_for(server: &MockServer) -> HttpConsoleClient {
        let mut config = ConsoleConfig::default();
        config.base_url = url::Url::parse(&format!("{}/", server.uri())).unwrap();
        HttpConsoleClient::new(config).unwrap()
    }

    #[test]
    async fn success_status_push_returns_ok() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .and(path("/agents/agent-0/status"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let client = client_for(&server).await;
        let result = client
            .push_status(AgentStatusPush {
                status: "connected",
                status_info: None,
                source_id: "source-0",
                version: "1.0.0",
                credential_url: None,
            })
            .await;
        assert!(result.is_ok());
    }

    #[test]
    async fn unauthorized_status_maps_to_fatal_variant() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .and(path("/agents/agent-0/status"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;

        let client = client_for(&server).await;
        let err = client
            .push_status(AgentStatusPush {
                status: "connected",
                status_info: None,
                source_id: "source-0",
                version: "1.0.0",
                credential_url: None,
            })
            .await
            .unwrap_err();
        assert!(matches!(err, ConsoleClientError::Unauthorized));
        assert!(!err.is_transient());
    }

    #[test]
    async fn source_gone_status_maps_to_fatal_variant() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .and(path("/sources/source-0/status"))
            .respond_with(ResponseTemplate::new(410))
            .mount(&server)
            .await;

        let client = client_for(&server).await;
        let err = client
            .push_inventory(SourceInventoryPush {
                agent_id: "agent-0",
                inventory: serde_json::value::RawValue::from_string("{}".to_string())
                    .unwrap()
                    .as_ref(),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, ConsoleClientError::SourceGone));
    }

    #[test]
    async fn server_error_is_transient() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .and(path("/agents/agent-0/status"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let client = client_for(&server).await;
        let err = client
            .push_status(AgentStatusPush {
                status: "connected",
                status_info: None,
                source_id: "source-0",
                version: "1.0.0",
                credential_url: None,
            })
            .await
            .unwrap_err();
        assert!(err.is_transient());
    }

    #[test]
    async fn other_client_error_is_not_transient() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .and(path("/agents/agent-0/status"))
            .respond_with(ResponseTemplate::new(400))
            .mount(&server)
            .await;

        let client = client_for(&server).await;
        let err = client
            .push_status(AgentStatusPush {
                status: "connected",
                status_info: None,
                source_id: "source-0",
                version: "1.0.0",
                credential_url: None,
            })
            .await
            .unwrap_err();
        assert!(!err.is_transient());
        assert!(matches!(err, ConsoleClientError::Client(_)));
    }
}
