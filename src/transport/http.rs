use crate::{Error, ErrorContext, Result};
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use url::Url;

/// Header carrying our per-call correlation id.
pub const REQUEST_ID_HEADER: &str = "x-request-id";

#[derive(Debug, Clone)]
pub struct TransportConfig {
    pub connect_timeout: Duration,
    /// Sent with every request. The credential layer in front of the proxy attaches
    /// its authorization header here.
    pub default_headers: HeaderMap,
    pub user_agent: String,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(10),
            default_headers: HeaderMap::new(),
            user_agent: format!("chat-connector/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

#[derive(Debug, Serialize)]
struct CreateChatRequest<'a> {
    data: CreateChatData<'a>,
}

#[derive(Debug, Serialize)]
struct CreateChatData<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    attributes: CreateChatAttributes<'a>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CreateChatAttributes<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    agent_id: Option<&'a str>,
}

/// Body of a successful session-create response.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateChatResponse {
    pub data: ChatResource,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChatResource {
    pub id: String,
}

#[derive(Debug, Serialize)]
struct ContinueChatRequest<'a> {
    input: &'a str,
}

/// Thin wrapper over `reqwest` for the three proxy endpoints.
///
/// Status codes are not interpreted here; callers classify the returned response.
pub struct HttpTransport {
    client: reqwest::Client,
    base_url: Url,
}

impl HttpTransport {
    pub fn new(base_url: &str, config: &TransportConfig) -> Result<Self> {
        let base_url = Url::parse(base_url).map_err(|e| {
            Error::configuration_with_context(
                format!("invalid base URL: {}", e),
                ErrorContext::new()
                    .with_field_path("base_url")
                    .with_details(base_url.to_string())
                    .with_source("http_transport"),
            )
        })?;
        if !matches!(base_url.scheme(), "http" | "https") || base_url.cannot_be_a_base() {
            return Err(Error::configuration_with_context(
                "base URL must be an absolute http(s) URL",
                ErrorContext::new()
                    .with_field_path("base_url")
                    .with_details(base_url.to_string())
                    .with_source("http_transport"),
            ));
        }

        // No overall request timeout: streamed responses may legitimately run long.
        // Deadlines are composed by callers through cancellation.
        let client = reqwest::Client::builder()
            .connect_timeout(config.connect_timeout)
            .default_headers(config.default_headers.clone())
            .user_agent(config.user_agent.clone())
            .pool_idle_timeout(Some(Duration::from_secs(90)))
            .build()
            .map_err(|e| {
                Error::configuration_with_context(
                    format!("failed to build HTTP client: {}", e),
                    ErrorContext::new().with_source("http_transport"),
                )
            })?;

        Ok(Self { client, base_url })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Resolve `segments` below the base URL, percent-encoding each one.
    pub(crate) fn endpoint(&self, segments: &[&str]) -> Result<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| {
                Error::configuration_with_context(
                    "base URL cannot carry a path",
                    ErrorContext::new()
                        .with_field_path("base_url")
                        .with_source("http_transport"),
                )
            })?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    /// `POST {base}/api/chats`
    pub async fn create_session(&self, agent_id: Option<&str>) -> Result<reqwest::Response> {
        let url = self.endpoint(&["api", "chats"])?;
        let body = CreateChatRequest {
            data: CreateChatData {
                kind: "chats",
                attributes: CreateChatAttributes { agent_id },
            },
        };
        self.client
            .post(url)
            .json(&body)
            .send()
            .await
            .map_err(Error::network)
    }

    /// `POST {base}/api/chats/{id}/continue`, returning the unread streaming response.
    pub async fn continue_chat(
        &self,
        session_id: &str,
        input: &str,
        client_request_id: &str,
    ) -> Result<reqwest::Response> {
        let url = self.endpoint(&["api", "chats", session_id, "continue"])?;
        let mut req = self
            .client
            .post(url)
            .json(&ContinueChatRequest { input })
            .header(ACCEPT, HeaderValue::from_static("text/event-stream"));
        if let Ok(v) = HeaderValue::from_str(client_request_id) {
            req = req.header(REQUEST_ID_HEADER, v);
        }
        req.send().await.map_err(Error::network)
    }

    /// `GET {base}/health`
    pub async fn health(&self) -> Result<reqwest::Response> {
        let url = self.endpoint(&["health"])?;
        self.client.get(url).send().await.map_err(Error::network)
    }
}
