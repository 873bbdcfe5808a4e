//! HTTP transport to the engine gateway.
//!
//! [`Transport`] has one method per gateway endpoint. [`HttpTransport`] is
//! the reqwest implementation; tests substitute their own.

use async_trait::async_trait;
use reqwest::{Client, StatusCode, Url};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::time::Duration;
use stompconf::EngineConfig;
use stompproto::payload::{
    Ack, ChainSetRequest, CurrentPreset, EnabledRequest, ErrorBody, NameRequest,
    ParamFileRequest, ParamSetRequest, StateResponse, SystemSnapshot,
};
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum TransportError {
    /// Connection refused, timeout, DNS, and the like.
    #[error("network error: {0}")]
    Network(String),

    /// The gateway answered with a non-success status.
    #[error("HTTP {status}: {body}")]
    Http { status: u16, body: String },

    /// A success response whose body could not be decoded.
    #[error("decode error: {0}")]
    Decode(String),
}

impl TransportError {
    pub fn status(&self) -> Option<u16> {
        match self {
            TransportError::Http { status, .. } => Some(*status),
            _ => None,
        }
    }
}

/// The engine gateway's endpoints.
#[async_trait]
pub trait Transport: Send + Sync {
    /// `GET /api/state`: config, program and preset dumps.
    async fn state(&self) -> Result<StateResponse, TransportError>;

    /// `GET /api/system`: status-strip data.
    async fn system(&self) -> Result<SystemSnapshot, TransportError>;

    /// `GET /api/preset/current`. `None` when no preset is active.
    async fn current_preset(&self) -> Result<Option<String>, TransportError>;

    async fn set_param(&self, plugin: &str, param: &str, value: f64)
        -> Result<(), TransportError>;

    async fn set_file_param(
        &self,
        plugin: &str,
        param: &str,
        value: &str,
    ) -> Result<(), TransportError>;

    async fn set_enabled(&self, plugin: &str, enabled: bool) -> Result<(), TransportError>;

    async fn release_plugin(&self, plugin: &str) -> Result<(), TransportError>;

    async fn load_preset(&self, name: &str) -> Result<(), TransportError>;

    async fn save_preset(&self, name: &str) -> Result<(), TransportError>;

    async fn save_preset_as(&self, name: &str) -> Result<(), TransportError>;

    async fn delete_preset(&self, name: &str) -> Result<(), TransportError>;

    async fn set_chain(&self, chain: &str, plugins: &[String]) -> Result<(), TransportError>;
}

/// reqwest-backed [`Transport`].
pub struct HttpTransport {
    base_url: String,
    client: Client,
}

impl HttpTransport {
    /// Create a transport for the gateway at `base_url`.
    ///
    /// A trailing slash is stripped. `timeout` applies to each request.
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, TransportError> {
        let base_url = base_url.trim_end_matches('/').to_string();
        Url::parse(&base_url)
            .map_err(|e| TransportError::Network(format!("invalid engine url {base_url:?}: {e}")))?;

        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| TransportError::Network(e.to_string()))?;

        Ok(Self { base_url, client })
    }

    pub fn from_config(config: &EngineConfig) -> Result<Self, TransportError> {
        Self::new(&config.url, Duration::from_millis(config.timeout_ms))
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// URL with percent-encoded path segments, for plugin and chain names.
    fn segment_url(&self, segments: &[&str]) -> Result<Url, TransportError> {
        let mut url = Url::parse(&self.base_url)
            .map_err(|e| TransportError::Network(format!("invalid engine url: {e}")))?;
        url.path_segments_mut()
            .map_err(|_| TransportError::Network("engine url cannot be a base".to_string()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, TransportError> {
        let response = self
            .client
            .get(self.url(path))
            .send()
            .await
            .map_err(|e| TransportError::Network(e.to_string()))?;

        let response = check_status(response).await?;
        response
            .json::<T>()
            .await
            .map_err(|e| TransportError::Decode(format!("{path}: {e}")))
    }

    async fn post_json<B: Serialize + ?Sized>(
        &self,
        url: impl reqwest::IntoUrl,
        body: Option<&B>,
    ) -> Result<(), TransportError> {
        let mut request = self.client.post(url);
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request
            .send()
            .await
            .map_err(|e| TransportError::Network(e.to_string()))?;

        let response = check_status(response).await?;
        let status = response.status().as_u16();
        let text = response
            .text()
            .await
            .map_err(|e| TransportError::Network(e.to_string()))?;

        // any 2xx is accepted; only a parsed negative ack is a failure
        let ack: Ack = match serde_json::from_str(&text) {
            Ok(ack) => ack,
            Err(_) => {
                if !text.trim().is_empty() {
                    debug!(status, body = %text.trim(), "non-ack success body");
                }
                return Ok(());
            }
        };
        match ack.error {
            Some(error) if !ack.ok && !error.is_empty() => Err(TransportError::Http {
                status,
                body: error,
            }),
            _ => Ok(()),
        }
    }

    async fn post_name(&self, path: &str, name: &str) -> Result<(), TransportError> {
        let body = NameRequest {
            name: name.to_string(),
        };
        self.post_json(self.url(path), Some(&body)).await
    }
}

/// Turn a non-success response into [`TransportError::Http`].
async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, TransportError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let text = response.text().await.unwrap_or_default();
    Err(TransportError::Http {
        status: status.as_u16(),
        body: error_message(&text),
    })
}

/// The `error` field of a JSON body when there is one, otherwise the text.
fn error_message(text: &str) -> String {
    serde_json::from_str::<ErrorBody>(text)
        .map(|b| b.error)
        .unwrap_or_else(|_| text.trim().to_string())
}

#[async_trait]
impl Transport for HttpTransport {
    #[tracing::instrument(skip(self), fields(path = "/api/state"))]
    async fn state(&self) -> Result<StateResponse, TransportError> {
        self.get_json("/api/state").await
    }

    #[tracing::instrument(skip(self), fields(path = "/api/system"))]
    async fn system(&self) -> Result<SystemSnapshot, TransportError> {
        self.get_json("/api/system").await
    }

    #[tracing::instrument(skip(self), fields(path = "/api/preset/current"))]
    async fn current_preset(&self) -> Result<Option<String>, TransportError> {
        match self.get_json::<CurrentPreset>("/api/preset/current").await {
            Ok(current) => {
                if let Some(error) = current.error.filter(|e| !e.is_empty()) {
                    return Err(TransportError::Http {
                        status: StatusCode::OK.as_u16(),
                        body: error,
                    });
                }
                let name = current.current_preset.trim();
                Ok((!name.is_empty()).then(|| name.to_string()))
            }
            Err(TransportError::Http { status: 404, .. }) => {
                debug!("/api/preset/current missing, deriving from /api/state");
                let state = self.state().await?;
                Ok(state
                    .program
                    .text()
                    .and_then(stompproto::current_preset))
            }
            Err(e) => Err(e),
        }
    }

    #[tracing::instrument(skip(self), fields(path = "/api/param/set"))]
    async fn set_param(
        &self,
        plugin: &str,
        param: &str,
        value: f64,
    ) -> Result<(), TransportError> {
        let body = ParamSetRequest {
            plugin: plugin.to_string(),
            param: param.to_string(),
            value,
        };
        self.post_json(self.url("/api/param/set"), Some(&body)).await
    }

    #[tracing::instrument(skip(self), fields(path = "/api/param/file"))]
    async fn set_file_param(
        &self,
        plugin: &str,
        param: &str,
        value: &str,
    ) -> Result<(), TransportError> {
        let body = ParamFileRequest {
            plugin: plugin.to_string(),
            param: param.to_string(),
            value: value.to_string(),
        };
        self.post_json(self.url("/api/param/file"), Some(&body)).await
    }

    #[tracing::instrument(skip(self), fields(path = "/api/plugins/{name}/enabled"))]
    async fn set_enabled(&self, plugin: &str, enabled: bool) -> Result<(), TransportError> {
        let url = self.segment_url(&["api", "plugins", plugin, "enabled"])?;
        self.post_json(url, Some(&EnabledRequest { enabled })).await
    }

    #[tracing::instrument(skip(self), fields(path = "/api/plugins/{name}/release"))]
    async fn release_plugin(&self, plugin: &str) -> Result<(), TransportError> {
        let url = self.segment_url(&["api", "plugins", plugin, "release"])?;
        self.post_json::<()>(url, None).await
    }

    #[tracing::instrument(skip(self), fields(path = "/api/preset/load"))]
    async fn load_preset(&self, name: &str) -> Result<(), TransportError> {
        self.post_name("/api/preset/load", name).await
    }

    #[tracing::instrument(skip(self), fields(path = "/api/preset/save"))]
    async fn save_preset(&self, name: &str) -> Result<(), TransportError> {
        self.post_name("/api/preset/save", name).await
    }

    #[tracing::instrument(skip(self), fields(path = "/api/preset/save-as"))]
    async fn save_preset_as(&self, name: &str) -> Result<(), TransportError> {
        self.post_name("/api/preset/save-as", name).await
    }

    #[tracing::instrument(skip(self), fields(path = "/api/preset/delete"))]
    async fn delete_preset(&self, name: &str) -> Result<(), TransportError> {
        self.post_name("/api/preset/delete", name).await
    }

    #[tracing::instrument(skip(self, plugins), fields(path = "/api/chains/{chain}/set"))]
    async fn set_chain(&self, chain: &str, plugins: &[String]) -> Result<(), TransportError> {
        let url = self.segment_url(&["api", "chains", chain, "set"])?;
        let body = ChainSetRequest {
            plugins: plugins.to_vec(),
        };
        self.post_json(url, Some(&body)).await
    }
}
