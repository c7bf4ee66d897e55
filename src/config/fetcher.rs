use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

use super::RemoteConfig;
use crate::settings::WidgetSettings;

const ENABLE_LOGS: bool = true;

use crate::widget_debug;

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("config request failed: {0}")]
    Network(String),
    #[error("config endpoint returned HTTP {0}")]
    Status(u16),
    #[error("config body is not a JSON object")]
    Malformed,
    #[error("config request timed out after {0:?}")]
    Timeout(Duration),
}

impl FetchError {
    /// True when no response arrived at all. A status or body error means
    /// the endpoint answered.
    pub fn is_unanswered(&self) -> bool {
        matches!(self, FetchError::Network(_) | FetchError::Timeout(_))
    }
}

/// Where display configuration comes from. No retries happen here; the
/// coordinator decides whether a whole attempt is repeated.
#[async_trait]
pub trait ConfigSource: Send + Sync {
    async fn fetch_config(&self, company_id: &str) -> Result<RemoteConfig, FetchError>;
}

/// Fetches `GET {api_origin}/api/widget-config?company_id=<id>` over HTTP.
pub struct HttpConfigFetcher {
    client: reqwest::Client,
    settings: WidgetSettings,
}

impl HttpConfigFetcher {
    pub fn new(settings: WidgetSettings) -> Self {
        Self {
            client: reqwest::Client::new(),
            settings,
        }
    }

    /// Uses an existing client, e.g. one carrying an `Origin` default header.
    pub fn with_client(client: reqwest::Client, settings: WidgetSettings) -> Self {
        Self { client, settings }
    }
}

#[async_trait]
impl ConfigSource for HttpConfigFetcher {
    async fn fetch_config(&self, company_id: &str) -> Result<RemoteConfig, FetchError> {
        let url = self.settings.config_url(company_id);
        let timeout = self.settings.fetch_timeout();
        widget_debug!("fetching widget config from {}", url);

        let request = async {
            let response = self
                .client
                .get(&url)
                .send()
                .await
                .map_err(|e| FetchError::Network(e.to_string()))?;

            let status = response.status();
            if !status.is_success() {
                return Err(FetchError::Status(status.as_u16()));
            }

            let body = response
                .text()
                .await
                .map_err(|e| FetchError::Network(e.to_string()))?;
            let value: Value = serde_json::from_str(&body).map_err(|_| FetchError::Malformed)?;
            RemoteConfig::from_json(&value).ok_or(FetchError::Malformed)
        };

        tokio::time::timeout(timeout, request)
            .await
            .map_err(|_| FetchError::Timeout(timeout))?
    }
}
