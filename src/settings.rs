use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::{fs, path::Path, time::Duration};

use crate::config::EmbedMode;

pub const API_ORIGIN_ENV: &str = "CAREERCHAT_API_ORIGIN";
pub const MAX_ATTEMPTS_ENV: &str = "CAREERCHAT_MAX_ATTEMPTS";

/// What an attempt does when the configuration request gets no response.
/// An error status or an unreadable body always falls back to defaults.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum FetchFailurePolicy {
    /// Count the attempt as failed and retry with backoff.
    Retry,
    /// Create the control with default display values.
    UseDefaults,
}

/// Tunables for the widget runtime. Every field may be omitted from the
/// settings file.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct WidgetSettings {
    pub api_origin: String,
    pub config_path: String,
    pub chat_path: String,
    pub max_attempts: u32,
    /// Fallback attempts scheduled at boot, measured from start.
    pub fallback_delays_ms: Vec<u64>,
    pub backoff_step_ms: u64,
    pub backoff_ceiling_ms: u64,
    pub debounce_ms: u64,
    pub mobile_breakpoint_px: u32,
    /// Delay between the shutdown message and overlay removal.
    pub shutdown_grace_ms: u64,
    pub notify_frame_on_close: bool,
    pub fetch_timeout_ms: u64,
    /// Overrides the per-mode fetch failure policy when set.
    pub fetch_failure_policy: Option<FetchFailurePolicy>,
}

impl Default for WidgetSettings {
    fn default() -> Self {
        Self {
            api_origin: "https://jobs.ondework.com".into(),
            config_path: "/api/widget-config".into(),
            chat_path: "/chat".into(),
            max_attempts: 15,
            fallback_delays_ms: vec![1000, 3000, 5000],
            backoff_step_ms: 300,
            backoff_ceiling_ms: 2000,
            debounce_ms: 200,
            mobile_breakpoint_px: 480,
            shutdown_grace_ms: 150,
            notify_frame_on_close: true,
            fetch_timeout_ms: 10_000,
            fetch_failure_policy: None,
        }
    }
}

impl WidgetSettings {
    /// Reads settings from a JSON file. A missing file yields defaults.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read widget settings from {}", path.display()))?;
        serde_json::from_str(&contents)
            .with_context(|| format!("Invalid widget settings in {}", path.display()))
    }

    pub fn with_env_overrides(mut self) -> Result<Self> {
        if let Ok(origin) = std::env::var(API_ORIGIN_ENV) {
            self.api_origin = origin;
        }
        if let Ok(raw) = std::env::var(MAX_ATTEMPTS_ENV) {
            self.max_attempts = raw
                .parse()
                .with_context(|| format!("{MAX_ATTEMPTS_ENV} must be an integer, got {raw:?}"))?;
        }
        Ok(self)
    }

    fn origin(&self) -> &str {
        self.api_origin.trim_end_matches('/')
    }

    pub fn config_url(&self, company_id: &str) -> String {
        format!(
            "{}{}?company_id={}",
            self.origin(),
            self.config_path,
            urlencoding::encode(company_id)
        )
    }

    /// Chat surface URL; also the fallback target for a new browsing context.
    pub fn chat_url(&self, company_id: &str, referrer: &str) -> String {
        format!(
            "{}{}?company_id={}&referrer={}",
            self.origin(),
            self.chat_path,
            urlencoding::encode(company_id),
            urlencoding::encode(referrer)
        )
    }

    /// `min(attempts × step, ceiling)`.
    pub fn backoff_delay(&self, attempts: u32) -> Duration {
        let millis = (attempts as u64)
            .saturating_mul(self.backoff_step_ms)
            .min(self.backoff_ceiling_ms);
        Duration::from_millis(millis)
    }

    /// Script embeds insert a fresh control and retry until exhausted; an
    /// enhanced anchor is already visible, so it keeps its default styling.
    pub fn fetch_failure_policy(&self, mode: EmbedMode) -> FetchFailurePolicy {
        self.fetch_failure_policy.unwrap_or(match mode {
            EmbedMode::Script => FetchFailurePolicy::Retry,
            EmbedMode::Enhanced => FetchFailurePolicy::UseDefaults,
        })
    }

    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_millis(self.shutdown_grace_ms)
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_millis(self.fetch_timeout_ms)
    }
}
