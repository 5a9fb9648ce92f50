//! Environment configuration.
//!
//! Every knob has a default except `OPENROUTER_API_KEY`. Numeric values that fail to
//! parse fall back to their default instead of aborting startup.

use crate::client::types::DEFAULT_TEMPERATURE;
use crate::drivers::{gemini, openai_compat};
use crate::resilience::RateLimitConfig;
use crate::routing::resolve_model_id;
use crate::transport::http::TransportOptions;
use crate::{Error, ErrorContext, Result};
use std::time::Duration;

pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0:3000";
pub const DEFAULT_POEM_LANGUAGE: &str = "nl";
pub const DEFAULT_APP_TITLE: &str = "Sinterklaas Gedichten Generator";
pub const DEFAULT_SITE_URL: &str = "http://localhost:3000";

/// Where rate-limit counters live.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CounterStoreConfig {
    Redis { url: String },
    KvRest { url: String, token: String },
    /// No store: the limiter admits everything.
    Disabled,
}

#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub openrouter_api_key: String,
    pub openrouter_base_url: String,
    /// Sent as `HTTP-Referer` to the aggregator.
    pub site_url: String,
    /// Sent as `X-Title` to the aggregator.
    pub app_title: String,
    pub gemini_api_key: Option<String>,
    pub gemini_base_url: String,
    /// Resolved upstream identifier of the primary model.
    pub primary_model: String,
    pub default_poem_language: String,
    pub temperature: f64,
    pub http_timeout: Duration,
    pub proxy_url: Option<String>,
    pub rate_limits: RateLimitConfig,
    pub counter_store: CounterStoreConfig,
    pub bind_addr: String,
}

impl GatewayConfig {
    /// Read configuration from the process environment.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read configuration from an arbitrary key lookup. Blank values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let openrouter_api_key = get("OPENROUTER_API_KEY").ok_or_else(|| {
            Error::configuration_with_context(
                "OPENROUTER_API_KEY is not set",
                ErrorContext::new()
                    .with_field_path("OPENROUTER_API_KEY")
                    .with_details("an OpenRouter API key is required to reach any model")
                    .with_source("gateway_config"),
            )
        })?;

        let temperature = get("AI_TEMPERATURE")
            .and_then(|s| s.parse::<f64>().ok())
            .filter(|t| t.is_finite() && (0.0..=2.0).contains(t))
            .unwrap_or(DEFAULT_TEMPERATURE);

        let timeout_secs = get("AI_HTTP_TIMEOUT_SECS")
            .and_then(|s| s.parse::<u64>().ok())
            .filter(|s| *s > 0)
            .unwrap_or(30);

        let defaults = RateLimitConfig::default();
        let limit = |key: &str, default: u64| {
            get(key)
                .and_then(|s| s.parse::<u64>().ok())
                .unwrap_or(default)
        };
        let rate_limits = RateLimitConfig::new()
            .with_per_minute(limit("RATE_LIMIT_PER_MINUTE", defaults.per_minute))
            .with_per_hour(limit("RATE_LIMIT_PER_HOUR", defaults.per_hour))
            .with_per_day(limit("RATE_LIMIT_PER_DAY", defaults.per_day));

        let counter_store = match (
            get("REDIS_URL"),
            get("KV_REST_API_URL"),
            get("KV_REST_API_TOKEN"),
        ) {
            (Some(url), _, _) => CounterStoreConfig::Redis { url },
            (None, Some(url), Some(token)) => CounterStoreConfig::KvRest { url, token },
            _ => CounterStoreConfig::Disabled,
        };

        Ok(Self {
            openrouter_api_key,
            openrouter_base_url: get("OPENROUTER_BASE_URL")
                .unwrap_or_else(|| openai_compat::DEFAULT_BASE_URL.to_string()),
            site_url: get("SITE_URL").unwrap_or_else(|| DEFAULT_SITE_URL.to_string()),
            app_title: get("APP_TITLE").unwrap_or_else(|| DEFAULT_APP_TITLE.to_string()),
            gemini_api_key: get("GEMINI_API_KEY"),
            gemini_base_url: get("GEMINI_BASE_URL")
                .unwrap_or_else(|| gemini::DEFAULT_BASE_URL.to_string()),
            primary_model: resolve_model_id(get("AI_MODEL").as_deref()).to_string(),
            default_poem_language: get("POEM_LANGUAGE")
                .unwrap_or_else(|| DEFAULT_POEM_LANGUAGE.to_string()),
            temperature,
            http_timeout: Duration::from_secs(timeout_secs),
            proxy_url: get("AI_PROXY_URL"),
            rate_limits,
            counter_store,
            bind_addr: get("BIND_ADDR").unwrap_or_else(|| DEFAULT_BIND_ADDR.to_string()),
        })
    }

    pub fn transport_options(&self) -> TransportOptions {
        TransportOptions {
            timeout: self.http_timeout,
            proxy_url: self.proxy_url.clone(),
            ..TransportOptions::default()
        }
    }

    pub fn has_backup(&self) -> bool {
        self.gemini_api_key.is_some()
    }
}
