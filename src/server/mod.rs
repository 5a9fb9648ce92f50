//! HTTP 服务层 (axum)。
//!
//! Routes:
//! - `POST /api/generate-poem`: rate limit, validate, build prompt, stream the poem
//! - `GET /health`: liveness
//!
//! [`AppState`] is cheap to clone and shared by every request. The only shared mutable
//! resource behind it is the counter store used by the rate limiter.

mod handlers;
pub mod identity;
pub mod request;
pub mod response;

use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::config::{CounterStoreConfig, GatewayConfig, DEFAULT_POEM_LANGUAGE};
use crate::drivers::{GeminiClient, OpenAiCompatClient};
use crate::resilience::{
    KvRestCounterStore, RateLimitConfig, RateLimiter, RedisCounterStore,
};
use crate::routing::{resolve_model_id, ProviderSelector, DIRECT_BACKUP_MODEL};
use crate::{FallbackOrchestrator, Result};

pub use identity::client_identity;
pub use request::PoemRequest;
pub use response::ApiError;

/// Per-call timeout of the KV REST counter store.
const KV_REST_TIMEOUT: Duration = Duration::from_secs(5);

/// Shared state injected into every handler.
#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<FallbackOrchestrator>,
    pub selector: Arc<ProviderSelector>,
    pub limiter: Arc<RateLimiter>,
    pub rate_limits: RateLimitConfig,
    /// Resolved upstream identifier of the primary model.
    pub primary_model: String,
    pub default_language: String,
    /// Root token; each request runs under a child. Cancelled on shutdown.
    pub shutdown: CancellationToken,
}

impl AppState {
    pub fn new(
        orchestrator: FallbackOrchestrator,
        selector: ProviderSelector,
        limiter: RateLimiter,
    ) -> Self {
        Self {
            orchestrator: Arc::new(orchestrator),
            selector: Arc::new(selector),
            limiter: Arc::new(limiter),
            rate_limits: RateLimitConfig::default(),
            primary_model: resolve_model_id(None).to_string(),
            default_language: DEFAULT_POEM_LANGUAGE.to_string(),
            shutdown: CancellationToken::new(),
        }
    }

    pub fn with_rate_limits(mut self, limits: RateLimitConfig) -> Self {
        self.rate_limits = limits;
        self
    }

    pub fn with_primary_model(mut self, model_id: impl Into<String>) -> Self {
        self.primary_model = model_id.into();
        self
    }

    pub fn with_default_language(mut self, language: impl Into<String>) -> Self {
        self.default_language = language.into();
        self
    }

    /// Wire drivers, the counter store and the selector from configuration.
    ///
    /// A counter store that cannot be reached at startup disables rate limiting
    /// instead of failing the boot.
    pub async fn from_config(config: &GatewayConfig) -> Result<Self> {
        let options = config.transport_options();

        let aggregator = OpenAiCompatClient::new(
            &config.openrouter_base_url,
            config.openrouter_api_key.clone(),
            &options,
        )?
        .with_header("HTTP-Referer", config.site_url.clone())
        .with_header("X-Title", config.app_title.clone());

        let mut orchestrator =
            FallbackOrchestrator::new(Arc::new(aggregator)).with_temperature(config.temperature);
        let mut selector = ProviderSelector::default();

        if let Some(key) = &config.gemini_api_key {
            let gemini = GeminiClient::new(&config.gemini_base_url, key.clone(), &options)?;
            orchestrator = orchestrator.with_backup(Arc::new(gemini));
            selector = selector.with_backup(DIRECT_BACKUP_MODEL);
        }

        let limiter = match &config.counter_store {
            CounterStoreConfig::Redis { url } => match RedisCounterStore::connect(url).await {
                Ok(store) => RateLimiter::new(Arc::new(store)),
                Err(e) => {
                    warn!(error = %e, "redis unavailable at startup, rate limiting disabled");
                    RateLimiter::disabled()
                }
            },
            CounterStoreConfig::KvRest { url, token } => RateLimiter::new(Arc::new(
                KvRestCounterStore::new(url, token.clone(), KV_REST_TIMEOUT)?,
            )),
            CounterStoreConfig::Disabled => {
                warn!("no counter store configured, rate limiting disabled");
                RateLimiter::disabled()
            }
        };

        info!(
            primary_model = config.primary_model.as_str(),
            tier = %selector.classify(&config.primary_model),
            backup = selector.has_backup(),
            counter_store = limiter.store_name().unwrap_or("none"),
            "gateway configured"
        );

        Ok(Self::new(orchestrator, selector, limiter)
            .with_rate_limits(config.rate_limits.clone())
            .with_primary_model(config.primary_model.clone())
            .with_default_language(config.default_poem_language.clone()))
    }
}

/// Build the router with tracing.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/generate-poem", post(handlers::generate_poem))
        .route("/health", get(handlers::health))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Serve until Ctrl-C. In-flight generations are cancelled through the root token.
pub async fn serve(listener: TcpListener, state: AppState) -> Result<()> {
    let addr = listener.local_addr()?;
    info!(%addr, "verse-gateway listening");

    let shutdown = state.shutdown.clone();
    axum::serve(listener, router(state))
        .with_graceful_shutdown(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!(error = %e, "failed to listen for shutdown signal");
                std::future::pending::<()>().await;
            }
            info!("shutdown signal received");
            shutdown.cancel();
        })
        .await?;

    info!("server stopped");
    Ok(())
}
