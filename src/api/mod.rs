//! HTTP API server for the narrator

pub mod health;
pub mod narrate;

use std::sync::Arc;

use axum::Router;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::Result;
use crate::config::Config;
use crate::narration::NarrationOrchestrator;
use crate::providers::{ProviderKind, SpeechProvider, build_provider};
use crate::translation::GeminiTranslator;
use crate::voice::ModelTier;

/// Builds a provider adapter per request
pub type ProviderFactory =
    Arc<dyn Fn(ProviderKind, ModelTier) -> Result<Box<dyn SpeechProvider>> + Send + Sync>;

/// Shared state for API handlers
#[derive(Clone)]
pub struct ApiState {
    pub orchestrator: Arc<NarrationOrchestrator>,
    pub providers: ProviderFactory,
    /// Services with credentials available
    pub configured: Vec<ProviderKind>,
}

impl ApiState {
    /// State backed by real provider adapters
    #[must_use]
    pub fn from_config(config: Arc<Config>) -> Self {
        let mut orchestrator = NarrationOrchestrator::new(config.narration.clone());
        match GeminiTranslator::from_config(&config) {
            Ok(translator) => orchestrator = orchestrator.with_translator(Arc::new(translator)),
            Err(e) => tracing::warn!(error = %e, "translation disabled"),
        }

        let configured = ProviderKind::ALL
            .into_iter()
            .filter(|k| k.is_configured(&config))
            .collect();

        Self {
            orchestrator: Arc::new(orchestrator),
            providers: Arc::new(move |kind, tier| build_provider(kind, &config, tier)),
            configured,
        }
    }
}

/// API server
pub struct ApiServer {
    state: Arc<ApiState>,
    port: u16,
}

impl ApiServer {
    #[must_use]
    pub fn new(state: ApiState, port: u16) -> Self {
        Self {
            state: Arc::new(state),
            port,
        }
    }

    /// Full router with CORS and request tracing
    #[must_use]
    pub fn router(&self) -> Router {
        let cors = CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any);

        Router::new()
            .merge(health::router())
            .merge(narrate::router(Arc::clone(&self.state)))
            .layer(cors)
            .layer(TraceLayer::new_for_http())
    }

    /// Run the API server
    ///
    /// # Errors
    ///
    /// Returns error if server fails to bind or run
    pub async fn run(self) -> Result<()> {
        let addr = format!("0.0.0.0:{}", self.port);
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|e| crate::Error::Config(format!("failed to bind API server: {e}")))?;

        tracing::info!(port = self.port, providers = ?self.state.configured, "API server listening");

        axum::serve(listener, self.router())
            .await
            .map_err(|e| crate::Error::Config(format!("API server error: {e}")))?;

        Ok(())
    }
}
