//! Narration endpoints

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::State,
    http::{StatusCode, header},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::{Deserialize, Serialize};

use super::ApiState;
use crate::Error;
use crate::narration::{NarrationState, ProductionRequest};
use crate::providers::ProviderKind;
use crate::text::PronunciationRule;
use crate::voice::{ModelTier, PREBUILT_VOICES, VoiceSelection};

/// Build narration router
pub fn router(state: Arc<ApiState>) -> Router {
    Router::new()
        .route("/capabilities", get(capabilities))
        .route("/status", get(status))
        .route("/narrate", post(narrate))
        .route("/abort", post(abort))
        .with_state(state)
}

#[derive(Debug, Serialize)]
pub struct ProviderCapability {
    pub kind: ProviderKind,
    pub configured: bool,
    /// Clone services need an external voice id
    pub external_voices: bool,
}

#[derive(Debug, Serialize)]
pub struct Capabilities {
    pub providers: Vec<ProviderCapability>,
    pub voices: &'static [&'static str],
    pub tiers: [ModelTier; 2],
}

async fn capabilities(State(state): State<Arc<ApiState>>) -> Json<Capabilities> {
    let providers = ProviderKind::ALL
        .into_iter()
        .map(|kind| ProviderCapability {
            kind,
            configured: state.configured.contains(&kind),
            external_voices: kind.is_clone_service(),
        })
        .collect();

    Json(Capabilities {
        providers,
        voices: PREBUILT_VOICES,
        tiers: [ModelTier::Flash, ModelTier::Pro],
    })
}

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    #[serde(flatten)]
    pub state: NarrationState,
    pub status: String,
}

async fn status(State(state): State<Arc<ApiState>>) -> Json<StatusResponse> {
    let current = state.orchestrator.state();
    Json(StatusResponse {
        status: current.status_text(),
        state: current,
    })
}

async fn abort(State(state): State<Arc<ApiState>>) -> StatusCode {
    state.orchestrator.abort();
    StatusCode::ACCEPTED
}

/// Narration request
#[derive(Debug, Deserialize)]
pub struct NarrateRequest {
    pub text: String,
    #[serde(default)]
    pub provider: ProviderKind,
    #[serde(default)]
    pub voice: VoiceSelection,
    #[serde(default)]
    pub tier: ModelTier,
    pub language: Option<String>,
    #[serde(default)]
    pub rules: Vec<PronunciationRule>,
}

/// Render a script and return the master artifact
async fn narrate(
    State(state): State<Arc<ApiState>>,
    Json(request): Json<NarrateRequest>,
) -> Result<Response, NarrateError> {
    if request.text.trim().is_empty() {
        return Err(NarrateError::Narration(Error::EmptyScript));
    }
    if state.orchestrator.is_busy() {
        return Err(NarrateError::Narration(Error::Busy));
    }
    if !state.configured.contains(&request.provider) {
        return Err(NarrateError::NotConfigured(request.provider));
    }

    let provider = (state.providers)(request.provider, request.tier).map_err(|e| {
        tracing::warn!(provider = %request.provider, error = %e, "provider unavailable");
        NarrateError::NotConfigured(request.provider)
    })?;

    let artifact = state
        .orchestrator
        .produce(
            provider.as_ref(),
            ProductionRequest {
                script: request.text,
                rules: request.rules,
                voice: request.voice,
                language: request.language,
            },
        )
        .await
        .map_err(NarrateError::Narration)?;

    let disposition = format!("attachment; filename=\"{}\"", artifact.file_name("narration"));
    Ok((
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, artifact.mime_type().to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        artifact.bytes.clone(),
    )
        .into_response())
}

/// Narration API errors
#[derive(Debug)]
pub enum NarrateError {
    NotConfigured(ProviderKind),
    Narration(Error),
}

impl IntoResponse for NarrateError {
    fn into_response(self) -> Response {
        #[derive(Serialize)]
        struct ErrorResponse {
            error: ErrorBody,
        }

        #[derive(Serialize)]
        struct ErrorBody {
            code: &'static str,
            message: String,
            #[serde(skip_serializing_if = "Option::is_none")]
            chunk: Option<usize>,
        }

        let (status, code, message, chunk) = match self {
            Self::NotConfigured(kind) => (
                StatusCode::SERVICE_UNAVAILABLE,
                "not_configured",
                format!("{kind} is not configured"),
                None,
            ),
            Self::Narration(e) => {
                let (status, code) = match &e {
                    Error::EmptyScript => (StatusCode::BAD_REQUEST, "empty_script"),
                    Error::Config(_) => (StatusCode::BAD_REQUEST, "bad_request"),
                    Error::Busy => (StatusCode::CONFLICT, "busy"),
                    Error::Aborted => (StatusCode::CONFLICT, "aborted"),
                    Error::ChunkSynthesis { .. } => (StatusCode::BAD_GATEWAY, "chunk_failed"),
                    _ => (StatusCode::INTERNAL_SERVER_ERROR, "internal"),
                };
                if status.is_server_error() {
                    tracing::error!(error = %e, "narration request failed");
                }
                (status, code, e.to_string(), e.chunk_index())
            }
        };

        (
            status,
            Json(ErrorResponse {
                error: ErrorBody {
                    code,
                    message,
                    chunk,
                },
            }),
        )
            .into_response()
    }
}
