use axum::{
    body::{Body, Bytes},
    extract::State,
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
};
use futures::StreamExt;
use tracing::{error, info, info_span, Instrument};
use uuid::Uuid;

use super::identity::client_identity;
use super::request::PoemRequest;
use super::response::{
    insert_header, insert_quota_headers, ApiError, MSG_MALFORMED_BODY, X_FALLBACK_REASON,
    X_FALLBACK_USED, X_MODEL_USED,
};
use super::AppState;
use crate::prompt::build_prompt;

pub(super) async fn health() -> impl IntoResponse {
    (StatusCode::OK, "ok")
}

/// `POST /api/generate-poem`
///
/// Order: rate limit, parse and validate, prompt, candidate plan, fallback generation.
/// The body is parsed after the limiter so malformed requests still count.
pub(super) async fn generate_poem(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let request_id = Uuid::new_v4();
    let identity = client_identity(&headers);
    let span = info_span!("generate_poem", %request_id, client = identity.as_str());

    async move {
        match run(&state, &identity, &body).await {
            Ok(response) => response,
            Err(e) => e.into_response(),
        }
    }
    .instrument(span)
    .await
}

async fn run(state: &AppState, identity: &str, body: &[u8]) -> Result<Response, ApiError> {
    let decision = state.limiter.check(identity, &state.rate_limits).await;
    if !decision.allowed {
        let language = PoemRequest::peek_language(body)
            .unwrap_or_else(|| state.default_language.clone());
        return Err(ApiError::RateLimited { decision, language });
    }

    let request: PoemRequest = serde_json::from_slice(body).map_err(|e| {
        info!(error = %e, "rejecting malformed request body");
        ApiError::BadRequest(MSG_MALFORMED_BODY.to_string())
    })?;
    let brief = request.into_brief(&state.default_language)?;
    let prompt = build_prompt(&brief);

    let plan = state.selector.plan(&state.primary_model);
    let cancel = state.shutdown.child_token();
    let generation = state
        .orchestrator
        .generate(&plan, &prompt, &cancel)
        .await
        .map_err(|e| {
            if !matches!(e, crate::Error::Cancelled) {
                error!(error = %e, "poem generation failed");
            }
            ApiError::from(e)
        })?;

    info!(
        model = generation.model_used.as_str(),
        fallback_count = generation.fallback_count,
        language = brief.language.as_str(),
        classic = brief.is_classic,
        "streaming poem"
    );

    let fallback_used = generation.fallback_used();
    let model_used = generation.model_used.clone();
    let fallback_reason = generation.fallback_reason.clone();

    let chunks = generation.stream.map(|item| {
        item.map(Bytes::from).map_err(|e| {
            error!(error = %e, "upstream failed after streaming started");
            e
        })
    });

    let mut response = Response::new(Body::from_stream(chunks));
    let h = response.headers_mut();
    h.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("text/plain; charset=utf-8"),
    );
    insert_header(h, X_MODEL_USED, &model_used);
    insert_header(h, X_FALLBACK_USED, if fallback_used { "true" } else { "false" });
    if let Some(reason) = &fallback_reason {
        insert_header(h, X_FALLBACK_REASON, reason);
    }
    insert_quota_headers(h, &decision);
    Ok(response)
}
