//! Error responses, limit messages and response headers.

use axum::{
    http::{header, HeaderMap, HeaderName, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use once_cell::sync::Lazy;
use serde_json::json;
use std::collections::HashMap;
use tracing::debug;

use crate::resilience::{Granularity, RateLimitDecision};
use crate::Error;

pub const MSG_MALFORMED_BODY: &str = "Ongeldige aanvraag";
pub const MSG_ALL_MODELS_BUSY: &str =
    "Alle gratis modellen zijn momenteel druk. Probeer het over een paar seconden opnieuw.";
pub const MSG_GENERIC_FAILURE: &str =
    "Er is een fout opgetreden bij het genereren van het gedicht";

/// Non-standard status for requests the client abandoned.
pub const CLIENT_CLOSED_REQUEST: u16 = 499;

pub const X_MODEL_USED: &str = "x-model-used";
pub const X_FALLBACK_USED: &str = "x-fallback-used";
pub const X_FALLBACK_REASON: &str = "x-fallback-reason";

/// Wait messages per language, indexed minute, hour, day.
/// `{n}` is seconds for the minute message and minutes for the hour message.
static LIMIT_MESSAGES: Lazy<HashMap<&'static str, [&'static str; 3]>> = Lazy::new(|| {
    HashMap::from([
        (
            "nl",
            [
                "Je hebt te veel gedichten gegenereerd. Probeer het over {n} seconden opnieuw.",
                "Je hebt het uurlimiet bereikt. Probeer het over {n} minuten opnieuw.",
                "Je hebt het daglimiet bereikt. Probeer het morgen opnieuw.",
            ],
        ),
        (
            "en",
            [
                "Too many requests. Please try again in {n} seconds.",
                "Hourly limit reached. Please try again in {n} minutes.",
                "Daily limit reached. Please try again tomorrow.",
            ],
        ),
    ])
});

/// User-facing message for a denied request. Unknown languages fall back to Dutch.
pub fn rate_limit_message(decision: &RateLimitDecision, language: &str) -> String {
    let messages = LIMIT_MESSAGES
        .get(language.trim().to_ascii_lowercase().as_str())
        .or_else(|| LIMIT_MESSAGES.get("nl"))
        .copied()
        .unwrap_or_default();

    let window = decision.exhausted_window().unwrap_or(Granularity::Minute);
    let (template, n) = match window {
        Granularity::Minute => (messages[0], decision.reset_in.minute),
        Granularity::Hour => (messages[1], decision.reset_in.hour.div_ceil(60)),
        Granularity::Day => (messages[2], 0),
    };
    template.replace("{n}", &n.to_string())
}

/// Append `X-RateLimit-Remaining-*` and `X-RateLimit-Reset-*`.
pub fn insert_quota_headers(headers: &mut HeaderMap, decision: &RateLimitDecision) {
    for g in Granularity::ALL {
        let suffix = match g {
            Granularity::Minute => "minute",
            Granularity::Hour => "hour",
            Granularity::Day => "day",
        };
        insert_header(
            headers,
            &format!("x-ratelimit-remaining-{}", suffix),
            &decision.remaining.get(g).to_string(),
        );
        insert_header(
            headers,
            &format!("x-ratelimit-reset-{}", suffix),
            &decision.reset_in.get(g).to_string(),
        );
    }
}

/// Insert a header, skipping values that are not valid header text.
pub fn insert_header(headers: &mut HeaderMap, name: &str, value: &str) {
    if let (Ok(name), Ok(value)) = (
        HeaderName::from_bytes(name.as_bytes()),
        HeaderValue::from_str(value),
    ) {
        headers.insert(name, value);
    }
}

/// Everything the poem endpoint can answer besides a stream.
#[derive(Debug)]
pub enum ApiError {
    /// 400 with a user-facing message.
    BadRequest(String),
    /// 429 from the limiter, with quota headers and `Retry-After`.
    RateLimited {
        decision: RateLimitDecision,
        language: String,
    },
    /// 429 because every model was busy.
    Busy,
    /// Caller went away; empty body.
    Cancelled,
    /// 500 with the underlying message.
    Internal(String),
}

impl From<Error> for ApiError {
    fn from(e: Error) -> Self {
        match e {
            Error::Validation { message, .. } => ApiError::BadRequest(message),
            Error::Cancelled => ApiError::Cancelled,
            Error::Exhausted { .. } => ApiError::Busy,
            Error::Remote { message, .. } if !message.trim().is_empty() => {
                ApiError::Internal(message)
            }
            other => ApiError::Internal(other.to_string()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::BadRequest(message) => error_body(StatusCode::BAD_REQUEST, &message),
            ApiError::RateLimited { decision, language } => {
                let message = rate_limit_message(&decision, &language);
                let mut response = error_body(StatusCode::TOO_MANY_REQUESTS, &message);
                let headers = response.headers_mut();
                insert_quota_headers(headers, &decision);
                headers.insert(
                    header::RETRY_AFTER,
                    HeaderValue::from(decision.retry_after_secs()),
                );
                response
            }
            ApiError::Busy => error_body(StatusCode::TOO_MANY_REQUESTS, MSG_ALL_MODELS_BUSY),
            ApiError::Cancelled => {
                debug!("generation cancelled before a response was produced");
                StatusCode::from_u16(CLIENT_CLOSED_REQUEST)
                    .unwrap_or(StatusCode::BAD_REQUEST)
                    .into_response()
            }
            ApiError::Internal(message) => {
                let message = if message.trim().is_empty() {
                    MSG_GENERIC_FAILURE.to_string()
                } else {
                    message
                };
                error_body(StatusCode::INTERNAL_SERVER_ERROR, &message)
            }
        }
    }
}

fn error_body(status: StatusCode, message: &str) -> Response {
    (status, Json(json!({ "error": message }))).into_response()
}
