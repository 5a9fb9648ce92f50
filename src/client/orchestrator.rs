//! 顺序回退编排器。
//!
//! Candidate-by-candidate streaming with first-chunk validation.

use futures::{stream, StreamExt};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::error_classification::{classify_error, FailureKind};
use super::types::{Generation, GenerationOutcome, GenerationRequest, DEFAULT_TEMPERATURE};
use crate::drivers::{ProviderClient, TextStream};
use crate::routing::{CandidatePlan, ModelCandidate, ModelTier};
use crate::{Error, ErrorContext, Result};

/// Walks a [`CandidatePlan`] and returns the first candidate that produces output.
///
/// Candidates are tried strictly one after another; there are no speculative parallel calls.
pub struct FallbackOrchestrator {
    aggregator: Arc<dyn ProviderClient>,
    backup: Option<Arc<dyn ProviderClient>>,
    temperature: f64,
}

impl FallbackOrchestrator {
    pub fn new(aggregator: Arc<dyn ProviderClient>) -> Self {
        Self {
            aggregator,
            backup: None,
            temperature: DEFAULT_TEMPERATURE,
        }
    }

    /// Client used for [`ModelTier::DirectBackup`] candidates.
    pub fn with_backup(mut self, backup: Arc<dyn ProviderClient>) -> Self {
        self.backup = Some(backup);
        self
    }

    pub fn with_temperature(mut self, temperature: f64) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn has_backup(&self) -> bool {
        self.backup.is_some()
    }

    /// Run the plan.
    ///
    /// - retryable failures advance to the next candidate (only when the plan allows fallback)
    /// - fatal failures and cancellation return immediately
    /// - the backup candidate, if any, gets exactly one attempt after the primary pool
    /// - when every attempt failed retryably the result is [`Error::Exhausted`] wrapping
    ///   the last attempt's error
    pub async fn generate(
        &self,
        plan: &CandidatePlan,
        prompt: &str,
        cancel: &CancellationToken,
    ) -> Result<Generation> {
        let mut failed: usize = 0;
        let mut last_err: Option<Error> = None;

        for candidate in &plan.candidates {
            match self.attempt(candidate, prompt, failed, cancel).await {
                GenerationOutcome::Success {
                    stream,
                    model_used,
                    fallback_count,
                } => {
                    let fallback_reason = (fallback_count > 0)
                        .then(|| format!("{} model(s) were busy", fallback_count));
                    return Ok(Generation {
                        stream: relay(stream, cancel),
                        model_used,
                        fallback_count,
                        fallback_reason,
                    });
                }
                GenerationOutcome::Failure { kind, error } => {
                    if kind == FailureKind::Cancelled {
                        return Err(Error::Cancelled);
                    }
                    if !kind.is_retryable() || !plan.fallback_enabled {
                        error!(
                            model = candidate.id.as_str(),
                            failure = kind.as_str(),
                            fallback_depth = failed,
                            error = %error,
                            "candidate failed, giving up"
                        );
                        return Err(error);
                    }
                    failed += 1;
                    last_err = Some(error);
                }
            }
        }

        if let Some(backup) = &plan.backup {
            info!(
                model = backup.id.as_str(),
                fallback_depth = failed,
                "all primary candidates exhausted, trying backup provider"
            );
            return match self.attempt(backup, prompt, failed, cancel).await {
                GenerationOutcome::Success {
                    stream,
                    model_used,
                    fallback_count,
                } => Ok(Generation {
                    stream: relay(stream, cancel),
                    model_used,
                    fallback_count,
                    fallback_reason: Some(
                        "All free models were busy, used backup".to_string(),
                    ),
                }),
                GenerationOutcome::Failure { kind, error } => match kind {
                    FailureKind::Cancelled => Err(Error::Cancelled),
                    k if k.is_retryable() => Err(Error::Exhausted {
                        attempts: failed + 1,
                        last: Some(Box::new(error)),
                    }),
                    _ => Err(error),
                },
            };
        }

        Err(Error::Exhausted {
            attempts: failed,
            last: last_err.map(Box::new),
        })
    }

    /// One attempt: open the stream and wait for the first text chunk.
    async fn attempt(
        &self,
        candidate: &ModelCandidate,
        prompt: &str,
        fallback_depth: usize,
        cancel: &CancellationToken,
    ) -> GenerationOutcome {
        let client = match self.client_for(candidate) {
            Ok(c) => c,
            Err(error) => {
                return GenerationOutcome::Failure {
                    kind: FailureKind::Fatal,
                    error,
                }
            }
        };

        let request = GenerationRequest::new(prompt, candidate.clone())
            .temperature(self.temperature)
            .max_retries(0);

        info!(
            model = candidate.id.as_str(),
            tier = %candidate.tier,
            position = candidate.position,
            provider = client.name(),
            fallback_depth,
            "trying candidate"
        );

        let opened = tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(Error::Cancelled),
            r = client.stream_text(&request) => r,
        };
        let mut upstream = match opened {
            Ok(s) => s,
            Err(e) => return Self::failure(candidate, e),
        };

        let first = tokio::select! {
            biased;
            _ = cancel.cancelled() => Some(Err(Error::Cancelled)),
            item = upstream.next() => item,
        };

        match first {
            Some(Ok(chunk)) => {
                info!(
                    model = candidate.id.as_str(),
                    fallback_depth,
                    "candidate is serving"
                );
                let merged: TextStream = Box::pin(stream::once(async move { Ok(chunk) }).chain(upstream));
                GenerationOutcome::Success {
                    stream: merged,
                    model_used: candidate.display_name().to_string(),
                    fallback_count: fallback_depth,
                }
            }
            Some(Err(e)) => Self::failure(candidate, e),
            None => Self::failure(
                candidate,
                Error::EmptyResponse {
                    model: candidate.id.clone(),
                },
            ),
        }
    }

    fn client_for(&self, candidate: &ModelCandidate) -> Result<&Arc<dyn ProviderClient>> {
        match candidate.tier {
            ModelTier::DirectBackup => self.backup.as_ref().ok_or_else(|| {
                Error::configuration_with_context(
                    "backup candidate planned but no backup provider configured",
                    ErrorContext::new()
                        .with_field_path("GEMINI_API_KEY")
                        .with_source("fallback_orchestrator"),
                )
            }),
            ModelTier::Free | ModelTier::Paid => Ok(&self.aggregator),
        }
    }

    fn failure(candidate: &ModelCandidate, error: Error) -> GenerationOutcome {
        let kind = classify_error(&error);
        match kind {
            FailureKind::Cancelled => {
                debug!(model = candidate.id.as_str(), "attempt cancelled by caller");
            }
            k if k.is_retryable() => {
                warn!(
                    model = candidate.id.as_str(),
                    failure = k.as_str(),
                    error = %error,
                    "candidate unavailable"
                );
            }
            _ => {}
        }
        GenerationOutcome::Failure { kind, error }
    }
}

/// Stop relaying once the caller cancels; dropping the upstream releases its connection.
fn relay(stream: TextStream, cancel: &CancellationToken) -> TextStream {
    let token = cancel.clone();
    Box::pin(stream.take_until(async move { token.cancelled().await }))
}
