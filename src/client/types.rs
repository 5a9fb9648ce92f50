use crate::client::error_classification::FailureKind;
use crate::drivers::TextStream;
use crate::routing::ModelCandidate;
use crate::Error;

/// Default sampling temperature for poem generation.
pub const DEFAULT_TEMPERATURE: f64 = 0.8;

/// One streaming call against one candidate.
#[derive(Debug, Clone)]
pub struct GenerationRequest {
    pub prompt: String,
    pub candidate: ModelCandidate,
    pub temperature: f64,
    /// Connection-level retries the provider client may perform on its own.
    /// The orchestrator always sends 0.
    pub max_retries: u32,
}

impl GenerationRequest {
    pub fn new(prompt: impl Into<String>, candidate: ModelCandidate) -> Self {
        Self {
            prompt: prompt.into(),
            candidate,
            temperature: DEFAULT_TEMPERATURE,
            max_retries: 0,
        }
    }

    pub fn temperature(mut self, temperature: f64) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn max_retries(mut self, retries: u32) -> Self {
        self.max_retries = retries;
        self
    }
}

/// Result of a single candidate attempt.
pub enum GenerationOutcome {
    Success {
        stream: TextStream,
        model_used: String,
        fallback_count: usize,
    },
    Failure { kind: FailureKind, error: Error },
}

impl GenerationOutcome {
    pub fn is_retryable(&self) -> bool {
        match self {
            GenerationOutcome::Success { .. } => false,
            GenerationOutcome::Failure { kind, .. } => kind.is_retryable(),
        }
    }
}

impl std::fmt::Debug for GenerationOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GenerationOutcome::Success {
                model_used,
                fallback_count,
                ..
            } => f
                .debug_struct("Success")
                .field("model_used", model_used)
                .field("fallback_count", fallback_count)
                .finish_non_exhaustive(),
            GenerationOutcome::Failure { kind, error } => f
                .debug_struct("Failure")
                .field("kind", kind)
                .field("error", error)
                .finish(),
        }
    }
}

/// A committed generation: the stream of the candidate that served the request.
pub struct Generation {
    /// Text deltas, starting with the chunk that validated the candidate.
    pub stream: TextStream,
    /// Name reported in `X-Model-Used`.
    pub model_used: String,
    /// Candidates that failed before this one.
    pub fallback_count: usize,
    pub fallback_reason: Option<String>,
}

impl Generation {
    pub fn fallback_used(&self) -> bool {
        self.fallback_count > 0
    }

    /// Drain the stream into a single string.
    pub async fn collect_text(self) -> crate::Result<String> {
        use futures::TryStreamExt;
        self.stream.try_collect::<Vec<String>>().await.map(|v| v.concat())
    }
}

impl std::fmt::Debug for Generation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Generation")
            .field("model_used", &self.model_used)
            .field("fallback_count", &self.fallback_count)
            .field("fallback_reason", &self.fallback_reason)
            .finish_non_exhaustive()
    }
}
