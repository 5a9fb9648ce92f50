//! Model catalog and candidate selection.
//!
//! This module is intentionally **pure logic**: it doesn't perform network calls. It maps
//! the configured model key to an upstream identifier, classifies identifiers into tiers,
//! and produces the ordered [`CandidatePlan`] the orchestrator walks through.
//!
//! Tier classification is a static total function: an identifier is [`ModelTier::Free`]
//! exactly when it appears in [`FREE_MODEL_FALLBACKS`], every other identifier is
//! [`ModelTier::Paid`].

use serde::{Deserialize, Serialize};
use std::fmt;

/// Model key used when the configured key is missing or unknown.
pub const DEFAULT_MODEL_KEY: &str = "gemini-2.0-flash-free";

/// Known model keys and the upstream identifiers they map to (via the aggregator).
pub const MODEL_CATALOG: &[(&str, &str)] = &[
    // Free tier
    ("gemini-2.0-flash-free", "google/gemini-2.0-flash-exp:free"),
    ("gemini-flash-free", "google/gemini-flash-1.5-8b-exp"),
    ("llama-3.1-8b", "meta-llama/llama-3.1-8b-instruct:free"),
    // Paid, affordable
    ("gemini-2.0-flash", "google/gemini-2.0-flash-001"),
    ("gemini-1.5-flash", "google/gemini-flash-1.5"),
    ("gpt-4o-mini", "openai/gpt-4o-mini"),
    ("claude-3-haiku", "anthropic/claude-3-haiku"),
    // Paid, premium
    ("gpt-4o", "openai/gpt-4o"),
    ("claude-3.5-sonnet", "anthropic/claude-3.5-sonnet"),
    ("gemini-1.5-pro", "google/gemini-pro-1.5"),
];

/// Free models in the order they are tried when one is throttled.
pub const FREE_MODEL_FALLBACKS: &[&str] = &[
    "google/gemini-2.0-flash-exp:free",
    "meta-llama/llama-3.1-8b-instruct:free",
    "google/gemini-flash-1.5-8b-exp",
];

/// Model requested from the direct backup provider.
pub const DIRECT_BACKUP_MODEL: &str = "gemini-2.0-flash";

/// Name reported to callers when the backup provider served the request.
pub const DIRECT_BACKUP_LABEL: &str = "direct-gemini";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ModelTier {
    Free,
    Paid,
    DirectBackup,
}

impl fmt::Display for ModelTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ModelTier::Free => "free",
            ModelTier::Paid => "paid",
            ModelTier::DirectBackup => "direct-backup",
        };
        f.write_str(s)
    }
}

/// One upstream model eligible for an attempt within a request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelCandidate {
    /// Upstream model identifier sent to the provider.
    pub id: String,
    /// Zero-based position in the attempt order.
    pub position: usize,
    pub tier: ModelTier,
}

impl ModelCandidate {
    pub fn new(id: impl Into<String>, position: usize, tier: ModelTier) -> Self {
        Self {
            id: id.into(),
            position,
            tier,
        }
    }

    /// Name reported in `X-Model-Used`.
    pub fn display_name(&self) -> &str {
        match self.tier {
            ModelTier::DirectBackup => DIRECT_BACKUP_LABEL,
            _ => &self.id,
        }
    }
}

/// Ordered candidates for one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CandidatePlan {
    /// Primary pool: the configured model, then the other free models.
    pub candidates: Vec<ModelCandidate>,
    /// Tried once after the primary pool is exhausted.
    pub backup: Option<ModelCandidate>,
    /// `false` for paid primaries: the first failure ends the request.
    pub fallback_enabled: bool,
}

impl CandidatePlan {
    pub fn primary(&self) -> Option<&ModelCandidate> {
        self.candidates.first()
    }

    /// Total number of attempts the plan allows.
    pub fn len(&self) -> usize {
        self.candidates.len() + usize::from(self.backup.is_some())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Resolve a configured model key (or raw catalog identifier) to an upstream identifier.
///
/// Unknown values resolve to the identifier of [`DEFAULT_MODEL_KEY`].
pub fn resolve_model_id(key: Option<&str>) -> &'static str {
    let key = key.map(str::trim).filter(|k| !k.is_empty());
    if let Some(key) = key {
        for (alias, id) in MODEL_CATALOG {
            if *alias == key || *id == key {
                return *id;
            }
        }
    }
    MODEL_CATALOG
        .iter()
        .find(|(alias, _)| *alias == DEFAULT_MODEL_KEY)
        .map(|(_, id)| *id)
        .unwrap_or(FREE_MODEL_FALLBACKS[0])
}

/// Classify an identifier against the built-in free list.
pub fn classify(model_id: &str) -> ModelTier {
    if FREE_MODEL_FALLBACKS.iter().any(|m| *m == model_id) {
        ModelTier::Free
    } else {
        ModelTier::Paid
    }
}

/// Builds candidate plans from a fixed free list and an optional backup model.
#[derive(Debug, Clone)]
pub struct ProviderSelector {
    free_models: Vec<String>,
    backup_model: Option<String>,
}

impl ProviderSelector {
    pub fn new(free_models: Vec<String>) -> Self {
        Self {
            free_models,
            backup_model: None,
        }
    }

    /// Append the direct backup candidate to free-tier plans.
    ///
    /// Only set this when the backup credential is configured.
    pub fn with_backup(mut self, model: impl Into<String>) -> Self {
        self.backup_model = Some(model.into());
        self
    }

    pub fn has_backup(&self) -> bool {
        self.backup_model.is_some()
    }

    pub fn classify(&self, model_id: &str) -> ModelTier {
        if self.free_models.iter().any(|m| m == model_id) {
            ModelTier::Free
        } else {
            ModelTier::Paid
        }
    }

    pub fn plan(&self, primary: &str) -> CandidatePlan {
        if self.classify(primary) == ModelTier::Paid {
            return CandidatePlan {
                candidates: vec![ModelCandidate::new(primary, 0, ModelTier::Paid)],
                backup: None,
                fallback_enabled: false,
            };
        }

        let candidates: Vec<ModelCandidate> = std::iter::once(primary)
            .chain(
                self.free_models
                    .iter()
                    .map(String::as_str)
                    .filter(|m| *m != primary),
            )
            .enumerate()
            .map(|(position, id)| ModelCandidate::new(id, position, ModelTier::Free))
            .collect();

        let backup = self
            .backup_model
            .as_ref()
            .map(|m| ModelCandidate::new(m.clone(), candidates.len(), ModelTier::DirectBackup));

        CandidatePlan {
            candidates,
            backup,
            fallback_enabled: true,
        }
    }
}

impl Default for ProviderSelector {
    fn default() -> Self {
        Self::new(FREE_MODEL_FALLBACKS.iter().map(|s| s.to_string()).collect())
    }
}
