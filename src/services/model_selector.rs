//! Phase-aware model selection with availability-filtered fallback.
//!
//! The chain for a phase is `[phase model] + fallbacks + [default]`,
//! filtered against a cached availability set fetched from the backend's
//! capability query. The cache lives for `availability_ttl_secs`.

use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::domain::errors::{OrchestratorError, OrchestratorResult};
use crate::domain::models::{ModelFallbackChain, ModelResolution, ModelsConfig, Phase};
use crate::domain::ports::AgentBackend;

#[derive(Debug, Clone)]
struct AvailabilityCache {
    models: HashSet<String>,
    fetched_at: Instant,
}

pub struct ModelSelector {
    config: ModelsConfig,
    backend: Arc<dyn AgentBackend>,
    cache: Mutex<Option<AvailabilityCache>>,
}

impl ModelSelector {
    pub fn new(config: ModelsConfig, backend: Arc<dyn AgentBackend>) -> Self {
        Self {
            config,
            backend,
            cache: Mutex::new(None),
        }
    }

    pub fn config(&self) -> &ModelsConfig {
        &self.config
    }

    /// Candidate chain for `phase`, before availability filtering.
    pub fn chain_for(&self, phase: Phase) -> ModelFallbackChain {
        ModelFallbackChain::build(
            self.config.model_for(phase),
            &self.config.fallback_models,
            &self.config.default_model,
        )
    }

    /// Cached availability set, refreshed when older than the TTL.
    ///
    /// A failed refresh keeps serving the stale set; with no set at all the
    /// result is `None` and callers must assume availability is unknown.
    pub async fn availability(&self) -> Option<HashSet<String>> {
        let mut cache = self.cache.lock().await;
        let ttl = self.config.availability_ttl();

        if let Some(entry) = cache.as_ref() {
            if entry.fetched_at.elapsed() < ttl {
                return Some(entry.models.clone());
            }
        }

        match self.backend.available_models().await {
            Ok(models) => {
                let models: HashSet<String> = models.into_iter().collect();
                debug!(count = models.len(), "model availability refreshed");
                *cache = Some(AvailabilityCache {
                    models: models.clone(),
                    fetched_at: Instant::now(),
                });
                Some(models)
            }
            Err(err) => {
                warn!(error = %err, stale = cache.is_some(), "model availability query failed");
                cache.as_ref().map(|entry| entry.models.clone())
            }
        }
    }

    /// Drop the cached availability set.
    pub async fn invalidate(&self) {
        *self.cache.lock().await = None;
    }

    pub async fn resolve(&self, phase: Phase) -> OrchestratorResult<ModelResolution> {
        self.resolve_excluding(phase, &[]).await
    }

    /// Resolve `phase`, never returning a candidate in `excluded`.
    pub async fn resolve_excluding(
        &self,
        phase: Phase,
        excluded: &[String],
    ) -> OrchestratorResult<ModelResolution> {
        let chain = self.chain_for(phase);
        let availability = self.availability().await;
        select_from_chain(&chain, availability.as_ref(), excluded)
    }
}

impl std::fmt::Debug for ModelSelector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelSelector")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

/// First candidate that is not excluded and, when availability is known,
/// present in the availability set.
///
/// Emits one warning naming every candidate passed over for being
/// unavailable. Excluded candidates are dropped silently.
pub fn select_from_chain(
    chain: &ModelFallbackChain,
    availability: Option<&HashSet<String>>,
    excluded: &[String],
) -> OrchestratorResult<ModelResolution> {
    let mut skipped: Vec<String> = Vec::new();

    for candidate in &chain.candidates {
        if excluded.contains(candidate) {
            continue;
        }
        let available = availability.map_or(true, |set| set.contains(candidate));
        if !available {
            skipped.push(candidate.clone());
            continue;
        }

        if !skipped.is_empty() {
            warn!(
                requested = %chain.requested_model,
                selected = %candidate,
                skipped = %skipped.join(", "),
                "preferred models unavailable, falling back"
            );
        }
        debug!(model = %candidate, requested = %chain.requested_model, "model resolved");
        return Ok(ModelResolution {
            model: candidate.clone(),
            skipped,
        });
    }

    let tried: Vec<String> = chain
        .candidates
        .iter()
        .filter(|c| !excluded.contains(c))
        .cloned()
        .collect();

    if tried.is_empty() {
        return Err(OrchestratorError::FallbackExhausted {
            tried: excluded.to_vec(),
        });
    }

    Err(OrchestratorError::ModelUnavailable {
        requested: chain.requested_model.clone(),
        tried,
    })
}
