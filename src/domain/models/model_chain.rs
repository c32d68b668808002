//! Model fallback chain.

use serde::{Deserialize, Serialize};

/// Ordered candidates for one invocation, most preferred first.
///
/// Built per invocation from static configuration; duplicates are dropped
/// keeping the first occurrence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelFallbackChain {
    pub requested_model: String,
    pub candidates: Vec<String>,
}

impl ModelFallbackChain {
    /// `[requested] + fallbacks + [default]`, deduplicated.
    pub fn build(requested: &str, fallbacks: &[String], default_model: &str) -> Self {
        let mut candidates: Vec<String> = Vec::with_capacity(fallbacks.len() + 2);
        let ordered = std::iter::once(requested)
            .chain(fallbacks.iter().map(String::as_str))
            .chain(std::iter::once(default_model));
        for model in ordered {
            if !model.is_empty() && !candidates.iter().any(|c| c == model) {
                candidates.push(model.to_string());
            }
        }
        Self {
            requested_model: requested.to_string(),
            candidates,
        }
    }
}

/// Outcome of resolving a chain against the availability set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelResolution {
    pub model: String,
    /// Candidates passed over because they were unavailable.
    pub skipped: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chain_order_and_dedup() {
        let chain = ModelFallbackChain::build(
            "m1",
            &["m2".to_string(), "m1".to_string(), "m3".to_string()],
            "m3",
        );
        assert_eq!(chain.requested_model, "m1");
        assert_eq!(chain.candidates, vec!["m1", "m2", "m3"]);
    }

    #[test]
    fn test_chain_skips_empty_entries() {
        let chain = ModelFallbackChain::build("", &[], "default");
        assert_eq!(chain.candidates, vec!["default"]);
    }
}
