//! Independent pass/fail verdicts per (scope, id).
//!
//! A keyed map where the last verdict wins: a pass followed by a fail for
//! the same key reads as not verified. Records are stamped with the
//! iteration they were logged in so completion gating can insist on a
//! verdict from the current iteration. Writes are visible synchronously to
//! every holder of the tracker.

use chrono::Utc;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};
use tracing::{debug, info};

use crate::domain::models::{VerificationKey, VerificationRecord, VerificationScope};

#[derive(Debug, Default)]
pub struct VerificationTracker {
    current_iteration: AtomicU64,
    records: Mutex<HashMap<VerificationKey, VerificationRecord>>,
}

impl VerificationTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stamp subsequent records with `iteration`.
    pub fn begin_iteration(&self, iteration: u64) {
        self.current_iteration.store(iteration, Ordering::SeqCst);
    }

    pub fn current_iteration(&self) -> u64 {
        self.current_iteration.load(Ordering::SeqCst)
    }

    /// Store a verdict, replacing any earlier verdict for the same key.
    pub fn record_verification(
        &self,
        scope: VerificationScope,
        id: &str,
        passed: bool,
    ) -> VerificationRecord {
        let record = VerificationRecord {
            scope,
            id: id.to_string(),
            passed,
            iteration: self.current_iteration(),
            timestamp: Utc::now(),
        };

        let previous = self
            .records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(VerificationKey::new(scope, id), record.clone());

        info!(
            scope = %scope,
            id = %id,
            passed,
            iteration = record.iteration,
            overwrote = previous.is_some(),
            "verification recorded"
        );
        record
    }

    /// True only when the latest verdict for exactly this key passed.
    pub fn is_verified(&self, scope: VerificationScope, id: &str) -> bool {
        self.latest(scope, id).is_some_and(|r| r.passed)
    }

    pub fn latest(&self, scope: VerificationScope, id: &str) -> Option<VerificationRecord> {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&VerificationKey::new(scope, id))
            .cloned()
    }

    /// Latest verdict passed and was logged in `iteration`.
    pub fn passed_in_iteration(&self, key: &VerificationKey, iteration: u64) -> bool {
        let passed = self
            .records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .is_some_and(|r| r.passed && r.iteration == iteration);
        debug!(key = %key, iteration, passed, "verification lookup");
        passed
    }

    /// Drop every record. Only done on session reset.
    pub fn reset(&self) {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
        info!("verification records cleared");
    }

    pub fn len(&self) -> usize {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_last_verdict_wins() {
        let tracker = VerificationTracker::new();
        tracker.record_verification(VerificationScope::Task, "T1", true);
        assert!(tracker.is_verified(VerificationScope::Task, "T1"));

        tracker.record_verification(VerificationScope::Task, "T1", false);
        assert!(!tracker.is_verified(VerificationScope::Task, "T1"));
        assert_eq!(tracker.len(), 1);
    }

    #[test]
    fn test_scopes_do_not_imply_each_other() {
        let tracker = VerificationTracker::new();
        tracker.record_verification(VerificationScope::Task, "login", true);

        assert!(!tracker.is_verified(VerificationScope::Component, "login"));
        assert!(!tracker.is_verified(VerificationScope::Module, "login"));
    }

    #[test]
    fn test_unknown_key_is_not_verified() {
        let tracker = VerificationTracker::new();
        assert!(!tracker.is_verified(VerificationScope::Task, "missing"));
        assert!(tracker.is_empty());
    }

    #[test]
    fn test_passed_in_iteration_requires_same_iteration() {
        let tracker = VerificationTracker::new();
        tracker.begin_iteration(4);
        tracker.record_verification(VerificationScope::Component, "api", true);

        let key = VerificationKey::component("api");
        assert!(tracker.passed_in_iteration(&key, 4));
        assert!(!tracker.passed_in_iteration(&key, 5));
        // Still verified in the absolute sense.
        assert!(tracker.is_verified(VerificationScope::Component, "api"));
    }

    #[test]
    fn test_reset_clears_all_records() {
        let tracker = VerificationTracker::new();
        tracker.record_verification(VerificationScope::Module, "auth", true);
        tracker.reset();
        assert!(!tracker.is_verified(VerificationScope::Module, "auth"));
    }
}
