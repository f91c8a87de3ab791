//! Test doubles for the approximate matcher.
//!
//! `ScriptedMatcher` answers configured inputs with a fixed candidate and falls
//! back to a case-insensitive exact match, recording what it was asked so tests
//! can assert on the candidate sets validators hand it.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;

use crate::matcher::{ClosestMatch, MatchResult};

#[derive(Default)]
pub struct ScriptedMatcher {
    answers: HashMap<String, Option<String>>,
    calls: AtomicUsize,
    last_candidates: Mutex<Vec<String>>,
}

impl ScriptedMatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer `input` with `best` (or no match) regardless of candidates.
    pub fn answer(mut self, input: &str, best: Option<&str>) -> Self {
        self.answers
            .insert(input.to_lowercase(), best.map(str::to_string));
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn last_candidates(&self) -> Vec<String> {
        self.last_candidates
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[async_trait]
impl ClosestMatch for ScriptedMatcher {
    async fn find_closest(&self, input: &str, candidates: &[String]) -> MatchResult {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self
            .last_candidates
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = candidates.to_vec();

        let best = match self.answers.get(&input.to_lowercase()) {
            Some(answer) => answer.clone(),
            None => candidates
                .iter()
                .find(|c| c.eq_ignore_ascii_case(input))
                .cloned(),
        };
        MatchResult {
            best,
            alternatives: candidates.to_vec(),
        }
    }
}

/// A catalog over an in-memory store holding one imported copy of the sample universe.
#[cfg(test)]
pub(crate) async fn seeded_catalog() -> std::sync::Arc<uex_store::Catalog> {
    use std::sync::Arc;
    use uex_loader::test_support::sample_catalog;
    use uex_loader::Importer;
    use uex_models::ImportConfig;
    use uex_store::{Catalog, Store};

    let store = Arc::new(Store::open_in_memory().unwrap());
    Importer::new(store.clone(), Arc::new(sample_catalog()), ImportConfig::default())
        .run_cycle(false)
        .await
        .unwrap();
    Arc::new(Catalog::new(store))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn scripted_answers_override_candidates() {
        let matcher = ScriptedMatcher::new().answer("Big Ship", Some("Caterpillar"));
        let candidates = vec!["Gold".to_string()];

        let scripted = matcher.find_closest("big ship", &candidates).await;
        assert_eq!(scripted.best.as_deref(), Some("Caterpillar"));

        let exact = matcher.find_closest("GOLD", &candidates).await;
        assert_eq!(exact.best.as_deref(), Some("Gold"));

        assert_eq!(matcher.find_closest("tin", &candidates).await.best, None);
        assert_eq!(matcher.calls(), 3);
        assert_eq!(matcher.last_candidates(), candidates);
    }
}
