//! Approximate string matching against candidate display names.

use async_trait::async_trait;

/// Outcome of one approximate match.
#[derive(Debug, Clone, PartialEq)]
pub struct MatchResult {
    /// The accepted candidate, if any cleared the acceptance threshold.
    pub best: Option<String>,
    /// Candidates ordered by similarity, best first.
    pub alternatives: Vec<String>,
}

/// Finds the candidate closest to a raw input. Mockable for testing.
#[async_trait]
pub trait ClosestMatch: Send + Sync {
    async fn find_closest(&self, input: &str, candidates: &[String]) -> MatchResult;
}

/// Jaro-Winkler based matcher with a fixed acceptance threshold.
///
/// A candidate is scored against the whole input and against every run of
/// consecutive words of the same length as the input, so "caterpillar" matches
/// "Drake Caterpillar" on its own word.
#[derive(Debug, Clone)]
pub struct SimilarityMatcher {
    threshold: f64,
}

impl SimilarityMatcher {
    pub fn new(threshold: f64) -> Self {
        Self {
            threshold: threshold.clamp(0.0, 1.0),
        }
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    /// Every candidate with its score, best first. Ties keep candidate order.
    pub fn rank<'a>(&self, input: &str, candidates: &'a [String]) -> Vec<(&'a str, f64)> {
        let mut scored: Vec<(&str, f64)> = candidates
            .iter()
            .map(|c| (c.as_str(), similarity(input, c)))
            .collect();
        scored.sort_by(|a, b| b.1.total_cmp(&a.1));
        scored
    }
}

#[async_trait]
impl ClosestMatch for SimilarityMatcher {
    async fn find_closest(&self, input: &str, candidates: &[String]) -> MatchResult {
        let ranked = self.rank(input, candidates);
        let best = ranked
            .first()
            .filter(|(_, score)| *score >= self.threshold)
            .map(|(name, _)| name.to_string());
        MatchResult {
            best,
            alternatives: ranked.into_iter().map(|(name, _)| name.to_string()).collect(),
        }
    }
}

/// Case-insensitive similarity in `0.0..=1.0`.
pub fn similarity(input: &str, candidate: &str) -> f64 {
    let input = normalize(input);
    let candidate = normalize(candidate);
    if input.is_empty() || candidate.is_empty() {
        return 0.0;
    }
    if input == candidate {
        return 1.0;
    }

    let whole = jaro_winkler(&input, &candidate);
    let width = input.split(' ').count();
    let words: Vec<&str> = candidate.split(' ').collect();
    if words.len() <= width {
        return whole;
    }
    words
        .windows(width)
        .map(|w| jaro_winkler(&input, &w.join(" ")))
        .fold(whole, f64::max)
}

fn normalize(s: &str) -> String {
    s.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

pub fn jaro_winkler(a: &str, b: &str) -> f64 {
    let jaro = jaro(a, b);
    let prefix = a
        .chars()
        .zip(b.chars())
        .take(4)
        .take_while(|(x, y)| x == y)
        .count();
    jaro + prefix as f64 * 0.1 * (1.0 - jaro)
}

fn jaro(a: &str, b: &str) -> f64 {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    if a.is_empty() && b.is_empty() {
        return 1.0;
    }
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }

    let window = (a.len().max(b.len()) / 2).saturating_sub(1);
    let mut a_matched = vec![false; a.len()];
    let mut b_matched = vec![false; b.len()];
    let mut matches = 0usize;

    for (i, ca) in a.iter().enumerate() {
        let lo = i.saturating_sub(window);
        let hi = (i + window + 1).min(b.len());
        for j in lo..hi {
            if !b_matched[j] && b[j] == *ca {
                a_matched[i] = true;
                b_matched[j] = true;
                matches += 1;
                break;
            }
        }
    }
    if matches == 0 {
        return 0.0;
    }

    let a_seq = a.iter().zip(&a_matched).filter(|(_, m)| **m).map(|(c, _)| c);
    let b_seq = b.iter().zip(&b_matched).filter(|(_, m)| **m).map(|(c, _)| c);
    let transpositions = a_seq.zip(b_seq).filter(|(x, y)| x != y).count() / 2;

    let m = matches as f64;
    (m / a.len() as f64 + m / b.len() as f64 + (m - transpositions as f64) / m) / 3.0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn metals() -> Vec<String> {
        vec!["Agricium".into(), "Aluminum".into(), "Gold".into()]
    }

    #[tokio::test]
    async fn typo_matches_closest_candidate() {
        let matcher = SimilarityMatcher::new(0.75);
        let result = matcher.find_closest("agricum", &metals()).await;
        assert_eq!(result.best.as_deref(), Some("Agricium"));
        assert_eq!(result.alternatives[0], "Agricium");
    }

    #[tokio::test]
    async fn unrelated_input_has_no_match() {
        let matcher = SimilarityMatcher::new(0.75);
        let result = matcher.find_closest("titanium", &metals()).await;
        assert_eq!(result.best, None);
        let mut alternatives = result.alternatives.clone();
        alternatives.sort();
        assert_eq!(alternatives, metals());
    }

    #[tokio::test]
    async fn repeated_calls_are_deterministic() {
        let matcher = SimilarityMatcher::new(0.75);
        let first = matcher.find_closest("alu", &metals()).await;
        for _ in 0..5 {
            assert_eq!(matcher.find_closest("alu", &metals()).await, first);
        }
    }

    #[test]
    fn word_windows_match_short_names() {
        assert_eq!(similarity("caterpillar", "Drake Caterpillar"), 1.0);
        assert!(similarity("cutlass black", "Drake Cutlass Black") > 0.99);
        assert!(similarity("  GOLD ", "gold") == 1.0);
    }

    #[test]
    fn jaro_winkler_reference_values() {
        assert!((jaro_winkler("martha", "marhta") - 0.961).abs() < 0.001);
        assert!((jaro_winkler("dixon", "dicksonx") - 0.813).abs() < 0.001);
        assert_eq!(jaro_winkler("abc", "xyz"), 0.0);
    }
}
