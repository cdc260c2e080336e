// 🔍 City Matcher - Fuzzy resolution of free-text locations
//
// Given a museum's raw location string and the population index, find the
// best-matching known city above a similarity threshold. A miss is a normal
// outcome, never an error. The matcher is a pure function over its inputs:
// no shared state, no side effects.

use crate::population::{normalize_key, PopulationIndex};
use serde::{Deserialize, Serialize};

/// Minimum normalized-Levenshtein similarity (0-1) to accept a match.
pub const MATCH_THRESHOLD: f64 = 0.80;

// ============================================================================
// MATCH RESULT
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchResult {
    /// City name (as it appears in the population table) that produced the
    /// population, or None when nothing cleared the threshold.
    pub matched_name: Option<String>,

    /// Population of the matched city. Set if and only if matched_name is.
    pub population: Option<i64>,

    /// Best similarity score observed, even for a no-match.
    pub score: f64,
}

impl MatchResult {
    pub fn no_match(score: f64) -> Self {
        MatchResult {
            matched_name: None,
            population: None,
            score,
        }
    }

    pub fn is_match(&self) -> bool {
        self.matched_name.is_some()
    }
}

// ============================================================================
// CITY MATCHER
// ============================================================================

pub struct CityMatcher {
    /// Similarity threshold (default: MATCH_THRESHOLD = 0.80)
    pub threshold: f64,
}

impl CityMatcher {
    pub fn new() -> Self {
        CityMatcher {
            threshold: MATCH_THRESHOLD,
        }
    }

    pub fn with_threshold(threshold: f64) -> Self {
        CityMatcher { threshold }
    }

    /// Resolve a free-text location against the index.
    ///
    /// The candidate city is the segment before the first comma, so
    /// "Paris, France" scores as "paris". Scores are normalized Levenshtein
    /// similarity between normalized keys. The index iterates keys in
    /// lexicographic order and only a strictly better score replaces the
    /// current best, so ties resolve to the lexicographically smallest key.
    pub fn resolve(&self, location: &str, index: &PopulationIndex) -> MatchResult {
        let candidate = extract_candidate(location);
        if candidate.is_empty() {
            return MatchResult::no_match(0.0);
        }

        // Exact normalized hit short-circuits the scan.
        if let Some(entry) = index.lookup(&candidate) {
            return MatchResult {
                matched_name: Some(entry.city.clone()),
                population: Some(entry.population),
                score: 1.0,
            };
        }

        let candidate_key = normalize_key(&candidate);
        let mut best_score = 0.0;
        let mut best_entry = None;

        for (key, entry) in index.iter() {
            let score = strsim::normalized_levenshtein(&candidate_key, key);
            if score > best_score {
                best_score = score;
                best_entry = Some(entry);
            }
        }

        match best_entry {
            Some(entry) if best_score >= self.threshold => MatchResult {
                matched_name: Some(entry.city.clone()),
                population: Some(entry.population),
                score: best_score,
            },
            _ => MatchResult::no_match(best_score),
        }
    }
}

impl Default for CityMatcher {
    fn default() -> Self {
        Self::new()
    }
}

/// Strip administrative qualifiers after a separator:
/// "Paris, France" -> "Paris", "Amsterdam" -> "Amsterdam".
fn extract_candidate(location: &str) -> String {
    location
        .split(',')
        .next()
        .unwrap_or("")
        .trim()
        .to_string()
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::population::PopulationEntry;

    fn index_of(cities: &[(&str, i64)]) -> PopulationIndex {
        PopulationIndex::from_entries(cities.iter().map(|(city, population)| PopulationEntry {
            city: city.to_string(),
            country: "Testland".to_string(),
            population: *population,
            year: 2021,
        }))
    }

    #[test]
    fn test_exact_match_scores_one() {
        let index = index_of(&[("Paris", 2_100_000), ("London", 8_800_000)]);
        let matcher = CityMatcher::new();

        let result = matcher.resolve("Paris", &index);
        assert_eq!(result.matched_name.as_deref(), Some("Paris"));
        assert_eq!(result.population, Some(2_100_000));
        assert_eq!(result.score, 1.0);
    }

    #[test]
    fn test_qualifier_after_comma_is_stripped() {
        let index = index_of(&[("Amsterdam", 870_000)]);
        let matcher = CityMatcher::new();

        let result = matcher.resolve("Amsterdam, Netherlands", &index);
        assert_eq!(result.matched_name.as_deref(), Some("Amsterdam"));
    }

    #[test]
    fn test_fuzzy_match_above_threshold() {
        let index = index_of(&[("Saint Petersburg", 5_400_000)]);
        let matcher = CityMatcher::new();

        // One-word difference, well above 0.80 similarity
        let result = matcher.resolve("Sant Petersburg", &index);
        assert_eq!(result.matched_name.as_deref(), Some("Saint Petersburg"));
        assert!(result.score >= MATCH_THRESHOLD);
        assert!(result.score < 1.0);
    }

    #[test]
    fn test_below_threshold_returns_no_match() {
        let index = index_of(&[("Paris", 2_100_000), ("London", 8_800_000)]);
        let matcher = CityMatcher::new();

        let result = matcher.resolve("Ulaanbaatar", &index);
        assert!(!result.is_match());
        assert!(result.matched_name.is_none());
        assert!(result.population.is_none());
        assert!(result.score < MATCH_THRESHOLD);
    }

    #[test]
    fn test_empty_location_is_no_match_not_error() {
        let index = index_of(&[("Paris", 2_100_000)]);
        let matcher = CityMatcher::new();

        let result = matcher.resolve("   ", &index);
        assert!(!result.is_match());
        assert_eq!(result.score, 0.0);
    }

    #[test]
    fn test_tie_breaks_to_lexicographically_smaller_key() {
        // "abcx" is equidistant from "abca" and "abcb"; the scan must keep
        // the first (lexicographically smaller) key it saw.
        let index = index_of(&[("abcb", 2), ("abca", 1)]);
        let matcher = CityMatcher::with_threshold(0.5);

        let result = matcher.resolve("abcx", &index);
        assert_eq!(result.matched_name.as_deref(), Some("abca"));
        assert_eq!(result.population, Some(1));
    }

    #[test]
    fn test_resolve_is_deterministic() {
        let index = index_of(&[("Vienna", 1_900_000), ("Verona", 250_000)]);
        let matcher = CityMatcher::new();

        let first = matcher.resolve("Viena", &index);
        let second = matcher.resolve("Viena", &index);
        assert_eq!(first, second);
    }
}
