// 🏛️ Record Harmonizer - Join museum rows with city populations
//
// Takes a raw museum record, delegates location resolution to the matcher,
// and produces a harmonized record carrying a resolved population (nullable).
// A record that fails to match is kept and flagged, never dropped - only
// training excludes it later.

use crate::matcher::{CityMatcher, MatchResult};
use crate::population::PopulationIndex;
use serde::{Deserialize, Serialize};

// ============================================================================
// RAW MUSEUM RECORD
// ============================================================================

/// Museum row as scraped - immutable once produced by the ingestion step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawMuseumRecord {
    pub name: String,

    /// Free-text location cell, e.g. "France Paris" or "Amsterdam, Netherlands"
    pub location: String,

    pub country: Option<String>,
    pub city: Option<String>,

    /// Visitor figure as parsed from the source. May be an absolute head
    /// count ("6270000") or already in millions ("3.3") - see
    /// [`visitors_in_millions`] for the normalization rule.
    pub visitors: Option<f64>,

    /// Original visitor cell text, kept for provenance.
    pub raw_visitors_str: Option<String>,

    pub rank: Option<i64>,
    pub year: Option<i32>,
    pub coordinates: Option<String>,
    pub museum_type: Option<String>,
}

// ============================================================================
// HARMONIZED MUSEUM RECORD
// ============================================================================

/// Raw record plus the resolved city population.
///
/// Invariant: matched_city is Some if and only if city_population is Some,
/// and the population came from exactly one index entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HarmonizedMuseumRecord {
    pub name: String,
    pub location: String,
    pub country: Option<String>,
    pub city: Option<String>,

    /// Annual visitors normalized to millions.
    pub visitors_millions: Option<f64>,
    pub raw_visitors_str: Option<String>,

    pub rank: Option<i64>,
    pub year: Option<i32>,
    pub coordinates: Option<String>,
    pub museum_type: Option<String>,

    /// Population-table city name that produced the population.
    pub matched_city: Option<String>,
    pub city_population: Option<i64>,
    pub match_score: Option<f64>,
}

impl HarmonizedMuseumRecord {
    /// Stable identity for upserts: (name, country).
    pub fn identity(&self) -> (String, String) {
        (
            self.name.clone(),
            self.country.clone().unwrap_or_default(),
        )
    }

    pub fn is_matched(&self) -> bool {
        self.matched_city.is_some()
    }
}

// ============================================================================
// HARMONIZATION
// ============================================================================

/// Normalize a raw visitor figure to millions.
///
/// Rule: a value >= 1000 is an absolute head count (no museum reports four
/// digits of annual visitors in millions), so divide by 1e6; anything below
/// is already expressed in millions.
pub fn visitors_in_millions(raw: f64) -> f64 {
    if raw >= 1000.0 {
        raw / 1_000_000.0
    } else {
        raw
    }
}

/// Harmonize one raw record. Pure: same inputs always yield the same output;
/// persistence is the caller's upsert afterwards.
pub fn harmonize(
    raw: &RawMuseumRecord,
    matcher: &CityMatcher,
    index: &PopulationIndex,
) -> HarmonizedMuseumRecord {
    // Prefer the parsed city when ingestion produced one; fall back to the
    // raw location string.
    let location_hint = raw.city.as_deref().unwrap_or(&raw.location);
    let result: MatchResult = matcher.resolve(location_hint, index);

    let match_score = if result.is_match() {
        Some(result.score)
    } else {
        None
    };

    HarmonizedMuseumRecord {
        name: raw.name.clone(),
        location: raw.location.clone(),
        country: raw.country.clone(),
        city: raw.city.clone(),
        visitors_millions: raw.visitors.map(visitors_in_millions),
        raw_visitors_str: raw.raw_visitors_str.clone(),
        rank: raw.rank,
        year: raw.year,
        coordinates: raw.coordinates.clone(),
        museum_type: raw.museum_type.clone(),
        matched_city: result.matched_name,
        city_population: result.population,
        match_score,
    }
}

// ============================================================================
// TESTS
// ============================================================================
