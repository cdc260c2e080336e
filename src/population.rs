// 🌍 Population Index - City population table, indexed by normalized name
//
// Lookup here is EXACT match on a normalized key (case-folded, trimmed,
// diacritics-stripped). Fuzzy resolution is the matcher's job, not the
// index's. The index is built once per ETL run and never mutated afterwards.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::Path;

// ============================================================================
// POPULATION ENTRY
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PopulationEntry {
    pub city: String,
    pub country: String,
    pub population: i64,
    pub year: i32,
}

// ============================================================================
// CSV ROW (UNSD city population export)
// ============================================================================

/// One row of the UNSD "city population by year" CSV.
/// Year and Value arrive as strings ("2021", "8804190.0") and are parsed
/// leniently - unparseable rows are skipped, never fatal.
#[derive(Debug, Deserialize)]
struct CityCsvRow {
    #[serde(rename = "Country or Area", alias = "Country")]
    country: String,

    #[serde(rename = "City")]
    city: String,

    #[serde(rename = "Year")]
    year: String,

    #[serde(rename = "Value", alias = "Population")]
    population: String,
}

// ============================================================================
// POPULATION INDEX
// ============================================================================

/// Exact-match index over normalized city names.
#[derive(Debug, Default, Clone)]
pub struct PopulationIndex {
    // BTreeMap so the matcher scans keys in a fixed lexicographic order,
    // which makes tie-breaking deterministic.
    entries: BTreeMap<String, PopulationEntry>,
}

impl PopulationIndex {
    /// Build an index from already-parsed entries.
    ///
    /// When two entries normalize to the same city key, the more recent year
    /// wins; at equal years the larger population wins.
    pub fn from_entries(entries: impl IntoIterator<Item = PopulationEntry>) -> Self {
        let mut map: BTreeMap<String, PopulationEntry> = BTreeMap::new();

        for entry in entries {
            if entry.population <= 0 {
                continue;
            }
            let key = normalize_key(&entry.city);
            if key.is_empty() {
                continue;
            }

            match map.get(&key) {
                Some(existing)
                    if (existing.year, existing.population)
                        >= (entry.year, entry.population) => {}
                _ => {
                    map.insert(key, entry);
                }
            }
        }

        PopulationIndex { entries: map }
    }

    /// Load the UNSD city population CSV and index it.
    ///
    /// The export carries one row per (country, city, year); we keep only the
    /// latest year per (country, city) before indexing by city name.
    pub fn from_csv(csv_path: &Path) -> Result<Self> {
        let mut rdr = csv::Reader::from_path(csv_path)
            .with_context(|| format!("Failed to open city population CSV at {}", csv_path.display()))?;

        let mut latest: HashMap<(String, String), PopulationEntry> = HashMap::new();

        for result in rdr.deserialize() {
            // Bad rows are skipped, not fatal - one malformed line must not
            // abort the whole load.
            let row: CityCsvRow = match result {
                Ok(row) => row,
                Err(_) => continue,
            };

            let country = row.country.trim().to_string();
            let city = row.city.trim().to_string();
            if country.is_empty() || city.is_empty() {
                continue;
            }

            let year: i32 = match row.year.trim().parse() {
                Ok(y) => y,
                Err(_) => continue,
            };
            // Value column is sometimes "8804190.0"
            let population = match row.population.trim().parse::<f64>() {
                Ok(p) if p.is_finite() && p > 0.0 => p as i64,
                _ => continue,
            };

            let key = (country.clone(), city.clone());
            let candidate = PopulationEntry {
                city,
                country,
                population,
                year,
            };

            match latest.get(&key) {
                Some(existing) if existing.year >= candidate.year => {}
                _ => {
                    latest.insert(key, candidate);
                }
            }
        }

        Ok(Self::from_entries(latest.into_values()))
    }

    /// Exact lookup on the normalized form of `candidate_name`.
    pub fn lookup(&self, candidate_name: &str) -> Option<&PopulationEntry> {
        self.entries.get(&normalize_key(candidate_name))
    }

    /// Iterate (normalized key, entry) pairs in lexicographic key order.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &PopulationEntry)> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

// ============================================================================
// KEY NORMALIZATION
// ============================================================================

/// Normalize a city name for exact lookup: trim, case-fold, strip the common
/// Latin diacritics, collapse internal whitespace.
pub fn normalize_key(name: &str) -> String {
    let lowered = name.trim().to_lowercase();
    let mut folded = String::with_capacity(lowered.len());

    for c in lowered.chars() {
        match fold_diacritic(c) {
            Some(plain) => folded.push_str(plain),
            None => folded.push(c),
        }
    }

    folded.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn fold_diacritic(c: char) -> Option<&'static str> {
    let plain = match c {
        'à' | 'á' | 'â' | 'ã' | 'ä' | 'å' => "a",
        'ç' => "c",
        'è' | 'é' | 'ê' | 'ë' => "e",
        'ì' | 'í' | 'î' | 'ï' => "i",
        'ñ' => "n",
        'ò' | 'ó' | 'ô' | 'õ' | 'ö' | 'ø' => "o",
        'ù' | 'ú' | 'û' | 'ü' => "u",
        'ý' | 'ÿ' => "y",
        'æ' => "ae",
        'œ' => "oe",
        'ß' => "ss",
        _ => return None,
    };
    Some(plain)
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn entry(city: &str, country: &str, population: i64, year: i32) -> PopulationEntry {
        PopulationEntry {
            city: city.to_string(),
            country: country.to_string(),
            population,
            year,
        }
    }

    #[test]
    fn test_normalize_key() {
        assert_eq!(normalize_key("  Paris "), "paris");
        assert_eq!(normalize_key("SÃO  PAULO"), "sao paulo");
        assert_eq!(normalize_key("Zürich"), "zurich");
        assert_eq!(normalize_key("New York City"), "new york city");
    }

    #[test]
    fn test_exact_lookup_hits_and_misses() {
        let index = PopulationIndex::from_entries(vec![
            entry("Paris", "France", 2_100_000, 2021),
            entry("London", "United Kingdom", 8_800_000, 2021),
        ]);

        let hit = index.lookup("  PARIS ").unwrap();
        assert_eq!(hit.population, 2_100_000);
        assert_eq!(hit.country, "France");

        assert!(index.lookup("Berlin").is_none());
    }

    #[test]
    fn test_collision_prefers_latest_year_then_population() {
        let index = PopulationIndex::from_entries(vec![
            entry("Paris", "France", 2_100_000, 2015),
            entry("Paris", "France", 2_200_000, 2021),
            // Same normalized key, older year: must lose even with more people
            entry("París", "Mexico", 9_999_999, 2010),
        ]);

        assert_eq!(index.len(), 1);
        let winner = index.lookup("Paris").unwrap();
        assert_eq!(winner.year, 2021);
        assert_eq!(winner.population, 2_200_000);
    }

    #[test]
    fn test_nonpositive_population_rows_are_dropped() {
        let index = PopulationIndex::from_entries(vec![
            entry("Ghost Town", "Nowhere", 0, 2021),
            entry("Atlantis", "Ocean", -5, 2021),
        ]);
        assert!(index.is_empty());
    }

    #[test]
    fn test_from_csv_keeps_latest_year_and_skips_bad_rows() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "Country or Area,City,Year,Value").unwrap();
        writeln!(file, "France,Paris,2015,2100000").unwrap();
        writeln!(file, "France,Paris,2021,2200000.0").unwrap();
        writeln!(file, "United Kingdom,London,2021,8800000").unwrap();
        writeln!(file, "Nowhere,Badville,not-a-year,123").unwrap();
        writeln!(file, "Nowhere,Negville,2021,-10").unwrap();
        file.flush().unwrap();

        let index = PopulationIndex::from_csv(file.path()).unwrap();
        assert_eq!(index.len(), 2);
        assert_eq!(index.lookup("Paris").unwrap().population, 2_200_000);
        assert_eq!(index.lookup("London").unwrap().population, 8_800_000);
        assert!(index.lookup("Badville").is_none());
    }
}
