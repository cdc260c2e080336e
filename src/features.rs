// 📐 Feature Builder - Log-log samples from stored museum rows
//
// Recomputed fresh on every training run: the store may have changed since
// the last call, so nothing is cached here.

use crate::db::{fetch_training_rows, TrainingRow};
use anyhow::Result;
use rusqlite::Connection;
use serde::{Deserialize, Serialize};

/// One (ln population, ln visitors) pair.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TrainingSample {
    pub log_population: f64,
    pub log_visitors: f64,
}

/// Read the store and build the sample set.
///
/// Rows with non-positive population or visitor count never produce a sample
/// (their log is undefined); they are filtered, not errors. Output order is
/// stable - the query orders by record identity.
pub fn build_features(conn: &Connection, min_visitors: f64) -> Result<Vec<TrainingSample>> {
    let rows = fetch_training_rows(conn, min_visitors)?;
    Ok(samples_from_rows(&rows))
}

/// Pure transform from joined rows to log-log samples.
pub fn samples_from_rows(rows: &[TrainingRow]) -> Vec<TrainingSample> {
    rows.iter()
        .filter(|row| row.population > 0 && row.visitors_millions > 0.0)
        .map(|row| TrainingSample {
            log_population: (row.population as f64).ln(),
            log_visitors: row.visitors_millions.ln(),
        })
        .collect()
}

// ============================================================================
// TESTS
// ============================================================================
