// 📈 Regression Trainer & Predictor - Log-log OLS over museum samples
//
// Ordinary least squares via the closed-form normal equations: the dataset
// is bounded by the number of world museums, so no iterative solver is
// needed. The fitted parameters travel as an immutable JSON artifact that a
// new training run atomically replaces (temp file + rename). Training and
// serving never share in-memory state - they only meet at the artifact.

use crate::db::setup_database;
use crate::error::ModelError;
use crate::features::{build_features, TrainingSample};
use anyhow::Context;
use chrono::{DateTime, Utc};
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Default minimum-visitors cutoff for training rows (millions).
pub const DEFAULT_MIN_VISITORS_MILLIONS: f64 = 0.5;

// ============================================================================
// REGRESSION ARTIFACT
// ============================================================================

/// Output of one training run. Immutable once written; retraining replaces
/// the whole file, so a reader sees either the old or the new artifact,
/// never a mix.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegressionArtifact {
    /// Slope in log-log space.
    pub slope: f64,

    /// Intercept in log-log space.
    pub intercept: f64,

    /// In-sample coefficient of determination (no held-out split - a known
    /// simplification of this design, not an oversight).
    pub r2: f64,

    /// Mean absolute error of the log-space residuals.
    pub mae: f64,

    /// Root mean squared error of the log-space residuals.
    pub rmse: f64,

    pub sample_count: usize,
    pub trained_at: DateTime<Utc>,
}

// ============================================================================
// TRAINER
// ============================================================================

/// Fit OLS slope/intercept to the log-log samples.
///
/// Requires at least 2 samples with non-identical populations; anything less
/// is `InsufficientData`, never a silent degenerate fit.
pub fn fit(samples: &[TrainingSample]) -> Result<RegressionArtifact, ModelError> {
    if samples.len() < 2 {
        return Err(ModelError::InsufficientData {
            usable: samples.len(),
        });
    }

    let n = samples.len() as f64;
    let mean_x: f64 = samples.iter().map(|s| s.log_population).sum::<f64>() / n;
    let mean_y: f64 = samples.iter().map(|s| s.log_visitors).sum::<f64>() / n;

    let mut sxx = 0.0;
    let mut sxy = 0.0;
    for s in samples {
        let dx = s.log_population - mean_x;
        sxx += dx * dx;
        sxy += dx * (s.log_visitors - mean_y);
    }

    // All populations identical: the slope is undefined
    if sxx == 0.0 {
        return Err(ModelError::InsufficientData {
            usable: samples.len(),
        });
    }

    let slope = sxy / sxx;
    let intercept = mean_y - slope * mean_x;

    let mut ss_res = 0.0;
    let mut ss_tot = 0.0;
    let mut abs_err_sum = 0.0;
    for s in samples {
        let predicted = intercept + slope * s.log_population;
        let residual = s.log_visitors - predicted;
        ss_res += residual * residual;
        abs_err_sum += residual.abs();

        let dy = s.log_visitors - mean_y;
        ss_tot += dy * dy;
    }

    // Constant response with non-constant predictor fits exactly
    let r2 = if ss_tot > 0.0 { 1.0 - ss_res / ss_tot } else { 1.0 };

    Ok(RegressionArtifact {
        slope,
        intercept,
        r2,
        mae: abs_err_sum / n,
        rmse: (ss_res / n).sqrt(),
        sample_count: samples.len(),
        trained_at: Utc::now(),
    })
}

// ============================================================================
// ARTIFACT STORE
// ============================================================================

/// Atomically persist the artifact: write a temp file next to the target,
/// then rename over it, so a concurrent reader never observes a partial
/// write.
pub fn write_artifact(artifact: &RegressionArtifact, path: &Path) -> Result<(), ModelError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create model directory {}", parent.display()))?;
        }
    }

    let json = serde_json::to_string_pretty(artifact)
        .context("Failed to serialize regression artifact")?;

    let tmp_path = path.with_extension("json.tmp");
    fs::write(&tmp_path, json)
        .with_context(|| format!("Failed to write temp artifact {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path)
        .with_context(|| format!("Failed to move artifact into place at {}", path.display()))?;

    Ok(())
}

pub fn read_artifact(path: &Path) -> Result<RegressionArtifact, ModelError> {
    if !path.exists() {
        return Err(ModelError::ArtifactNotFound(path.to_path_buf()));
    }

    let text = fs::read_to_string(path)
        .with_context(|| format!("Failed to read artifact {}", path.display()))?;
    let artifact = serde_json::from_str(&text)
        .with_context(|| format!("Failed to parse artifact {}", path.display()))?;

    Ok(artifact)
}

// ============================================================================
// PREDICTOR
// ============================================================================

/// Predicted annual visitors (millions) for a city of the given population:
/// exp(intercept + slope * ln(population)).
pub fn predict(population: i64, artifact: &RegressionArtifact) -> Result<f64, ModelError> {
    if population <= 0 {
        return Err(ModelError::InvalidInput(population));
    }

    let log_population = (population as f64).ln();
    let log_visitors = artifact.intercept + artifact.slope * log_population;
    Ok(log_visitors.exp())
}

// ============================================================================
// SERVING CONTRACT - the three operations the HTTP layer consumes
// ============================================================================

/// Build features from the store, fit, and atomically persist the artifact.
pub fn train_and_persist(
    conn: &Connection,
    model_path: &Path,
    min_visitors: f64,
) -> Result<RegressionArtifact, ModelError> {
    let samples = build_features(conn, min_visitors)?;
    let artifact = fit(&samples)?;
    write_artifact(&artifact, model_path)?;
    Ok(artifact)
}

/// Load the current artifact and predict from a population figure.
pub fn predict_from_population(model_path: &Path, population: i64) -> Result<f64, ModelError> {
    // Reject bad input before touching the artifact
    if population <= 0 {
        return Err(ModelError::InvalidInput(population));
    }

    let artifact = read_artifact(model_path)?;
    predict(population, &artifact)
}

/// Current fit parameters and quality metrics, read from the artifact.
pub fn metrics(model_path: &Path) -> Result<RegressionArtifact, ModelError> {
    read_artifact(model_path)
}

/// Open (and initialize) the SQLite store at `db_path`.
pub fn open_store(db_path: &Path) -> Result<Connection, ModelError> {
    if let Some(parent) = db_path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create data directory {}", parent.display()))?;
        }
    }
    let conn = Connection::open(db_path)
        .with_context(|| format!("Failed to open database {}", db_path.display()))?;
    setup_database(&conn)?;
    Ok(conn)
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{setup_database, upsert_museum};
    use crate::harmonize::HarmonizedMuseumRecord;

    fn sample(population: f64, visitors: f64) -> TrainingSample {
        TrainingSample {
            log_population: population.ln(),
            log_visitors: visitors.ln(),
        }
    }

    #[test]
    fn test_fit_recovers_collinear_power_law() {
        // visitors = 2 * population^1.5 exactly: slope 1.5, intercept ln(2)
        let samples: Vec<TrainingSample> = [10.0f64, 100.0, 1_000.0, 10_000.0]
            .iter()
            .map(|&p| sample(p, 2.0 * p.powf(1.5)))
            .collect();

        let artifact = fit(&samples).unwrap();
        assert!((artifact.slope - 1.5).abs() < 1e-9);
        assert!((artifact.intercept - 2.0f64.ln()).abs() < 1e-9);
        assert!((artifact.r2 - 1.0).abs() < 1e-9);
        assert!(artifact.mae < 1e-9);
        assert_eq!(artifact.sample_count, 4);
    }

    #[test]
    fn test_fit_one_sample_is_insufficient() {
        let samples = vec![sample(1_000_000.0, 1.0)];
        let err = fit(&samples).unwrap_err();
        assert!(matches!(err, ModelError::InsufficientData { usable: 1 }));
    }

    #[test]
    fn test_fit_empty_is_insufficient() {
        let err = fit(&[]).unwrap_err();
        assert!(matches!(err, ModelError::InsufficientData { usable: 0 }));
    }

    #[test]
    fn test_fit_identical_populations_is_insufficient() {
        let samples = vec![
            sample(1_000_000.0, 1.0),
            sample(1_000_000.0, 2.0),
            sample(1_000_000.0, 3.0),
        ];
        let err = fit(&samples).unwrap_err();
        assert!(matches!(err, ModelError::InsufficientData { usable: 3 }));
    }

    #[test]
    fn test_predict_rejects_nonpositive_population() {
        let artifact = fit(&[sample(1_000_000.0, 1.0), sample(4_000_000.0, 3.0)]).unwrap();

        assert!(matches!(
            predict(0, &artifact),
            Err(ModelError::InvalidInput(0))
        ));
        assert!(matches!(
            predict(-5, &artifact),
            Err(ModelError::InvalidInput(-5))
        ));
    }

    #[test]
    fn test_predict_is_nonnegative() {
        let artifact = fit(&[sample(1_000_000.0, 0.001), sample(4_000_000.0, 0.002)]).unwrap();
        let predicted = predict(10, &artifact).unwrap();
        assert!(predicted >= 0.0);
    }

    #[test]
    fn test_artifact_roundtrip_is_bit_identical() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("model.json");

        let artifact = fit(&[
            sample(1_000_000.0, 1.0),
            sample(2_000_000.0, 1.8),
            sample(4_000_000.0, 3.0),
        ])
        .unwrap();

        write_artifact(&artifact, &path).unwrap();
        let loaded = read_artifact(&path).unwrap();

        // serde_json round-trips f64 exactly
        assert_eq!(loaded, artifact);
        // No leftover temp file from the atomic write
        assert!(!dir.path().join("model.json.tmp").exists());
    }

    #[test]
    fn test_missing_artifact_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent.json");

        assert!(matches!(
            read_artifact(&path),
            Err(ModelError::ArtifactNotFound(_))
        ));
        assert!(matches!(
            predict_from_population(&path, 1_000_000),
            Err(ModelError::ArtifactNotFound(_))
        ));
        assert!(matches!(
            metrics(&path),
            Err(ModelError::ArtifactNotFound(_))
        ));
    }

    #[test]
    fn test_predict_checks_input_before_artifact() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent.json");

        // Bad input wins even when no model exists
        assert!(matches!(
            predict_from_population(&path, -1),
            Err(ModelError::InvalidInput(-1))
        ));
    }

    #[test]
    fn test_retraining_replaces_artifact_wholesale() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("model.json");

        let first = fit(&[sample(1_000_000.0, 1.0), sample(4_000_000.0, 3.0)]).unwrap();
        write_artifact(&first, &path).unwrap();

        let second = fit(&[sample(1_000_000.0, 2.0), sample(4_000_000.0, 9.0)]).unwrap();
        write_artifact(&second, &path).unwrap();

        let loaded = read_artifact(&path).unwrap();
        assert_eq!(loaded, second);
        assert_ne!(loaded.slope, first.slope);
    }

    fn stored_record(name: &str, visitors: f64, population: i64) -> HarmonizedMuseumRecord {
        HarmonizedMuseumRecord {
            name: name.to_string(),
            location: "Testland Testville".to_string(),
            country: Some("Testland".to_string()),
            city: Some("Testville".to_string()),
            visitors_millions: Some(visitors),
            raw_visitors_str: None,
            rank: None,
            year: None,
            coordinates: None,
            museum_type: None,
            matched_city: Some("Testville".to_string()),
            city_population: Some(population),
            match_score: Some(1.0),
        }
    }

    #[test]
    fn test_end_to_end_train_then_predict() {
        let conn = Connection::open_in_memory().unwrap();
        setup_database(&conn).unwrap();

        upsert_museum(&conn, &stored_record("Museum A", 1.0, 1_000_000)).unwrap();
        upsert_museum(&conn, &stored_record("Museum B", 1.8, 2_000_000)).unwrap();
        upsert_museum(&conn, &stored_record("Museum C", 3.0, 4_000_000)).unwrap();

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("model.json");

        let artifact = train_and_persist(&conn, &path, 0.0).unwrap();
        assert!(artifact.slope > 0.0);
        assert_eq!(artifact.sample_count, 3);

        // Least-squares over all three points, so close but not exact
        let predicted = predict_from_population(&path, 2_000_000).unwrap();
        assert!((predicted - 1.8).abs() < 0.1);

        let metrics = metrics(&path).unwrap();
        assert_eq!(metrics, artifact);
    }

    #[test]
    fn test_train_with_empty_store_is_insufficient() {
        let conn = Connection::open_in_memory().unwrap();
        setup_database(&conn).unwrap();

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("model.json");

        let err = train_and_persist(&conn, &path, 0.0).unwrap_err();
        assert!(matches!(err, ModelError::InsufficientData { usable: 0 }));
        // Failed training must not leave an artifact behind
        assert!(!path.exists());
    }
}
