// ❗ Error Taxonomy - Typed failures for training and prediction
//
// "No match" during harmonization is NOT an error - the matcher returns a
// normal no-match result. Only training and prediction raise typed errors,
// and the caller (CLI or HTTP layer) decides how to present them.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ModelError {
    /// Fewer than 2 usable samples, or every sample has the same population.
    /// Fatal to the training run, never a silent degenerate fit.
    #[error("insufficient training data: {usable} usable sample(s), need at least 2 with distinct populations")]
    InsufficientData { usable: usize },

    /// Non-positive population handed to the predictor.
    #[error("population must be positive, got {0}")]
    InvalidInput(i64),

    /// No trained model on disk. The serving layer maps this to "not ready".
    #[error("model artifact not found at {}; run training first", .0.display())]
    ArtifactNotFound(PathBuf),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl ModelError {
    /// True for errors the caller caused (bad input, nothing trained yet),
    /// as opposed to internal failures.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            ModelError::InvalidInput(_) | ModelError::ArtifactNotFound(_)
        )
    }
}
