// Museum Attendance Pipeline - Core Library
// Exposes all modules for use in the CLI, API server, and tests

pub mod db;
pub mod error;
pub mod features;
pub mod harmonize;
pub mod matcher;
pub mod model;
pub mod parser;
pub mod population;

// Re-export commonly used types
pub use db::{
    fetch_training_rows, get_all_museums, setup_database, upsert_museum, upsert_museums,
    verify_count, TrainingRow,
};
pub use error::ModelError;
pub use features::{build_features, samples_from_rows, TrainingSample};
pub use harmonize::{harmonize, visitors_in_millions, HarmonizedMuseumRecord, RawMuseumRecord};
pub use matcher::{CityMatcher, MatchResult, MATCH_THRESHOLD};
pub use model::{
    fit, metrics, open_store, predict, predict_from_population, read_artifact, train_and_persist,
    write_artifact, RegressionArtifact, DEFAULT_MIN_VISITORS_MILLIONS,
};
pub use parser::{load_wikitext, parse_museum_table, DiscardedRow};
pub use population::{normalize_key, PopulationEntry, PopulationIndex};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default locations for the SQLite store and the model artifact,
/// relative to the working directory.
pub const DEFAULT_DB_PATH: &str = "data/museums.sqlite";
pub const DEFAULT_MODEL_PATH: &str = "models/visitors_population_linreg.json";
