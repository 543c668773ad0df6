use crate::rates::Category;
use std::path::PathBuf;
use thiserror::Error;

/// Everything that can stop a run before (or instead of) producing a number.
#[derive(Debug, Error)]
pub enum SimError {
    #[error("{field} must be a finite probability in [0, 1] (got {value})")]
    InvalidProbability { field: &'static str, value: f64 },

    #[error("{category} soft pity start {soft} exceeds hard pity {hard}")]
    SoftPityAfterHardPity {
        category: Category,
        soft: u32,
        hard: u32,
    },

    #[error("{category} hard pity must be at least 1")]
    ZeroHardPity { category: Category },

    #[error("starting {category} pity {pity} must be below hard pity {hard}")]
    StartingPityTooHigh {
        category: Category,
        pity: u32,
        hard: u32,
    },

    #[error("trial count must be positive")]
    ZeroTrials,

    #[error("no rate table for game '{0}'")]
    UnknownGame(String),

    #[error("cannot read config file {path}: {source}")]
    ConfigFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot parse config file {path}: {source}")]
    ConfigParse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("write failed: {0}")]
    Output(#[from] std::io::Error),

    #[error("cannot start worker pool: {0}")]
    PoolBuild(String),

    #[error("worker task failed: {0}")]
    WorkerPanic(String),

    #[error("run cancelled after {completed} trials")]
    Cancelled { completed: usize },
}

impl SimError {
    /// True for the configuration family: anything rejected before a trial runs.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            SimError::InvalidProbability { .. }
                | SimError::SoftPityAfterHardPity { .. }
                | SimError::ZeroHardPity { .. }
                | SimError::StartingPityTooHigh { .. }
                | SimError::ZeroTrials
                | SimError::UnknownGame(_)
                | SimError::ConfigFile { .. }
                | SimError::ConfigParse { .. }
        )
    }
}
