use thiserror::Error;

/// Errors raised by grids, viewports and the view.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AnalyticsError {
    #[error("Cell ({row}, {col}) is outside the grid bounds ({rows} rows, {cols} columns)")]
    InvalidViewport {
        row: usize,
        col: usize,
        rows: usize,
        cols: usize,
    },

    #[error("{kind} ID {id} is already in use")]
    DuplicateId { kind: &'static str, id: i32 },

    #[error("No computation target for {0}")]
    NoTarget(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("No value available for {0}")]
    MissingValue(String),

    #[error("View compilation failed: {0}")]
    CompilationFailed(String),

    #[error("View lock poisoned by an earlier panic")]
    LockPoisoned,
}

impl AnalyticsError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidViewport { .. } => "INVALID_VIEWPORT",
            Self::DuplicateId { .. } => "DUPLICATE_ID",
            Self::NoTarget(_) => "NO_TARGET",
            Self::NotFound(_) => "NOT_FOUND",
            Self::MissingValue(_) => "MISSING_VALUE",
            Self::CompilationFailed(_) => "COMPILATION_FAILED",
            Self::LockPoisoned => "LOCK_POISONED",
        }
    }

    pub fn viewport_not_found(id: i32) -> Self {
        Self::NotFound(format!("viewport {}", id))
    }

    pub fn graph_not_found(id: i32) -> Self {
        Self::NotFound(format!("dependency graph {}", id))
    }
}

pub type Result<T> = std::result::Result<T, AnalyticsError>;
