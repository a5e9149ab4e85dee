//! Tessera - live analytics grids with viewport change tracking and push updates

pub mod config;
pub mod error;
pub mod grid;
pub mod push;
pub mod services;
pub mod simulation;
pub mod types;
pub mod view;

// Re-export commonly used types
pub use error::{AnalyticsError, Result};
pub use types::*;
pub use view::{build_chain, AnalyticsView, SimpleAnalyticsView, ViewSettings, ViewStatus};
