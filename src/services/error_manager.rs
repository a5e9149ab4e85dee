use crate::error::{AnalyticsError, Result};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::warn;

/// A captured failure, kept until the client deletes it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorInfo {
    pub id: u64,
    pub code: String,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

/// Append-only store of errors raised by the view.
pub struct ErrorManager {
    callback_id: String,
    errors: DashMap<u64, ErrorInfo>,
    next_id: AtomicU64,
}

impl ErrorManager {
    pub fn new(callback_id: &str) -> Arc<Self> {
        Arc::new(Self {
            callback_id: callback_id.to_string(),
            errors: DashMap::new(),
            next_id: AtomicU64::new(0),
        })
    }

    /// Callback ID clients listen on for error notifications.
    pub fn callback_id(&self) -> &str {
        &self.callback_id
    }

    /// Record an error and return the callback ID to notify.
    pub fn add(&self, error: &AnalyticsError) -> String {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        warn!("Recording error {} [{}]: {}", id, error.code(), error);
        self.errors.insert(
            id,
            ErrorInfo {
                id,
                code: error.code().to_string(),
                message: error.to_string(),
                timestamp: Utc::now(),
            },
        );
        self.callback_id.clone()
    }

    /// All recorded errors, oldest first.
    pub fn errors(&self) -> Vec<ErrorInfo> {
        let mut errors: Vec<ErrorInfo> = self.errors.iter().map(|e| e.value().clone()).collect();
        errors.sort_by_key(|e| e.id);
        errors
    }

    pub fn delete(&self, id: u64) -> Result<()> {
        self.errors
            .remove(&id)
            .map(|_| ())
            .ok_or_else(|| AnalyticsError::NotFound(format!("error {}", id)))
    }

    pub fn len(&self) -> usize {
        self.errors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }
}
