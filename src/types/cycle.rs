//! Per-cycle output of the computation engine.

use super::{Value, ValueSpecification};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Severity of an execution log entry.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogLevel {
    #[default]
    Info,
    Warn,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEvent {
    pub level: LogLevel,
    pub message: String,
}

/// What happened while one value was computed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionLog {
    pub events: Vec<LogEvent>,
    pub exception: Option<String>,
}

impl ExecutionLog {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn with_event(mut self, level: LogLevel, message: &str) -> Self {
        self.events.push(LogEvent {
            level,
            message: message.to_string(),
        });
        self
    }

    pub fn with_exception(mut self, exception: &str) -> Self {
        self.exception = Some(exception.to_string());
        self
    }

    /// Highest severity in the log; an exception counts as an error.
    pub fn level(&self) -> LogLevel {
        let event_level = self.events.iter().map(|e| e.level).max().unwrap_or_default();
        if self.exception.is_some() {
            LogLevel::Error
        } else {
            event_level
        }
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty() && self.exception.is_none()
    }
}

/// Log summary attached to a cell. The full logs are only included when the
/// viewport asked for them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AggregatedExecutionLog {
    pub level: LogLevel,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub logs: Option<Vec<ExecutionLog>>,
}

impl AggregatedExecutionLog {
    pub fn from_log(log: &ExecutionLog, include_logs: bool) -> Self {
        Self {
            level: log.level(),
            logs: include_logs.then(|| vec![log.clone()]),
        }
    }
}

/// One computed value.
#[derive(Debug, Clone, PartialEq)]
pub struct ComputedValueResult {
    pub spec: ValueSpecification,
    pub value: Value,
    pub log: ExecutionLog,
}

impl ComputedValueResult {
    pub fn new(spec: ValueSpecification, value: Value) -> Self {
        Self {
            spec,
            value,
            log: ExecutionLog::empty(),
        }
    }

    pub fn with_log(mut self, log: ExecutionLog) -> Self {
        self.log = log;
        self
    }
}

/// Everything computed in one cycle, grouped by calculation configuration.
#[derive(Debug, Clone)]
pub struct ViewResultModel {
    pub cycle_id: u64,
    pub calculation_time: DateTime<Utc>,
    pub results: BTreeMap<String, Vec<ComputedValueResult>>,
}

impl ViewResultModel {
    pub fn new(cycle_id: u64) -> Self {
        Self {
            cycle_id,
            calculation_time: Utc::now(),
            results: BTreeMap::new(),
        }
    }

    pub fn add(&mut self, calc_config: &str, result: ComputedValueResult) {
        self.results
            .entry(calc_config.to_string())
            .or_default()
            .push(result);
    }

    pub fn len(&self) -> usize {
        self.results.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Handle on the engine cycle that produced the latest results.
///
/// Dependency graph grids use it to fetch intermediate values that are not
/// part of the terminal results.
pub trait ViewCycle: Send + Sync {
    fn cycle_id(&self) -> Option<u64>;

    fn query_values(&self, calc_config: &str, specs: &[ValueSpecification]) -> Vec<ComputedValueResult>;
}

/// Cycle used before the engine has produced anything.
#[derive(Debug, Clone, Copy, Default)]
pub struct EmptyViewCycle;

impl ViewCycle for EmptyViewCycle {
    fn cycle_id(&self) -> Option<u64> {
        None
    }

    fn query_values(&self, _calc_config: &str, _specs: &[ValueSpecification]) -> Vec<ComputedValueResult> {
        Vec::new()
    }
}
