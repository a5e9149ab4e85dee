//! Client-facing viewport definitions and results.

use super::{AggregatedExecutionLog, Value, ValueType};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// The two top-level grids of a view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GridType {
    Portfolio,
    Primitives,
}

/// How much of each cell to render.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Format {
    /// Latest value only.
    #[default]
    Cell,
    /// Latest value plus history.
    History,
    /// Full value, e.g. every element of a vector.
    Expanded,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct GridCell {
    pub row: usize,
    pub col: usize,
}

impl GridCell {
    pub fn new(row: usize, col: usize) -> Self {
        Self { row, col }
    }
}

/// Cells a viewport covers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CellSelection {
    /// Every combination of the listed rows and columns.
    Rectangular { rows: Vec<usize>, columns: Vec<usize> },
    /// An explicit list of cells.
    Arbitrary { cells: Vec<GridCell> },
}

/// A node whose expanded state differs between two definitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChangedNode {
    pub row: usize,
    pub expanded: bool,
}

/// What a client wants to see. Replaced wholesale on every update.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ViewportDefinition {
    /// Client-side version, echoed back in results. Negative for the
    /// placeholder installed while a grid rebuilds.
    pub version: i64,
    pub selection: CellSelection,
    #[serde(default)]
    pub format: Format,
    #[serde(default)]
    pub enable_logging: bool,
}

impl ViewportDefinition {
    pub fn rectangular(version: i64, rows: Vec<usize>, columns: Vec<usize>, format: Format) -> Self {
        Self {
            version,
            selection: CellSelection::Rectangular { rows, columns },
            format,
            enable_logging: false,
        }
    }

    pub fn arbitrary(version: i64, cells: Vec<GridCell>, format: Format) -> Self {
        Self {
            version,
            selection: CellSelection::Arbitrary { cells },
            format,
            enable_logging: false,
        }
    }

    /// Valid definition covering no cells.
    pub fn empty() -> Self {
        Self::rectangular(-1, Vec::new(), Vec::new(), Format::Cell)
    }

    pub fn with_logging(mut self, enable_logging: bool) -> Self {
        self.enable_logging = enable_logging;
        self
    }

    /// Cells in row-major order for rectangular selections, request order otherwise.
    pub fn cells(&self) -> Vec<GridCell> {
        match &self.selection {
            CellSelection::Rectangular { rows, columns } => rows
                .iter()
                .flat_map(|&row| columns.iter().map(move |&col| GridCell::new(row, col)))
                .collect(),
            CellSelection::Arbitrary { cells } => cells.clone(),
        }
    }

    pub fn rows(&self) -> BTreeSet<usize> {
        match &self.selection {
            CellSelection::Rectangular { rows, .. } => rows.iter().copied().collect(),
            CellSelection::Arbitrary { cells } => cells.iter().map(|c| c.row).collect(),
        }
    }

    /// Detects a single node being expanded or collapsed between `previous`
    /// and `self`.
    ///
    /// Only rectangular definitions with the same columns and the same first
    /// row qualify. The first differing row index `i` points just past the
    /// toggled node at `i - 1`: if the new row there is further down, rows
    /// were hidden (collapsed), otherwise rows were revealed (expanded).
    /// A pure prefix change is scrolling or resizing.
    pub fn changed_node(&self, previous: &ViewportDefinition) -> Option<ChangedNode> {
        let (
            CellSelection::Rectangular { rows, columns },
            CellSelection::Rectangular {
                rows: prev_rows,
                columns: prev_columns,
            },
        ) = (&self.selection, &previous.selection)
        else {
            return None;
        };
        if columns != prev_columns || rows.is_empty() || prev_rows.is_empty() {
            return None;
        }
        if rows[0] != prev_rows[0] {
            return None;
        }
        let i = rows
            .iter()
            .zip(prev_rows)
            .position(|(new, old)| new != old)?;
        let node_row = rows[i - 1];
        Some(ChangedNode {
            row: node_row,
            expanded: rows[i] < prev_rows[i],
        })
    }
}

// =============================================================================
// Results
// =============================================================================

/// Whether a viewport has something new for its client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ViewportState {
    FreshData,
    Empty,
}

/// Everything a formatter needs to render one cell.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResultsCell {
    pub row: usize,
    pub col: usize,
    pub value: Value,
    pub value_type: ValueType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub history: Option<Vec<Value>>,
    pub updated: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub log: Option<AggregatedExecutionLog>,
    pub error: bool,
}

impl ResultsCell {
    /// Static cell such as a row label; never carries history or errors.
    pub fn label(row: usize, col: usize, text: &str) -> Self {
        Self {
            row,
            col,
            value: Value::Text(text.to_string()),
            value_type: ValueType::Text,
            history: None,
            updated: false,
            log: None,
            error: false,
        }
    }

    pub fn with_value(mut self, value: Value) -> Self {
        self.error = value.is_error();
        self.value = value;
        self
    }

    pub fn empty(row: usize, col: usize, value_type: ValueType) -> Self {
        Self {
            row,
            col,
            value: Value::not_available(),
            value_type,
            history: None,
            updated: false,
            log: None,
            error: false,
        }
    }
}

/// Materialized data for one viewport. Immutable once built.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ViewportResults {
    pub version: i64,
    pub format: Format,
    pub cells: Vec<ResultsCell>,
}

impl ViewportResults {
    pub fn empty(version: i64) -> Self {
        Self {
            version,
            format: Format::Cell,
            cells: Vec::new(),
        }
    }

    pub fn cell(&self, row: usize, col: usize) -> Option<&ResultsCell> {
        self.cells.iter().find(|c| c.row == row && c.col == col)
    }
}

// =============================================================================
// Addressing
// =============================================================================

/// A top-level grid or one of its dependency graph grids.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GridRef {
    pub grid_type: GridType,
    pub graph_id: Option<i32>,
}

impl GridRef {
    pub fn main(grid_type: GridType) -> Self {
        Self {
            grid_type,
            graph_id: None,
        }
    }

    pub fn graph(grid_type: GridType, graph_id: i32) -> Self {
        Self {
            grid_type,
            graph_id: Some(graph_id),
        }
    }
}

/// A viewport within a grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ViewportKey {
    pub grid: GridRef,
    pub viewport_id: i32,
}

impl ViewportKey {
    pub fn new(grid: GridRef, viewport_id: i32) -> Self {
        Self { grid, viewport_id }
    }
}

/// Root of a dependency graph grid.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum GraphSource {
    /// A cell of the parent grid, resolved through its target lookup.
    Cell { row: usize, col: usize },
    /// An explicit requirement in a calculation configuration.
    Requirement {
        calc_config: String,
        requirement: super::ValueRequirement,
    },
}

// =============================================================================
// Layout snapshots
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ColumnLayout {
    pub header: String,
    pub description: String,
    pub value_type: ValueType,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ColumnGroupLayout {
    pub name: String,
    pub columns: Vec<ColumnLayout>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeLayout {
    pub start_row: usize,
    pub end_row: usize,
    pub collapsed: bool,
    pub children: Vec<NodeLayout>,
}

/// Serializable description of a grid's rows, columns and tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GridLayout {
    pub row_count: usize,
    pub column_groups: Vec<ColumnGroupLayout>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub root: Option<NodeLayout>,
}

impl GridLayout {
    pub fn column_count(&self) -> usize {
        self.column_groups.iter().map(|g| g.columns.len()).sum()
    }
}
