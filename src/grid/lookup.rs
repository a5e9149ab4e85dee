use super::column::ColumnSpecification;
use crate::types::{CompiledViewDefinition, ObjectId, TargetSpec, ValueRequirement, ValueSpecification};
use std::sync::Arc;

/// A grid row: what it is about and what to call it.
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    pub target: TargetSpec,
    pub name: String,
    /// The single trade of an OTC position row.
    pub trade_id: Option<ObjectId>,
}

impl Row {
    pub fn new(target: TargetSpec, name: &str) -> Self {
        Self {
            target,
            name: name.to_string(),
            trade_id: None,
        }
    }
}

/// Resolves cells to the computed values they show.
#[derive(Debug, Clone)]
pub struct TargetLookup {
    compiled: Arc<CompiledViewDefinition>,
    rows: Vec<Row>,
}

impl TargetLookup {
    pub fn new(compiled: Arc<CompiledViewDefinition>, rows: Vec<Row>) -> Self {
        Self { compiled, rows }
    }

    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    pub fn row(&self, index: usize) -> Option<&Row> {
        self.rows.get(index)
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn compiled(&self) -> &Arc<CompiledViewDefinition> {
        &self.compiled
    }

    /// Requirement a cell asks the engine for.
    pub fn requirement_for_cell(&self, row: usize, spec: &ColumnSpecification) -> Option<(String, ValueRequirement)> {
        let target = self.rows.get(row)?.target.clone();
        Some((
            spec.calc_config.clone(),
            ValueRequirement::new(&spec.value_name, target, spec.constraints.clone()),
        ))
    }

    /// Specification the engine resolved the cell's requirement to. `None` if
    /// the engine computes nothing for the cell.
    pub fn target_for_cell(&self, row: usize, spec: &ColumnSpecification) -> Option<(String, ValueSpecification)> {
        let (calc_config, requirement) = self.requirement_for_cell(row, spec)?;
        let value_spec = self
            .compiled
            .value_mappings
            .value_specification(&calc_config, &requirement)?
            .clone();
        Some((calc_config, value_spec))
    }

    /// Every resolved cell in a column.
    pub fn targets_for_column<'a>(
        &'a self,
        spec: &'a ColumnSpecification,
    ) -> impl Iterator<Item = (String, ValueSpecification)> + 'a {
        (0..self.rows.len()).filter_map(move |row| self.target_for_cell(row, spec))
    }
}
