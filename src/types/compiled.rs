//! Compiled view definition as handed over by the computation engine.
//!
//! This is the row/column source of truth after every structural
//! recompilation. Nothing here is computed locally.

use super::{TargetSpec, ValueProperties, ValueRequirement, ValueSpecification, ValueType};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

/// A column explicitly requested in a calculation configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ColumnDefinition {
    pub header: String,
    pub value_name: String,
    #[serde(default)]
    pub constraints: ValueProperties,
}

impl ColumnDefinition {
    pub fn new(header: &str, value_name: &str, constraints: ValueProperties) -> Self {
        Self {
            header: header.to_string(),
            value_name: value_name.to_string(),
            constraints,
        }
    }
}

/// One named set of outputs the engine computes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CalculationConfiguration {
    pub name: String,
    #[serde(default)]
    pub columns: Vec<ColumnDefinition>,
    /// Value names (plus constraints) computed for every portfolio row.
    #[serde(default)]
    pub portfolio_requirements: Vec<(String, ValueProperties)>,
    /// Values on targets outside the portfolio.
    #[serde(default)]
    pub specific_requirements: Vec<ValueRequirement>,
}

impl CalculationConfiguration {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            ..Default::default()
        }
    }
}

/// The view the engine was asked to compute.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ViewDefinition {
    pub name: String,
    pub calculation_configurations: Vec<CalculationConfiguration>,
    /// Declared result type for each value name.
    #[serde(default)]
    pub value_types: BTreeMap<String, ValueType>,
}

impl ViewDefinition {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            ..Default::default()
        }
    }

    /// Declared type for a value name, `Unknown` if the engine didn't say.
    pub fn value_type(&self, value_name: &str) -> ValueType {
        self.value_types
            .get(value_name)
            .copied()
            .unwrap_or(ValueType::Unknown)
    }
}

/// Resolution of requirements to the specifications that satisfy them.
#[derive(Debug, Clone, Default)]
pub struct ValueMappings {
    by_config: HashMap<String, HashMap<ValueRequirement, ValueSpecification>>,
}

impl ValueMappings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, calc_config: &str, requirement: ValueRequirement, spec: ValueSpecification) {
        self.by_config
            .entry(calc_config.to_string())
            .or_default()
            .insert(requirement, spec);
    }

    pub fn value_specification(
        &self,
        calc_config: &str,
        requirement: &ValueRequirement,
    ) -> Option<&ValueSpecification> {
        self.by_config.get(calc_config)?.get(requirement)
    }

    pub fn len(&self) -> usize {
        self.by_config.values().map(HashMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// One computation step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DependencyNode {
    pub function_id: String,
    pub target: TargetSpec,
    pub inputs: Vec<ValueSpecification>,
    pub outputs: Vec<ValueSpecification>,
}

/// Dependency graph of one calculation configuration.
#[derive(Debug, Clone, Default)]
pub struct DependencyGraph {
    nodes: Vec<DependencyNode>,
    producers: HashMap<ValueSpecification, usize>,
}

impl DependencyGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_node(&mut self, node: DependencyNode) {
        let index = self.nodes.len();
        for output in &node.outputs {
            self.producers.insert(output.clone(), index);
        }
        self.nodes.push(node);
    }

    /// Node whose outputs include `spec`.
    pub fn node_producing(&self, spec: &ValueSpecification) -> Option<&DependencyNode> {
        self.producers.get(spec).map(|&i| &self.nodes[i])
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

/// A view definition after engine compilation.
#[derive(Debug, Clone, Default)]
pub struct CompiledViewDefinition {
    pub view_definition: ViewDefinition,
    pub value_mappings: ValueMappings,
    pub graphs: HashMap<String, DependencyGraph>,
}

impl CompiledViewDefinition {
    pub fn new(view_definition: ViewDefinition) -> Self {
        Self {
            view_definition,
            ..Default::default()
        }
    }

    pub fn dependency_graph(&self, calc_config: &str) -> Option<&DependencyGraph> {
        self.graphs.get(calc_config)
    }
}
