//! Grids showing the computation steps behind one value.
//!
//! The dependency graph below the root value is flattened depth-first into
//! rows. Every step gets a row, but only the root and steps with inputs get a
//! tree node; leaf steps sit inside their parent's range.

use super::column::{CellRenderer, GraphColumn, GridColumn, GridColumnGroup, GridColumnGroups};
use super::node::{NodeBuilder, NodePath, NodeTree};
use super::structure::{render_result, GridStructure, RenderedCell};
use crate::services::{FunctionNames, ResultsCache};
use crate::types::{
    CompiledViewDefinition, DependencyGraph, Format, GridCell, ResultsCell, TargetSpec, ValueProperties,
    ValueRequirement, ValueSpecification, ValueType,
};
use std::collections::HashSet;

/// One computation step.
#[derive(Debug, Clone, PartialEq)]
pub struct GraphRow {
    pub target: TargetSpec,
    pub spec: ValueSpecification,
    /// Display name of the producing function, empty if nothing produces it.
    pub function: String,
    pub properties: ValueProperties,
}

#[derive(Debug, Clone)]
pub struct DependencyGraphGridStructure {
    calc_config: String,
    root_requirement: ValueRequirement,
    rows: Vec<GraphRow>,
    columns: GridColumnGroups,
    tree: NodeTree,
}

impl DependencyGraphGridStructure {
    /// Build from the root requirement alone so the grid can be rebuilt
    /// after a recompilation. An unresolvable root gives an empty grid.
    pub fn build(
        calc_config: &str,
        root_requirement: &ValueRequirement,
        compiled: &CompiledViewDefinition,
        functions: &FunctionNames,
    ) -> Self {
        let root_spec = compiled
            .value_mappings
            .value_specification(calc_config, root_requirement)
            .cloned();
        let empty_graph = DependencyGraph::new();
        let graph = compiled.dependency_graph(calc_config).unwrap_or(&empty_graph);

        let mut builder = GraphBuilder {
            graph,
            functions,
            rows: Vec::new(),
            in_progress: HashSet::new(),
        };
        let tree = root_spec
            .and_then(|spec| builder.visit(&spec, &Vec::new(), true))
            .map(NodeTree::build)
            .unwrap_or_default();

        Self {
            calc_config: calc_config.to_string(),
            root_requirement: root_requirement.clone(),
            rows: builder.rows,
            columns: graph_columns(),
            tree,
        }
    }

    pub fn calc_config(&self) -> &str {
        &self.calc_config
    }

    pub fn root_requirement(&self) -> &ValueRequirement {
        &self.root_requirement
    }

    pub fn row(&self, index: usize) -> Option<&GraphRow> {
        self.rows.get(index)
    }

    /// Every value shown in the grid, for fetching intermediate results.
    pub fn value_specs(&self) -> Vec<ValueSpecification> {
        self.rows.iter().map(|r| r.spec.clone()).collect()
    }
}

struct GraphBuilder<'a> {
    graph: &'a DependencyGraph,
    functions: &'a FunctionNames,
    rows: Vec<GraphRow>,
    in_progress: HashSet<ValueSpecification>,
}

impl GraphBuilder<'_> {
    fn visit(&mut self, spec: &ValueSpecification, parent_path: &NodePath, is_root: bool) -> Option<NodeBuilder> {
        let graph = self.graph;
        let producer = graph.node_producing(spec);
        let function_id = producer
            .map(|node| node.function_id.as_str())
            .or_else(|| spec.function_id());

        let mut path = parent_path.clone();
        path.push(spec.to_string());
        let mut node = NodeBuilder::new(path.clone(), self.rows.len());
        self.rows.push(GraphRow {
            target: spec.target.clone(),
            spec: spec.clone(),
            function: function_id
                .map(|id| self.functions.display_name(id))
                .unwrap_or_default(),
            properties: spec.properties.clone(),
        });

        let inputs = producer.map(|n| n.inputs.as_slice()).unwrap_or_default();
        self.in_progress.insert(spec.clone());
        for input in inputs {
            // malformed graphs can be cyclic
            if self.in_progress.contains(input) {
                continue;
            }
            if let Some(child) = self.visit(input, &path, false) {
                node.children.push(child);
            }
        }
        self.in_progress.remove(spec);

        node.end_row = self.rows.len() - 1;
        (is_root || !inputs.is_empty()).then_some(node)
    }
}

fn graph_columns() -> GridColumnGroups {
    let column = |header: &str, value_type: ValueType, kind: GraphColumn| {
        GridColumn::fixed(header, value_type, CellRenderer::DependencyGraph(kind))
    };
    GridColumnGroups::new(vec![
        GridColumnGroup::new(
            "fixed",
            vec![column("Target", ValueType::Text, GraphColumn::Target)],
            false,
        ),
        GridColumnGroup::new(
            "",
            vec![
                column("Type", ValueType::Text, GraphColumn::TargetType),
                column("Value Name", ValueType::Text, GraphColumn::ValueName),
                column("Value", ValueType::Unknown, GraphColumn::Value),
                column("Function", ValueType::Text, GraphColumn::Function),
                column("Properties", ValueType::Text, GraphColumn::Properties),
            ],
            false,
        ),
    ])
}

impl GridStructure for DependencyGraphGridStructure {
    fn row_count(&self) -> usize {
        self.rows.len()
    }

    fn columns(&self) -> &GridColumnGroups {
        &self.columns
    }

    fn tree(&self) -> &NodeTree {
        &self.tree
    }

    fn render(&self, cell: GridCell, cache: &ResultsCache, format: Format, logging: bool) -> RenderedCell {
        let (Some(row), Some(column)) = (self.rows.get(cell.row), self.columns.column(cell.col)) else {
            return RenderedCell::fixed(ResultsCell::empty(cell.row, cell.col, ValueType::Unknown));
        };
        let CellRenderer::DependencyGraph(kind) = &column.renderer else {
            return RenderedCell::fixed(ResultsCell::empty(cell.row, cell.col, column.value_type));
        };
        let text = |s: String| RenderedCell::fixed(ResultsCell::label(cell.row, cell.col, &s));
        match kind {
            GraphColumn::Target => text(row.target.id.to_string()),
            GraphColumn::TargetType => text(row.target.kind.label().to_string()),
            GraphColumn::ValueName => text(row.spec.value_name.clone()),
            GraphColumn::Function => text(row.function.clone()),
            GraphColumn::Properties => text(row.properties.to_string()),
            GraphColumn::Value => {
                let result = cache.result(&self.calc_config, &row.spec, ValueType::Unknown);
                render_result(cell, result, column, format, logging, None)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{DependencyNode, Value, ViewDefinition, FUNCTION_PROPERTY};

    fn spec(name: &str) -> ValueSpecification {
        ValueSpecification::new(name, TargetSpec::position("p1"), ValueProperties::new())
    }

    fn node(function: &str, output: &str, inputs: &[&str]) -> DependencyNode {
        DependencyNode {
            function_id: function.to_string(),
            target: TargetSpec::position("p1"),
            inputs: inputs.iter().map(|n| spec(n)).collect(),
            outputs: vec![spec(output)],
        }
    }

    fn compiled(nodes: Vec<DependencyNode>) -> CompiledViewDefinition {
        let mut compiled = CompiledViewDefinition::new(ViewDefinition::new("view"));
        compiled.value_mappings.insert(
            "Default",
            ValueRequirement::new("PV", TargetSpec::position("p1"), ValueProperties::new()),
            spec("PV"),
        );
        let mut graph = DependencyGraph::new();
        for n in nodes {
            graph.add_node(n);
        }
        compiled.graphs.insert("Default".to_string(), graph);
        compiled
    }

    fn root_req() -> ValueRequirement {
        ValueRequirement::new("PV", TargetSpec::position("p1"), ValueProperties::new())
    }

    #[test]
    fn test_root_without_inputs_is_single_row_node() {
        let compiled = compiled(vec![node("pv-fn", "PV", &[])]);
        let grid = DependencyGraphGridStructure::build("Default", &root_req(), &compiled, &FunctionNames::default());
        assert_eq!(grid.row_count(), 1);
        let root = grid.tree().root().unwrap();
        assert_eq!((root.start_row, root.end_row), (0, 0));
        assert!(root.children.is_empty());
    }

    #[test]
    fn test_leaves_are_rows_but_not_nodes() {
        // PV <- (Curve <- Rate), Spot
        let compiled = compiled(vec![
            node("pv-fn", "PV", &["Curve", "Spot"]),
            node("curve-fn", "Curve", &["Rate"]),
            node("rate-fn", "Rate", &[]),
            node("spot-fn", "Spot", &[]),
        ]);
        let grid = DependencyGraphGridStructure::build("Default", &root_req(), &compiled, &FunctionNames::default());

        let names: Vec<&str> = (0..grid.row_count())
            .map(|i| grid.row(i).unwrap().spec.value_name.as_str())
            .collect();
        assert_eq!(names, vec!["PV", "Curve", "Rate", "Spot"]);

        let tree = grid.tree();
        assert_eq!(tree.len(), 2);
        let root = tree.root().unwrap();
        assert_eq!((root.start_row, root.end_row), (0, 3));
        let curve = tree.node(root.children[0]).unwrap();
        assert_eq!((curve.start_row, curve.end_row), (1, 2));
        assert!(tree.is_well_formed());
    }

    #[test]
    fn test_missing_producer_renders_leaf_row() {
        let compiled = compiled(vec![node("pv-fn", "PV", &["Market Price"])]);
        let grid = DependencyGraphGridStructure::build("Default", &root_req(), &compiled, &FunctionNames::default());
        assert_eq!(grid.row_count(), 2);
        assert_eq!(grid.row(1).unwrap().function, "");
    }

    #[test]
    fn test_cycles_are_cut() {
        let compiled = compiled(vec![node("pv-fn", "PV", &["A"]), node("a-fn", "A", &["PV"])]);
        let grid = DependencyGraphGridStructure::build("Default", &root_req(), &compiled, &FunctionNames::default());
        assert_eq!(grid.row_count(), 2);
    }

    #[test]
    fn test_function_names_and_fallback() {
        let compiled = compiled(vec![node("pv-fn", "PV", &["Spot"]), node("spot-fn", "Spot", &[])]);
        let functions = FunctionNames::default();
        functions.register("pv-fn", "Present Value");
        let grid = DependencyGraphGridStructure::build("Default", &root_req(), &compiled, &functions);

        let cache = ResultsCache::with_capacity(5);
        let function_col = 4;
        let root = grid.render(GridCell::new(0, function_col), &cache, Format::Cell, false);
        let leaf = grid.render(GridCell::new(1, function_col), &cache, Format::Cell, false);
        assert_eq!(root.cell.value, Value::Text("Present Value".into()));
        assert_eq!(leaf.cell.value, Value::Text("spot-fn".into()));
    }

    #[test]
    fn test_function_from_spec_property_without_producer() {
        let mut compiled = compiled(vec![]);
        let with_fn = ValueSpecification::new(
            "PV",
            TargetSpec::position("p1"),
            ValueProperties::new().with(FUNCTION_PROPERTY, "engine-pv"),
        );
        compiled.value_mappings.insert("Default", root_req(), with_fn);
        let grid = DependencyGraphGridStructure::build("Default", &root_req(), &compiled, &FunctionNames::default());
        assert_eq!(grid.row(0).unwrap().function, "engine-pv");
    }

    #[test]
    fn test_unresolved_root_gives_empty_grid() {
        let compiled = compiled(vec![]);
        let other = ValueRequirement::new("Delta", TargetSpec::position("p1"), ValueProperties::new());
        let grid = DependencyGraphGridStructure::build("Default", &other, &compiled, &FunctionNames::default());
        assert_eq!(grid.row_count(), 0);
        assert!(grid.tree().is_empty());
        assert_eq!(grid.column_count(), 6);
    }
}
