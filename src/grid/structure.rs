//! Row/column layout of the main portfolio and primitives grids.
//!
//! Structures are immutable. Every change builds a new instance; callers hold
//! them behind `Arc` so unchanged structures can be detected by pointer.

use super::column::{CellRenderer, ColumnKey, ColumnSpecification, GridColumn, GridColumnGroup, GridColumnGroups};
use super::inliner::{self, InlineMeta};
use super::lookup::{Row, TargetLookup};
use super::node::{NodeBuilder, NodePath, NodeTree};
use crate::error::{AnalyticsError, Result};
use crate::services::{CachedResult, ResultsCache};
use crate::types::{
    AggregatedExecutionLog, CompiledViewDefinition, Entity, Format, GridCell, GridLayout, GridType,
    Portfolio, PortfolioNode, ResultsCell, TargetKind, TargetSpec, Value, ValueRequirement, ValueType,
    ViewDefinition,
};
use std::collections::HashSet;
use std::sync::Arc;

/// A rendered cell plus the update ID of the data behind it.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderedCell {
    pub cell: ResultsCell,
    pub last_changed: u64,
}

impl RenderedCell {
    pub fn fixed(cell: ResultsCell) -> Self {
        Self {
            cell,
            last_changed: 0,
        }
    }
}

/// Shared behaviour of every grid layout.
pub trait GridStructure: Send + Sync {
    fn row_count(&self) -> usize;

    fn columns(&self) -> &GridColumnGroups;

    fn column_count(&self) -> usize {
        self.columns().column_count()
    }

    /// Expandable row tree, empty for flat grids.
    fn tree(&self) -> &NodeTree;

    fn render(&self, cell: GridCell, cache: &ResultsCache, format: Format, logging: bool) -> RenderedCell;

    fn contains(&self, cell: GridCell) -> bool {
        cell.row < self.row_count() && cell.col < self.column_count()
    }

    fn layout(&self) -> GridLayout {
        GridLayout {
            row_count: self.row_count(),
            column_groups: self.columns().layout(),
            root: self.tree().to_layout(),
        }
    }
}

/// Turns a cached result into a client cell.
pub(crate) fn render_result(
    cell: GridCell,
    result: CachedResult,
    column: &GridColumn,
    format: Format,
    logging: bool,
    inline: Option<&str>,
) -> RenderedCell {
    let value = match inline {
        Some(label) => inliner::inline_value(&result.value, label),
        None => result.value,
    };
    let history = (format == Format::History && !result.history.is_empty()).then(|| match inline {
        Some(label) => result
            .history
            .iter()
            .map(|v| inliner::inline_value(v, label))
            .collect(),
        None => result.history,
    });
    let value_type = if column.value_type == ValueType::Unknown {
        result.value_type
    } else {
        column.value_type
    };
    RenderedCell {
        cell: ResultsCell {
            row: cell.row,
            col: cell.col,
            error: value.is_error(),
            value,
            value_type,
            history,
            updated: result.updated,
            log: result
                .log
                .as_ref()
                .map(|log| AggregatedExecutionLog::from_log(log, logging)),
        },
        last_changed: result.last_changed,
    }
}

// =============================================================================
// Main grids
// =============================================================================

type SpecGroup = (String, Vec<(ColumnSpecification, ValueType)>);

/// Layout of the portfolio or primitives grid.
#[derive(Debug, Clone)]
pub struct MainGridStructure {
    grid_type: GridType,
    spec_groups: Vec<SpecGroup>,
    inline_meta: InlineMeta,
    columns: GridColumnGroups,
    lookup: TargetLookup,
    tree: NodeTree,
}

impl MainGridStructure {
    /// Structure with no rows or analytics columns, used before the first compilation.
    pub fn empty(grid_type: GridType) -> Self {
        Self::assemble(
            grid_type,
            Vec::new(),
            InlineMeta::new(),
            TargetLookup::new(Arc::new(CompiledViewDefinition::default()), Vec::new()),
            NodeTree::empty(),
        )
    }

    pub fn portfolio(portfolio: Option<&Portfolio>, compiled: Arc<CompiledViewDefinition>) -> Self {
        let spec_groups = portfolio_specs(&compiled.view_definition);
        let (rows, tree) = portfolio_rows(portfolio);
        Self::assemble(
            GridType::Portfolio,
            spec_groups,
            InlineMeta::new(),
            TargetLookup::new(compiled, rows),
            tree,
        )
    }

    /// One row per distinct target of the specific requirements.
    pub fn primitives(compiled: Arc<CompiledViewDefinition>) -> Self {
        let spec_groups = primitive_specs(&compiled.view_definition);
        let rows = primitive_rows(&compiled.view_definition);
        Self::assemble(
            GridType::Primitives,
            spec_groups,
            InlineMeta::new(),
            TargetLookup::new(compiled, rows),
            NodeTree::empty(),
        )
    }

    fn assemble(
        grid_type: GridType,
        spec_groups: Vec<SpecGroup>,
        inline_meta: InlineMeta,
        lookup: TargetLookup,
        tree: NodeTree,
    ) -> Self {
        let columns = build_columns(grid_type, &spec_groups, &inline_meta);
        Self {
            grid_type,
            spec_groups,
            inline_meta,
            columns,
            lookup,
            tree,
        }
    }

    /// Rebuild the rows from a new portfolio, keeping the columns.
    pub fn with_updated_rows(&self, portfolio: Option<&Portfolio>) -> Self {
        if self.grid_type == GridType::Primitives {
            return self.clone();
        }
        let (rows, tree) = portfolio_rows(portfolio);
        Self::assemble(
            self.grid_type,
            self.spec_groups.clone(),
            // inlined columns stay until the next cycle re-reads the labels
            self.inline_meta.clone(),
            TargetLookup::new(Arc::clone(self.lookup.compiled()), rows),
            tree,
        )
    }

    /// Rebuild rows and columns after a recompilation.
    pub fn with_updated_structure(&self, compiled: Arc<CompiledViewDefinition>, portfolio: Option<&Portfolio>) -> Self {
        match self.grid_type {
            GridType::Portfolio => Self::portfolio(portfolio, compiled),
            GridType::Primitives => Self::primitives(compiled),
        }
    }

    /// Recompute inlined columns from the cache. Returns the same `Arc` when
    /// the inline metadata hasn't changed.
    pub fn with_updated_columns(self: &Arc<Self>, cache: &ResultsCache) -> Arc<Self> {
        let specs = self
            .spec_groups
            .iter()
            .flat_map(|(_, specs)| specs.iter().map(|(spec, ty)| (spec, *ty)));
        let meta = inliner::inline_meta(specs, &self.lookup, cache);
        if meta == self.inline_meta {
            return Arc::clone(self);
        }
        Arc::new(Self::assemble(
            self.grid_type,
            self.spec_groups.clone(),
            meta,
            self.lookup.clone(),
            self.tree.clone(),
        ))
    }

    pub fn grid_type(&self) -> GridType {
        self.grid_type
    }

    pub fn lookup(&self) -> &TargetLookup {
        &self.lookup
    }

    pub fn compiled(&self) -> &Arc<CompiledViewDefinition> {
        self.lookup.compiled()
    }

    pub fn inline_meta(&self) -> &InlineMeta {
        &self.inline_meta
    }

    /// Calc config and requirement behind a cell, for opening its dependency graph.
    pub fn requirement_for_cell(&self, row: usize, col: usize) -> Result<(String, ValueRequirement)> {
        let no_target = || AnalyticsError::NoTarget(format!("cell ({}, {})", row, col));
        let spec = self.columns.column(col).and_then(GridColumn::spec).ok_or_else(no_target)?;
        self.lookup.target_for_cell(row, spec).ok_or_else(no_target)?;
        self.lookup.requirement_for_cell(row, spec).ok_or_else(no_target)
    }

    fn render_quantity(&self, cell: GridCell, row: &Row, cache: &ResultsCache) -> RenderedCell {
        let cached = match row.target.kind {
            TargetKind::Position | TargetKind::Trade => cache.entity(&row.target.id),
            _ => None,
        };
        let quantity = cached.as_ref().and_then(|c| match &c.entity {
            Entity::Position(p) => Some(p.quantity),
            Entity::Trade(t) => Some(t.quantity),
            Entity::Security(_) => None,
        });
        match (quantity, cached) {
            (Some(quantity), Some(cached)) => RenderedCell {
                cell: ResultsCell {
                    updated: cached.last_changed == cache.update_id(),
                    ..ResultsCell::empty(cell.row, cell.col, ValueType::Double)
                }
                .with_value(Value::Double(quantity)),
                last_changed: cached.last_changed,
            },
            _ => RenderedCell::fixed(ResultsCell::empty(cell.row, cell.col, ValueType::Double)),
        }
    }
}

impl GridStructure for MainGridStructure {
    fn row_count(&self) -> usize {
        self.lookup.row_count()
    }

    fn columns(&self) -> &GridColumnGroups {
        &self.columns
    }

    fn tree(&self) -> &NodeTree {
        &self.tree
    }

    fn render(&self, cell: GridCell, cache: &ResultsCache, format: Format, logging: bool) -> RenderedCell {
        let (Some(row), Some(column)) = (self.lookup.row(cell.row), self.columns.column(cell.col)) else {
            return RenderedCell::fixed(ResultsCell::empty(cell.row, cell.col, ValueType::Unknown));
        };
        match &column.renderer {
            CellRenderer::Label => RenderedCell::fixed(ResultsCell::label(cell.row, cell.col, &row.name)),
            CellRenderer::Quantity => self.render_quantity(cell, row, cache),
            CellRenderer::Analytics { spec, inline } => match self.lookup.target_for_cell(cell.row, spec) {
                Some((calc_config, value_spec)) => {
                    let result = cache.result(&calc_config, &value_spec, column.underlying_type);
                    render_result(cell, result, column, format, logging, inline.as_deref())
                }
                None => RenderedCell::fixed(ResultsCell::empty(cell.row, cell.col, column.value_type)),
            },
            CellRenderer::DependencyGraph(_) => {
                RenderedCell::fixed(ResultsCell::empty(cell.row, cell.col, column.value_type))
            }
        }
    }
}

// =============================================================================
// Builders
// =============================================================================

fn build_columns(grid_type: GridType, spec_groups: &[SpecGroup], meta: &InlineMeta) -> GridColumnGroups {
    let fixed = match grid_type {
        GridType::Portfolio => vec![
            GridColumn::fixed("Name", ValueType::Text, CellRenderer::Label),
            GridColumn::fixed("Quantity", ValueType::Double, CellRenderer::Quantity),
        ],
        GridType::Primitives => vec![GridColumn::fixed("Label", ValueType::Text, CellRenderer::Label)],
    };
    let mut groups = vec![GridColumnGroup::new("fixed", fixed, false)];

    for (calc_config, specs) in spec_groups {
        let mut columns = Vec::new();
        for (spec, value_type) in specs {
            match meta.get(spec) {
                Some(labels) => {
                    for (index, label) in labels.iter().enumerate() {
                        let header = if index == 0 {
                            format!("{} / {}", spec.header(), label)
                        } else {
                            label.clone()
                        };
                        columns.push(GridColumn::inlined(spec, header, label, index));
                    }
                }
                None => columns.push(GridColumn::for_spec(spec, *value_type)),
            }
        }
        if !columns.is_empty() {
            groups.push(GridColumnGroup::new(calc_config, columns, true));
        }
    }
    GridColumnGroups::new(groups)
}

/// Explicit columns then portfolio requirements, per calc config.
fn portfolio_specs(view_def: &ViewDefinition) -> Vec<SpecGroup> {
    let mut seen: HashSet<ColumnKey> = HashSet::new();
    view_def
        .calculation_configurations
        .iter()
        .map(|calc| {
            let explicit = calc.columns.iter().map(|c| {
                ColumnSpecification::new(&calc.name, &c.value_name, c.constraints.clone()).with_header(&c.header)
            });
            let required = calc
                .portfolio_requirements
                .iter()
                .map(|(name, constraints)| ColumnSpecification::new(&calc.name, name, constraints.clone()));
            let specs = explicit
                .chain(required)
                .filter(|spec| seen.insert(spec.key()))
                .map(|spec| {
                    let ty = view_def.value_type(&spec.value_name);
                    (spec, ty)
                })
                .collect();
            (calc.name.clone(), specs)
        })
        .collect()
}

fn primitive_specs(view_def: &ViewDefinition) -> Vec<SpecGroup> {
    let mut seen: HashSet<ColumnKey> = HashSet::new();
    view_def
        .calculation_configurations
        .iter()
        .map(|calc| {
            let specs = calc
                .specific_requirements
                .iter()
                .filter(|req| is_primitive(&req.target))
                .map(|req| ColumnSpecification::new(&calc.name, &req.value_name, req.constraints.clone()))
                .filter(|spec| seen.insert(spec.key()))
                .map(|spec| {
                    let ty = view_def.value_type(&spec.value_name);
                    (spec, ty)
                })
                .collect();
            (calc.name.clone(), specs)
        })
        .collect()
}

fn is_primitive(target: &TargetSpec) -> bool {
    !matches!(
        target.kind,
        TargetKind::PortfolioNode | TargetKind::Position | TargetKind::Trade
    )
}

fn primitive_rows(view_def: &ViewDefinition) -> Vec<Row> {
    let mut seen = HashSet::new();
    view_def
        .calculation_configurations
        .iter()
        .flat_map(|calc| calc.specific_requirements.iter())
        .filter(|req| is_primitive(&req.target) && seen.insert(req.target.clone()))
        .map(|req| Row::new(req.target.clone(), req.target.id.as_str()))
        .collect()
}

/// Depth-first rows: node, its child nodes, then its positions. Fungible
/// positions are followed by a row per trade.
fn portfolio_rows(portfolio: Option<&Portfolio>) -> (Vec<Row>, NodeTree) {
    let Some(portfolio) = portfolio else {
        return (Vec::new(), NodeTree::empty());
    };
    let mut rows = Vec::new();
    let root = add_node(&portfolio.root, &portfolio.name, &Vec::new(), &mut rows);
    (rows, NodeTree::build(root))
}

fn add_node(node: &PortfolioNode, name: &str, parent_path: &NodePath, rows: &mut Vec<Row>) -> NodeBuilder {
    let mut path = parent_path.clone();
    path.push(node.id.to_string());
    let mut builder = NodeBuilder::new(path.clone(), rows.len());
    rows.push(Row::new(node.target(), name));

    for child in &node.children {
        let child_builder = add_node(child, &child.name, &path, rows);
        builder.children.push(child_builder);
    }

    for position in &node.positions {
        let start = rows.len();
        let target = TargetSpec::position(position.id.as_str());
        if position.security.otc {
            let mut row = Row::new(target, &position.security.name);
            row.trade_id = position.trades.first().map(|t| t.id.clone());
            rows.push(row);
            continue;
        }
        rows.push(Row::new(target, &position.security.name));
        for trade in &position.trades {
            let date = trade.trade_date.format("%Y-%m-%d").to_string();
            rows.push(Row::new(TargetSpec::trade(trade.id.as_str()), &date));
        }
        if !position.trades.is_empty() {
            let mut position_path = path.clone();
            position_path.push(position.id.to_string());
            let mut position_node = NodeBuilder::new(position_path, start);
            position_node.end_row = rows.len() - 1;
            builder.children.push(position_node);
        }
    }

    builder.end_row = rows.len() - 1;
    builder
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{
        CalculationConfiguration, ColumnDefinition, ComputedValueResult, LabelledVector, Position,
        Security, Trade, ValueProperties, ValueSpecification, ViewResultModel,
    };

    fn portfolio() -> Portfolio {
        let child = PortfolioNode::new("n2", "Rates").with_position(
            Position::new("swap", 1.0, Security::otc("sec-swap", "5Y Swap")).with_trade(Trade::new("t-swap", 1.0)),
        );
        let root = PortfolioNode::new("n1", "Root").with_child(child).with_position(
            Position::new("eq", 100.0, Security::fungible("sec-eq", "ACME"))
                .with_trade(Trade::new("t1", 40.0))
                .with_trade(Trade::new("t2", 60.0)),
        );
        Portfolio::new("pf", "Main Book", root)
    }

    fn view_def() -> ViewDefinition {
        let mut calc = CalculationConfiguration::new("Default");
        calc.columns.push(ColumnDefinition::new("Value", "PV", ValueProperties::new()));
        calc.portfolio_requirements.push(("PV".into(), ValueProperties::new()));
        calc.portfolio_requirements.push(("Ladder".into(), ValueProperties::new()));
        let mut def = ViewDefinition::new("view");
        def.calculation_configurations.push(calc);
        def.calculation_configurations.push(CalculationConfiguration::new("Empty"));
        def.value_types.insert("PV".into(), ValueType::Double);
        def.value_types.insert("Ladder".into(), ValueType::LabelledVector);
        def
    }

    fn compiled() -> Arc<CompiledViewDefinition> {
        let mut compiled = CompiledViewDefinition::new(view_def());
        for id in ["eq", "swap"] {
            let target = TargetSpec::position(id);
            for name in ["PV", "Ladder"] {
                compiled.value_mappings.insert(
                    "Default",
                    ValueRequirement::new(name, target.clone(), ValueProperties::new()),
                    ValueSpecification::new(name, target.clone(), ValueProperties::new()),
                );
            }
        }
        Arc::new(compiled)
    }

    #[test]
    fn test_portfolio_rows_layout() {
        let pf = portfolio();
        let structure = MainGridStructure::portfolio(Some(&pf), compiled());
        let names: Vec<&str> = structure.lookup().rows().iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names[0], "Main Book");
        assert_eq!(names[1], "Rates");
        assert_eq!(names[2], "5Y Swap");
        assert_eq!(names[3], "ACME");
        assert_eq!(structure.row_count(), 6);
        assert_eq!(
            structure.lookup().row(2).unwrap().trade_id,
            Some(crate::types::ObjectId::from("t-swap"))
        );
        assert_eq!(structure.lookup().row(4).unwrap().target.kind, TargetKind::Trade);
        assert!(structure.tree().is_well_formed());
        // root, Rates, ACME position
        assert_eq!(structure.tree().len(), 3);
    }

    #[test]
    fn test_duplicate_columns_collapse_regardless_of_header() {
        let structure = MainGridStructure::portfolio(Some(&portfolio()), compiled());
        let headers: Vec<&str> = structure.columns().columns().map(|c| c.header.as_str()).collect();
        assert_eq!(headers, vec!["Name", "Quantity", "Value", "Ladder"]);
        // the empty calc config gets no group
        assert_eq!(structure.columns().groups().len(), 2);
    }

    #[test]
    fn test_with_updated_columns_preserves_identity_when_unchanged() {
        let structure = Arc::new(MainGridStructure::portfolio(Some(&portfolio()), compiled()));
        let cache = ResultsCache::with_capacity(5);
        let same = structure.with_updated_columns(&cache);
        assert!(Arc::ptr_eq(&structure, &same));

        let mut cycle = ViewResultModel::new(1);
        cycle.add(
            "Default",
            ComputedValueResult::new(
                ValueSpecification::new("Ladder", TargetSpec::position("eq"), ValueProperties::new()),
                Value::Labelled(LabelledVector::new(vec!["1Y".into(), "2Y".into()], vec![1.0, 2.0])),
            ),
        );
        cache.put_results(&cycle);

        let inlined = structure.with_updated_columns(&cache);
        assert!(!Arc::ptr_eq(&structure, &inlined));
        let headers: Vec<&str> = inlined.columns().columns().map(|c| c.header.as_str()).collect();
        assert_eq!(headers, vec!["Name", "Quantity", "Value", "Ladder / 1Y", "2Y"]);

        let again = inlined.with_updated_columns(&cache);
        assert!(Arc::ptr_eq(&inlined, &again));
    }

    #[test]
    fn test_render_cells() {
        let structure = MainGridStructure::portfolio(Some(&portfolio()), compiled());
        let cache = ResultsCache::with_capacity(5);
        let mut cycle = ViewResultModel::new(1);
        cycle.add(
            "Default",
            ComputedValueResult::new(
                ValueSpecification::new("PV", TargetSpec::position("eq"), ValueProperties::new()),
                Value::Double(12.5),
            ),
        );
        cache.put_results(&cycle);

        let label = structure.render(GridCell::new(3, 0), &cache, Format::Cell, false);
        assert_eq!(label.cell.value, Value::Text("ACME".into()));

        let pv = structure.render(GridCell::new(3, 2), &cache, Format::Cell, false);
        assert_eq!(pv.cell.value, Value::Double(12.5));
        assert!(pv.cell.updated);
        assert_eq!(pv.last_changed, cache.update_id());

        // node rows have no mapping
        let node = structure.render(GridCell::new(0, 2), &cache, Format::Cell, false);
        assert_eq!(node.cell.value, Value::not_available());

        // mapped but not computed yet
        let pending = structure.render(GridCell::new(2, 2), &cache, Format::Cell, false);
        assert_eq!(pending.cell.value, Value::pending());
    }

    #[test]
    fn test_requirement_for_cell() {
        let structure = MainGridStructure::portfolio(Some(&portfolio()), compiled());
        let (calc, req) = structure.requirement_for_cell(3, 2).unwrap();
        assert_eq!(calc, "Default");
        assert_eq!(req.target, TargetSpec::position("eq"));

        assert!(matches!(structure.requirement_for_cell(0, 2), Err(AnalyticsError::NoTarget(_))));
        assert!(matches!(structure.requirement_for_cell(3, 0), Err(AnalyticsError::NoTarget(_))));
    }

    #[test]
    fn test_primitives_grid() {
        let mut def = ViewDefinition::new("view");
        let mut calc = CalculationConfiguration::new("Default");
        let curve = TargetSpec::primitive("USD-Curve");
        calc.specific_requirements
            .push(ValueRequirement::new("Yield", curve.clone(), ValueProperties::new()));
        calc.specific_requirements
            .push(ValueRequirement::new("Yield", curve, ValueProperties::new()));
        calc.specific_requirements.push(ValueRequirement::new(
            "PV",
            TargetSpec::position("eq"),
            ValueProperties::new(),
        ));
        def.calculation_configurations.push(calc);

        let structure = MainGridStructure::primitives(Arc::new(CompiledViewDefinition::new(def)));
        assert_eq!(structure.row_count(), 1);
        assert_eq!(structure.column_count(), 2);
        assert!(structure.tree().is_empty());
    }
}
