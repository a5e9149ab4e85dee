use crate::types::{ColumnGroupLayout, ColumnLayout, ValueProperties, ValueType};
use serde::{Deserialize, Serialize};
use std::fmt;

/// What an analytics column shows.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ColumnSpecification {
    pub calc_config: String,
    pub value_name: String,
    pub constraints: ValueProperties,
    pub header: Option<String>,
}

/// Identity of a column for de-duplication. Headers don't count.
pub type ColumnKey = (String, String, ValueProperties);

impl ColumnSpecification {
    pub fn new(calc_config: &str, value_name: &str, constraints: ValueProperties) -> Self {
        Self {
            calc_config: calc_config.to_string(),
            value_name: value_name.to_string(),
            constraints,
            header: None,
        }
    }

    pub fn with_header(mut self, header: &str) -> Self {
        self.header = Some(header.to_string());
        self
    }

    /// Header, defaulting to the value name.
    pub fn header(&self) -> &str {
        self.header.as_deref().unwrap_or(&self.value_name)
    }

    pub fn key(&self) -> ColumnKey {
        (
            self.calc_config.clone(),
            self.value_name.clone(),
            self.constraints.clone(),
        )
    }
}

impl fmt::Display for ColumnSpecification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.calc_config, self.value_name)?;
        if !self.constraints.is_empty() {
            write!(f, " [{}]", self.constraints)?;
        }
        Ok(())
    }
}

/// Columns of a dependency graph grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GraphColumn {
    Target,
    TargetType,
    ValueName,
    Value,
    Function,
    Properties,
}

/// How a column produces its cells.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CellRenderer {
    /// Row name.
    Label,
    /// Quantity of the row's position or trade, read from the cached entity.
    Quantity,
    /// Computed value resolved through the target lookup. `inline` selects
    /// one element of a labelled vector.
    Analytics {
        spec: ColumnSpecification,
        inline: Option<String>,
    },
    DependencyGraph(GraphColumn),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GridColumn {
    pub header: String,
    pub description: String,
    /// Type of the rendered cells.
    pub value_type: ValueType,
    /// Type of the result before inlining.
    pub underlying_type: ValueType,
    pub inline_key: Option<String>,
    pub inline_index: Option<usize>,
    pub renderer: CellRenderer,
}

impl GridColumn {
    pub fn fixed(header: &str, value_type: ValueType, renderer: CellRenderer) -> Self {
        Self {
            header: header.to_string(),
            description: String::new(),
            value_type,
            underlying_type: value_type,
            inline_key: None,
            inline_index: None,
            renderer,
        }
    }

    pub fn for_spec(spec: &ColumnSpecification, value_type: ValueType) -> Self {
        Self {
            header: spec.header().to_string(),
            description: spec.to_string(),
            value_type,
            underlying_type: value_type,
            inline_key: None,
            inline_index: None,
            renderer: CellRenderer::Analytics {
                spec: spec.clone(),
                inline: None,
            },
        }
    }

    /// One element column of an inlined vector result.
    pub fn inlined(spec: &ColumnSpecification, header: String, label: &str, index: usize) -> Self {
        Self {
            header,
            description: format!("{} / {}", spec, label),
            value_type: ValueType::Double,
            underlying_type: ValueType::LabelledVector,
            inline_key: Some(label.to_string()),
            inline_index: Some(index),
            renderer: CellRenderer::Analytics {
                spec: spec.clone(),
                inline: Some(label.to_string()),
            },
        }
    }

    pub fn spec(&self) -> Option<&ColumnSpecification> {
        match &self.renderer {
            CellRenderer::Analytics { spec, .. } => Some(spec),
            _ => None,
        }
    }

    fn layout(&self) -> ColumnLayout {
        ColumnLayout {
            header: self.header.clone(),
            description: self.description.clone(),
            value_type: self.value_type,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GridColumnGroup {
    pub name: String,
    pub columns: Vec<GridColumn>,
    /// Whether clients may show dependency graphs for the group's cells.
    pub dependency_graphs: bool,
}

impl GridColumnGroup {
    pub fn new(name: &str, columns: Vec<GridColumn>, dependency_graphs: bool) -> Self {
        Self {
            name: name.to_string(),
            columns,
            dependency_graphs,
        }
    }
}

/// Ordered column groups with flat column indexing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GridColumnGroups {
    groups: Vec<GridColumnGroup>,
    /// Flat column index -> (group, position in group).
    index: Vec<(usize, usize)>,
}

impl GridColumnGroups {
    pub fn new(groups: Vec<GridColumnGroup>) -> Self {
        let index = groups
            .iter()
            .enumerate()
            .flat_map(|(g, group)| (0..group.columns.len()).map(move |c| (g, c)))
            .collect();
        Self { groups, index }
    }

    pub fn groups(&self) -> &[GridColumnGroup] {
        &self.groups
    }

    pub fn column_count(&self) -> usize {
        self.index.len()
    }

    pub fn column(&self, index: usize) -> Option<&GridColumn> {
        let &(group, col) = self.index.get(index)?;
        self.groups[group].columns.get(col)
    }

    pub fn columns(&self) -> impl Iterator<Item = &GridColumn> {
        self.groups.iter().flat_map(|g| g.columns.iter())
    }

    pub fn layout(&self) -> Vec<ColumnGroupLayout> {
        self.groups
            .iter()
            .map(|g| ColumnGroupLayout {
                name: g.name.clone(),
                columns: g.columns.iter().map(GridColumn::layout).collect(),
            })
            .collect()
    }
}
