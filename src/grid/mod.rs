pub mod analytics_grid;
pub mod column;
pub mod depgraph;
pub mod inliner;
pub mod lookup;
pub mod node;
pub mod structure;
pub mod viewport;

pub use analytics_grid::{AnalyticsGrid, DependencyGraphGrid, MainAnalyticsGrid, ResultsBoard};
pub use column::{CellRenderer, ColumnSpecification, GraphColumn, GridColumn, GridColumnGroup, GridColumnGroups};
pub use depgraph::{DependencyGraphGridStructure, GraphRow};
pub use lookup::{Row, TargetLookup};
pub use node::{AnalyticsNode, NodePath, NodeTree};
pub use structure::{GridStructure, MainGridStructure, RenderedCell};
pub use viewport::Viewport;
