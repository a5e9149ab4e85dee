use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier of an object independent of its version.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ObjectId(String);

impl ObjectId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ObjectId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for ObjectId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// What kind of thing a computation target is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetKind {
    PortfolioNode,
    Position,
    Trade,
    Security,
    Primitive,
}

impl TargetKind {
    /// Short label used in the dependency graph "Type" column.
    pub fn label(&self) -> &'static str {
        match self {
            TargetKind::PortfolioNode => "Node",
            TargetKind::Position => "Position",
            TargetKind::Trade => "Trade",
            TargetKind::Security => "Security",
            TargetKind::Primitive => "Primitive",
        }
    }
}

impl fmt::Display for TargetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Reference to the thing a cell is about.
///
/// Produced by the computation engine and treated here as an opaque, comparable key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TargetSpec {
    pub kind: TargetKind,
    pub id: ObjectId,
}

impl TargetSpec {
    pub fn new(kind: TargetKind, id: impl Into<ObjectId>) -> Self {
        Self {
            kind,
            id: id.into(),
        }
    }

    pub fn node(id: &str) -> Self {
        Self::new(TargetKind::PortfolioNode, id)
    }

    pub fn position(id: &str) -> Self {
        Self::new(TargetKind::Position, id)
    }

    pub fn trade(id: &str) -> Self {
        Self::new(TargetKind::Trade, id)
    }

    pub fn primitive(id: &str) -> Self {
        Self::new(TargetKind::Primitive, id)
    }
}

impl fmt::Display for TargetSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}~{}", self.kind, self.id)
    }
}
