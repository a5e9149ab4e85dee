//! Portfolio hierarchy and master-data entities.

use super::{ObjectId, TargetSpec};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Security {
    pub id: ObjectId,
    pub name: String,
    /// OTC securities are held through a single trade and get one row.
    #[serde(default)]
    pub otc: bool,
}

impl Security {
    pub fn fungible(id: &str, name: &str) -> Self {
        Self {
            id: ObjectId::from(id),
            name: name.to_string(),
            otc: false,
        }
    }

    pub fn otc(id: &str, name: &str) -> Self {
        Self {
            id: ObjectId::from(id),
            name: name.to_string(),
            otc: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trade {
    pub id: ObjectId,
    pub quantity: f64,
    pub trade_date: DateTime<Utc>,
}

impl Trade {
    pub fn new(id: &str, quantity: f64) -> Self {
        Self {
            id: ObjectId::from(id),
            quantity,
            trade_date: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub id: ObjectId,
    pub quantity: f64,
    pub security: Security,
    #[serde(default)]
    pub trades: Vec<Trade>,
}

impl Position {
    pub fn new(id: &str, quantity: f64, security: Security) -> Self {
        Self {
            id: ObjectId::from(id),
            quantity,
            security,
            trades: Vec::new(),
        }
    }

    pub fn with_trade(mut self, trade: Trade) -> Self {
        self.trades.push(trade);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PortfolioNode {
    pub id: ObjectId,
    pub name: String,
    #[serde(default)]
    pub children: Vec<PortfolioNode>,
    #[serde(default)]
    pub positions: Vec<Position>,
}

impl PortfolioNode {
    pub fn new(id: &str, name: &str) -> Self {
        Self {
            id: ObjectId::from(id),
            name: name.to_string(),
            children: Vec::new(),
            positions: Vec::new(),
        }
    }

    pub fn with_child(mut self, child: PortfolioNode) -> Self {
        self.children.push(child);
        self
    }

    pub fn with_position(mut self, position: Position) -> Self {
        self.positions.push(position);
        self
    }

    pub fn target(&self) -> TargetSpec {
        TargetSpec::node(self.id.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Portfolio {
    pub id: ObjectId,
    pub name: String,
    pub root: PortfolioNode,
}

impl Portfolio {
    pub fn new(id: &str, name: &str, root: PortfolioNode) -> Self {
        Self {
            id: ObjectId::from(id),
            name: name.to_string(),
            root,
        }
    }

    /// Every position, trade and security the portfolio refers to.
    pub fn entities(&self) -> Vec<Entity> {
        let mut entities = Vec::new();
        collect_entities(&self.root, &mut entities);
        entities
    }
}

fn collect_entities(node: &PortfolioNode, out: &mut Vec<Entity>) {
    for position in &node.positions {
        out.push(Entity::Security(position.security.clone()));
        out.extend(position.trades.iter().cloned().map(Entity::Trade));
        out.push(Entity::Position(position.clone()));
    }
    for child in &node.children {
        collect_entities(child, out);
    }
}

/// Snapshot of a master-data object cached beside the computed values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Entity {
    Position(Position),
    Trade(Trade),
    Security(Security),
}

impl Entity {
    pub fn object_id(&self) -> &ObjectId {
        match self {
            Entity::Position(p) => &p.id,
            Entity::Trade(t) => &t.id,
            Entity::Security(s) => &s.id,
        }
    }
}

// =============================================================================
// Change notifications
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeType {
    Added,
    Changed,
    Removed,
}

/// Notification from the master layer that an entity changed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntityChange {
    pub change_type: ChangeType,
    pub object_id: ObjectId,
    pub version_from: DateTime<Utc>,
    /// `None` when the change produced the latest version.
    pub version_to: Option<DateTime<Utc>>,
    /// New state of the entity, absent for removals.
    pub entity: Option<Entity>,
}

impl EntityChange {
    pub fn changed(entity: Entity) -> Self {
        Self {
            change_type: ChangeType::Changed,
            object_id: entity.object_id().clone(),
            version_from: Utc::now(),
            version_to: None,
            entity: Some(entity),
        }
    }

    pub fn removed(object_id: ObjectId) -> Self {
        Self {
            change_type: ChangeType::Removed,
            object_id,
            version_from: Utc::now(),
            version_to: None,
            entity: None,
        }
    }
}

/// Version/correction instants the view was resolved at. `None` means latest.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VersionCorrection {
    pub version_as_of: Option<DateTime<Utc>>,
    pub corrected_to: Option<DateTime<Utc>>,
}

impl VersionCorrection {
    pub fn latest() -> Self {
        Self::default()
    }

    /// Whether a change with the given version window can alter what this
    /// view sees.
    pub fn is_affected_by(&self, change: &EntityChange) -> bool {
        // Corrections fixed in the past can't be altered by new ones.
        if self.corrected_to.is_some() {
            return false;
        }
        match self.version_as_of {
            None => change.version_to.is_none(),
            Some(as_of) => {
                change.version_from <= as_of
                    && change.version_to.map_or(true, |to| to >= as_of)
            }
        }
    }
}

/// Resolves the current portfolio from the backing store.
///
/// Called outside the view lock; implementations may be slow.
pub trait PortfolioSupplier: Send + Sync {
    fn portfolio(&self) -> Option<Portfolio>;
}

/// Supplier that always hands out the same portfolio.
pub struct FixedPortfolio(pub Option<Portfolio>);

impl PortfolioSupplier for FixedPortfolio {
    fn portfolio(&self) -> Option<Portfolio> {
        self.0.clone()
    }
}
