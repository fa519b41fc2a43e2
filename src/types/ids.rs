//! Identifier types for ledger nodes and parties.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

macro_rules! ledger_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        pub struct $name(Uuid);

        impl $name {
            /// Create an id from a UUID.
            pub fn new(uuid: Uuid) -> Self {
                Self(uuid)
            }

            /// Generate a fresh random id.
            pub fn generate() -> Self {
                Self(Uuid::new_v4())
            }

            /// Parse an id from a UUID string.
            pub fn parse(s: &str) -> Result<Self, uuid::Error> {
                Ok(Self(Uuid::parse_str(s)?))
            }

            /// Get the inner UUID.
            pub fn as_uuid(&self) -> Uuid {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<Uuid> for $name {
            fn from(uuid: Uuid) -> Self {
                Self(uuid)
            }
        }
    };
}

ledger_id!(
    /// Identifier of a lot.
    LotId
);
ledger_id!(
    /// Identifier of a stock.
    StockId
);
ledger_id!(
    /// Identifier of a transformation.
    TransformationId
);
ledger_id!(
    /// Identifier of an operator entity (author, counterpart, stock owner).
    EntityId
);

/// Kind discriminant of a ledger node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeKind {
    /// A lot.
    Lot,
    /// A stock.
    Stock,
    /// A transformation.
    Transformation,
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Lot => write!(f, "lot"),
            Self::Stock => write!(f, "stock"),
            Self::Transformation => write!(f, "transformation"),
        }
    }
}

/// Typed reference to any ledger node.
///
/// Ordered by kind, then id, so node sets iterate deterministically.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum NodeRef {
    /// Reference to a lot.
    Lot(LotId),
    /// Reference to a stock.
    Stock(StockId),
    /// Reference to a transformation.
    Transformation(TransformationId),
}

impl NodeRef {
    /// Kind of the referenced node.
    pub fn kind(&self) -> NodeKind {
        match self {
            Self::Lot(_) => NodeKind::Lot,
            Self::Stock(_) => NodeKind::Stock,
            Self::Transformation(_) => NodeKind::Transformation,
        }
    }

    /// Inner UUID regardless of kind.
    pub fn as_uuid(&self) -> Uuid {
        match self {
            Self::Lot(id) => id.as_uuid(),
            Self::Stock(id) => id.as_uuid(),
            Self::Transformation(id) => id.as_uuid(),
        }
    }
}

impl fmt::Display for NodeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind(), self.as_uuid())
    }
}

impl From<LotId> for NodeRef {
    fn from(id: LotId) -> Self {
        Self::Lot(id)
    }
}

impl From<StockId> for NodeRef {
    fn from(id: StockId) -> Self {
        Self::Stock(id)
    }
}

impl From<TransformationId> for NodeRef {
    fn from(id: TransformationId) -> Self {
        Self::Transformation(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_id_ordering() {
        let a = LotId::parse("00000000-0000-0000-0000-000000000001").unwrap();
        let b = LotId::parse("00000000-0000-0000-0000-000000000002").unwrap();
        assert!(a < b);
    }

    #[test]
    fn test_node_ref_orders_by_kind_first() {
        let lot = NodeRef::Lot(LotId::new(Uuid::from_u128(9)));
        let stock = NodeRef::Stock(StockId::new(Uuid::from_u128(1)));
        assert!(lot < stock);
        assert_eq!(stock.kind(), NodeKind::Stock);
    }

    #[test]
    fn test_node_ref_display() {
        let r = NodeRef::from(StockId::new(Uuid::from_u128(1)));
        assert_eq!(r.to_string(), "stock:00000000-0000-0000-0000-000000000001");
    }
}
