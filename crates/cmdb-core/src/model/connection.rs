use rusqlite::Row;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::ids::{ConnectionId, GroupId, ItemId, WorkspaceId};
use crate::error::{CoreError, Result};

/// The four mutually exclusive endpoint shapes of a connection row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EdgeShape {
    ItemItem,
    ItemGroup,
    GroupItem,
    GroupGroup,
}

impl EdgeShape {
    pub const ALL: [Self; 4] = [
        Self::ItemItem,
        Self::ItemGroup,
        Self::GroupItem,
        Self::GroupGroup,
    ];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::ItemItem => "item-item",
            Self::ItemGroup => "item-group",
            Self::GroupItem => "group-item",
            Self::GroupGroup => "group-group",
        }
    }

    #[must_use]
    pub const fn source_is_group(self) -> bool {
        matches!(self, Self::GroupItem | Self::GroupGroup)
    }

    #[must_use]
    pub const fn target_is_group(self) -> bool {
        matches!(self, Self::ItemGroup | Self::GroupGroup)
    }

    /// Column holding the source id for this shape.
    pub(crate) const fn source_column(self) -> &'static str {
        if self.source_is_group() {
            "source_group_id"
        } else {
            "source_id"
        }
    }

    /// Column holding the target id for this shape.
    pub(crate) const fn target_column(self) -> &'static str {
        if self.target_is_group() {
            "target_group_id"
        } else {
            "target_id"
        }
    }

    /// Build typed endpoints from raw ids interpreted through this shape.
    #[must_use]
    pub const fn endpoints(self, source: i64, target: i64) -> (Endpoint, Endpoint) {
        let source = if self.source_is_group() {
            Endpoint::Group(GroupId(source))
        } else {
            Endpoint::Item(ItemId(source))
        };
        let target = if self.target_is_group() {
            Endpoint::Group(GroupId(target))
        } else {
            Endpoint::Item(ItemId(target))
        };
        (source, target)
    }

    pub(crate) const fn from_endpoints(source: Endpoint, target: Endpoint) -> Self {
        match (source, target) {
            (Endpoint::Item(_), Endpoint::Item(_)) => Self::ItemItem,
            (Endpoint::Item(_), Endpoint::Group(_)) => Self::ItemGroup,
            (Endpoint::Group(_), Endpoint::Item(_)) => Self::GroupItem,
            (Endpoint::Group(_), Endpoint::Group(_)) => Self::GroupGroup,
        }
    }
}

impl fmt::Display for EdgeShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EdgeShape {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().replace('_', "-").as_str() {
            "item-item" => Ok(Self::ItemItem),
            "item-group" | "to-group" => Ok(Self::ItemGroup),
            "group-item" | "from-group" => Ok(Self::GroupItem),
            "group-group" => Ok(Self::GroupGroup),
            other => Err(CoreError::Validation(format!(
                "unknown edge shape '{other}': expected one of item-item, item-group, group-item, group-group"
            ))),
        }
    }
}

/// One side of a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "lowercase")]
pub enum Endpoint {
    Item(ItemId),
    Group(GroupId),
}

impl Endpoint {
    #[must_use]
    pub const fn raw_id(self) -> i64 {
        match self {
            Self::Item(id) => id.0,
            Self::Group(id) => id.0,
        }
    }

    #[must_use]
    pub const fn as_item(self) -> Option<ItemId> {
        match self {
            Self::Item(id) => Some(id),
            Self::Group(_) => None,
        }
    }

    /// Resolve a nullable `(item, group)` column pair, which must have exactly
    /// one side populated.
    fn from_columns(item: Option<ItemId>, group: Option<GroupId>) -> Option<Self> {
        match (item, group) {
            (Some(item), None) => Some(Self::Item(item)),
            (None, Some(group)) => Some(Self::Group(group)),
            _ => None,
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Item(id) => write!(f, "item {id}"),
            Self::Group(id) => write!(f, "group {id}"),
        }
    }
}

/// A directed dependency edge between two endpoints of one workspace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Connection {
    pub id: ConnectionId,
    pub workspace_id: WorkspaceId,
    pub source: Endpoint,
    pub target: Endpoint,
    pub created_at_us: i64,
}

impl Connection {
    #[must_use]
    pub const fn shape(&self) -> EdgeShape {
        EdgeShape::from_endpoints(self.source, self.target)
    }
}

/// Connection row as stored, before the exclusivity check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct ConnectionRow {
    pub id: ConnectionId,
    pub workspace_id: WorkspaceId,
    pub source_id: Option<ItemId>,
    pub source_group_id: Option<GroupId>,
    pub target_id: Option<ItemId>,
    pub target_group_id: Option<GroupId>,
    pub created_at_us: i64,
}

impl ConnectionRow {
    pub const COLUMNS: &'static str = "connection_id, workspace_id, source_id, source_group_id, \
         target_id, target_group_id, created_at_us";

    /// # Errors
    ///
    /// Returns an error if a column is missing or has the wrong type.
    pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            workspace_id: row.get(1)?,
            source_id: row.get(2)?,
            source_group_id: row.get(3)?,
            target_id: row.get(4)?,
            target_group_id: row.get(5)?,
            created_at_us: row.get(6)?,
        })
    }

    /// Validate exactly-one-endpoint-per-side and build the typed edge.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Corrupt`] if a side has no endpoint or two.
    pub fn into_connection(self) -> Result<Connection> {
        let source = Endpoint::from_columns(self.source_id, self.source_group_id);
        let target = Endpoint::from_columns(self.target_id, self.target_group_id);
        match (source, target) {
            (Some(source), Some(target)) => Ok(Connection {
                id: self.id,
                workspace_id: self.workspace_id,
                source,
                target,
                created_at_us: self.created_at_us,
            }),
            _ => Err(CoreError::Corrupt(format!(
                "connection {} must have exactly one source and one target endpoint",
                self.id
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(
        source_id: Option<i64>,
        source_group_id: Option<i64>,
        target_id: Option<i64>,
        target_group_id: Option<i64>,
    ) -> ConnectionRow {
        ConnectionRow {
            id: ConnectionId(1),
            workspace_id: WorkspaceId(1),
            source_id: source_id.map(ItemId),
            source_group_id: source_group_id.map(GroupId),
            target_id: target_id.map(ItemId),
            target_group_id: target_group_id.map(GroupId),
            created_at_us: 0,
        }
    }

    #[test]
    fn shape_follows_populated_columns() {
        let cases = [
            (row(Some(1), None, Some(2), None), EdgeShape::ItemItem),
            (row(Some(1), None, None, Some(2)), EdgeShape::ItemGroup),
            (row(None, Some(1), Some(2), None), EdgeShape::GroupItem),
            (row(None, Some(1), None, Some(2)), EdgeShape::GroupGroup),
        ];
        for (raw, shape) in cases {
            let conn = raw.into_connection().expect("valid row");
            assert_eq!(conn.shape(), shape);
        }
    }

    #[test]
    fn rows_violating_exclusivity_are_corrupt() {
        for raw in [
            row(Some(1), Some(1), Some(2), None),
            row(None, None, Some(2), None),
            row(Some(1), None, Some(2), Some(2)),
            row(Some(1), None, None, None),
        ] {
            let err = raw.into_connection().expect_err("invalid row");
            assert!(matches!(err, CoreError::Corrupt(_)));
        }
    }

    #[test]
    fn shape_parses_boundary_spellings() {
        for shape in EdgeShape::ALL {
            assert_eq!(shape.as_str().parse::<EdgeShape>().expect("parse"), shape);
        }
        assert_eq!("to-group".parse::<EdgeShape>().expect("alias"), EdgeShape::ItemGroup);
        assert_eq!("GROUP_ITEM".parse::<EdgeShape>().expect("alias"), EdgeShape::GroupItem);
        assert!("item-service".parse::<EdgeShape>().is_err());
    }

    #[test]
    fn endpoints_follow_shape() {
        let (s, t) = EdgeShape::GroupItem.endpoints(4, 9);
        assert_eq!(s, Endpoint::Group(GroupId(4)));
        assert_eq!(t, Endpoint::Item(ItemId(9)));
        assert_eq!(EdgeShape::GroupItem.source_column(), "source_group_id");
        assert_eq!(EdgeShape::GroupItem.target_column(), "target_id");
    }
}
