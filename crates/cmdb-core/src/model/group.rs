use rusqlite::Row;
use serde::{Deserialize, Serialize};

use super::Position;
use super::ids::{GroupId, WorkspaceId};

/// Fill color used when a group is created without one.
pub const DEFAULT_GROUP_COLOR: &str = "#e0e7ff";

/// A container of items inside one workspace.
///
/// Presentation fields (color, position) carry no meaning for ordering or
/// the dependency graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Group {
    pub id: GroupId,
    pub workspace_id: WorkspaceId,
    pub name: String,
    pub description: Option<String>,
    pub color: String,
    pub position: Option<Position>,
    pub created_at_us: i64,
}

impl Group {
    pub(crate) const COLUMNS: &'static str =
        "group_id, workspace_id, name, description, color, position_json, created_at_us";

    pub(crate) fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        let position_json: Option<String> = row.get(5)?;
        Ok(Self {
            id: row.get(0)?,
            workspace_id: row.get(1)?,
            name: row.get(2)?,
            description: row.get(3)?,
            color: row.get(4)?,
            position: Position::from_json(position_json.as_deref()),
            created_at_us: row.get(6)?,
        })
    }
}

/// Caller-supplied fields for creating or updating a group.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GroupFields {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub color: Option<String>,
    #[serde(default)]
    pub position: Option<Position>,
}

impl GroupFields {
    #[must_use]
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }
}

/// A row of the legacy `group_connections` table: a group→group link kept
/// apart from the general connection store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupLink {
    pub id: i64,
    pub workspace_id: WorkspaceId,
    pub source_id: GroupId,
    pub target_id: GroupId,
    pub created_at_us: i64,
}

impl GroupLink {
    pub(crate) const COLUMNS: &'static str =
        "link_id, workspace_id, source_id, target_id, created_at_us";

    pub(crate) fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            workspace_id: row.get(1)?,
            source_id: row.get(2)?,
            target_id: row.get(3)?,
            created_at_us: row.get(4)?,
        })
    }
}
