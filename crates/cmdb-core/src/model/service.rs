use rusqlite::Row;
use rusqlite::types::Type;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::Position;
use super::connection::EdgeShape;
use super::ids::{ItemId, ServiceGroupId, ServiceId, ServiceItemId, WorkspaceId};
use super::routing::EdgeRef;
use crate::error::CoreError;

/// How a service's icon is sourced.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IconType {
    #[default]
    Preset,
    Upload,
}

impl IconType {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Preset => "preset",
            Self::Upload => "upload",
        }
    }
}

impl fmt::Display for IconType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for IconType {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "preset" => Ok(Self::Preset),
            "upload" => Ok(Self::Upload),
            other => Err(CoreError::Validation(format!(
                "unknown icon type '{other}': expected preset or upload"
            ))),
        }
    }
}

fn text_column<T: FromStr>(row: &Row<'_>, idx: usize) -> rusqlite::Result<T>
where
    T::Err: std::error::Error + Send + Sync + 'static,
{
    let raw: String = row.get(idx)?;
    raw.parse()
        .map_err(|err| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(err)))
}

/// A business service attached to one cmdb item, with its own canvas of
/// service items and groups.
///
/// `workspace_id` is the owning item's workspace.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Service {
    pub id: ServiceId,
    pub item_id: ItemId,
    pub workspace_id: WorkspaceId,
    pub name: String,
    pub status: String,
    pub icon_type: IconType,
    pub icon_path: Option<String>,
    pub icon_name: Option<String>,
    pub description: Option<String>,
    pub created_at_us: i64,
    pub updated_at_us: i64,
}

impl Service {
    pub(crate) const COLUMNS: &'static str = "s.service_id, s.item_id, i.workspace_id, s.name, \
         s.status, s.icon_type, s.icon_path, s.icon_name, s.description, \
         s.created_at_us, s.updated_at_us";

    pub(crate) const FROM: &'static str =
        "services s JOIN cmdb_items i ON i.item_id = s.item_id";

    pub(crate) fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            item_id: row.get(1)?,
            workspace_id: row.get(2)?,
            name: row.get(3)?,
            status: row.get(4)?,
            icon_type: text_column(row, 5)?,
            icon_path: row.get(6)?,
            icon_name: row.get(7)?,
            description: row.get(8)?,
            created_at_us: row.get(9)?,
            updated_at_us: row.get(10)?,
        })
    }
}

/// Caller-supplied service fields. Absent optional fields fall back to the
/// stored value on update and to the defaults on create.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceFields {
    pub name: String,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub icon_type: Option<IconType>,
    #[serde(default)]
    pub icon_path: Option<String>,
    #[serde(default)]
    pub icon_name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}

impl ServiceFields {
    #[must_use]
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }
}

/// A container of service items on a service canvas.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceGroup {
    pub id: ServiceGroupId,
    pub service_id: ServiceId,
    pub workspace_id: WorkspaceId,
    pub name: String,
    pub description: Option<String>,
    pub color: String,
    pub position: Option<Position>,
    pub created_at_us: i64,
}

impl ServiceGroup {
    pub(crate) const COLUMNS: &'static str = "service_group_id, service_id, workspace_id, name, \
         description, color, position_json, created_at_us";

    pub(crate) fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        let position_json: Option<String> = row.get(6)?;
        Ok(Self {
            id: row.get(0)?,
            service_id: row.get(1)?,
            workspace_id: row.get(2)?,
            name: row.get(3)?,
            description: row.get(4)?,
            color: row.get(5)?,
            position: Position::from_json(position_json.as_deref()),
            created_at_us: row.get(7)?,
        })
    }
}

/// A component drawn on a service canvas. Ranked inside its group the same
/// way cmdb items are.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceItem {
    pub id: ServiceItemId,
    pub service_id: ServiceId,
    pub workspace_id: WorkspaceId,
    pub group_id: Option<ServiceGroupId>,
    pub order_in_group: Option<i64>,
    pub name: String,
    #[serde(rename = "type")]
    pub item_type: Option<String>,
    pub description: Option<String>,
    pub status: String,
    pub ip: Option<String>,
    pub category: Option<String>,
    pub location: Option<String>,
    pub position: Option<Position>,
    pub created_at_us: i64,
    pub updated_at_us: i64,
}

impl ServiceItem {
    pub(crate) const COLUMNS: &'static str = "service_item_id, service_id, workspace_id, \
         group_id, order_in_group, name, item_type, description, status, ip, category, \
         location, position_json, created_at_us, updated_at_us";

    pub(crate) fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        let position_json: Option<String> = row.get(12)?;
        Ok(Self {
            id: row.get(0)?,
            service_id: row.get(1)?,
            workspace_id: row.get(2)?,
            group_id: row.get(3)?,
            order_in_group: row.get(4)?,
            name: row.get(5)?,
            item_type: row.get(6)?,
            description: row.get(7)?,
            status: row.get(8)?,
            ip: row.get(9)?,
            category: row.get(10)?,
            location: row.get(11)?,
            position: Position::from_json(position_json.as_deref()),
            created_at_us: row.get(13)?,
            updated_at_us: row.get(14)?,
        })
    }
}

/// Descriptive service item fields. Membership changes go through the
/// ordering engine.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ServiceItemFields {
    pub name: String,
    #[serde(default, rename = "type")]
    pub item_type: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub ip: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub position: Option<Position>,
}

impl ServiceItemFields {
    #[must_use]
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }
}

/// Directed item→item edge on a service canvas.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceConnection {
    pub id: i64,
    pub service_id: ServiceId,
    pub workspace_id: WorkspaceId,
    pub source_id: ServiceItemId,
    pub target_id: ServiceItemId,
    pub created_at_us: i64,
}

impl ServiceConnection {
    pub(crate) const COLUMNS: &'static str =
        "service_connection_id, service_id, workspace_id, source_id, target_id, created_at_us";

    pub(crate) fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            service_id: row.get(1)?,
            workspace_id: row.get(2)?,
            source_id: row.get(3)?,
            target_id: row.get(4)?,
            created_at_us: row.get(5)?,
        })
    }

    /// Canvas edge drawn for this connection.
    #[must_use]
    pub const fn edge(&self) -> EdgeRef {
        EdgeRef::new(EdgeShape::ItemItem, self.source_id.0, self.target_id.0)
    }
}

/// What a service group link points at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "lowercase")]
pub enum ServiceLinkTarget {
    Group(ServiceGroupId),
    Item(ServiceItemId),
}

/// Directed group→group or group→item edge on a service canvas.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceGroupLink {
    pub id: i64,
    pub service_id: ServiceId,
    pub workspace_id: WorkspaceId,
    pub source_group_id: ServiceGroupId,
    pub target: ServiceLinkTarget,
    pub created_at_us: i64,
}

impl ServiceGroupLink {
    pub(crate) const COLUMNS: &'static str = "link_id, service_id, workspace_id, \
         source_group_id, target_group_id, target_item_id, created_at_us";

    pub(crate) fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        let target_group: Option<ServiceGroupId> = row.get(4)?;
        let target_item: Option<ServiceItemId> = row.get(5)?;
        let target = match (target_group, target_item) {
            (Some(group), None) => ServiceLinkTarget::Group(group),
            (None, Some(item)) => ServiceLinkTarget::Item(item),
            _ => {
                return Err(rusqlite::Error::FromSqlConversionFailure(
                    4,
                    Type::Integer,
                    "service group link must have exactly one target".into(),
                ));
            }
        };
        Ok(Self {
            id: row.get(0)?,
            service_id: row.get(1)?,
            workspace_id: row.get(2)?,
            source_group_id: row.get(3)?,
            target,
            created_at_us: row.get(6)?,
        })
    }

    /// Canvas edge drawn for this link.
    #[must_use]
    pub const fn edge(&self) -> EdgeRef {
        match self.target {
            ServiceLinkTarget::Group(group) => {
                EdgeRef::new(EdgeShape::GroupGroup, self.source_group_id.0, group.0)
            }
            ServiceLinkTarget::Item(item) => {
                EdgeRef::new(EdgeShape::GroupItem, self.source_group_id.0, item.0)
            }
        }
    }
}

/// Handle placement of one edge on a service canvas.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceRouting {
    pub id: i64,
    pub service_id: ServiceId,
    pub workspace_id: WorkspaceId,
    pub edge_id: EdgeRef,
    pub source_handle: String,
    pub target_handle: String,
    pub created_at_us: i64,
    pub updated_at_us: i64,
}

impl ServiceRouting {
    pub(crate) const COLUMNS: &'static str = "routing_id, service_id, workspace_id, edge_kind, \
         a_id, b_id, source_handle, target_handle, created_at_us, updated_at_us";

    pub(crate) fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        let kind: EdgeShape = text_column(row, 3)?;
        Ok(Self {
            id: row.get(0)?,
            service_id: row.get(1)?,
            workspace_id: row.get(2)?,
            edge_id: EdgeRef::new(kind, row.get(4)?, row.get(5)?),
            source_handle: row.get(6)?,
            target_handle: row.get(7)?,
            created_at_us: row.get(8)?,
            updated_at_us: row.get(9)?,
        })
    }
}
