use rusqlite::Row;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::Position;
use super::ids::{GroupId, ItemId, WorkspaceId};

/// Status assigned to items created without one.
pub const DEFAULT_STATUS: &str = "active";

/// A configuration entity (server, service, appliance, ...).
///
/// When `group_id` is set, `order_in_group` holds the item's dense,
/// zero-based rank among the group's members. Ungrouped items carry no rank.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Item {
    pub id: ItemId,
    pub workspace_id: WorkspaceId,
    pub group_id: Option<GroupId>,
    pub order_in_group: Option<i64>,
    pub name: String,
    #[serde(rename = "type")]
    pub item_type: Option<String>,
    pub description: Option<String>,
    pub status: String,
    pub ip: Option<String>,
    pub category: Option<String>,
    pub location: Option<String>,
    pub env_type: Option<String>,
    pub images: Vec<Value>,
    pub position: Option<Position>,
    pub created_at_us: i64,
    pub updated_at_us: i64,
}

impl Item {
    pub(crate) const COLUMNS: &'static str = "item_id, workspace_id, group_id, order_in_group, \
         name, item_type, description, status, ip, category, location, env_type, \
         images_json, position_json, created_at_us, updated_at_us";

    pub(crate) fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        let images_json: Option<String> = row.get(12)?;
        let position_json: Option<String> = row.get(13)?;
        Ok(Self {
            id: row.get(0)?,
            workspace_id: row.get(1)?,
            group_id: row.get(2)?,
            order_in_group: row.get(3)?,
            name: row.get(4)?,
            item_type: row.get(5)?,
            description: row.get(6)?,
            status: row.get(7)?,
            ip: row.get(8)?,
            category: row.get(9)?,
            location: row.get(10)?,
            env_type: row.get(11)?,
            images: normalize_images(images_json.as_deref()),
            position: Position::from_json(position_json.as_deref()),
            created_at_us: row.get(14)?,
            updated_at_us: row.get(15)?,
        })
    }
}

/// Descriptive item fields. Group membership is not part of this set: it is
/// only ever changed through the ordering engine.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ItemFields {
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
    pub env_type: Option<String>,
    #[serde(default)]
    pub images: Vec<Value>,
    #[serde(default)]
    pub position: Option<Position>,
}

impl ItemFields {
    #[must_use]
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub(crate) fn status_or_default(&self) -> &str {
        self.status.as_deref().unwrap_or(DEFAULT_STATUS)
    }
}

impl From<&Item> for ItemFields {
    fn from(item: &Item) -> Self {
        Self {
            name: item.name.clone(),
            item_type: item.item_type.clone(),
            description: item.description.clone(),
            status: Some(item.status.clone()),
            ip: item.ip.clone(),
            category: item.category.clone(),
            location: item.location.clone(),
            env_type: item.env_type.clone(),
            images: item.images.clone(),
            position: item.position,
        }
    }
}

/// Request to create an item, as it arrives from the outer layer.
///
/// `workspace_id` is optional here so that a missing value is reported as a
/// validation error instead of a deserialization failure.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NewItem {
    #[serde(default)]
    pub workspace_id: Option<WorkspaceId>,
    #[serde(default)]
    pub group_id: Option<GroupId>,
    #[serde(flatten)]
    pub fields: ItemFields,
}

impl NewItem {
    #[must_use]
    pub fn new(workspace_id: WorkspaceId, name: impl Into<String>) -> Self {
        Self {
            workspace_id: Some(workspace_id),
            group_id: None,
            fields: ItemFields::named(name),
        }
    }

    #[must_use]
    pub const fn in_group(mut self, group_id: GroupId) -> Self {
        self.group_id = Some(group_id);
        self
    }
}

/// An item reached by the affected-items traversal, with its hop distance
/// from the starting item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AffectedItem {
    #[serde(flatten)]
    pub item: Item,
    pub level: u32,
}

/// Coerce a stored image list into an array.
///
/// Accepts a JSON array, or a JSON string that itself encodes an array
/// (double-encoded legacy rows). Anything else, including malformed JSON,
/// becomes an empty list.
#[must_use]
pub fn normalize_images(raw: Option<&str>) -> Vec<Value> {
    let Some(raw) = raw else {
        return Vec::new();
    };
    match serde_json::from_str::<Value>(raw) {
        Ok(Value::Array(images)) => images,
        Ok(Value::String(inner)) => match serde_json::from_str::<Value>(&inner) {
            Ok(Value::Array(images)) => images,
            _ => Vec::new(),
        },
        _ => Vec::new(),
    }
}
