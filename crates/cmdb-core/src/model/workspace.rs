use rusqlite::Row;
use serde::{Deserialize, Serialize};

use super::ids::WorkspaceId;

/// Isolation boundary owning every group, item, connection and routing
/// record beneath it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Workspace {
    pub id: WorkspaceId,
    pub name: String,
    pub description: Option<String>,
    pub is_default: bool,
    pub created_at_us: i64,
    pub updated_at_us: i64,
}

impl Workspace {
    pub(crate) const COLUMNS: &'static str =
        "workspace_id, name, description, is_default, created_at_us, updated_at_us";

    pub(crate) fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            name: row.get(1)?,
            description: row.get(2)?,
            is_default: row.get(3)?,
            created_at_us: row.get(4)?,
            updated_at_us: row.get(5)?,
        })
    }
}
