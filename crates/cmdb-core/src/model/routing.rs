//! Edge references and routing records.
//!
//! A routing record stores which visual handle each end of an edge attaches
//! to. Edges are referenced by an [`EdgeRef`], a structured value that is
//! rendered to (and parsed from) the textual edge id only at the outer
//! boundary:
//!
//! | Shape       | Edge id                 |
//! |-------------|-------------------------|
//! | item→item   | `e{item}-{item}`        |
//! | item→group  | `e{item}-group{group}`  |
//! | group→item  | `group{group}-e{item}`  |
//! | group→group | `group-e{group}-{group}`|

use rusqlite::Row;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use super::connection::{Connection, EdgeShape, Endpoint};
use super::ids::{GroupId, ItemId, WorkspaceId};
use crate::error::CoreError;

/// Structured reference to an edge between two endpoints.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub struct EdgeRef {
    pub kind: EdgeShape,
    pub a: i64,
    pub b: i64,
}

impl EdgeRef {
    #[must_use]
    pub const fn new(kind: EdgeShape, a: i64, b: i64) -> Self {
        Self { kind, a, b }
    }

    #[must_use]
    pub const fn for_connection(conn: &Connection) -> Self {
        Self {
            kind: conn.shape(),
            a: conn.source.raw_id(),
            b: conn.target.raw_id(),
        }
    }

    #[must_use]
    pub const fn source(&self) -> Endpoint {
        self.kind.endpoints(self.a, self.b).0
    }

    #[must_use]
    pub const fn target(&self) -> Endpoint {
        self.kind.endpoints(self.a, self.b).1
    }

    /// Substitute both ids through the clone mappings. `None` when either id
    /// has no mapping.
    #[must_use]
    pub fn remap(
        &self,
        items: &HashMap<ItemId, ItemId>,
        groups: &HashMap<GroupId, GroupId>,
    ) -> Option<Self> {
        let map = |endpoint: Endpoint| match endpoint {
            Endpoint::Item(id) => items.get(&id).map(|new| new.0),
            Endpoint::Group(id) => groups.get(&id).map(|new| new.0),
        };
        Some(Self {
            kind: self.kind,
            a: map(self.source())?,
            b: map(self.target())?,
        })
    }
}

impl fmt::Display for EdgeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (a, b) = (self.a, self.b);
        match self.kind {
            EdgeShape::ItemItem => write!(f, "e{a}-{b}"),
            EdgeShape::ItemGroup => write!(f, "e{a}-group{b}"),
            EdgeShape::GroupItem => write!(f, "group{a}-e{b}"),
            EdgeShape::GroupGroup => write!(f, "group-e{a}-{b}"),
        }
    }
}

fn parse_id(raw: &str) -> Option<i64> {
    if raw.is_empty() || !raw.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    raw.parse().ok()
}

fn parse_pair(a: &str, b: &str) -> Option<(i64, i64)> {
    Some((parse_id(a)?, parse_id(b)?))
}

impl FromStr for EdgeRef {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parsed = if let Some(rest) = s.strip_prefix("group-e") {
            rest.split_once('-')
                .and_then(|(a, b)| parse_pair(a, b))
                .map(|(a, b)| Self::new(EdgeShape::GroupGroup, a, b))
        } else if let Some(rest) = s.strip_prefix("group") {
            rest.split_once("-e")
                .and_then(|(a, b)| parse_pair(a, b))
                .map(|(a, b)| Self::new(EdgeShape::GroupItem, a, b))
        } else if let Some(rest) = s.strip_prefix('e') {
            if let Some((a, b)) = rest.split_once("-group") {
                parse_pair(a, b).map(|(a, b)| Self::new(EdgeShape::ItemGroup, a, b))
            } else {
                rest.split_once('-')
                    .and_then(|(a, b)| parse_pair(a, b))
                    .map(|(a, b)| Self::new(EdgeShape::ItemItem, a, b))
            }
        } else {
            None
        };

        parsed.ok_or_else(|| CoreError::Validation(format!("unrecognized edge id '{s}'")))
    }
}

impl From<EdgeRef> for String {
    fn from(edge: EdgeRef) -> Self {
        edge.to_string()
    }
}

impl TryFrom<String> for EdgeRef {
    type Error = CoreError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

/// Which handle each end of an edge attaches to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoutingRecord {
    pub id: i64,
    pub workspace_id: WorkspaceId,
    pub edge_id: EdgeRef,
    pub source_handle: String,
    pub target_handle: String,
    pub created_at_us: i64,
    pub updated_at_us: i64,
}

impl RoutingRecord {
    pub(crate) const COLUMNS: &'static str = "routing_id, workspace_id, edge_kind, a_id, b_id, \
         source_handle, target_handle, created_at_us, updated_at_us";

    pub(crate) fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        let kind: String = row.get(2)?;
        let kind = kind.parse::<EdgeShape>().map_err(|err| {
            rusqlite::Error::FromSqlConversionFailure(2, rusqlite::types::Type::Text, Box::new(err))
        })?;
        Ok(Self {
            id: row.get(0)?,
            workspace_id: row.get(1)?,
            edge_id: EdgeRef::new(kind, row.get(3)?, row.get(4)?),
            source_handle: row.get(5)?,
            target_handle: row.get(6)?,
            created_at_us: row.get(7)?,
            updated_at_us: row.get(8)?,
        })
    }
}

/// Handle pair supplied by callers of the upsert operations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Handles {
    pub source_handle: String,
    pub target_handle: String,
}
