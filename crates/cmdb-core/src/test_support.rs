//! Fixtures shared by the unit tests.

use rusqlite::{Connection, params};

use crate::config::{DuplicatePolicy, OrderingConfig};
use crate::db::open_in_memory;
use crate::model::{
    Connection as Edge, Endpoint, GroupFields, GroupId, ItemId, NewItem, ServiceFields,
    ServiceId, WorkspaceId,
};
use crate::{connections, groups, items, services, workspaces};

pub fn clamp_on() -> OrderingConfig {
    OrderingConfig {
        clamp_out_of_range: true,
    }
}

pub fn clamp_off() -> OrderingConfig {
    OrderingConfig {
        clamp_out_of_range: false,
    }
}

/// Owned `(name, rank)` pairs for comparing against [`Fixture::ranked`].
pub fn ranks(pairs: &[(&str, i64)]) -> Vec<(String, i64)> {
    pairs
        .iter()
        .map(|(name, order)| ((*name).to_owned(), *order))
        .collect()
}

/// In-memory store with one workspace named `primary`.
pub struct Fixture {
    pub conn: Connection,
    pub ws: WorkspaceId,
}

impl Fixture {
    pub fn new() -> Self {
        let conn = open_in_memory().expect("open in-memory store");
        let ws = workspaces::create(&conn, "primary", None)
            .expect("create workspace")
            .id;
        Self { conn, ws }
    }

    pub fn workspace(&self, name: &str) -> WorkspaceId {
        workspaces::create(&self.conn, name, None)
            .expect("create workspace")
            .id
    }

    pub fn group(&self, name: &str) -> GroupId {
        self.group_in(self.ws, name)
    }

    pub fn group_in(&self, ws: WorkspaceId, name: &str) -> GroupId {
        groups::create(&self.conn, ws, &GroupFields::named(name))
            .expect("create group")
            .id
    }

    pub fn item_in_ws(&self, ws: WorkspaceId, name: &str, group: Option<GroupId>) -> ItemId {
        let mut request = NewItem::new(ws, name);
        request.group_id = group;
        items::create(&self.conn, &request).expect("create item").id
    }

    pub fn item_in(&self, name: &str, group: GroupId) -> ItemId {
        self.item_in_ws(self.ws, name, Some(group))
    }

    pub fn loose_item(&self, name: &str) -> ItemId {
        self.item_in_ws(self.ws, name, None)
    }

    pub fn connect(&self, source: Endpoint, target: Endpoint) -> Edge {
        connections::create(&self.conn, self.ws, source, target, DuplicatePolicy::Idempotent)
            .expect("create connection")
    }

    pub fn service(&self, item: ItemId, name: &str) -> ServiceId {
        services::create(&self.conn, item, &ServiceFields::named(name))
            .expect("create service")
            .id
    }

    /// `(name, order_in_group)` of the group's members, lowest rank first.
    pub fn ranked(&self, group: GroupId) -> Vec<(String, i64)> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT name, order_in_group FROM cmdb_items
                 WHERE group_id = ?1 ORDER BY order_in_group, item_id",
            )
            .expect("prepare");
        stmt.query_map(params![group], |row| Ok((row.get(0)?, row.get(1)?)))
            .expect("query")
            .collect::<rusqlite::Result<Vec<_>>>()
            .expect("rows")
    }
}
