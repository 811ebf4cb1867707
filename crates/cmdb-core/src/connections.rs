//! Directed dependency edges between items and groups.
//!
//! A row populates exactly one source column and exactly one target column;
//! which pair is populated gives the edge its [`EdgeShape`]. Uniqueness of
//! `(source, target)` holds per shape, so `item 5 → item 9` and
//! `item 5 → group 9` are different edges.
//!
//! Writes go through [`Endpoint`] values, which cannot express a row with
//! both or neither column of a side populated. Reads re-check the same rule
//! and surface violations as [`CoreError::Corrupt`].

use rusqlite::{Connection as Db, OptionalExtension, Params, params};

use crate::config::DuplicatePolicy;
use crate::db::now_us;
use crate::error::{CoreError, Entity, Result};
use crate::model::connection::ConnectionRow;
use crate::model::{
    Connection, ConnectionId, EdgeRef, EdgeShape, Endpoint, GroupId, Item, ItemId, WorkspaceId,
};
use crate::{groups, items, routing, workspaces};

fn require_endpoint(db: &Db, endpoint: Endpoint, workspace: WorkspaceId) -> Result<()> {
    match endpoint {
        Endpoint::Item(id) => items::require_in_workspace(db, id, workspace),
        Endpoint::Group(id) => groups::require_in_workspace(db, id, workspace),
    }
}

const fn split(endpoint: Endpoint) -> (Option<ItemId>, Option<GroupId>) {
    match endpoint {
        Endpoint::Item(id) => (Some(id), None),
        Endpoint::Group(id) => (None, Some(id)),
    }
}

fn query_rows<P: Params>(db: &Db, sql: &str, params: P) -> Result<Vec<ConnectionRow>> {
    let mut stmt = db.prepare_cached(sql)?;
    let rows = stmt
        .query_map(params, ConnectionRow::from_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(rows)
}

fn query_typed<P: Params>(db: &Db, sql: &str, params: P) -> Result<Vec<Connection>> {
    query_rows(db, sql, params)?
        .into_iter()
        .map(ConnectionRow::into_connection)
        .collect()
}

/// # Errors
///
/// Returns [`CoreError::NotFound`] if no such connection exists.
pub fn get(db: &Db, id: ConnectionId) -> Result<Connection> {
    let sql = format!(
        "SELECT {} FROM connections WHERE connection_id = ?1",
        ConnectionRow::COLUMNS
    );
    db.query_row(&sql, params![id], ConnectionRow::from_row)
        .optional()?
        .ok_or_else(|| CoreError::not_found(Entity::Connection, id))?
        .into_connection()
}

/// Look up the edge `source → target` interpreted through `shape`.
///
/// # Errors
///
/// Returns an error if the query fails or the stored row is corrupt.
pub fn find(db: &Db, shape: EdgeShape, source: i64, target: i64) -> Result<Option<Connection>> {
    let sql = format!(
        "SELECT {} FROM connections WHERE {} = ?1 AND {} = ?2",
        ConnectionRow::COLUMNS,
        shape.source_column(),
        shape.target_column()
    );
    db.query_row(&sql, params![source, target], ConnectionRow::from_row)
        .optional()?
        .map(ConnectionRow::into_connection)
        .transpose()
}

/// Create the edge `source → target` in `workspace`.
///
/// Both endpoints must exist and belong to `workspace`. When the edge already
/// exists, `policy` decides between returning it and failing.
///
/// # Errors
///
/// - [`CoreError::NotFound`] if the workspace or an endpoint does not exist.
/// - [`CoreError::Validation`] if an endpoint belongs to another workspace.
/// - [`CoreError::Conflict`] for an existing edge under [`DuplicatePolicy::Reject`].
pub fn create(
    db: &Db,
    workspace: WorkspaceId,
    source: Endpoint,
    target: Endpoint,
    policy: DuplicatePolicy,
) -> Result<Connection> {
    workspaces::require(db, workspace)?;
    require_endpoint(db, source, workspace)?;
    require_endpoint(db, target, workspace)?;

    let shape = EdgeShape::from_endpoints(source, target);
    if let Some(existing) = find(db, shape, source.raw_id(), target.raw_id())? {
        return match policy {
            DuplicatePolicy::Idempotent => {
                tracing::debug!(connection = %existing.id, %shape, "connection already exists");
                Ok(existing)
            }
            DuplicatePolicy::Reject => Err(CoreError::Conflict(format!(
                "{shape} connection {source} -> {target} already exists"
            ))),
        };
    }

    let (source_id, source_group_id) = split(source);
    let (target_id, target_group_id) = split(target);
    db.execute(
        "INSERT INTO connections (
            workspace_id, source_id, source_group_id, target_id, target_group_id, created_at_us
         ) VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            workspace,
            source_id,
            source_group_id,
            target_id,
            target_group_id,
            now_us()
        ],
    )?;
    let id = ConnectionId(db.last_insert_rowid());
    tracing::debug!(connection = %id, %shape, %source, %target, "created connection");
    get(db, id)
}

/// Delete the edge `source → target` of `shape` together with its routing
/// record, which a group→group pair keeps while a legacy link still draws
/// it. Returns the number of connection rows removed.
///
/// # Errors
///
/// Returns an error if a delete fails.
pub fn delete(db: &Db, shape: EdgeShape, source: i64, target: i64) -> Result<usize> {
    let sql = format!(
        "DELETE FROM connections WHERE {} = ?1 AND {} = ?2",
        shape.source_column(),
        shape.target_column()
    );
    let removed = db.execute(&sql, params![source, target])?;
    routing::delete_if_dead(db, EdgeRef::new(shape, source, target))?;
    Ok(removed)
}

/// Every edge where `item` is the source or the target.
///
/// # Errors
///
/// Returns an error if the query fails or a row is corrupt.
pub fn list_for_item(db: &Db, item: ItemId) -> Result<Vec<Connection>> {
    let sql = format!(
        "SELECT {} FROM connections WHERE source_id = ?1 OR target_id = ?1 ORDER BY connection_id",
        ConnectionRow::COLUMNS
    );
    query_typed(db, &sql, params![item])
}

/// Every edge where `group` is the source or the target.
///
/// # Errors
///
/// Returns an error if the query fails or a row is corrupt.
pub fn list_for_group(db: &Db, group: GroupId) -> Result<Vec<Connection>> {
    let sql = format!(
        "SELECT {} FROM connections
         WHERE source_group_id = ?1 OR target_group_id = ?1
         ORDER BY connection_id",
        ConnectionRow::COLUMNS
    );
    query_typed(db, &sql, params![group])
}

/// # Errors
///
/// Returns an error if the query fails or a row is corrupt.
pub fn list_workspace(db: &Db, workspace: WorkspaceId) -> Result<Vec<Connection>> {
    query_typed(db, &workspace_sql(), params![workspace])
}

fn workspace_sql() -> String {
    format!(
        "SELECT {} FROM connections WHERE workspace_id = ?1 ORDER BY connection_id",
        ConnectionRow::COLUMNS
    )
}

/// Rows of a workspace without the exclusivity check.
pub(crate) fn rows_in_workspace(db: &Db, workspace: WorkspaceId) -> Result<Vec<ConnectionRow>> {
    query_rows(db, &workspace_sql(), params![workspace])
}

/// Targets of item→item edges sourced at `item`.
pub(crate) fn outgoing_items(db: &Db, item: ItemId) -> Result<Vec<ItemId>> {
    let mut stmt = db.prepare_cached(
        "SELECT target_id FROM connections
         WHERE source_id = ?1 AND target_id IS NOT NULL
         ORDER BY target_id",
    )?;
    let ids = stmt
        .query_map(params![item], |row| row.get(0))?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(ids)
}

fn incoming_items(db: &Db, item: ItemId) -> Result<Vec<ItemId>> {
    let mut stmt = db.prepare_cached(
        "SELECT source_id FROM connections
         WHERE target_id = ?1 AND source_id IS NOT NULL
         ORDER BY source_id",
    )?;
    let ids = stmt
        .query_map(params![item], |row| row.get(0))?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(ids)
}

/// Items reachable over one outgoing item→item edge from `item`.
///
/// # Errors
///
/// Returns [`CoreError::NotFound`] if `item` does not exist.
pub fn list_dependents(db: &Db, item: ItemId) -> Result<Vec<Item>> {
    items::get(db, item)?;
    items::get_many(db, &outgoing_items(db, item)?)
}

/// Items with an item→item edge pointing at `item`.
///
/// # Errors
///
/// Returns [`CoreError::NotFound`] if `item` does not exist.
pub fn list_dependencies(db: &Db, item: ItemId) -> Result<Vec<Item>> {
    items::get(db, item)?;
    items::get_many(db, &incoming_items(db, item)?)
}

/// Remove every edge that has `endpoint` on either side.
pub(crate) fn delete_for_endpoint(db: &Db, endpoint: Endpoint) -> Result<usize> {
    let removed = match endpoint {
        Endpoint::Item(id) => db.execute(
            "DELETE FROM connections WHERE source_id = ?1 OR target_id = ?1",
            params![id],
        )?,
        Endpoint::Group(id) => db.execute(
            "DELETE FROM connections WHERE source_group_id = ?1 OR target_group_id = ?1",
            params![id],
        )?,
    };
    Ok(removed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Handles;
    use crate::test_support::Fixture;

    fn count(fx: &Fixture) -> i64 {
        fx.conn
            .query_row("SELECT COUNT(*) FROM connections", [], |row| row.get(0))
            .expect("count")
    }

    #[test]
    fn all_four_shapes_are_stored_in_their_columns() {
        let fx = Fixture::new();
        let g1 = fx.group("g1");
        let g2 = fx.group("g2");
        let a = fx.loose_item("a");
        let b = fx.loose_item("b");

        for (source, target) in [
            (Endpoint::Item(a), Endpoint::Item(b)),
            (Endpoint::Item(a), Endpoint::Group(g1)),
            (Endpoint::Group(g1), Endpoint::Item(b)),
            (Endpoint::Group(g1), Endpoint::Group(g2)),
        ] {
            let edge = fx.connect(source, target);
            assert_eq!(edge.source, source);
            assert_eq!(edge.target, target);
            let found = find(&fx.conn, edge.shape(), source.raw_id(), target.raw_id())
                .expect("find")
                .expect("present");
            assert_eq!(found.id, edge.id);
        }
        assert_eq!(count(&fx), 4);
    }

    #[test]
    fn duplicate_create_is_idempotent_by_default() {
        let fx = Fixture::new();
        let a = fx.loose_item("a");
        let b = fx.loose_item("b");
        let first = fx.connect(Endpoint::Item(a), Endpoint::Item(b));
        let second = fx.connect(Endpoint::Item(a), Endpoint::Item(b));
        assert_eq!(first.id, second.id);
        assert_eq!(count(&fx), 1);
    }

    #[test]
    fn duplicate_create_conflicts_under_reject() {
        let fx = Fixture::new();
        let a = fx.loose_item("a");
        let b = fx.loose_item("b");
        fx.connect(Endpoint::Item(a), Endpoint::Item(b));
        let err = create(
            &fx.conn,
            fx.ws,
            Endpoint::Item(a),
            Endpoint::Item(b),
            DuplicatePolicy::Reject,
        )
        .expect_err("duplicate");
        assert!(matches!(err, CoreError::Conflict(_)));
        assert_eq!(count(&fx), 1);
    }

    #[test]
    fn same_ids_in_another_shape_are_distinct() {
        let fx = Fixture::new();
        let g = fx.group("g");
        let a = fx.loose_item("a");
        // Item and group ids both start at 1 in a fresh store.
        assert_eq!(a.0, g.0);
        let b = fx.loose_item("b");
        fx.connect(Endpoint::Item(b), Endpoint::Item(a));
        fx.connect(Endpoint::Item(b), Endpoint::Group(g));
        assert_eq!(count(&fx), 2);
    }

    #[test]
    fn endpoints_are_validated() {
        let fx = Fixture::new();
        let a = fx.loose_item("a");
        let err = create(
            &fx.conn,
            fx.ws,
            Endpoint::Item(a),
            Endpoint::Item(ItemId(500)),
            DuplicatePolicy::Idempotent,
        )
        .expect_err("missing target");
        assert!(matches!(err, CoreError::NotFound { entity: Entity::Item, .. }));

        let other = fx.workspace("other");
        let foreign = fx.item_in_ws(other, "f", None);
        let err = create(
            &fx.conn,
            fx.ws,
            Endpoint::Item(a),
            Endpoint::Item(foreign),
            DuplicatePolicy::Idempotent,
        )
        .expect_err("foreign target");
        assert!(matches!(err, CoreError::Validation(_)));
        assert_eq!(count(&fx), 0);
    }

    #[test]
    fn delete_removes_edge_and_routing() {
        let fx = Fixture::new();
        let a = fx.loose_item("a");
        let g = fx.group("g");
        fx.connect(Endpoint::Item(a), Endpoint::Group(g));
        let edge = EdgeRef::new(EdgeShape::ItemGroup, a.0, g.0);
        let handles = Handles {
            source_handle: "right".into(),
            target_handle: "left".into(),
        };
        routing::upsert(&fx.conn, fx.ws, edge, &handles).expect("route");

        assert_eq!(delete(&fx.conn, EdgeShape::ItemGroup, a.0, g.0).expect("delete"), 1);
        assert_eq!(count(&fx), 0);
        assert!(routing::list_all(&fx.conn, fx.ws).expect("routing").is_empty());
        assert_eq!(delete(&fx.conn, EdgeShape::ItemGroup, a.0, g.0).expect("again"), 0);
    }

    #[test]
    fn listings_by_endpoint() {
        let fx = Fixture::new();
        let g = fx.group("g");
        let a = fx.loose_item("a");
        let b = fx.loose_item("b");
        let c = fx.loose_item("c");
        fx.connect(Endpoint::Item(a), Endpoint::Item(b));
        fx.connect(Endpoint::Item(c), Endpoint::Item(a));
        fx.connect(Endpoint::Item(a), Endpoint::Group(g));
        fx.connect(Endpoint::Group(g), Endpoint::Item(c));

        assert_eq!(list_for_item(&fx.conn, a).expect("item").len(), 3);
        assert_eq!(list_for_group(&fx.conn, g).expect("group").len(), 2);
        assert_eq!(list_workspace(&fx.conn, fx.ws).expect("ws").len(), 4);

        let dependents: Vec<_> = list_dependents(&fx.conn, a)
            .expect("dependents")
            .into_iter()
            .map(|item| item.id)
            .collect();
        assert_eq!(dependents, vec![b]);
        let dependencies: Vec<_> = list_dependencies(&fx.conn, a)
            .expect("dependencies")
            .into_iter()
            .map(|item| item.id)
            .collect();
        assert_eq!(dependencies, vec![c]);
    }

    #[test]
    fn deleting_an_endpoint_cascades() {
        let fx = Fixture::new();
        let a = fx.loose_item("a");
        let b = fx.loose_item("b");
        fx.connect(Endpoint::Item(a), Endpoint::Item(b));
        fx.conn
            .execute("DELETE FROM cmdb_items WHERE item_id = ?1", params![b])
            .expect("raw delete");
        assert_eq!(count(&fx), 0);
    }
}
