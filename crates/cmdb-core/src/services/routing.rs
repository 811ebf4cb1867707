//! Handle placement of edges on a service canvas.
//!
//! Works like workspace edge routing, scoped by service: records are keyed
//! by `(service, edge id)`, reads only return records whose edge is still
//! drawn and writes refuse edges that are not. Service canvases have no
//! item→group edges.

use std::collections::BTreeMap;

use rusqlite::{Connection, OptionalExtension, params};

use crate::db::now_us;
use crate::error::{CoreError, Entity, Result};
use crate::model::{
    EdgeRef, EdgeShape, Handles, ServiceGroupId, ServiceId, ServiceItemId, ServiceLinkTarget,
    ServiceRouting,
};
use crate::routing::validate;

/// Predicate over `service_edge_routing r`: the record's edge is drawn on
/// its service canvas.
const LIVE_EDGE: &str = "(
    (r.edge_kind = 'item-item' AND EXISTS (
        SELECT 1 FROM service_connections c
        WHERE c.service_id = r.service_id AND c.source_id = r.a_id AND c.target_id = r.b_id))
    OR (r.edge_kind = 'group-item' AND EXISTS (
        SELECT 1 FROM service_group_connections g
        WHERE g.service_id = r.service_id AND g.source_group_id = r.a_id
          AND g.target_item_id = r.b_id))
    OR (r.edge_kind = 'group-group' AND EXISTS (
        SELECT 1 FROM service_group_connections g
        WHERE g.service_id = r.service_id AND g.source_group_id = r.a_id
          AND g.target_group_id = r.b_id))
)";

/// Canvas edge drawn for a group link.
#[must_use]
pub const fn link_edge(source: ServiceGroupId, target: ServiceLinkTarget) -> EdgeRef {
    match target {
        ServiceLinkTarget::Group(group) => EdgeRef::new(EdgeShape::GroupGroup, source.0, group.0),
        ServiceLinkTarget::Item(item) => EdgeRef::new(EdgeShape::GroupItem, source.0, item.0),
    }
}

fn check_shape(edge: EdgeRef) -> Result<()> {
    if edge.kind == EdgeShape::ItemGroup {
        return Err(CoreError::Validation(format!(
            "{edge}: service canvases have no item-to-group edges"
        )));
    }
    Ok(())
}

fn write(conn: &Connection, service: ServiceId, edge: EdgeRef, handles: &Handles) -> Result<()> {
    let owner = super::get(conn, service)?;
    let now = now_us();
    conn.execute(
        "INSERT INTO service_edge_routing (
            service_id, workspace_id, edge_id, edge_kind, a_id, b_id,
            source_handle, target_handle, created_at_us, updated_at_us
         ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?9)
         ON CONFLICT(service_id, edge_id) DO UPDATE SET
            source_handle = excluded.source_handle,
            target_handle = excluded.target_handle,
            updated_at_us = excluded.updated_at_us",
        params![
            service,
            owner.workspace_id,
            edge.to_string(),
            edge.kind.as_str(),
            edge.a,
            edge.b,
            handles.source_handle,
            handles.target_handle,
            now,
        ],
    )?;
    Ok(())
}

/// Whether `edge` is drawn on the canvas of `service`.
///
/// # Errors
///
/// Returns an error if the query fails.
pub fn is_live(conn: &Connection, service: ServiceId, edge: EdgeRef) -> Result<bool> {
    let sql = match edge.kind {
        EdgeShape::ItemGroup => return Ok(false),
        EdgeShape::ItemItem => {
            "SELECT EXISTS (SELECT 1 FROM service_connections
             WHERE service_id = ?1 AND source_id = ?2 AND target_id = ?3)"
        }
        EdgeShape::GroupItem => {
            "SELECT EXISTS (SELECT 1 FROM service_group_connections
             WHERE service_id = ?1 AND source_group_id = ?2 AND target_item_id = ?3)"
        }
        EdgeShape::GroupGroup => {
            "SELECT EXISTS (SELECT 1 FROM service_group_connections
             WHERE service_id = ?1 AND source_group_id = ?2 AND target_group_id = ?3)"
        }
    };
    Ok(conn.query_row(sql, params![service, edge.a, edge.b], |row| row.get(0))?)
}

/// Insert or update the routing record of `edge` on the canvas of
/// `service`.
///
/// # Errors
///
/// - [`CoreError::Validation`] for blank handles or an item→group edge.
/// - [`CoreError::NotFound`] if the service does not exist, or nothing on
///   its canvas draws `edge`.
pub fn upsert(
    conn: &Connection,
    service: ServiceId,
    edge: EdgeRef,
    handles: &Handles,
) -> Result<ServiceRouting> {
    validate(handles)?;
    check_shape(edge)?;
    if !is_live(conn, service, edge)? {
        super::get(conn, service)?;
        return Err(CoreError::not_found(Entity::Connection, edge));
    }
    write(conn, service, edge, handles)?;
    find_stored(conn, service, edge)?
        .ok_or_else(|| CoreError::Corrupt(format!("service routing for {edge} missing")))
}

/// Upsert several records of one service. Every entry is validated before
/// the first write; entries whose edge is not drawn are skipped.
///
/// # Errors
///
/// - [`CoreError::Validation`] for blank handles or an item→group edge in
///   any entry.
/// - [`CoreError::NotFound`] if the service does not exist.
pub fn bulk_upsert(
    conn: &Connection,
    service: ServiceId,
    entries: &[(EdgeRef, Handles)],
) -> Result<Vec<ServiceRouting>> {
    for (edge, handles) in entries {
        validate(handles)?;
        check_shape(*edge)?;
    }
    super::get(conn, service)?;
    let mut out = Vec::with_capacity(entries.len());
    for (edge, handles) in entries {
        if !is_live(conn, service, *edge)? {
            continue;
        }
        write(conn, service, *edge, handles)?;
        if let Some(record) = find_stored(conn, service, *edge)? {
            out.push(record);
        }
    }
    tracing::debug!(
        service = %service,
        count = out.len(),
        skipped = entries.len() - out.len(),
        "bulk upserted service edge routing"
    );
    Ok(out)
}

/// The record of `edge`, if one is stored and the edge is still drawn.
///
/// # Errors
///
/// Returns an error if the query fails.
pub fn get(conn: &Connection, service: ServiceId, edge: EdgeRef) -> Result<Option<ServiceRouting>> {
    let sql = format!(
        "SELECT {} FROM service_edge_routing r
         WHERE r.service_id = ?1 AND r.edge_id = ?2 AND {LIVE_EDGE}",
        ServiceRouting::COLUMNS
    );
    Ok(conn
        .query_row(&sql, params![service, edge.to_string()], ServiceRouting::from_row)
        .optional()?)
}

fn find_stored(
    conn: &Connection,
    service: ServiceId,
    edge: EdgeRef,
) -> Result<Option<ServiceRouting>> {
    let sql = format!(
        "SELECT {} FROM service_edge_routing WHERE service_id = ?1 AND edge_id = ?2",
        ServiceRouting::COLUMNS
    );
    Ok(conn
        .query_row(&sql, params![service, edge.to_string()], ServiceRouting::from_row)
        .optional()?)
}

/// Records of a service whose edge is still drawn.
///
/// # Errors
///
/// Returns an error if the query fails.
pub fn list(conn: &Connection, service: ServiceId) -> Result<Vec<ServiceRouting>> {
    let sql = format!(
        "SELECT {} FROM service_edge_routing r
         WHERE r.service_id = ?1 AND {LIVE_EDGE}
         ORDER BY r.routing_id",
        ServiceRouting::COLUMNS
    );
    query(conn, &sql, service)
}

/// Every record of a service, live edge or not.
pub(crate) fn list_all(conn: &Connection, service: ServiceId) -> Result<Vec<ServiceRouting>> {
    let sql = format!(
        "SELECT {} FROM service_edge_routing WHERE service_id = ?1 ORDER BY routing_id",
        ServiceRouting::COLUMNS
    );
    query(conn, &sql, service)
}

fn query(conn: &Connection, sql: &str, service: ServiceId) -> Result<Vec<ServiceRouting>> {
    let mut stmt = conn.prepare_cached(sql)?;
    let rows = stmt
        .query_map(params![service], ServiceRouting::from_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(rows)
}

/// Live handles of a service keyed by textual edge id, the shape canvas
/// renderers look edges up by.
///
/// # Errors
///
/// Returns an error if the query fails.
pub fn handle_map(conn: &Connection, service: ServiceId) -> Result<BTreeMap<String, Handles>> {
    Ok(list(conn, service)?
        .into_iter()
        .map(|record| {
            let handles = Handles {
                source_handle: record.source_handle,
                target_handle: record.target_handle,
            };
            (record.edge_id.to_string(), handles)
        })
        .collect())
}

/// Returns whether a record was removed.
///
/// # Errors
///
/// Returns an error if the delete fails.
pub fn delete(conn: &Connection, service: ServiceId, edge: EdgeRef) -> Result<bool> {
    let removed = conn.execute(
        "DELETE FROM service_edge_routing WHERE service_id = ?1 AND edge_id = ?2",
        params![service, edge.to_string()],
    )?;
    Ok(removed > 0)
}

/// Remove the record of `edge` once nothing on the canvas draws it.
pub(crate) fn delete_if_dead(conn: &Connection, service: ServiceId, edge: EdgeRef) -> Result<bool> {
    if is_live(conn, service, edge)? {
        return Ok(false);
    }
    delete(conn, service, edge)
}

/// Remove every record whose edge has `item` on either side.
pub(crate) fn delete_for_item(conn: &Connection, item: ServiceItemId) -> Result<usize> {
    Ok(conn.execute(
        "DELETE FROM service_edge_routing
         WHERE (edge_kind = 'item-item' AND (a_id = ?1 OR b_id = ?1))
            OR (edge_kind = 'group-item' AND b_id = ?1)",
        params![item],
    )?)
}

/// Remove every record whose edge has `group` on either side.
pub(crate) fn delete_for_group(conn: &Connection, group: ServiceGroupId) -> Result<usize> {
    Ok(conn.execute(
        "DELETE FROM service_edge_routing
         WHERE (edge_kind = 'group-item' AND a_id = ?1)
            OR (edge_kind = 'group-group' AND (a_id = ?1 OR b_id = ?1))",
        params![group],
    )?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{GroupFields, ServiceItemFields};
    use crate::services::{groups, items, links};
    use crate::test_support::Fixture;

    fn handles(source: &str, target: &str) -> Handles {
        Handles {
            source_handle: source.into(),
            target_handle: target.into(),
        }
    }

    struct Canvas {
        fx: Fixture,
        service: ServiceId,
    }

    impl Canvas {
        fn new() -> Self {
            let fx = Fixture::new();
            let owner = fx.loose_item("api");
            let service = fx.service(owner, "billing");
            Self { fx, service }
        }

        fn item(&self, name: &str) -> ServiceItemId {
            items::create(&self.fx.conn, self.service, None, &ServiceItemFields::named(name))
                .expect("item")
                .id
        }

        fn group(&self, name: &str) -> ServiceGroupId {
            groups::create(&self.fx.conn, self.service, &GroupFields::named(name))
                .expect("group")
                .id
        }

        fn connected(&self) -> EdgeRef {
            let (a, b) = (self.item("a"), self.item("b"));
            links::connect_items(&self.fx.conn, self.service, a, b)
                .expect("connect")
                .edge()
        }
    }

    #[test]
    fn upsert_updates_in_place() {
        let canvas = Canvas::new();
        let edge = canvas.connected();
        let (conn, service) = (&canvas.fx.conn, canvas.service);

        let first = upsert(conn, service, edge, &handles("r", "l")).expect("insert");
        let second = upsert(conn, service, edge, &handles("b", "t")).expect("update");
        assert_eq!(first.id, second.id);
        assert_eq!((second.source_handle.as_str(), second.target_handle.as_str()), ("b", "t"));
        assert_eq!(second.workspace_id, canvas.fx.ws);
        assert_eq!(second.edge_id, edge);
    }

    #[test]
    fn upsert_rejects_undrawn_and_item_to_group_edges() {
        let canvas = Canvas::new();
        let (conn, service) = (&canvas.fx.conn, canvas.service);
        let a = canvas.item("a");
        let g = canvas.group("g");

        let undrawn = EdgeRef::new(EdgeShape::GroupItem, g.0, a.0);
        let err = upsert(conn, service, undrawn, &handles("r", "l")).expect_err("undrawn");
        assert!(matches!(err, CoreError::NotFound { entity: Entity::Connection, .. }));
        let sideways = EdgeRef::new(EdgeShape::ItemGroup, a.0, g.0);
        let err = upsert(conn, service, sideways, &handles("r", "l")).expect_err("shape");
        assert!(matches!(err, CoreError::Validation(_)));
        let err = upsert(conn, ServiceId(404), undrawn, &handles("r", "l")).expect_err("service");
        assert!(matches!(err, CoreError::NotFound { entity: Entity::Service, .. }));
        assert!(list_all(conn, service).expect("all").is_empty());
    }

    #[test]
    fn same_edge_id_is_independent_per_service() {
        let canvas = Canvas::new();
        let edge = canvas.connected();
        let other_owner = canvas.fx.loose_item("web");
        let other = canvas.fx.service(other_owner, "search");
        upsert(&canvas.fx.conn, canvas.service, edge, &handles("r", "l")).expect("upsert");

        assert!(get(&canvas.fx.conn, canvas.service, edge).expect("own").is_some());
        assert_eq!(get(&canvas.fx.conn, other, edge).expect("other"), None);
        let err = upsert(&canvas.fx.conn, other, edge, &handles("r", "l")).expect_err("not drawn");
        assert!(matches!(err, CoreError::NotFound { entity: Entity::Connection, .. }));
    }

    #[test]
    fn bulk_upsert_skips_undrawn_and_maps_handles() {
        let canvas = Canvas::new();
        let (conn, service) = (&canvas.fx.conn, canvas.service);
        let live = canvas.connected();
        let g1 = canvas.group("g1");
        let g2 = canvas.group("g2");
        let linked = links::link_group(conn, service, g1, ServiceLinkTarget::Group(g2))
            .expect("link")
            .edge();
        let undrawn = EdgeRef::new(EdgeShape::GroupGroup, g2.0, g1.0);

        let entries = vec![
            (live, handles("r", "l")),
            (undrawn, handles("r", "l")),
            (linked, handles("b", "t")),
        ];
        let written = bulk_upsert(conn, service, &entries).expect("bulk");
        assert_eq!(written.len(), 2);

        let map = handle_map(conn, service).expect("map");
        assert_eq!(map.len(), 2);
        assert_eq!(map[&linked.to_string()], handles("b", "t"));
        assert!(!map.contains_key(&undrawn.to_string()));
    }

    #[test]
    fn deleting_an_endpoint_removes_its_routing() {
        let canvas = Canvas::new();
        let (conn, service) = (&canvas.fx.conn, canvas.service);
        let a = canvas.item("a");
        let b = canvas.item("b");
        let g = canvas.group("g");
        let item_edge = links::connect_items(conn, service, a, b).expect("connect").edge();
        let group_edge = links::link_group(conn, service, g, ServiceLinkTarget::Item(b))
            .expect("link")
            .edge();
        upsert(conn, service, item_edge, &handles("r", "l")).expect("item edge");
        upsert(conn, service, group_edge, &handles("r", "l")).expect("group edge");

        groups::delete(conn, g).expect("delete group");
        assert_eq!(list_all(conn, service).expect("all").len(), 1);
        items::delete(conn, a).expect("delete item");
        assert!(list_all(conn, service).expect("all").is_empty());
    }
}
