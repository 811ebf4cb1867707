//! Edges on a service canvas: item→item connections and group links whose
//! target is a group or an item. Both kinds are idempotent on their pair.

use rusqlite::{Connection, params};

use super::{groups, items, routing};
use crate::db::now_us;
use crate::error::{CoreError, Result};
use crate::model::{
    EdgeRef, EdgeShape, ServiceConnection, ServiceGroupId, ServiceGroupLink, ServiceId,
    ServiceItemId, ServiceLinkTarget,
};

/// Connect two items of `service`. Connecting an existing pair returns the
/// stored connection.
///
/// # Errors
///
/// - [`CoreError::NotFound`] if the service or either item does not exist.
/// - [`CoreError::Validation`] if an item belongs to another service.
pub fn connect_items(
    conn: &Connection,
    service: ServiceId,
    source: ServiceItemId,
    target: ServiceItemId,
) -> Result<ServiceConnection> {
    let owner = super::get(conn, service)?;
    items::require_in_service(conn, source, service)?;
    items::require_in_service(conn, target, service)?;
    let inserted = conn.execute(
        "INSERT OR IGNORE INTO service_connections (
            service_id, workspace_id, source_id, target_id, created_at_us
         ) VALUES (?1, ?2, ?3, ?4, ?5)",
        params![service, owner.workspace_id, source, target, now_us()],
    )?;
    if inserted > 0 {
        tracing::debug!(service = %service, %source, %target, "connected service items");
    }
    let sql = format!(
        "SELECT {} FROM service_connections
         WHERE service_id = ?1 AND source_id = ?2 AND target_id = ?3",
        ServiceConnection::COLUMNS
    );
    Ok(conn.query_row(&sql, params![service, source, target], ServiceConnection::from_row)?)
}

/// Remove the connection between two items and, with it, the routing of
/// its edge. Returns whether a connection was removed.
///
/// # Errors
///
/// Returns an error if the delete fails.
pub fn disconnect_items(
    conn: &Connection,
    service: ServiceId,
    source: ServiceItemId,
    target: ServiceItemId,
) -> Result<bool> {
    let removed = conn.execute(
        "DELETE FROM service_connections
         WHERE service_id = ?1 AND source_id = ?2 AND target_id = ?3",
        params![service, source, target],
    )?;
    if removed == 0 {
        return Ok(false);
    }
    let edge = EdgeRef::new(EdgeShape::ItemItem, source.0, target.0);
    routing::delete_if_dead(conn, service, edge)?;
    Ok(true)
}

/// # Errors
///
/// Returns an error if the query fails.
pub fn list_connections(conn: &Connection, service: ServiceId) -> Result<Vec<ServiceConnection>> {
    let sql = format!(
        "SELECT {} FROM service_connections WHERE service_id = ?1
         ORDER BY service_connection_id",
        ServiceConnection::COLUMNS
    );
    let mut stmt = conn.prepare_cached(&sql)?;
    let rows = stmt
        .query_map(params![service], ServiceConnection::from_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(rows)
}

fn check_target(conn: &Connection, service: ServiceId, target: ServiceLinkTarget) -> Result<()> {
    match target {
        ServiceLinkTarget::Group(group) => groups::require_in_service(conn, group, service),
        ServiceLinkTarget::Item(item) => items::require_in_service(conn, item, service),
    }
}

const fn target_columns(
    target: ServiceLinkTarget,
) -> (Option<ServiceGroupId>, Option<ServiceItemId>) {
    match target {
        ServiceLinkTarget::Group(group) => (Some(group), None),
        ServiceLinkTarget::Item(item) => (None, Some(item)),
    }
}

/// Link a group of `service` to another group or to an item. Linking an
/// existing pair returns the stored link.
///
/// # Errors
///
/// - [`CoreError::NotFound`] if the service or either end does not exist.
/// - [`CoreError::Validation`] for a group linked to itself, or an end that
///   belongs to another service.
pub fn link_group(
    conn: &Connection,
    service: ServiceId,
    source: ServiceGroupId,
    target: ServiceLinkTarget,
) -> Result<ServiceGroupLink> {
    if target == ServiceLinkTarget::Group(source) {
        return Err(CoreError::Validation(format!(
            "service group {source} cannot link to itself"
        )));
    }
    let owner = super::get(conn, service)?;
    groups::require_in_service(conn, source, service)?;
    check_target(conn, service, target)?;
    let (target_group, target_item) = target_columns(target);
    let inserted = conn.execute(
        "INSERT OR IGNORE INTO service_group_connections (
            service_id, workspace_id, source_group_id, target_group_id, target_item_id,
            created_at_us
         ) VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![service, owner.workspace_id, source, target_group, target_item, now_us()],
    )?;
    if inserted > 0 {
        tracing::debug!(service = %service, %source, ?target, "linked service group");
    }
    let sql = format!(
        "SELECT {} FROM service_group_connections
         WHERE service_id = ?1 AND source_group_id = ?2
           AND target_group_id IS ?3 AND target_item_id IS ?4",
        ServiceGroupLink::COLUMNS
    );
    Ok(conn.query_row(
        &sql,
        params![service, source, target_group, target_item],
        ServiceGroupLink::from_row,
    )?)
}

/// Remove a group link and the routing of its edge. Returns whether a link
/// was removed.
///
/// # Errors
///
/// Returns an error if the delete fails.
pub fn unlink_group(
    conn: &Connection,
    service: ServiceId,
    source: ServiceGroupId,
    target: ServiceLinkTarget,
) -> Result<bool> {
    let (target_group, target_item) = target_columns(target);
    let removed = conn.execute(
        "DELETE FROM service_group_connections
         WHERE service_id = ?1 AND source_group_id = ?2
           AND target_group_id IS ?3 AND target_item_id IS ?4",
        params![service, source, target_group, target_item],
    )?;
    if removed == 0 {
        return Ok(false);
    }
    routing::delete_if_dead(conn, service, routing::link_edge(source, target))?;
    Ok(true)
}

/// # Errors
///
/// Returns an error if the query fails.
pub fn list_group_links(conn: &Connection, service: ServiceId) -> Result<Vec<ServiceGroupLink>> {
    let sql = format!(
        "SELECT {} FROM service_group_connections WHERE service_id = ?1 ORDER BY link_id",
        ServiceGroupLink::COLUMNS
    );
    let mut stmt = conn.prepare_cached(&sql)?;
    let rows = stmt
        .query_map(params![service], ServiceGroupLink::from_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Entity;
    use crate::model::{GroupFields, Handles, ServiceItemFields};
    use crate::test_support::Fixture;

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
    }

    fn handles() -> Handles {
        Handles {
            source_handle: "right".into(),
            target_handle: "left".into(),
        }
    }

    #[test]
    fn connecting_twice_returns_the_same_edge() {
        let canvas = Canvas::new();
        let a = canvas.item("a");
        let b = canvas.item("b");

        let first = connect_items(&canvas.fx.conn, canvas.service, a, b).expect("connect");
        let again = connect_items(&canvas.fx.conn, canvas.service, a, b).expect("again");
        assert_eq!(first, again);
        assert_eq!(first.workspace_id, canvas.fx.ws);
        assert_eq!(first.edge().to_string(), format!("e{a}-{b}"));
        assert_eq!(list_connections(&canvas.fx.conn, canvas.service).expect("list").len(), 1);
    }

    #[test]
    fn items_of_other_services_cannot_be_connected() {
        let canvas = Canvas::new();
        let a = canvas.item("a");
        let other_owner = canvas.fx.loose_item("web");
        let other = canvas.fx.service(other_owner, "search");
        let foreign = items::create(&canvas.fx.conn, other, None, &ServiceItemFields::named("x"))
            .expect("foreign")
            .id;

        let err = connect_items(&canvas.fx.conn, canvas.service, a, foreign).expect_err("foreign");
        assert!(matches!(err, CoreError::Validation(_)));
        let err = connect_items(&canvas.fx.conn, canvas.service, a, ServiceItemId(404))
            .expect_err("missing");
        assert!(matches!(err, CoreError::NotFound { entity: Entity::ServiceItem, .. }));
    }

    #[test]
    fn disconnect_drops_the_edge_routing() {
        let canvas = Canvas::new();
        let a = canvas.item("a");
        let b = canvas.item("b");
        let edge = connect_items(&canvas.fx.conn, canvas.service, a, b).expect("connect").edge();
        routing::upsert(&canvas.fx.conn, canvas.service, edge, &handles()).expect("route");

        assert!(disconnect_items(&canvas.fx.conn, canvas.service, a, b).expect("disconnect"));
        assert!(!disconnect_items(&canvas.fx.conn, canvas.service, a, b).expect("again"));
        assert!(routing::list_all(&canvas.fx.conn, canvas.service).expect("all").is_empty());
    }

    #[test]
    fn group_links_reach_groups_and_items() {
        let canvas = Canvas::new();
        let (conn, service) = (&canvas.fx.conn, canvas.service);
        let g1 = canvas.group("g1");
        let g2 = canvas.group("g2");
        let db = canvas.item("db");

        let to_group = link_group(conn, service, g1, ServiceLinkTarget::Group(g2)).expect("group");
        let to_item = link_group(conn, service, g1, ServiceLinkTarget::Item(db)).expect("item");
        let again = link_group(conn, service, g1, ServiceLinkTarget::Group(g2)).expect("again");
        assert_eq!(again, to_group);
        assert_eq!(to_item.target, ServiceLinkTarget::Item(db));
        assert_eq!(list_group_links(conn, service).expect("links").len(), 2);

        let err = link_group(conn, service, g1, ServiceLinkTarget::Group(g1)).expect_err("self");
        assert!(matches!(err, CoreError::Validation(_)));
    }

    #[test]
    fn unlink_removes_only_the_named_target() {
        let canvas = Canvas::new();
        let (conn, service) = (&canvas.fx.conn, canvas.service);
        let g1 = canvas.group("g1");
        let g2 = canvas.group("g2");
        let db = canvas.item("db");
        let group_edge = link_group(conn, service, g1, ServiceLinkTarget::Group(g2))
            .expect("group link")
            .edge();
        link_group(conn, service, g1, ServiceLinkTarget::Item(db)).expect("item link");
        routing::upsert(conn, service, group_edge, &handles()).expect("route");

        assert!(unlink_group(conn, service, g1, ServiceLinkTarget::Group(g2)).expect("unlink"));
        let left = list_group_links(conn, service).expect("links");
        assert_eq!(left.len(), 1);
        assert_eq!(left[0].target, ServiceLinkTarget::Item(db));
        assert!(routing::list_all(conn, service).expect("all").is_empty());
    }
}
