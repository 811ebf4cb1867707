//! Groups on a service canvas.

use rusqlite::{Connection, OptionalExtension, params};

use super::routing;
use crate::db::now_us;
use crate::error::{CoreError, Entity, Result};
use crate::model::group::DEFAULT_GROUP_COLOR;
use crate::model::{GroupFields, Position, ServiceGroup, ServiceGroupId, ServiceId};

fn validate(fields: &GroupFields) -> Result<&str> {
    let name = fields.name.trim();
    if name.is_empty() {
        return Err(CoreError::Validation("group name is required".into()));
    }
    Ok(name)
}

/// # Errors
///
/// Returns an error if the query fails.
pub fn find(conn: &Connection, id: ServiceGroupId) -> Result<Option<ServiceGroup>> {
    let sql = format!(
        "SELECT {} FROM service_groups WHERE service_group_id = ?1",
        ServiceGroup::COLUMNS
    );
    Ok(conn.query_row(&sql, params![id], ServiceGroup::from_row).optional()?)
}

/// # Errors
///
/// Returns [`CoreError::NotFound`] if the group does not exist.
pub fn get(conn: &Connection, id: ServiceGroupId) -> Result<ServiceGroup> {
    find(conn, id)?.ok_or_else(|| CoreError::not_found(Entity::ServiceGroup, id))
}

/// Fail unless `group` exists on the canvas of `service`.
pub(crate) fn require_in_service(
    conn: &Connection,
    group: ServiceGroupId,
    service: ServiceId,
) -> Result<()> {
    let owner: Option<ServiceId> = conn
        .query_row(
            "SELECT service_id FROM service_groups WHERE service_group_id = ?1",
            params![group],
            |row| row.get(0),
        )
        .optional()?;
    match owner {
        None => Err(CoreError::not_found(Entity::ServiceGroup, group)),
        Some(owner) if owner != service => Err(CoreError::Validation(format!(
            "service group {group} belongs to service {owner}, not {service}"
        ))),
        Some(_) => Ok(()),
    }
}

/// # Errors
///
/// Returns an error if the query fails.
pub fn list(conn: &Connection, service: ServiceId) -> Result<Vec<ServiceGroup>> {
    let sql = format!(
        "SELECT {} FROM service_groups WHERE service_id = ?1
         ORDER BY created_at_us, service_group_id",
        ServiceGroup::COLUMNS
    );
    let mut stmt = conn.prepare_cached(&sql)?;
    let rows = stmt
        .query_map(params![service], ServiceGroup::from_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(rows)
}

/// # Errors
///
/// - [`CoreError::Validation`] for an empty name.
/// - [`CoreError::NotFound`] if the service does not exist.
pub fn create(
    conn: &Connection,
    service: ServiceId,
    fields: &GroupFields,
) -> Result<ServiceGroup> {
    let name = validate(fields)?;
    let owner = super::get(conn, service)?;
    conn.execute(
        "INSERT INTO service_groups (
            service_id, workspace_id, name, description, color, position_json, created_at_us
         ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            service,
            owner.workspace_id,
            name,
            fields.description,
            fields.color.as_deref().unwrap_or(DEFAULT_GROUP_COLOR),
            Position::to_json(fields.position.as_ref())?,
            now_us(),
        ],
    )?;
    get(conn, ServiceGroupId(conn.last_insert_rowid()))
}

/// Replace the descriptive fields. Absent color and position keep the
/// stored values.
///
/// # Errors
///
/// - [`CoreError::Validation`] for an empty name.
/// - [`CoreError::NotFound`] if the group does not exist.
pub fn update(
    conn: &Connection,
    id: ServiceGroupId,
    fields: &GroupFields,
) -> Result<ServiceGroup> {
    let name = validate(fields)?;
    let current = get(conn, id)?;
    let color = fields.color.as_deref().unwrap_or(&current.color);
    let position = fields.position.or(current.position);
    conn.execute(
        "UPDATE service_groups SET name = ?1, description = ?2, color = ?3, position_json = ?4
         WHERE service_group_id = ?5",
        params![
            name,
            fields.description,
            color,
            Position::to_json(position.as_ref())?,
            id
        ],
    )?;
    get(conn, id)
}

/// # Errors
///
/// Returns [`CoreError::NotFound`] if the group does not exist.
pub fn update_position(
    conn: &Connection,
    id: ServiceGroupId,
    position: Position,
) -> Result<ServiceGroup> {
    let changed = conn.execute(
        "UPDATE service_groups SET position_json = ?1 WHERE service_group_id = ?2",
        params![Position::to_json(Some(&position))?, id],
    )?;
    if changed == 0 {
        return Err(CoreError::not_found(Entity::ServiceGroup, id));
    }
    get(conn, id)
}

/// Delete a group. Members stay on the canvas without group or rank; links
/// from or to the group cascade, and their routing records go with them.
///
/// # Errors
///
/// Returns [`CoreError::NotFound`] if the group does not exist.
pub fn delete(conn: &Connection, id: ServiceGroupId) -> Result<ServiceGroup> {
    let group = get(conn, id)?;
    let ungrouped = conn.execute(
        "UPDATE service_items SET group_id = NULL, order_in_group = NULL, updated_at_us = ?1
         WHERE group_id = ?2",
        params![now_us(), id],
    )?;
    conn.execute(
        "DELETE FROM service_group_connections
         WHERE source_group_id = ?1 OR target_group_id = ?1",
        params![id],
    )?;
    let routes = routing::delete_for_group(conn, id)?;
    conn.execute("DELETE FROM service_groups WHERE service_group_id = ?1", params![id])?;
    tracing::info!(service_group = %id, ungrouped, routes, "deleted service group");
    Ok(group)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ServiceItemFields, ServiceLinkTarget};
    use crate::services::{items, links};
    use crate::test_support::Fixture;

    #[test]
    fn create_uses_service_workspace_and_default_color() {
        let fx = Fixture::new();
        let other = fx.workspace("other");
        let item = fx.item_in_ws(other, "api", None);
        let service = fx.service(item, "billing");

        let group = create(&fx.conn, service, &GroupFields::named("tier")).expect("create");
        assert_eq!(group.workspace_id, other);
        assert_eq!(group.color, DEFAULT_GROUP_COLOR);
        assert_eq!(list(&fx.conn, service).expect("list").len(), 1);
    }

    #[test]
    fn groups_are_scoped_to_their_service() {
        let fx = Fixture::new();
        let item = fx.loose_item("api");
        let first = fx.service(item, "billing");
        let second = fx.service(item, "search");
        let group = create(&fx.conn, first, &GroupFields::named("tier")).expect("create");

        require_in_service(&fx.conn, group.id, first).expect("own service");
        let err = require_in_service(&fx.conn, group.id, second).expect_err("other service");
        assert!(matches!(err, CoreError::Validation(_)));
        let err = require_in_service(&fx.conn, ServiceGroupId(77), first).expect_err("missing");
        assert!(matches!(err, CoreError::NotFound { entity: Entity::ServiceGroup, .. }));
    }

    #[test]
    fn delete_ungroups_members_and_drops_links() {
        let fx = Fixture::new();
        let item = fx.loose_item("api");
        let service = fx.service(item, "billing");
        let tier = create(&fx.conn, service, &GroupFields::named("tier")).expect("tier");
        let other = create(&fx.conn, service, &GroupFields::named("other")).expect("other");
        let fields = ServiceItemFields::named("db");
        let member = items::create(&fx.conn, service, Some(tier.id), &fields).expect("member");
        links::link_group(&fx.conn, service, other.id, ServiceLinkTarget::Group(tier.id))
            .expect("link");
        links::link_group(&fx.conn, service, tier.id, ServiceLinkTarget::Item(member.id))
            .expect("link to item");

        delete(&fx.conn, tier.id).expect("delete");

        let member = items::get(&fx.conn, member.id).expect("member survives");
        assert_eq!((member.group_id, member.order_in_group), (None, None));
        assert!(links::list_group_links(&fx.conn, service).expect("links").is_empty());
        assert_eq!(find(&fx.conn, tier.id).expect("find"), None);
    }
}
