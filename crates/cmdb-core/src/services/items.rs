//! Items on a service canvas. Membership and rank go through the shared
//! ordering engine, scoped by service.

use rusqlite::{Connection, OptionalExtension, params};

use super::{groups, routing};
use crate::config::OrderingConfig;
use crate::db::now_us;
use crate::error::{CoreError, Entity, Result};
use crate::model::item::DEFAULT_STATUS;
use crate::model::{
    Position, ServiceGroupId, ServiceId, ServiceItem, ServiceItemFields, ServiceItemId,
};
use crate::ordering::SERVICE_ITEMS;

fn validate(fields: &ServiceItemFields) -> Result<&str> {
    let name = fields.name.trim();
    if name.is_empty() {
        return Err(CoreError::Validation("service item name is required".into()));
    }
    Ok(name)
}

/// # Errors
///
/// Returns an error if the query fails.
pub fn find(conn: &Connection, id: ServiceItemId) -> Result<Option<ServiceItem>> {
    let sql = format!(
        "SELECT {} FROM service_items WHERE service_item_id = ?1",
        ServiceItem::COLUMNS
    );
    Ok(conn.query_row(&sql, params![id], ServiceItem::from_row).optional()?)
}

/// # Errors
///
/// Returns [`CoreError::NotFound`] if the item does not exist.
pub fn get(conn: &Connection, id: ServiceItemId) -> Result<ServiceItem> {
    find(conn, id)?.ok_or_else(|| CoreError::not_found(Entity::ServiceItem, id))
}

/// Fail unless `item` exists on the canvas of `service`.
pub(crate) fn require_in_service(
    conn: &Connection,
    item: ServiceItemId,
    service: ServiceId,
) -> Result<()> {
    let owner: Option<ServiceId> = conn
        .query_row(
            "SELECT service_id FROM service_items WHERE service_item_id = ?1",
            params![item],
            |row| row.get(0),
        )
        .optional()?;
    match owner {
        None => Err(CoreError::not_found(Entity::ServiceItem, item)),
        Some(owner) if owner != service => Err(CoreError::Validation(format!(
            "service item {item} belongs to service {owner}, not {service}"
        ))),
        Some(_) => Ok(()),
    }
}

/// Items of a service ordered by group, then rank (ungrouped last), then id.
///
/// # Errors
///
/// Returns an error if the query fails.
pub fn list(conn: &Connection, service: ServiceId) -> Result<Vec<ServiceItem>> {
    let sql = format!(
        "SELECT {} FROM service_items WHERE service_id = ?1
         ORDER BY group_id IS NULL, group_id, order_in_group IS NULL, order_in_group,
                  service_item_id",
        ServiceItem::COLUMNS
    );
    let mut stmt = conn.prepare_cached(&sql)?;
    let rows = stmt
        .query_map(params![service], ServiceItem::from_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(rows)
}

/// Create an item on the canvas of `service`, appended to `group` when one
/// is given.
///
/// # Errors
///
/// - [`CoreError::Validation`] for an empty name, or a group of another
///   service.
/// - [`CoreError::NotFound`] if the service or group does not exist.
pub fn create(
    conn: &Connection,
    service: ServiceId,
    group: Option<ServiceGroupId>,
    fields: &ServiceItemFields,
) -> Result<ServiceItem> {
    let name = validate(fields)?;
    let owner = super::get(conn, service)?;
    let order = match group {
        Some(group) => {
            groups::require_in_service(conn, group, service)?;
            Some(SERVICE_ITEMS.next_order(conn, service.get(), group.get())?)
        }
        None => None,
    };
    let now = now_us();
    conn.execute(
        "INSERT INTO service_items (
            service_id, workspace_id, group_id, order_in_group, name, item_type, description,
            status, ip, category, location, position_json, created_at_us, updated_at_us
         ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?13)",
        params![
            service,
            owner.workspace_id,
            group,
            order,
            name,
            fields.item_type,
            fields.description,
            fields.status.as_deref().unwrap_or(DEFAULT_STATUS),
            fields.ip,
            fields.category,
            fields.location,
            Position::to_json(fields.position.as_ref())?,
            now,
        ],
    )?;
    let id = ServiceItemId(conn.last_insert_rowid());
    tracing::debug!(
        service_item = %id,
        service = %service,
        group = ?group,
        order = ?order,
        "created service item"
    );
    get(conn, id)
}

/// Replace the descriptive fields. Group and rank are untouched; an absent
/// position keeps the stored one.
///
/// # Errors
///
/// - [`CoreError::Validation`] for an empty name.
/// - [`CoreError::NotFound`] if the item does not exist.
pub fn update(
    conn: &Connection,
    id: ServiceItemId,
    fields: &ServiceItemFields,
) -> Result<ServiceItem> {
    let name = validate(fields)?;
    let current = get(conn, id)?;
    let position = fields.position.or(current.position);
    conn.execute(
        "UPDATE service_items SET
            name = ?1, item_type = ?2, description = ?3, status = ?4, ip = ?5,
            category = ?6, location = ?7, position_json = ?8, updated_at_us = ?9
         WHERE service_item_id = ?10",
        params![
            name,
            fields.item_type,
            fields.description,
            fields.status.as_deref().unwrap_or(DEFAULT_STATUS),
            fields.ip,
            fields.category,
            fields.location,
            Position::to_json(position.as_ref())?,
            now_us(),
            id,
        ],
    )?;
    get(conn, id)
}

/// # Errors
///
/// Returns [`CoreError::NotFound`] if the item does not exist.
pub fn update_position(
    conn: &Connection,
    id: ServiceItemId,
    position: Position,
) -> Result<ServiceItem> {
    let changed = conn.execute(
        "UPDATE service_items SET position_json = ?1, updated_at_us = ?2
         WHERE service_item_id = ?3",
        params![Position::to_json(Some(&position))?, now_us(), id],
    )?;
    if changed == 0 {
        return Err(CoreError::not_found(Entity::ServiceItem, id));
    }
    get(conn, id)
}

/// Move `item` into `group`, or out of any group when `None`, keeping both
/// groups densely ranked.
///
/// # Errors
///
/// - [`CoreError::NotFound`] if the item or the group does not exist.
/// - [`CoreError::Validation`] if the group belongs to another service, or
///   `desired` is negative while clamping is disabled.
pub fn set_group(
    conn: &Connection,
    item: ServiceItemId,
    group: Option<ServiceGroupId>,
    desired: Option<i64>,
    config: &OrderingConfig,
) -> Result<ServiceItem> {
    SERVICE_ITEMS.set_group(
        conn,
        item.get(),
        group.map(ServiceGroupId::get),
        desired,
        config,
        |service, group| {
            groups::require_in_service(conn, ServiceGroupId(group), ServiceId(service))
        },
    )?;
    get(conn, item)
}

/// Move `item` to rank `new_order` within its current group.
///
/// # Errors
///
/// - [`CoreError::NotFound`] if the item does not exist.
/// - [`CoreError::InvalidState`] if the item is not in a group.
/// - [`CoreError::Validation`] if `new_order` is negative while clamping is
///   disabled.
pub fn reorder(
    conn: &Connection,
    item: ServiceItemId,
    new_order: i64,
    config: &OrderingConfig,
) -> Result<ServiceItem> {
    SERVICE_ITEMS.reorder(conn, item.get(), new_order, config)?;
    get(conn, item)
}

/// Delete an item, closing the gap it leaves in its group. Its connections
/// cascade; routing records of its edges are removed here.
///
/// # Errors
///
/// Returns [`CoreError::NotFound`] if the item does not exist.
pub fn delete(conn: &Connection, id: ServiceItemId) -> Result<ServiceItem> {
    let item = get(conn, id)?;
    let edges = conn.execute(
        "DELETE FROM service_connections WHERE source_id = ?1 OR target_id = ?1",
        params![id],
    )?;
    conn.execute(
        "DELETE FROM service_group_connections WHERE target_item_id = ?1",
        params![id],
    )?;
    let routes = routing::delete_for_item(conn, id)?;
    conn.execute("DELETE FROM service_items WHERE service_item_id = ?1", params![id])?;
    if let (Some(group), Some(order)) = (item.group_id, item.order_in_group) {
        SERVICE_ITEMS.close_gap(conn, item.service_id.get(), group.get(), order)?;
    }
    tracing::info!(service_item = %id, edges, routes, "deleted service item");
    Ok(item)
}
