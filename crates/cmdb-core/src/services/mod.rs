//! Services attached to cmdb items, each with its own canvas.
//!
//! A service belongs to one item and lives in that item's workspace. Its
//! canvas mirrors the workspace canvas at a smaller scale: [`items`] ranked
//! inside [`groups`] by the shared ordering engine, edges in [`links`] and
//! handle placement in [`routing`]. Deleting the owning item, or the
//! service, removes the whole canvas through foreign-key cascades.

pub mod groups;
pub mod items;
pub mod links;
pub mod routing;

use rusqlite::{Connection, OptionalExtension, params};

use crate::db::now_us;
use crate::error::{CoreError, Entity, Result};
use crate::model::item::DEFAULT_STATUS;
use crate::model::{IconType, ItemId, Service, ServiceFields, ServiceId, WorkspaceId};

fn validate(fields: &ServiceFields) -> Result<&str> {
    let name = fields.name.trim();
    if name.is_empty() {
        return Err(CoreError::Validation("service name is required".into()));
    }
    Ok(name)
}

/// # Errors
///
/// Returns an error if the query fails.
pub fn find(conn: &Connection, id: ServiceId) -> Result<Option<Service>> {
    let sql = format!(
        "SELECT {} FROM {} WHERE s.service_id = ?1",
        Service::COLUMNS,
        Service::FROM
    );
    Ok(conn.query_row(&sql, params![id], Service::from_row).optional()?)
}

/// # Errors
///
/// Returns [`CoreError::NotFound`] if the service does not exist.
pub fn get(conn: &Connection, id: ServiceId) -> Result<Service> {
    find(conn, id)?.ok_or_else(|| CoreError::not_found(Entity::Service, id))
}

/// Services of one item in creation order.
///
/// # Errors
///
/// Returns an error if the query fails.
pub fn list_for_item(conn: &Connection, item: ItemId) -> Result<Vec<Service>> {
    let sql = format!(
        "SELECT {} FROM {} WHERE s.item_id = ?1 ORDER BY s.created_at_us, s.service_id",
        Service::COLUMNS,
        Service::FROM
    );
    query(conn, &sql, item.get())
}

/// Every service whose item lives in `workspace`.
///
/// # Errors
///
/// Returns an error if the query fails.
pub fn list_for_workspace(conn: &Connection, workspace: WorkspaceId) -> Result<Vec<Service>> {
    let sql = format!(
        "SELECT {} FROM {} WHERE i.workspace_id = ?1 ORDER BY s.service_id",
        Service::COLUMNS,
        Service::FROM
    );
    query(conn, &sql, workspace.get())
}

fn query(conn: &Connection, sql: &str, key: i64) -> Result<Vec<Service>> {
    let mut stmt = conn.prepare_cached(sql)?;
    let rows = stmt
        .query_map(params![key], Service::from_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(rows)
}

/// Attach a new service to `item`. Status defaults to `active` and the icon
/// to a preset.
///
/// # Errors
///
/// - [`CoreError::Validation`] for an empty name.
/// - [`CoreError::NotFound`] if the item does not exist.
pub fn create(conn: &Connection, item: ItemId, fields: &ServiceFields) -> Result<Service> {
    let name = validate(fields)?;
    crate::items::get(conn, item)?;
    let now = now_us();
    conn.execute(
        "INSERT INTO services (
            item_id, name, status, icon_type, icon_path, icon_name, description,
            created_at_us, updated_at_us
         ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?8)",
        params![
            item,
            name,
            fields.status.as_deref().unwrap_or(DEFAULT_STATUS),
            fields.icon_type.unwrap_or_default().as_str(),
            fields.icon_path,
            fields.icon_name,
            fields.description,
            now,
        ],
    )?;
    let id = ServiceId(conn.last_insert_rowid());
    tracing::debug!(service = %id, item = %item, "created service");
    get(conn, id)
}

/// Replace name, status and description. The icon is only changed through
/// [`update_icon`]; an absent status keeps the current one.
///
/// # Errors
///
/// - [`CoreError::Validation`] for an empty name.
/// - [`CoreError::NotFound`] if the service does not exist.
pub fn update(conn: &Connection, id: ServiceId, fields: &ServiceFields) -> Result<Service> {
    let name = validate(fields)?;
    let current = get(conn, id)?;
    conn.execute(
        "UPDATE services SET name = ?1, status = ?2, description = ?3, updated_at_us = ?4
         WHERE service_id = ?5",
        params![
            name,
            fields.status.as_deref().unwrap_or(&current.status),
            fields.description,
            now_us(),
            id,
        ],
    )?;
    get(conn, id)
}

/// # Errors
///
/// Returns [`CoreError::NotFound`] if the service does not exist.
pub fn update_icon(
    conn: &Connection,
    id: ServiceId,
    icon_type: IconType,
    icon_path: Option<&str>,
    icon_name: Option<&str>,
) -> Result<Service> {
    let changed = conn.execute(
        "UPDATE services SET icon_type = ?1, icon_path = ?2, icon_name = ?3, updated_at_us = ?4
         WHERE service_id = ?5",
        params![icon_type.as_str(), icon_path, icon_name, now_us(), id],
    )?;
    if changed == 0 {
        return Err(CoreError::not_found(Entity::Service, id));
    }
    get(conn, id)
}

/// Delete a service and, by cascade, its canvas.
///
/// # Errors
///
/// Returns [`CoreError::NotFound`] if the service does not exist.
pub fn delete(conn: &Connection, id: ServiceId) -> Result<Service> {
    let service = get(conn, id)?;
    conn.execute("DELETE FROM services WHERE service_id = ?1", params![id])?;
    tracing::info!(service = %id, item = %service.item_id, "deleted service");
    Ok(service)
}
