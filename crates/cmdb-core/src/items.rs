//! Item storage. Group membership is written only through
//! [`crate::ordering`]; everything here either leaves it untouched or
//! delegates to it.

use rusqlite::{Connection, OptionalExtension, params};
use serde_json::Value;

use crate::db::now_us;
use crate::error::{CoreError, Entity, Result};
use crate::model::{Endpoint, GroupId, Item, ItemFields, ItemId, NewItem, Position, WorkspaceId};
use crate::{connections, groups, ordering, routing, workspaces};

fn validate(fields: &ItemFields) -> Result<&str> {
    let name = fields.name.trim();
    if name.is_empty() {
        return Err(CoreError::Validation("item name is required".into()));
    }
    Ok(name)
}

fn images_json(images: &[Value]) -> Result<String> {
    Ok(serde_json::to_string(images)?)
}

/// # Errors
///
/// Returns an error if the query fails.
pub fn find(conn: &Connection, id: ItemId) -> Result<Option<Item>> {
    let sql = format!("SELECT {} FROM cmdb_items WHERE item_id = ?1", Item::COLUMNS);
    Ok(conn.query_row(&sql, params![id], Item::from_row).optional()?)
}

/// # Errors
///
/// Returns [`CoreError::NotFound`] if the item does not exist.
pub fn get(conn: &Connection, id: ItemId) -> Result<Item> {
    find(conn, id)?.ok_or_else(|| CoreError::not_found(Entity::Item, id))
}

/// Fail unless `item` exists and belongs to `workspace`.
pub(crate) fn require_in_workspace(
    conn: &Connection,
    item: ItemId,
    workspace: WorkspaceId,
) -> Result<()> {
    let owner: Option<WorkspaceId> = conn
        .query_row(
            "SELECT workspace_id FROM cmdb_items WHERE item_id = ?1",
            params![item],
            |row| row.get(0),
        )
        .optional()?;
    match owner {
        None => Err(CoreError::not_found(Entity::Item, item)),
        Some(owner) if owner != workspace => Err(CoreError::Validation(format!(
            "item {item} belongs to workspace {owner}, not {workspace}"
        ))),
        Some(_) => Ok(()),
    }
}

/// Items of a workspace ordered by group, then rank (ungrouped last), then id.
///
/// # Errors
///
/// Returns an error if the query fails.
pub fn list(conn: &Connection, workspace: WorkspaceId) -> Result<Vec<Item>> {
    let sql = format!(
        "SELECT {} FROM cmdb_items WHERE workspace_id = ?1
         ORDER BY group_id IS NULL, group_id, order_in_group IS NULL, order_in_group, item_id",
        Item::COLUMNS
    );
    let mut stmt = conn.prepare_cached(&sql)?;
    let rows = stmt
        .query_map(params![workspace], Item::from_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(rows)
}

/// Insert a row with an explicit placement. Callers are responsible for the
/// rank being valid in `group`.
pub(crate) fn insert_row(
    conn: &Connection,
    workspace: WorkspaceId,
    group: Option<GroupId>,
    order_in_group: Option<i64>,
    fields: &ItemFields,
) -> Result<ItemId> {
    let name = validate(fields)?;
    let now = now_us();
    conn.execute(
        "INSERT INTO cmdb_items (
            workspace_id, group_id, order_in_group, name, item_type, description, status,
            ip, category, location, env_type, images_json, position_json,
            created_at_us, updated_at_us
         ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?14)",
        params![
            workspace,
            group,
            order_in_group,
            name,
            fields.item_type,
            fields.description,
            fields.status_or_default(),
            fields.ip,
            fields.category,
            fields.location,
            fields.env_type,
            images_json(&fields.images)?,
            Position::to_json(fields.position.as_ref())?,
            now,
        ],
    )?;
    Ok(ItemId(conn.last_insert_rowid()))
}

/// Create an item, appending it to its group when one is given.
///
/// # Errors
///
/// - [`CoreError::Validation`] when the workspace id or name is missing, or
///   the group belongs to another workspace.
/// - [`CoreError::NotFound`] if the workspace or group does not exist.
pub fn create(conn: &Connection, request: &NewItem) -> Result<Item> {
    let Some(workspace) = request.workspace_id else {
        return Err(CoreError::Validation("workspace_id is required".into()));
    };
    validate(&request.fields)?;

    workspaces::require(conn, workspace)?;
    let order = match request.group_id {
        Some(group) => {
            groups::require_in_workspace(conn, group, workspace)?;
            Some(ordering::next_order(conn, workspace, group)?)
        }
        None => None,
    };
    let id = insert_row(conn, workspace, request.group_id, order, &request.fields)?;
    tracing::debug!(
        item = %id,
        workspace = %workspace,
        group = ?request.group_id,
        order = ?order,
        "created item"
    );
    get(conn, id)
}

/// Replace the descriptive fields of an item. Group and rank are untouched;
/// an absent position keeps the current one.
///
/// # Errors
///
/// - [`CoreError::Validation`] for an empty name.
/// - [`CoreError::NotFound`] if the item does not exist.
pub fn update(conn: &Connection, id: ItemId, fields: &ItemFields) -> Result<Item> {
    let name = validate(fields)?;
    let current = get(conn, id)?;
    let position = fields.position.or(current.position);
    conn.execute(
        "UPDATE cmdb_items SET
            name = ?1, item_type = ?2, description = ?3, status = ?4, ip = ?5,
            category = ?6, location = ?7, env_type = ?8, images_json = ?9,
            position_json = ?10, updated_at_us = ?11
         WHERE item_id = ?12",
        params![
            name,
            fields.item_type,
            fields.description,
            fields.status_or_default(),
            fields.ip,
            fields.category,
            fields.location,
            fields.env_type,
            images_json(&fields.images)?,
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
pub fn update_position(conn: &Connection, id: ItemId, position: Position) -> Result<Item> {
    let changed = conn.execute(
        "UPDATE cmdb_items SET position_json = ?1, updated_at_us = ?2 WHERE item_id = ?3",
        params![Position::to_json(Some(&position))?, now_us(), id],
    )?;
    if changed == 0 {
        return Err(CoreError::not_found(Entity::Item, id));
    }
    get(conn, id)
}

/// # Errors
///
/// - [`CoreError::Validation`] for an empty status.
/// - [`CoreError::NotFound`] if the item does not exist.
pub fn update_status(conn: &Connection, id: ItemId, status: &str) -> Result<Item> {
    let status = status.trim();
    if status.is_empty() {
        return Err(CoreError::Validation("status is required".into()));
    }
    let changed = conn.execute(
        "UPDATE cmdb_items SET status = ?1, updated_at_us = ?2 WHERE item_id = ?3",
        params![status, now_us(), id],
    )?;
    if changed == 0 {
        return Err(CoreError::not_found(Entity::Item, id));
    }
    get(conn, id)
}

/// Delete an item: close the gap it leaves in its group, then drop every
/// connection and routing record that references it.
///
/// # Errors
///
/// Returns [`CoreError::NotFound`] if the item does not exist.
pub fn delete(conn: &Connection, id: ItemId) -> Result<Item> {
    let item = get(conn, id)?;
    let edges = connections::delete_for_endpoint(conn, Endpoint::Item(id))?;
    let routes = routing::delete_for_endpoint(conn, Endpoint::Item(id))?;
    conn.execute("DELETE FROM cmdb_items WHERE item_id = ?1", params![id])?;
    if let (Some(group), Some(order)) = (item.group_id, item.order_in_group) {
        ordering::close_gap(conn, item.workspace_id, group, order)?;
    }
    tracing::info!(item = %id, edges, routes, "deleted item");
    Ok(item)
}

/// Fetch the given items, silently omitting ids that no longer exist.
pub(crate) fn get_many(conn: &Connection, ids: &[ItemId]) -> Result<Vec<Item>> {
    let sql = format!("SELECT {} FROM cmdb_items WHERE item_id = ?1", Item::COLUMNS);
    let mut stmt = conn.prepare_cached(&sql)?;
    let mut out = Vec::with_capacity(ids.len());
    for id in ids {
        if let Some(item) = stmt.query_row(params![id], Item::from_row).optional()? {
            out.push(item);
        }
    }
    Ok(out)
}
