//! Workspace lifecycle: the root owner of every other row.

use rusqlite::{Connection, OptionalExtension, params};

use crate::db::now_us;
use crate::error::{CoreError, Entity, Result};
use crate::model::{Workspace, WorkspaceId};

/// Name given to the workspace created by [`ensure_default`].
pub const DEFAULT_WORKSPACE_NAME: &str = "Default Workspace";

pub(crate) fn validate_name(name: &str) -> Result<&str> {
    let name = name.trim();
    if name.is_empty() {
        return Err(CoreError::Validation("workspace name is required".into()));
    }
    Ok(name)
}

/// All workspaces, default first, then in creation order.
///
/// # Errors
///
/// Returns an error if the query fails.
pub fn list(conn: &Connection) -> Result<Vec<Workspace>> {
    let sql = format!(
        "SELECT {} FROM workspaces ORDER BY is_default DESC, workspace_id",
        Workspace::COLUMNS
    );
    let mut stmt = conn.prepare_cached(&sql)?;
    let rows = stmt
        .query_map([], Workspace::from_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(rows)
}

/// # Errors
///
/// Returns an error if the query fails.
pub fn find(conn: &Connection, id: WorkspaceId) -> Result<Option<Workspace>> {
    let sql = format!(
        "SELECT {} FROM workspaces WHERE workspace_id = ?1",
        Workspace::COLUMNS
    );
    Ok(conn
        .query_row(&sql, params![id], Workspace::from_row)
        .optional()?)
}

/// # Errors
///
/// Returns [`CoreError::NotFound`] if the workspace does not exist.
pub fn get(conn: &Connection, id: WorkspaceId) -> Result<Workspace> {
    find(conn, id)?.ok_or_else(|| CoreError::not_found(Entity::Workspace, id))
}

/// Fail with [`CoreError::NotFound`] unless the workspace exists.
pub(crate) fn require(conn: &Connection, id: WorkspaceId) -> Result<()> {
    let exists: bool = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM workspaces WHERE workspace_id = ?1)",
        params![id],
        |row| row.get(0),
    )?;
    if exists {
        Ok(())
    } else {
        Err(CoreError::not_found(Entity::Workspace, id))
    }
}

/// # Errors
///
/// Returns an error if the query fails.
pub fn get_default(conn: &Connection) -> Result<Option<Workspace>> {
    let sql = format!(
        "SELECT {} FROM workspaces WHERE is_default = 1 LIMIT 1",
        Workspace::COLUMNS
    );
    Ok(conn.query_row(&sql, [], Workspace::from_row).optional()?)
}

fn insert(
    conn: &Connection,
    name: &str,
    description: Option<&str>,
    is_default: bool,
) -> Result<Workspace> {
    let now = now_us();
    conn.execute(
        "INSERT INTO workspaces (name, description, is_default, created_at_us, updated_at_us)
         VALUES (?1, ?2, ?3, ?4, ?4)",
        params![name, description, is_default, now],
    )?;
    get(conn, WorkspaceId(conn.last_insert_rowid()))
}

/// Create a (non-default) workspace.
///
/// # Errors
///
/// Returns [`CoreError::Validation`] for an empty name.
pub fn create(conn: &Connection, name: &str, description: Option<&str>) -> Result<Workspace> {
    let name = validate_name(name)?;
    insert(conn, name, description, false)
}

/// # Errors
///
/// Returns [`CoreError::Validation`] for an empty name and
/// [`CoreError::NotFound`] for an unknown workspace.
pub fn update(
    conn: &Connection,
    id: WorkspaceId,
    name: &str,
    description: Option<&str>,
) -> Result<Workspace> {
    let name = validate_name(name)?;
    let changed = conn.execute(
        "UPDATE workspaces SET name = ?1, description = ?2, updated_at_us = ?3
         WHERE workspace_id = ?4",
        params![name, description, now_us(), id],
    )?;
    if changed == 0 {
        return Err(CoreError::not_found(Entity::Workspace, id));
    }
    get(conn, id)
}

/// Delete a workspace and, through cascades, everything it owns.
///
/// # Errors
///
/// - [`CoreError::NotFound`] if the workspace does not exist.
/// - [`CoreError::InvalidState`] if it is the default workspace.
pub fn delete(conn: &Connection, id: WorkspaceId) -> Result<Workspace> {
    let workspace = get(conn, id)?;
    if workspace.is_default {
        return Err(CoreError::InvalidState(format!(
            "workspace {id} is the default workspace and cannot be deleted"
        )));
    }
    conn.execute("DELETE FROM workspaces WHERE workspace_id = ?1", params![id])?;
    tracing::info!(workspace = %id, name = %workspace.name, "deleted workspace");
    Ok(workspace)
}

/// Make `id` the only default workspace.
///
/// # Errors
///
/// Returns [`CoreError::NotFound`] if the workspace does not exist.
pub fn set_default(conn: &Connection, id: WorkspaceId) -> Result<Workspace> {
    require(conn, id)?;
    let now = now_us();
    conn.execute(
        "UPDATE workspaces SET is_default = 0, updated_at_us = ?1
         WHERE is_default = 1 AND workspace_id <> ?2",
        params![now, id],
    )?;
    conn.execute(
        "UPDATE workspaces SET is_default = 1, updated_at_us = ?1 WHERE workspace_id = ?2",
        params![now, id],
    )?;
    get(conn, id)
}

/// Return the default workspace, creating [`DEFAULT_WORKSPACE_NAME`] when
/// none exists.
///
/// # Errors
///
/// Returns an error if the store cannot be read or written.
pub fn ensure_default(conn: &Connection) -> Result<Workspace> {
    if let Some(existing) = get_default(conn)? {
        return Ok(existing);
    }
    let created = insert(
        conn,
        DEFAULT_WORKSPACE_NAME,
        Some("Default workspace for existing data"),
        true,
    )?;
    tracing::info!(workspace = %created.id, "created default workspace");
    Ok(created)
}
