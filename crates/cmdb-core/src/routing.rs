//! Edge-routing records: which handle each end of a drawn edge attaches to.
//!
//! Records are keyed by [`EdgeRef`] and stored with its structured columns
//! (`edge_kind`, `a_id`, `b_id`), so cascades and clones never parse the
//! textual edge id. Reads through [`get`] and [`list`] only return records
//! whose edge currently exists, and writes refuse edges that do not.

use rusqlite::{Connection, OptionalExtension, params};

use crate::db::now_us;
use crate::error::{CoreError, Entity, Result};
use crate::model::{EdgeRef, EdgeShape, Endpoint, Handles, RoutingRecord, WorkspaceId};
use crate::workspaces;

/// Predicate over `edge_routing r`: the record's edge is currently drawn.
///
/// Group→group records also count as live when the legacy link table holds
/// the pair.
const LIVE_EDGE: &str = "(
    (r.edge_kind = 'item-item' AND EXISTS (
        SELECT 1 FROM connections c WHERE c.source_id = r.a_id AND c.target_id = r.b_id))
    OR (r.edge_kind = 'item-group' AND EXISTS (
        SELECT 1 FROM connections c WHERE c.source_id = r.a_id AND c.target_group_id = r.b_id))
    OR (r.edge_kind = 'group-item' AND EXISTS (
        SELECT 1 FROM connections c WHERE c.source_group_id = r.a_id AND c.target_id = r.b_id))
    OR (r.edge_kind = 'group-group' AND (
        EXISTS (SELECT 1 FROM connections c
                WHERE c.source_group_id = r.a_id AND c.target_group_id = r.b_id)
        OR EXISTS (SELECT 1 FROM group_connections g
                   WHERE g.source_id = r.a_id AND g.target_id = r.b_id)))
)";

pub(crate) fn validate(handles: &Handles) -> Result<()> {
    if handles.source_handle.trim().is_empty() || handles.target_handle.trim().is_empty() {
        return Err(CoreError::Validation(
            "source_handle and target_handle are required".into(),
        ));
    }
    Ok(())
}

fn write(
    conn: &Connection,
    workspace: WorkspaceId,
    edge: EdgeRef,
    handles: &Handles,
) -> Result<()> {
    let now = now_us();
    conn.execute(
        "INSERT INTO edge_routing (
            workspace_id, edge_id, edge_kind, a_id, b_id,
            source_handle, target_handle, created_at_us, updated_at_us
         ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?8)
         ON CONFLICT(edge_id) DO UPDATE SET
            source_handle = excluded.source_handle,
            target_handle = excluded.target_handle,
            updated_at_us = excluded.updated_at_us",
        params![
            workspace,
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

/// Whether `edge` is currently drawn: a connection of its shape joins the
/// pair, or for group→group a legacy link does.
///
/// # Errors
///
/// Returns an error if the query fails.
pub fn is_live(conn: &Connection, edge: EdgeRef) -> Result<bool> {
    let sql = format!(
        "SELECT EXISTS (SELECT 1 FROM connections WHERE {} = ?1 AND {} = ?2)",
        edge.kind.source_column(),
        edge.kind.target_column()
    );
    if conn.query_row(&sql, params![edge.a, edge.b], |row| row.get(0))? {
        return Ok(true);
    }
    if edge.kind != EdgeShape::GroupGroup {
        return Ok(false);
    }
    Ok(conn.query_row(
        "SELECT EXISTS (SELECT 1 FROM group_connections WHERE source_id = ?1 AND target_id = ?2)",
        params![edge.a, edge.b],
        |row| row.get(0),
    )?)
}

/// Insert or update the routing record of `edge`. An existing record keeps
/// the workspace it was first written under.
///
/// # Errors
///
/// - [`CoreError::Validation`] for blank handles.
/// - [`CoreError::NotFound`] if the workspace does not exist, or no
///   connection draws `edge`.
pub fn upsert(
    conn: &Connection,
    workspace: WorkspaceId,
    edge: EdgeRef,
    handles: &Handles,
) -> Result<RoutingRecord> {
    validate(handles)?;
    workspaces::require(conn, workspace)?;
    if !is_live(conn, edge)? {
        return Err(CoreError::not_found(Entity::Connection, edge));
    }
    write(conn, workspace, edge, handles)?;
    find_stored(conn, edge)?
        .ok_or_else(|| CoreError::Corrupt(format!("routing for {edge} missing after upsert")))
}

/// Upsert several records. Validation runs over every entry before the
/// first write; entries whose edge is not drawn are skipped.
///
/// # Errors
///
/// - [`CoreError::Validation`] for blank handles in any entry.
/// - [`CoreError::NotFound`] if the workspace does not exist.
pub fn bulk_upsert(
    conn: &Connection,
    workspace: WorkspaceId,
    entries: &[(EdgeRef, Handles)],
) -> Result<Vec<RoutingRecord>> {
    for (_, handles) in entries {
        validate(handles)?;
    }
    workspaces::require(conn, workspace)?;
    let mut out = Vec::with_capacity(entries.len());
    for (edge, handles) in entries {
        if !is_live(conn, *edge)? {
            continue;
        }
        write(conn, workspace, *edge, handles)?;
        if let Some(record) = find_stored(conn, *edge)? {
            out.push(record);
        }
    }
    tracing::debug!(
        workspace = %workspace,
        count = out.len(),
        skipped = entries.len() - out.len(),
        "bulk upserted edge routing"
    );
    Ok(out)
}

/// The record of `edge`, if one is stored and the edge is still drawn.
///
/// # Errors
///
/// Returns an error if the query fails.
pub fn get(conn: &Connection, edge: EdgeRef) -> Result<Option<RoutingRecord>> {
    let sql = format!(
        "SELECT {} FROM edge_routing r WHERE r.edge_id = ?1 AND {LIVE_EDGE}",
        RoutingRecord::COLUMNS
    );
    Ok(conn
        .query_row(&sql, params![edge.to_string()], RoutingRecord::from_row)
        .optional()?)
}

/// The stored record of `edge`, live or not.
pub(crate) fn find_stored(conn: &Connection, edge: EdgeRef) -> Result<Option<RoutingRecord>> {
    let sql = format!(
        "SELECT {} FROM edge_routing WHERE edge_id = ?1",
        RoutingRecord::COLUMNS
    );
    Ok(conn
        .query_row(&sql, params![edge.to_string()], RoutingRecord::from_row)
        .optional()?)
}

/// Records of a workspace whose edge currently exists.
///
/// # Errors
///
/// Returns an error if the query fails.
pub fn list(conn: &Connection, workspace: WorkspaceId) -> Result<Vec<RoutingRecord>> {
    let sql = format!(
        "SELECT {} FROM edge_routing r
         WHERE r.workspace_id = ?1 AND {LIVE_EDGE}
         ORDER BY r.routing_id",
        RoutingRecord::COLUMNS
    );
    query(conn, &sql, workspace)
}

/// Every record of a workspace, live edge or not.
pub(crate) fn list_all(conn: &Connection, workspace: WorkspaceId) -> Result<Vec<RoutingRecord>> {
    let sql = format!(
        "SELECT {} FROM edge_routing WHERE workspace_id = ?1 ORDER BY routing_id",
        RoutingRecord::COLUMNS
    );
    query(conn, &sql, workspace)
}

fn query(conn: &Connection, sql: &str, workspace: WorkspaceId) -> Result<Vec<RoutingRecord>> {
    let mut stmt = conn.prepare_cached(sql)?;
    let rows = stmt
        .query_map(params![workspace], RoutingRecord::from_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(rows)
}

/// Copy a record under `workspace` with a new edge reference.
pub(crate) fn insert_copy(
    conn: &Connection,
    workspace: WorkspaceId,
    edge: EdgeRef,
    source: &RoutingRecord,
) -> Result<()> {
    let handles = Handles {
        source_handle: source.source_handle.clone(),
        target_handle: source.target_handle.clone(),
    };
    write(conn, workspace, edge, &handles)
}

/// Returns whether a record was removed.
///
/// # Errors
///
/// Returns an error if the delete fails.
pub fn delete(conn: &Connection, edge: EdgeRef) -> Result<bool> {
    let removed = conn.execute(
        "DELETE FROM edge_routing WHERE edge_id = ?1",
        params![edge.to_string()],
    )?;
    Ok(removed > 0)
}

/// Remove the record of `edge` once nothing draws it any more. A group→group
/// record survives while either the connection or the legacy link remains.
pub(crate) fn delete_if_dead(conn: &Connection, edge: EdgeRef) -> Result<bool> {
    if is_live(conn, edge)? {
        return Ok(false);
    }
    delete(conn, edge)
}

/// Returns the number of records removed.
///
/// # Errors
///
/// Returns an error if a delete fails.
pub fn delete_many(conn: &Connection, edges: &[EdgeRef]) -> Result<usize> {
    let mut removed = 0;
    for edge in edges {
        removed += usize::from(delete(conn, *edge)?);
    }
    Ok(removed)
}

/// Remove every record whose edge has `endpoint` on either side.
pub(crate) fn delete_for_endpoint(conn: &Connection, endpoint: Endpoint) -> Result<usize> {
    let removed = match endpoint {
        Endpoint::Item(id) => conn.execute(
            "DELETE FROM edge_routing
             WHERE (edge_kind IN ('item-item', 'item-group') AND a_id = ?1)
                OR (edge_kind IN ('item-item', 'group-item') AND b_id = ?1)",
            params![id],
        )?,
        Endpoint::Group(id) => conn.execute(
            "DELETE FROM edge_routing
             WHERE (edge_kind IN ('group-item', 'group-group') AND a_id = ?1)
                OR (edge_kind IN ('item-group', 'group-group') AND b_id = ?1)",
            params![id],
        )?,
    };
    Ok(removed)
}
