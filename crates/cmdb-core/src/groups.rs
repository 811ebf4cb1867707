//! Groups and the legacy group→group link table.

use rusqlite::{Connection, OptionalExtension, params};

use crate::db::now_us;
use crate::error::{CoreError, Entity, Result};
use crate::model::group::DEFAULT_GROUP_COLOR;
use crate::model::{
    EdgeRef, EdgeShape, Endpoint, Group, GroupFields, GroupId, GroupLink, Position, WorkspaceId,
};
use crate::{connections, routing, workspaces};

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
pub fn find(conn: &Connection, id: GroupId) -> Result<Option<Group>> {
    let sql = format!("SELECT {} FROM cmdb_groups WHERE group_id = ?1", Group::COLUMNS);
    Ok(conn.query_row(&sql, params![id], Group::from_row).optional()?)
}

/// # Errors
///
/// Returns [`CoreError::NotFound`] if the group does not exist.
pub fn get(conn: &Connection, id: GroupId) -> Result<Group> {
    find(conn, id)?.ok_or_else(|| CoreError::not_found(Entity::Group, id))
}

/// Fail unless `group` exists and belongs to `workspace`.
///
/// Group ids are workspace-scoped, so a group of another workspace is a
/// validation failure rather than a silent cross-workspace write.
pub(crate) fn require_in_workspace(
    conn: &Connection,
    group: GroupId,
    workspace: WorkspaceId,
) -> Result<()> {
    let owner: Option<WorkspaceId> = conn
        .query_row(
            "SELECT workspace_id FROM cmdb_groups WHERE group_id = ?1",
            params![group],
            |row| row.get(0),
        )
        .optional()?;
    match owner {
        None => Err(CoreError::not_found(Entity::Group, group)),
        Some(owner) if owner != workspace => Err(CoreError::Validation(format!(
            "group {group} belongs to workspace {owner}, not {workspace}"
        ))),
        Some(_) => Ok(()),
    }
}

/// Groups of a workspace in creation order.
///
/// # Errors
///
/// Returns an error if the query fails.
pub fn list(conn: &Connection, workspace: WorkspaceId) -> Result<Vec<Group>> {
    let sql = format!(
        "SELECT {} FROM cmdb_groups WHERE workspace_id = ?1 ORDER BY group_id",
        Group::COLUMNS
    );
    let mut stmt = conn.prepare_cached(&sql)?;
    let rows = stmt
        .query_map(params![workspace], Group::from_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(rows)
}

/// # Errors
///
/// - [`CoreError::Validation`] for an empty name.
/// - [`CoreError::NotFound`] if the workspace does not exist.
pub fn create(conn: &Connection, workspace: WorkspaceId, fields: &GroupFields) -> Result<Group> {
    let name = validate(fields)?;
    workspaces::require(conn, workspace)?;
    conn.execute(
        "INSERT INTO cmdb_groups (workspace_id, name, description, color, position_json, created_at_us)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            workspace,
            name,
            fields.description,
            fields.color.as_deref().unwrap_or(DEFAULT_GROUP_COLOR),
            Position::to_json(fields.position.as_ref())?,
            now_us(),
        ],
    )?;
    get(conn, GroupId(conn.last_insert_rowid()))
}

/// Replace the group's descriptive fields. An absent color keeps the
/// current one; an absent position keeps the current one.
///
/// # Errors
///
/// - [`CoreError::Validation`] for an empty name.
/// - [`CoreError::NotFound`] if the group does not exist.
pub fn update(conn: &Connection, id: GroupId, fields: &GroupFields) -> Result<Group> {
    let name = validate(fields)?;
    let current = get(conn, id)?;
    let color = fields.color.as_deref().unwrap_or(&current.color);
    let position = fields.position.or(current.position);
    conn.execute(
        "UPDATE cmdb_groups SET name = ?1, description = ?2, color = ?3, position_json = ?4
         WHERE group_id = ?5",
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
pub fn update_position(conn: &Connection, id: GroupId, position: Position) -> Result<Group> {
    let changed = conn.execute(
        "UPDATE cmdb_groups SET position_json = ?1 WHERE group_id = ?2",
        params![Position::to_json(Some(&position))?, id],
    )?;
    if changed == 0 {
        return Err(CoreError::not_found(Entity::Group, id));
    }
    get(conn, id)
}

/// Delete a group. Members stay in the workspace but lose their group and
/// rank; every connection and routing record touching the group goes away.
///
/// # Errors
///
/// Returns [`CoreError::NotFound`] if the group does not exist.
pub fn delete(conn: &Connection, id: GroupId) -> Result<Group> {
    let group = get(conn, id)?;
    let ungrouped = conn.execute(
        "UPDATE cmdb_items SET group_id = NULL, order_in_group = NULL, updated_at_us = ?1
         WHERE group_id = ?2",
        params![now_us(), id],
    )?;
    let edges = connections::delete_for_endpoint(conn, Endpoint::Group(id))?;
    let routes = routing::delete_for_endpoint(conn, Endpoint::Group(id))?;
    conn.execute("DELETE FROM cmdb_groups WHERE group_id = ?1", params![id])?;
    tracing::info!(group = %id, ungrouped, edges, routes, "deleted group");
    Ok(group)
}

/// Record a legacy group→group link. Creating an existing link returns it.
///
/// # Errors
///
/// - [`CoreError::NotFound`] if either group does not exist.
/// - [`CoreError::Validation`] if either group belongs to another workspace.
pub fn create_link(
    conn: &Connection,
    workspace: WorkspaceId,
    source: GroupId,
    target: GroupId,
) -> Result<GroupLink> {
    require_in_workspace(conn, source, workspace)?;
    require_in_workspace(conn, target, workspace)?;
    conn.execute(
        "INSERT OR IGNORE INTO group_connections (workspace_id, source_id, target_id, created_at_us)
         VALUES (?1, ?2, ?3, ?4)",
        params![workspace, source, target, now_us()],
    )?;
    find_link(conn, source, target)?.ok_or_else(|| {
        CoreError::Corrupt(format!("group link {source}->{target} missing after insert"))
    })
}

fn find_link(conn: &Connection, source: GroupId, target: GroupId) -> Result<Option<GroupLink>> {
    let sql = format!(
        "SELECT {} FROM group_connections WHERE source_id = ?1 AND target_id = ?2",
        GroupLink::COLUMNS
    );
    Ok(conn
        .query_row(&sql, params![source, target], GroupLink::from_row)
        .optional()?)
}

/// Remove a legacy link, and its routing record unless a group→group
/// connection still draws the pair. Returns whether a link was deleted.
///
/// # Errors
///
/// Returns an error if a delete fails.
pub fn delete_link(conn: &Connection, source: GroupId, target: GroupId) -> Result<bool> {
    let removed = conn.execute(
        "DELETE FROM group_connections WHERE source_id = ?1 AND target_id = ?2",
        params![source, target],
    )?;
    routing::delete_if_dead(conn, EdgeRef::new(EdgeShape::GroupGroup, source.0, target.0))?;
    Ok(removed > 0)
}

/// # Errors
///
/// Returns an error if the query fails.
pub fn list_links(conn: &Connection, workspace: WorkspaceId) -> Result<Vec<GroupLink>> {
    let sql = format!(
        "SELECT {} FROM group_connections WHERE workspace_id = ?1 ORDER BY link_id",
        GroupLink::COLUMNS
    );
    let mut stmt = conn.prepare_cached(&sql)?;
    let rows = stmt
        .query_map(params![workspace], GroupLink::from_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Handles;
    use crate::test_support::Fixture;

    #[test]
    fn create_applies_default_color() {
        let fx = Fixture::new();
        let group = create(&fx.conn, fx.ws, &GroupFields::named("web")).expect("create");
        assert_eq!(group.color, DEFAULT_GROUP_COLOR);
        assert_eq!(group.workspace_id, fx.ws);
        assert_eq!(group.position, None);
    }

    #[test]
    fn create_rejects_blank_name_and_unknown_workspace() {
        let fx = Fixture::new();
        let err = create(&fx.conn, fx.ws, &GroupFields::named(" ")).expect_err("blank");
        assert!(matches!(err, CoreError::Validation(_)));
        let err = create(&fx.conn, WorkspaceId(99), &GroupFields::named("x")).expect_err("ws");
        assert!(matches!(err, CoreError::NotFound { entity: Entity::Workspace, .. }));
    }

    #[test]
    fn update_keeps_color_and_position_when_absent() {
        let fx = Fixture::new();
        let mut fields = GroupFields::named("web");
        fields.color = Some("#ff0000".into());
        fields.position = Some(Position { x: 1.0, y: 2.0 });
        let group = create(&fx.conn, fx.ws, &fields).expect("create");

        let updated = update(&fx.conn, group.id, &GroupFields::named("frontend")).expect("update");
        assert_eq!(updated.name, "frontend");
        assert_eq!(updated.color, "#ff0000");
        assert_eq!(updated.position, Some(Position { x: 1.0, y: 2.0 }));

        let moved =
            update_position(&fx.conn, group.id, Position { x: 5.0, y: -3.5 }).expect("move");
        assert_eq!(moved.position, Some(Position { x: 5.0, y: -3.5 }));
    }

    #[test]
    fn delete_ungroups_members_and_drops_edges() {
        let fx = Fixture::new();
        let g = fx.group("g");
        let other = fx.group("other");
        let a = fx.item_in("a", g);
        let b = fx.item_in("b", g);
        fx.connect(Endpoint::Item(a), Endpoint::Group(other));
        fx.connect(Endpoint::Group(g), Endpoint::Item(b));
        fx.connect(Endpoint::Group(other), Endpoint::Group(g));
        create_link(&fx.conn, fx.ws, other, g).expect("link");
        let handles = Handles {
            source_handle: "right".into(),
            target_handle: "left".into(),
        };
        routing::upsert(&fx.conn, fx.ws, EdgeRef::new(EdgeShape::GroupItem, g.0, b.0), &handles)
            .expect("route");

        delete(&fx.conn, g).expect("delete");

        for item in [a, b] {
            let row: (Option<i64>, Option<i64>) = fx
                .conn
                .query_row(
                    "SELECT group_id, order_in_group FROM cmdb_items WHERE item_id = ?1",
                    params![item],
                    |row| Ok((row.get(0)?, row.get(1)?)),
                )
                .expect("item survives");
            assert_eq!(row, (None, None));
        }
        let edges = connections::list_workspace(&fx.conn, fx.ws).expect("edges");
        assert_eq!(edges.len(), 1, "only the item->other edge remains");
        assert!(list_links(&fx.conn, fx.ws).expect("links").is_empty());
        let routes: i64 = fx
            .conn
            .query_row("SELECT COUNT(*) FROM edge_routing", [], |row| row.get(0))
            .expect("count");
        assert_eq!(routes, 0);
    }

    #[test]
    fn links_are_idempotent_and_workspace_checked() {
        let fx = Fixture::new();
        let a = fx.group("a");
        let b = fx.group("b");
        let first = create_link(&fx.conn, fx.ws, a, b).expect("link");
        let second = create_link(&fx.conn, fx.ws, a, b).expect("link again");
        assert_eq!(first.id, second.id);
        assert_eq!(list_links(&fx.conn, fx.ws).expect("list").len(), 1);

        let foreign_ws = fx.workspace("foreign");
        let foreign = fx.group_in(foreign_ws, "f");
        let err = create_link(&fx.conn, fx.ws, a, foreign).expect_err("cross workspace");
        assert!(matches!(err, CoreError::Validation(_)));

        assert!(delete_link(&fx.conn, a, b).expect("unlink"));
        assert!(!delete_link(&fx.conn, a, b).expect("unlink again"));
    }

    #[test]
    fn unlinking_drops_routing_unless_a_connection_remains() {
        let fx = Fixture::new();
        let a = fx.group("a");
        let b = fx.group("b");
        let c = fx.group("c");
        let handles = Handles {
            source_handle: "bottom".into(),
            target_handle: "top".into(),
        };
        create_link(&fx.conn, fx.ws, a, b).expect("link a-b");
        create_link(&fx.conn, fx.ws, b, c).expect("link b-c");
        fx.connect(Endpoint::Group(b), Endpoint::Group(c));
        let linked = EdgeRef::new(EdgeShape::GroupGroup, a.0, b.0);
        let connected = EdgeRef::new(EdgeShape::GroupGroup, b.0, c.0);
        routing::upsert(&fx.conn, fx.ws, linked, &handles).expect("route a-b");
        routing::upsert(&fx.conn, fx.ws, connected, &handles).expect("route b-c");

        assert!(delete_link(&fx.conn, a, b).expect("unlink a-b"));
        assert_eq!(routing::get(&fx.conn, linked).expect("get"), None);
        assert_eq!(routing::list_all(&fx.conn, fx.ws).expect("all").len(), 1);

        assert!(delete_link(&fx.conn, b, c).expect("unlink b-c"));
        let kept = routing::get(&fx.conn, connected).expect("get");
        assert_eq!(kept.map(|record| record.source_handle), Some("bottom".to_string()));
    }
}
