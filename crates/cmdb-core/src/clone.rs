//! Deep copy of a workspace under fresh ids.
//!
//! The copy runs in strict dependency order, each step reading the id maps
//! built by the previous ones:
//!
//! 1. workspace row (description copied, never default)
//! 2. groups, recording `old → new` group ids
//! 3. items, with their group resolved through the group map and their rank
//!    preserved
//! 4. connections, both endpoints remapped
//! 5. legacy group links
//! 6. routing records, remapped through their [`EdgeRef`] and kept only when
//!    the copied edge is drawn
//!
//! Rows whose references cannot be resolved in steps 4 to 6 are skipped and
//! counted in the [`CloneReport`]. Store errors abort the whole copy; the
//! caller's transaction then leaves no trace of the new workspace.

use rusqlite::Connection;
use serde::Serialize;
use std::collections::HashMap;

use crate::config::DuplicatePolicy;
use crate::error::Result;
use crate::model::{Endpoint, GroupFields, GroupId, ItemFields, ItemId, Workspace, WorkspaceId};
use crate::{connections, groups, items, ordering, routing, workspaces};

/// Outcome of [`duplicate_workspace`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CloneReport {
    pub workspace: Workspace,
    pub groups: usize,
    pub items: usize,
    pub connections: usize,
    pub group_links: usize,
    pub routing: usize,
    pub skipped_connections: usize,
    pub skipped_group_links: usize,
    pub skipped_routing: usize,
}

#[derive(Default)]
struct IdMaps {
    groups: HashMap<GroupId, GroupId>,
    items: HashMap<ItemId, ItemId>,
}

impl IdMaps {
    fn endpoint(&self, endpoint: Endpoint) -> Option<Endpoint> {
        match endpoint {
            Endpoint::Item(id) => self.items.get(&id).copied().map(Endpoint::Item),
            Endpoint::Group(id) => self.groups.get(&id).copied().map(Endpoint::Group),
        }
    }
}

/// Copy workspace `source` with everything it owns. The new workspace is
/// named `new_name`, or `"<source name> (copy)"` when none is given.
///
/// Must run inside a transaction: on error the partially written copy is
/// only discarded by rolling that transaction back.
///
/// # Errors
///
/// - [`crate::CoreError::Validation`] for a blank `new_name`.
/// - [`crate::CoreError::NotFound`] if `source` does not exist.
/// - [`crate::CoreError::Store`] on any store failure.
pub fn duplicate_workspace(
    conn: &Connection,
    source: WorkspaceId,
    new_name: Option<&str>,
) -> Result<CloneReport> {
    let new_name = new_name.map(workspaces::validate_name).transpose()?;
    let original = workspaces::get(conn, source)?;
    let name = new_name.map_or_else(|| format!("{} (copy)", original.name), str::to_owned);
    let workspace = workspaces::create(conn, &name, original.description.as_deref())?;
    let target = workspace.id;

    let mut maps = IdMaps::default();

    for group in groups::list(conn, source)? {
        let fields = GroupFields {
            name: group.name.clone(),
            description: group.description.clone(),
            color: Some(group.color.clone()),
            position: group.position,
        };
        let copy = groups::create(conn, target, &fields)?;
        maps.groups.insert(group.id, copy.id);
    }

    for item in items::list(conn, source)? {
        let group = item.group_id.and_then(|g| maps.groups.get(&g).copied());
        let order = match (group, item.order_in_group) {
            (Some(_), Some(order)) => Some(order),
            (Some(g), None) => Some(ordering::next_order(conn, target, g)?),
            (None, _) => None,
        };
        let copy = items::insert_row(conn, target, group, order, &ItemFields::from(&item))?;
        maps.items.insert(item.id, copy);
    }

    let mut copied_connections = 0;
    let mut skipped_connections = 0;
    for row in connections::rows_in_workspace(conn, source)? {
        let edge = match row.into_connection() {
            Ok(edge) => edge,
            Err(err) => {
                tracing::warn!(error = %err, "skipping unreadable connection during clone");
                skipped_connections += 1;
                continue;
            }
        };
        let (Some(from), Some(to)) = (maps.endpoint(edge.source), maps.endpoint(edge.target)) else {
            tracing::warn!(connection = %edge.id, "skipping connection with unmapped endpoint");
            skipped_connections += 1;
            continue;
        };
        connections::create(conn, target, from, to, DuplicatePolicy::Idempotent)?;
        copied_connections += 1;
    }

    let mut copied_links = 0;
    let mut skipped_links = 0;
    for link in groups::list_links(conn, source)? {
        match (maps.groups.get(&link.source_id), maps.groups.get(&link.target_id)) {
            (Some(&from), Some(&to)) => {
                groups::create_link(conn, target, from, to)?;
                copied_links += 1;
            }
            _ => {
                tracing::warn!(link = link.id, "skipping group link with unmapped endpoint");
                skipped_links += 1;
            }
        }
    }

    let mut copied_routing = 0;
    let mut skipped_routing = 0;
    for record in routing::list_all(conn, source)? {
        match record.edge_id.remap(&maps.items, &maps.groups) {
            Some(edge) if routing::is_live(conn, edge)? => {
                routing::insert_copy(conn, target, edge, &record)?;
                copied_routing += 1;
            }
            _ => {
                tracing::debug!(edge = %record.edge_id, "skipping routing of an undrawn edge");
                skipped_routing += 1;
            }
        }
    }

    let report = CloneReport {
        workspace,
        groups: maps.groups.len(),
        items: maps.items.len(),
        connections: copied_connections,
        group_links: copied_links,
        routing: copied_routing,
        skipped_connections,
        skipped_group_links: skipped_links,
        skipped_routing,
    };
    tracing::info!(
        source = %source,
        copy = %target,
        groups = report.groups,
        items = report.items,
        connections = report.connections,
        routing = report.routing,
        skipped = report.skipped_connections + report.skipped_group_links + report.skipped_routing,
        "duplicated workspace"
    );
    Ok(report)
}
