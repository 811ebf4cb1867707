//! Dense per-group ordering of items.
//!
//! Every group keeps its members ranked `0..n` by `order_in_group`, with no
//! gaps and no duplicates, after every successful operation. The functions
//! here issue the shifting statements that preserve that invariant; they
//! expect to run inside the caller's transaction so that a failure at any
//! step rolls the whole move back.
//!
//! All shifting statements are scoped by `(workspace_id, group_id)`, so an
//! operation never touches rows of another workspace. Service items use the
//! same engine through [`SERVICE_ITEMS`], scoped by `(service_id, group_id)`.
//!
//! # Operations
//!
//! - [`next_order`]: rank for an item appended to a group.
//! - [`set_group`]: move an item between groups (or in/out of a group),
//!   closing the gap it leaves and opening a slot where it lands.
//! - [`reorder`]: move an item to a new rank within its current group.
//! - [`close_gap`]: shift members down after one leaves a rank.

use rusqlite::{Connection, OptionalExtension, params};
use serde::{Deserialize, Serialize};

use crate::config::OrderingConfig;
use crate::db::now_us;
use crate::error::{CoreError, Entity, Result};
use crate::groups;
use crate::model::{GroupId, ItemId, WorkspaceId};

/// Where an item sits after an ordering operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Placement {
    pub item_id: ItemId,
    pub group_id: Option<GroupId>,
    pub order_in_group: Option<i64>,
}

impl Placement {
    const fn from_slot(item_id: ItemId, slot: Slot) -> Self {
        Self {
            item_id,
            group_id: match slot.group {
                Some(group) => Some(GroupId(group)),
                None => None,
            },
            order_in_group: slot.order,
        }
    }
}

/// A table whose rows are ranked inside groups, and the column that scopes
/// the ranking. Every statement filters on both the scope and the group.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Ranking {
    entity: Entity,
    table: &'static str,
    id_column: &'static str,
    scope_column: &'static str,
}

/// Configuration items, ranked per workspace.
pub(crate) const ITEMS: Ranking = Ranking {
    entity: Entity::Item,
    table: "cmdb_items",
    id_column: "item_id",
    scope_column: "workspace_id",
};

/// Service items, ranked per service.
pub(crate) const SERVICE_ITEMS: Ranking = Ranking {
    entity: Entity::ServiceItem,
    table: "service_items",
    id_column: "service_item_id",
    scope_column: "service_id",
};

/// Raw group and rank of one row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Slot {
    pub group: Option<i64>,
    pub order: Option<i64>,
}

#[derive(Debug, Clone, Copy)]
struct Membership {
    scope: i64,
    slot: Slot,
}

fn check_requested(order: i64, config: &OrderingConfig) -> Result<()> {
    if order < 0 && !config.clamp_out_of_range {
        return Err(CoreError::Validation(format!(
            "order_in_group must be non-negative, got {order}"
        )));
    }
    Ok(())
}

impl Ranking {
    fn membership(self, conn: &Connection, row: i64) -> Result<Membership> {
        let sql = format!(
            "SELECT {}, group_id, order_in_group FROM {} WHERE {} = ?1",
            self.scope_column, self.table, self.id_column
        );
        conn.query_row(&sql, params![row], |r| {
            Ok(Membership {
                scope: r.get(0)?,
                slot: Slot {
                    group: r.get(1)?,
                    order: r.get(2)?,
                },
            })
        })
        .optional()?
        .ok_or_else(|| CoreError::not_found(self.entity, row))
    }

    pub(crate) fn group_size(self, conn: &Connection, scope: i64, group: i64) -> Result<i64> {
        let sql = format!(
            "SELECT COUNT(*) FROM {} WHERE {} = ?1 AND group_id = ?2",
            self.table, self.scope_column
        );
        Ok(conn.query_row(&sql, params![scope, group], |row| row.get(0))?)
    }

    pub(crate) fn next_order(self, conn: &Connection, scope: i64, group: i64) -> Result<i64> {
        let sql = format!(
            "SELECT COALESCE(MAX(order_in_group) + 1, 0) FROM {} WHERE {} = ?1 AND group_id = ?2",
            self.table, self.scope_column
        );
        Ok(conn.query_row(&sql, params![scope, group], |row| row.get(0))?)
    }

    pub(crate) fn close_gap(
        self,
        conn: &Connection,
        scope: i64,
        group: i64,
        removed: i64,
    ) -> Result<usize> {
        let sql = format!(
            "UPDATE {} SET order_in_group = order_in_group - 1
             WHERE {} = ?1 AND group_id = ?2 AND order_in_group > ?3",
            self.table, self.scope_column
        );
        Ok(conn.execute(&sql, params![scope, group, removed])?)
    }

    fn open_slot(self, conn: &Connection, scope: i64, group: i64, at: i64) -> Result<usize> {
        let sql = format!(
            "UPDATE {} SET order_in_group = order_in_group + 1
             WHERE {} = ?1 AND group_id = ?2 AND order_in_group >= ?3",
            self.table, self.scope_column
        );
        Ok(conn.execute(&sql, params![scope, group, at])?)
    }

    fn write(self, conn: &Connection, row: i64, slot: Slot) -> Result<()> {
        let sql = format!(
            "UPDATE {} SET group_id = ?1, order_in_group = ?2, updated_at_us = ?3 WHERE {} = ?4",
            self.table, self.id_column
        );
        conn.execute(&sql, params![slot.group, slot.order, now_us(), row])?;
        Ok(())
    }

    /// Move `row` into `new_group`, or out of any group when `None`.
    ///
    /// `require_group` receives the row's scope and the target group and must
    /// fail unless the group exists inside that scope.
    pub(crate) fn set_group(
        self,
        conn: &Connection,
        row: i64,
        new_group: Option<i64>,
        desired: Option<i64>,
        config: &OrderingConfig,
        require_group: impl FnOnce(i64, i64) -> Result<()>,
    ) -> Result<Slot> {
        let current = self.membership(conn, row)?;
        if let Some(group) = new_group {
            require_group(current.scope, group)?;
        }
        if let Some(order) = desired {
            check_requested(order, config)?;
        }

        if current.slot.group == new_group {
            return match (new_group, desired) {
                (Some(_), Some(order)) => self.reorder(conn, row, order, config),
                _ => Ok(current.slot),
            };
        }

        let scope = current.scope;
        if let (Some(old_group), Some(old_order)) = (current.slot.group, current.slot.order) {
            let shifted = self.close_gap(conn, scope, old_group, old_order)?;
            tracing::debug!(
                table = self.table,
                row,
                old_group,
                old_order,
                shifted,
                "closed gap in former group"
            );
        }

        let order = match new_group {
            Some(group) => Some(match desired {
                Some(order) => {
                    let order = if config.clamp_out_of_range {
                        order.clamp(0, self.group_size(conn, scope, group)?)
                    } else {
                        order
                    };
                    let shifted = self.open_slot(conn, scope, group, order)?;
                    tracing::debug!(
                        table = self.table,
                        row,
                        group,
                        order,
                        shifted,
                        "opened slot in target group"
                    );
                    order
                }
                None => self.next_order(conn, scope, group)?,
            }),
            None => None,
        };

        let slot = Slot {
            group: new_group,
            order,
        };
        self.write(conn, row, slot)?;
        Ok(slot)
    }

    /// Move `row` to rank `new_order` within its current group.
    pub(crate) fn reorder(
        self,
        conn: &Connection,
        row: i64,
        new_order: i64,
        config: &OrderingConfig,
    ) -> Result<Slot> {
        let current = self.membership(conn, row)?;
        let Some(group) = current.slot.group else {
            return Err(CoreError::InvalidState(format!("{} {row} is not in a group", self.entity)));
        };
        check_requested(new_order, config)?;

        let scope = current.scope;
        let old_order = current.slot.order.unwrap_or(0);
        let new_order = if config.clamp_out_of_range {
            let last = (self.group_size(conn, scope, group)? - 1).max(0);
            new_order.clamp(0, last)
        } else {
            new_order
        };

        let slot = Slot {
            group: Some(group),
            order: Some(new_order),
        };
        if current.slot.order == Some(new_order) {
            return Ok(slot);
        }

        let shifted = if old_order < new_order {
            let sql = format!(
                "UPDATE {} SET order_in_group = order_in_group - 1
                 WHERE {} = ?1 AND group_id = ?2
                   AND order_in_group > ?3 AND order_in_group <= ?4",
                self.table, self.scope_column
            );
            conn.execute(&sql, params![scope, group, old_order, new_order])?
        } else {
            let sql = format!(
                "UPDATE {} SET order_in_group = order_in_group + 1
                 WHERE {} = ?1 AND group_id = ?2
                   AND order_in_group >= ?3 AND order_in_group < ?4",
                self.table, self.scope_column
            );
            conn.execute(&sql, params![scope, group, new_order, old_order])?
        };
        tracing::debug!(
            table = self.table,
            row,
            group,
            old_order,
            new_order,
            shifted,
            "reordered"
        );

        self.write(conn, row, slot)?;
        Ok(slot)
    }

    /// Members of `group` with their ranks, lowest rank first.
    pub(crate) fn orders(
        self,
        conn: &Connection,
        scope: i64,
        group: i64,
    ) -> Result<Vec<(i64, i64)>> {
        let sql = format!(
            "SELECT {}, order_in_group FROM {}
             WHERE {} = ?1 AND group_id = ?2
             ORDER BY order_in_group, {}",
            self.id_column, self.table, self.scope_column, self.id_column
        );
        let mut stmt = conn.prepare_cached(&sql)?;
        let rows = stmt
            .query_map(params![scope, group], |row| {
                Ok((row.get(0)?, row.get::<_, Option<i64>>(1)?.unwrap_or(-1)))
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }
}

/// Number of items currently ranked in `group`.
///
/// # Errors
///
/// Returns an error if the query fails.
pub fn group_size(conn: &Connection, workspace: WorkspaceId, group: GroupId) -> Result<i64> {
    ITEMS.group_size(conn, workspace.0, group.0)
}

/// Rank for an item appended to `group`: `max(order_in_group) + 1`, or `0`
/// when the group is empty.
///
/// # Errors
///
/// Returns an error if the query fails.
pub fn next_order(conn: &Connection, workspace: WorkspaceId, group: GroupId) -> Result<i64> {
    ITEMS.next_order(conn, workspace.0, group.0)
}

/// Shift every member ranked above `removed` down by one.
///
/// # Errors
///
/// Returns an error if the update fails.
pub fn close_gap(
    conn: &Connection,
    workspace: WorkspaceId,
    group: GroupId,
    removed: i64,
) -> Result<usize> {
    ITEMS.close_gap(conn, workspace.0, group.0, removed)
}

/// Move `item` into `new_group` (or out of any group when `None`).
///
/// Leaving a group closes the gap at the item's former rank. Entering a
/// group either appends (`desired = None`) or inserts at `desired`, shifting
/// the members at or above it. Targeting the item's current group with a
/// desired rank behaves like [`reorder`]; without one it changes nothing.
///
/// # Errors
///
/// - [`CoreError::NotFound`] if the item or the target group does not exist.
/// - [`CoreError::Validation`] if the target group belongs to another
///   workspace, or `desired` is negative while clamping is disabled.
/// - [`CoreError::Store`] on any store failure.
pub fn set_group(
    conn: &Connection,
    item: ItemId,
    new_group: Option<GroupId>,
    desired: Option<i64>,
    config: &OrderingConfig,
) -> Result<Placement> {
    let slot = ITEMS.set_group(
        conn,
        item.0,
        new_group.map(GroupId::get),
        desired,
        config,
        |workspace, group| {
            groups::require_in_workspace(conn, GroupId(group), WorkspaceId(workspace))
        },
    )?;
    Ok(Placement::from_slot(item, slot))
}

/// Move `item` to rank `new_order` within its current group.
///
/// Members between the old and new rank shift by one toward the vacated
/// slot. Requesting the current rank is a no-op.
///
/// # Errors
///
/// - [`CoreError::NotFound`] if the item does not exist.
/// - [`CoreError::InvalidState`] if the item is not in a group.
/// - [`CoreError::Validation`] if `new_order` is negative while clamping is
///   disabled.
/// - [`CoreError::Store`] on any store failure.
pub fn reorder(
    conn: &Connection,
    item: ItemId,
    new_order: i64,
    config: &OrderingConfig,
) -> Result<Placement> {
    let slot = ITEMS.reorder(conn, item.0, new_order, config)?;
    Ok(Placement::from_slot(item, slot))
}

/// Members of `group` with their ranks, lowest rank first.
///
/// # Errors
///
/// Returns an error if the query fails.
pub fn group_orders(
    conn: &Connection,
    workspace: WorkspaceId,
    group: GroupId,
) -> Result<Vec<(ItemId, i64)>> {
    let orders = ITEMS.orders(conn, workspace.0, group.0)?;
    Ok(orders.into_iter().map(|(id, order)| (ItemId(id), order)).collect())
}

/// `true` when the ranks in `group` are exactly `0..n`.
///
/// # Errors
///
/// Returns an error if the query fails.
pub fn is_dense(conn: &Connection, workspace: WorkspaceId, group: GroupId) -> Result<bool> {
    let orders = group_orders(conn, workspace, group)?;
    Ok(orders
        .iter()
        .zip(0_i64..)
        .all(|((_, order), expected)| *order == expected))
}
