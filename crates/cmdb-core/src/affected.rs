//! Impact analysis over the item dependency graph.
//!
//! # Overview
//!
//! Given a starting item, find every item reachable by following outgoing
//! item→item connections, annotated with its hop distance. This answers
//! "what breaks if this item goes down".
//!
//! # Design
//!
//! - **Breadth-first**: level 1 holds the direct targets of the start item,
//!   level k+1 the targets of level-k items. The first visit of an item is
//!   therefore at its minimum distance, and that is the level reported.
//! - **Bounded**: expansion stops after [`MAX_AFFECTED_DEPTH`] levels (or a
//!   smaller configured depth). The visited set keeps cyclic graphs from
//!   re-expanding nodes.
//! - **Start excluded**: the starting item is never part of the result, even
//!   when a cycle leads back to it.
//! - **Item edges only**: edges with a group endpoint do not propagate.

use rusqlite::Connection;
use std::collections::{HashMap, VecDeque};

use crate::connections;
use crate::error::Result;
use crate::items;
use crate::model::{AffectedItem, ItemId};

/// Hard upper bound on traversal depth.
pub const MAX_AFFECTED_DEPTH: u32 = 10;

/// Items reachable from `start` within `max_depth` hops, ordered by level
/// and then id. Each item appears once, at its minimum level.
///
/// # Errors
///
/// Returns [`crate::CoreError::NotFound`] if `start` does not exist, or a
/// store error if a query fails.
pub fn affected_items(
    conn: &Connection,
    start: ItemId,
    max_depth: u32,
) -> Result<Vec<AffectedItem>> {
    items::get(conn, start)?;
    let max_depth = max_depth.min(MAX_AFFECTED_DEPTH);

    let mut levels: HashMap<ItemId, u32> = HashMap::new();
    let mut queue: VecDeque<(ItemId, u32)> = VecDeque::from([(start, 0)]);

    while let Some((current, depth)) = queue.pop_front() {
        if depth >= max_depth {
            continue;
        }
        for target in connections::outgoing_items(conn, current)? {
            if target == start || levels.contains_key(&target) {
                continue;
            }
            levels.insert(target, depth + 1);
            queue.push_back((target, depth + 1));
        }
    }

    let mut ordered: Vec<(ItemId, u32)> = levels.into_iter().collect();
    ordered.sort_unstable_by_key(|&(id, level)| (level, id));
    let ids: Vec<ItemId> = ordered.iter().map(|(id, _)| *id).collect();

    let mut found: HashMap<ItemId, _> = items::get_many(conn, &ids)?
        .into_iter()
        .map(|item| (item.id, item))
        .collect();
    let affected = ordered
        .into_iter()
        .filter_map(|(id, level)| found.remove(&id).map(|item| AffectedItem { item, level }))
        .collect::<Vec<_>>();

    tracing::debug!(item = %start, max_depth, count = affected.len(), "resolved affected items");
    Ok(affected)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CoreError;
    use crate::model::Endpoint;
    use crate::test_support::Fixture;

    fn chain(fx: &Fixture, ids: &[ItemId]) {
        for pair in ids.windows(2) {
            fx.connect(Endpoint::Item(pair[0]), Endpoint::Item(pair[1]));
        }
    }

    fn levels(result: &[AffectedItem]) -> Vec<(ItemId, u32)> {
        result.iter().map(|a| (a.item.id, a.level)).collect()
    }

    #[test]
    fn no_outgoing_edges_is_empty() {
        let fx = Fixture::new();
        let a = fx.loose_item("a");
        let b = fx.loose_item("b");
        fx.connect(Endpoint::Item(b), Endpoint::Item(a));
        assert!(affected_items(&fx.conn, a, MAX_AFFECTED_DEPTH).expect("resolve").is_empty());
    }

    #[test]
    fn cycle_terminates_and_excludes_start() {
        let fx = Fixture::new();
        let one = fx.loose_item("1");
        let two = fx.loose_item("2");
        let three = fx.loose_item("3");
        chain(&fx, &[one, two, three, one]);

        let result = affected_items(&fx.conn, one, MAX_AFFECTED_DEPTH).expect("resolve");
        assert_eq!(levels(&result), vec![(two, 1), (three, 2)]);
    }

    #[test]
    fn diamond_reports_minimum_level_once() {
        let fx = Fixture::new();
        let a = fx.loose_item("a");
        let b = fx.loose_item("b");
        let c = fx.loose_item("c");
        let d = fx.loose_item("d");
        chain(&fx, &[a, b, c, d]);
        fx.connect(Endpoint::Item(a), Endpoint::Item(d));

        let result = affected_items(&fx.conn, a, MAX_AFFECTED_DEPTH).expect("resolve");
        assert_eq!(levels(&result), vec![(b, 1), (d, 1), (c, 2)]);
    }

    #[test]
    fn depth_bound_cuts_long_chains() {
        let fx = Fixture::new();
        let ids: Vec<ItemId> = (0..14).map(|i| fx.loose_item(&format!("n{i}"))).collect();
        chain(&fx, &ids);

        let result = affected_items(&fx.conn, ids[0], 50).expect("resolve");
        assert_eq!(result.len(), MAX_AFFECTED_DEPTH as usize);
        assert_eq!(result.last().map(|a| a.level), Some(MAX_AFFECTED_DEPTH));

        let shallow = affected_items(&fx.conn, ids[0], 2).expect("resolve");
        assert_eq!(levels(&shallow), vec![(ids[1], 1), (ids[2], 2)]);
    }

    #[test]
    fn group_edges_do_not_propagate() {
        let fx = Fixture::new();
        let g = fx.group("g");
        let a = fx.loose_item("a");
        let b = fx.item_in("b", g);
        fx.connect(Endpoint::Item(a), Endpoint::Group(g));
        fx.connect(Endpoint::Group(g), Endpoint::Item(b));
        assert!(affected_items(&fx.conn, a, MAX_AFFECTED_DEPTH).expect("resolve").is_empty());
    }

    #[test]
    fn missing_start_is_not_found() {
        let fx = Fixture::new();
        let err = affected_items(&fx.conn, ItemId(77), MAX_AFFECTED_DEPTH).expect_err("missing");
        assert!(matches!(err, CoreError::NotFound { .. }));
    }
}
