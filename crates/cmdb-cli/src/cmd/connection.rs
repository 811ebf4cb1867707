//! `cmdb connection`: directed edges between items and groups.

use clap::{Args, Subcommand};
use cmdb_core::Cmdb;
use cmdb_core::model::{Connection, EdgeRef, EdgeShape, GroupId, ItemId};
use std::io::Write;

use super::resolve_workspace;
use crate::output::{OutputMode, render};

#[derive(Args, Debug)]
pub struct ConnectionArgs {
    #[command(subcommand)]
    pub command: ConnectionCommand,
}

#[derive(Subcommand, Debug)]
pub enum ConnectionCommand {
    /// List connections of a workspace, an item or a group.
    List {
        #[arg(long, short, conflicts_with_all = ["item", "group"])]
        workspace: Option<i64>,
        #[arg(long, conflicts_with = "group")]
        item: Option<i64>,
        #[arg(long)]
        group: Option<i64>,
    },

    #[command(
        about = "Connect two endpoints",
        after_help = "EXAMPLES:\n    # Item 4 depends on item 7\n    cmdb connection create 4 7\n\n    # Group 2 feeds item 9\n    cmdb connection create 2 9 --shape group-item"
    )]
    Create {
        source: i64,
        target: i64,
        /// item-item, item-group, group-item or group-group.
        #[arg(long, default_value = "item-item")]
        shape: EdgeShape,
        #[arg(long, short)]
        workspace: Option<i64>,
    },

    /// Remove a connection and its routing record.
    Delete {
        source: i64,
        target: i64,
        #[arg(long, default_value = "item-item")]
        shape: EdgeShape,
    },
}

fn write_edge(w: &mut dyn Write, edge: &Connection) -> std::io::Result<()> {
    writeln!(
        w,
        "{:>4}  {:<12} {:<18} {} -> {}",
        edge.id,
        edge.shape().as_str(),
        EdgeRef::for_connection(edge).to_string(),
        edge.source,
        edge.target
    )
}

fn write_edges(w: &mut dyn Write, edges: &[Connection]) -> std::io::Result<()> {
    if edges.is_empty() {
        return writeln!(w, "no connections");
    }
    edges.iter().try_for_each(|edge| write_edge(w, edge))
}

pub fn run_connection(
    args: &ConnectionArgs,
    cmdb: &mut Cmdb,
    output: OutputMode,
) -> anyhow::Result<()> {
    match &args.command {
        ConnectionCommand::List {
            workspace,
            item,
            group,
        } => {
            let edges = match (item, group) {
                (Some(item), _) => cmdb.connections_for_item(ItemId(*item))?,
                (None, Some(group)) => cmdb.connections_for_group(GroupId(*group))?,
                (None, None) => {
                    let ws = resolve_workspace(cmdb, *workspace)?;
                    cmdb.list_connections(ws)?
                }
            };
            render(output, &edges, |edges, w| write_edges(w, edges))
        }
        ConnectionCommand::Create {
            source,
            target,
            shape,
            workspace,
        } => {
            let ws = resolve_workspace(cmdb, *workspace)?;
            let edge = cmdb.create_connection(*shape, *source, *target, ws)?;
            render(output, &edge, |edge, w| write_edge(w, edge))
        }
        ConnectionCommand::Delete {
            source,
            target,
            shape,
        } => {
            let removed = cmdb.delete_connection(*shape, *source, *target)?;
            let result = serde_json::json!({ "removed": removed });
            render(output, &result, |_, w| writeln!(w, "removed {removed} connection(s)"))
        }
    }
}
