//! `cmdb routing`: which handle each end of a drawn edge attaches to.

use clap::{Args, Subcommand};
use cmdb_core::Cmdb;
use cmdb_core::model::RoutingRecord;
use std::io::Write;

use super::resolve_workspace;
use crate::output::{OutputMode, render};

#[derive(Args, Debug)]
pub struct RoutingArgs {
    #[command(subcommand)]
    pub command: RoutingCommand,
}

#[derive(Subcommand, Debug)]
pub enum RoutingCommand {
    /// List routing records of edges that currently exist.
    List {
        #[arg(long, short)]
        workspace: Option<i64>,
    },

    #[command(
        about = "Set the handles of an edge",
        after_help = "EXAMPLES:\n    cmdb routing upsert e4-7 right left\n\n    cmdb routing upsert group-e2-3 bottom top"
    )]
    Upsert {
        /// Edge id: e<a>-<b>, e<a>-group<b>, group<a>-e<b> or group-e<a>-<b>.
        edge_id: String,
        source_handle: String,
        target_handle: String,
        #[arg(long, short)]
        workspace: Option<i64>,
    },

    /// Delete the routing records of one or more edges.
    Delete {
        #[arg(required = true)]
        edge_ids: Vec<String>,
    },
}

fn write_record(w: &mut dyn Write, record: &RoutingRecord) -> std::io::Result<()> {
    writeln!(
        w,
        "{:<18} {} -> {}",
        record.edge_id.to_string(),
        record.source_handle,
        record.target_handle
    )
}

pub fn run_routing(args: &RoutingArgs, cmdb: &mut Cmdb, output: OutputMode) -> anyhow::Result<()> {
    match &args.command {
        RoutingCommand::List { workspace } => {
            let ws = resolve_workspace(cmdb, *workspace)?;
            let records = cmdb.list_edge_routing(ws)?;
            render(output, &records, |records, w| {
                records.iter().try_for_each(|record| write_record(w, record))
            })
        }
        RoutingCommand::Upsert {
            edge_id,
            source_handle,
            target_handle,
            workspace,
        } => {
            let ws = resolve_workspace(cmdb, *workspace)?;
            let record = cmdb.upsert_edge_routing(edge_id, source_handle, target_handle, ws)?;
            render(output, &record, |record, w| write_record(w, record))
        }
        RoutingCommand::Delete { edge_ids } => {
            let removed = if let [single] = edge_ids.as_slice() {
                usize::from(cmdb.delete_edge_routing(single)?)
            } else {
                cmdb.delete_edge_routings(edge_ids)?
            };
            let result = serde_json::json!({ "removed": removed });
            render(output, &result, |_, w| writeln!(w, "removed {removed} routing record(s)"))
        }
    }
}
