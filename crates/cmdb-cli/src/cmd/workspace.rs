//! `cmdb workspace`: list, create and maintain workspaces.

use clap::{Args, Subcommand};
use cmdb_core::Cmdb;
use cmdb_core::model::{Workspace, WorkspaceId};
use std::io::Write;

use crate::output::{OutputMode, local_time, pretty_kv, pretty_section, render};

#[derive(Args, Debug)]
pub struct WorkspaceArgs {
    #[command(subcommand)]
    pub command: WorkspaceCommand,
}

#[derive(Subcommand, Debug)]
pub enum WorkspaceCommand {
    /// List workspaces, default first.
    List,

    #[command(
        about = "Create a workspace",
        after_help = "EXAMPLES:\n    cmdb workspace create staging --description \"pre-prod\""
    )]
    Create {
        name: String,
        #[arg(long)]
        description: Option<String>,
    },

    /// Rename a workspace or change its description.
    Update {
        id: i64,
        name: String,
        #[arg(long)]
        description: Option<String>,
    },

    /// Delete a workspace and everything it owns.
    Delete { id: i64 },

    /// Make a workspace the default one.
    SetDefault { id: i64 },

    #[command(
        about = "Deep-copy a workspace under fresh ids",
        after_help = "EXAMPLES:\n    # Copy as \"<name> (copy)\"\n    cmdb workspace duplicate 1\n\n    # Copy under an explicit name\n    cmdb workspace duplicate 1 --name staging"
    )]
    Duplicate {
        id: i64,
        #[arg(long)]
        name: Option<String>,
    },
}

fn write_row(w: &mut dyn Write, ws: &Workspace) -> std::io::Result<()> {
    let marker = if ws.is_default { "*" } else { " " };
    writeln!(w, "{marker} {:>4}  {}", ws.id, ws.name)
}

fn write_detail(w: &mut dyn Write, ws: &Workspace) -> std::io::Result<()> {
    pretty_section(w, &format!("workspace {}", ws.id))?;
    pretty_kv(w, "name", &ws.name)?;
    if let Some(description) = &ws.description {
        pretty_kv(w, "description", description)?;
    }
    pretty_kv(w, "default", if ws.is_default { "yes" } else { "no" })?;
    pretty_kv(w, "created", local_time(ws.created_at_us))
}

pub fn run_workspace(
    args: &WorkspaceArgs,
    cmdb: &mut Cmdb,
    output: OutputMode,
) -> anyhow::Result<()> {
    match &args.command {
        WorkspaceCommand::List => {
            let workspaces = cmdb.list_workspaces()?;
            render(output, &workspaces, |list, w| {
                if list.is_empty() {
                    return writeln!(w, "no workspaces");
                }
                list.iter().try_for_each(|ws| write_row(w, ws))
            })
        }
        WorkspaceCommand::Create { name, description } => {
            let ws = cmdb.create_workspace(name, description.as_deref())?;
            render(output, &ws, |ws, w| write_detail(w, ws))
        }
        WorkspaceCommand::Update {
            id,
            name,
            description,
        } => {
            let ws = cmdb.update_workspace(WorkspaceId(*id), name, description.as_deref())?;
            render(output, &ws, |ws, w| write_detail(w, ws))
        }
        WorkspaceCommand::Delete { id } => {
            let ws = cmdb.delete_workspace(WorkspaceId(*id))?;
            render(output, &ws, |ws, w| writeln!(w, "deleted workspace {} ({})", ws.id, ws.name))
        }
        WorkspaceCommand::SetDefault { id } => {
            let ws = cmdb.set_default_workspace(WorkspaceId(*id))?;
            render(output, &ws, |ws, w| {
                writeln!(w, "default workspace is now {} ({})", ws.id, ws.name)
            })
        }
        WorkspaceCommand::Duplicate { id, name } => {
            let report = cmdb.duplicate_workspace_with_report(WorkspaceId(*id), name.as_deref())?;
            render(output, &report, |r, w| {
                write_detail(w, &r.workspace)?;
                pretty_kv(w, "groups", r.groups.to_string())?;
                pretty_kv(w, "items", r.items.to_string())?;
                pretty_kv(w, "connections", r.connections.to_string())?;
                pretty_kv(w, "group links", r.group_links.to_string())?;
                pretty_kv(w, "routing", r.routing.to_string())?;
                let skipped = r.skipped_connections + r.skipped_group_links + r.skipped_routing;
                if skipped > 0 {
                    pretty_kv(w, "skipped", skipped.to_string())?;
                }
                Ok(())
            })
        }
    }
}
