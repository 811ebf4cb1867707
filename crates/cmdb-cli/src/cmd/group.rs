//! `cmdb group`: groups and legacy group links.

use clap::{Args, Subcommand};
use cmdb_core::Cmdb;
use cmdb_core::model::{Group, GroupFields, GroupId, GroupLink};
use std::io::Write;

use super::resolve_workspace;
use crate::output::{OutputMode, pretty_kv, pretty_section, render};

#[derive(Args, Debug)]
pub struct GroupArgs {
    #[command(subcommand)]
    pub command: GroupCommand,
}

#[derive(Subcommand, Debug)]
pub enum GroupCommand {
    /// List the groups of a workspace.
    List {
        #[arg(long, short)]
        workspace: Option<i64>,
    },

    #[command(
        about = "Create a group",
        after_help = "EXAMPLES:\n    cmdb group create web --color \"#fde68a\"\n\n    cmdb group create data --workspace 2"
    )]
    Create {
        name: String,
        #[arg(long, short)]
        workspace: Option<i64>,
        #[arg(long)]
        description: Option<String>,
        #[arg(long)]
        color: Option<String>,
    },

    /// Delete a group; its members become ungrouped.
    Delete { id: i64 },

    /// Link two groups (legacy group-to-group link).
    Link {
        source: i64,
        target: i64,
        #[arg(long, short)]
        workspace: Option<i64>,
    },

    /// Remove a legacy group-to-group link.
    Unlink { source: i64, target: i64 },

    /// List legacy group-to-group links.
    Links {
        #[arg(long, short)]
        workspace: Option<i64>,
    },
}

fn write_group(w: &mut dyn Write, group: &Group) -> std::io::Result<()> {
    pretty_section(w, &format!("group {}", group.id))?;
    pretty_kv(w, "name", &group.name)?;
    if let Some(description) = &group.description {
        pretty_kv(w, "description", description)?;
    }
    pretty_kv(w, "color", &group.color)
}

fn write_link(w: &mut dyn Write, link: &GroupLink) -> std::io::Result<()> {
    writeln!(w, "{:>4}  {} -> {}", link.id, link.source_id, link.target_id)
}

pub fn run_group(args: &GroupArgs, cmdb: &mut Cmdb, output: OutputMode) -> anyhow::Result<()> {
    match &args.command {
        GroupCommand::List { workspace } => {
            let ws = resolve_workspace(cmdb, *workspace)?;
            let groups = cmdb.list_groups(ws)?;
            render(output, &groups, |groups, w| {
                for group in groups {
                    writeln!(w, "{:>4}  {:<24} {}", group.id, group.name, group.color)?;
                }
                Ok(())
            })
        }
        GroupCommand::Create {
            name,
            workspace,
            description,
            color,
        } => {
            let ws = resolve_workspace(cmdb, *workspace)?;
            let fields = GroupFields {
                name: name.clone(),
                description: description.clone(),
                color: color.clone(),
                position: None,
            };
            let group = cmdb.create_group(ws, &fields)?;
            render(output, &group, |group, w| write_group(w, group))
        }
        GroupCommand::Delete { id } => {
            let group = cmdb.delete_group(GroupId(*id))?;
            render(output, &group, |group, w| {
                writeln!(w, "deleted group {} ({})", group.id, group.name)
            })
        }
        GroupCommand::Link {
            source,
            target,
            workspace,
        } => {
            let ws = resolve_workspace(cmdb, *workspace)?;
            let link = cmdb.create_group_link(ws, GroupId(*source), GroupId(*target))?;
            render(output, &link, |link, w| write_link(w, link))
        }
        GroupCommand::Unlink { source, target } => {
            let removed = cmdb.delete_group_link(GroupId(*source), GroupId(*target))?;
            let result = serde_json::json!({ "removed": removed });
            render(output, &result, |_, w| {
                if removed {
                    writeln!(w, "unlinked {source} -> {target}")
                } else {
                    writeln!(w, "no link {source} -> {target}")
                }
            })
        }
        GroupCommand::Links { workspace } => {
            let ws = resolve_workspace(cmdb, *workspace)?;
            let links = cmdb.list_group_links(ws)?;
            render(output, &links, |links, w| {
                links.iter().try_for_each(|link| write_link(w, link))
            })
        }
    }
}
