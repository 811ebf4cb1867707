//! `cmdb item`: items, their placement in groups, and impact queries.

use clap::{Args, Subcommand};
use cmdb_core::Cmdb;
use cmdb_core::model::{AffectedItem, GroupId, Item, ItemId, NewItem};
use std::io::Write;

use super::resolve_workspace;
use crate::output::{OutputMode, local_time, pretty_kv, pretty_section, render};

#[derive(Args, Debug)]
pub struct ItemArgs {
    #[command(subcommand)]
    pub command: ItemCommand,
}

#[derive(Subcommand, Debug)]
pub enum ItemCommand {
    /// List items grouped and ranked.
    List {
        #[arg(long, short)]
        workspace: Option<i64>,
    },

    /// Show one item.
    Show { id: i64 },

    #[command(
        about = "Create an item",
        after_help = "EXAMPLES:\n    # Loose item in the default workspace\n    cmdb item create web-01 --type server --ip 10.0.0.5\n\n    # Appended to group 3\n    cmdb item create web-02 --group 3"
    )]
    Create(CreateItemArgs),

    #[command(
        about = "Move an item into another group, or out of any group",
        after_help = "EXAMPLES:\n    # Append to group 3\n    cmdb item move 12 --group 3\n\n    # Insert at rank 0 of group 3\n    cmdb item move 12 --group 3 --order 0\n\n    # Leave the current group\n    cmdb item move 12 --ungroup"
    )]
    Move {
        id: i64,
        #[arg(long, conflicts_with = "ungroup", required_unless_present = "ungroup")]
        group: Option<i64>,
        #[arg(long)]
        ungroup: bool,
        #[arg(long, allow_negative_numbers = true)]
        order: Option<i64>,
    },

    /// Move an item to a new rank within its group.
    Reorder {
        id: i64,
        #[arg(allow_negative_numbers = true)]
        order: i64,
    },

    /// Delete an item with its connections and routing.
    Delete { id: i64 },

    /// Items reachable through outgoing connections, with hop distance.
    Affected { id: i64 },

    /// Items this one points at.
    Dependents { id: i64 },

    /// Items pointing at this one.
    Dependencies { id: i64 },
}

#[derive(Args, Debug)]
pub struct CreateItemArgs {
    pub name: String,
    #[arg(long, short)]
    pub workspace: Option<i64>,
    #[arg(long, short)]
    pub group: Option<i64>,
    #[arg(long = "type")]
    pub item_type: Option<String>,
    #[arg(long)]
    pub description: Option<String>,
    #[arg(long)]
    pub status: Option<String>,
    #[arg(long)]
    pub ip: Option<String>,
    #[arg(long)]
    pub category: Option<String>,
    #[arg(long)]
    pub location: Option<String>,
    #[arg(long)]
    pub env_type: Option<String>,
}

fn write_row(w: &mut dyn Write, item: &Item) -> std::io::Result<()> {
    let place = match (item.group_id, item.order_in_group) {
        (Some(group), Some(order)) => format!("{group}#{order}"),
        _ => "-".to_owned(),
    };
    writeln!(w, "{:>4}  {:<8} {:<24} {}", item.id, place, item.name, item.status)
}

fn write_item(w: &mut dyn Write, item: &Item) -> std::io::Result<()> {
    pretty_section(w, &format!("item {}", item.id))?;
    pretty_kv(w, "name", &item.name)?;
    for (key, value) in [
        ("type", &item.item_type),
        ("description", &item.description),
        ("ip", &item.ip),
        ("category", &item.category),
        ("location", &item.location),
        ("env", &item.env_type),
    ] {
        if let Some(value) = value {
            pretty_kv(w, key, value)?;
        }
    }
    pretty_kv(w, "status", &item.status)?;
    if let (Some(group), Some(order)) = (item.group_id, item.order_in_group) {
        pretty_kv(w, "group", format!("{group} (rank {order})"))?;
    }
    pretty_kv(w, "workspace", item.workspace_id.to_string())?;
    pretty_kv(w, "updated", local_time(item.updated_at_us))
}

fn write_list(w: &mut dyn Write, items: &[Item]) -> std::io::Result<()> {
    if items.is_empty() {
        return writeln!(w, "no items");
    }
    items.iter().try_for_each(|item| write_row(w, item))
}

fn write_affected(w: &mut dyn Write, affected: &[AffectedItem]) -> std::io::Result<()> {
    if affected.is_empty() {
        return writeln!(w, "nothing affected");
    }
    for entry in affected {
        writeln!(w, "L{:<3} {:>4}  {}", entry.level, entry.item.id, entry.item.name)?;
    }
    Ok(())
}

fn create_item(args: &CreateItemArgs, cmdb: &mut Cmdb) -> anyhow::Result<Item> {
    let ws = resolve_workspace(cmdb, args.workspace)?;
    let mut request = NewItem::new(ws, args.name.clone());
    request.group_id = args.group.map(GroupId);
    request.fields.item_type.clone_from(&args.item_type);
    request.fields.description.clone_from(&args.description);
    request.fields.status.clone_from(&args.status);
    request.fields.ip.clone_from(&args.ip);
    request.fields.category.clone_from(&args.category);
    request.fields.location.clone_from(&args.location);
    request.fields.env_type.clone_from(&args.env_type);
    Ok(cmdb.create_item(&request)?)
}

pub fn run_item(args: &ItemArgs, cmdb: &mut Cmdb, output: OutputMode) -> anyhow::Result<()> {
    match &args.command {
        ItemCommand::List { workspace } => {
            let ws = resolve_workspace(cmdb, *workspace)?;
            let items = cmdb.list_items(ws)?;
            render(output, &items, |items, w| write_list(w, items))
        }
        ItemCommand::Show { id } => {
            let item = cmdb.get_item(ItemId(*id))?;
            render(output, &item, |item, w| write_item(w, item))
        }
        ItemCommand::Create(create) => {
            let item = create_item(create, cmdb)?;
            render(output, &item, |item, w| write_item(w, item))
        }
        ItemCommand::Move {
            id,
            group,
            ungroup: _,
            order,
        } => {
            let item = cmdb.update_item_group(ItemId(*id), group.map(GroupId), *order)?;
            render(output, &item, |item, w| write_row(w, item))
        }
        ItemCommand::Reorder { id, order } => {
            let item = cmdb.reorder_item(ItemId(*id), *order)?;
            render(output, &item, |item, w| write_row(w, item))
        }
        ItemCommand::Delete { id } => {
            cmdb.delete_item(ItemId(*id))?;
            let result = serde_json::json!({ "deleted": id });
            render(output, &result, |_, w| writeln!(w, "deleted item {id}"))
        }
        ItemCommand::Affected { id } => {
            let affected = cmdb.affected_items(ItemId(*id))?;
            render(output, &affected, |affected, w| write_affected(w, affected))
        }
        ItemCommand::Dependents { id } => {
            let items = cmdb.dependents(ItemId(*id))?;
            render(output, &items, |items, w| write_list(w, items))
        }
        ItemCommand::Dependencies { id } => {
            let items = cmdb.dependencies(ItemId(*id))?;
            render(output, &items, |items, w| write_list(w, items))
        }
    }
}
