//! `cmdb service`: services attached to items and their canvas.

use clap::{Args, Subcommand};
use cmdb_core::Cmdb;
use cmdb_core::model::{
    GroupFields, Handles, IconType, ItemId, Service, ServiceFields, ServiceGroupId, ServiceId,
    ServiceItem, ServiceItemFields, ServiceItemId, ServiceLinkTarget,
};
use std::io::Write;

use super::resolve_workspace;
use crate::output::{OutputMode, local_time, pretty_kv, pretty_section, render};

#[derive(Args, Debug)]
pub struct ServiceArgs {
    #[command(subcommand)]
    pub command: ServiceCommand,
}

#[derive(Subcommand, Debug)]
pub enum ServiceCommand {
    /// List the services of an item, or of every item in a workspace.
    List {
        #[arg(long, conflicts_with = "workspace")]
        item: Option<i64>,
        #[arg(long, short)]
        workspace: Option<i64>,
    },

    /// Show a service with its canvas.
    Show { id: i64 },

    #[command(
        about = "Attach a service to an item",
        after_help = "EXAMPLES:\n    cmdb service create 4 billing\n\n    cmdb service create 4 search --status degraded"
    )]
    Create {
        item: i64,
        name: String,
        #[arg(long)]
        status: Option<String>,
        #[arg(long)]
        description: Option<String>,
    },

    /// Rename a service or change its status and description.
    Update {
        id: i64,
        name: String,
        #[arg(long)]
        status: Option<String>,
        #[arg(long)]
        description: Option<String>,
    },

    /// Set the icon of a service.
    Icon {
        id: i64,
        /// preset or upload.
        icon_type: IconType,
        #[arg(long)]
        path: Option<String>,
        #[arg(long)]
        name: Option<String>,
    },

    /// Delete a service and its canvas.
    Delete { id: i64 },

    /// Add a group to a service canvas.
    AddGroup {
        service: i64,
        name: String,
        #[arg(long)]
        color: Option<String>,
    },

    /// Add an item to a service canvas, appended to `--group` when given.
    AddItem {
        service: i64,
        name: String,
        #[arg(long, short)]
        group: Option<i64>,
        #[arg(long = "type")]
        item_type: Option<String>,
    },

    /// Move a canvas item into a group, or out of any group.
    MoveItem {
        id: i64,
        #[arg(long, conflicts_with = "ungroup", required_unless_present = "ungroup")]
        group: Option<i64>,
        #[arg(long)]
        ungroup: bool,
        #[arg(long, allow_negative_numbers = true)]
        order: Option<i64>,
    },

    /// Connect two canvas items.
    Connect {
        service: i64,
        source: i64,
        target: i64,
    },

    /// Link a canvas group to another group (`--to-group`) or item (`--to-item`).
    Link {
        service: i64,
        source_group: i64,
        #[arg(long, conflicts_with = "to_item", required_unless_present = "to_item")]
        to_group: Option<i64>,
        #[arg(long)]
        to_item: Option<i64>,
    },

    /// Set the handles of an edge on a service canvas.
    Route {
        service: i64,
        edge_id: String,
        source_handle: String,
        target_handle: String,
    },
}

fn write_service(w: &mut dyn Write, service: &Service) -> std::io::Result<()> {
    pretty_section(w, &format!("service {}", service.id))?;
    pretty_kv(w, "name", &service.name)?;
    pretty_kv(w, "item", service.item_id.to_string())?;
    pretty_kv(w, "status", &service.status)?;
    pretty_kv(w, "icon", service.icon_type.as_str())?;
    if let Some(description) = &service.description {
        pretty_kv(w, "description", description)?;
    }
    pretty_kv(w, "updated", local_time(service.updated_at_us))
}

fn write_canvas_item(w: &mut dyn Write, item: &ServiceItem) -> std::io::Result<()> {
    let placement = match (item.group_id, item.order_in_group) {
        (Some(group), Some(order)) => format!("group {group} #{order}"),
        _ => "ungrouped".to_owned(),
    };
    writeln!(w, "{:>4}  {:<24} {}", item.id, item.name, placement)
}

pub fn run_service(args: &ServiceArgs, cmdb: &mut Cmdb, output: OutputMode) -> anyhow::Result<()> {
    match &args.command {
        ServiceCommand::List { item, workspace } => {
            let services = match item {
                Some(item) => cmdb.list_services(ItemId(*item))?,
                None => {
                    let ws = resolve_workspace(cmdb, *workspace)?;
                    cmdb.list_workspace_services(ws)?
                }
            };
            render(output, &services, |services, w| {
                for service in services {
                    writeln!(
                        w,
                        "{:>4}  {:<24} item {:<6} {}",
                        service.id, service.name, service.item_id, service.status
                    )?;
                }
                Ok(())
            })
        }
        ServiceCommand::Show { id } => {
            let id = ServiceId(*id);
            let service = cmdb.get_service(id)?;
            let items = cmdb.list_service_items(id)?;
            let canvas = serde_json::json!({
                "service": &service,
                "groups": cmdb.list_service_groups(id)?,
                "items": &items,
                "connections": cmdb.list_service_connections(id)?,
                "group_links": cmdb.list_service_group_links(id)?,
                "handles": cmdb.service_edge_handles(id)?,
            });
            render(output, &canvas, |_, w| {
                write_service(w, &service)?;
                items.iter().try_for_each(|item| write_canvas_item(w, item))
            })
        }
        ServiceCommand::Create {
            item,
            name,
            status,
            description,
        } => {
            let fields = ServiceFields {
                status: status.clone(),
                description: description.clone(),
                ..ServiceFields::named(name.clone())
            };
            let service = cmdb.create_service(ItemId(*item), &fields)?;
            render(output, &service, |service, w| write_service(w, service))
        }
        ServiceCommand::Update {
            id,
            name,
            status,
            description,
        } => {
            let fields = ServiceFields {
                status: status.clone(),
                description: description.clone(),
                ..ServiceFields::named(name.clone())
            };
            let service = cmdb.update_service(ServiceId(*id), &fields)?;
            render(output, &service, |service, w| write_service(w, service))
        }
        ServiceCommand::Icon {
            id,
            icon_type,
            path,
            name,
        } => {
            let service = cmdb.update_service_icon(
                ServiceId(*id),
                *icon_type,
                path.as_deref(),
                name.as_deref(),
            )?;
            render(output, &service, |service, w| write_service(w, service))
        }
        ServiceCommand::Delete { id } => {
            let service = cmdb.delete_service(ServiceId(*id))?;
            render(output, &service, |service, w| {
                writeln!(w, "deleted service {} ({})", service.id, service.name)
            })
        }
        canvas => run_canvas(canvas, cmdb, output),
    }
}

fn run_canvas(command: &ServiceCommand, cmdb: &mut Cmdb, output: OutputMode) -> anyhow::Result<()> {
    match command {
        ServiceCommand::AddGroup {
            service,
            name,
            color,
        } => {
            let fields = GroupFields {
                color: color.clone(),
                ..GroupFields::named(name.clone())
            };
            let group = cmdb.create_service_group(ServiceId(*service), &fields)?;
            render(output, &group, |group, w| {
                writeln!(w, "{:>4}  {:<24} {}", group.id, group.name, group.color)
            })
        }
        ServiceCommand::AddItem {
            service,
            name,
            group,
            item_type,
        } => {
            let fields = ServiceItemFields {
                item_type: item_type.clone(),
                ..ServiceItemFields::named(name.clone())
            };
            let group = group.map(ServiceGroupId);
            let item = cmdb.create_service_item(ServiceId(*service), group, &fields)?;
            render(output, &item, |item, w| write_canvas_item(w, item))
        }
        ServiceCommand::MoveItem {
            id,
            group,
            order,
            ..
        } => {
            let group = group.map(ServiceGroupId);
            let item = cmdb.update_service_item_group(ServiceItemId(*id), group, *order)?;
            render(output, &item, |item, w| write_canvas_item(w, item))
        }
        ServiceCommand::Connect {
            service,
            source,
            target,
        } => {
            let edge = cmdb.connect_service_items(
                ServiceId(*service),
                ServiceItemId(*source),
                ServiceItemId(*target),
            )?;
            render(output, &edge, |edge, w| {
                writeln!(w, "{:>4}  {}", edge.id, edge.edge())
            })
        }
        ServiceCommand::Link {
            service,
            source_group,
            to_group,
            to_item,
        } => {
            let target = match (to_group, to_item) {
                (Some(group), _) => ServiceLinkTarget::Group(ServiceGroupId(*group)),
                (None, Some(item)) => ServiceLinkTarget::Item(ServiceItemId(*item)),
                (None, None) => anyhow::bail!("pass --to-group or --to-item"),
            };
            let source = ServiceGroupId(*source_group);
            let link = cmdb.link_service_group(ServiceId(*service), source, target)?;
            render(output, &link, |link, w| {
                writeln!(w, "{:>4}  {}", link.id, link.edge())
            })
        }
        ServiceCommand::Route {
            service,
            edge_id,
            source_handle,
            target_handle,
        } => {
            let handles = Handles {
                source_handle: source_handle.clone(),
                target_handle: target_handle.clone(),
            };
            let record = cmdb.upsert_service_edge_routing(ServiceId(*service), edge_id, &handles)?;
            render(output, &record, |record, w| {
                writeln!(
                    w,
                    "{:<18} {} -> {}",
                    record.edge_id.to_string(),
                    record.source_handle,
                    record.target_handle
                )
            })
        }
        _ => unreachable!("service commands are handled by run_service"),
    }
}
