//! `cmdb share`: read-only share links to a workspace.

use clap::{Args, Subcommand};
use cmdb_core::Cmdb;
use cmdb_core::model::{
    Expiry, NewShareLink, PasswordChange, ShareLink, ShareLinkId, ShareLinkUpdate, Visitor,
};
use std::io::Write;

use super::resolve_workspace;
use crate::output::{OutputMode, local_time, pretty_kv, pretty_section, render};

#[derive(Args, Debug)]
pub struct ShareArgs {
    #[command(subcommand)]
    pub command: ShareCommand,
}

#[derive(Subcommand, Debug)]
pub enum ShareCommand {
    /// List the share links of a workspace, newest first.
    List {
        #[arg(long, short)]
        workspace: Option<i64>,
    },

    #[command(
        about = "Create a share link",
        after_help = "EXAMPLES:\n    cmdb share create --expires 7d\n\n    cmdb share create --workspace 2 --password hunter2"
    )]
    Create {
        #[arg(long, short)]
        workspace: Option<i64>,
        /// 1h, 1d, 7d, 30d or never.
        #[arg(long, default_value = "never")]
        expires: Expiry,
        #[arg(long)]
        password: Option<String>,
        #[arg(long)]
        created_by: Option<String>,
    },

    /// Renew, revoke or re-protect a link.
    Update {
        id: i64,
        #[arg(long)]
        expires: Option<Expiry>,
        #[arg(long, conflicts_with = "enable")]
        disable: bool,
        #[arg(long)]
        enable: bool,
        #[arg(long, conflicts_with = "clear_password")]
        password: Option<String>,
        #[arg(long)]
        clear_password: bool,
    },

    /// Delete a link and its access log.
    Delete { id: i64 },

    /// Open a link as a visitor and record the visit.
    Open {
        token: String,
        #[arg(long)]
        password: Option<String>,
        #[arg(long)]
        ip: Option<String>,
    },

    /// Most recent visits of a link.
    Logs {
        id: i64,
        #[arg(long)]
        limit: Option<usize>,
    },

    /// Visit counts of a link.
    Stats { id: i64 },
}

fn write_link(w: &mut dyn Write, link: &ShareLink) -> std::io::Result<()> {
    pretty_section(w, &format!("share link {}", link.id))?;
    pretty_kv(w, "token", &link.token)?;
    pretty_kv(w, "workspace", link.workspace_id.to_string())?;
    pretty_kv(w, "active", link.is_active.to_string())?;
    pretty_kv(w, "password", if link.has_password { "yes" } else { "no" })?;
    pretty_kv(
        w,
        "expires",
        link.expires_at_us.map_or_else(|| "never".to_owned(), local_time),
    )?;
    pretty_kv(w, "visits", link.access_count.to_string())
}

fn password_change(password: Option<&str>, clear: bool) -> PasswordChange {
    match password {
        Some(password) => PasswordChange::from_input(Some(password)),
        None if clear => PasswordChange::Clear,
        None => PasswordChange::Keep,
    }
}

pub fn run_share(args: &ShareArgs, cmdb: &mut Cmdb, output: OutputMode) -> anyhow::Result<()> {
    match &args.command {
        ShareCommand::List { workspace } => {
            let ws = resolve_workspace(cmdb, *workspace)?;
            let links = cmdb.list_share_links(ws)?;
            render(output, &links, |links, w| {
                for link in links {
                    let state = if link.is_active { "active" } else { "revoked" };
                    writeln!(
                        w,
                        "{:>4}  {}  {:<8} {} visit(s)",
                        link.id, link.token, state, link.access_count
                    )?;
                }
                Ok(())
            })
        }
        ShareCommand::Create {
            workspace,
            expires,
            password,
            created_by,
        } => {
            let ws = resolve_workspace(cmdb, *workspace)?;
            let request = NewShareLink {
                created_by: created_by.clone(),
                expiration: *expires,
                password: password.clone(),
                ..NewShareLink::new(ws)
            };
            let link = cmdb.create_share_link(&request)?;
            render(output, &link, |link, w| write_link(w, link))
        }
        ShareCommand::Update {
            id,
            expires,
            disable,
            enable,
            password,
            clear_password,
        } => {
            let change = ShareLinkUpdate {
                expiration: *expires,
                is_active: (*disable || *enable).then_some(*enable),
                password: password_change(password.as_deref(), *clear_password),
            };
            let link = cmdb.update_share_link(ShareLinkId(*id), &change)?;
            render(output, &link, |link, w| write_link(w, link))
        }
        ShareCommand::Delete { id } => {
            let removed = cmdb.delete_share_link(ShareLinkId(*id))?;
            let result = serde_json::json!({ "removed": removed });
            render(output, &result, |_, w| {
                if removed {
                    writeln!(w, "deleted share link {id}")
                } else {
                    writeln!(w, "no share link {id}")
                }
            })
        }
        ShareCommand::Open {
            token,
            password,
            ip,
        } => {
            let visitor = Visitor {
                ip: ip.clone(),
                user_agent: Some(format!("cmdb/{}", env!("CARGO_PKG_VERSION"))),
            };
            let link = cmdb.open_share_link(token, password.as_deref(), &visitor)?;
            let workspace = cmdb.get_workspace(link.workspace_id)?;
            let items = cmdb.list_items(link.workspace_id)?;
            let view = serde_json::json!({ "workspace": &workspace, "items": &items });
            render(output, &view, |_, w| {
                pretty_section(w, &format!("workspace {} (shared)", workspace.name))?;
                for item in &items {
                    writeln!(w, "{:>4}  {:<24} {}", item.id, item.name, item.status)?;
                }
                Ok(())
            })
        }
        ShareCommand::Logs { id, limit } => {
            let logs = cmdb.share_access_logs(ShareLinkId(*id), *limit)?;
            render(output, &logs, |logs, w| {
                for log in logs {
                    writeln!(
                        w,
                        "{}  {:<15} {}",
                        local_time(log.accessed_at_us),
                        log.visitor_ip.as_deref().unwrap_or("-"),
                        log.visitor_user_agent.as_deref().unwrap_or("-")
                    )?;
                }
                Ok(())
            })
        }
        ShareCommand::Stats { id } => {
            let stats = cmdb.share_stats(ShareLinkId(*id))?;
            render(output, &stats, |stats, w| {
                pretty_section(w, &format!("share link {id}"))?;
                pretty_kv(w, "visits", stats.total_visits.to_string())?;
                pretty_kv(w, "visitors", stats.unique_visitors.to_string())?;
                pretty_kv(
                    w,
                    "last visit",
                    stats.last_accessed_at_us.map_or_else(|| "-".to_owned(), local_time),
                )
            })
        }
    }
}
