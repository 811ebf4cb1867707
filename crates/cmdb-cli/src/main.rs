#![forbid(unsafe_code)]

mod cmd;
mod output;

use clap::{Parser, Subcommand};
use output::{CliError, OutputMode, render_error};
use std::env;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::info;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "cmdb: configuration items, ordered groups and their dependency graph",
    long_about = None
)]
struct Cli {
    /// Enable verbose logging.
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON output instead of human-readable text.
    #[arg(long, global = true)]
    json: bool,

    /// Store database to open (overrides CMDB_DB and cmdb.toml).
    #[arg(long, global = true, value_name = "PATH")]
    db: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

impl Cli {
    const fn output_mode(&self) -> OutputMode {
        if self.json {
            OutputMode::Json
        } else {
            OutputMode::Human
        }
    }
}

#[derive(Subcommand, Debug)]
enum Commands {
    #[command(
        next_help_heading = "Structure",
        about = "Manage workspaces",
        after_help = "EXAMPLES:\n    cmdb workspace list\n\n    cmdb workspace duplicate 1 --name staging --json"
    )]
    Workspace(cmd::workspace::WorkspaceArgs),

    #[command(
        next_help_heading = "Structure",
        about = "Manage groups",
        after_help = "EXAMPLES:\n    cmdb group create web\n\n    cmdb group link 1 2"
    )]
    Group(cmd::group::GroupArgs),

    #[command(
        next_help_heading = "Structure",
        about = "Manage items and their rank in groups",
        after_help = "EXAMPLES:\n    cmdb item create web-01 --group 1\n\n    cmdb item reorder 5 0\n\n    cmdb item affected 5 --json"
    )]
    Item(cmd::item::ItemArgs),

    #[command(
        next_help_heading = "Graph",
        about = "Manage connections",
        after_help = "EXAMPLES:\n    cmdb connection create 4 7\n\n    cmdb connection list --item 4"
    )]
    Connection(cmd::connection::ConnectionArgs),

    #[command(
        next_help_heading = "Graph",
        about = "Manage edge routing handles",
        after_help = "EXAMPLES:\n    cmdb routing upsert e4-7 right left\n\n    cmdb routing delete e4-7 group-e1-2"
    )]
    Routing(cmd::routing::RoutingArgs),

    #[command(
        next_help_heading = "Services",
        about = "Manage services and their canvas",
        after_help = "EXAMPLES:\n    cmdb service create 4 billing\n\n    cmdb service add-item 1 db --group 2\n\n    cmdb service show 1 --json"
    )]
    Service(cmd::service::ServiceArgs),

    #[command(
        next_help_heading = "Sharing",
        about = "Manage read-only share links",
        after_help = "EXAMPLES:\n    cmdb share create --expires 7d\n\n    cmdb share open K7QX2MNB --password hunter2"
    )]
    Share(cmd::share::ShareArgs),
}

fn init_tracing(verbose: bool) {
    let filter = EnvFilter::try_from_env("CMDB_LOG").unwrap_or_else(|_| {
        EnvFilter::new(if verbose || env::var("DEBUG").is_ok() {
            "cmdb=debug,info"
        } else {
            "cmdb=info,warn"
        })
    });

    let format = env::var("CMDB_LOG_FORMAT").unwrap_or_else(|_| "compact".to_string());

    let registry = tracing_subscriber::registry()
        .with(filter);

    match format.as_str() {
        "json" => {
            registry
                .with(fmt::layer().json().with_ansi(false).with_writer(std::io::stderr))
                .init();
        }
        _ => {
            registry
                .with(fmt::layer().compact().with_writer(std::io::stderr))
                .init();
        }
    }
}

fn run(cli: &Cli) -> anyhow::Result<()> {
    let root = env::current_dir()?;
    let mut cmdb = cmd::open_cmdb(&root, cli.db.as_deref())?;
    let output = cli.output_mode();

    match &cli.command {
        Commands::Workspace(args) => cmd::workspace::run_workspace(args, &mut cmdb, output),
        Commands::Group(args) => cmd::group::run_group(args, &mut cmdb, output),
        Commands::Item(args) => cmd::item::run_item(args, &mut cmdb, output),
        Commands::Connection(args) => cmd::connection::run_connection(args, &mut cmdb, output),
        Commands::Routing(args) => cmd::routing::run_routing(args, &mut cmdb, output),
        Commands::Service(args) => cmd::service::run_service(args, &mut cmdb, output),
        Commands::Share(args) => cmd::share::run_share(args, &mut cmdb, output),
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    if cli.verbose {
        info!("Verbose mode enabled");
    }

    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            if let Err(render_err) = render_error(cli.output_mode(), &CliError::from(&err)) {
                eprintln!("error: {err:#} (while rendering: {render_err})");
            }
            ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;
    use cmdb_core::model::EdgeShape;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn json_flag_sets_output_mode() {
        let cli = Cli::parse_from(["cmdb", "--json", "workspace", "list"]);
        assert!(cli.output_mode().is_json());
    }

    #[test]
    fn global_flags_after_subcommand() {
        let cli = Cli::parse_from(["cmdb", "item", "list", "--json", "--db", "/tmp/x.db"]);
        assert!(cli.json);
        assert_eq!(cli.db, Some(PathBuf::from("/tmp/x.db")));
    }

    #[test]
    fn default_output_is_human() {
        let cli = Cli::parse_from(["cmdb", "group", "list"]);
        assert!(!cli.output_mode().is_json());
    }

    #[test]
    fn connection_shape_parses() {
        let cli =
            Cli::parse_from(["cmdb", "connection", "create", "2", "9", "--shape", "group-item"]);
        let Commands::Connection(args) = cli.command else {
            panic!("expected connection command");
        };
        assert!(matches!(
            args.command,
            cmd::connection::ConnectionCommand::Create {
                shape: EdgeShape::GroupItem,
                ..
            }
        ));
    }

    #[test]
    fn unknown_shape_is_rejected() {
        let result =
            Cli::try_parse_from(["cmdb", "connection", "create", "1", "2", "--shape", "diagonal"]);
        assert!(result.is_err());
    }

    #[test]
    fn move_requires_group_or_ungroup() {
        assert!(Cli::try_parse_from(["cmdb", "item", "move", "3"]).is_err());
        assert!(Cli::try_parse_from(["cmdb", "item", "move", "3", "--ungroup"]).is_ok());
        let both = Cli::try_parse_from(["cmdb", "item", "move", "3", "--group", "1", "--ungroup"]);
        assert!(both.is_err());
    }

    #[test]
    fn reorder_accepts_negative_order() {
        let cli = Cli::parse_from(["cmdb", "item", "reorder", "3", "-1"]);
        let Commands::Item(args) = cli.command else {
            panic!("expected item command");
        };
        assert!(matches!(
            args.command,
            cmd::item::ItemCommand::Reorder { id: 3, order: -1 }
        ));
    }

    #[test]
    fn share_expiry_is_validated() {
        assert!(Cli::try_parse_from(["cmdb", "share", "create", "--expires", "2w"]).is_err());
        let cli = Cli::parse_from(["cmdb", "share", "create", "--expires", "24h"]);
        let Commands::Share(args) = cli.command else {
            panic!("expected share command");
        };
        assert!(matches!(
            args.command,
            cmd::share::ShareCommand::Create {
                expires: cmdb_core::model::Expiry::OneDay,
                ..
            }
        ));
    }

    #[test]
    fn service_link_needs_a_target() {
        assert!(Cli::try_parse_from(["cmdb", "service", "link", "1", "2"]).is_err());
        let both = ["cmdb", "service", "link", "1", "2", "--to-group", "3", "--to-item", "4"];
        assert!(Cli::try_parse_from(both).is_err());
    }

    #[test]
    fn all_subcommands_listed() {
        let subcommands = [
            vec!["cmdb", "workspace", "list"],
            vec!["cmdb", "workspace", "create", "ops"],
            vec!["cmdb", "workspace", "update", "1", "ops"],
            vec!["cmdb", "workspace", "delete", "2"],
            vec!["cmdb", "workspace", "set-default", "2"],
            vec!["cmdb", "workspace", "duplicate", "1", "--name", "copy"],
            vec!["cmdb", "group", "list"],
            vec!["cmdb", "group", "create", "web"],
            vec!["cmdb", "group", "delete", "1"],
            vec!["cmdb", "group", "link", "1", "2"],
            vec!["cmdb", "group", "unlink", "1", "2"],
            vec!["cmdb", "group", "links"],
            vec!["cmdb", "item", "list"],
            vec!["cmdb", "item", "show", "1"],
            vec!["cmdb", "item", "create", "web-01", "--type", "server"],
            vec!["cmdb", "item", "move", "1", "--group", "2", "--order", "0"],
            vec!["cmdb", "item", "reorder", "1", "2"],
            vec!["cmdb", "item", "delete", "1"],
            vec!["cmdb", "item", "affected", "1"],
            vec!["cmdb", "item", "dependents", "1"],
            vec!["cmdb", "item", "dependencies", "1"],
            vec!["cmdb", "connection", "list", "--item", "1"],
            vec!["cmdb", "connection", "create", "1", "2"],
            vec!["cmdb", "connection", "delete", "1", "2"],
            vec!["cmdb", "routing", "list"],
            vec!["cmdb", "routing", "upsert", "e1-2", "right", "left"],
            vec!["cmdb", "routing", "delete", "e1-2", "group-e3-4"],
            vec!["cmdb", "service", "list", "--item", "1"],
            vec!["cmdb", "service", "show", "1"],
            vec!["cmdb", "service", "create", "1", "billing"],
            vec!["cmdb", "service", "update", "1", "invoicing", "--status", "degraded"],
            vec!["cmdb", "service", "icon", "1", "upload", "--path", "/i/b.png"],
            vec!["cmdb", "service", "delete", "1"],
            vec!["cmdb", "service", "add-group", "1", "tier"],
            vec!["cmdb", "service", "add-item", "1", "db", "--group", "2"],
            vec!["cmdb", "service", "move-item", "3", "--ungroup"],
            vec!["cmdb", "service", "connect", "1", "3", "4"],
            vec!["cmdb", "service", "link", "1", "2", "--to-item", "3"],
            vec!["cmdb", "service", "route", "1", "e3-4", "right", "left"],
            vec!["cmdb", "share", "list"],
            vec!["cmdb", "share", "create", "--expires", "7d", "--password", "pw"],
            vec!["cmdb", "share", "update", "1", "--disable", "--clear-password"],
            vec!["cmdb", "share", "delete", "1"],
            vec!["cmdb", "share", "open", "ABCD2345"],
            vec!["cmdb", "share", "logs", "1", "--limit", "10"],
            vec!["cmdb", "share", "stats", "1"],
        ];
        for args in &subcommands {
            let result = Cli::try_parse_from(args.iter());
            assert!(result.is_ok(), "failed to parse {args:?}: {:?}", result.err());
        }
    }
}
