//! ddp-sync - command-line client for DDP servers.

mod app;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use ddp_config_and_utils::{init_logging, Config, Paths};

/// ddp-sync command-line interface.
#[derive(Parser)]
#[command(name = "ddp-sync")]
#[command(about = "Call methods and mirror publications from a DDP server")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Log level (trace, debug, info, warn, error). Overrides config.json
    #[arg(short, long, global = true)]
    log_level: Option<String>,

    /// Server WebSocket endpoint. Overrides config.json
    #[arg(short, long, global = true)]
    endpoint: Option<String>,

    /// Base directory for runtime files (config, tokens, logs). Defaults to ~/.ddp-sync
    #[arg(long, global = true)]
    base_dir: Option<PathBuf>,
}

#[derive(Subcommand)]
pub(crate) enum Commands {
    /// Call a server method and print its result
    Call {
        method: String,
        /// Arguments as JSON; anything that does not parse is sent as a string
        args: Vec<String>,
    },
    /// Subscribe to a publication and print a collection whenever it changes
    Watch {
        publication: String,
        /// Publication parameters as JSON
        params: Vec<String>,
        /// Collection to print
        #[arg(short, long)]
        collection: String,
    },
    /// Log in with a password and persist the resume token
    Login {
        /// Username, or an email address when it contains '@'
        user: String,
        #[arg(short, long, env = "DDP_SYNC_PASSWORD")]
        password: String,
    },
    /// Log out and forget the stored token
    Logout,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let paths = match cli.base_dir {
        Some(base) => Paths::with_base_dir(base),
        None => Paths::new()?,
    };
    let mut config = Config::load(&paths)?;
    if let Some(level) = cli.log_level {
        config.log_level = level;
    }
    if let Some(endpoint) = cli.endpoint {
        config.endpoint = endpoint;
    }

    init_logging(&config.log_level);

    // The client is single-threaded; everything runs on one LocalSet.
    let local = tokio::task::LocalSet::new();
    local.run_until(app::run(cli.command, config, paths)).await
}
