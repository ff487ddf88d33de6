//! menu-check: diagnostic CLI for the admin navigation menu.
//!
//! Runs the same engine the host UI embeds against a recorded session, either
//! with a recorded menu response or against a live endpoint.
//!
//! ## Subcommands
//!
//! - `resolve`: Print the context a session resolves to
//! - `render`: Replay a recorded response and draw the sidebar
//! - `fetch`: Query the live endpoint and print the observables

mod commands;
mod logging;

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "menu-check")]
#[command(about = "Admin menu diagnostics")]
#[command(version)]
struct Cli {
    /// Also write logs to a daily-rotated file in this directory
    #[arg(long, global = true, value_name = "DIR")]
    log_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Resolve the operating context for a session
    Resolve {
        /// Session JSON (auth snapshot or bare user object)
        #[arg(long)]
        session: PathBuf,
    },

    /// Render the sidebar from a recorded menu response
    Render {
        #[arg(long)]
        session: PathBuf,

        /// Recorded menu-query response JSON
        #[arg(long)]
        response: PathBuf,

        /// Current location, used for active-row highlighting
        #[arg(long)]
        location: Option<String>,

        /// Menu config file (defaults to ~/.config/admin-menu/menu.toml)
        #[arg(long)]
        config: Option<PathBuf>,

        /// Classify the device as touch-capable
        #[arg(long)]
        touch: bool,

        /// Render with the sidebar collapsed
        #[arg(long)]
        collapsed: bool,

        /// Print the full report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Fetch the menu from a live endpoint
    Fetch {
        #[arg(long)]
        session: PathBuf,

        /// Overrides `endpoint.base_url` from the config file
        #[arg(long)]
        base_url: Option<String>,

        /// Bearer token for the menu endpoint
        #[arg(long, env = "MENU_API_TOKEN", hide_env_values = true)]
        token: Option<String>,

        #[arg(long)]
        config: Option<PathBuf>,
    },
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    let cli = Cli::parse();
    let _logging_guard = logging::init(cli.log_dir.as_deref());

    let result = match cli.command {
        Commands::Resolve { session } => commands::resolve(&session),
        Commands::Render {
            session,
            response,
            location,
            config,
            touch,
            collapsed,
            json,
        } => {
            let options = commands::RenderOptions {
                location,
                config,
                touch,
                collapsed,
                json,
            };
            commands::render(&session, &response, options).await
        }
        Commands::Fetch {
            session,
            base_url,
            token,
            config,
        } => commands::fetch(&session, base_url, token, config).await,
    };

    match result {
        Ok(output) => print!("{}", ensure_newline(output)),
        Err(e) => {
            tracing::error!(error = %e, "menu-check failed");
            eprintln!("menu-check: {}", e);
            std::process::exit(1);
        }
    }
}

fn ensure_newline(mut output: String) -> String {
    if !output.ends_with('\n') {
        output.push('\n');
    }
    output
}
