//! Rendermode CLI: validate projects, assess this machine, and render.
//!
//! Usage:
//!   rendermode validate <PATH>   Validate a project document
//!   rendermode assess            Measure client capability and server load
//!   rendermode decide <PATH>     Show which venue a render would use
//!   rendermode render <PATH>     Render a project end to end
//!   rendermode config            Show the effective configuration

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use rendermode_common::config::AppConfig;
use rendermode_render_engine::VenueOverride;

mod commands;

#[derive(Parser)]
#[command(
    name = "rendermode",
    about = "Adaptive local/remote video rendering",
    version,
    author
)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Render server status URL (overrides the config file)
    #[arg(long, global = true)]
    server_url: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

/// Where the simulated render server's load comes from.
#[derive(clap::Args, Clone, Debug)]
pub struct ServerArgs {
    /// Pretend the render server reports this load in [0, 1] instead of
    /// probing it
    #[arg(long)]
    server_load: Option<f64>,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate a project document
    Validate {
        /// Path to the project JSON file
        path: PathBuf,
    },

    /// Measure client capability and server load
    Assess {
        #[command(flatten)]
        server: ServerArgs,

        /// Print the assessment as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show which venue a render would use, without rendering
    Decide {
        /// Path to the project JSON file
        path: PathBuf,

        /// Venue override: auto, local, remote
        #[arg(long, default_value = "auto")]
        venue: VenueOverride,

        #[command(flatten)]
        server: ServerArgs,
    },

    /// Render a project
    Render {
        /// Path to the project JSON file
        path: PathBuf,

        /// Venue override: auto, local, remote
        #[arg(long, default_value = "auto")]
        venue: VenueOverride,

        /// Where to write a locally rendered result
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Make the local encoder run out of memory halfway through
        #[arg(long)]
        fail_local: bool,

        /// Status polls the simulated render farm needs per job
        #[arg(long, default_value = "10")]
        farm_steps: u64,

        #[command(flatten)]
        server: ServerArgs,
    },

    /// Show the effective configuration
    Config {
        /// Write the effective configuration to the config file
        #[arg(long)]
        init: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = AppConfig::load();
    if cli.verbose {
        config.logging.level = "debug".to_string();
    }
    if let Some(url) = cli.server_url {
        config.assessor.server_status_url = Some(url);
    }
    rendermode_common::logging::init_logging(&config.logging);

    match cli.command {
        Commands::Validate { path } => commands::validate::run(path),
        Commands::Assess { server, json } => commands::assess::run(&config, server, json).await,
        Commands::Decide {
            path,
            venue,
            server,
        } => commands::decide::run(&config, path, venue, server).await,
        Commands::Render {
            path,
            venue,
            output,
            fail_local,
            farm_steps,
            server,
        } => {
            commands::render::run(
                &config,
                commands::render::RenderArgs {
                    path,
                    venue,
                    output,
                    fail_local,
                    farm_steps,
                },
                server,
            )
            .await
        }
        Commands::Config { init } => commands::config::run(&config, init),
    }
}
