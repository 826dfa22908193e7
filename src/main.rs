mod cli;
mod commands;
mod config;
mod error;
mod extraction;
mod importer;
mod model;
mod ocr;
mod pipeline;
mod session;
mod templates;
mod util;
mod worker;

use anyhow::Result;
use clap::Parser;
use tracing::error;
use tracing_subscriber::EnvFilter;

use crate::cli::{Cli, Commands};
use crate::commands::AppContext;

fn main() {
    init_tracing();

    if let Err(err) = run() {
        error!(error = %err, "command failed");
        for cause in err.chain().skip(1) {
            error!(cause = %cause, "caused by");
        }
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let cli = Cli::parse();
    let app = AppContext::prepare(&cli.config, cli.workspace_dir.as_deref())?;

    match cli.command {
        Commands::Template(command) => commands::template::run(&app, command),
        Commands::Import(args) => commands::import::run(&app, args),
        Commands::Process(args) => commands::process::run(&app, args),
        Commands::Session(command) => commands::session::run(&app, command),
        Commands::Export(args) => commands::export::run(&app, args),
        Commands::Status(args) => commands::status::run(&app, args),
    }
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}
