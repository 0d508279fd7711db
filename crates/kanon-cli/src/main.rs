//! Kanon CLI - Gatekeeper manifests and documentation from Rego policies.

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

mod commands;

use commands::{Cli, Commands};

fn main() -> Result<()> {
    let cli = Cli::parse();

    // An explicit --log-level wins over RUST_LOG
    let filter = match cli.log_level {
        Some(level) => EnvFilter::new(format!("kanon={level}")),
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| "kanon=info".into()),
    };
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    match cli.command {
        Commands::Create(args) => commands::create::run(&args, &cli.ignore),
        Commands::Doc(args) => commands::doc::run(&args, &cli.ignore),
        Commands::Convert(args) => commands::convert::run(&args, &cli.ignore),
        Commands::Inspect(args) => commands::inspect::run(&args, &cli.ignore),
        Commands::Version => {
            println!("kanon {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}
