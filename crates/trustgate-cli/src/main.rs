mod cli;
mod commands;
mod observability;
mod output;

use anyhow::{Context, Result};
use clap::Parser;
use trustgate_sts::SecurityTokenService;

use cli::{Cli, Commands};
use output::print_error;

#[tokio::main]
async fn main() {
    // A missing .env is fine; anything else is worth a warning.
    if let Err(e) = dotenvy::dotenv() {
        if !matches!(e, dotenvy::Error::Io(ref io_err) if io_err.kind() == std::io::ErrorKind::NotFound) {
            eprintln!("Warning: Failed to load .env file: {e}");
        }
    }

    if let Err(e) = run().await {
        print_error(&format!("{e:#}"));
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    let cli = Cli::parse();

    let config = trustgate_config::load_config(cli.config.as_deref())
        .context("cannot load configuration")?;
    observability::init_tracing(&config.logging, cli.log_level.as_deref());
    tracing::debug!(
        path = ?cli.config,
        issuer = %config.sts.issuer,
        "Configuration loaded"
    );

    match &cli.command {
        Commands::Check => {
            commands::check::check(&config)?;
        }
        Commands::Issue(args) => {
            let sts = engine(&config)?;
            commands::exchange::issue(&sts, args)?;
        }
        Commands::Handle(args) => {
            let sts = engine(&config)?;
            commands::exchange::handle(&sts, args)?;
        }
        Commands::Pipe(args) => {
            let sts = engine(&config)?;
            commands::exchange::pipe(&sts, args).await?;
        }
    }

    Ok(())
}

fn engine(config: &trustgate_config::StsConfig) -> Result<SecurityTokenService> {
    SecurityTokenService::from_config(config).context("cannot build engine")
}
