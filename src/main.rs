mod cli;
mod session;

use clap::Parser;
use cli::{Cli, Commands};
use jobwatch::config::Config;
use jobwatch::observability;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let cli = Cli::parse();

    let config = Config::load_with_override(cli.config)?;
    observability::init_tracing(&config.telemetry.log_filter);

    match cli.command {
        Commands::Run(args) => session::run_job(&config, args).await?,
        Commands::Status(args) => session::show_status(&config, args).await?,
        Commands::Cancel(args) => session::cancel_job(&config, args).await?,
        Commands::Config => print!("{}", config.to_toml()?),
    }

    Ok(())
}
