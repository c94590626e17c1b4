//! CLI entry point - the composition root.

use clap::Parser;
use tracing_subscriber::EnvFilter;

use medassist_cli::{Cli, Commands, bootstrap, handlers};

fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "warn" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables before clap reads its env fallbacks
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let ctx = bootstrap(&cli)?;

    match cli.command {
        Commands::Status => handlers::status(&ctx).await,
        Commands::Ask { ref question, json } => {
            handlers::ask(&ctx, &question.join(" "), json).await
        }
        Commands::Watch => handlers::watch(&ctx).await,
        Commands::Profile => handlers::profile(&ctx),
    }
}
