//! nas-space - search-space inspection entry point

use clap::Parser;
use nas_searchspace::cli::{cmd_decode, cmd_ranges, cmd_tokens, Cli, Commands};
use nas_searchspace::nas::SearchSpaceRegistry;

fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "nas_searchspace=info".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = cli.search_config()?;
    let space = SearchSpaceRegistry::new().build(&cli.space, config)?;

    match &cli.command {
        Commands::Tokens => cmd_tokens(space.as_ref())?,
        Commands::Ranges => cmd_ranges(space.as_ref())?,
        Commands::Decode { tokens, batch, json } => {
            cmd_decode(space.as_ref(), tokens.as_deref(), *batch, *json)?;
        }
    }

    Ok(())
}
