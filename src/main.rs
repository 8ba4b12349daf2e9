use anyhow::Result;
use clap::Parser;
use iperf_watcher::cli::{Cli, CommandHandler, Commands};
use iperf_watcher::collectors::create_platform_query;

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    let handler = CommandHandler::new(create_platform_query());

    match cli.command {
        Commands::Serve { settings, host, port } => handler.serve(settings, host, port).await?,
        Commands::Interfaces => handler.interfaces().await?,
        Commands::Stats { iface } => handler.stats(&iface).await?,
    }

    Ok(())
}
