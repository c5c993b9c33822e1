mod catalog;
mod cli;
mod config;
mod errors;
mod jobs;
mod server;
mod settings;
mod utils;

use clap::Parser;
use cli::Cli;
use settings::Settings;
use utils::logger::Logger;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Parse command line arguments
    let cli = Cli::parse();

    let (settings, load_error) = Settings::load_or_default(cli.config.clone());
    Logger::init_with_filter(&settings.config().log_filter)?;
    if let Some(e) = load_error {
        tracing::warn!("Could not load settings, using defaults: {}", e);
    }

    // Execute the command
    cli.execute(settings).await
}
