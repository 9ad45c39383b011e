use anyhow::Result;
use clap::Parser;

mod app;
mod cli;
mod commands;
mod config;

use app::App;
use cli::Cli;
use config::AppConfig;

fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    let json_logging = std::env::var("RUST_LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    // Logs go to stderr so command output stays pipeable
    if json_logging {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();

    let cli = Cli::parse();
    let config = AppConfig::from_env()?;
    tracing::debug!(
        cloud_sync = config.cloud_sync_enabled(),
        data_dir = %config.data_dir.display(),
        "Configuration loaded"
    );

    let app = App::build(&config).await?;
    let result = commands::run(&app, cli.command, cli.json).await;
    app.shutdown().await;
    result
}
