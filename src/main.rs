//! Skrift CLI entry point.

use anyhow::Result;
use clap::Parser;
use skrift::cli::{commands, Cli, Commands};
use skrift::config::Settings;
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config_path = match &cli.config {
        Some(path) => Settings::expand_path(path),
        None => Settings::default_config_path(),
    };
    let settings = Settings::load_from(Some(&config_path))?;

    // -v flags win over the configured level
    let log_level = match cli.verbose {
        0 => settings.general.log_level.as_str(),
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::registry()
        .with(EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| format!("skrift={}", log_level)),
        ))
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .init();

    std::fs::create_dir_all(settings.temp_dir())?;

    match &cli.command {
        Commands::Doctor => {
            commands::run_doctor(&settings, &config_path)?;
        }

        Commands::Transcribe {
            url,
            languages,
            no_refine,
            output,
            format,
        } => {
            commands::run_transcribe(url, languages, *no_refine, output.clone(), format, settings)
                .await?;
        }

        Commands::Serve { host, port } => {
            commands::run_serve(host, *port, settings).await?;
        }

        Commands::Config { action } => {
            commands::run_config(action, settings, &config_path)?;
        }
    }

    Ok(())
}
