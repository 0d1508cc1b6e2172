//! remolacha CLI entry point.

use std::process::ExitCode;

use clap::Parser;
use tracing::Level;

use remolacha_client::cli::{Cli, Command, ConfigAction};
use remolacha_client::commands;
use remolacha_client::config::ClientConfig;
use remolacha_client::error::ClientResult;
use remolacha_core::{TracingConfig, init_tracing};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let tracing_config = match cli.command {
        Command::Serve { .. } if !cli.debug => TracingConfig::cli(false).with_level(Level::INFO),
        _ => TracingConfig::cli(cli.debug),
    };
    if let Err(e) = init_tracing(tracing_config) {
        eprintln!("warning: {}", e);
    }

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> ClientResult<()> {
    let mut config = match cli.config {
        Some(ref path) => ClientConfig::load_from(path)?,
        None => ClientConfig::load()?,
    };
    if let Some(url) = cli.url {
        config.client.url = url;
    }
    if let Some(timeout) = cli.timeout {
        config.client.timeout = timeout;
    }

    match cli.command {
        Command::Serve { listen } => commands::serve::run(listen, &config).await,
        Command::Call {
            app_id,
            service,
            params,
        } => {
            config.validate()?;
            commands::call::call(
                config.transport_config(),
                config.timeout(),
                &app_id,
                &service,
                params.as_deref(),
            )
            .await
        }
        Command::Stream {
            app_id,
            service,
            params,
            count,
        } => {
            config.validate()?;
            commands::call::stream(
                config.transport_config(),
                &app_id,
                &service,
                params.as_deref(),
                count,
            )
            .await
        }
        Command::Config { action } => match action {
            ConfigAction::Dump => commands::config::dump(&config),
            ConfigAction::Validate => commands::config::validate(&config),
            ConfigAction::Path => commands::config::path(),
        },
    }
}
