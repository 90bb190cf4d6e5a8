//! Atelier - storefront API client CLI
//!
//! Main entry point for the `atelier` command.

use anyhow::Result;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use atelier::api::ApiClient;
use atelier::cli::{Cli, Commands};
use atelier::commands;
use atelier::commands::request::RequestArgs;
use atelier::config::Config;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse_args();

    init_tracing(cli.verbose, cli.json_logs);

    if let Some(warning) = cli.ephemeral_warning() {
        tracing::warn!("{}", warning);
    }

    let config_path = cli.config.as_deref().unwrap_or("config/config.yaml");
    let config = Config::load(config_path, &cli)?;
    config.validate()?;

    let client = ApiClient::from_config(&config)?;

    match cli.command {
        Commands::Login { email, password } => {
            tracing::info!("Signing in");
            commands::session::login(&client, &email, &password).await?;
        }
        Commands::Logout => commands::session::logout(&client),
        Commands::Status => commands::session::status(&client),
        Commands::Request {
            method,
            path,
            data,
            headers,
        } => {
            tracing::debug!("Sending {} {}", method, path);
            let args = RequestArgs {
                method,
                path,
                data,
                headers,
            };
            commands::request::run_request(&client, args).await?;
        }
    }

    Ok(())
}

/// Initialize tracing subscriber with environment filter
fn init_tracing(verbose: bool, json: bool) {
    let default_level = if verbose { "atelier=debug" } else { "atelier=info" };
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let registry = tracing_subscriber::registry().with(env_filter);
    if json {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}
