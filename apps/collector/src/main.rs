mod collect;
mod config;
mod db;
mod errors;
mod github;
mod models;
mod store;
#[cfg(test)]
mod test_support;

use std::process::ExitCode;

use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::collect::orchestrator::{collect, discover_repositories, validate_token};
use crate::config::Config;
use crate::db::{create_pool, PgStore};
use crate::errors::CollectorError;
use crate::github::GitHubClient;

#[tokio::main]
async fn main() -> ExitCode {
    // Load configuration first; nothing touches the network or database before it passes
    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            let err = CollectorError::from(e);
            eprintln!("{err}");
            return err.exit_code();
        }
    };

    // Initialize structured logging
    let filter = if config.debug {
        EnvFilter::new(format!("{}=debug", env!("CARGO_CRATE_NAME")))
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(format!("{}={}", env!("CARGO_CRATE_NAME"), &config.rust_log))
        })
    };
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting traffic collector v{}", env!("CARGO_PKG_VERSION"));

    match run(&config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e}");
            e.exit_code()
        }
    }
}

async fn run(config: &Config) -> Result<(), CollectorError> {
    let client = GitHubClient::new(&config.github_token, &config.api_url)?;

    if config.validate_token {
        validate_token(&client).await?;
    }

    let repos = discover_repositories(&client, &config.org_name).await;
    if repos.is_empty() {
        warn!(
            "No repositories found for organization '{}'; nothing to do",
            config.org_name
        );
        return Ok(());
    }

    let pool = create_pool(&config.database)
        .await
        .map_err(CollectorError::Connection)?;
    let mut store = PgStore::new(pool);

    let summary = collect(&client, &mut store, &repos, &config.required_topic).await?;
    store.close().await?;

    summary.log(&config.required_topic);
    Ok(())
}
