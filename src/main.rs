use std::sync::Arc;

use anyhow::Context;
use secrecy::ExposeSecret;
use tracing::info;

use prowl::config::{Config, valid_github_username};
use prowl::github::{GithubClient, PrSource};
use prowl::poll::{PollScheduler, RefreshOrchestrator};
use prowl::server::api_routes;
use prowl::store::{LibSqlStore, MemoryStore, Store};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let config = Config::from_env()?;

    let source: Arc<dyn PrSource> = Arc::new(GithubClient::new());

    let (store, username): (Arc<dyn Store>, String) = if config.demo {
        let username = config.username.clone().unwrap_or_else(|| "demo".to_string());
        info!(%username, "demo mode: in-memory fixtures, no github polling");
        (Arc::new(MemoryStore::with_demo_fixtures(&username)), username)
    } else {
        let store = LibSqlStore::open(&config.db_path)
            .await
            .with_context(|| format!("could not open database at {}", config.db_path.display()))?;

        let Some(token) = config.token.clone() else {
            anyhow::bail!(
                "GITHUB_PAT is not set; export a GitHub personal access token, or run with PROWL_DEMO=1"
            );
        };
        store.set_credential(token.expose_secret()).await?;

        let username = match config.username.clone() {
            Some(name) => name,
            None => source
                .viewer_login(&token)
                .await
                .context("could not resolve the acting username from the token")?,
        };
        if !valid_github_username(&username) {
            anyhow::bail!("{username:?} is not a valid github username");
        }

        (Arc::new(store), username)
    };

    info!(
        version = env!("CARGO_PKG_VERSION"),
        %username,
        poll_minutes = config.poll_interval.as_secs() / 60,
        "starting prowl"
    );

    let scheduler = PollScheduler::new(config.poll_interval);

    let orchestrator = RefreshOrchestrator::new(
        Arc::clone(&scheduler),
        Arc::clone(&store),
        Arc::clone(&source),
        username.as_str(),
    );
    tokio::spawn(orchestrator.run());

    let app = api_routes(store, Arc::clone(&scheduler), username.as_str());
    let listener = tokio::net::TcpListener::bind(&config.bind)
        .await
        .with_context(|| format!("could not bind {}", config.bind))?;
    info!(addr = %config.bind, "dashboard api listening");
    axum::serve(listener, app).await?;

    Ok(())
}
