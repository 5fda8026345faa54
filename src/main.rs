use anyhow::Context;
use tracing_subscriber::EnvFilter;

use rego_exchange::{api, config::AppConfig, service::RegoService};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = AppConfig::from_env().context("reading configuration")?;

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("rego_exchange=info,tower_http=info")),
        )
        .init();

    let service = RegoService::open(&config.db_path)
        .with_context(|| format!("opening store at {}", config.db_path.display()))?
        .with_max_issuance_units(config.max_issuance_units);
    let state = api::AppState::new(service.clone(), &config);
    let app = api::create_router(state);

    let listener = tokio::net::TcpListener::bind(config.bind_addr)
        .await
        .with_context(|| format!("binding {}", config.bind_addr))?;
    tracing::info!(
        addr = %config.bind_addr,
        db = %config.db_path.display(),
        max_sessions = config.max_sessions,
        "rego server listening"
    );
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            tokio::signal::ctrl_c().await.ok();
        })
        .await?;

    service.store().flush()?;
    tracing::info!("store flushed, bye");
    Ok(())
}
