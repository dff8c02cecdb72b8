//! newsdesk-hub: binary entrypoint.
//! Loads config, wires the services, starts the prune task and serves the API.

use newsdesk_hub::{build_services, config::AppConfig, metrics::Metrics, notify, router};
use shuttle_axum::ShuttleAxum;
use std::time::Duration;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Compact logs by default; `LOG_FORMAT=json` switches to one JSON object per line.
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("newsdesk_hub=info,warn"));

    let json = std::env::var("LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    let registry = tracing_subscriber::registry().with(filter);
    // Shuttle may already have installed a subscriber; keep theirs in that case.
    let _ = if json {
        registry.with(fmt::layer().json()).try_init()
    } else {
        registry.with(fmt::layer().compact()).try_init()
    };
}

#[shuttle_runtime::main]
async fn axum() -> ShuttleAxum {
    // Load .env in local/dev; no-op in prod environments.
    let _ = dotenvy::dotenv();
    init_tracing();

    let cfg = AppConfig::load_default()?;
    let metrics = Metrics::init()?;
    let services = build_services(&cfg)?;

    tracing::info!(
        external = %cfg.external.name,
        batch_limit = cfg.external.batch_limit,
        seeded = services.store.len(),
        "newsdesk-hub starting"
    );

    notify::spawn_prune_task(
        services.notifications.clone(),
        Duration::from_secs(cfg.registry.prune_interval_hours * 3600),
    );

    let app = router(services.app_state()).merge(metrics.router());
    Ok(app.into())
}
