//! Crypto dashboard data service: binary entrypoint.
//! Loads configuration, builds the client and serves the HTTP API.

use anyhow::Context;
use shuttle_axum::ShuttleAxum;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use cryptoverse_client::api::{self, AppState};
use cryptoverse_client::config::{ClientConfig, ProviderKind};
use cryptoverse_client::metrics::Metrics;
use cryptoverse_client::CryptoClient;

/// `RUST_LOG` filter, compact output; `LOG_FORMAT=json` for structured lines.
/// Tolerates a subscriber installed by the runtime.
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("cryptoverse_client=info,warn"));

    let json = std::env::var("LOG_FORMAT")
        .ok()
        .is_some_and(|v| v.eq_ignore_ascii_case("json"));

    let res = if json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json())
            .try_init()
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().compact())
            .try_init()
    };
    if res.is_err() {
        tracing::debug!("tracing subscriber already installed");
    }
}

#[shuttle_runtime::main]
async fn axum() -> ShuttleAxum {
    // Load .env in local/dev; no-op in prod environments.
    let _ = dotenvy::dotenv();

    init_tracing();

    let cfg = ClientConfig::load().context("loading client config")?;
    for kind in ProviderKind::ALL {
        let p = cfg.provider(kind);
        info!(
            provider = kind.name(),
            host = p.host().as_deref().unwrap_or("?"),
            key_len = p.api_key.as_deref().map(str::len).unwrap_or(0),
            "provider configured"
        );
    }

    // Recorder first, so metric descriptions land in it.
    let metrics = Metrics::init(cfg.default_ttl_ms).context("installing metrics recorder")?;

    let client = CryptoClient::from_config(&cfg).context("building crypto client")?;
    info!(
        endpoints = client.registry().len(),
        timeout_ms = cfg.timeout_ms,
        default_ttl_ms = cfg.default_ttl_ms,
        max_entries = ?cfg.max_entries,
        "client ready"
    );

    let router = api::create_router(AppState::new(client)).merge(metrics.router());
    Ok(router.into())
}
