//! Composition root: wires every `helix-*` crate into one process and
//! serves the OpenAI-compatible HTTP surface (§6).

mod providers;

use clap::Parser;
use helix_auth::CredentialStore;
use helix_cache::{Cache, CacheConfig, InMemoryL2, InvalidationBus, InvalidationRule};
use helix_core::RefreshHistory;
use helix_ensemble::EnsembleEngine;
use helix_limiter::LimiterRegistry;
use helix_registry::{ProviderFacts, Registry, Verifier};
use helix_server::{AppState, ServerConfig};
use helix_telemetry::{MetricsRegistry, TelemetryConfig};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Mutex};

const VERIFIER_SWEEP_INTERVAL: Duration = Duration::from_secs(60 * 60);

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Overrides the `PORT` environment variable.
    #[arg(long, env = "PORT")]
    port: Option<u16>,
}

#[tokio::main]
async fn main() {
    let args = Args::parse();
    match run(args).await {
        // The only graceful-completion path is `shutdown_signal` below, so a
        // clean `Ok` here is always signal-initiated per §6's exit-code table.
        Ok(()) => std::process::exit(2),
        Err(e) => {
            eprintln!("helixagent: fatal startup error: {e:#}");
            std::process::exit(1);
        }
    }
}

async fn run(args: Args) -> anyhow::Result<()> {
    helix_telemetry::init_telemetry(TelemetryConfig::from_env())
        .map_err(|e| anyhow::anyhow!("telemetry init failed: {e}"))?;

    let mut server_config = ServerConfig::from_env()?;
    if let Some(port) = args.port {
        server_config.port = port;
    }

    let metrics = MetricsRegistry::new();
    let credentials = Arc::new(CredentialStore::with_default_sources(metrics.clone()));
    let registry = Registry::new();
    let limiter = LimiterRegistry::new();

    let registered = providers::register_all(&registry, &limiter, &credentials, &metrics).await;
    tracing::info!(registered, "providers registered");

    let l2 = build_l2().await?;
    let cache = Cache::new(CacheConfig::default(), l2, metrics.clone());
    let (invalidation_bus, dispatcher) = InvalidationBus::new(cache.clone());
    invalidation_bus
        .subscribe(InvalidationRule {
            event_type: "provider.health.changed".to_string(),
            key_pattern: None,
            tags: Vec::new(),
            handler: Arc::new(|event| {
                let provider_id = event.payload.get("provider_id").and_then(|v| v.as_str()).unwrap_or_default();
                vec![format!("prov:{provider_id}")]
            }),
        })
        .await;
    registry.set_invalidation_bus(invalidation_bus);

    let ensemble = EnsembleEngine::new(registry.clone()).with_cache(cache.clone());

    let history = Arc::new(Mutex::new(RefreshHistory::new(200)));
    let verifier = Arc::new(Verifier::new(registry.clone(), history));

    let state = AppState {
        registry: registry.clone(),
        cache: cache.clone(),
        ensemble,
        verifier: verifier.clone(),
        credentials: credentials.clone(),
        started_at: chrono::Utc::now(),
    };

    let (stop_tx, stop_rx) = watch::channel(false);

    tokio::spawn(dispatcher);
    tokio::spawn(credentials.clone().start_background_refresh(stop_rx.clone()));
    tokio::spawn(Arc::new(cache.clone()).start_cleanup_loop(stop_rx.clone()));
    tokio::spawn(verifier_sweep_loop(verifier, stop_rx.clone()));

    let router = helix_server::build_router(state, server_config.request_timeout, server_config.cors_allow_any_origin);

    let addr = format!("0.0.0.0:{}", server_config.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| anyhow::anyhow!("binding {addr}: {e}"))?;
    tracing::info!(%addr, "helixagent listening");

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| anyhow::anyhow!("server error: {e}"))?;

    let _ = stop_tx.send(true);
    helix_telemetry::shutdown_telemetry();
    Ok(())
}

#[cfg(feature = "redis-l2")]
async fn build_l2() -> anyhow::Result<Option<Arc<dyn helix_cache::L2Store>>> {
    let Ok(host) = std::env::var("REDIS_HOST") else { return Ok(Some(Arc::new(InMemoryL2::new()))) };
    let port: u16 = std::env::var("REDIS_PORT").ok().and_then(|p| p.parse().ok()).unwrap_or(6379);
    let password = std::env::var("REDIS_PASSWORD").ok();
    let db = std::env::var("REDIS_DB").ok().and_then(|d| d.parse().ok());

    let mut builder = fred::types::config::Config::from_url(&format!("redis://{host}:{port}"))
        .map_err(|e| anyhow::anyhow!("parsing Redis config: {e}"))?;
    builder.password = password;
    if let Some(db) = db {
        builder.database = Some(db);
    }

    let store = helix_cache::RedisL2::connect(builder)
        .await
        .map_err(|e| anyhow::anyhow!("connecting to Redis L2 at {host}:{port}: {e}"))?;
    Ok(Some(Arc::new(store)))
}

#[cfg(not(feature = "redis-l2"))]
async fn build_l2() -> anyhow::Result<Option<Arc<dyn helix_cache::L2Store>>> {
    Ok(Some(Arc::new(InMemoryL2::new())))
}

async fn verifier_sweep_loop(verifier: Arc<Verifier>, mut stop: watch::Receiver<bool>) {
    let mut interval = tokio::time::interval(VERIFIER_SWEEP_INTERVAL);
    loop {
        tokio::select! {
            _ = interval.tick() => {
                verifier.run_once(|_provider_id| ProviderFacts::default()).await;
            }
            _ = stop.changed() => {
                if *stop.borrow() {
                    tracing::info!("verifier sweep loop stopping");
                    return;
                }
            }
        }
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c().await.expect("installing Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("installing SIGTERM handler")
            .recv()
            .await;
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
    tracing::info!("shutdown signal received");
}
