mod config;
mod messages;
mod metrics;
mod network;
mod proxy;

use config::Config;
use crate::metrics::{admin_router, AdminState};
use network::UpstreamNetwork;
use notify::{Event, EventKind, RecursiveMode, Watcher};
use offline_cache::{CacheStorage, Network, Registration};
use parking_lot::Mutex;
use proxy::{router, AppState};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .json()
        .init();

    // Load config
    let config = if Path::new("config.toml").exists() {
        match Config::load(Path::new("config.toml")) {
            Ok(c) => {
                tracing::info!("loaded config from config.toml");
                c
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to load config.toml, using defaults");
                Config::default_config()
            }
        }
    } else {
        tracing::info!("no config.toml found, using defaults");
        Config::default_config()
    };

    // Install Prometheus metrics recorder
    let prometheus = match metrics_exporter_prometheus::PrometheusBuilder::new().install_recorder() {
        Ok(handle) => Some(handle),
        Err(e) => {
            tracing::error!(error = %e, "failed to install prometheus recorder, /metrics disabled");
            None
        }
    };

    // Config::load already validated this; only defaults reach here unchecked.
    let coordinator_config = config
        .coordinator_config()
        .unwrap_or_else(|e| panic!("invalid site config: {e}"));
    let origin = coordinator_config.origin.clone();

    // Storage lives for the process; coordinators come and go on reload.
    let network: Arc<dyn Network> = Arc::new(UpstreamNetwork::new(config.upstream.url.clone()));
    let registration = Arc::new(Registration::new(Arc::new(CacheStorage::new(origin.origin()))));

    // A failed install leaves nothing active: every fetch then bypasses
    // straight to the upstream until a reload succeeds.
    if let Err(e) = registration
        .register(coordinator_config, Arc::clone(&network))
        .await
    {
        tracing::error!(error = %e, "initial install failed, serving pass-through");
    }

    let state = Arc::new(AppState {
        registration: Arc::clone(&registration),
        network: Arc::clone(&network),
        origin: origin.clone(),
    });

    // Shutdown token for graceful shutdown
    let shutdown = CancellationToken::new();

    let proxy_router = router(Arc::clone(&state));
    let admin = admin_router(AdminState {
        app: Arc::clone(&state),
        prometheus,
    });

    let proxy_addr = config.server.listen_addr.clone();
    let admin_addr = config.server.admin_addr.clone();

    tracing::info!(
        proxy = %proxy_addr,
        admin = %admin_addr,
        upstream = %config.upstream.url,
        origin = %origin,
        store = ?registration.active().map(|c| c.store_name().to_string()),
        "offline proxy starting"
    );

    let proxy_listener = tokio::net::TcpListener::bind(&proxy_addr)
        .await
        .unwrap_or_else(|e| panic!("failed to bind proxy to {proxy_addr}: {e}"));

    let admin_listener = tokio::net::TcpListener::bind(&admin_addr)
        .await
        .unwrap_or_else(|e| panic!("failed to bind admin to {admin_addr}: {e}"));

    // Spawn config file watcher
    spawn_config_watcher(
        PathBuf::from("config.toml"),
        config,
        Arc::clone(&registration),
        network,
    );

    // Spawn shutdown signal handler
    let shutdown_clone = shutdown.clone();
    tokio::spawn(async move {
        shutdown_signal(shutdown_clone).await;
    });

    // Run both servers with graceful shutdown
    let proxy_future = axum::serve(proxy_listener, proxy_router)
        .with_graceful_shutdown(shutdown.clone().cancelled_owned());

    let admin_future = axum::serve(admin_listener, admin)
        .with_graceful_shutdown(shutdown.clone().cancelled_owned());

    tokio::select! {
        result = proxy_future => {
            if let Err(e) = result {
                tracing::error!(error = %e, "proxy server error");
            }
        }
        result = admin_future => {
            if let Err(e) = result {
                tracing::error!(error = %e, "admin server error");
            }
        }
    }

    tracing::info!("offline proxy shut down");
}

/// Listen for SIGINT (Ctrl+C) or SIGTERM and cancel the shutdown token.
async fn shutdown_signal(token: CancellationToken) {
    let ctrl_c = tokio::signal::ctrl_c();

    #[cfg(unix)]
    {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = ctrl_c => {},
                    _ = sigterm.recv() => {},
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "no SIGTERM handler, waiting for Ctrl+C only");
                ctrl_c.await.ok();
            }
        }
    }

    #[cfg(not(unix))]
    {
        ctrl_c.await.ok();
    }

    tracing::info!("shutdown signal received, draining connections...");
    token.cancel();
}

/// Watch config.toml and register a fresh coordinator when the site, cache
/// or strategy sections change.
fn spawn_config_watcher(
    config_path: PathBuf,
    initial_config: Config,
    registration: Arc<Registration>,
    network: Arc<dyn Network>,
) {
    let current_config = Arc::new(Mutex::new(initial_config));
    let runtime = tokio::runtime::Handle::current();

    let config_path_clone = config_path.clone();
    let mut watcher = match notify::recommended_watcher(move |res: Result<Event, notify::Error>| {
        let Ok(event) = res else { return };
        if !matches!(event.kind, EventKind::Modify(_) | EventKind::Create(_)) {
            return;
        }

        let new_config = match Config::load(&config_path_clone) {
            Ok(c) => c,
            Err(e) => {
                tracing::error!(error = %e, "failed to reload config.toml");
                return;
            }
        };

        let applied = {
            let mut old = current_config.lock();
            let applied = config::diff_and_apply(&old, &new_config);
            if let Some(applied) = &applied {
                *old = applied.clone();
            }
            applied
        };
        let Some(applied) = applied else { return };

        let coordinator_config = match applied.coordinator_config() {
            Ok(c) => c,
            Err(e) => {
                tracing::error!(error = %e, "reloaded config is invalid");
                return;
            }
        };

        let registration = Arc::clone(&registration);
        let network = Arc::clone(&network);
        runtime.spawn(async move {
            match registration.register(coordinator_config, network).await {
                Ok(c) => tracing::info!(store = c.store_name(), state = %c.state(), "coordinator registered"),
                Err(e) => tracing::error!(error = %e, "install of reloaded config failed, keeping current version"),
            }
        });
    }) {
        Ok(w) => w,
        Err(e) => {
            tracing::warn!(error = %e, "failed to start config watcher");
            return;
        }
    };

    if let Err(e) = watcher.watch(&config_path, RecursiveMode::NonRecursive) {
        tracing::warn!(error = %e, "failed to watch config.toml");
        return;
    }

    // Leak the watcher so it lives for the process lifetime
    std::mem::forget(watcher);
    tracing::info!("config file watcher started");
}
