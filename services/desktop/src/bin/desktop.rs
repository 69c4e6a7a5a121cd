//! services/desktop/src/bin/desktop.rs

use desktop_lib::{
    adapters::{JsonSettingsStore, SupabaseAuthAdapter, WindowRegistry},
    auth::{channel, ingress::find_scheme_url, worker::open_in_browser, AuthWorker, Reconciler, SessionExchanger},
    config::Config,
    error::DesktopError,
    instance::{self, InstanceRole},
    web::{self, LoopbackState},
};
use memowave_core::ports::{IdentityBackend, SessionStore, WindowManager};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn, Level};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use url::Url;

#[tokio::main]
async fn main() -> Result<(), DesktopError> {
    // --- 1. Load Configuration & Set Up Logging ---
    let args: Vec<String> = std::env::args().collect();
    let config = Arc::new(Config::from_env()?);
    let dev_mode = config.dev_mode || args.iter().any(|a| a == "--dev");
    let log_level = if dev_mode { Level::DEBUG } else { config.log_level };
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(log_level.to_string()))
        .with(tracing_subscriber::fmt::layer())
        .init();
    info!("Configuration loaded. Starting MemoWave...");

    // --- 2. Single-Instance Lock ---
    let instance_listener = match instance::acquire(config.instance_port, &args).await? {
        InstanceRole::Primary(listener) => listener,
        InstanceRole::Secondary => return Ok(()),
    };

    // --- 3. Initialize Service Adapters ---
    let store: Arc<dyn SessionStore> = Arc::new(JsonSettingsStore::new(config.settings_path.clone()));
    let windows = Arc::new(WindowRegistry::new());
    let backend = build_backend(&config)?;
    if backend.is_none() {
        warn!("SUPABASE_URL is not set; login is unavailable and offline mode still works");
    }
    let exchanger = Arc::new(SessionExchanger::new(
        backend,
        store.clone(),
        config.exchange_timeout,
    ));
    let reconciler = Reconciler::new(windows.clone(), store.clone(), exchanger.clone());

    // --- 4. Start the Ingress Paths ---
    let shutdown = CancellationToken::new();
    let (sender, rx) = channel(&config.url_scheme);
    let relay = instance::spawn_relay(instance_listener, sender.clone(), shutdown.clone());

    let server = match web::bind(config.callback_port).await {
        Ok(listeners) => {
            let state = Arc::new(LoopbackState::new(sender.clone(), config.callback_port));
            let app = web::router(state);
            Some(tokio::spawn(web::serve(listeners, app, shutdown.clone())))
        }
        Err(e) => {
            windows.show_error_dialog(
                "Login unavailable",
                &format!(
                    "{}. Close any other MemoWave instance and restart to sign in. Offline mode is still available.",
                    e
                ),
            );
            None
        }
    };

    // --- 5. Reconcile and Run the Worker ---
    let mut worker = AuthWorker::new(
        reconciler,
        exchanger,
        store,
        config.url_scheme.clone(),
        config.redirect_uri(),
        Arc::new(open_in_browser),
    );
    // Without the loopback server no login can complete this run.
    if server.is_some() {
        worker.startup().await;
    } else {
        worker.startup_offline();
    }
    let worker = tokio::spawn(worker.run(rx, shutdown.clone()));

    if let Some(url) = find_scheme_url(&args, &config.url_scheme) {
        info!("Processing launch URL");
        sender.open_url(url).await;
    }

    // --- 6. Wait for Shutdown ---
    tokio::signal::ctrl_c().await?;
    info!("Shutdown requested.");
    shutdown.cancel();

    if let Some(server) = server {
        match server.await {
            Ok(Err(e)) => warn!("Login callback server ended with an error: {}", e),
            Err(e) => warn!("Login callback server task failed: {}", e),
            Ok(Ok(())) => {}
        }
    }
    let _ = relay.await;
    let _ = worker.await;
    Ok(())
}

fn build_backend(config: &Config) -> Result<Option<Arc<dyn IdentityBackend>>, DesktopError> {
    let (Some(url), Some(key)) = (&config.supabase_url, &config.supabase_anon_key) else {
        return Ok(None);
    };
    let base_url = Url::parse(url).map_err(|e| {
        DesktopError::Internal(format!("SUPABASE_URL '{}' is not a valid URL: {}", url, e))
    })?;
    let http = reqwest::Client::builder()
        .timeout(config.exchange_timeout)
        .build()?;
    Ok(Some(Arc::new(SupabaseAuthAdapter::new(
        http,
        base_url,
        key.clone(),
        config.oauth_flow,
    ))))
}
