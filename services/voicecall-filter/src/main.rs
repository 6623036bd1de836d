use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::{signal, task::JoinHandle};
use tracing::{info, warn};
use tracing_subscriber::{fmt, EnvFilter};
use voicecall_filter::{
    config::FilterConfig, CallFilter, FileListSource, ListKind, NumberFilter, PolicyStore,
};

#[tokio::main]
async fn main() -> Result<()> {
    let config = FilterConfig::from_env().context("failed to load configuration")?;
    init_tracing(&config);

    info!("voicecall-filter starting");

    let source = Arc::new(FileListSource::from_config(&config));
    let store = Arc::new(PolicyStore::new(source));
    let filter = NumberFilter::new(Arc::clone(&store));

    let state = store.ready().await;
    info!(
        filter = filter.name(),
        priority = filter.priority(),
        state = %state,
        ignored = store.ignored_numbers().map_or(0, |list| list.len()),
        blocked = store.blocked_numbers().map_or(0, |list| list.len()),
        "call filter registered"
    );

    let observers: Vec<JoinHandle<()>> = ListKind::ALL
        .into_iter()
        .map(|kind| spawn_list_observer(Arc::clone(&store), kind))
        .collect();

    shutdown_signal().await;
    info!("shutdown requested");

    let stopping = Arc::clone(&store);
    tokio::task::spawn_blocking(move || stopping.shutdown())
        .await
        .context("failed to stop list synchronizer")?;

    for observer in observers {
        if let Err(err) = observer.await {
            warn!(error = %err, "list observer task failed");
        }
    }

    info!(
        states = ?store.state_history(),
        "voicecall-filter shutdown complete"
    );
    Ok(())
}

fn init_tracing(config: &FilterConfig) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| std::env::var("LOG_LEVEL").map(EnvFilter::new))
        .unwrap_or_else(|_| EnvFilter::new(config.log_level.clone()));

    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .init();
}

fn spawn_list_observer(store: Arc<PolicyStore>, kind: ListKind) -> JoinHandle<()> {
    let mut changes = store.subscribe(kind);
    tokio::spawn(async move {
        while changes.changed().await.is_ok() {
            match store.numbers(kind) {
                Some(list) => info!(list = %kind, entries = list.len(), "number list updated"),
                None => info!(list = %kind, "number list cleared"),
            }
        }
    })
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install CTRL+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        let mut sigterm =
            signal(SignalKind::terminate()).expect("failed to install SIGTERM handler");
        sigterm.recv().await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
