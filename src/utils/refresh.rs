//! Keeps a [`ClientFactory`] in step with a watched property file.
use std::{sync::Arc, time::Duration};

use tokio::{sync::mpsc, task::JoinHandle};

use crate::{adapters::config_providers::file::FileConfigSource, core::factory::ClientFactory};

/// Default quiet period after a change before the file is re-read.
pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(250);

/// Spawn the refresh loop for `source`.
///
/// Returns `None` if the source's change channel was already taken.
pub fn spawn_config_refresh(
    source: Arc<FileConfigSource>,
    factory: Arc<ClientFactory>,
    debounce: Duration,
) -> Option<JoinHandle<()>> {
    let notify_rx = source.watch()?;
    Some(tokio::spawn(run_refresh_loop(
        notify_rx, source, factory, debounce,
    )))
}

async fn run_refresh_loop(
    mut notify_rx: mpsc::Receiver<()>,
    source: Arc<FileConfigSource>,
    factory: Arc<ClientFactory>,
    debounce: Duration,
) {
    tracing::info!("Config refresh task started for {}", source.path().display());

    while notify_rx.recv().await.is_some() {
        // Editors often write a file in several steps
        tokio::time::sleep(debounce).await;
        while notify_rx.try_recv().is_ok() {}

        if let Err(e) = source.reload() {
            tracing::error!("Keeping previous configuration: {:?}", e);
            continue;
        }

        let changed = factory.refresh().await;
        if changed.is_empty() {
            tracing::debug!("Configuration reloaded, no cached client affected");
        } else {
            tracing::info!(clients = ?changed, "Configuration reloaded, clients invalidated");
        }
    }

    tracing::info!("Config refresh task stopped");
}
