use std::{
    path::{Path, PathBuf},
    sync::{Arc, Mutex},
};

use arc_swap::ArcSwap;
use eyre::{Context, Result};
use notify::{RecursiveMode, Watcher};
use tokio::sync::mpsc;

use crate::{
    config::{group::ConfigurationGroup, loader::load_properties_sync},
    ports::config_source::ConfigurationSource,
};

/// Configuration source backed by a local property file.
///
/// The flattened file contents are held as an immutable snapshot; `reload`
/// swaps in a new one so readers never observe a partial update.
pub struct FileConfigSource {
    path: PathBuf,
    root: ArcSwap<ConfigurationGroup>,
    // Kept alive for as long as the source exists
    _watcher: Option<notify::RecommendedWatcher>,
    update_tx: mpsc::Sender<()>,
    // Taken once by `watch()`
    update_rx: Mutex<Option<mpsc::Receiver<()>>>,
}

impl FileConfigSource {
    /// Load `path` and start watching it for changes.
    pub fn new(path: impl Into<PathBuf>) -> Result<Self> {
        let mut source = Self::without_watch(path)?;
        source.init_watcher()?;
        Ok(source)
    }

    /// Load `path` once; `watch()` will never fire.
    pub fn without_watch(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let root = Self::read(&path)?;
        let (tx, rx) = mpsc::channel(1);

        Ok(Self {
            path,
            root: ArcSwap::from_pointee(root),
            _watcher: None,
            update_tx: tx,
            update_rx: Mutex::new(Some(rx)),
        })
    }

    fn read(path: &Path) -> Result<ConfigurationGroup> {
        let path_str = path
            .to_str()
            .ok_or_else(|| eyre::eyre!("Invalid UTF-8 path: {}", path.display()))?;
        load_properties_sync(path_str)
    }

    fn init_watcher(&mut self) -> Result<()> {
        let tx = self.update_tx.clone();
        let config_filename = self
            .path
            .file_name()
            .ok_or_else(|| eyre::eyre!("Invalid config path"))?
            .to_owned();

        let mut watcher =
            notify::recommended_watcher(move |res: Result<notify::Event, notify::Error>| {
                match res {
                    Ok(event) => {
                        if (event.kind.is_modify()
                            || event.kind.is_create()
                            || event.kind.is_remove())
                            && event
                                .paths
                                .iter()
                                .any(|p| p.file_name() == Some(&config_filename))
                        {
                            tracing::debug!("Property file changed: {:?}", event.kind);
                            // A pending signal already covers this change
                            let _ = tx.try_send(());
                        }
                    }
                    Err(e) => tracing::error!("File watch error: {:?}", e),
                }
            })?;

        let watch_dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        watcher
            .watch(watch_dir, RecursiveMode::NonRecursive)
            .wrap_err("Failed to watch property file directory")?;

        self._watcher = Some(watcher);
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Current root snapshot.
    pub fn snapshot(&self) -> Arc<ConfigurationGroup> {
        self.root.load_full()
    }

    /// Re-read the file and swap the snapshot. On error the previous snapshot stays.
    pub fn reload(&self) -> Result<()> {
        let root = Self::read(&self.path)
            .wrap_err_with(|| format!("Failed to reload {}", self.path.display()))?;
        tracing::info!(
            "Reloaded {} properties from {}",
            root.len(),
            self.path.display()
        );
        self.root.store(Arc::new(root));
        Ok(())
    }

    /// Change notifications; `None` after the first call.
    pub fn watch(&self) -> Option<mpsc::Receiver<()>> {
        self.update_rx.lock().ok()?.take()
    }
}

impl ConfigurationSource for FileConfigSource {
    fn group(&self, key: &str) -> Option<ConfigurationGroup> {
        self.root.load().break_out(key)
    }
}
