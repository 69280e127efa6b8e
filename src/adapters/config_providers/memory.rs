use std::sync::Arc;

use arc_swap::ArcSwap;

use crate::{config::group::ConfigurationGroup, ports::config_source::ConfigurationSource};

/// In-memory property source, mostly for embedding and tests.
pub struct StaticConfigSource {
    root: ArcSwap<ConfigurationGroup>,
}

impl StaticConfigSource {
    pub fn new<K, V>(entries: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        Self::from_group(ConfigurationGroup::root(entries))
    }

    pub fn from_group(root: ConfigurationGroup) -> Self {
        Self {
            root: ArcSwap::from_pointee(root),
        }
    }

    pub fn empty() -> Self {
        Self::new(std::iter::empty::<(String, String)>())
    }

    /// Swap the whole property set.
    pub fn replace<K, V>(&self, entries: impl IntoIterator<Item = (K, V)>)
    where
        K: Into<String>,
        V: Into<String>,
    {
        self.root.store(Arc::new(ConfigurationGroup::root(entries)));
    }
}

impl ConfigurationSource for StaticConfigSource {
    fn group(&self, key: &str) -> Option<ConfigurationGroup> {
        self.root.load().break_out(key)
    }
}
