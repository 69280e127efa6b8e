use crate::config::group::ConfigurationGroup;

/// Read access to the external property source.
///
/// Implementations must be safe for concurrent readers; a reload swaps the
/// whole snapshot rather than mutating it in place.
pub trait ConfigurationSource: Send + Sync + 'static {
    /// The sub-group under `key` (e.g. `soapclient.def.billing`), or `None`
    /// when no property shares that prefix.
    fn group(&self, key: &str) -> Option<ConfigurationGroup>;
}
