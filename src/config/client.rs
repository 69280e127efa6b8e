//! Per-client configuration resolution.
//!
//! A [`ClientConfiguration`] describes one logical outbound client. Every
//! setting resolves through three levels: the value found in the client's
//! [`ConfigurationGroup`], then the value already set on the configuration
//! (for example by a named template registered with the factory), then a
//! static default. Getters therefore always return a usable value, even for
//! a configuration that never saw a property group.
//!
//! Optional blocks (`security`, `proxy`) are only switched on when their
//! sub-group exists in the property source. The `pool` block only feeds the
//! fallback chain; its limits always have defaults.
use std::{any::TypeId, fmt, str::FromStr, sync::Arc, time::Duration};

use serde::Serialize;

use crate::{
    config::group::{ConfigurationError, ConfigurationGroup, ConfigurationResult},
    ports::interceptor::{Interceptor, same_interceptor},
};

pub const DEFAULT_PROPERTY_PREFIX: &str = "soapclient.def.";

pub const KEY_CONNECT_TIMEOUT: &str = "connect_timeout";
pub const KEY_CONNECT_REQUEST_TIMEOUT: &str = "connect_request_timeout";
pub const KEY_READ_TIMEOUT: &str = "read_timeout";
pub const KEY_ENDPOINT: &str = "endpoint";
pub const KEY_DISABLE_COOKIES: &str = "disable_cookies";
pub const KEY_MARSHALLER_BEAN_NAME: &str = "marshaller_bean_name";
pub const KEY_MARSHALLER_CLASS_NAME: &str = "marshaller_class_name";

pub const KEY_SECURITY: &str = "security";
pub const KEY_SECURITY_ACTIONS: &str = "actions";
pub const KEY_SECURITY_USERNAME: &str = "username";
pub const KEY_SECURITY_PASSWORD: &str = "password";
pub const KEY_SECURITY_PASSWORD_TYPE: &str = "password_type";
pub const KEY_SECURITY_MUST_UNDERSTAND: &str = "must_understand";
pub const KEY_SECURITY_TIME_TO_LIVE: &str = "time_to_live";

pub const KEY_PROXY: &str = "proxy";
pub const KEY_PROXY_HOST: &str = "host";
pub const KEY_PROXY_PORT: &str = "port";
pub const KEY_PROXY_USERNAME: &str = "username";
pub const KEY_PROXY_PASSWORD: &str = "password";

pub const KEY_POOL: &str = "pool";
pub const KEY_POOL_MAX_TOTAL_CONNECTIONS: &str = "max_total_connections";
pub const KEY_POOL_MAX_ROUTE_CONNECTIONS: &str = "max_route_connections";
pub const KEY_POOL_IDLE_TIMEOUT: &str = "idle_timeout";

pub const DEFAULT_CONNECT_TIMEOUT_MS: u64 = 1_000;
pub const DEFAULT_CONNECT_REQUEST_TIMEOUT_MS: u64 = 1_000;
pub const DEFAULT_READ_TIMEOUT_MS: u64 = 10_000;
pub const DEFAULT_DISABLE_COOKIES: bool = false;
pub const DEFAULT_POOL_MAX_TOTAL_CONNECTIONS: u32 = 80;
pub const DEFAULT_POOL_MAX_ROUTE_CONNECTIONS: u32 = 20;
pub const DEFAULT_POOL_IDLE_TIMEOUT_MS: u64 = 10_000;
pub const DEFAULT_SECURITY_ACTIONS: &[SecurityAction] =
    &[SecurityAction::UsernameToken, SecurityAction::Timestamp];
pub const DEFAULT_SECURITY_MUST_UNDERSTAND: bool = false;
pub const DEFAULT_SECURITY_TIME_TO_LIVE_SECS: u64 = 300;

/// A credential whose value never shows up in `Debug` output or logs.
#[derive(Clone, PartialEq, Eq)]
pub struct Secret(String);

impl Secret {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }

    pub fn is_blank(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Secret(***)")
    }
}

/// WS-Security password encoding for the UsernameToken.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum PasswordType {
    /// No password is sent
    #[serde(rename = "PasswordNone")]
    None,
    #[serde(rename = "PasswordText")]
    Text,
    #[serde(rename = "PasswordDigest")]
    Digest,
}

impl PasswordType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::None => "PasswordNone",
            Self::Text => "PasswordText",
            Self::Digest => "PasswordDigest",
        }
    }

    /// Token profile URI written on the `Password/@Type` attribute
    pub fn type_uri(&self) -> Option<&'static str> {
        match self {
            Self::None => None,
            Self::Text => Some(
                "http://docs.oasis-open.org/wss/2004/01/oasis-200401-wss-username-token-profile-1.0#PasswordText",
            ),
            Self::Digest => Some(
                "http://docs.oasis-open.org/wss/2004/01/oasis-200401-wss-username-token-profile-1.0#PasswordDigest",
            ),
        }
    }
}

impl FromStr for PasswordType {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "passwordnone" | "none" => Ok(Self::None),
            "passwordtext" | "text" => Ok(Self::Text),
            "passworddigest" | "digest" => Ok(Self::Digest),
            _ => Err(()),
        }
    }
}

/// Securement actions applied by the security interceptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SecurityAction {
    UsernameToken,
    Timestamp,
}

impl FromStr for SecurityAction {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "UsernameToken" => Ok(Self::UsernameToken),
            "Timestamp" => Ok(Self::Timestamp),
            _ => Err(()),
        }
    }
}

/// Parse a whitespace separated action list such as `"UsernameToken Timestamp"`.
pub fn parse_security_actions(raw: &str) -> Option<Vec<SecurityAction>> {
    raw.split_whitespace()
        .map(|action| action.parse().ok())
        .collect()
}

/// Message-level security block, present only when `security.*` keys exist.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SecuritySettings {
    pub actions: Option<Vec<SecurityAction>>,
    pub username: Option<String>,
    pub password: Option<Secret>,
    pub password_type: Option<PasswordType>,
    pub must_understand: Option<bool>,
    pub time_to_live_secs: Option<u64>,
}

/// Outbound proxy block, present only when `proxy.*` keys exist.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProxySettings {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub username: Option<String>,
    pub password: Option<Secret>,
}

/// Connection pool limits.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PoolSettings {
    pub max_total_connections: Option<u32>,
    pub max_route_connections: Option<u32>,
    pub idle_timeout_ms: Option<u64>,
}

/// Effective settings of one logical client.
#[derive(Clone, Debug)]
pub struct ClientConfiguration {
    property_prefix: String,
    connect_timeout_ms: Option<u64>,
    connect_request_timeout_ms: Option<u64>,
    read_timeout_ms: Option<u64>,
    endpoint: Option<String>,
    disable_cookies: Option<bool>,
    marshaller_bean_name: Option<String>,
    marshaller_class_name: Option<String>,
    security: Option<SecuritySettings>,
    proxy: Option<ProxySettings>,
    pool: PoolSettings,
    interceptor_overrides: Vec<Arc<dyn Interceptor>>,
    interceptor_substitutes: Vec<Arc<dyn Interceptor>>,
}

impl Default for ClientConfiguration {
    fn default() -> Self {
        Self::new()
    }
}

impl ClientConfiguration {
    /// An empty configuration: every getter reports its default.
    pub fn new() -> Self {
        Self {
            property_prefix: DEFAULT_PROPERTY_PREFIX.to_string(),
            connect_timeout_ms: None,
            connect_request_timeout_ms: None,
            read_timeout_ms: None,
            endpoint: None,
            disable_cookies: None,
            marshaller_bean_name: None,
            marshaller_class_name: None,
            security: None,
            proxy: None,
            pool: PoolSettings::default(),
            interceptor_overrides: Vec::new(),
            interceptor_substitutes: Vec::new(),
        }
    }

    /// Resolve a fresh configuration straight from a property group.
    pub fn from_group(group: Option<&ConfigurationGroup>) -> ConfigurationResult<Self> {
        Self::new().resolve(group)
    }

    /// Layer `group` over the values already held by `self`.
    ///
    /// `self` is left untouched; the merged result is returned. A missing
    /// group is valid and simply keeps the current values.
    pub fn resolve(&self, group: Option<&ConfigurationGroup>) -> ConfigurationResult<Self> {
        let mut resolved = self.clone();

        resolved.connect_timeout_ms =
            integer(group, KEY_CONNECT_TIMEOUT)?.or(self.connect_timeout_ms);
        resolved.connect_request_timeout_ms =
            integer(group, KEY_CONNECT_REQUEST_TIMEOUT)?.or(self.connect_request_timeout_ms);
        resolved.read_timeout_ms = integer(group, KEY_READ_TIMEOUT)?.or(self.read_timeout_ms);
        resolved.marshaller_bean_name =
            string(group, KEY_MARSHALLER_BEAN_NAME).or_else(|| self.marshaller_bean_name.clone());
        resolved.marshaller_class_name = string(group, KEY_MARSHALLER_CLASS_NAME)
            .or_else(|| self.marshaller_class_name.clone());
        resolved.endpoint = string(group, KEY_ENDPOINT).or_else(|| self.endpoint.clone());
        resolved.disable_cookies = boolean(group, KEY_DISABLE_COOKIES)?.or(self.disable_cookies);

        if let Some(group) = group {
            if let Some(security) = group.break_out(KEY_SECURITY) {
                resolved.security = Some(Self::resolve_security(
                    &security,
                    self.security.clone().unwrap_or_default(),
                )?);
            }
            if let Some(proxy) = group.break_out(KEY_PROXY) {
                resolved.proxy = Some(Self::resolve_proxy(
                    &proxy,
                    self.proxy.clone().unwrap_or_default(),
                )?);
            }
        }

        let pool = group.and_then(|g| g.break_out(KEY_POOL));
        let pool = pool.as_ref();
        resolved.pool = PoolSettings {
            max_total_connections: integer(pool, KEY_POOL_MAX_TOTAL_CONNECTIONS)?
                .or(self.pool.max_total_connections),
            max_route_connections: integer(pool, KEY_POOL_MAX_ROUTE_CONNECTIONS)?
                .or(self.pool.max_route_connections),
            idle_timeout_ms: integer(pool, KEY_POOL_IDLE_TIMEOUT)?.or(self.pool.idle_timeout_ms),
        };

        Ok(resolved)
    }

    fn resolve_security(
        group: &ConfigurationGroup,
        current: SecuritySettings,
    ) -> ConfigurationResult<SecuritySettings> {
        let actions = match group.get(KEY_SECURITY_ACTIONS) {
            Some(raw) => Some(parse_security_actions(raw).ok_or_else(|| {
                ConfigurationError::InvalidValue {
                    key: group.full_key(KEY_SECURITY_ACTIONS),
                    value: raw.to_string(),
                    expected: "a list of UsernameToken / Timestamp",
                }
            })?),
            None => current.actions,
        };

        let password_type = match group
            .get(KEY_SECURITY_PASSWORD_TYPE)
            .filter(|raw| !raw.trim().is_empty())
        {
            Some(raw) => Some(raw.parse::<PasswordType>().map_err(|_| {
                ConfigurationError::InvalidValue {
                    key: group.full_key(KEY_SECURITY_PASSWORD_TYPE),
                    value: raw.to_string(),
                    expected: "PasswordText, PasswordDigest or PasswordNone",
                }
            })?),
            None => current.password_type,
        };

        Ok(SecuritySettings {
            actions,
            username: string(Some(group), KEY_SECURITY_USERNAME).or(current.username),
            password: string(Some(group), KEY_SECURITY_PASSWORD)
                .map(Secret::new)
                .or(current.password),
            password_type,
            must_understand: boolean(Some(group), KEY_SECURITY_MUST_UNDERSTAND)?
                .or(current.must_understand),
            time_to_live_secs: integer(Some(group), KEY_SECURITY_TIME_TO_LIVE)?
                .or(current.time_to_live_secs),
        })
    }

    fn resolve_proxy(
        group: &ConfigurationGroup,
        current: ProxySettings,
    ) -> ConfigurationResult<ProxySettings> {
        Ok(ProxySettings {
            host: string(Some(group), KEY_PROXY_HOST).or(current.host),
            port: integer(Some(group), KEY_PROXY_PORT)?.or(current.port),
            username: string(Some(group), KEY_PROXY_USERNAME).or(current.username),
            password: string(Some(group), KEY_PROXY_PASSWORD)
                .map(Secret::new)
                .or(current.password),
        })
    }

    // ---- template builders ------------------------------------------------

    pub fn with_property_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.property_prefix = prefix.into();
        self
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout_ms = Some(duration_ms(timeout));
        self
    }

    pub fn with_connect_request_timeout(mut self, timeout: Duration) -> Self {
        self.connect_request_timeout_ms = Some(duration_ms(timeout));
        self
    }

    pub fn with_read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout_ms = Some(duration_ms(timeout));
        self
    }

    pub fn with_endpoint(mut self, uri: impl Into<String>) -> Self {
        self.endpoint = Some(uri.into());
        self
    }

    pub fn with_disable_cookies(mut self, disable: bool) -> Self {
        self.disable_cookies = Some(disable);
        self
    }

    pub fn with_marshaller_bean_name(mut self, name: impl Into<String>) -> Self {
        self.marshaller_bean_name = Some(name.into());
        self
    }

    pub fn with_marshaller_class_name(mut self, name: impl Into<String>) -> Self {
        self.marshaller_class_name = Some(name.into());
        self
    }

    pub fn with_security(mut self, security: SecuritySettings) -> Self {
        self.security = Some(security);
        self
    }

    pub fn with_proxy(mut self, proxy: ProxySettings) -> Self {
        self.proxy = Some(proxy);
        self
    }

    pub fn with_pool(mut self, pool: PoolSettings) -> Self {
        self.pool = pool;
        self
    }

    /// Replace the default interceptor chain entirely.
    pub fn with_interceptor_overrides(mut self, overrides: Vec<Arc<dyn Interceptor>>) -> Self {
        self.interceptor_overrides = overrides;
        self
    }

    /// Swap out the registry interceptor of the same concrete type.
    pub fn add_interceptor_substitute(mut self, substitute: Arc<dyn Interceptor>) -> Self {
        self.interceptor_substitutes.push(substitute);
        self
    }

    // ---- getters ------------------------------------------------------------

    pub fn property_prefix(&self) -> &str {
        &self.property_prefix
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(
            self.connect_timeout_ms
                .unwrap_or(DEFAULT_CONNECT_TIMEOUT_MS),
        )
    }

    pub fn connect_request_timeout(&self) -> Duration {
        Duration::from_millis(
            self.connect_request_timeout_ms
                .unwrap_or(DEFAULT_CONNECT_REQUEST_TIMEOUT_MS),
        )
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms.unwrap_or(DEFAULT_READ_TIMEOUT_MS))
    }

    pub fn endpoint(&self) -> Option<&str> {
        self.endpoint.as_deref()
    }

    pub fn cookies_disabled(&self) -> bool {
        self.disable_cookies.unwrap_or(DEFAULT_DISABLE_COOKIES)
    }

    pub fn marshaller_bean_name(&self) -> Option<&str> {
        self.marshaller_bean_name
            .as_deref()
            .filter(|name| !name.trim().is_empty())
    }

    pub fn marshaller_class_name(&self) -> Option<&str> {
        self.marshaller_class_name
            .as_deref()
            .filter(|name| !name.trim().is_empty())
    }

    pub fn is_security_enabled(&self) -> bool {
        self.security.is_some()
    }

    pub fn security_actions(&self) -> Option<&[SecurityAction]> {
        self.security
            .as_ref()
            .map(|s| s.actions.as_deref().unwrap_or(DEFAULT_SECURITY_ACTIONS))
    }

    pub fn security_username(&self) -> Option<&str> {
        self.security.as_ref()?.username.as_deref()
    }

    pub fn security_password(&self) -> Option<&Secret> {
        self.security.as_ref()?.password.as_ref()
    }

    /// Password encoding actually used on the wire.
    ///
    /// With no (or a blank) password this is always [`PasswordType::None`],
    /// whatever type was configured. With a password and no explicit type it
    /// is [`PasswordType::Text`].
    pub fn security_password_type(&self) -> PasswordType {
        let Some(security) = &self.security else {
            return PasswordType::None;
        };
        match security.password.as_ref().filter(|p| !p.is_blank()) {
            None => PasswordType::None,
            Some(_) => security.password_type.unwrap_or(PasswordType::Text),
        }
    }

    /// The password type set in the security block, ignored for lack of a password.
    pub fn ignored_password_type(&self) -> Option<PasswordType> {
        let security = self.security.as_ref()?;
        let configured = security.password_type?;
        (configured != PasswordType::None
            && self.security_password_type() == PasswordType::None)
            .then_some(configured)
    }

    pub fn security_must_understand(&self) -> bool {
        self.security
            .as_ref()
            .and_then(|s| s.must_understand)
            .unwrap_or(DEFAULT_SECURITY_MUST_UNDERSTAND)
    }

    pub fn security_time_to_live(&self) -> Duration {
        Duration::from_secs(
            self.security
                .as_ref()
                .and_then(|s| s.time_to_live_secs)
                .unwrap_or(DEFAULT_SECURITY_TIME_TO_LIVE_SECS),
        )
    }

    pub fn is_proxy_enabled(&self) -> bool {
        self.proxy.is_some()
    }

    pub fn proxy_host(&self) -> Option<&str> {
        self.proxy.as_ref()?.host.as_deref()
    }

    pub fn proxy_port(&self) -> Option<u16> {
        self.proxy.as_ref()?.port
    }

    pub fn proxy_username(&self) -> Option<&str> {
        self.proxy.as_ref()?.username.as_deref()
    }

    pub fn proxy_password(&self) -> Option<&Secret> {
        self.proxy.as_ref()?.password.as_ref()
    }

    pub fn pool_max_total_connections(&self) -> u32 {
        self.pool
            .max_total_connections
            .unwrap_or(DEFAULT_POOL_MAX_TOTAL_CONNECTIONS)
    }

    pub fn pool_max_route_connections(&self) -> u32 {
        self.pool
            .max_route_connections
            .unwrap_or(DEFAULT_POOL_MAX_ROUTE_CONNECTIONS)
    }

    pub fn pool_idle_timeout(&self) -> Duration {
        Duration::from_millis(
            self.pool
                .idle_timeout_ms
                .unwrap_or(DEFAULT_POOL_IDLE_TIMEOUT_MS),
        )
    }

    pub fn has_interceptor_overrides(&self) -> bool {
        !self.interceptor_overrides.is_empty()
    }

    pub fn interceptor_overrides(&self) -> &[Arc<dyn Interceptor>] {
        &self.interceptor_overrides
    }

    pub fn has_interceptor_substitutes(&self) -> bool {
        !self.interceptor_substitutes.is_empty()
    }

    /// First substitute whose concrete type is `interceptor_type`.
    pub fn interceptor_substitute(&self, interceptor_type: TypeId) -> Option<Arc<dyn Interceptor>> {
        self.interceptor_substitutes
            .iter()
            .find(|s| s.interceptor_type() == interceptor_type)
            .cloned()
    }

    /// Serializable view of the resolved values with secrets masked.
    pub fn effective(&self) -> EffectiveSettings {
        let mask = |secret: Option<&Secret>| secret.map(|_| "***".to_string());
        EffectiveSettings {
            property_prefix: self.property_prefix.clone(),
            connect_timeout_ms: duration_ms(self.connect_timeout()),
            connect_request_timeout_ms: duration_ms(self.connect_request_timeout()),
            read_timeout_ms: duration_ms(self.read_timeout()),
            endpoint: self.endpoint.clone(),
            disable_cookies: self.cookies_disabled(),
            marshaller_bean_name: self.marshaller_bean_name().map(str::to_string),
            marshaller_class_name: self.marshaller_class_name().map(str::to_string),
            security: self.security.as_ref().map(|_| EffectiveSecurity {
                actions: self.security_actions().unwrap_or_default().to_vec(),
                username: self.security_username().map(str::to_string),
                password: mask(self.security_password()),
                password_type: self.security_password_type(),
                must_understand: self.security_must_understand(),
                time_to_live_secs: self.security_time_to_live().as_secs(),
            }),
            proxy: self.proxy.as_ref().map(|_| EffectiveProxy {
                host: self.proxy_host().map(str::to_string),
                port: self.proxy_port(),
                username: self.proxy_username().map(str::to_string),
                password: mask(self.proxy_password()),
            }),
            pool: EffectivePool {
                max_total_connections: self.pool_max_total_connections(),
                max_route_connections: self.pool_max_route_connections(),
                idle_timeout_ms: duration_ms(self.pool_idle_timeout()),
            },
            interceptor_overrides: self
                .interceptor_overrides
                .iter()
                .map(|i| i.name().to_string())
                .collect(),
            interceptor_substitutes: self
                .interceptor_substitutes
                .iter()
                .map(|i| i.name().to_string())
                .collect(),
        }
    }
}

impl PartialEq for ClientConfiguration {
    fn eq(&self, other: &Self) -> bool {
        fn same_list(a: &[Arc<dyn Interceptor>], b: &[Arc<dyn Interceptor>]) -> bool {
            a.len() == b.len() && a.iter().zip(b).all(|(x, y)| same_interceptor(x, y))
        }

        self.property_prefix == other.property_prefix
            && self.connect_timeout_ms == other.connect_timeout_ms
            && self.connect_request_timeout_ms == other.connect_request_timeout_ms
            && self.read_timeout_ms == other.read_timeout_ms
            && self.endpoint == other.endpoint
            && self.disable_cookies == other.disable_cookies
            && self.marshaller_bean_name == other.marshaller_bean_name
            && self.marshaller_class_name == other.marshaller_class_name
            && self.security == other.security
            && self.proxy == other.proxy
            && self.pool == other.pool
            && same_list(&self.interceptor_overrides, &other.interceptor_overrides)
            && same_list(&self.interceptor_substitutes, &other.interceptor_substitutes)
    }
}

/// Resolved settings as reported by `courier show`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EffectiveSettings {
    pub property_prefix: String,
    pub connect_timeout_ms: u64,
    pub connect_request_timeout_ms: u64,
    pub read_timeout_ms: u64,
    pub endpoint: Option<String>,
    pub disable_cookies: bool,
    pub marshaller_bean_name: Option<String>,
    pub marshaller_class_name: Option<String>,
    pub security: Option<EffectiveSecurity>,
    pub proxy: Option<EffectiveProxy>,
    pub pool: EffectivePool,
    pub interceptor_overrides: Vec<String>,
    pub interceptor_substitutes: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EffectiveSecurity {
    pub actions: Vec<SecurityAction>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub password_type: PasswordType,
    pub must_understand: bool,
    pub time_to_live_secs: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EffectiveProxy {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub username: Option<String>,
    pub password: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EffectivePool {
    pub max_total_connections: u32,
    pub max_route_connections: u32,
    pub idle_timeout_ms: u64,
}

fn duration_ms(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

fn string(group: Option<&ConfigurationGroup>, key: &str) -> Option<String> {
    group.and_then(|g| g.get_string(key))
}

fn integer<T: FromStr>(group: Option<&ConfigurationGroup>, key: &str) -> ConfigurationResult<Option<T>> {
    group.map_or(Ok(None), |g| g.get_integer(key))
}

fn boolean(group: Option<&ConfigurationGroup>, key: &str) -> ConfigurationResult<Option<bool>> {
    group.map_or(Ok(None), |g| g.get_bool(key))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn group(entries: &[(&str, &str)]) -> ConfigurationGroup {
        ConfigurationGroup::new("soapclient.def.maths", entries.iter().copied())
    }

    struct Named(&'static str);

    impl Interceptor for Named {
        fn name(&self) -> &str {
            self.0
        }
    }

    #[test]
    fn test_defaults_without_any_group() {
        let config = ClientConfiguration::from_group(None).unwrap();
        assert_eq!(config.connect_timeout(), Duration::from_millis(1000));
        assert_eq!(config.connect_request_timeout(), Duration::from_millis(1000));
        assert_eq!(config.read_timeout(), Duration::from_millis(10_000));
        assert_eq!(config.endpoint(), None);
        assert!(!config.cookies_disabled());
        assert!(!config.is_security_enabled());
        assert!(!config.is_proxy_enabled());
        assert_eq!(config.pool_max_total_connections(), 80);
        assert_eq!(config.pool_max_route_connections(), 20);
        assert_eq!(config.pool_idle_timeout(), Duration::from_millis(10_000));
        assert_eq!(config.security_password_type(), PasswordType::None);
        assert_eq!(config.property_prefix(), DEFAULT_PROPERTY_PREFIX);
    }

    #[test]
    fn test_group_value_wins_over_template_and_default() {
        let template = ClientConfiguration::new()
            .with_connect_timeout(Duration::from_millis(2500))
            .with_read_timeout(Duration::from_millis(7000))
            .with_endpoint("http://template.local/ws");
        let group = group(&[("connect_timeout", "300"), ("pool.max_total_connections", "5")]);

        let resolved = template.resolve(Some(&group)).unwrap();
        assert_eq!(resolved.connect_timeout(), Duration::from_millis(300));
        assert_eq!(resolved.read_timeout(), Duration::from_millis(7000));
        assert_eq!(resolved.connect_request_timeout(), Duration::from_millis(1000));
        assert_eq!(resolved.endpoint(), Some("http://template.local/ws"));
        assert_eq!(resolved.pool_max_total_connections(), 5);
        assert_eq!(resolved.pool_max_route_connections(), 20);

        // the template itself is never mutated
        assert_eq!(template.connect_timeout(), Duration::from_millis(2500));
    }

    #[test]
    fn test_malformed_timeout_is_configuration_error() {
        let err = ClientConfiguration::from_group(Some(&group(&[("read_timeout", "soon")])))
            .unwrap_err();
        assert!(matches!(
            err,
            ConfigurationError::InvalidValue { ref key, .. } if key == "soapclient.def.maths.read_timeout"
        ));
    }

    #[test]
    fn test_negative_timeout_is_rejected() {
        assert!(ClientConfiguration::from_group(Some(&group(&[("connect_timeout", "-5")]))).is_err());
    }

    #[test]
    fn test_security_disabled_without_sub_group() {
        let config =
            ClientConfiguration::from_group(Some(&group(&[("endpoint", "http://x/ws")]))).unwrap();
        assert!(!config.is_security_enabled());
        assert_eq!(config.security_username(), None);
        assert!(config.security_password().is_none());
        assert_eq!(config.security_actions(), None);
    }

    #[test]
    fn test_security_block_enables_security_with_defaults() {
        let config = ClientConfiguration::from_group(Some(&group(&[
            ("security.username", "svc"),
            ("security.password", "pw"),
        ])))
        .unwrap();
        assert!(config.is_security_enabled());
        assert_eq!(config.security_username(), Some("svc"));
        assert_eq!(config.security_password().map(Secret::expose), Some("pw"));
        assert_eq!(config.security_actions(), Some(DEFAULT_SECURITY_ACTIONS));
        assert!(!config.security_must_understand());
        assert_eq!(config.security_time_to_live(), Duration::from_secs(300));
    }

    #[test]
    fn test_password_type_plain_text_when_password_without_type() {
        let config = ClientConfiguration::from_group(Some(&group(&[
            ("security.username", "svc"),
            ("security.password", "pw"),
        ])))
        .unwrap();
        assert_eq!(config.security_password_type(), PasswordType::Text);
    }

    #[test]
    fn test_password_type_none_without_password_regardless_of_explicit_type() {
        let config = ClientConfiguration::from_group(Some(&group(&[
            ("security.username", "svc"),
            ("security.password_type", "PasswordDigest"),
        ])))
        .unwrap();
        assert_eq!(config.security_password_type(), PasswordType::None);

        let blank = ClientConfiguration::from_group(Some(&group(&[
            ("security.password", "   "),
            ("security.password_type", "PasswordDigest"),
        ])))
        .unwrap();
        assert_eq!(blank.security_password_type(), PasswordType::None);
        assert_eq!(blank.ignored_password_type(), Some(PasswordType::Digest));
    }

    #[test]
    fn test_password_type_explicit_with_password() {
        let config = ClientConfiguration::from_group(Some(&group(&[
            ("security.password", "pw"),
            ("security.password_type", "PasswordDigest"),
        ])))
        .unwrap();
        assert_eq!(config.security_password_type(), PasswordType::Digest);
        assert_eq!(config.ignored_password_type(), None);
    }

    #[test]
    fn test_unknown_password_type_and_action_are_rejected() {
        assert!(ClientConfiguration::from_group(Some(&group(&[(
            "security.password_type",
            "Rot13"
        )])))
        .is_err());
        assert!(ClientConfiguration::from_group(Some(&group(&[(
            "security.actions",
            "UsernameToken Encrypt"
        )])))
        .is_err());
    }

    #[test]
    fn test_proxy_block() {
        let config = ClientConfiguration::from_group(Some(&group(&[
            ("proxy.host", "proxy.corp"),
            ("proxy.port", "3128"),
            ("proxy.username", "alice"),
            ("proxy.password", "secret"),
        ])))
        .unwrap();
        assert!(config.is_proxy_enabled());
        assert_eq!(config.proxy_host(), Some("proxy.corp"));
        assert_eq!(config.proxy_port(), Some(3128));
        assert_eq!(config.proxy_username(), Some("alice"));
        assert_eq!(config.proxy_password().map(Secret::expose), Some("secret"));

        let plain = ClientConfiguration::from_group(Some(&group(&[("endpoint", "http://x")])))
            .unwrap();
        assert!(!plain.is_proxy_enabled());
        assert_eq!(plain.proxy_port(), None);
    }

    #[test]
    fn test_template_security_survives_group_without_block() {
        let template = ClientConfiguration::new().with_security(SecuritySettings {
            username: Some("tmpl".to_string()),
            password: Some(Secret::new("pw")),
            ..Default::default()
        });
        let resolved = template
            .resolve(Some(&group(&[("security.username", "override")])))
            .unwrap();
        assert_eq!(resolved.security_username(), Some("override"));
        assert_eq!(resolved.security_password().map(Secret::expose), Some("pw"));

        let untouched = template.resolve(Some(&group(&[("endpoint", "http://x")]))).unwrap();
        assert!(untouched.is_security_enabled());
        assert_eq!(untouched.security_username(), Some("tmpl"));
    }

    #[test]
    fn test_resolution_is_deterministic() {
        let group = group(&[
            ("connect_timeout", "100"),
            ("endpoint", "http://calc.local/ws"),
            ("security.username", "svc"),
            ("security.password", "pw"),
            ("proxy.host", "proxy"),
            ("proxy.port", "8080"),
            ("pool.idle_timeout", "2000"),
        ]);
        let first = ClientConfiguration::from_group(Some(&group)).unwrap();
        let second = ClientConfiguration::from_group(Some(&group)).unwrap();
        assert_eq!(first, second);
        assert_eq!(first.effective(), second.effective());
    }

    #[test]
    fn test_interceptor_substitute_by_type() {
        let substitute: Arc<dyn Interceptor> = Arc::new(Named("replacement"));
        let config = ClientConfiguration::new().add_interceptor_substitute(substitute.clone());
        assert!(config.has_interceptor_substitutes());
        let found = config.interceptor_substitute(TypeId::of::<Named>()).unwrap();
        assert!(same_interceptor(&found, &substitute));
        assert!(config.interceptor_substitute(TypeId::of::<String>()).is_none());
    }

    #[test]
    fn test_effective_masks_secrets() {
        let config = ClientConfiguration::from_group(Some(&group(&[
            ("security.password", "pw"),
            ("proxy.host", "proxy"),
            ("proxy.password", "hunter2"),
        ])))
        .unwrap();
        let json = serde_json::to_string(&config.effective()).unwrap();
        assert!(!json.contains("hunter2"));
        assert!(!json.contains("\"pw\""));
        assert!(json.contains("PasswordText"));
        assert!(!format!("{config:?}").contains("hunter2"));
    }
}
