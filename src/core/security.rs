//! WS-Security style message signing.
//!
//! [`WsSecurityInterceptor`] is built from a client's `security` block and
//! writes a `Security` header block on every outbound message: a
//! UsernameToken (plain or digest password) and/or a Timestamp, depending on
//! the configured actions.
use std::time::Duration;

use base64::{Engine, engine::general_purpose::STANDARD};
use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::{Map, Value, json};
use sha1::{Digest, Sha1};

use crate::{
    config::client::{ClientConfiguration, PasswordType, SecurityAction, Secret},
    ports::interceptor::{Interceptor, InterceptorError, InterceptorResult, MessageContext},
};

pub const SECURITY_HEADER: &str = "Security";
const NONCE_LEN: usize = 16;

/// `Base64(SHA-1(nonce + created + password))`
pub fn password_digest(nonce: &[u8], created: &str, password: &str) -> String {
    let mut hasher = Sha1::new();
    hasher.update(nonce);
    hasher.update(created.as_bytes());
    hasher.update(password.as_bytes());
    STANDARD.encode(hasher.finalize())
}

fn timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}

#[derive(Debug, Clone)]
pub struct WsSecurityInterceptor {
    actions: Vec<SecurityAction>,
    username: Option<String>,
    password: Option<Secret>,
    password_type: PasswordType,
    must_understand: bool,
    time_to_live: Duration,
}

impl WsSecurityInterceptor {
    /// Build the interceptor for a client, or `None` when security is not enabled.
    pub fn from_config(config: &ClientConfiguration) -> Option<Self> {
        if !config.is_security_enabled() {
            return None;
        }
        if let Some(configured) = config.ignored_password_type() {
            tracing::warn!(
                ?configured,
                "No security password set, UsernameToken is sent without a password"
            );
        }
        Some(Self {
            actions: config.security_actions().unwrap_or_default().to_vec(),
            username: config.security_username().map(str::to_string),
            password: config.security_password().cloned(),
            password_type: config.security_password_type(),
            must_understand: config.security_must_understand(),
            time_to_live: config.security_time_to_live(),
        })
    }

    pub fn password_type(&self) -> PasswordType {
        self.password_type
    }

    /// Render the header block for a given nonce and creation instant.
    pub fn security_header(&self, nonce: &[u8], created: DateTime<Utc>) -> InterceptorResult<Value> {
        let created_str = timestamp(created);
        let mut header = Map::new();
        header.insert("mustUnderstand".to_string(), Value::Bool(self.must_understand));

        for action in &self.actions {
            match action {
                SecurityAction::UsernameToken => {
                    let username = self.username.as_deref().ok_or_else(|| {
                        InterceptorError::Failed {
                            interceptor: self.name().to_string(),
                            message: "UsernameToken requested but no username is configured"
                                .to_string(),
                        }
                    })?;
                    header.insert(
                        "UsernameToken".to_string(),
                        self.username_token(username, nonce, &created_str),
                    );
                }
                SecurityAction::Timestamp => {
                    let ttl = chrono::Duration::from_std(self.time_to_live)
                        .unwrap_or_else(|_| chrono::Duration::seconds(300));
                    header.insert(
                        "Timestamp".to_string(),
                        json!({
                            "Created": created_str,
                            "Expires": timestamp(created + ttl),
                        }),
                    );
                }
            }
        }

        Ok(Value::Object(header))
    }

    fn username_token(&self, username: &str, nonce: &[u8], created: &str) -> Value {
        let mut token = Map::new();
        token.insert("Username".to_string(), Value::String(username.to_string()));

        let password = self.password.as_ref().map(Secret::expose).unwrap_or_default();
        match self.password_type {
            PasswordType::None => {}
            PasswordType::Text => {
                token.insert(
                    "Password".to_string(),
                    json!({ "Type": self.password_type.type_uri(), "value": password }),
                );
            }
            PasswordType::Digest => {
                token.insert(
                    "Password".to_string(),
                    json!({
                        "Type": self.password_type.type_uri(),
                        "value": password_digest(nonce, created, password),
                    }),
                );
                token.insert("Nonce".to_string(), Value::String(STANDARD.encode(nonce)));
                token.insert("Created".to_string(), Value::String(created.to_string()));
            }
        }
        Value::Object(token)
    }
}

impl Interceptor for WsSecurityInterceptor {
    fn name(&self) -> &str {
        "ws-security"
    }

    fn is_security(&self) -> bool {
        true
    }

    fn handle_request(&self, ctx: &mut MessageContext) -> InterceptorResult<bool> {
        let nonce: [u8; NONCE_LEN] = rand::random();
        let header = self.security_header(&nonce, Utc::now())?;
        ctx.request.set_header(SECURITY_HEADER, header);
        tracing::debug!(
            client = %ctx.client_id,
            password_type = self.password_type.as_str(),
            "Attached security header"
        );
        Ok(true)
    }
}
