//! Provider block settings
//!
//! Each setting comes from the provider block first, then its environment
//! variable, then a built-in default.

use crate::api::Auth;
use tfplug::types::{AttributePath, DynamicValue};

pub const ENV_HOSTNAME: &str = "AWX_HOSTNAME";
pub const ENV_INSECURE: &str = "AWX_INSECURE";
pub const ENV_USERNAME: &str = "AWX_USERNAME";
pub const ENV_PASSWORD: &str = "AWX_PASSWORD";
pub const ENV_TOKEN: &str = "AWX_TOKEN";

pub const DEFAULT_HOSTNAME: &str = "http://localhost";
pub const DEFAULT_USERNAME: &str = "admin";
pub const DEFAULT_PASSWORD: &str = "password";

#[derive(Clone, PartialEq)]
pub struct ProviderConfig {
    pub hostname: String,
    pub insecure: bool,
    pub username: String,
    pub password: String,
    pub token: String,
}

impl std::fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("hostname", &self.hostname)
            .field("insecure", &self.insecure)
            .field("username", &self.username)
            .field("token_set", &!self.token.is_empty())
            .finish_non_exhaustive()
    }
}

impl ProviderConfig {
    pub fn resolve(config: &DynamicValue) -> Self {
        let string = |name: &str, env: &str, fallback: &str| {
            config
                .get_string_opt(&AttributePath::new(name))
                .or_else(|| std::env::var(env).ok().filter(|v| !v.is_empty()))
                .unwrap_or_else(|| fallback.to_string())
        };

        let insecure = config
            .get_bool_opt(&AttributePath::new("insecure"))
            .or_else(|| std::env::var(ENV_INSECURE).ok().and_then(|v| parse_bool(&v)))
            .unwrap_or(false);

        Self {
            hostname: string("hostname", ENV_HOSTNAME, DEFAULT_HOSTNAME),
            insecure,
            username: string("username", ENV_USERNAME, DEFAULT_USERNAME),
            password: string("password", ENV_PASSWORD, DEFAULT_PASSWORD),
            token: string("token", ENV_TOKEN, ""),
        }
    }

    pub fn auth(&self) -> Auth {
        Auth::from_credentials(&self.username, &self.password, &self.token)
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "t" | "true" | "yes" => Some(true),
        "0" | "f" | "false" | "no" => Some(false),
        _ => None,
    }
}
