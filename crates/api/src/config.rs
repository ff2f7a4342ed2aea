//! Server configuration.

use std::net::SocketAddr;

const DEFAULT_BIND_ADDR: &str = "0.0.0.0:8080";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiConfig {
    pub bind_addr: SocketAddr,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 8080)),
        }
    }
}

impl ApiConfig {
    /// Read `PROCURA_BIND_ADDR`; an unparsable address falls back to the default.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let Some(raw) = lookup("PROCURA_BIND_ADDR") else {
            return Self::default();
        };
        match raw.trim().parse::<SocketAddr>() {
            Ok(bind_addr) => Self { bind_addr },
            Err(err) => {
                tracing::warn!(
                    value = %raw,
                    error = %err,
                    "invalid PROCURA_BIND_ADDR; using {DEFAULT_BIND_ADDR}"
                );
                Self::default()
            }
        }
    }
}
