//! Engine configuration.

use std::time::Duration;

const DEFAULT_CURRENCY: &str = "usd";
const DEFAULT_GATEWAY_TIMEOUT_MS: u64 = 10_000;

/// Runtime settings for the procurement engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    /// Currency code every intent is created in (single-currency engine).
    pub currency: String,
    /// Upper bound for one gateway call.
    pub gateway_timeout: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            currency: DEFAULT_CURRENCY.to_string(),
            gateway_timeout: Duration::from_millis(DEFAULT_GATEWAY_TIMEOUT_MS),
        }
    }
}

impl EngineConfig {
    /// Read `PROCURA_CURRENCY` and `PROCURA_GATEWAY_TIMEOUT_MS`.
    ///
    /// Missing variables use the defaults; unusable values are logged and
    /// replaced by the defaults as well.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();

        let currency = match lookup("PROCURA_CURRENCY") {
            Some(raw) => {
                let code = raw.trim().to_ascii_lowercase();
                if code.len() == 3 && code.chars().all(|c| c.is_ascii_alphabetic()) {
                    code
                } else {
                    tracing::warn!(value = %raw, "invalid PROCURA_CURRENCY; using default");
                    defaults.currency
                }
            }
            None => defaults.currency,
        };

        let gateway_timeout = match lookup("PROCURA_GATEWAY_TIMEOUT_MS") {
            Some(raw) => match raw.trim().parse::<u64>() {
                Ok(ms) if ms > 0 => Duration::from_millis(ms),
                _ => {
                    tracing::warn!(value = %raw, "invalid PROCURA_GATEWAY_TIMEOUT_MS; using default");
                    defaults.gateway_timeout
                }
            },
            None => defaults.gateway_timeout,
        };

        Self {
            currency,
            gateway_timeout,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_apply_when_unset() {
        let cfg = EngineConfig::from_lookup(lookup(&[]));
        assert_eq!(cfg, EngineConfig::default());
        assert_eq!(cfg.gateway_timeout, Duration::from_secs(10));
    }

    #[test]
    fn values_are_read_and_normalized() {
        let cfg = EngineConfig::from_lookup(lookup(&[
            ("PROCURA_CURRENCY", " EUR "),
            ("PROCURA_GATEWAY_TIMEOUT_MS", "2500"),
        ]));
        assert_eq!(cfg.currency, "eur");
        assert_eq!(cfg.gateway_timeout, Duration::from_millis(2500));
    }

    #[test]
    fn bad_values_fall_back() {
        let cfg = EngineConfig::from_lookup(lookup(&[
            ("PROCURA_CURRENCY", "dollars"),
            ("PROCURA_GATEWAY_TIMEOUT_MS", "0"),
        ]));
        assert_eq!(cfg, EngineConfig::default());
    }
}
