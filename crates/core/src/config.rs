//! Core runtime configuration.
//!
//! This module defines configuration that is resolved once at process startup and then
//! passed into core services. Transformation and delivery code never reads process-wide
//! environment variables during request handling; everything it needs (MSH credentials,
//! LIS base URL, retry policy, batch bounds) arrives through `BridgeConfig`.

use crate::constants::{
    DEFAULT_BATCH_LIMIT, DEFAULT_MAX_PERIOD_DAYS, DEFAULT_SYSTEM_USER_ID,
    DEFAULT_UPDATE_CHUNK_SIZE,
};
use crate::{BridgeError, BridgeResult};
use std::str::FromStr;
use std::time::Duration;

/// Identity and location of the LIS.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LisSettings {
    pub base_url: String,
    pub product_name: String,
    pub version: String,
    pub user_id: String,
    pub secret_key: String,
}

/// Outbound call policy.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DeliverySettings {
    pub timeout: Duration,
    /// Total number of attempts made on transport failure (at least one).
    pub retries: u32,
    pub retry_delay: Duration,
}

impl Default for DeliverySettings {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            retries: 3,
            retry_delay: Duration::from_millis(100),
        }
    }
}

/// Bounds applied to batch work.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BatchLimits {
    /// Rows transformed per order/patient call; the rest are dropped.
    pub batch_limit: usize,
    /// Result rows per batched update statement.
    pub update_chunk_size: usize,
    /// Maximum span of a result query window, in days.
    pub max_period_days: i64,
}

impl Default for BatchLimits {
    fn default() -> Self {
        Self {
            batch_limit: DEFAULT_BATCH_LIMIT,
            update_chunk_size: DEFAULT_UPDATE_CHUNK_SIZE,
            max_period_days: DEFAULT_MAX_PERIOD_DAYS,
        }
    }
}

/// Core configuration resolved at startup.
#[derive(Clone, Debug)]
pub struct BridgeConfig {
    lis: LisSettings,
    delivery: DeliverySettings,
    limits: BatchLimits,
    system_user_id: i64,
}

impl BridgeConfig {
    /// Create a new `BridgeConfig`.
    ///
    /// # Errors
    ///
    /// Returns `BridgeError::InvalidConfig` if:
    /// - the LIS base URL is not an absolute http(s) URL,
    /// - `retries` is zero,
    /// - the batch limit or update chunk size is zero,
    /// - the maximum period is negative.
    pub fn new(
        lis: LisSettings,
        delivery: DeliverySettings,
        limits: BatchLimits,
        system_user_id: i64,
    ) -> BridgeResult<Self> {
        let url = reqwest::Url::parse(lis.base_url.trim())
            .map_err(|e| BridgeError::InvalidConfig(format!("LIS_BASE_URL: {e}")))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(BridgeError::InvalidConfig(
                "LIS_BASE_URL must use http or https".into(),
            ));
        }

        if delivery.retries == 0 {
            return Err(BridgeError::InvalidConfig(
                "LIS_RETRIES must be at least 1".into(),
            ));
        }

        if limits.batch_limit == 0 || limits.update_chunk_size == 0 {
            return Err(BridgeError::InvalidConfig(
                "batch limit and update chunk size must be at least 1".into(),
            ));
        }

        if limits.max_period_days < 0 {
            return Err(BridgeError::InvalidConfig(
                "BRIDGE_MAX_PERIOD_DAYS cannot be negative".into(),
            ));
        }

        Ok(Self {
            lis,
            delivery,
            limits,
            system_user_id,
        })
    }

    /// Resolve configuration from a key lookup, typically `|k| std::env::var(k).ok()`.
    ///
    /// Taking a lookup instead of reading the environment keeps tests independent of
    /// process state.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> BridgeResult<Self> {
        let required = |key: &str| {
            lookup(key)
                .ok_or_else(|| BridgeError::InvalidConfig(format!("{key} is not set")))
        };

        let lis = LisSettings {
            base_url: required("LIS_BASE_URL")?,
            product_name: lookup("LIS_PRODUCT_NAME").unwrap_or_default(),
            version: lookup("LIS_VERSION").unwrap_or_default(),
            user_id: lookup("LIS_USER_ID").unwrap_or_default(),
            secret_key: lookup("LIS_SECRET_KEY").unwrap_or_default(),
        };

        let defaults = DeliverySettings::default();
        let delivery = DeliverySettings {
            timeout: Duration::from_secs(parse_env_value(
                "LIS_TIMEOUT_SECS",
                lookup("LIS_TIMEOUT_SECS"),
                defaults.timeout.as_secs(),
            )?),
            retries: parse_env_value("LIS_RETRIES", lookup("LIS_RETRIES"), defaults.retries)?,
            retry_delay: Duration::from_millis(parse_env_value(
                "LIS_RETRY_DELAY_MS",
                lookup("LIS_RETRY_DELAY_MS"),
                100u64,
            )?),
        };

        let limits = BatchLimits {
            batch_limit: parse_env_value(
                "BRIDGE_BATCH_LIMIT",
                lookup("BRIDGE_BATCH_LIMIT"),
                DEFAULT_BATCH_LIMIT,
            )?,
            update_chunk_size: parse_env_value(
                "BRIDGE_UPDATE_CHUNK",
                lookup("BRIDGE_UPDATE_CHUNK"),
                DEFAULT_UPDATE_CHUNK_SIZE,
            )?,
            max_period_days: parse_env_value(
                "BRIDGE_MAX_PERIOD_DAYS",
                lookup("BRIDGE_MAX_PERIOD_DAYS"),
                DEFAULT_MAX_PERIOD_DAYS,
            )?,
        };

        let system_user_id = parse_env_value(
            "USER_SOFTMEDIX_ID",
            lookup("USER_SOFTMEDIX_ID"),
            DEFAULT_SYSTEM_USER_ID,
        )?;

        Self::new(lis, delivery, limits, system_user_id)
    }

    pub fn lis(&self) -> &LisSettings {
        &self.lis
    }

    pub fn delivery(&self) -> &DeliverySettings {
        &self.delivery
    }

    pub fn limits(&self) -> &BatchLimits {
        &self.limits
    }

    pub fn system_user_id(&self) -> i64 {
        self.system_user_id
    }

    /// Join an endpoint onto the LIS base URL with exactly one slash between them.
    pub fn lis_url(&self, endpoint: &str) -> String {
        format!(
            "{}/{}",
            self.lis.base_url.trim().trim_end_matches('/'),
            endpoint.trim_start_matches('/')
        )
    }
}

/// Parse an optional configuration value.
///
/// If `value` is `None` or empty/whitespace, returns `default`.
pub fn parse_env_value<T: FromStr>(key: &str, value: Option<String>, default: T) -> BridgeResult<T>
where
    T::Err: std::fmt::Display,
{
    let value = value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty());

    match value {
        Some(v) => v
            .parse::<T>()
            .map_err(|e| BridgeError::InvalidConfig(format!("{key}={v}: {e}"))),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn resolves_defaults_from_minimal_lookup() {
        let cfg = BridgeConfig::from_lookup(lookup_from(&[(
            "LIS_BASE_URL",
            "https://lis.example.test/api/",
        )]))
        .expect("valid config");

        assert_eq!(cfg.delivery().retries, 3);
        assert_eq!(cfg.delivery().timeout, Duration::from_secs(30));
        assert_eq!(cfg.delivery().retry_delay, Duration::from_millis(100));
        assert_eq!(cfg.limits().batch_limit, 100);
        assert_eq!(cfg.limits().update_chunk_size, 50);
        assert_eq!(cfg.limits().max_period_days, 30);
        assert_eq!(cfg.system_user_id(), 2);
    }

    #[test]
    fn lis_url_joins_with_single_slash() {
        let cfg = BridgeConfig::from_lookup(lookup_from(&[(
            "LIS_BASE_URL",
            "https://lis.example.test/api/",
        )]))
        .expect("valid config");

        assert_eq!(
            cfg.lis_url("/bridging/order"),
            "https://lis.example.test/api/bridging/order"
        );
    }

    #[test]
    fn rejects_missing_base_url_and_bad_numbers() {
        let err = BridgeConfig::from_lookup(lookup_from(&[])).expect_err("missing url");
        assert!(matches!(err, BridgeError::InvalidConfig(msg) if msg.contains("LIS_BASE_URL")));

        let err = BridgeConfig::from_lookup(lookup_from(&[
            ("LIS_BASE_URL", "https://lis.example.test"),
            ("LIS_RETRIES", "many"),
        ]))
        .expect_err("bad retries");
        assert!(matches!(err, BridgeError::InvalidConfig(msg) if msg.contains("LIS_RETRIES")));
    }

    #[test]
    fn rejects_zero_retries_and_non_http_urls() {
        let err = BridgeConfig::from_lookup(lookup_from(&[
            ("LIS_BASE_URL", "https://lis.example.test"),
            ("LIS_RETRIES", "0"),
        ]))
        .expect_err("zero retries");
        assert!(matches!(err, BridgeError::InvalidConfig(_)));

        let err = BridgeConfig::from_lookup(lookup_from(&[("LIS_BASE_URL", "ftp://lis")]))
            .expect_err("ftp scheme");
        assert!(matches!(err, BridgeError::InvalidConfig(_)));
    }
}
