//! Application configuration loaded from environment variables.
//!
//! Every variable is optional outside production:
//! - `SIMEX_ENV`: `development` (default) or `production`
//! - `SIMEX_FINGERPRINT_KEY`: HMAC key for identity fingerprints,
//!   required when `SIMEX_ENV=production`
//! - `SIMEX_MAX_RANGE_MINUTES`, `SIMEX_MAX_BUCKETS`: price query ceilings
//! - `SIMEX_MATCH_INTERVAL_SECS`: order matcher poll period
//! - `SIMEX_SNAPSHOT_REFRESH_SECS`, `SIMEX_SNAPSHOT_MAX_AGE_SECS`
//! - `SIMEX_PRICE_CACHE_TTL_SECS`
//! - `SIMEX_STARTER_FIAT_MAX`: upper bound of a new wallet's random balance
//! - `SIMEX_RULES_PATH`: JSON file with [`TradingRules`]

use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use rust_decimal::Decimal;
use serde::Deserialize;
use zeroize::Zeroizing;

use crate::ExchangeError;

/// Key used when none is configured. Refused in production.
const DEV_FINGERPRINT_KEY: &str = "simex-dev-only-fingerprint-key";

/// 7 days of minute candles.
const DEFAULT_MAX_RANGE_MINUTES: i64 = 60 * 24 * 7;
const DEFAULT_MAX_BUCKETS: i64 = 60 * 24 * 7;
const DEFAULT_MATCH_INTERVAL_SECS: u64 = 60;
const DEFAULT_SNAPSHOT_REFRESH_SECS: u64 = 60 * 60;
const DEFAULT_SNAPSHOT_MAX_AGE_SECS: u64 = 2 * 60 * 60;
const DEFAULT_PRICE_CACHE_TTL_SECS: u64 = 60;
const DEFAULT_STARTER_FIAT_MAX: u32 = 1000;

/// Top-level application configuration.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub environment: Environment,
    pub exchange: ExchangeConfig,
}

/// Deployment environment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    Development,
    Production,
}

/// Exchange-core tunables.
#[derive(Debug, Clone)]
pub struct ExchangeConfig {
    pub fingerprint_key: SecretKey,
    pub max_range_minutes: i64,
    pub max_buckets: i64,
    pub match_interval: Duration,
    pub snapshot_refresh: Duration,
    pub snapshot_max_age: Duration,
    pub price_cache_ttl: Duration,
    pub starter_fiat_max: u32,
    pub rules: TradingRules,
}

impl Default for ExchangeConfig {
    fn default() -> Self {
        Self {
            fingerprint_key: SecretKey::new(DEV_FINGERPRINT_KEY),
            max_range_minutes: DEFAULT_MAX_RANGE_MINUTES,
            max_buckets: DEFAULT_MAX_BUCKETS,
            match_interval: Duration::from_secs(DEFAULT_MATCH_INTERVAL_SECS),
            snapshot_refresh: Duration::from_secs(DEFAULT_SNAPSHOT_REFRESH_SECS),
            snapshot_max_age: Duration::from_secs(DEFAULT_SNAPSHOT_MAX_AGE_SECS),
            price_cache_ttl: Duration::from_secs(DEFAULT_PRICE_CACHE_TTL_SECS),
            starter_fiat_max: DEFAULT_STARTER_FIAT_MAX,
            rules: TradingRules::default(),
        }
    }
}

/// Secret bytes that never show up in `Debug` output and are wiped on drop.
#[derive(Clone)]
pub struct SecretKey(Zeroizing<Vec<u8>>);

impl SecretKey {
    pub fn new(value: impl AsRef<[u8]>) -> Self {
        Self(Zeroizing::new(value.as_ref().to_vec()))
    }

    pub fn expose(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Debug for SecretKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SecretKey(<redacted>)")
    }
}

/// Minimum sizes for trades, orders and deposits.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct TradingRules {
    /// Smallest fiat amount for a market buy or a buy limit order.
    pub min_trade_fiat: Decimal,
    /// Smallest crypto amount for a market sell or a sell limit order.
    pub min_trade_asset: Decimal,
    /// Smallest fiat deposit accepted through the query surface.
    pub min_deposit: Decimal,
    /// Lowest limit price accepted for an order.
    pub min_limit_price: Decimal,
}

impl Default for TradingRules {
    fn default() -> Self {
        Self {
            min_trade_fiat: Decimal::TEN,
            min_trade_asset: Decimal::new(1, 4),
            min_deposit: Decimal::TEN,
            min_limit_price: Decimal::new(1, 2),
        }
    }
}

impl TradingRules {
    /// Loads trading rules from a JSON file. Missing fields keep their
    /// defaults.
    ///
    /// # Errors
    ///
    /// Returns [`ExchangeError::Config`] if the file cannot be read or parsed.
    pub fn load(path: &Path) -> crate::Result<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| {
            ExchangeError::Config(format!("failed to read {}: {e}", path.display()))
        })?;
        let rules: Self = serde_json::from_str(&contents)?;
        Ok(rules)
    }
}

/// Loads the application configuration from environment variables.
///
/// # Errors
///
/// Returns [`ExchangeError::Config`] if a numeric variable does not parse,
/// the rules file cannot be loaded, or production runs without a
/// fingerprint key.
pub fn fetch_config() -> crate::Result<AppConfig> {
    let environment = match non_empty_var("SIMEX_ENV").as_deref() {
        None | Some("development") => Environment::Development,
        Some("production") => Environment::Production,
        Some(other) => {
            return Err(ExchangeError::Config(format!(
                "SIMEX_ENV must be development or production, got {other:?}"
            )));
        }
    };

    let fingerprint_key = match non_empty_var("SIMEX_FINGERPRINT_KEY") {
        Some(key) => SecretKey::new(Zeroizing::new(key).as_bytes()),
        None if environment == Environment::Production => {
            return Err(ExchangeError::Config(
                "SIMEX_FINGERPRINT_KEY is required in production".to_string(),
            ));
        }
        None => SecretKey::new(DEV_FINGERPRINT_KEY),
    };

    let rules = match non_empty_var("SIMEX_RULES_PATH") {
        Some(path) => TradingRules::load(Path::new(&path))?,
        None => TradingRules::default(),
    };

    Ok(AppConfig {
        environment,
        exchange: ExchangeConfig {
            fingerprint_key,
            max_range_minutes: parsed_var("SIMEX_MAX_RANGE_MINUTES", DEFAULT_MAX_RANGE_MINUTES)?,
            max_buckets: parsed_var("SIMEX_MAX_BUCKETS", DEFAULT_MAX_BUCKETS)?,
            match_interval: secs_var("SIMEX_MATCH_INTERVAL_SECS", DEFAULT_MATCH_INTERVAL_SECS)?,
            snapshot_refresh: secs_var("SIMEX_SNAPSHOT_REFRESH_SECS", DEFAULT_SNAPSHOT_REFRESH_SECS)?,
            snapshot_max_age: secs_var("SIMEX_SNAPSHOT_MAX_AGE_SECS", DEFAULT_SNAPSHOT_MAX_AGE_SECS)?,
            price_cache_ttl: secs_var("SIMEX_PRICE_CACHE_TTL_SECS", DEFAULT_PRICE_CACHE_TTL_SECS)?,
            starter_fiat_max: parsed_var("SIMEX_STARTER_FIAT_MAX", DEFAULT_STARTER_FIAT_MAX)?,
            rules,
        },
    })
}

/// Returns the value of an environment variable if it exists and is non-empty.
fn non_empty_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|s| !s.is_empty())
}

fn parsed_var<T>(name: &str, default: T) -> crate::Result<T>
where
    T: FromStr,
    T::Err: fmt::Display,
{
    match non_empty_var(name) {
        Some(raw) => raw
            .parse()
            .map_err(|e| ExchangeError::Config(format!("{name}={raw:?} is invalid: {e}"))),
        None => Ok(default),
    }
}

/// A period in whole seconds. Zero is rejected since timers cannot tick at it.
fn secs_var(name: &str, default: u64) -> crate::Result<Duration> {
    match parsed_var(name, default)? {
        0 => Err(ExchangeError::Config(format!("{name} must be at least 1"))),
        secs => Ok(Duration::from_secs(secs)),
    }
}
