//! Environment-driven configuration.

use std::time::Duration;

use anyhow::Context;

/// Default cadence of the verification sweep.
pub const DEFAULT_VERIFICATION_INTERVAL_MINUTES: i64 = 24 * 60;
/// Default age after which a pending transmutation counts as stuck.
pub const DEFAULT_PENDING_TRANSMUTATION_HOURS: i64 = 24;
/// Default quantity under which a material counts as scarce.
pub const DEFAULT_MATERIAL_LOW_STOCK_THRESHOLD: f64 = 5.0;

const DEFAULT_BIND_ADDR: &str = "0.0.0.0:8080";

/// Process configuration, read once at startup.
#[derive(Debug, Clone)]
pub struct Config {
    pub bind_addr: String,
    pub database_url: String,
    pub redis_url: String,
    pub jwt_secret: String,
    /// Cadence of the scheduled verification sweep.
    pub verification_interval: Duration,
    /// Age threshold for the sweep's pending-transmutation query.
    pub pending_age: chrono::Duration,
    /// Quantity threshold for the sweep's scarce-material query.
    pub low_stock_threshold: f64,
}

impl Config {
    /// Read configuration from the environment.
    ///
    /// `DATABASE_URL`, `REDIS_URL` and `JWT_SECRET` are required. The
    /// tunables fall back to their documented defaults when unset,
    /// unparseable or non-positive.
    pub fn from_env() -> anyhow::Result<Self> {
        let database_url = std::env::var("DATABASE_URL").context("DATABASE_URL is required")?;
        let redis_url = std::env::var("REDIS_URL").context("REDIS_URL is required")?;
        let jwt_secret = std::env::var("JWT_SECRET").context("JWT_SECRET is required")?;

        let bind_addr = std::env::var("BIND_ADDR").unwrap_or_else(|_| {
            tracing::warn!("BIND_ADDR not set, defaulting to {DEFAULT_BIND_ADDR}");
            DEFAULT_BIND_ADDR.to_string()
        });

        let interval_minutes = positive_integer(
            std::env::var("VERIFICATION_INTERVAL_MINUTES").ok().as_deref(),
            DEFAULT_VERIFICATION_INTERVAL_MINUTES,
        );
        let pending_hours = positive_integer(
            std::env::var("PENDING_TRANSMUTATION_HOURS").ok().as_deref(),
            DEFAULT_PENDING_TRANSMUTATION_HOURS,
        );
        let low_stock_threshold = positive_float(
            std::env::var("MATERIAL_LOW_STOCK_THRESHOLD").ok().as_deref(),
            DEFAULT_MATERIAL_LOW_STOCK_THRESHOLD,
        );

        Ok(Self {
            bind_addr,
            database_url,
            redis_url,
            jwt_secret,
            verification_interval: Duration::from_secs(interval_minutes as u64 * 60),
            pending_age: chrono::Duration::hours(pending_hours),
            low_stock_threshold,
        })
    }
}

fn positive_integer(raw: Option<&str>, default: i64) -> i64 {
    match raw.map(str::parse::<i64>) {
        Some(Ok(value)) if value > 0 => value,
        Some(_) => {
            tracing::warn!(raw, default, "ignoring non-positive tunable");
            default
        }
        None => default,
    }
}

fn positive_float(raw: Option<&str>, default: f64) -> f64 {
    match raw.map(str::parse::<f64>) {
        Some(Ok(value)) if value > 0.0 => value,
        Some(_) => {
            tracing::warn!(raw, default, "ignoring non-positive tunable");
            default
        }
        None => default,
    }
}
