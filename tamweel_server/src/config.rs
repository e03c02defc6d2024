use std::env;

use chrono::Duration;
use log::*;
use tamweel_common::Halalas;
use tamweel_engine::db_types::{DEFAULT_AUCTION_WINDOW, DEFAULT_SELECTION_WINDOW};

const DEFAULT_TMW_HOST: &str = "127.0.0.1";
const DEFAULT_TMW_PORT: u16 = 8360;
const DEFAULT_SWEEP_INTERVAL_SECS: u64 = 300;
const DEFAULT_RECONCILE_INTERVAL_SECS: u64 = 3600;
const DEFAULT_ACCESS_FEE_SAR: i64 = 500;

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub database_url: String,
    /// How long banks may bid on a freshly submitted application.
    pub auction_window: Duration,
    /// How long a business has to select a winning offer once its auction completes.
    pub selection_window: Duration,
    /// The auction clock tick interval. A tick only ever resolves windows the wall clock has already closed, so
    /// this is an operational latency knob, not a correctness one.
    pub sweep_interval_secs: u64,
    /// The reconciliation pass interval.
    pub reconcile_interval_secs: u64,
    /// What a bank pays the marketplace to purchase access to an application.
    pub access_fee: Halalas,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_TMW_HOST.to_string(),
            port: DEFAULT_TMW_PORT,
            database_url: String::default(),
            auction_window: DEFAULT_AUCTION_WINDOW,
            selection_window: DEFAULT_SELECTION_WINDOW,
            sweep_interval_secs: DEFAULT_SWEEP_INTERVAL_SECS,
            reconcile_interval_secs: DEFAULT_RECONCILE_INTERVAL_SECS,
            access_fee: Halalas::from_sar(DEFAULT_ACCESS_FEE_SAR),
        }
    }
}

impl ServerConfig {
    pub fn new(host: &str, port: u16) -> Self {
        Self { host: host.to_string(), port, ..Default::default() }
    }

    pub fn from_env_or_default() -> Self {
        let host = env::var("TMW_HOST").ok().unwrap_or_else(|| DEFAULT_TMW_HOST.into());
        let port = env::var("TMW_PORT")
            .map(|s| {
                s.parse::<u16>().unwrap_or_else(|e| {
                    error!(
                        "🪛️ {s} is not a valid port for TMW_PORT. {e} Using the default, {DEFAULT_TMW_PORT}, instead."
                    );
                    DEFAULT_TMW_PORT
                })
            })
            .ok()
            .unwrap_or(DEFAULT_TMW_PORT);
        let database_url = env::var("TMW_DATABASE_URL").ok().unwrap_or_else(|| {
            warn!("🪛️ TMW_DATABASE_URL is not set. Using the default, which is probably not what you want.");
            String::default()
        });
        let auction_window = env_hours("TMW_AUCTION_WINDOW_HOURS", DEFAULT_AUCTION_WINDOW);
        let selection_window = env_hours("TMW_SELECTION_WINDOW_HOURS", DEFAULT_SELECTION_WINDOW);
        let sweep_interval_secs = env_u64("TMW_SWEEP_INTERVAL_SECS", DEFAULT_SWEEP_INTERVAL_SECS);
        let reconcile_interval_secs = env_u64("TMW_RECONCILE_INTERVAL_SECS", DEFAULT_RECONCILE_INTERVAL_SECS);
        let access_fee = Halalas::from_sar(env_i64("TMW_ACCESS_FEE_SAR", DEFAULT_ACCESS_FEE_SAR));
        Self {
            host,
            port,
            database_url,
            auction_window,
            selection_window,
            sweep_interval_secs,
            reconcile_interval_secs,
            access_fee,
        }
    }
}

fn env_hours(name: &str, default: Duration) -> Duration {
    match env::var(name) {
        Ok(s) => match s.parse::<i64>() {
            Ok(hours) if hours > 0 => Duration::hours(hours),
            _ => {
                error!("🪛️ {s} is not a valid hour count for {name}. Using the default, {default}, instead.");
                default
            },
        },
        Err(_) => default,
    }
}

fn env_u64(name: &str, default: u64) -> u64 {
    match env::var(name) {
        Ok(s) => s.parse::<u64>().unwrap_or_else(|e| {
            error!("🪛️ {s} is not a valid value for {name}. {e} Using the default, {default}, instead.");
            default
        }),
        Err(_) => default,
    }
}

fn env_i64(name: &str, default: i64) -> i64 {
    match env::var(name) {
        Ok(s) => s.parse::<i64>().unwrap_or_else(|e| {
            error!("🪛️ {s} is not a valid value for {name}. {e} Using the default, {default}, instead.");
            default
        }),
        Err(_) => default,
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let config = ServerConfig::default();
        assert_eq!(config.port, 8360);
        assert_eq!(config.auction_window, Duration::hours(48));
        assert_eq!(config.selection_window, Duration::hours(24));
        assert_eq!(config.sweep_interval_secs, 300);
        assert_eq!(config.access_fee, Halalas::from_sar(500));
    }
}
