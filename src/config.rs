use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::policy::AdvanceWindow;

/// Runtime configuration, read from `ROOMSLOT_*` environment variables.
/// Unset or unparseable values fall back to defaults.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub data_dir: PathBuf,
    /// WAL appends after which the compactor rewrites the log.
    pub compact_threshold: u64,
    /// Upper bound on waiting for a contended day's ledger.
    pub lock_timeout: Duration,
    /// Retries for a failed WAL append before surfacing `Internal`.
    pub wal_retries: u32,
    /// Academy local time, in minutes east of UTC.
    pub utc_offset_minutes: i32,
    pub advance_window: AdvanceWindow,
    pub metrics_port: Option<u16>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data"),
            compact_threshold: 1000,
            lock_timeout: Duration::from_millis(2000),
            wal_retries: 3,
            utc_offset_minutes: 9 * 60,
            advance_window: AdvanceWindow::Browse,
            metrics_port: None,
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary key lookup (tests pass a map).
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        Self {
            data_dir: lookup("ROOMSLOT_DATA_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.data_dir),
            compact_threshold: parse_var(&lookup, "ROOMSLOT_COMPACT_THRESHOLD")
                .unwrap_or(defaults.compact_threshold),
            lock_timeout: parse_var(&lookup, "ROOMSLOT_LOCK_TIMEOUT_MS")
                .map(Duration::from_millis)
                .unwrap_or(defaults.lock_timeout),
            wal_retries: parse_var(&lookup, "ROOMSLOT_WAL_RETRIES").unwrap_or(defaults.wal_retries),
            utc_offset_minutes: parse_var(&lookup, "ROOMSLOT_UTC_OFFSET_MINUTES")
                .unwrap_or(defaults.utc_offset_minutes),
            advance_window: lookup("ROOMSLOT_ENFORCE_ADVANCE_DAYS")
                .and_then(|v| parse_flag(&v))
                .map(|on| if on { AdvanceWindow::Enforced } else { AdvanceWindow::Browse })
                .unwrap_or(defaults.advance_window),
            metrics_port: parse_var(&lookup, "ROOMSLOT_METRICS_PORT"),
        }
    }

    pub fn wal_path(&self) -> PathBuf {
        self.data_dir.join("roomslot.wal")
    }
}

fn parse_var<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<T> {
    lookup(key).and_then(|v| v.trim().parse().ok())
}

fn parse_flag(v: &str) -> Option<bool> {
    match v.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
