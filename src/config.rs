use std::env;
use std::time::Duration;

use crate::error::{Error, Result};

const DEFAULT_POOL_SIZE: u32 = 100;
const DEFAULT_WORKER_COUNT: usize = 10;
const DEFAULT_SYNC_INTERVAL: Duration = Duration::from_secs(5 * 60);
const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(24 * 60 * 60);
const DEFAULT_SYNCED_TAG: &str = "synced";

/// Runtime configuration, read from the environment.
///
/// Required: `ADO_ORG_URL`, `ADO_PAT`, `ASANA_PAT`, `DATABASE_URL`.
/// Durations accept strings like `30s`, `5m`, `1h`; invalid values log a
/// warning and fall back to the default rather than failing startup.
#[derive(Debug, Clone)]
pub struct Config {
    pub ado_org_url: String,
    pub ado_pat: String,
    pub asana_pat: String,
    pub database_url: String,
    pub db_max_pool_size: u32,
    pub sync_interval: Duration,
    pub cache_ttl: Duration,
    pub worker_count: usize,
    pub synced_tag_name: String,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            ado_org_url: required("ADO_ORG_URL")?,
            ado_pat: required("ADO_PAT")?,
            asana_pat: required("ASANA_PAT")?,
            database_url: required("DATABASE_URL")?,
            db_max_pool_size: pool_size(env::var("DB_MAX_POOL_SIZE").ok()),
            sync_interval: duration_or(
                "SYNC_INTERVAL",
                env::var("SYNC_INTERVAL").ok(),
                DEFAULT_SYNC_INTERVAL,
            ),
            cache_ttl: duration_or("CACHE_TTL", env::var("CACHE_TTL").ok(), DEFAULT_CACHE_TTL),
            worker_count: worker_count(env::var("WORKER_COUNT").ok()),
            synced_tag_name: env::var("SYNCED_TAG_NAME")
                .unwrap_or_else(|_| DEFAULT_SYNCED_TAG.to_string()),
        })
    }
}

fn required(name: &'static str) -> Result<String> {
    match env::var(name) {
        Ok(v) if !v.is_empty() => Ok(v),
        _ => Err(Error::Config(format!("{name} must be set"))),
    }
}

fn duration_or(name: &str, value: Option<String>, default: Duration) -> Duration {
    let Some(raw) = value else {
        return default;
    };
    match humantime::parse_duration(&raw) {
        Ok(d) => d,
        Err(e) => {
            log::warn!("unable to parse {name}={raw:?} ({e}), defaulting to {default:?}");
            default
        }
    }
}

fn pool_size(value: Option<String>) -> u32 {
    let Some(raw) = value else {
        return DEFAULT_POOL_SIZE;
    };
    match raw.parse::<u32>() {
        Ok(n) if n > 0 => n,
        _ => {
            log::warn!("invalid DB_MAX_POOL_SIZE={raw:?}, using default {DEFAULT_POOL_SIZE}");
            DEFAULT_POOL_SIZE
        }
    }
}

fn worker_count(value: Option<String>) -> usize {
    let Some(raw) = value else {
        return DEFAULT_WORKER_COUNT;
    };
    match raw.parse::<usize>() {
        Ok(n) if n > 0 => n,
        _ => {
            log::warn!("invalid WORKER_COUNT={raw:?}, using default {DEFAULT_WORKER_COUNT}");
            DEFAULT_WORKER_COUNT
        }
    }
}
