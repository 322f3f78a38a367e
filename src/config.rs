//! Process configuration, read from the environment at startup.

use anyhow::{bail, Context};
use std::str::FromStr;
use std::time::Duration;

use crate::infrastructure::stripe::DEFAULT_API_BASE;

const DEFAULT_PORT: u16 = 8083;
const DEFAULT_MAX_CONNECTIONS: u32 = 10;
const DEFAULT_PAYMENT_TIMEOUT_SECS: u64 = 10;
const DEFAULT_RECONCILE_INTERVAL_SECS: u64 = 300;
const DEFAULT_RECONCILE_MIN_AGE_MINUTES: i64 = 30;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StorageBackend {
    Postgres,
    /// Volatile, for local runs without a database.
    Memory,
}

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub port: u16,
    pub storage: StorageBackend,
    pub database_url: Option<String>,
    pub database_max_connections: u32,
    pub nats_url: Option<String>,
    pub stripe_api_base: String,
    pub payment_timeout: Duration,
    pub reconcile_interval: Duration,
    pub reconcile_min_age: chrono::Duration,
    pub settings_encryption_key: Option<String>,
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        _ = dotenvy::dotenv();
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let var = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        let storage = match var("STORAGE").as_deref().map(str::to_ascii_lowercase).as_deref() {
            None | Some("postgres") => StorageBackend::Postgres,
            Some("memory") => StorageBackend::Memory,
            Some(other) => bail!("STORAGE must be `postgres` or `memory`, got `{other}`"),
        };

        let database_url = var("DATABASE_URL");
        if storage == StorageBackend::Postgres && database_url.is_none() {
            bail!("DATABASE_URL must be set");
        }

        Ok(Self {
            port: parsed(&var, "PORT", DEFAULT_PORT)?,
            storage,
            database_url,
            database_max_connections: parsed(&var, "DATABASE_MAX_CONNECTIONS", DEFAULT_MAX_CONNECTIONS)?,
            nats_url: var("NATS_URL"),
            stripe_api_base: var("STRIPE_API_BASE").unwrap_or_else(|| DEFAULT_API_BASE.to_string()),
            payment_timeout: Duration::from_secs(parsed(&var, "PAYMENT_TIMEOUT_SECS", DEFAULT_PAYMENT_TIMEOUT_SECS)?),
            reconcile_interval: Duration::from_secs(parsed(&var, "RECONCILE_INTERVAL_SECS", DEFAULT_RECONCILE_INTERVAL_SECS)?),
            reconcile_min_age: chrono::Duration::minutes(parsed(&var, "RECONCILE_MIN_AGE_MINUTES", DEFAULT_RECONCILE_MIN_AGE_MINUTES)?),
            settings_encryption_key: var("SETTINGS_ENCRYPTION_KEY"),
        })
    }

    pub fn socket_addr(&self) -> String {
        format!("0.0.0.0:{}", self.port)
    }
}

fn parsed<T>(var: &impl Fn(&str) -> Option<String>, name: &str, default: T) -> anyhow::Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match var(name) {
        Some(raw) => raw.trim().parse().with_context(|| format!("invalid {name}: `{raw}`")),
        None => Ok(default),
    }
}
