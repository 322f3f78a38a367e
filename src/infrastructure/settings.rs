//! Store settings providers.
//!
//! Lookup order for a key: the `system_settings` table, then the environment
//! variable named by the upper-cased key, then the caller's default.

use async_trait::async_trait;
use sqlx::{FromRow, PgPool};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::warn;

use crate::application::ports::{ConfigProvider, SettingsError, StoreError};
use crate::infrastructure::cipher::SecretCipher;

const GET_SETTING_SQL: &str = "SELECT value, is_encrypted FROM system_settings WHERE key = $1";

fn env_fallback(key: &str) -> Option<String> {
    std::env::var(key.to_uppercase()).ok().filter(|v| !v.is_empty())
}

#[derive(Debug, FromRow)]
struct SettingRow {
    value: String,
    is_encrypted: bool,
}

#[derive(Clone)]
pub struct PgSettingsProvider {
    pool: PgPool,
    cipher: Option<Arc<dyn SecretCipher>>,
}

impl PgSettingsProvider {
    /// Without a cipher, encrypted rows cannot be read and count as errors.
    pub fn new(pool: PgPool, cipher: Option<Arc<dyn SecretCipher>>) -> Self {
        Self { pool, cipher }
    }

    async fn lookup(&self, key: &str) -> Result<Option<SettingRow>, StoreError> {
        sqlx::query_as::<_, SettingRow>(GET_SETTING_SQL)
            .bind(key)
            .fetch_optional(&self.pool)
            .await
            .map_err(StoreError::from)
    }

    fn reveal(&self, key: &str, row: SettingRow) -> Result<String, SettingsError> {
        if !row.is_encrypted {
            return Ok(row.value);
        }
        let cipher = self.cipher.as_ref().ok_or_else(|| SettingsError::Decrypt(key.to_string()))?;
        cipher.decrypt(&row.value).map_err(|error| {
            warn!(key, error = %error, "failed to decrypt setting");
            SettingsError::Decrypt(key.to_string())
        })
    }
}

#[async_trait]
impl ConfigProvider for PgSettingsProvider {
    async fn get_string(&self, key: &str, default: &str) -> String {
        let stored = match self.lookup(key).await {
            Ok(row) => row,
            Err(error) => {
                warn!(key, error = ?error, "failed to read setting");
                None
            }
        };

        match stored.map(|row| self.reveal(key, row)) {
            Some(Ok(value)) => value,
            Some(Err(_)) => default.to_string(),
            None => env_fallback(key).unwrap_or_else(|| default.to_string()),
        }
    }

    async fn get_secret(&self, key: &str) -> Result<Option<String>, SettingsError> {
        match self.lookup(key).await? {
            Some(row) => Ok(Some(self.reveal(key, row)?).filter(|v| !v.is_empty())),
            None => Ok(env_fallback(key)),
        }
    }
}

/// Fixed settings for tests and database-less runs.
#[derive(Clone, Debug, Default)]
pub struct StaticSettings {
    values: HashMap<String, String>,
}

impl StaticSettings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.values.insert(key.into(), value.into());
        self
    }

    fn value(&self, key: &str) -> Option<String> {
        self.values.get(key).cloned().or_else(|| env_fallback(key))
    }
}

#[async_trait]
impl ConfigProvider for StaticSettings {
    async fn get_string(&self, key: &str, default: &str) -> String {
        self.value(key).unwrap_or_else(|| default.to_string())
    }

    async fn get_secret(&self, key: &str) -> Result<Option<String>, SettingsError> {
        Ok(self.value(key).filter(|v| !v.is_empty()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn static_settings_fall_back_to_default() {
        let settings = StaticSettings::new().with("shipping_flat_rate", "7.5");

        assert_eq!(settings.get_string("shipping_flat_rate", "10").await, "7.5");
        assert_eq!(settings.get_string("storefront_test_unset_key", "fallback").await, "fallback");
        assert!(!settings.is_feature_enabled("storefront_test_unset_flag").await);
    }

    #[tokio::test]
    async fn empty_secrets_are_absent() {
        let settings = StaticSettings::new().with("storefront_test_secret", "");
        assert_eq!(settings.get_secret("storefront_test_secret").await.unwrap(), None);
    }
}
