//! PostgreSQL storage.
//!
//! One `PgStore` implements every storage port; each port lives in its own module.

use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;

use crate::application::ports::StoreError;

mod carts;
mod catalog;
mod coupons;
mod orders;
mod stock;

#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

/// Connect and bring the schema up to date.
pub async fn connect(database_url: &str, max_connections: u32) -> anyhow::Result<PgPool> {
    let pool = PgPoolOptions::new().max_connections(max_connections).connect(database_url).await?;
    sqlx::migrate!("./migrations").run(&pool).await?;
    Ok(pool)
}

/// Quantities are `INTEGER` columns with a `>= 0` check.
fn non_negative(column: &str, value: i32) -> Result<u32, StoreError> {
    u32::try_from(value).map_err(|_| StoreError::Corrupt(format!("{column} is negative: {value}")))
}

fn as_column(value: u32) -> Result<i32, StoreError> {
    i32::try_from(value).map_err(|_| StoreError::Corrupt(format!("quantity {value} exceeds column range")))
}
