use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::{query_as, query_scalar, FromRow};
use uuid::Uuid;

use super::{non_negative, PgStore};
use crate::application::ports::{CouponStore, StoreError};
use crate::domain::aggregates::{Coupon, Discount, DiscountKind};
use crate::domain::value_objects::CouponCode;

const FIND_BY_CODE_SQL: &str = "SELECT id, code, discount_type, discount_value, min_purchase, max_discount, \
     usage_limit, starts_at, ends_at, is_active FROM coupons WHERE code = $1";

const COUNT_ORDERS_SQL: &str = "SELECT COUNT(*) FROM orders WHERE coupon_id = $1";

#[derive(Debug, FromRow)]
struct CouponRow {
    id: Uuid,
    code: String,
    discount_type: String,
    discount_value: Decimal,
    min_purchase: Option<Decimal>,
    max_discount: Option<Decimal>,
    usage_limit: Option<i32>,
    starts_at: Option<DateTime<Utc>>,
    ends_at: Option<DateTime<Utc>>,
    is_active: bool,
}

impl TryFrom<CouponRow> for Coupon {
    type Error = StoreError;

    fn try_from(row: CouponRow) -> Result<Self, Self::Error> {
        let corrupt = |e: &dyn std::fmt::Display| StoreError::Corrupt(format!("coupon {}: {e}", row.id));

        let kind: DiscountKind = row.discount_type.parse().map_err(|e| corrupt(&e))?;
        let discount = Discount::from_parts(kind, row.discount_value, row.max_discount).map_err(|e| corrupt(&e))?;
        let code = CouponCode::new(row.code.as_str()).map_err(|e| corrupt(&e))?;

        Ok(Coupon {
            id: row.id,
            code,
            discount,
            min_purchase: row.min_purchase,
            usage_limit: row.usage_limit.map(|l| non_negative("coupons.usage_limit", l)).transpose()?,
            starts_at: row.starts_at,
            ends_at: row.ends_at,
            active: row.is_active,
        })
    }
}

#[async_trait]
impl CouponStore for PgStore {
    async fn find_by_code(&self, code: &CouponCode) -> Result<Option<Coupon>, StoreError> {
        query_as::<_, CouponRow>(FIND_BY_CODE_SQL)
            .bind(code.as_str())
            .fetch_optional(&self.pool)
            .await?
            .map(Coupon::try_from)
            .transpose()
    }

    async fn count_orders_using(&self, coupon_id: Uuid) -> Result<u64, StoreError> {
        let count = query_scalar::<_, i64>(COUNT_ORDERS_SQL).bind(coupon_id).fetch_one(&self.pool).await?;
        Ok(count.unsigned_abs())
    }
}
