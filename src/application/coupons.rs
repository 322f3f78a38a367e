//! Coupon Evaluator

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::sync::Arc;
use thiserror::Error;

use crate::application::ports::{CouponStore, StoreError};
use crate::domain::services::coupons::{self, AppliedCoupon, CouponError};
use crate::domain::value_objects::CouponCode;

#[derive(Debug, Error)]
pub enum CouponEvaluationError {
    #[error(transparent)]
    Rejected(#[from] CouponError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Clone)]
pub struct CouponEvaluator {
    coupons: Arc<dyn CouponStore>,
}

impl CouponEvaluator {
    pub fn new(coupons: Arc<dyn CouponStore>) -> Self {
        Self { coupons }
    }

    /// Look up `code` and evaluate it against `subtotal`.
    ///
    /// The usage count is read outside any transaction, so two concurrent
    /// checkouts can both pass a limit of one. Usage limits are soft.
    pub async fn evaluate(&self, code: &str, subtotal: Decimal, now: DateTime<Utc>) -> Result<AppliedCoupon, CouponEvaluationError> {
        let code = CouponCode::new(code).map_err(|_| CouponError::InvalidCoupon)?;

        let coupon = self
            .coupons
            .find_by_code(&code)
            .await?
            .ok_or(CouponError::InvalidCoupon)?;

        let usage_count = match coupon.usage_limit {
            Some(_) => self.coupons.count_orders_using(coupon.id).await?,
            None => 0,
        };

        let applied = coupons::apply(&coupon, subtotal, usage_count, now)?;

        tracing::debug!(code = %applied.code, discount = %applied.discount, free_shipping = applied.free_shipping, "coupon applied");

        Ok(applied)
    }
}

#[cfg(test)]
mod tests {
    use mockall::predicate::eq;
    use testresult::TestResult;

    use super::*;
    use crate::application::ports::MockCouponStore;
    use crate::domain::aggregates::{Coupon, Discount};

    fn percent_coupon(limit: Option<u32>) -> Coupon {
        let mut coupon = Coupon::new(
            CouponCode::new("SAVE10").unwrap(),
            Discount::Percentage { percent: Decimal::new(10, 0), max_discount: None },
        );
        coupon.usage_limit = limit;
        coupon
    }

    #[tokio::test]
    async fn lookup_normalizes_code() -> TestResult {
        let coupon = percent_coupon(None);
        let mut store = MockCouponStore::new();
        store
            .expect_find_by_code()
            .withf(|code| code.as_str() == "SAVE10")
            .returning(move |_| Ok(Some(coupon.clone())));
        store.expect_count_orders_using().never();

        let evaluator = CouponEvaluator::new(Arc::new(store));
        let applied = evaluator.evaluate(" save10 ", Decimal::new(200, 0), Utc::now()).await?;

        assert_eq!(applied.discount, Decimal::new(20, 0));

        Ok(())
    }

    #[tokio::test]
    async fn unknown_code_is_invalid() {
        let mut store = MockCouponStore::new();
        store.expect_find_by_code().returning(|_| Ok(None));

        let evaluator = CouponEvaluator::new(Arc::new(store));
        let result = evaluator.evaluate("NOPE", Decimal::new(10, 0), Utc::now()).await;

        assert!(
            matches!(result, Err(CouponEvaluationError::Rejected(CouponError::InvalidCoupon))),
            "expected InvalidCoupon, got {result:?}"
        );
    }

    #[tokio::test]
    async fn blank_code_is_invalid_without_lookup() {
        let mut store = MockCouponStore::new();
        store.expect_find_by_code().never();

        let evaluator = CouponEvaluator::new(Arc::new(store));
        let result = evaluator.evaluate("   ", Decimal::new(10, 0), Utc::now()).await;

        assert!(matches!(result, Err(CouponEvaluationError::Rejected(CouponError::InvalidCoupon))));
    }

    #[tokio::test]
    async fn usage_limit_counts_prior_orders() {
        let coupon = percent_coupon(Some(1));
        let id = coupon.id;
        let mut store = MockCouponStore::new();
        store.expect_find_by_code().returning(move |_| Ok(Some(coupon.clone())));
        store.expect_count_orders_using().with(eq(id)).times(1).returning(|_| Ok(1));

        let evaluator = CouponEvaluator::new(Arc::new(store));
        let result = evaluator.evaluate("SAVE10", Decimal::new(200, 0), Utc::now()).await;

        assert!(
            matches!(result, Err(CouponEvaluationError::Rejected(CouponError::UsageLimitReached))),
            "expected UsageLimitReached, got {result:?}"
        );
    }
}
