//! Expiry arithmetic and the stock lot status rule.

use chrono::{DateTime, Utc};

use crate::model::{LotStatus, StockLot};

/// Default number of days before expiry at which a lot counts as expiring soon
pub const EXPIRING_SOON_WINDOW_DAYS: i64 = 3;

const MILLIS_PER_DAY: i64 = 24 * 60 * 60 * 1000;

/// Whole days until `expiry`, rounded up. Negative once the expiry has passed.
pub fn days_left(expiry: DateTime<Utc>, now: DateTime<Utc>) -> i64 {
    let millis = expiry.signed_duration_since(now).num_milliseconds();
    let floor = millis.div_euclid(MILLIS_PER_DAY);
    if millis.rem_euclid(MILLIS_PER_DAY) == 0 {
        floor
    } else {
        floor + 1
    }
}

/// Days left for a lot, `None` when the lot has no expiry date recorded
pub fn lot_days_left(lot: &StockLot, now: DateTime<Utc>) -> Option<i64> {
    lot.expiry_date.map(|expiry| days_left(expiry, now))
}

/// Rule re-deriving the status of a lot that still has stock left
pub trait StatusRule: Send + Sync {
    fn recompute(&self, lot: &StockLot, now: DateTime<Utc>) -> LotStatus;
}

/// Status from the distance to expiry: expired, expiring soon, or available
#[derive(Debug, Clone, Copy)]
pub struct ExpiryWindowRule {
    pub window_days: i64,
}

impl Default for ExpiryWindowRule {
    fn default() -> Self {
        Self {
            window_days: EXPIRING_SOON_WINDOW_DAYS,
        }
    }
}

impl StatusRule for ExpiryWindowRule {
    fn recompute(&self, lot: &StockLot, now: DateTime<Utc>) -> LotStatus {
        match lot_days_left(lot, now) {
            None => LotStatus::Available,
            Some(days) if days < 0 => LotStatus::Expired,
            Some(days) if days <= self.window_days => LotStatus::ExpiringSoon,
            Some(_) => LotStatus::Available,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{IngredientRef, UnitRef};
    use chrono::{Duration, TimeZone};
    use rust_decimal::Decimal;
    use uuid::Uuid;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 10, 12, 0, 0).unwrap()
    }

    fn lot_expiring_at(expiry: Option<DateTime<Utc>>) -> StockLot {
        let mut lot = StockLot::new(
            Uuid::new_v4(),
            IngredientRef::new(Uuid::new_v4(), "cream"),
            UnitRef::new(Uuid::new_v4(), "ml"),
            Decimal::ONE,
            now(),
        );
        lot.expiry_date = expiry;
        lot
    }

    #[test]
    fn test_days_left_rounds_partial_days_up() {
        assert_eq!(days_left(now() + Duration::hours(1), now()), 1);
        assert_eq!(days_left(now() + Duration::hours(36), now()), 2);
        assert_eq!(days_left(now() + Duration::days(2), now()), 2);
    }

    #[test]
    fn test_days_left_same_instant_is_zero() {
        assert_eq!(days_left(now(), now()), 0);
    }

    #[test]
    fn test_days_left_negative_after_expiry() {
        // ceil(-0.5) == 0, ceil(-1.5) == -1
        assert_eq!(days_left(now() - Duration::hours(12), now()), 0);
        assert_eq!(days_left(now() - Duration::hours(36), now()), -1);
        assert_eq!(days_left(now() - Duration::days(3), now()), -3);
    }

    #[test]
    fn test_window_rule_classification() {
        let rule = ExpiryWindowRule::default();
        let cases = [
            (Some(now() + Duration::days(10)), LotStatus::Available),
            (Some(now() + Duration::days(3)), LotStatus::ExpiringSoon),
            (Some(now() + Duration::hours(5)), LotStatus::ExpiringSoon),
            (Some(now() - Duration::days(2)), LotStatus::Expired),
            (None, LotStatus::Available),
        ];
        for (expiry, expected) in cases {
            assert_eq!(rule.recompute(&lot_expiring_at(expiry), now()), expected);
        }
    }

    #[test]
    fn test_window_rule_respects_custom_window() {
        let rule = ExpiryWindowRule { window_days: 7 };
        let lot = lot_expiring_at(Some(now() + Duration::days(6)));
        assert_eq!(rule.recompute(&lot, now()), LotStatus::ExpiringSoon);
    }
}
