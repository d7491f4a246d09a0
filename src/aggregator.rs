//! # Inventory Aggregator
//!
//! Collapses the stock lots visible in a scope into one [`AvailabilityEntry`]
//! per `(ingredient, unit)` pair. Each entry sums the usable quantity and carries
//! the status and days-left of the soonest-expiring lot behind it.
//!
//! Aggregation is a pure function of the lots and the clock; the resulting
//! [`AvailabilityMap`] is rebuilt per request and never shared.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use std::cmp::Ordering;
use std::collections::HashMap;
use tracing::{debug, warn};

use crate::expiry;
use crate::model::{IngredientKey, IngredientRef, LotStatus, StockLot, UnitRef};

/// Aggregated stock for one ingredient in one unit
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AvailabilityEntry {
    pub key: IngredientKey,
    pub ingredient: IngredientRef,
    pub unit: UnitRef,
    /// Sum over all usable lots
    pub quantity: Decimal,
    /// Expiry of the soonest-expiring lot
    pub nearest_expiry: Option<DateTime<Utc>>,
    /// Status of the soonest-expiring lot
    pub status: LotStatus,
    /// Days left on the soonest-expiring lot; may be negative
    pub days_left: i64,
    pub lot_count: usize,
}

/// Immutable availability lookup keyed by `(ingredient, unit)`
#[derive(Debug, Clone, Default)]
pub struct AvailabilityMap {
    entries: HashMap<IngredientKey, AvailabilityEntry>,
}

impl AvailabilityMap {
    pub fn get(&self, key: &IngredientKey) -> Option<&AvailabilityEntry> {
        self.entries.get(key)
    }

    /// Available quantity for `key`, zero when nothing is in stock
    pub fn quantity_of(&self, key: &IngredientKey) -> Decimal {
        self.entries
            .get(key)
            .map(|entry| entry.quantity)
            .unwrap_or(Decimal::ZERO)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &AvailabilityEntry> {
        self.entries.values()
    }
}

/// Order lots by expiry date ascending; lots without an expiry date go last.
///
/// The sort is stable, so lots with equal expiry keep their fetch order.
pub fn sort_by_expiry(lots: &mut [StockLot]) {
    lots.sort_by(|a, b| compare_expiry(a.expiry_date, b.expiry_date));
}

fn compare_expiry(a: Option<DateTime<Utc>>, b: Option<DateTime<Utc>>) -> Ordering {
    match (a, b) {
        (Some(a), Some(b)) => a.cmp(&b),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

/// Keep usable lots whose references resolve, logging the ones dropped
pub fn usable_lots(lots: &[StockLot]) -> Vec<StockLot> {
    lots.iter()
        .filter(|lot| lot.is_usable())
        .filter(|lot| {
            let resolved = lot.key().is_some();
            if !resolved {
                warn!(
                    "Skipping stock lot {} with unresolved ingredient or unit reference",
                    lot.id
                );
            }
            resolved
        })
        .cloned()
        .collect()
}

/// Build the availability map for `lots` as of `now`
pub fn aggregate(lots: &[StockLot], now: DateTime<Utc>) -> AvailabilityMap {
    let mut usable = usable_lots(lots);
    sort_by_expiry(&mut usable);

    let mut entries: HashMap<IngredientKey, AvailabilityEntry> = HashMap::new();

    for lot in usable {
        let (Some(key), Some(ingredient), Some(unit)) = (lot.key(), lot.ingredient, lot.unit)
        else {
            continue;
        };

        // Lots arrive soonest-expiring first, so the first lot of a key
        // already carries the nearest expiry.
        if let Some(existing) = entries.get_mut(&key) {
            existing.quantity += lot.quantity;
            existing.lot_count += 1;
            continue;
        }

        let days_left = match lot.expiry_date {
            Some(expiry) => expiry::days_left(expiry, now),
            None => {
                warn!("Stock lot {} has no expiry date, treating days left as 0", lot.id);
                0
            }
        };

        entries.insert(
            key,
            AvailabilityEntry {
                key,
                ingredient,
                unit,
                quantity: lot.quantity,
                nearest_expiry: lot.expiry_date,
                status: lot.status,
                days_left,
                lot_count: 1,
            },
        );
    }

    debug!("Aggregated {} stock lots into {} entries", lots.len(), entries.len());
    AvailabilityMap { entries }
}
