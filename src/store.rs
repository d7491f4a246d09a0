//! # Collaborator Traits
//!
//! The engine never talks to a database directly. Stock lots, recipes, the
//! consumption log, family membership and notifications sit behind the traits
//! below so the PostgreSQL implementation in [`crate::db`] and the in-memory one
//! in [`crate::memory`] are interchangeable.

use anyhow::anyhow;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::model::{ConsumptionLogEntry, LotStatus, NotificationRequest, Recipe, StockLot};
use crate::scope::{FamilyMembership, RecipeAccess, ScopeFilter};

/// New state for one stock lot, written only if its version is unchanged
#[derive(Debug, Clone, PartialEq)]
pub struct LotUpdate {
    pub lot_id: Uuid,
    /// Version the lot had when it was read
    pub expected_version: i64,
    pub quantity: rust_decimal::Decimal,
    pub status: LotStatus,
}

/// Result of a single compare-and-swap lot write
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveOutcome {
    Saved,
    /// The lot was changed (or removed) since it was read
    Conflict,
}

/// Result of writing a batch of lot updates
#[derive(Debug)]
pub enum ApplyOutcome {
    /// Every update landed
    Applied,
    /// A version check failed and nothing was written
    Conflict { lot_id: Uuid },
    /// The first write failed and nothing was written
    Failed { lot_id: Uuid, reason: anyhow::Error },
    /// Some writes landed before one failed
    Partial {
        applied: Vec<Uuid>,
        failed_lot: Uuid,
        reason: anyhow::Error,
    },
}

/// Stock lot storage
#[async_trait::async_trait]
pub trait InventoryStore: Send + Sync {
    /// Usable lots (status available or expiring soon, quantity above zero)
    /// inside `scope`, ordered by expiry date ascending with undated lots last.
    async fn find_usable_lots(&self, scope: &ScopeFilter) -> anyhow::Result<Vec<StockLot>>;

    /// Write one lot if it still has `update.expected_version`, bumping the version
    async fn save_lot(&self, update: &LotUpdate) -> anyhow::Result<SaveOutcome>;

    /// Write a batch of lot updates in order.
    ///
    /// The default walks the batch with [`InventoryStore::save_lot`]. A
    /// conflict on the first lot leaves everything untouched; any failure
    /// after that is reported as [`ApplyOutcome::Partial`]. Stores that can
    /// write the batch atomically should override this.
    async fn apply_lot_updates(&self, updates: &[LotUpdate]) -> ApplyOutcome {
        let mut applied = Vec::with_capacity(updates.len());

        for update in updates {
            let failure = match self.save_lot(update).await {
                Ok(SaveOutcome::Saved) => {
                    applied.push(update.lot_id);
                    continue;
                }
                Ok(SaveOutcome::Conflict) if applied.is_empty() => {
                    debug!("Version conflict on stock lot {}", update.lot_id);
                    return ApplyOutcome::Conflict {
                        lot_id: update.lot_id,
                    };
                }
                Ok(SaveOutcome::Conflict) => anyhow!(
                    "Stock lot {} changed concurrently after {} lot(s) were written",
                    update.lot_id,
                    applied.len()
                ),
                Err(err) => err,
            };

            if applied.is_empty() {
                return ApplyOutcome::Failed {
                    lot_id: update.lot_id,
                    reason: failure,
                };
            }
            warn!(
                "Stock lot {} write failed after {} successful write(s)",
                update.lot_id,
                applied.len()
            );
            return ApplyOutcome::Partial {
                applied,
                failed_lot: update.lot_id,
                reason: failure,
            };
        }

        ApplyOutcome::Applied
    }
}

/// Optional filters for recipe listings
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecipeQuery {
    pub category: Option<String>,
    pub difficulty: Option<String>,
    pub servings: Option<i32>,
}

impl RecipeQuery {
    pub fn matches(&self, recipe: &Recipe) -> bool {
        let category_ok = self
            .category
            .as_ref()
            .map_or(true, |category| recipe.category.as_ref() == Some(category));
        let difficulty_ok = self
            .difficulty
            .as_ref()
            .map_or(true, |difficulty| recipe.difficulty.as_ref() == Some(difficulty));
        let servings_ok = self
            .servings
            .map_or(true, |servings| recipe.servings == Some(servings));

        category_ok && difficulty_ok && servings_ok
    }
}

/// Recipe definitions with their ingredients resolved
#[async_trait::async_trait]
pub trait RecipeCatalog: Send + Sync {
    /// One recipe, `None` when missing or not visible under `access`
    async fn find_recipe(&self, recipe_id: Uuid, access: &RecipeAccess) -> anyhow::Result<Option<Recipe>>;

    /// Every recipe visible under `access` and matching `query`, in catalog order
    async fn find_recipes(&self, access: &RecipeAccess, query: &RecipeQuery) -> anyhow::Result<Vec<Recipe>>;
}

/// Append-only consumption audit trail
#[async_trait::async_trait]
pub trait ConsumptionLogSink: Send + Sync {
    async fn insert_entries(&self, entries: &[ConsumptionLogEntry]) -> anyhow::Result<()>;
}

#[async_trait::async_trait]
pub trait MembershipDirectory: Send + Sync {
    /// Family group of `user_id` with its members, if the user has one
    async fn family_of(&self, user_id: Uuid) -> anyhow::Result<Option<FamilyMembership>>;
}

/// Delivery side of notifications
#[async_trait::async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, request: &NotificationRequest) -> anyhow::Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;
    use std::collections::HashSet;
    use std::sync::Mutex;

    /// Lot store that conflicts or fails on chosen lots and records writes
    struct ScriptedStore {
        conflicts: HashSet<Uuid>,
        failures: HashSet<Uuid>,
        written: Mutex<Vec<Uuid>>,
    }

    impl ScriptedStore {
        fn new(conflicts: &[Uuid], failures: &[Uuid]) -> Self {
            Self {
                conflicts: conflicts.iter().copied().collect(),
                failures: failures.iter().copied().collect(),
                written: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait::async_trait]
    impl InventoryStore for ScriptedStore {
        async fn find_usable_lots(&self, _scope: &ScopeFilter) -> anyhow::Result<Vec<StockLot>> {
            Ok(Vec::new())
        }

        async fn save_lot(&self, update: &LotUpdate) -> anyhow::Result<SaveOutcome> {
            if self.failures.contains(&update.lot_id) {
                return Err(anyhow!("write refused"));
            }
            if self.conflicts.contains(&update.lot_id) {
                return Ok(SaveOutcome::Conflict);
            }
            self.written.lock().unwrap().push(update.lot_id);
            Ok(SaveOutcome::Saved)
        }
    }

    fn update(lot_id: Uuid) -> LotUpdate {
        LotUpdate {
            lot_id,
            expected_version: 0,
            quantity: Decimal::ZERO,
            status: LotStatus::UsedUp,
        }
    }

    #[tokio::test]
    async fn test_default_apply_writes_every_lot() {
        let ids = [Uuid::new_v4(), Uuid::new_v4()];
        let store = ScriptedStore::new(&[], &[]);

        let outcome = store.apply_lot_updates(&[update(ids[0]), update(ids[1])]).await;

        assert!(matches!(outcome, ApplyOutcome::Applied));
        assert_eq!(*store.written.lock().unwrap(), ids.to_vec());
    }

    #[tokio::test]
    async fn test_default_apply_conflict_on_first_lot_writes_nothing() {
        let ids = [Uuid::new_v4(), Uuid::new_v4()];
        let store = ScriptedStore::new(&[ids[0]], &[]);

        let outcome = store.apply_lot_updates(&[update(ids[0]), update(ids[1])]).await;

        assert!(matches!(outcome, ApplyOutcome::Conflict { lot_id } if lot_id == ids[0]));
        assert!(store.written.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_default_apply_reports_partial_write() {
        let ids = [Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4()];
        let store = ScriptedStore::new(&[], &[ids[1]]);

        let outcome = store
            .apply_lot_updates(&[update(ids[0]), update(ids[1]), update(ids[2])])
            .await;

        match outcome {
            ApplyOutcome::Partial {
                applied, failed_lot, ..
            } => {
                assert_eq!(applied, vec![ids[0]]);
                assert_eq!(failed_lot, ids[1]);
            }
            other => panic!("expected partial outcome, got {other:?}"),
        }
    }

    #[test]
    fn test_recipe_query_filters() {
        let mut recipe = Recipe::new(Uuid::new_v4(), "Pho").with_category("soup");
        recipe.difficulty = Some("easy".to_string());
        recipe.servings = Some(4);

        assert!(RecipeQuery::default().matches(&recipe));
        assert!(RecipeQuery {
            category: Some("soup".to_string()),
            servings: Some(4),
            ..Default::default()
        }
        .matches(&recipe));
        assert!(!RecipeQuery {
            difficulty: Some("hard".to_string()),
            ..Default::default()
        }
        .matches(&recipe));
    }
}
