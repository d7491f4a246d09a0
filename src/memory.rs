//! In-memory collaborators, used by the `demo` command and the test suite.

use anyhow::anyhow;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

use crate::aggregator::sort_by_expiry;
use crate::model::{ConsumptionLogEntry, NotificationRequest, Recipe, StockLot};
use crate::scope::{FamilyMembership, RecipeAccess, ScopeFilter};
use crate::store::{
    ApplyOutcome, ConsumptionLogSink, InventoryStore, LotUpdate, MembershipDirectory, Notifier,
    RecipeCatalog, RecipeQuery, SaveOutcome,
};

#[derive(Debug, Default)]
struct Tables {
    lots: Vec<StockLot>,
    recipes: Vec<Recipe>,
    families: Vec<FamilyMembership>,
    consumption_log: Vec<ConsumptionLogEntry>,
    notifications: Vec<NotificationRequest>,
}

/// Every collaborator backed by one shared set of in-process tables
#[derive(Debug, Clone, Default)]
pub struct InMemoryStore {
    tables: Arc<RwLock<Tables>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn add_lot(&self, lot: StockLot) {
        self.tables.write().await.lots.push(lot);
    }

    pub async fn add_recipe(&self, recipe: Recipe) {
        self.tables.write().await.recipes.push(recipe);
    }

    pub async fn add_family(&self, family: FamilyMembership) {
        self.tables.write().await.families.push(family);
    }

    pub async fn lot(&self, lot_id: Uuid) -> Option<StockLot> {
        self.tables
            .read()
            .await
            .lots
            .iter()
            .find(|lot| lot.id == lot_id)
            .cloned()
    }

    pub async fn lots(&self) -> Vec<StockLot> {
        self.tables.read().await.lots.clone()
    }

    pub async fn consumption_log(&self) -> Vec<ConsumptionLogEntry> {
        self.tables.read().await.consumption_log.clone()
    }

    pub async fn notifications(&self) -> Vec<NotificationRequest> {
        self.tables.read().await.notifications.clone()
    }
}

fn write_lot(lot: &mut StockLot, update: &LotUpdate) {
    lot.quantity = update.quantity;
    lot.status = update.status;
    lot.version += 1;
}

#[async_trait::async_trait]
impl InventoryStore for InMemoryStore {
    async fn find_usable_lots(&self, scope: &ScopeFilter) -> anyhow::Result<Vec<StockLot>> {
        let tables = self.tables.read().await;
        let mut lots: Vec<StockLot> = tables
            .lots
            .iter()
            .filter(|lot| lot.is_usable() && scope.matches(lot.user_id, lot.family_group_id))
            .cloned()
            .collect();
        drop(tables);

        // Insertion order stands in for acquisition order on equal expiry
        sort_by_expiry(&mut lots);
        debug!("Found {} usable lots in {} scope", lots.len(), scope.kind());
        Ok(lots)
    }

    async fn save_lot(&self, update: &LotUpdate) -> anyhow::Result<SaveOutcome> {
        let mut tables = self.tables.write().await;
        match tables.lots.iter_mut().find(|lot| lot.id == update.lot_id) {
            Some(lot) if lot.version == update.expected_version => {
                write_lot(lot, update);
                Ok(SaveOutcome::Saved)
            }
            _ => Ok(SaveOutcome::Conflict),
        }
    }

    /// Checks every version first, then writes the whole batch under one lock
    async fn apply_lot_updates(&self, updates: &[LotUpdate]) -> ApplyOutcome {
        let mut tables = self.tables.write().await;

        let positions: HashMap<Uuid, usize> = tables
            .lots
            .iter()
            .enumerate()
            .map(|(index, lot)| (lot.id, index))
            .collect();

        for update in updates {
            let current = positions
                .get(&update.lot_id)
                .map(|&index| tables.lots[index].version);
            if current != Some(update.expected_version) {
                return ApplyOutcome::Conflict {
                    lot_id: update.lot_id,
                };
            }
        }

        for update in updates {
            if let Some(&index) = positions.get(&update.lot_id) {
                write_lot(&mut tables.lots[index], update);
            }
        }

        ApplyOutcome::Applied
    }
}

#[async_trait::async_trait]
impl RecipeCatalog for InMemoryStore {
    async fn find_recipe(&self, recipe_id: Uuid, access: &RecipeAccess) -> anyhow::Result<Option<Recipe>> {
        Ok(self
            .tables
            .read()
            .await
            .recipes
            .iter()
            .find(|recipe| recipe.id == recipe_id && access.permits(recipe))
            .cloned())
    }

    async fn find_recipes(&self, access: &RecipeAccess, query: &RecipeQuery) -> anyhow::Result<Vec<Recipe>> {
        Ok(self
            .tables
            .read()
            .await
            .recipes
            .iter()
            .filter(|recipe| access.permits(recipe) && query.matches(recipe))
            .cloned()
            .collect())
    }
}

#[async_trait::async_trait]
impl ConsumptionLogSink for InMemoryStore {
    async fn insert_entries(&self, entries: &[ConsumptionLogEntry]) -> anyhow::Result<()> {
        self.tables
            .write()
            .await
            .consumption_log
            .extend_from_slice(entries);
        Ok(())
    }
}

#[async_trait::async_trait]
impl MembershipDirectory for InMemoryStore {
    async fn family_of(&self, user_id: Uuid) -> anyhow::Result<Option<FamilyMembership>> {
        let tables = self.tables.read().await;
        let mut groups = tables
            .families
            .iter()
            .filter(|family| family.member_ids.contains(&user_id));

        let first = groups.next().cloned();
        if groups.next().is_some() {
            return Err(anyhow!("User {user_id} belongs to more than one family group"));
        }
        Ok(first)
    }
}

#[async_trait::async_trait]
impl Notifier for InMemoryStore {
    async fn notify(&self, request: &NotificationRequest) -> anyhow::Result<()> {
        self.tables.write().await.notifications.push(request.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{IngredientRef, LotStatus, UnitRef};
    use chrono::{Duration, Utc};
    use rust_decimal::Decimal;

    fn lot(owner: Uuid, days: i64) -> StockLot {
        StockLot::new(
            owner,
            IngredientRef::new(Uuid::new_v4(), "rice"),
            UnitRef::new(Uuid::new_v4(), "kg"),
            Decimal::ONE,
            Utc::now() + Duration::days(days),
        )
    }

    fn used_up(lot: &StockLot) -> LotUpdate {
        LotUpdate {
            lot_id: lot.id,
            expected_version: lot.version,
            quantity: Decimal::ZERO,
            status: LotStatus::UsedUp,
        }
    }

    #[tokio::test]
    async fn test_find_usable_lots_filters_scope_and_sorts() {
        let store = InMemoryStore::new();
        let me = Uuid::new_v4();
        let late = lot(me, 9);
        let early = lot(me, 1);
        let someone_else = lot(Uuid::new_v4(), 1);
        let expired = lot(me, -1).with_status(LotStatus::Expired);
        for lot in [late.clone(), early.clone(), someone_else, expired] {
            store.add_lot(lot).await;
        }

        let found = store.find_usable_lots(&ScopeFilter::personal(me)).await.unwrap();

        assert_eq!(
            found.iter().map(|lot| lot.id).collect::<Vec<_>>(),
            vec![early.id, late.id]
        );
    }

    #[tokio::test]
    async fn test_save_lot_checks_version() {
        let store = InMemoryStore::new();
        let stored = lot(Uuid::new_v4(), 2);
        store.add_lot(stored.clone()).await;

        assert_eq!(store.save_lot(&used_up(&stored)).await.unwrap(), SaveOutcome::Saved);
        // Same expected version again is now stale
        assert_eq!(store.save_lot(&used_up(&stored)).await.unwrap(), SaveOutcome::Conflict);

        let current = store.lot(stored.id).await.unwrap();
        assert_eq!(current.version, 1);
        assert_eq!(current.status, LotStatus::UsedUp);
    }

    #[tokio::test]
    async fn test_batch_with_stale_lot_writes_nothing() {
        let store = InMemoryStore::new();
        let first = lot(Uuid::new_v4(), 1);
        let mut stale = lot(Uuid::new_v4(), 2);
        store.add_lot(first.clone()).await;
        store.add_lot(stale.clone()).await;
        stale.version = 7;

        let outcome = store.apply_lot_updates(&[used_up(&first), used_up(&stale)]).await;

        assert!(matches!(outcome, ApplyOutcome::Conflict { lot_id } if lot_id == stale.id));
        assert_eq!(store.lot(first.id).await.unwrap().quantity, Decimal::ONE);
    }

    #[tokio::test]
    async fn test_family_lookup() {
        let store = InMemoryStore::new();
        let member = Uuid::new_v4();
        let family = FamilyMembership {
            family_group_id: Uuid::new_v4(),
            name: None,
            member_ids: vec![member],
        };
        store.add_family(family.clone()).await;

        assert_eq!(store.family_of(member).await.unwrap(), Some(family));
        assert_eq!(store.family_of(Uuid::new_v4()).await.unwrap(), None);
    }
}
