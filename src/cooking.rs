//! # Cooking Transaction
//!
//! Cooking a recipe removes its ingredients from the fridge, soonest-expiring
//! lot first, and records one consumption log entry per lot drawn from.
//!
//! ## Phases
//!
//! ```text
//! Validating ──► Reserving ──► Committing ──► Done
//!     │              │              │
//!     └─► Rejected   └──────────────┴─► Failed
//! ```
//!
//! - **Validating**: reload the recipe and the lots in scope
//! - **Rejected**: some ingredient is short; nothing is written
//! - **Reserving**: plan every draw against a working copy of lot quantities
//! - **Committing**: write the lots (version-checked), then the log, then notify
//!
//! A version conflict while committing restarts the whole transaction from
//! Validating after a jittered delay. The commit itself runs on its own task,
//! so dropping the caller's future never leaves a cook half-written.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::aggregator::{sort_by_expiry, usable_lots};
use crate::config::{calculate_retry_delay, CookRetryConfig};
use crate::errors::{RecipeError, RecipeResult};
use crate::expiry::StatusRule;
use crate::matcher::MissingIngredient;
use crate::model::{ConsumptionLogEntry, ConsumptionSource, IngredientKey, LotStatus, Recipe, StockLot};
use crate::notify::{NotificationDispatcher, NotificationStatus};
use crate::scope::{Actor, RecipeAccess, ScopeFilter};
use crate::store::{ApplyOutcome, ConsumptionLogSink, InventoryStore, LotUpdate, RecipeCatalog};
use crate::validation::ValidatedRecipe;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CookPhase {
    Validating,
    Reserving,
    Committing,
    Done,
    Rejected,
    Failed,
}

impl CookPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            CookPhase::Validating => "validating",
            CookPhase::Reserving => "reserving",
            CookPhase::Committing => "committing",
            CookPhase::Done => "done",
            CookPhase::Rejected => "rejected",
            CookPhase::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, CookPhase::Done | CookPhase::Rejected | CookPhase::Failed)
    }

    /// Whether the state machine allows moving from `self` to `next`
    pub fn can_transition_to(&self, next: CookPhase) -> bool {
        use CookPhase::*;
        match (self, next) {
            (_, Failed) => !self.is_terminal(),
            (Validating, Reserving) | (Validating, Rejected) => true,
            (Reserving, Committing) => true,
            (Committing, Done) => true,
            // A version conflict restarts the attempt
            (Committing, Validating) => true,
            _ => false,
        }
    }
}

impl fmt::Display for CookPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One planned draw from one lot for one recipe line
#[derive(Debug, Clone, PartialEq)]
pub struct LotDraw {
    pub lot_id: Uuid,
    pub key: IngredientKey,
    pub quantity: Decimal,
}

/// Every write a cook will make, computed before anything is written
#[derive(Debug, Clone, PartialEq)]
pub struct CookPlan {
    /// Draws in recipe order, then expiry order
    pub draws: Vec<LotDraw>,
    /// Final state of every touched lot, in first-touch order
    pub updates: Vec<LotUpdate>,
}

/// Plan the draws for `recipe` over `lots`.
///
/// `lots` must already be usable and in expiry order. Recipe lines sharing an
/// `(ingredient, unit)` pair draw from the same working quantities, so the
/// second line only sees what the first left behind. Returns the complete
/// shortfall list when any line cannot be covered.
pub fn plan_draws(
    recipe: &ValidatedRecipe<'_>,
    lots: &[StockLot],
    rule: &dyn StatusRule,
    now: DateTime<Utc>,
) -> Result<CookPlan, Vec<MissingIngredient>> {
    let mut remaining: Vec<Decimal> = lots.iter().map(|lot| lot.quantity).collect();
    let mut by_key: HashMap<IngredientKey, Vec<usize>> = HashMap::new();
    for (index, lot) in lots.iter().enumerate() {
        if let Some(key) = lot.key() {
            by_key.entry(key).or_default().push(index);
        }
    }

    let mut draws = Vec::new();
    let mut touched: Vec<usize> = Vec::new();
    let mut missing = Vec::new();

    for ingredient in &recipe.valid {
        let indices = by_key.get(&ingredient.key).map(Vec::as_slice).unwrap_or(&[]);
        let available: Decimal = indices.iter().map(|&index| remaining[index]).sum();

        if available < ingredient.quantity {
            missing.push(MissingIngredient::new(ingredient, available));
            continue;
        }
        if !missing.is_empty() {
            // Already rejected; keep scanning only to report every shortfall
            continue;
        }

        let mut needed = ingredient.quantity;
        for &index in indices {
            if needed.is_zero() {
                break;
            }
            let take = needed.min(remaining[index]);
            if take.is_zero() {
                continue;
            }
            remaining[index] -= take;
            needed -= take;
            if !touched.contains(&index) {
                touched.push(index);
            }
            draws.push(LotDraw {
                lot_id: lots[index].id,
                key: ingredient.key,
                quantity: take,
            });
        }
    }

    if !missing.is_empty() {
        return Err(missing);
    }

    let updates = touched
        .into_iter()
        .map(|index| {
            let lot = &lots[index];
            let quantity = remaining[index];
            let status = if quantity.is_zero() {
                LotStatus::UsedUp
            } else {
                let mut after = lot.clone();
                after.quantity = quantity;
                rule.recompute(&after, now)
            };
            LotUpdate {
                lot_id: lot.id,
                expected_version: lot.version,
                quantity,
                status,
            }
        })
        .collect();

    Ok(CookPlan { draws, updates })
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CookedRecipe {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub servings: Option<i32>,
}

impl From<&Recipe> for CookedRecipe {
    fn from(recipe: &Recipe) -> Self {
        Self {
            id: recipe.id,
            name: recipe.name.clone(),
            description: recipe.description.clone(),
            servings: recipe.servings,
        }
    }
}

/// A lot after the cook wrote it
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdatedFridgeItem {
    pub id: Uuid,
    pub ingredient_name: String,
    pub quantity: Decimal,
    pub status: LotStatus,
}

/// Whether the consumption log write landed
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum AuditStatus {
    Recorded { entries: usize },
    /// Lots were decremented but the log insert failed
    Failed { reason: String },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CookOutcome {
    pub recipe: CookedRecipe,
    pub updated_fridge_items: Vec<UpdatedFridgeItem>,
    pub consumption: Vec<ConsumptionLogEntry>,
    pub audit: AuditStatus,
    pub notification: NotificationStatus,
    pub attempts: u32,
}

enum Attempt {
    Cooked(CookOutcome),
    Conflict { lot_id: Uuid },
}

/// Everything the commit task needs, owned so it can outlive the caller
struct Commit {
    inventory: Arc<dyn InventoryStore>,
    consumption_log: Arc<dyn ConsumptionLogSink>,
    dispatcher: Arc<NotificationDispatcher>,
    actor: Actor,
    scope: ScopeFilter,
    recipe: CookedRecipe,
    lots: Vec<StockLot>,
    plan: CookPlan,
    now: DateTime<Utc>,
    attempt: u32,
}

impl Commit {
    async fn run(self) -> RecipeResult<Attempt> {
        let recipe_id = self.recipe.id;

        match self.inventory.apply_lot_updates(&self.plan.updates).await {
            ApplyOutcome::Applied => {}
            ApplyOutcome::Conflict { lot_id } => return Ok(Attempt::Conflict { lot_id }),
            ApplyOutcome::Failed { lot_id, reason } => {
                error!("Cook of recipe {recipe_id} failed writing lot {lot_id}, nothing changed");
                return Err(RecipeError::Storage(reason));
            }
            ApplyOutcome::Partial {
                applied,
                failed_lot,
                reason,
            } => {
                error!(
                    "Cook of recipe {recipe_id} wrote {} lot(s) then failed at lot {failed_lot}: {:#}",
                    applied.len(),
                    reason
                );
                return Err(RecipeError::PartialMutation {
                    recipe_id,
                    applied_lots: applied,
                    failed_lot,
                    source: reason,
                });
            }
        }

        let names: HashMap<Uuid, &str> = self
            .lots
            .iter()
            .map(|lot| (lot.id, lot.ingredient_name()))
            .collect();
        let updated_fridge_items: Vec<UpdatedFridgeItem> = self
            .plan
            .updates
            .iter()
            .map(|update| UpdatedFridgeItem {
                id: update.lot_id,
                ingredient_name: names.get(&update.lot_id).copied().unwrap_or("Unknown").to_string(),
                quantity: update.quantity,
                status: update.status,
            })
            .collect();

        let consumption: Vec<ConsumptionLogEntry> = self
            .plan
            .draws
            .iter()
            .map(|draw| ConsumptionLogEntry {
                id: Uuid::new_v4(),
                user_id: self.actor.user_id,
                family_group_id: self.scope.family_group_id(),
                ingredient_id: draw.key.ingredient_id,
                unit_id: draw.key.unit_id,
                stock_lot_id: draw.lot_id,
                quantity: draw.quantity,
                source: ConsumptionSource::Recipe,
                recipe_id: Some(recipe_id),
                consumed_at: self.now,
            })
            .collect();

        let audit = match self.consumption_log.insert_entries(&consumption).await {
            Ok(()) => AuditStatus::Recorded {
                entries: consumption.len(),
            },
            Err(err) => {
                error!(
                    "Stock for recipe {recipe_id} was consumed but {} log entries were not recorded: {:#}",
                    consumption.len(),
                    err
                );
                AuditStatus::Failed {
                    reason: format!("{err:#}"),
                }
            }
        };

        let notification = self
            .dispatcher
            .notify_cooked(&self.actor, recipe_id, &self.recipe.name, &self.scope)
            .await;

        Ok(Attempt::Cooked(CookOutcome {
            recipe: self.recipe,
            updated_fridge_items,
            consumption,
            audit,
            notification,
            attempts: self.attempt,
        }))
    }
}

/// Runs cooks against the collaborators
pub struct CookingTransaction {
    inventory: Arc<dyn InventoryStore>,
    catalog: Arc<dyn RecipeCatalog>,
    consumption_log: Arc<dyn ConsumptionLogSink>,
    dispatcher: Arc<NotificationDispatcher>,
    status_rule: Arc<dyn StatusRule>,
    retry: CookRetryConfig,
}

impl CookingTransaction {
    pub fn new(
        inventory: Arc<dyn InventoryStore>,
        catalog: Arc<dyn RecipeCatalog>,
        consumption_log: Arc<dyn ConsumptionLogSink>,
        dispatcher: Arc<NotificationDispatcher>,
        status_rule: Arc<dyn StatusRule>,
        retry: CookRetryConfig,
    ) -> Self {
        Self {
            inventory,
            catalog,
            consumption_log,
            dispatcher,
            status_rule,
            retry,
        }
    }

    /// Cook `recipe_id` for `actor` from the lots visible in `scope`
    pub async fn cook(&self, actor: &Actor, scope: &ScopeFilter, recipe_id: Uuid) -> RecipeResult<CookOutcome> {
        let max_attempts = self.retry.max_attempts.max(1);

        for attempt in 1..=max_attempts {
            match self.attempt(actor, scope, recipe_id, attempt).await {
                Ok(Attempt::Cooked(outcome)) => {
                    info!(
                        "Cooked recipe {} for user {} in {} attempt(s), {} lot(s) updated",
                        recipe_id,
                        actor.user_id,
                        attempt,
                        outcome.updated_fridge_items.len()
                    );
                    return Ok(outcome);
                }
                Ok(Attempt::Conflict { lot_id }) => {
                    warn!(
                        "Stock lot {lot_id} changed while cooking recipe {recipe_id} (attempt {attempt}/{max_attempts})"
                    );
                    log_transition(recipe_id, CookPhase::Committing, CookPhase::Validating);
                    if attempt < max_attempts {
                        let delay = calculate_retry_delay(attempt, &self.retry);
                        tokio::time::sleep(Duration::from_millis(delay)).await;
                    }
                }
                Err(err) => {
                    let phase = match err {
                        RecipeError::InsufficientStock { .. } => CookPhase::Rejected,
                        _ => CookPhase::Failed,
                    };
                    debug!("Cook of recipe {recipe_id} ended {phase}: {err}");
                    return Err(err);
                }
            }
        }

        log_transition(recipe_id, CookPhase::Validating, CookPhase::Failed);
        Err(RecipeError::Conflict {
            recipe_id,
            attempts: max_attempts,
        })
    }

    async fn attempt(
        &self,
        actor: &Actor,
        scope: &ScopeFilter,
        recipe_id: Uuid,
        attempt: u32,
    ) -> RecipeResult<Attempt> {
        let now = Utc::now();

        let recipe = self
            .catalog
            .find_recipe(recipe_id, &RecipeAccess::for_user(actor.user_id))
            .await?
            .ok_or(RecipeError::NotFound(recipe_id))?;
        let validated = ValidatedRecipe::new(&recipe);
        if !validated.has_valid_ingredients() {
            return Err(RecipeError::InvalidRecipe { recipe_id });
        }

        let mut lots = usable_lots(&self.inventory.find_usable_lots(scope).await?);
        sort_by_expiry(&mut lots);

        log_transition(recipe_id, CookPhase::Validating, CookPhase::Reserving);
        let plan = match plan_draws(&validated, &lots, self.status_rule.as_ref(), now) {
            Ok(plan) => plan,
            Err(missing) => {
                info!(
                    "Not enough stock to cook recipe {}: {} ingredient(s) short",
                    recipe_id,
                    missing.len()
                );
                return Err(RecipeError::InsufficientStock { recipe_id, missing });
            }
        };

        log_transition(recipe_id, CookPhase::Reserving, CookPhase::Committing);
        let commit = Commit {
            inventory: Arc::clone(&self.inventory),
            consumption_log: Arc::clone(&self.consumption_log),
            dispatcher: Arc::clone(&self.dispatcher),
            actor: actor.clone(),
            scope: scope.clone(),
            recipe: CookedRecipe::from(&recipe),
            lots,
            plan,
            now,
            attempt,
        };

        let result = tokio::spawn(commit.run()).await.map_err(|err| {
            RecipeError::Storage(anyhow::anyhow!("Commit task for recipe {recipe_id} did not finish: {err}"))
        })?;

        if let Ok(Attempt::Cooked(_)) = &result {
            log_transition(recipe_id, CookPhase::Committing, CookPhase::Done);
        }
        result
    }
}

fn log_transition(recipe_id: Uuid, from: CookPhase, to: CookPhase) {
    if !from.can_transition_to(to) {
        warn!("Unexpected cook phase change for recipe {recipe_id}: {from} -> {to}");
    }
    debug!("Cook of recipe {recipe_id}: {from} -> {to}");
}
