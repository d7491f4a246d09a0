//! # Recipe Engine
//!
//! Entry points tying scope resolution, aggregation, matching, ranking and
//! cooking to the collaborators.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use fridge_recipes::config::EngineConfig;
//! use fridge_recipes::memory::InMemoryStore;
//! use fridge_recipes::scope::{Actor, ScopeKind};
//! use fridge_recipes::service::{Collaborators, RecipeEngine};
//! use fridge_recipes::store::RecipeQuery;
//! use uuid::Uuid;
//!
//! # async fn run() -> anyhow::Result<()> {
//! let engine = RecipeEngine::new(
//!     Collaborators::from_store(InMemoryStore::new()),
//!     &EngineConfig::default(),
//! )?;
//! let me = Actor::new(Uuid::new_v4());
//! let suggestions = engine.suggest(&me, ScopeKind::Personal, &RecipeQuery::default()).await?;
//! println!("{} recipes", suggestions.len());
//! # Ok(())
//! # }
//! ```

use anyhow::Context;
use chrono::Utc;
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

use crate::aggregator::{aggregate, AvailabilityMap};
use crate::config::EngineConfig;
use crate::cooking::{CookOutcome, CookingTransaction};
use crate::errors::{RecipeError, RecipeResult};
use crate::expiry::{ExpiryWindowRule, StatusRule};
use crate::localization::LocalizationManager;
use crate::matcher::{match_recipe, AvailableIngredient, MissingIngredient};
use crate::notify::NotificationDispatcher;
use crate::ranker::{rank_recipes, search_by_ingredients, IngredientSearchHit, RecipeSuggestion};
use crate::scope::{self, Actor, RecipeAccess, ScopeFilter, ScopeKind};
use crate::store::{
    ConsumptionLogSink, InventoryStore, MembershipDirectory, Notifier, RecipeCatalog, RecipeQuery,
};
use crate::validation::ValidatedRecipe;

/// The collaborators an engine runs against
#[derive(Clone)]
pub struct Collaborators {
    pub inventory: Arc<dyn InventoryStore>,
    pub catalog: Arc<dyn RecipeCatalog>,
    pub consumption_log: Arc<dyn ConsumptionLogSink>,
    pub directory: Arc<dyn MembershipDirectory>,
    pub notifier: Arc<dyn Notifier>,
}

impl Collaborators {
    /// Use one store for every collaborator
    pub fn from_store<S>(store: S) -> Self
    where
        S: InventoryStore + RecipeCatalog + ConsumptionLogSink + MembershipDirectory + Notifier + 'static,
    {
        let store = Arc::new(store);
        Self {
            inventory: store.clone(),
            catalog: store.clone(),
            consumption_log: store.clone(),
            directory: store.clone(),
            notifier: store,
        }
    }
}

/// Ingredient check for one recipe against the caller's fridge
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IngredientCheck {
    pub recipe_id: Uuid,
    pub name: String,
    pub can_cook: bool,
    pub available_ingredients: Vec<AvailableIngredient>,
    pub missing_ingredients: Vec<MissingIngredient>,
    pub skipped_ingredients: usize,
}

pub struct RecipeEngine {
    inventory: Arc<dyn InventoryStore>,
    catalog: Arc<dyn RecipeCatalog>,
    directory: Arc<dyn MembershipDirectory>,
    cooking: CookingTransaction,
}

impl RecipeEngine {
    pub fn new(collaborators: Collaborators, config: &EngineConfig) -> anyhow::Result<Self> {
        let localization =
            Arc::new(LocalizationManager::new().context("Failed to load notification messages")?);
        let status_rule: Arc<dyn StatusRule> = Arc::new(ExpiryWindowRule {
            window_days: config.expiring_soon_window_days,
        });
        Ok(Self::with_status_rule(collaborators, config, localization, status_rule))
    }

    /// Build an engine with a custom lot status rule
    pub fn with_status_rule(
        collaborators: Collaborators,
        config: &EngineConfig,
        localization: Arc<LocalizationManager>,
        status_rule: Arc<dyn StatusRule>,
    ) -> Self {
        let dispatcher = Arc::new(NotificationDispatcher::new(
            collaborators.notifier,
            localization,
            &config.notifications,
        ));
        let cooking = CookingTransaction::new(
            Arc::clone(&collaborators.inventory),
            Arc::clone(&collaborators.catalog),
            collaborators.consumption_log,
            dispatcher,
            status_rule,
            config.retry.clone(),
        );

        Self {
            inventory: collaborators.inventory,
            catalog: collaborators.catalog,
            directory: collaborators.directory,
            cooking,
        }
    }

    async fn resolve_scope(&self, actor: &Actor, requested: ScopeKind) -> RecipeResult<ScopeFilter> {
        Ok(scope::resolve(self.directory.as_ref(), actor.user_id, requested).await?)
    }

    async fn availability(&self, filter: &ScopeFilter) -> RecipeResult<AvailabilityMap> {
        let lots = self.inventory.find_usable_lots(filter).await?;
        Ok(aggregate(&lots, Utc::now()))
    }

    /// Rank every visible recipe against the caller's fridge
    pub async fn suggest(
        &self,
        actor: &Actor,
        requested: ScopeKind,
        query: &RecipeQuery,
    ) -> RecipeResult<Vec<RecipeSuggestion>> {
        let filter = self.resolve_scope(actor, requested).await?;
        let availability = self.availability(&filter).await?;
        let recipes = self
            .catalog
            .find_recipes(&RecipeAccess::for_user(actor.user_id), query)
            .await?;

        let suggestions = rank_recipes(&recipes, &availability);
        info!(
            "Suggested {} of {} recipes for user {} ({} scope, {} ingredients in stock)",
            suggestions.len(),
            recipes.len(),
            actor.user_id,
            filter.kind(),
            availability.len()
        );
        Ok(suggestions)
    }

    /// Which ingredients of one recipe the caller has and lacks
    pub async fn check_ingredients(
        &self,
        actor: &Actor,
        requested: ScopeKind,
        recipe_id: Uuid,
    ) -> RecipeResult<IngredientCheck> {
        let recipe = self
            .catalog
            .find_recipe(recipe_id, &RecipeAccess::for_user(actor.user_id))
            .await?
            .ok_or(RecipeError::NotFound(recipe_id))?;
        let validated = ValidatedRecipe::new(&recipe);
        if !validated.has_valid_ingredients() {
            return Err(RecipeError::InvalidRecipe { recipe_id });
        }

        let filter = self.resolve_scope(actor, requested).await?;
        let availability = self.availability(&filter).await?;
        let matched = match_recipe(&validated, &availability);
        debug!(
            "Recipe {}: {} available, {} missing",
            recipe_id,
            matched.available_ingredients.len(),
            matched.missing_ingredients.len()
        );

        Ok(IngredientCheck {
            recipe_id,
            name: recipe.name.clone(),
            can_cook: matched.is_complete(),
            available_ingredients: matched.available_ingredients,
            missing_ingredients: matched.missing_ingredients,
            skipped_ingredients: validated.invalid.len(),
        })
    }

    /// Cook a recipe, consuming stock from the caller's fridge
    pub async fn cook(&self, actor: &Actor, requested: ScopeKind, recipe_id: Uuid) -> RecipeResult<CookOutcome> {
        let filter = self.resolve_scope(actor, requested).await?;
        self.cooking.cook(actor, &filter, recipe_id).await
    }

    /// Rank visible recipes by how many of their ingredients are in `ingredient_ids`
    pub async fn search_by_ingredients(
        &self,
        viewer: Option<&Actor>,
        ingredient_ids: &[Uuid],
        query: &RecipeQuery,
    ) -> RecipeResult<Vec<IngredientSearchHit>> {
        let access = match viewer {
            Some(actor) => RecipeAccess::for_user(actor.user_id),
            None => RecipeAccess::anonymous(),
        };
        let recipes = self.catalog.find_recipes(&access, query).await?;
        Ok(search_by_ingredients(&recipes, ingredient_ids))
    }
}
