//! # Recipe Ranker
//!
//! Scores every visible recipe against the fridge and orders the result so the
//! recipes that use up soon-to-expire stock come first.
//!
//! ## Scoring
//!
//! - **Match percentage**: share of valid ingredients the fridge can cover,
//!   rounded to a whole percent
//! - **Expiring score**: for each covered ingredient whose soonest lot is
//!   expiring soon with at most three days left,
//!   `(4 - days_left) * required_quantity`, rounded to two decimals
//!
//! Recipes with any unresolved ingredient line are left out entirely.
//!
//! Results sort by expiring score, then match percentage, both descending.
//! The sort is stable, so catalog order breaks remaining ties.

use rust_decimal::{Decimal, RoundingStrategy};
use serde::Serialize;
use std::collections::HashSet;
use tracing::debug;
use uuid::Uuid;

use crate::aggregator::AvailabilityMap;
use crate::matcher::{match_recipe, AvailableIngredient, MatchResult, MissingIngredient};
use crate::model::{LotStatus, Recipe};
use crate::validation::ValidatedRecipe;

/// One scored recipe in a suggestion response
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecipeSuggestion {
    pub recipe_id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub servings: Option<i32>,
    pub category: Option<String>,
    pub difficulty: Option<String>,
    pub match_percentage: u8,
    pub expiring_score: Decimal,
    pub available_ingredients: Vec<AvailableIngredient>,
    pub missing_ingredients: Vec<MissingIngredient>,
}

/// Days ahead an expiring-soon lot still adds to a recipe's score.
///
/// Fixed; the lot status window is configured separately.
pub const EXPIRING_SCORE_HORIZON_DAYS: i64 = 3;

/// `round(100 * available / total)`, half rounding up; 0 when `total` is 0
pub fn match_percentage(available: usize, total: usize) -> u8 {
    if total == 0 {
        return 0;
    }
    let available = available.min(total);
    ((200 * available + total) / (2 * total)) as u8
}

/// Urgency score of the ingredients a recipe would consume
pub fn expiring_score(matched: &MatchResult, availability: &AvailabilityMap) -> Decimal {
    let mut score = Decimal::ZERO;

    for ingredient in &matched.available_ingredients {
        let Some(entry) = availability.get(&ingredient.key()) else {
            continue;
        };
        if entry.status != LotStatus::ExpiringSoon {
            continue;
        }
        if entry.days_left < 0 || entry.days_left > EXPIRING_SCORE_HORIZON_DAYS {
            continue;
        }
        let weight = Decimal::from(EXPIRING_SCORE_HORIZON_DAYS + 1 - entry.days_left);
        score += weight * ingredient.required_quantity;
    }

    score.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

/// Score one recipe; `None` unless every declared ingredient resolves
pub fn score_recipe(recipe: &Recipe, availability: &AvailabilityMap) -> Option<RecipeSuggestion> {
    let validated = ValidatedRecipe::new(recipe);
    if !is_suggestable(&validated) {
        debug!(
            "Recipe {} has {} unresolved of {} ingredient(s), not suggesting it",
            recipe.id,
            validated.invalid.len(),
            validated.declared_count()
        );
        return None;
    }

    let matched = match_recipe(&validated, availability);
    let percentage = match_percentage(matched.available_ingredients.len(), validated.valid.len());
    let score = expiring_score(&matched, availability);

    Some(RecipeSuggestion {
        recipe_id: recipe.id,
        name: recipe.name.clone(),
        description: recipe.description.clone(),
        servings: recipe.servings,
        category: recipe.category.clone(),
        difficulty: recipe.difficulty.clone(),
        match_percentage: percentage,
        expiring_score: score,
        available_ingredients: matched.available_ingredients,
        missing_ingredients: matched.missing_ingredients,
    })
}

/// Score and order `recipes` against the fridge
pub fn rank_recipes(recipes: &[Recipe], availability: &AvailabilityMap) -> Vec<RecipeSuggestion> {
    let mut suggestions: Vec<RecipeSuggestion> = recipes
        .iter()
        .filter_map(|recipe| score_recipe(recipe, availability))
        .collect();

    suggestions.sort_by(|a, b| {
        b.expiring_score
            .cmp(&a.expiring_score)
            .then_with(|| b.match_percentage.cmp(&a.match_percentage))
    });

    suggestions
}

fn is_suggestable(validated: &ValidatedRecipe<'_>) -> bool {
    validated.is_consistent() && validated.has_valid_ingredients()
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchIngredient {
    pub ingredient_id: Uuid,
    pub ingredient_name: String,
    pub available: bool,
}

/// A recipe matched against a set of ingredient ids the caller has on hand
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IngredientSearchHit {
    pub recipe_id: Uuid,
    pub recipe_name: String,
    pub ingredients: Vec<SearchIngredient>,
    pub match_percentage: u8,
}

/// Rank recipes by how many of their ingredients appear in `ingredient_ids`.
///
/// Units are ignored. With no ids given every ingredient counts as available.
pub fn search_by_ingredients(recipes: &[Recipe], ingredient_ids: &[Uuid]) -> Vec<IngredientSearchHit> {
    let wanted: HashSet<Uuid> = ingredient_ids.iter().copied().collect();

    let mut hits: Vec<IngredientSearchHit> = recipes
        .iter()
        .filter_map(|recipe| {
            let validated = ValidatedRecipe::new(recipe);
            if !is_suggestable(&validated) {
                return None;
            }

            let ingredients: Vec<SearchIngredient> = validated
                .valid
                .iter()
                .map(|ingredient| SearchIngredient {
                    ingredient_id: ingredient.ingredient.id,
                    ingredient_name: ingredient.ingredient.name.clone(),
                    available: wanted.is_empty() || wanted.contains(&ingredient.ingredient.id),
                })
                .collect();
            let available = ingredients.iter().filter(|i| i.available).count();

            Some(IngredientSearchHit {
                recipe_id: recipe.id,
                recipe_name: recipe.name.clone(),
                match_percentage: match_percentage(available, ingredients.len()),
                ingredients,
            })
        })
        .collect();

    hits.sort_by(|a, b| b.match_percentage.cmp(&a.match_percentage));
    hits
}
