//! Classify a recipe's ingredients against available stock.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::aggregator::AvailabilityMap;
use crate::model::IngredientKey;
use crate::validation::{ValidIngredient, ValidatedRecipe};

/// An ingredient the fridge holds enough of
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AvailableIngredient {
    pub ingredient_id: Uuid,
    pub ingredient_name: String,
    pub unit_id: Uuid,
    pub unit_name: String,
    pub required_quantity: Decimal,
    pub available_quantity: Decimal,
}

impl AvailableIngredient {
    pub fn key(&self) -> IngredientKey {
        IngredientKey::new(self.ingredient_id, self.unit_id)
    }
}

/// An ingredient the fridge lacks, fully or partly
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MissingIngredient {
    pub ingredient_id: Uuid,
    pub ingredient_name: String,
    pub unit_id: Uuid,
    pub unit_name: String,
    pub required_quantity: Decimal,
    pub available_quantity: Decimal,
    pub missing_quantity: Decimal,
}

impl MissingIngredient {
    pub fn new(ingredient: &ValidIngredient<'_>, available: Decimal) -> Self {
        Self {
            ingredient_id: ingredient.ingredient.id,
            ingredient_name: ingredient.ingredient.name.clone(),
            unit_id: ingredient.unit.id,
            unit_name: ingredient.unit.label().to_string(),
            required_quantity: ingredient.quantity,
            available_quantity: available,
            missing_quantity: ingredient.quantity - available,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchResult {
    pub available_ingredients: Vec<AvailableIngredient>,
    pub missing_ingredients: Vec<MissingIngredient>,
}

impl MatchResult {
    /// Number of ingredients classified either way
    pub fn total(&self) -> usize {
        self.available_ingredients.len() + self.missing_ingredients.len()
    }

    pub fn is_complete(&self) -> bool {
        self.missing_ingredients.is_empty()
    }
}

/// Split the valid ingredients of `recipe` into available and missing.
///
/// Units must match exactly; no conversion is attempted.
pub fn match_recipe(recipe: &ValidatedRecipe<'_>, availability: &AvailabilityMap) -> MatchResult {
    let mut result = MatchResult::default();

    for ingredient in &recipe.valid {
        let in_stock = availability.quantity_of(&ingredient.key);

        if availability.get(&ingredient.key).is_some() && in_stock >= ingredient.quantity {
            result.available_ingredients.push(AvailableIngredient {
                ingredient_id: ingredient.ingredient.id,
                ingredient_name: ingredient.ingredient.name.clone(),
                unit_id: ingredient.unit.id,
                unit_name: ingredient.unit.label().to_string(),
                required_quantity: ingredient.quantity,
                available_quantity: in_stock,
            });
        } else {
            result
                .missing_ingredients
                .push(MissingIngredient::new(ingredient, in_stock));
        }
    }

    result
}
