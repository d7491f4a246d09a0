//! Single validation pass over a recipe's ingredient list.
//!
//! Upstream recipe data may carry dangling ingredient or unit references. Every
//! ingredient is tagged [`CheckedIngredient::Valid`] or
//! [`CheckedIngredient::Invalid`] once, so matching and cooking only ever see
//! fully-resolved inputs.

use rust_decimal::Decimal;
use serde::Serialize;
use std::fmt;
use tracing::warn;
use uuid::Uuid;

use crate::model::{IngredientKey, IngredientRef, Recipe, RecipeIngredient, UnitRef};

/// Why a recipe ingredient was excluded
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum InvalidReason {
    MissingIngredient,
    MissingUnit,
    NonPositiveQuantity,
}

impl fmt::Display for InvalidReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InvalidReason::MissingIngredient => write!(f, "ingredient reference missing"),
            InvalidReason::MissingUnit => write!(f, "unit reference missing"),
            InvalidReason::NonPositiveQuantity => write!(f, "required quantity is not positive"),
        }
    }
}

/// A recipe ingredient with both references resolved
#[derive(Debug, Clone, PartialEq)]
pub struct ValidIngredient<'a> {
    /// Position in the recipe's declared ingredient list
    pub position: usize,
    pub key: IngredientKey,
    pub ingredient: &'a IngredientRef,
    pub unit: &'a UnitRef,
    pub quantity: Decimal,
}

#[derive(Debug, Clone, PartialEq)]
pub enum CheckedIngredient<'a> {
    Valid(ValidIngredient<'a>),
    Invalid { position: usize, reason: InvalidReason },
}

/// Tag one ingredient
pub fn check_ingredient(position: usize, ingredient: &RecipeIngredient) -> CheckedIngredient<'_> {
    let Some(food) = ingredient.ingredient.as_ref() else {
        return CheckedIngredient::Invalid {
            position,
            reason: InvalidReason::MissingIngredient,
        };
    };
    let Some(unit) = ingredient.unit.as_ref() else {
        return CheckedIngredient::Invalid {
            position,
            reason: InvalidReason::MissingUnit,
        };
    };
    if ingredient.quantity <= Decimal::ZERO {
        return CheckedIngredient::Invalid {
            position,
            reason: InvalidReason::NonPositiveQuantity,
        };
    }

    CheckedIngredient::Valid(ValidIngredient {
        position,
        key: IngredientKey::new(food.id, unit.id),
        ingredient: food,
        unit,
        quantity: ingredient.quantity,
    })
}

/// A recipe split into its valid and invalid ingredients
#[derive(Debug, Clone)]
pub struct ValidatedRecipe<'a> {
    pub recipe: &'a Recipe,
    pub valid: Vec<ValidIngredient<'a>>,
    pub invalid: Vec<(usize, InvalidReason)>,
}

impl<'a> ValidatedRecipe<'a> {
    pub fn new(recipe: &'a Recipe) -> Self {
        let mut valid = Vec::with_capacity(recipe.ingredients.len());
        let mut invalid = Vec::new();

        for (position, ingredient) in recipe.ingredients.iter().enumerate() {
            match check_ingredient(position, ingredient) {
                CheckedIngredient::Valid(checked) => valid.push(checked),
                CheckedIngredient::Invalid { position, reason } => invalid.push((position, reason)),
            }
        }

        if !invalid.is_empty() {
            warn!(
                "Recipe {} has {} invalid ingredient(s) out of {}",
                recipe.id,
                invalid.len(),
                recipe.ingredients.len()
            );
        }

        Self {
            recipe,
            valid,
            invalid,
        }
    }

    pub fn recipe_id(&self) -> Uuid {
        self.recipe.id
    }

    pub fn has_valid_ingredients(&self) -> bool {
        !self.valid.is_empty()
    }

    /// Every declared ingredient passed validation
    pub fn is_consistent(&self) -> bool {
        self.invalid.is_empty()
    }

    pub fn declared_count(&self) -> usize {
        self.recipe.ingredients.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tomato() -> IngredientRef {
        IngredientRef::new(Uuid::new_v4(), "tomato")
    }

    fn kg() -> UnitRef {
        UnitRef::new(Uuid::new_v4(), "kg")
    }

    #[test]
    fn test_valid_ingredient_carries_key() {
        let food = tomato();
        let unit = kg();
        let ingredient = RecipeIngredient::new(food.clone(), unit.clone(), Decimal::ONE);

        match check_ingredient(0, &ingredient) {
            CheckedIngredient::Valid(valid) => {
                assert_eq!(valid.key, IngredientKey::new(food.id, unit.id));
                assert_eq!(valid.quantity, Decimal::ONE);
            }
            other => panic!("expected valid ingredient, got {other:?}"),
        }
    }

    #[test]
    fn test_invalid_reasons() {
        let mut no_food = RecipeIngredient::new(tomato(), kg(), Decimal::ONE);
        no_food.ingredient = None;
        let mut no_unit = RecipeIngredient::new(tomato(), kg(), Decimal::ONE);
        no_unit.unit = None;
        let zero = RecipeIngredient::new(tomato(), kg(), Decimal::ZERO);

        assert_eq!(
            check_ingredient(3, &no_food),
            CheckedIngredient::Invalid {
                position: 3,
                reason: InvalidReason::MissingIngredient
            }
        );
        assert!(matches!(
            check_ingredient(0, &no_unit),
            CheckedIngredient::Invalid {
                reason: InvalidReason::MissingUnit,
                ..
            }
        ));
        assert!(matches!(
            check_ingredient(0, &zero),
            CheckedIngredient::Invalid {
                reason: InvalidReason::NonPositiveQuantity,
                ..
            }
        ));
    }

    #[test]
    fn test_validated_recipe_partitions_ingredients() {
        let mut broken = RecipeIngredient::new(tomato(), kg(), Decimal::ONE);
        broken.unit = None;
        let recipe = Recipe::new(Uuid::new_v4(), "Salsa")
            .with_ingredient(RecipeIngredient::new(tomato(), kg(), Decimal::ONE))
            .with_ingredient(broken);

        let validated = ValidatedRecipe::new(&recipe);

        assert_eq!(validated.valid.len(), 1);
        assert_eq!(validated.invalid, vec![(1, InvalidReason::MissingUnit)]);
        assert!(validated.has_valid_ingredients());
        assert!(!validated.is_consistent());
        assert_eq!(validated.declared_count(), 2);
    }

    #[test]
    fn test_empty_recipe_has_no_valid_ingredients() {
        let recipe = Recipe::new(Uuid::new_v4(), "Air");
        let validated = ValidatedRecipe::new(&recipe);
        assert!(!validated.has_valid_ingredients());
        assert!(validated.is_consistent());
    }
}
