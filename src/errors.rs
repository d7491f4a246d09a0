//! # Engine Error Types
//!
//! Error taxonomy for recipe matching and cooking. Collaborator failures are
//! carried as `anyhow::Error` so their context chain survives up to the caller.

use thiserror::Error;
use uuid::Uuid;

use crate::matcher::MissingIngredient;

#[derive(Debug, Error)]
pub enum RecipeError {
    /// Recipe does not exist or is not visible to the caller
    #[error("Recipe {0} not found")]
    NotFound(Uuid),

    /// Recipe has no ingredient with resolvable references
    #[error("Recipe {recipe_id} has no valid ingredients")]
    InvalidRecipe { recipe_id: Uuid },

    /// Cooking rejected before any write; carries the full shortfall list
    #[error("Not enough stock to cook recipe {recipe_id}: {} ingredient(s) missing", missing.len())]
    InsufficientStock {
        recipe_id: Uuid,
        missing: Vec<MissingIngredient>,
    },

    /// Stock changed under every cook attempt
    #[error("Stock for recipe {recipe_id} kept changing, gave up after {attempts} attempt(s)")]
    Conflict { recipe_id: Uuid, attempts: u32 },

    /// Some lot writes landed and a later one failed; needs reconciliation
    #[error("Cooking recipe {recipe_id} failed after {} lot write(s) at lot {failed_lot}", applied_lots.len())]
    PartialMutation {
        recipe_id: Uuid,
        applied_lots: Vec<Uuid>,
        failed_lot: Uuid,
        #[source]
        source: anyhow::Error,
    },

    /// A stored record could not be interpreted; readers skip it and log this
    #[error("Data inconsistency: {0}")]
    DataInconsistency(String),

    /// A collaborator failed before anything was mutated
    #[error("Storage error: {0:#}")]
    Storage(#[from] anyhow::Error),
}

impl RecipeError {
    /// Whether the caller may simply try the same request again
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            RecipeError::Conflict { .. } | RecipeError::Storage(_) | RecipeError::InsufficientStock { .. }
        )
    }

    /// Short machine-readable code for responses and logs
    pub fn code(&self) -> &'static str {
        match self {
            RecipeError::NotFound(_) => "not_found",
            RecipeError::InvalidRecipe { .. } => "invalid_recipe",
            RecipeError::InsufficientStock { .. } => "insufficient_stock",
            RecipeError::Conflict { .. } => "conflict",
            RecipeError::PartialMutation { .. } => "partial_mutation",
            RecipeError::DataInconsistency(_) => "data_inconsistency",
            RecipeError::Storage(_) => "storage",
        }
    }
}

pub type RecipeResult<T> = Result<T, RecipeError>;
