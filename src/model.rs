//! # Fridge and Recipe Data Model
//!
//! This module defines the records the engine reads and writes: stock lots held
//! in a fridge, recipes and their required ingredients, and the consumption log
//! entries written when a recipe is cooked.
//!
//! ## Core Concepts
//!
//! - **Stock lot**: one batch of an ingredient with its own quantity and expiry date
//! - **Ingredient key**: the `(ingredient, unit)` pair stock is matched on
//! - **Recipe ingredient**: one required input of a recipe
//! - **Consumption log entry**: one audited draw from one lot
//!
//! ## Usage
//!
//! ```rust
//! use fridge_recipes::model::{IngredientRef, Recipe, RecipeIngredient, UnitRef};
//! use rust_decimal::Decimal;
//! use uuid::Uuid;
//!
//! let tomato = IngredientRef::new(Uuid::new_v4(), "tomato");
//! let kg = UnitRef::new(Uuid::new_v4(), "kilogram").with_abbreviation("kg");
//!
//! let salad = Recipe::new(Uuid::new_v4(), "Tomato salad")
//!     .with_ingredient(RecipeIngredient::new(tomato, kg, Decimal::new(5, 1)));
//! assert_eq!(salad.ingredients.len(), 1);
//! ```

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Composite key stock is aggregated and matched on.
///
/// Units are part of the key: stock held in liters never satisfies a
/// requirement expressed in milliliters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IngredientKey {
    pub ingredient_id: Uuid,
    pub unit_id: Uuid,
}

impl IngredientKey {
    pub fn new(ingredient_id: Uuid, unit_id: Uuid) -> Self {
        Self {
            ingredient_id,
            unit_id,
        }
    }
}

impl fmt::Display for IngredientKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}", self.ingredient_id, self.unit_id)
    }
}

/// A dereferenced ingredient (food item) reference
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngredientRef {
    pub id: Uuid,
    pub name: String,
}

impl IngredientRef {
    pub fn new(id: Uuid, name: &str) -> Self {
        Self {
            id,
            name: name.to_string(),
        }
    }
}

/// A dereferenced measurement unit reference
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnitRef {
    pub id: Uuid,
    pub name: String,
    pub abbreviation: Option<String>,
}

impl UnitRef {
    pub fn new(id: Uuid, name: &str) -> Self {
        Self {
            id,
            name: name.to_string(),
            abbreviation: None,
        }
    }

    pub fn with_abbreviation(mut self, abbreviation: &str) -> Self {
        self.abbreviation = Some(abbreviation.to_string());
        self
    }

    /// Short label for display, preferring the abbreviation
    pub fn label(&self) -> &str {
        self.abbreviation.as_deref().unwrap_or(&self.name)
    }
}

/// Lifecycle status of a stock lot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LotStatus {
    /// In date and not close to expiring
    Available,
    /// Within the expiring-soon window
    ExpiringSoon,
    /// Past its expiry date; waste, not inventory
    Expired,
    /// Quantity reached zero; kept for audit
    UsedUp,
}

impl LotStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            LotStatus::Available => "available",
            LotStatus::ExpiringSoon => "expiring_soon",
            LotStatus::Expired => "expired",
            LotStatus::UsedUp => "used_up",
        }
    }

    /// Whether lots in this status count as available stock
    pub fn is_usable(&self) -> bool {
        matches!(self, LotStatus::Available | LotStatus::ExpiringSoon)
    }
}

impl fmt::Display for LotStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LotStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "available" => Ok(LotStatus::Available),
            "expiring_soon" => Ok(LotStatus::ExpiringSoon),
            "expired" => Ok(LotStatus::Expired),
            "used_up" => Ok(LotStatus::UsedUp),
            other => Err(anyhow::anyhow!("Unknown stock lot status: {other}")),
        }
    }
}

/// One purchased or acquired batch of an ingredient
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StockLot {
    pub id: Uuid,

    /// User who added the lot
    pub user_id: Uuid,

    /// Family group the lot belongs to, `None` for personal and legacy lots
    pub family_group_id: Option<Uuid>,

    /// Resolved ingredient, `None` when the upstream reference is dangling
    pub ingredient: Option<IngredientRef>,

    /// Resolved unit, `None` when the upstream reference is dangling
    pub unit: Option<UnitRef>,

    pub quantity: Decimal,

    /// Expiry date, missing on some legacy records
    pub expiry_date: Option<DateTime<Utc>>,

    pub status: LotStatus,

    pub created_at: DateTime<Utc>,

    /// Optimistic-concurrency counter, bumped on every write
    pub version: i64,
}

impl StockLot {
    /// Create a new available lot owned personally by `user_id`
    pub fn new(
        user_id: Uuid,
        ingredient: IngredientRef,
        unit: UnitRef,
        quantity: Decimal,
        expiry_date: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id,
            family_group_id: None,
            ingredient: Some(ingredient),
            unit: Some(unit),
            quantity,
            expiry_date: Some(expiry_date),
            status: LotStatus::Available,
            created_at: Utc::now(),
            version: 0,
        }
    }

    pub fn in_family(mut self, family_group_id: Uuid) -> Self {
        self.family_group_id = Some(family_group_id);
        self
    }

    pub fn with_status(mut self, status: LotStatus) -> Self {
        self.status = status;
        self
    }

    /// The matching key, if both references resolved
    pub fn key(&self) -> Option<IngredientKey> {
        match (&self.ingredient, &self.unit) {
            (Some(ingredient), Some(unit)) => Some(IngredientKey::new(ingredient.id, unit.id)),
            _ => None,
        }
    }

    /// Whether this lot counts toward available stock
    pub fn is_usable(&self) -> bool {
        self.status.is_usable() && self.quantity > Decimal::ZERO
    }

    pub fn ingredient_name(&self) -> &str {
        self.ingredient
            .as_ref()
            .map(|ingredient| ingredient.name.as_str())
            .unwrap_or("Unknown")
    }
}

/// One required input of a recipe
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecipeIngredient {
    pub ingredient: Option<IngredientRef>,
    pub unit: Option<UnitRef>,
    pub quantity: Decimal,
    #[serde(default)]
    pub note: String,
}

impl RecipeIngredient {
    pub fn new(ingredient: IngredientRef, unit: UnitRef, quantity: Decimal) -> Self {
        Self {
            ingredient: Some(ingredient),
            unit: Some(unit),
            quantity,
            note: String::new(),
        }
    }

    pub fn with_note(mut self, note: &str) -> Self {
        self.note = note.to_string();
        self
    }
}

/// Who may see a recipe
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Visibility {
    Public,
    Private,
}

impl Visibility {
    pub fn as_str(&self) -> &'static str {
        match self {
            Visibility::Public => "public",
            Visibility::Private => "private",
        }
    }
}

impl FromStr for Visibility {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "public" => Ok(Visibility::Public),
            "private" => Ok(Visibility::Private),
            other => Err(anyhow::anyhow!("Unknown recipe visibility: {other}")),
        }
    }
}

/// A recipe definition with its ordered ingredient list
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Recipe {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub servings: Option<i32>,
    pub category: Option<String>,
    pub difficulty: Option<String>,
    pub created_by: Option<Uuid>,
    /// `None` for recipes created before visibility existed
    pub visibility: Option<Visibility>,
    pub is_approved: bool,
    pub ingredients: Vec<RecipeIngredient>,
}

impl Recipe {
    /// Create an approved public recipe with no ingredients
    pub fn new(id: Uuid, name: &str) -> Self {
        Self {
            id,
            name: name.to_string(),
            description: None,
            servings: None,
            category: None,
            difficulty: None,
            created_by: None,
            visibility: Some(Visibility::Public),
            is_approved: true,
            ingredients: Vec::new(),
        }
    }

    pub fn with_ingredient(mut self, ingredient: RecipeIngredient) -> Self {
        self.ingredients.push(ingredient);
        self
    }

    pub fn with_description(mut self, description: &str) -> Self {
        self.description = Some(description.to_string());
        self
    }

    pub fn with_category(mut self, category: &str) -> Self {
        self.category = Some(category.to_string());
        self
    }

    /// Make this a private, unapproved recipe owned by `owner`
    pub fn private_to(mut self, owner: Uuid) -> Self {
        self.created_by = Some(owner);
        self.visibility = Some(Visibility::Private);
        self.is_approved = false;
        self
    }
}

/// Why stock was consumed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConsumptionSource {
    Recipe,
}

impl ConsumptionSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConsumptionSource::Recipe => "recipe",
        }
    }
}

/// Audit record of one draw from one stock lot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsumptionLogEntry {
    pub id: Uuid,
    pub user_id: Uuid,
    pub family_group_id: Option<Uuid>,
    pub ingredient_id: Uuid,
    pub unit_id: Uuid,
    pub stock_lot_id: Uuid,
    pub quantity: Decimal,
    pub source: ConsumptionSource,
    pub recipe_id: Option<Uuid>,
    pub consumed_at: DateTime<Utc>,
}

/// Kind of notification the engine requests
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    RecipeCooked,
}

impl NotificationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationKind::RecipeCooked => "recipe_cooked",
        }
    }
}

/// Request handed to the notification collaborator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationRequest {
    pub recipients: Vec<Uuid>,
    #[serde(rename = "type")]
    pub kind: NotificationKind,
    pub recipe_id: Uuid,
    pub actor_id: Uuid,
    pub family_group_id: Option<Uuid>,
    pub family_group_name: Option<String>,
    pub title: String,
    pub message: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lot_status_round_trips_through_str() {
        for status in [
            LotStatus::Available,
            LotStatus::ExpiringSoon,
            LotStatus::Expired,
            LotStatus::UsedUp,
        ] {
            assert_eq!(status.as_str().parse::<LotStatus>().unwrap(), status);
        }
        assert!("spoiled".parse::<LotStatus>().is_err());
    }

    #[test]
    fn test_only_available_and_expiring_are_usable() {
        assert!(LotStatus::Available.is_usable());
        assert!(LotStatus::ExpiringSoon.is_usable());
        assert!(!LotStatus::Expired.is_usable());
        assert!(!LotStatus::UsedUp.is_usable());
    }

    #[test]
    fn test_lot_key_requires_both_references() {
        let ingredient = IngredientRef::new(Uuid::new_v4(), "milk");
        let unit = UnitRef::new(Uuid::new_v4(), "liter");
        let mut lot = StockLot::new(
            Uuid::new_v4(),
            ingredient.clone(),
            unit.clone(),
            Decimal::ONE,
            Utc::now(),
        );
        assert_eq!(lot.key(), Some(IngredientKey::new(ingredient.id, unit.id)));

        lot.unit = None;
        assert_eq!(lot.key(), None);
    }

    #[test]
    fn test_expired_lot_with_quantity_is_not_usable() {
        let lot = StockLot::new(
            Uuid::new_v4(),
            IngredientRef::new(Uuid::new_v4(), "yogurt"),
            UnitRef::new(Uuid::new_v4(), "cup"),
            Decimal::TWO,
            Utc::now(),
        )
        .with_status(LotStatus::Expired);
        assert!(!lot.is_usable());
    }

    #[test]
    fn test_notification_request_serializes_type_field() {
        let request = NotificationRequest {
            recipients: vec![Uuid::nil()],
            kind: NotificationKind::RecipeCooked,
            recipe_id: Uuid::nil(),
            actor_id: Uuid::nil(),
            family_group_id: None,
            family_group_name: None,
            title: "Cooked".to_string(),
            message: "You cooked soup".to_string(),
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["type"], "recipe_cooked");
        assert_eq!(json["actorId"], Uuid::nil().to_string());
    }
}
