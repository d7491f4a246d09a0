//! # Fridge Recipes
//!
//! Matches recipes against the stock lots in a personal or family fridge,
//! ranks them by how much soon-to-expire food they use up, and consumes stock
//! when a recipe is cooked, soonest-expiring lot first, with a consumption
//! audit trail.

pub mod aggregator;
pub mod circuit_breaker;
pub mod config;
pub mod cooking;
pub mod db;
pub mod errors;
pub mod expiry;
pub mod localization;
pub mod logging;
pub mod matcher;
pub mod memory;
pub mod model;
pub mod notify;
pub mod ranker;
pub mod scope;
pub mod service;
pub mod store;
pub mod validation;

pub use errors::{RecipeError, RecipeResult};
pub use service::{Collaborators, RecipeEngine};
