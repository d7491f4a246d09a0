//! # Cook Notifications
//!
//! Builds the "recipe cooked" notification for the people sharing a fridge and
//! hands it to the [`Notifier`] collaborator. Delivery problems are reported
//! back as a [`NotificationStatus`] and never fail the cook that triggered
//! them.

use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::circuit_breaker::CircuitBreaker;
use crate::config::NotificationConfig;
use crate::localization::LocalizationManager;
use crate::model::{NotificationKind, NotificationRequest};
use crate::scope::{Actor, ScopeFilter};
use crate::store::Notifier;

/// What happened to the notification of one cook
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum NotificationStatus {
    Sent { recipients: usize },
    Failed { reason: String },
    /// Not attempted because delivery has been failing
    Skipped { reason: String },
}

pub struct NotificationDispatcher {
    notifier: Arc<dyn Notifier>,
    localization: Arc<LocalizationManager>,
    breaker: CircuitBreaker,
    default_locale: String,
}

impl NotificationDispatcher {
    pub fn new(
        notifier: Arc<dyn Notifier>,
        localization: Arc<LocalizationManager>,
        config: &NotificationConfig,
    ) -> Self {
        Self {
            notifier,
            localization,
            breaker: CircuitBreaker::new(config),
            default_locale: config.default_locale.clone(),
        }
    }

    /// Render the notification for `actor` cooking a recipe within `scope`
    pub fn build_cooked_request(
        &self,
        actor: &Actor,
        recipe_id: Uuid,
        recipe_name: &str,
        scope: &ScopeFilter,
    ) -> NotificationRequest {
        let language = self
            .localization
            .resolve_language(actor.locale.as_deref().or(Some(self.default_locale.as_str())));
        let text = |key: &str, args: &[(&str, &str)]| {
            self.localization.get_message_with_args(key, language, args)
        };

        let (title, message) = match scope {
            ScopeFilter::Family { family_name, .. } => {
                let family = family_name
                    .clone()
                    .unwrap_or_else(|| text("family-fallback", &[]));
                let actor_name = actor
                    .display_name
                    .clone()
                    .unwrap_or_else(|| text("actor-fallback", &[]));
                (
                    text("recipe-cooked-family-title", &[("family", family.as_str())]),
                    text(
                        "recipe-cooked-family-message",
                        &[("actor", actor_name.as_str()), ("recipe", recipe_name)],
                    ),
                )
            }
            ScopeFilter::Personal { .. } => (
                text("recipe-cooked-title", &[]),
                text("recipe-cooked-personal-message", &[("recipe", recipe_name)]),
            ),
        };

        NotificationRequest {
            recipients: scope.recipients(actor.user_id),
            kind: NotificationKind::RecipeCooked,
            recipe_id,
            actor_id: actor.user_id,
            family_group_id: scope.family_group_id(),
            family_group_name: scope.family_name().map(str::to_string),
            title,
            message,
        }
    }

    /// Deliver `request`, tracking failures in the circuit breaker
    pub async fn dispatch(&self, request: &NotificationRequest) -> NotificationStatus {
        if self.breaker.is_open() {
            debug!("Skipping notification for recipe {}: circuit open", request.recipe_id);
            return NotificationStatus::Skipped {
                reason: "notification delivery is failing repeatedly".to_string(),
            };
        }

        match self.notifier.notify(request).await {
            Ok(()) => {
                self.breaker.record_success();
                info!(
                    "Sent recipe_cooked notification for recipe {} to {} recipient(s)",
                    request.recipe_id,
                    request.recipients.len()
                );
                NotificationStatus::Sent {
                    recipients: request.recipients.len(),
                }
            }
            Err(err) => {
                self.breaker.record_failure();
                warn!(
                    "Failed to send notification for recipe {}: {:#}",
                    request.recipe_id, err
                );
                NotificationStatus::Failed {
                    reason: format!("{err:#}"),
                }
            }
        }
    }

    /// Build and deliver the notification for a finished cook
    pub async fn notify_cooked(
        &self,
        actor: &Actor,
        recipe_id: Uuid,
        recipe_name: &str,
        scope: &ScopeFilter,
    ) -> NotificationStatus {
        let request = self.build_cooked_request(actor, recipe_id, recipe_name, scope);
        self.dispatch(&request).await
    }
}
