//! # Scope Resolution
//!
//! Decides whose fridge a request looks at. A *personal* request sees the
//! caller's own lots; a *family* request sees every lot tagged with the caller's
//! family group plus untagged lots owned by any member (records created before
//! lots carried a family group).
//!
//! Also holds [`RecipeAccess`], the predicate selecting which recipes a caller
//! may match against.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::model::{Recipe, Visibility};
use crate::store::MembershipDirectory;

/// Scope requested by the caller
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScopeKind {
    #[default]
    Personal,
    Family,
}

impl ScopeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScopeKind::Personal => "personal",
            ScopeKind::Family => "family",
        }
    }
}

impl fmt::Display for ScopeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ScopeKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "personal" => Ok(ScopeKind::Personal),
            "family" => Ok(ScopeKind::Family),
            other => Err(anyhow::anyhow!("Unknown scope: {other}")),
        }
    }
}

/// Role of the acting user
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    #[default]
    User,
    Admin,
}

/// The identity a request acts as
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Actor {
    pub user_id: Uuid,
    pub role: Role,
    /// Name shown to other family members in notifications
    pub display_name: Option<String>,
    /// Preferred language for notification text (e.g. "en", "vi")
    pub locale: Option<String>,
}

impl Actor {
    pub fn new(user_id: Uuid) -> Self {
        Self {
            user_id,
            role: Role::User,
            display_name: None,
            locale: None,
        }
    }

    pub fn with_display_name(mut self, name: &str) -> Self {
        self.display_name = Some(name.to_string());
        self
    }

    pub fn with_locale(mut self, locale: &str) -> Self {
        self.locale = Some(locale.to_string());
        self
    }
}

/// A family group and its members, as reported by the membership collaborator
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FamilyMembership {
    pub family_group_id: Uuid,
    pub name: Option<String>,
    /// Member user ids in membership order
    pub member_ids: Vec<Uuid>,
}

/// Ownership predicate applied to every stock lot query
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ScopeFilter {
    Personal {
        user_id: Uuid,
    },
    Family {
        family_group_id: Uuid,
        family_name: Option<String>,
        member_ids: Vec<Uuid>,
    },
}

impl ScopeFilter {
    pub fn personal(user_id: Uuid) -> Self {
        ScopeFilter::Personal { user_id }
    }

    pub fn family(membership: &FamilyMembership) -> Self {
        ScopeFilter::Family {
            family_group_id: membership.family_group_id,
            family_name: membership.name.clone(),
            member_ids: membership.member_ids.clone(),
        }
    }

    /// Whether a record with this ownership falls inside the scope
    pub fn matches(&self, owner_id: Uuid, family_group_id: Option<Uuid>) -> bool {
        match self {
            ScopeFilter::Personal { user_id } => owner_id == *user_id && family_group_id.is_none(),
            ScopeFilter::Family {
                family_group_id: group_id,
                member_ids,
                ..
            } => match family_group_id {
                Some(id) => id == *group_id,
                None => member_ids.contains(&owner_id),
            },
        }
    }

    pub fn kind(&self) -> ScopeKind {
        match self {
            ScopeFilter::Personal { .. } => ScopeKind::Personal,
            ScopeFilter::Family { .. } => ScopeKind::Family,
        }
    }

    /// Family group recorded on consumption log entries, `None` for personal scope
    pub fn family_group_id(&self) -> Option<Uuid> {
        match self {
            ScopeFilter::Personal { .. } => None,
            ScopeFilter::Family {
                family_group_id, ..
            } => Some(*family_group_id),
        }
    }

    pub fn family_name(&self) -> Option<&str> {
        match self {
            ScopeFilter::Personal { .. } => None,
            ScopeFilter::Family { family_name, .. } => family_name.as_deref(),
        }
    }

    /// Users to notify about activity in this scope
    pub fn recipients(&self, actor_id: Uuid) -> Vec<Uuid> {
        match self {
            ScopeFilter::Family { member_ids, .. } if !member_ids.is_empty() => member_ids.clone(),
            _ => vec![actor_id],
        }
    }
}

/// Build the filter for `user_id` from an already looked-up membership.
///
/// A family request without a family group degrades to the personal scope.
pub fn resolve_scope(
    user_id: Uuid,
    requested: ScopeKind,
    membership: Option<&FamilyMembership>,
) -> ScopeFilter {
    match (requested, membership) {
        (ScopeKind::Personal, _) => ScopeFilter::personal(user_id),
        (ScopeKind::Family, Some(membership)) => {
            debug!(
                "Family scope for user {}: group {} with {} members",
                user_id,
                membership.family_group_id,
                membership.member_ids.len()
            );
            ScopeFilter::family(membership)
        }
        (ScopeKind::Family, None) => {
            warn!("User {user_id} requested family scope without a family group, using personal scope");
            ScopeFilter::personal(user_id)
        }
    }
}

/// Look up the caller's family (only when needed) and build the filter
pub async fn resolve(
    directory: &dyn MembershipDirectory,
    user_id: Uuid,
    requested: ScopeKind,
) -> anyhow::Result<ScopeFilter> {
    let membership = match requested {
        ScopeKind::Personal => None,
        ScopeKind::Family => directory.family_of(user_id).await?,
    };
    Ok(resolve_scope(user_id, requested, membership.as_ref()))
}

/// Which recipes a caller may see.
///
/// Everyone sees approved recipes that are public or predate visibility. A
/// signed-in user also sees their own private recipes and their own
/// unapproved recipes that predate visibility.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecipeAccess {
    pub viewer: Option<Uuid>,
}

impl RecipeAccess {
    pub fn anonymous() -> Self {
        Self { viewer: None }
    }

    pub fn for_user(user_id: Uuid) -> Self {
        Self {
            viewer: Some(user_id),
        }
    }

    pub fn permits(&self, recipe: &Recipe) -> bool {
        let public = recipe.is_approved
            && matches!(recipe.visibility, None | Some(Visibility::Public));
        if public {
            return true;
        }

        let Some(viewer) = self.viewer else {
            return false;
        };
        if recipe.created_by != Some(viewer) {
            return false;
        }
        match recipe.visibility {
            Some(Visibility::Private) => true,
            None => !recipe.is_approved,
            Some(Visibility::Public) => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn family(members: &[Uuid]) -> FamilyMembership {
        FamilyMembership {
            family_group_id: Uuid::new_v4(),
            name: Some("Nguyen".to_string()),
            member_ids: members.to_vec(),
        }
    }

    #[test]
    fn test_personal_scope_matches_only_untagged_own_lots() {
        let me = Uuid::new_v4();
        let filter = resolve_scope(me, ScopeKind::Personal, None);

        assert!(filter.matches(me, None));
        assert!(!filter.matches(me, Some(Uuid::new_v4())));
        assert!(!filter.matches(Uuid::new_v4(), None));
    }

    #[test]
    fn test_family_scope_matches_group_and_legacy_member_lots() {
        let alice = Uuid::new_v4();
        let bob = Uuid::new_v4();
        let outsider = Uuid::new_v4();
        let membership = family(&[alice, bob]);
        let group = membership.family_group_id;

        let filter = resolve_scope(alice, ScopeKind::Family, Some(&membership));

        // Tagged with the group, whoever created it
        assert!(filter.matches(alice, Some(group)));
        assert!(filter.matches(bob, Some(group)));
        assert!(filter.matches(outsider, Some(group)));
        // Legacy untagged lots owned by members
        assert!(filter.matches(alice, None));
        assert!(filter.matches(bob, None));
        // Neither
        assert!(!filter.matches(outsider, None));
        assert!(!filter.matches(bob, Some(Uuid::new_v4())));
    }

    #[test]
    fn test_family_request_without_group_falls_back_to_personal() {
        let me = Uuid::new_v4();
        let filter = resolve_scope(me, ScopeKind::Family, None);

        assert_eq!(filter, ScopeFilter::personal(me));
        assert_eq!(filter.kind(), ScopeKind::Personal);
        assert_eq!(filter.family_group_id(), None);
    }

    #[test]
    fn test_personal_request_ignores_membership() {
        let me = Uuid::new_v4();
        let membership = family(&[me]);
        let filter = resolve_scope(me, ScopeKind::Personal, Some(&membership));
        assert_eq!(filter.kind(), ScopeKind::Personal);
    }

    #[test]
    fn test_recipients_by_scope() {
        let me = Uuid::new_v4();
        let other = Uuid::new_v4();

        assert_eq!(ScopeFilter::personal(me).recipients(me), vec![me]);
        assert_eq!(
            ScopeFilter::family(&family(&[me, other])).recipients(me),
            vec![me, other]
        );
        assert_eq!(ScopeFilter::family(&family(&[])).recipients(me), vec![me]);
    }

    #[test]
    fn test_recipe_access_rules() {
        let owner = Uuid::new_v4();
        let stranger = Uuid::new_v4();

        let public = Recipe::new(Uuid::new_v4(), "Pho");
        let private = Recipe::new(Uuid::new_v4(), "Secret soup").private_to(owner);
        let mut legacy_draft = Recipe::new(Uuid::new_v4(), "Draft");
        legacy_draft.visibility = None;
        legacy_draft.is_approved = false;
        legacy_draft.created_by = Some(owner);
        let mut pending_public = Recipe::new(Uuid::new_v4(), "Pending");
        pending_public.is_approved = false;
        pending_public.created_by = Some(owner);

        let anonymous = RecipeAccess::anonymous();
        assert!(anonymous.permits(&public));
        assert!(!anonymous.permits(&private));
        assert!(!anonymous.permits(&legacy_draft));

        let as_owner = RecipeAccess::for_user(owner);
        assert!(as_owner.permits(&private));
        assert!(as_owner.permits(&legacy_draft));
        assert!(!as_owner.permits(&pending_public));

        let as_stranger = RecipeAccess::for_user(stranger);
        assert!(as_stranger.permits(&public));
        assert!(!as_stranger.permits(&private));
    }
}
