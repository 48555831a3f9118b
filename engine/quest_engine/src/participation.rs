//! # Participation registry
//!
//! Tracks which users joined a quest and under which roles, and owns the one
//! rule table deciding which role an action needs.
//!
//! | Action              | Required role |
//! |---------------------|---------------|
//! | `Donate`            | `Financial`   |
//! | `PledgeItems`       | `Financial`   |
//! | `SignUpVolunteer`   | `Volunteer`   |
//! | `Share`             | `Ambassador`  |
//!
//! Role decisions go through this module: [`role_allows`] checks the role a
//! contribution is declared under, [`can_perform`] checks what the
//! participant actually holds.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::types::{Participation, Quest, Role};

/// Role-gated action a participant may attempt.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    Donate,
    PledgeItems,
    SignUpVolunteer,
    Share,
}

impl Action {
    pub const ALL: [Action; 4] = [
        Action::Donate,
        Action::PledgeItems,
        Action::SignUpVolunteer,
        Action::Share,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Donate => "donate",
            Self::PledgeItems => "pledge_items",
            Self::SignUpVolunteer => "sign_up_volunteer",
            Self::Share => "share",
        }
    }
}

/// The role an action is gated on.
pub fn required_role(action: Action) -> Role {
    match action {
        Action::Donate | Action::PledgeItems => Role::Financial,
        Action::SignUpVolunteer => Role::Volunteer,
        Action::Share => Role::Ambassador,
    }
}

/// Whether a contribution declared under `role` is the kind `action` needs.
pub fn role_allows(role: Role, action: Action) -> bool {
    required_role(action) == role
}

/// Return `true` if `participation` holds the role `action` requires.
pub fn can_perform(participation: &Participation, action: Action) -> bool {
    participation.has_role(required_role(action))
}

/// Add `role` to the user's participation, creating it on first join.
///
/// Re-joining extends the role set and keeps the original `joined_at`.
pub fn join(quest: &mut Quest, user_id: &str, role: Role, now: DateTime<Utc>) -> Participation {
    if let Some(existing) = quest
        .participations
        .iter_mut()
        .find(|p| p.user_id == user_id)
    {
        if existing.roles.insert(role) {
            info!("User {user_id} added role {} on quest {}", role.as_str(), quest.id);
        }
        return existing.clone();
    }

    let participation = Participation {
        user_id: user_id.to_string(),
        quest_id: quest.id.clone(),
        roles: [role].into_iter().collect(),
        joined_at: now,
    };
    quest.participations.push(participation.clone());
    info!("User {user_id} joined quest {} as {}", quest.id, role.as_str());
    participation
}
