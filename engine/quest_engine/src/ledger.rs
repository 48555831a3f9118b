//! # Contribution ledger
//!
//! The sole writer of requirement counters. A contribution is checked in two
//! passes:
//!
//! 1. [`validate_request`] rejects malformed input before any lock is taken.
//! 2. [`record`] runs inside the quest's critical section: it resolves the
//!    stage, matches the offer against the stage requirement and the
//!    contributor's roles, checks the remaining need, then increments the
//!    counter and appends the record.
//!
//! [`record`] either succeeds completely or leaves the quest unchanged.

use chrono::{DateTime, Utc};
use tracing::debug;

use crate::errors::{EngineError, Result};
use crate::participation::{self, Action};
use crate::types::{
    Contribution, ContributionAction, ContributionRequest, Participation, Quest, Requirement,
};

/// Key used to recognise a resubmitted contribution.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum IdempotencyKey<'a> {
    /// Explicit client-generated id.
    Client(&'a str),
    /// `(stageId, userId, timestamp)` for callers that supplied a timestamp.
    Natural {
        stage_id: &'a str,
        user_id: &'a str,
        timestamp: DateTime<Utc>,
    },
}

impl<'a> IdempotencyKey<'a> {
    pub fn of(request: &'a ContributionRequest) -> Option<Self> {
        if let Some(client_id) = request.client_id.as_deref() {
            return Some(Self::Client(client_id));
        }
        request.timestamp.map(|timestamp| Self::Natural {
            stage_id: &request.stage_id,
            user_id: &request.user_id,
            timestamp,
        })
    }

    fn matches(&self, contribution: &Contribution) -> bool {
        match self {
            Self::Client(id) => contribution.client_id.as_deref() == Some(*id),
            Self::Natural {
                stage_id,
                user_id,
                timestamp,
            } => {
                contribution.stage_id == *stage_id
                    && contribution.user_id == *user_id
                    && contribution.timestamp == *timestamp
            }
        }
    }
}

/// Stateless shape checks. Runs before the quest is locked.
pub fn validate_request(request: &ContributionRequest) -> Result<()> {
    for (field, value) in [
        ("questId", &request.quest_id),
        ("stageId", &request.stage_id),
        ("userId", &request.user_id),
    ] {
        if value.trim().is_empty() {
            return Err(EngineError::Validation(format!("{field} is required")));
        }
    }
    if matches!(request.client_id.as_deref(), Some(id) if id.trim().is_empty()) {
        return Err(EngineError::Validation("clientId must not be blank".to_string()));
    }
    if request.amount == Some(0) {
        return Err(EngineError::Validation("amount must be positive".to_string()));
    }
    match (request.action, request.amount) {
        (Some(ContributionAction::Register), Some(_)) => Err(EngineError::Validation(
            "volunteer sign-up carries no amount".to_string(),
        )),
        (Some(ContributionAction::Pledge), None) => Err(EngineError::Validation(
            "item pledge needs an amount".to_string(),
        )),
        (None, None) => Err(EngineError::Validation(
            "contribution needs an amount or an action".to_string(),
        )),
        _ => Ok(()),
    }
}

/// Return the recorded contribution a resubmitted request refers to.
///
/// Reusing a key with a different payload is a validation error.
pub fn find_recorded(quest: &Quest, request: &ContributionRequest) -> Result<Option<Contribution>> {
    let Some(key) = IdempotencyKey::of(request) else {
        return Ok(None);
    };
    let Some(existing) = quest.contributions.iter().find(|c| key.matches(c)) else {
        return Ok(None);
    };
    let same_payload = existing.stage_id == request.stage_id
        && existing.user_id == request.user_id
        && existing.role == request.role
        && existing.amount == request.amount
        && existing.action == request.action;
    if !same_payload {
        return Err(EngineError::Validation(format!(
            "idempotency key of contribution {} reused with a different payload",
            existing.id
        )));
    }
    Ok(Some(existing.clone()))
}

/// Action an offer represents against `requirement`, if the requirement can take it.
pub fn action_for(requirement: &Requirement, action: Option<ContributionAction>) -> Option<Action> {
    match (requirement, action) {
        (Requirement::Financial { .. }, None) => Some(Action::Donate),
        (Requirement::Items { .. }, None | Some(ContributionAction::Pledge)) => {
            Some(Action::PledgeItems)
        }
        (Requirement::Volunteers { .. }, Some(ContributionAction::Register)) => {
            Some(Action::SignUpVolunteer)
        }
        _ => None,
    }
}

/// Apply `request` to `quest`: check, increment the matching counter and
/// append the contribution.
///
/// The caller must hold the quest's lock and must have run
/// [`validate_request`] and the lifecycle check.
pub fn record(
    quest: &mut Quest,
    request: &ContributionRequest,
    participation: Option<&Participation>,
    now: DateTime<Utc>,
) -> Result<Contribution> {
    let stage = quest
        .stage(&request.stage_id)
        .ok_or_else(|| EngineError::NotFound(format!("stage {} in quest {}", request.stage_id, quest.id)))?;
    let requirement = stage.requirement.as_ref().ok_or_else(|| {
        EngineError::InvalidState(format!("stage {} has no requirement", stage.id))
    })?;
    let action = action_for(requirement, request.action).ok_or_else(|| {
        EngineError::InvalidState(format!(
            "stage {} has a {} requirement and cannot take this contribution",
            stage.id,
            requirement.kind()
        ))
    })?;

    let role = participation::required_role(action);
    if !participation::role_allows(request.role, action) {
        return Err(EngineError::Validation(format!(
            "role {} cannot {}; it needs role {}",
            request.role.as_str(),
            action.as_str(),
            role.as_str()
        )));
    }
    let participation = participation.ok_or_else(|| {
        EngineError::Validation(format!(
            "user {} has not joined quest {}",
            request.user_id, quest.id
        ))
    })?;
    if !participation::can_perform(participation, action) {
        return Err(EngineError::Validation(format!(
            "user {} has not joined quest {} as {}",
            request.user_id,
            quest.id,
            role.as_str()
        )));
    }

    let stage = quest
        .stage_mut(&request.stage_id)
        .ok_or_else(|| EngineError::NotFound(format!("stage {}", request.stage_id)))?;
    match stage.requirement.as_mut() {
        Some(Requirement::Financial { collected, needed, .. })
        | Some(Requirement::Items { collected, needed, .. }) => {
            let amount = request
                .amount
                .ok_or_else(|| EngineError::Validation("amount is required".to_string()))?;
            let remaining = needed.saturating_sub(*collected);
            if amount > remaining {
                return Err(EngineError::Overcommit {
                    requested: amount,
                    remaining,
                });
            }
            *collected += amount;
        }
        Some(Requirement::Volunteers { registered, needed }) => {
            if *registered >= *needed {
                return Err(EngineError::Overcommit {
                    requested: 1,
                    remaining: 0,
                });
            }
            *registered += 1;
        }
        None => {
            return Err(EngineError::InvalidState(format!(
                "stage {} has no requirement",
                request.stage_id
            )))
        }
    }

    let contribution = Contribution {
        id: quest.contributions.len() as u64 + 1,
        quest_id: quest.id.clone(),
        stage_id: request.stage_id.clone(),
        user_id: request.user_id.clone(),
        role: request.role,
        amount: request.amount,
        action: request.action,
        timestamp: request.timestamp.unwrap_or(now),
        client_id: request.client_id.clone(),
    };
    quest.contributions.push(contribution.clone());
    debug!(
        "Recorded contribution {} on quest {} stage {}",
        contribution.id, quest.id, contribution.stage_id
    );
    Ok(contribution)
}
