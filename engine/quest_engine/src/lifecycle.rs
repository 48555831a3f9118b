//! # Quest lifecycle
//!
//! Forward-only status machine:
//!
//! ```text
//! Active ──(overall == 100, policy)──► Completed ──(archival)──► Archived
//! ```
//!
//! Only `Active` quests accept contributions and new participants.

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::errors::{EngineError, Result};
use crate::stage::MAX_PROGRESS;
use crate::types::{Quest, QuestStatus};

/// When a fully progressed quest moves from `Active` to `Completed`.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompletionPolicy {
    /// In the same commit that brings overall progress to 100.
    #[default]
    Automatic,
    /// Only when a curator calls `complete`.
    CuratorConfirmed,
}

impl std::str::FromStr for CompletionPolicy {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "automatic" => Ok(Self::Automatic),
            "curator_confirmed" | "curator" => Ok(Self::CuratorConfirmed),
            other => Err(EngineError::Validation(format!(
                "unknown completion policy: {other}"
            ))),
        }
    }
}

/// A status change applied to a quest.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Transition {
    pub from: QuestStatus,
    pub to: QuestStatus,
}

/// Only forward, single-step transitions are allowed.
pub fn is_valid_transition(from: QuestStatus, to: QuestStatus) -> bool {
    matches!(
        (from, to),
        (QuestStatus::Active, QuestStatus::Completed)
            | (QuestStatus::Completed, QuestStatus::Archived)
    )
}

pub fn ensure_active(quest: &Quest) -> Result<()> {
    match quest.status {
        QuestStatus::Active => Ok(()),
        other => Err(EngineError::InvalidState(format!(
            "quest {} is {}",
            quest.id,
            other.as_str()
        ))),
    }
}

fn transition(quest: &mut Quest, to: QuestStatus) -> Result<Transition> {
    let from = quest.status;
    if !is_valid_transition(from, to) {
        return Err(EngineError::InvalidState(format!(
            "quest {} cannot move from {} to {}",
            quest.id,
            from.as_str(),
            to.as_str()
        )));
    }
    quest.status = to;
    info!("Quest {} status {} → {}", quest.id, from.as_str(), to.as_str());
    Ok(Transition { from, to })
}

/// Automatic step taken after every progress recomputation.
pub fn advance(quest: &mut Quest, policy: CompletionPolicy) -> Option<Transition> {
    let ready = quest.status == QuestStatus::Active && quest.overall_progress >= MAX_PROGRESS;
    if policy == CompletionPolicy::Automatic && ready {
        transition(quest, QuestStatus::Completed).ok()
    } else {
        None
    }
}

/// Curator confirmation of a fully progressed quest.
pub fn confirm_completion(quest: &mut Quest) -> Result<Transition> {
    ensure_active(quest)?;
    if quest.overall_progress < MAX_PROGRESS {
        return Err(EngineError::InvalidState(format!(
            "quest {} is at {}%, not 100%",
            quest.id, quest.overall_progress
        )));
    }
    transition(quest, QuestStatus::Completed)
}

/// External archival action.
pub fn archive(quest: &mut Quest) -> Result<Transition> {
    transition(quest, QuestStatus::Archived)
}
