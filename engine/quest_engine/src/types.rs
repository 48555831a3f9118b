//! # Types
//!
//! Shared data structures used across all modules of the quest engine.
//!
//! ## Persisted shape
//!
//! A [`Quest`] is persisted as one JSON object carrying its stages, the
//! derived progress fields, its participations, the achievements granted so
//! far, and the append-only contribution ledger. Field names are camelCase so
//! the record matches what the listing and moderation layers read.
//!
//! ### Status as a Finite-State Machine
//!
//! [`QuestStatus`] enforces a strict forward-only lifecycle:
//!
//! ```text
//! Active ──► Completed ──► Archived
//! ```
//!
//! [`StageStatus`] follows the same rule:
//!
//! ```text
//! Pending ──► InProgress ──► Completed
//!     └──────────────────────►┘
//! ```

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle status of a quest.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuestStatus {
    /// Accepting contributions and participants.
    #[default]
    Active,
    /// Overall progress reached 100%.
    Completed,
    /// Removed from listings by an external archival action.
    Archived,
}

impl QuestStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Completed => "completed",
            Self::Archived => "archived",
        }
    }
}

/// Lifecycle status of a single stage.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageStatus {
    #[default]
    Pending,
    InProgress,
    Completed,
}

/// Discrete visual band derived from overall progress.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProgressColor {
    Red,
    Orange,
    Yellow,
    Green,
    Victory,
}

impl ProgressColor {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Red => "red",
            Self::Orange => "orange",
            Self::Yellow => "yellow",
            Self::Green => "green",
            Self::Victory => "victory",
        }
    }
}

/// Role a participant holds within a quest.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// Gives money or materials.
    Financial,
    /// Signs up for volunteer slots.
    Volunteer,
    /// Shares the quest with others.
    Ambassador,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Financial => "financial",
            Self::Volunteer => "volunteer",
            Self::Ambassador => "ambassador",
        }
    }
}

/// A typed need attached to a stage.
///
/// `collected` / `registered` are written by the contribution ledger only.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Requirement {
    Financial {
        collected: u64,
        needed: u64,
        currency: String,
    },
    Volunteers {
        registered: u64,
        needed: u64,
    },
    Items {
        collected: u64,
        needed: u64,
        #[serde(rename = "itemName")]
        item_name: String,
    },
}

impl Requirement {
    /// Counter value, reading `registered` for volunteer requirements.
    pub fn collected(&self) -> u64 {
        match self {
            Self::Financial { collected, .. } | Self::Items { collected, .. } => *collected,
            Self::Volunteers { registered, .. } => *registered,
        }
    }

    pub fn needed(&self) -> u64 {
        match self {
            Self::Financial { needed, .. }
            | Self::Volunteers { needed, .. }
            | Self::Items { needed, .. } => *needed,
        }
    }

    /// Remaining need; never underflows because `collected <= needed`.
    pub fn remaining(&self) -> u64 {
        self.needed().saturating_sub(self.collected())
    }

    pub fn is_fulfilled(&self) -> bool {
        self.collected() >= self.needed()
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Financial { .. } => "financial",
            Self::Volunteers { .. } => "volunteers",
            Self::Items { .. } => "items",
        }
    }
}

/// One unit of work within a quest.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Stage {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub status: StageStatus,
    /// Derived from the requirement when present, curator-set otherwise.
    #[serde(default)]
    pub progress: u8,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub requirement: Option<Requirement>,
}

/// Quest-specific reward shown to participants on completion.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AchievementDefinition {
    pub icon: String,
    pub title: String,
    pub description: String,
}

/// Achievement granted to one user for one quest. Never mutated once created.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Achievement {
    pub quest_id: String,
    pub user_id: String,
    pub icon: String,
    pub title: String,
    pub description: String,
    pub unlocked_at: DateTime<Utc>,
}

/// A user's enrollment in a quest.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Participation {
    pub user_id: String,
    pub quest_id: String,
    pub roles: BTreeSet<Role>,
    pub joined_at: DateTime<Utc>,
}

impl Participation {
    pub fn has_role(&self, role: Role) -> bool {
        self.roles.contains(&role)
    }
}

/// Non-monetary contribution kind.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContributionAction {
    /// Volunteer sign-up; takes one slot.
    Register,
    /// Material pledge; carries an item count in `amount`.
    Pledge,
}

/// Incoming contribution, as submitted by the contribution UI/API layer.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContributionRequest {
    pub quest_id: String,
    pub stage_id: String,
    pub user_id: String,
    pub role: Role,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub amount: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action: Option<ContributionAction>,
    /// Client-side timestamp; part of the natural idempotency key.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
    /// Explicit client-generated idempotency key.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,
}

/// A recorded contribution. Immutable once appended to the ledger.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Contribution {
    /// Sequential per quest, starting at 1.
    pub id: u64,
    pub quest_id: String,
    pub stage_id: String,
    pub user_id: String,
    pub role: Role,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub amount: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action: Option<ContributionAction>,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,
}

/// A civic project composed of ordered stages.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Quest {
    pub id: String,
    pub title: String,
    pub stages: Vec<Stage>,
    #[serde(default)]
    pub overall_progress: u8,
    #[serde(default)]
    pub status: QuestStatus,
    #[serde(default = "default_color")]
    pub progress_color: ProgressColor,
    #[serde(default)]
    pub participations: Vec<Participation>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub achievement: Option<AchievementDefinition>,
    /// Achievements granted so far, at most one per user.
    #[serde(default)]
    pub grants: Vec<Achievement>,
    /// Append-only contribution ledger.
    #[serde(default)]
    pub contributions: Vec<Contribution>,
}

fn default_color() -> ProgressColor {
    ProgressColor::Red
}

impl Quest {
    pub fn stage(&self, stage_id: &str) -> Option<&Stage> {
        self.stages.iter().find(|s| s.id == stage_id)
    }

    pub fn stage_mut(&mut self, stage_id: &str) -> Option<&mut Stage> {
        self.stages.iter_mut().find(|s| s.id == stage_id)
    }

    pub fn participation(&self, user_id: &str) -> Option<&Participation> {
        self.participations.iter().find(|p| p.user_id == user_id)
    }

    pub fn grant_for(&self, user_id: &str) -> Option<&Achievement> {
        self.grants.iter().find(|a| a.user_id == user_id)
    }
}
