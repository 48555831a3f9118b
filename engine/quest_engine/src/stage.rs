//! Stage model: construction helpers and invariant checks.
//!
//! Checks run when a quest is imported, when a record is loaded back from
//! storage, and before every commit. A failing check is a
//! [`EngineError::Validation`].

use std::collections::HashSet;

use crate::errors::{EngineError, Result};
use crate::types::{ProgressColor, Quest, QuestStatus, Requirement, Stage, StageStatus};

/// Highest value any progress field may hold.
pub const MAX_PROGRESS: u8 = 100;

impl Requirement {
    pub fn financial(needed: u64, currency: impl Into<String>) -> Self {
        Self::Financial {
            collected: 0,
            needed,
            currency: currency.into(),
        }
    }

    pub fn volunteers(needed: u64) -> Self {
        Self::Volunteers {
            registered: 0,
            needed,
        }
    }

    pub fn items(needed: u64, item_name: impl Into<String>) -> Self {
        Self::Items {
            collected: 0,
            needed,
            item_name: item_name.into(),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.needed() == 0 {
            return Err(EngineError::Validation(format!(
                "{} requirement must need more than zero",
                self.kind()
            )));
        }
        if self.collected() > self.needed() {
            return Err(EngineError::Validation(format!(
                "{} requirement has collected {} above needed {}",
                self.kind(),
                self.collected(),
                self.needed()
            )));
        }
        Ok(())
    }
}

impl Stage {
    /// Build a stage, rejecting it if its fields break an invariant.
    pub fn new(
        id: impl Into<String>,
        title: impl Into<String>,
        requirement: Option<Requirement>,
    ) -> Result<Self> {
        let stage = Self {
            id: id.into(),
            title: title.into(),
            status: StageStatus::Pending,
            progress: 0,
            requirement,
        };
        stage.validate()?;
        Ok(stage)
    }

    pub fn validate(&self) -> Result<()> {
        if self.id.trim().is_empty() {
            return Err(EngineError::Validation("stage id is empty".to_string()));
        }
        if self.progress > MAX_PROGRESS {
            return Err(EngineError::Validation(format!(
                "stage {} has progress {} outside [0, 100]",
                self.id, self.progress
            )));
        }
        if let Some(requirement) = &self.requirement {
            requirement
                .validate()
                .map_err(|e| EngineError::Validation(format!("stage {}: {e}", self.id)))?;
        }
        Ok(())
    }
}

impl Quest {
    /// Build an active quest with no participants and derived fields zeroed.
    pub fn new(id: impl Into<String>, title: impl Into<String>, stages: Vec<Stage>) -> Result<Self> {
        let quest = Self {
            id: id.into(),
            title: title.into(),
            stages,
            overall_progress: 0,
            status: QuestStatus::Active,
            progress_color: ProgressColor::Red,
            participations: Vec::new(),
            achievement: None,
            grants: Vec::new(),
            contributions: Vec::new(),
        };
        quest.validate()?;
        Ok(quest)
    }

    pub fn validate(&self) -> Result<()> {
        if self.id.trim().is_empty() {
            return Err(EngineError::Validation("quest id is empty".to_string()));
        }
        if self.overall_progress > MAX_PROGRESS {
            return Err(EngineError::Validation(format!(
                "quest {} has overall progress {} outside [0, 100]",
                self.id, self.overall_progress
            )));
        }
        let mut seen = HashSet::new();
        for stage in &self.stages {
            stage.validate()?;
            if !seen.insert(stage.id.as_str()) {
                return Err(EngineError::Validation(format!(
                    "quest {} has duplicate stage id {}",
                    self.id, stage.id
                )));
            }
        }

        let mut joined = HashSet::new();
        for participation in &self.participations {
            if !joined.insert(participation.user_id.as_str()) {
                return Err(EngineError::Validation(format!(
                    "quest {} has more than one participation for {}",
                    self.id, participation.user_id
                )));
            }
        }
        let mut granted = HashSet::new();
        for grant in &self.grants {
            if !granted.insert(grant.user_id.as_str()) {
                return Err(EngineError::Validation(format!(
                    "quest {} has more than one achievement for {}",
                    self.id, grant.user_id
                )));
            }
        }
        Ok(())
    }

    /// Checks for a quest coming from the authoring flow.
    ///
    /// Authors supply stage identities and needs. Status, participations,
    /// grants and the ledger belong to the engine and must start empty.
    pub fn validate_import(&self) -> Result<()> {
        self.validate()?;
        if self.status != QuestStatus::Active {
            return Err(EngineError::Validation(format!(
                "quest {} must be imported as active, not {}",
                self.id,
                self.status.as_str()
            )));
        }
        for (field, len) in [
            ("participations", self.participations.len()),
            ("grants", self.grants.len()),
            ("contributions", self.contributions.len()),
        ] {
            if len > 0 {
                return Err(EngineError::Validation(format!(
                    "quest {} is imported with {len} {field}; they are recorded by the engine",
                    self.id
                )));
            }
        }
        Ok(())
    }
}
