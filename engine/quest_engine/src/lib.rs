//! # Quest Engine
//!
//! Core of the volunteer-engagement directory's quest system. It turns
//! individual contributions (donations, volunteer sign-ups, item pledges)
//! into stage and overall progress, derives the visual progress band, and
//! grants a one-time achievement when a quest reaches 100%.
//!
//! | Phase         | Entry Point(s)                                   |
//! |---------------|--------------------------------------------------|
//! | Authoring     | [`QuestEngine::register_quest`]                  |
//! | Participation | [`QuestEngine::join`], [`QuestEngine::can_perform`] |
//! | Contribution  | [`QuestEngine::contribute`]                      |
//! | Curation      | `set_stage_progress`, `complete`, `archive`      |
//! | Achievements  | [`QuestEngine::unlock`]                          |
//! | Queries       | `quest`, `list_quests`, `subscribe`              |
//!
//! ## Architecture
//!
//! Progress math lives in [`progress`], counter updates in [`ledger`], role
//! rules in [`participation`], grants in [`achievements`] and status changes
//! in [`lifecycle`]. Persistence goes through the [`repository`] port. This
//! file contains the public entry points, the commit sequence and event
//! emission.
//!
//! ## Commit sequence
//!
//! Each quest has its own async mutex. A mutation locks it, works on a clone,
//! recomputes progress, grants achievements on the 100% crossing, applies the
//! lifecycle step, checks the storage quota, saves, and only then replaces the
//! in-memory quest and publishes events. Any error before the swap leaves
//! memory and storage as they were.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::{broadcast, Mutex, RwLock};
use tracing::{info, warn};

pub mod achievements;
pub mod config;
pub mod errors;
pub mod events;
pub mod ledger;
pub mod lifecycle;
pub mod participation;
pub mod progress;
pub mod repository;
pub mod stage;
pub mod types;

#[cfg(test)]
mod invariants;
#[cfg(test)]
mod test_concurrency;
#[cfg(test)]
mod test_contributions;

pub use config::EngineConfig;
pub use errors::{EngineError, Result};
pub use events::{EngineEvent, EventBus};
pub use lifecycle::CompletionPolicy;
pub use participation::Action;
pub use repository::{LocalCacheRepository, QuestRepository, RemoteQuestRepository};
pub use types::{
    Achievement, AchievementDefinition, Contribution, ContributionAction, ContributionRequest,
    Participation, ProgressColor, Quest, QuestStatus, Requirement, Role, Stage, StageStatus,
};

use stage::MAX_PROGRESS;

type Slot = Arc<Mutex<Quest>>;

pub struct QuestEngine {
    repository: Arc<dyn QuestRepository>,
    config: EngineConfig,
    bus: EventBus,
    quests: RwLock<HashMap<String, Slot>>,
}

impl QuestEngine {
    pub fn new(repository: Arc<dyn QuestRepository>, config: EngineConfig) -> Self {
        let bus = EventBus::new(config.event_buffer);
        Self {
            repository,
            config,
            bus,
            quests: RwLock::new(HashMap::new()),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Receive every event committed from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.bus.subscribe()
    }

    // ─────────────────────────────────────────────────────────
    // Authoring & queries
    // ─────────────────────────────────────────────────────────

    /// Import a quest produced by the authoring flow.
    ///
    /// Stage identities and needs are taken as given; derived fields
    /// (stage progress, overall progress, color) are recomputed. The quest
    /// must arrive active, with no participations, grants or contributions.
    pub async fn register_quest(&self, mut quest: Quest) -> Result<Quest> {
        quest.validate_import()?;

        let mut quests = self.quests.write().await;
        if quests.contains_key(&quest.id) || self.repository.load(&quest.id).await?.is_some() {
            return Err(EngineError::Validation(format!(
                "quest {} is already registered",
                quest.id
            )));
        }

        progress::recompute(&mut quest);
        lifecycle::advance(&mut quest, self.config.completion_policy);
        self.repository.ensure_capacity(&quest).await?;
        self.repository.save(&quest).await?;

        quests.insert(quest.id.clone(), Arc::new(Mutex::new(quest.clone())));
        info!(
            "Registered quest {} with {} stage(s) at {}%",
            quest.id,
            quest.stages.len(),
            quest.overall_progress
        );
        Ok(quest)
    }

    /// Snapshot of a quest.
    pub async fn quest(&self, quest_id: &str) -> Result<Quest> {
        let slot = self.slot(quest_id).await?;
        let quest = slot.lock().await;
        Ok(quest.clone())
    }

    /// Snapshots of every stored quest, ordered by id.
    pub async fn list_quests(&self) -> Result<Vec<Quest>> {
        let mut ids = self.repository.list_ids().await?;
        ids.sort();
        let mut quests = Vec::with_capacity(ids.len());
        for id in ids {
            quests.push(self.quest(&id).await?);
        }
        Ok(quests)
    }

    // ─────────────────────────────────────────────────────────
    // Participation
    // ─────────────────────────────────────────────────────────

    /// Enroll `user_id` in a quest under `role`. Additive across calls.
    pub async fn join(&self, quest_id: &str, user_id: &str, role: Role) -> Result<Participation> {
        if user_id.trim().is_empty() {
            return Err(EngineError::Validation("userId is required".to_string()));
        }
        let slot = self.slot(quest_id).await?;
        let mut current = slot.lock().await;
        lifecycle::ensure_active(&current)?;

        let before = current.participation(user_id).cloned();
        let mut next = current.clone();
        let participation = participation::join(&mut next, user_id, role, Utc::now());
        if before.as_ref() == Some(&participation) {
            return Ok(participation);
        }

        self.commit(&mut current, next).await?;
        self.bus.publish(EngineEvent::ParticipantJoined {
            participation: participation.clone(),
        });
        Ok(participation)
    }

    /// Whether `user_id` may perform `action` on a quest. Non-participants may not.
    pub async fn can_perform(&self, quest_id: &str, user_id: &str, action: Action) -> Result<bool> {
        let quest = self.quest(quest_id).await?;
        Ok(quest
            .participation(user_id)
            .map(|p| participation::can_perform(p, action))
            .unwrap_or(false))
    }

    // ─────────────────────────────────────────────────────────
    // Contributions
    // ─────────────────────────────────────────────────────────

    /// Record a contribution and update the stage counter atomically.
    ///
    /// A request whose idempotency key matches a recorded contribution
    /// returns that contribution without counting it again, as long as the
    /// quest is still active.
    pub async fn contribute(&self, request: ContributionRequest) -> Result<Contribution> {
        let result = self.try_contribute(&request).await;
        if let Err(e) = &result {
            warn!(
                "Rejected contribution to quest {} stage {} by {}: {e}",
                request.quest_id, request.stage_id, request.user_id
            );
        }
        result
    }

    async fn try_contribute(&self, request: &ContributionRequest) -> Result<Contribution> {
        ledger::validate_request(request)?;

        let slot = self.slot(&request.quest_id).await?;
        let mut current = slot.lock().await;
        lifecycle::ensure_active(&current)?;

        if let Some(existing) = ledger::find_recorded(&current, request)? {
            info!(
                "Contribution {} on quest {} resubmitted; returning recorded entry",
                existing.id, existing.quest_id
            );
            return Ok(existing);
        }

        let now = Utc::now();
        let mut next = current.clone();
        let holder = next.participation(&request.user_id).cloned();
        let contribution = ledger::record(&mut next, request, holder.as_ref(), now)?;

        let mut events = vec![EngineEvent::ContributionRecorded {
            contribution: contribution.clone(),
        }];
        events.extend(self.settle(&mut next, Some(&request.stage_id), now));

        self.commit(&mut current, next).await?;
        info!(
            "Contribution {} committed on quest {} ({}%)",
            contribution.id, current.id, current.overall_progress
        );
        self.bus.publish_all(events);
        Ok(contribution)
    }

    // ─────────────────────────────────────────────────────────
    // Curation & lifecycle
    // ─────────────────────────────────────────────────────────

    /// Set progress on a stage without a requirement. Progress may not decrease.
    pub async fn set_stage_progress(&self, quest_id: &str, stage_id: &str, value: u8) -> Result<Quest> {
        if value > MAX_PROGRESS {
            return Err(EngineError::Validation(format!(
                "progress {value} outside [0, 100]"
            )));
        }
        let slot = self.slot(quest_id).await?;
        let mut current = slot.lock().await;
        lifecycle::ensure_active(&current)?;

        let mut next = current.clone();
        let stage = next
            .stage_mut(stage_id)
            .ok_or_else(|| EngineError::NotFound(format!("stage {stage_id} in quest {quest_id}")))?;
        if stage.requirement.is_some() {
            return Err(EngineError::InvalidState(format!(
                "stage {stage_id} derives its progress from its requirement"
            )));
        }
        if value < stage.progress {
            return Err(EngineError::Validation(format!(
                "stage {stage_id} progress cannot go from {} down to {value}",
                stage.progress
            )));
        }
        stage.progress = value;

        let events = self.settle(&mut next, Some(stage_id), Utc::now());
        self.commit(&mut current, next).await?;
        self.bus.publish_all(events);
        Ok(current.clone())
    }

    /// Curator confirmation under [`CompletionPolicy::CuratorConfirmed`].
    pub async fn complete(&self, quest_id: &str) -> Result<Quest> {
        self.transition(quest_id, lifecycle::confirm_completion).await
    }

    /// External archival of a completed quest.
    pub async fn archive(&self, quest_id: &str) -> Result<Quest> {
        self.transition(quest_id, lifecycle::archive).await
    }

    async fn transition(
        &self,
        quest_id: &str,
        step: fn(&mut Quest) -> Result<lifecycle::Transition>,
    ) -> Result<Quest> {
        let slot = self.slot(quest_id).await?;
        let mut current = slot.lock().await;
        let mut next = current.clone();
        let transition = step(&mut next)?;
        self.commit(&mut current, next).await?;
        self.bus.publish(EngineEvent::StatusChanged {
            quest_id: quest_id.to_string(),
            from: transition.from,
            to: transition.to,
        });
        Ok(current.clone())
    }

    // ─────────────────────────────────────────────────────────
    // Achievements
    // ─────────────────────────────────────────────────────────

    /// Grant the quest's achievement to a participant of a fully progressed
    /// quest, or return the grant they already hold.
    pub async fn unlock(&self, quest_id: &str, user_id: &str) -> Result<Achievement> {
        let slot = self.slot(quest_id).await?;
        let mut current = slot.lock().await;

        if let Some(existing) = current.grant_for(user_id) {
            return Ok(existing.clone());
        }
        if current.overall_progress < MAX_PROGRESS {
            return Err(EngineError::InvalidState(format!(
                "quest {quest_id} is at {}%, not 100%",
                current.overall_progress
            )));
        }
        if current.participation(user_id).is_none() {
            return Err(EngineError::NotFound(format!(
                "participant {user_id} in quest {quest_id}"
            )));
        }

        let mut next = current.clone();
        let (achievement, _) = achievements::unlock(&mut next, user_id, Utc::now());
        self.commit(&mut current, next).await?;
        self.bus.publish(EngineEvent::AchievementUnlocked {
            achievement: achievement.clone(),
        });
        Ok(achievement)
    }

    // ─────────────────────────────────────────────────────────
    // Internals
    // ─────────────────────────────────────────────────────────

    /// Recompute progress, grant on the 100% crossing, apply the lifecycle step.
    fn settle(&self, quest: &mut Quest, stage_id: Option<&str>, now: DateTime<Utc>) -> Vec<EngineEvent> {
        let change = progress::recompute(quest);
        let mut events = vec![EngineEvent::ProgressChanged {
            quest_id: quest.id.clone(),
            stage_id: stage_id.map(str::to_string),
            overall_progress: change.after,
            progress_color: change.color,
        }];

        if change.crossed_completion() {
            events.extend(
                achievements::unlock_all(quest, now)
                    .into_iter()
                    .map(|achievement| EngineEvent::AchievementUnlocked { achievement }),
            );
        }
        if let Some(t) = lifecycle::advance(quest, self.config.completion_policy) {
            events.push(EngineEvent::StatusChanged {
                quest_id: quest.id.clone(),
                from: t.from,
                to: t.to,
            });
        }
        events
    }

    /// Validate, check quota, save, then replace the in-memory quest.
    async fn commit(&self, current: &mut Quest, next: Quest) -> Result<()> {
        next.validate()?;
        self.repository.ensure_capacity(&next).await?;
        self.repository.save(&next).await?;
        *current = next;
        Ok(())
    }

    async fn slot(&self, quest_id: &str) -> Result<Slot> {
        if let Some(slot) = self.quests.read().await.get(quest_id) {
            return Ok(slot.clone());
        }

        let mut quests = self.quests.write().await;
        if let Some(slot) = quests.get(quest_id) {
            return Ok(slot.clone());
        }
        let mut quest = self
            .repository
            .load(quest_id)
            .await?
            .ok_or_else(|| EngineError::NotFound(format!("quest {quest_id}")))?;
        quest.validate()?;
        progress::recompute(&mut quest);

        let slot = Arc::new(Mutex::new(quest));
        quests.insert(quest_id.to_string(), slot.clone());
        Ok(slot)
    }
}
