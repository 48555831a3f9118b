//! Engine events and the broadcast bus UI layers subscribe to.
//!
//! Events are published after a commit succeeds, while the quest lock is
//! still held, so a subscriber sees one quest's events in commit order.

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::debug;

use crate::types::{
    Achievement, Contribution, Participation, ProgressColor, QuestStatus,
};

pub const DEFAULT_EVENT_BUFFER: usize = 1024;

/// Everything observable that the engine commits.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EngineEvent {
    ContributionRecorded {
        contribution: Contribution,
    },
    #[serde(rename_all = "camelCase")]
    ProgressChanged {
        quest_id: String,
        stage_id: Option<String>,
        overall_progress: u8,
        progress_color: ProgressColor,
    },
    AchievementUnlocked {
        achievement: Achievement,
    },
    #[serde(rename_all = "camelCase")]
    StatusChanged {
        quest_id: String,
        from: QuestStatus,
        to: QuestStatus,
    },
    ParticipantJoined {
        participation: Participation,
    },
}

impl EngineEvent {
    /// Short identifier string suitable for storage in an event log.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ContributionRecorded { .. } => "contribution_recorded",
            Self::ProgressChanged { .. } => "progress_changed",
            Self::AchievementUnlocked { .. } => "achievement_unlocked",
            Self::StatusChanged { .. } => "status_changed",
            Self::ParticipantJoined { .. } => "participant_joined",
        }
    }

    pub fn quest_id(&self) -> &str {
        match self {
            Self::ContributionRecorded { contribution } => &contribution.quest_id,
            Self::ProgressChanged { quest_id, .. } | Self::StatusChanged { quest_id, .. } => {
                quest_id
            }
            Self::AchievementUnlocked { achievement } => &achievement.quest_id,
            Self::ParticipantJoined { participation } => &participation.quest_id,
        }
    }

    /// The user the event concerns, if any.
    pub fn actor(&self) -> Option<&str> {
        match self {
            Self::ContributionRecorded { contribution } => Some(&contribution.user_id),
            Self::AchievementUnlocked { achievement } => Some(&achievement.user_id),
            Self::ParticipantJoined { participation } => Some(&participation.user_id),
            Self::ProgressChanged { .. } | Self::StatusChanged { .. } => None,
        }
    }

    /// Amount moved by the event, if any.
    pub fn amount(&self) -> Option<u64> {
        match self {
            Self::ContributionRecorded { contribution } => contribution.amount,
            _ => None,
        }
    }
}

/// Fan-out of committed events. Cloning shares the same channel.
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<EngineEvent>,
}

impl EventBus {
    pub fn new(buffer: usize) -> Self {
        let (tx, _) = broadcast::channel(buffer.max(1));
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.tx.subscribe()
    }

    /// Publish without failing: having no subscribers is normal.
    pub fn publish(&self, event: EngineEvent) {
        let kind = event.as_str();
        match self.tx.send(event) {
            Ok(receivers) => debug!("Published {kind} to {receivers} subscriber(s)"),
            Err(_) => debug!("Published {kind} with no subscribers"),
        }
    }

    pub fn publish_all(&self, events: impl IntoIterator<Item = EngineEvent>) {
        for event in events {
            self.publish(event);
        }
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_EVENT_BUFFER)
    }
}
