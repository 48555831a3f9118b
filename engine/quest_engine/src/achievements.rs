//! Achievement unlocking.
//!
//! A quest grants at most one achievement per user. Grants are stored on the
//! quest record itself so the 100% crossing and the grants it produces are
//! committed together.

use chrono::{DateTime, Utc};
use tracing::info;

use crate::types::{Achievement, AchievementDefinition, Quest};

pub const DEFAULT_ICON: &str = "🏆";
pub const DEFAULT_TITLE: &str = "Quest completed";
pub const DEFAULT_DESCRIPTION: &str = "Helped bring a quest to completion";

/// System payload used when a quest defines no custom achievement.
pub fn default_definition() -> AchievementDefinition {
    AchievementDefinition {
        icon: DEFAULT_ICON.to_string(),
        title: DEFAULT_TITLE.to_string(),
        description: DEFAULT_DESCRIPTION.to_string(),
    }
}

/// Grant the quest's achievement to `user_id`, or return the existing grant.
///
/// The returned flag is `true` only when a new grant was created.
pub fn unlock(quest: &mut Quest, user_id: &str, now: DateTime<Utc>) -> (Achievement, bool) {
    if let Some(existing) = quest.grant_for(user_id) {
        return (existing.clone(), false);
    }

    let definition = quest.achievement.clone().unwrap_or_else(default_definition);
    let achievement = Achievement {
        quest_id: quest.id.clone(),
        user_id: user_id.to_string(),
        icon: definition.icon,
        title: definition.title,
        description: definition.description,
        unlocked_at: now,
    };
    quest.grants.push(achievement.clone());
    info!("Achievement unlocked on quest {} for {user_id}", quest.id);
    (achievement, true)
}

/// Grant to every current participant lacking one. Returns the new grants only.
pub fn unlock_all(quest: &mut Quest, now: DateTime<Utc>) -> Vec<Achievement> {
    let users: Vec<String> = quest
        .participations
        .iter()
        .map(|p| p.user_id.clone())
        .collect();
    users
        .iter()
        .filter_map(|user| match unlock(quest, user, now) {
            (achievement, true) => Some(achievement),
            _ => None,
        })
        .collect()
}
