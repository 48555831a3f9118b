#![allow(dead_code)]

use std::collections::HashSet;

use crate::progress;
use crate::types::{Quest, QuestStatus};

/// every requirement keeps `0 <= collected <= needed`.
pub fn assert_counters_within_need(quest: &Quest) {
    for stage in &quest.stages {
        if let Some(requirement) = &stage.requirement {
            assert!(
                requirement.collected() <= requirement.needed(),
                "stage {} of quest {} has collected {} above needed {}",
                stage.id,
                quest.id,
                requirement.collected(),
                requirement.needed()
            );
        }
    }
}

/// stage and overall progress stay within [0, 100].
pub fn assert_progress_in_range(quest: &Quest) {
    for stage in &quest.stages {
        assert!(
            stage.progress <= 100,
            "stage {} has progress {}",
            stage.id,
            stage.progress
        );
    }
    assert!(
        quest.overall_progress <= 100,
        "quest {} has overall progress {}",
        quest.id,
        quest.overall_progress
    );
}

/// the color band is exactly the one for the overall value.
pub fn assert_color_matches(quest: &Quest) {
    assert_eq!(
        quest.progress_color,
        progress::progress_color(quest.overall_progress),
        "quest {} at {}% shows {:?}",
        quest.id,
        quest.overall_progress,
        quest.progress_color
    );
}

/// at most one achievement per (quest, user).
pub fn assert_single_grant_per_user(quest: &Quest) {
    let mut seen = HashSet::new();
    for grant in &quest.grants {
        assert!(
            seen.insert(grant.user_id.as_str()),
            "user {} holds more than one achievement for quest {}",
            grant.user_id,
            quest.id
        );
    }
}

/// status only moves forward.
pub fn assert_status_not_regressed(before: QuestStatus, after: QuestStatus) {
    let rank = |s: QuestStatus| match s {
        QuestStatus::Active => 0,
        QuestStatus::Completed => 1,
        QuestStatus::Archived => 2,
    };
    assert!(
        rank(after) >= rank(before),
        "status moved from {:?} back to {:?}",
        before,
        after
    );
}

/// Counters equal the sum of what the ledger recorded for each stage.
pub fn assert_ledger_matches_counters(quest: &Quest) {
    for stage in &quest.stages {
        let Some(requirement) = &stage.requirement else {
            continue;
        };
        let recorded: u64 = quest
            .contributions
            .iter()
            .filter(|c| c.stage_id == stage.id)
            .map(|c| c.amount.unwrap_or(1))
            .sum();
        assert_eq!(
            recorded,
            requirement.collected(),
            "ledger for stage {} sums to {recorded}, counter reads {}",
            stage.id,
            requirement.collected()
        );
    }
}

/// Run all stateless quest invariants.
pub fn assert_all_quest_invariants(quest: &Quest) {
    assert_counters_within_need(quest);
    assert_progress_in_range(quest);
    assert_color_matches(quest);
    assert_single_grant_per_user(quest);
}
