use std::sync::Arc;

use chrono::Utc;

use crate::invariants::{assert_all_quest_invariants, assert_ledger_matches_counters};
use crate::repository::{LocalCacheRepository, QuestRepository, DEFAULT_QUOTA_BYTES};
use crate::{
    Achievement, Contribution, ContributionAction, ContributionRequest, EngineConfig, EngineError, EngineEvent,
    ProgressColor, Quest, QuestEngine, QuestStatus, Requirement, Role, Stage,
};

fn setup() -> (Arc<LocalCacheRepository>, QuestEngine) {
    let repo = Arc::new(LocalCacheRepository::in_memory(DEFAULT_QUOTA_BYTES));
    let engine = QuestEngine::new(repo.clone(), EngineConfig::default());
    (repo, engine)
}

/// Single fundraising stage needing 1000 RUB.
fn roof_quest(collected: u64) -> Quest {
    let money = Stage::new(
        "money",
        "Roof repair fund",
        Some(Requirement::Financial {
            collected,
            needed: 1000,
            currency: "RUB".to_string(),
        }),
    )
    .unwrap();
    Quest::new("roof", "Shelter roof", vec![money]).unwrap()
}

fn donation(user: &str, amount: u64) -> ContributionRequest {
    ContributionRequest {
        quest_id: "roof".to_string(),
        stage_id: "money".to_string(),
        user_id: user.to_string(),
        role: Role::Financial,
        amount: Some(amount),
        action: None,
        timestamp: None,
        client_id: None,
    }
}

fn collected(quest: &Quest, stage: &str) -> u64 {
    quest
        .stage(stage)
        .and_then(|s| s.requirement.as_ref())
        .map(|r| r.collected())
        .unwrap()
}

#[tokio::test]
async fn test_overcommit_is_rejected_and_counter_unchanged() {
    let (_repo, engine) = setup();
    engine.register_quest(roof_quest(800)).await.unwrap();
    engine.join("roof", "donor", Role::Financial).await.unwrap();

    let err = engine.contribute(donation("donor", 300)).await.unwrap_err();
    assert!(matches!(err, EngineError::Overcommit { requested: 300, remaining: 200 }));

    let quest = engine.quest("roof").await.unwrap();
    assert_eq!(collected(&quest, "money"), 800);
    assert!(quest.contributions.is_empty());
    assert_all_quest_invariants(&quest);
}

#[tokio::test]
async fn test_exact_remaining_fills_stage() {
    let (_repo, engine) = setup();
    engine.register_quest(roof_quest(800)).await.unwrap();
    engine.join("roof", "donor", Role::Financial).await.unwrap();

    let contribution = engine.contribute(donation("donor", 200)).await.unwrap();
    assert_eq!(contribution.amount, Some(200));

    let quest = engine.quest("roof").await.unwrap();
    assert_eq!(collected(&quest, "money"), 1000);
    assert_eq!(quest.stages[0].progress, 100);
    assert_all_quest_invariants(&quest);
}

#[tokio::test]
async fn test_two_stages_at_hundred_and_fifty_is_yellow() {
    let (_repo, engine) = setup();
    let done = Stage::new("permit", "Permit", None).unwrap();
    let half = Stage::new(
        "money",
        "Fund",
        Some(Requirement::Financial {
            collected: 500,
            needed: 1000,
            currency: "RUB".to_string(),
        }),
    )
    .unwrap();
    let mut quest = Quest::new("roof", "Shelter roof", vec![done, half]).unwrap();
    quest.stages[0].progress = 100;

    let quest = engine.register_quest(quest).await.unwrap();
    assert_eq!(quest.overall_progress, 75);
    assert_eq!(quest.progress_color, ProgressColor::Yellow);
}

#[tokio::test]
async fn test_reaching_hundred_grants_every_participant_once() {
    let (_repo, engine) = setup();
    engine.register_quest(roof_quest(800)).await.unwrap();
    engine.join("roof", "donor", Role::Financial).await.unwrap();
    engine.join("roof", "friend", Role::Ambassador).await.unwrap();
    engine.join("roof", "helper", Role::Volunteer).await.unwrap();

    let mut rx = engine.subscribe();
    engine.contribute(donation("donor", 200)).await.unwrap();

    let quest = engine.quest("roof").await.unwrap();
    assert_eq!(quest.overall_progress, 100);
    assert_eq!(quest.progress_color, ProgressColor::Victory);
    assert_eq!(quest.status, QuestStatus::Completed);
    assert_eq!(quest.grants.len(), 3);
    assert_all_quest_invariants(&quest);

    // The explicit grant call returns the existing record.
    let again = engine.unlock("roof", "donor").await.unwrap();
    assert_eq!(Some(&again), quest.grant_for("donor"));
    assert_eq!(engine.quest("roof").await.unwrap().grants.len(), 3);

    let err = engine.contribute(donation("donor", 1)).await.unwrap_err();
    assert!(matches!(err, EngineError::InvalidState(_)));

    let mut kinds = Vec::new();
    while let Ok(event) = rx.try_recv() {
        kinds.push(event.as_str());
    }
    assert_eq!(
        kinds,
        vec![
            "contribution_recorded",
            "progress_changed",
            "achievement_unlocked",
            "achievement_unlocked",
            "achievement_unlocked",
            "status_changed",
        ]
    );
}

#[tokio::test]
async fn test_volunteer_sign_up_requires_role_and_fills_slots() {
    let (_repo, engine) = setup();
    let hands = Stage::new("hands", "Cleanup crew", Some(Requirement::volunteers(2))).unwrap();
    let quest = Quest::new("park", "Park cleanup", vec![hands]).unwrap();
    engine.register_quest(quest).await.unwrap();

    let sign_up = |user: &str| ContributionRequest {
        quest_id: "park".to_string(),
        stage_id: "hands".to_string(),
        user_id: user.to_string(),
        role: Role::Volunteer,
        amount: None,
        action: Some(ContributionAction::Register),
        timestamp: None,
        client_id: None,
    };

    engine.join("park", "ann", Role::Ambassador).await.unwrap();
    let err = engine.contribute(sign_up("ann")).await.unwrap_err();
    assert!(matches!(err, EngineError::Validation(_)));

    engine.join("park", "ann", Role::Volunteer).await.unwrap();
    engine.join("park", "ben", Role::Volunteer).await.unwrap();
    engine.join("park", "cat", Role::Volunteer).await.unwrap();
    engine.contribute(sign_up("ann")).await.unwrap();
    engine.contribute(sign_up("ben")).await.unwrap();

    let err = engine.contribute(sign_up("cat")).await.unwrap_err();
    assert!(matches!(err, EngineError::InvalidState(_)), "quest completed at 2/2: {err}");

    let quest = engine.quest("park").await.unwrap();
    assert_eq!(collected(&quest, "hands"), 2);
    assert_ledger_matches_counters(&quest);
}

#[tokio::test]
async fn test_full_volunteer_stage_is_overcommit_while_quest_active() {
    let (_repo, engine) = setup();
    let hands = Stage::new("hands", "Crew", Some(Requirement::volunteers(1))).unwrap();
    let fund = Stage::new("fund", "Fund", Some(Requirement::financial(100, "RUB"))).unwrap();
    engine
        .register_quest(Quest::new("park", "Park", vec![hands, fund]).unwrap())
        .await
        .unwrap();
    for user in ["ann", "ben"] {
        engine.join("park", user, Role::Volunteer).await.unwrap();
    }
    let sign_up = |user: &str| ContributionRequest {
        quest_id: "park".to_string(),
        stage_id: "hands".to_string(),
        user_id: user.to_string(),
        role: Role::Volunteer,
        amount: None,
        action: Some(ContributionAction::Register),
        timestamp: None,
        client_id: None,
    };
    engine.contribute(sign_up("ann")).await.unwrap();
    let err = engine.contribute(sign_up("ben")).await.unwrap_err();
    assert!(matches!(err, EngineError::Overcommit { requested: 1, remaining: 0 }));
}

#[tokio::test]
async fn test_ledger_sums_match_counters() {
    let (_repo, engine) = setup();
    engine.register_quest(roof_quest(0)).await.unwrap();
    for user in ["a", "b", "c"] {
        engine.join("roof", user, Role::Financial).await.unwrap();
    }
    engine.contribute(donation("a", 100)).await.unwrap();
    engine.contribute(donation("b", 250)).await.unwrap();
    engine.contribute(donation("c", 50)).await.unwrap();

    let quest = engine.quest("roof").await.unwrap();
    assert_eq!(collected(&quest, "money"), 400);
    assert_eq!(quest.overall_progress, 40);
    assert_eq!(quest.progress_color, ProgressColor::Orange);
    let ids: Vec<u64> = quest.contributions.iter().map(|c| c.id).collect();
    assert_eq!(ids, vec![1, 2, 3]);
    assert_ledger_matches_counters(&quest);
}

#[tokio::test]
async fn test_resubmission_with_same_key_counts_once() {
    let (_repo, engine) = setup();
    engine.register_quest(roof_quest(0)).await.unwrap();
    engine.join("roof", "donor", Role::Financial).await.unwrap();

    let mut request = donation("donor", 100);
    request.client_id = Some("client-7f3a".to_string());
    let first = engine.contribute(request.clone()).await.unwrap();
    let second = engine.contribute(request.clone()).await.unwrap();
    assert_eq!(first, second);

    let mut natural = donation("donor", 100);
    natural.timestamp = Some(Utc::now());
    engine.contribute(natural.clone()).await.unwrap();
    engine.contribute(natural).await.unwrap();

    let quest = engine.quest("roof").await.unwrap();
    assert_eq!(collected(&quest, "money"), 200);
    assert_eq!(quest.contributions.len(), 2);
}

#[tokio::test]
async fn test_non_participant_donation_is_rejected() {
    let (_repo, engine) = setup();
    engine.register_quest(roof_quest(0)).await.unwrap();
    let err = engine.contribute(donation("stranger", 10)).await.unwrap_err();
    assert!(matches!(err, EngineError::Validation(_)));
}

#[tokio::test]
async fn test_unknown_quest_and_stage_are_not_found() {
    let (_repo, engine) = setup();
    engine.register_quest(roof_quest(0)).await.unwrap();
    engine.join("roof", "donor", Role::Financial).await.unwrap();

    let mut request = donation("donor", 10);
    request.quest_id = "nowhere".to_string();
    assert!(matches!(
        engine.contribute(request).await,
        Err(EngineError::NotFound(_))
    ));

    let mut request = donation("donor", 10);
    request.stage_id = "walls".to_string();
    assert!(matches!(
        engine.contribute(request).await,
        Err(EngineError::NotFound(_))
    ));
}

#[tokio::test]
async fn test_quota_failure_rejects_whole_contribution() {
    let probe = roof_quest(0);
    let footprint = "quest:".len() + serde_json::to_string(&probe).unwrap().len();
    // Room for the registration and the participant, not for a ledger entry.
    let repo = Arc::new(LocalCacheRepository::in_memory(footprint + 160));
    let engine = QuestEngine::new(repo.clone(), EngineConfig::default());
    engine.register_quest(probe).await.unwrap();
    engine.join("roof", "d", Role::Financial).await.unwrap();

    let err = engine.contribute(donation("d", 10)).await.unwrap_err();
    assert!(matches!(err, EngineError::QuotaExceeded { .. }), "{err}");

    let in_memory = engine.quest("roof").await.unwrap();
    let stored = repo.load("roof").await.unwrap().unwrap();
    assert_eq!(collected(&in_memory, "money"), 0);
    assert_eq!(collected(&stored, "money"), 0);
    assert!(stored.contributions.is_empty());
}

#[tokio::test]
async fn test_engine_reloads_quest_from_repository() {
    let (repo, engine) = setup();
    engine.register_quest(roof_quest(800)).await.unwrap();
    engine.join("roof", "donor", Role::Financial).await.unwrap();
    engine.contribute(donation("donor", 150)).await.unwrap();
    drop(engine);

    let reopened = QuestEngine::new(repo, EngineConfig::default());
    let quest = reopened.quest("roof").await.unwrap();
    assert_eq!(collected(&quest, "money"), 950);
    assert_eq!(quest.overall_progress, 95);
    assert_eq!(quest.progress_color, ProgressColor::Green);
    assert_eq!(reopened.list_quests().await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_duplicate_registration_is_rejected() {
    let (_repo, engine) = setup();
    engine.register_quest(roof_quest(0)).await.unwrap();
    assert!(matches!(
        engine.register_quest(roof_quest(0)).await,
        Err(EngineError::Validation(_))
    ));
}

#[tokio::test]
async fn test_progress_event_carries_band() {
    let (_repo, engine) = setup();
    engine.register_quest(roof_quest(0)).await.unwrap();
    engine.join("roof", "donor", Role::Financial).await.unwrap();
    let mut rx = engine.subscribe();

    engine.contribute(donation("donor", 510)).await.unwrap();
    let _recorded = rx.recv().await.unwrap();
    match rx.recv().await.unwrap() {
        EngineEvent::ProgressChanged {
            overall_progress,
            progress_color,
            stage_id,
            ..
        } => {
            assert_eq!(overall_progress, 51);
            assert_eq!(progress_color, ProgressColor::Yellow);
            assert_eq!(stage_id.as_deref(), Some("money"));
        }
        other => panic!("unexpected event {other:?}"),
    }
}

fn granted(user: &str) -> Achievement {
    Achievement {
        quest_id: "roof".to_string(),
        user_id: user.to_string(),
        icon: "🏆".to_string(),
        title: "Quest completed".to_string(),
        description: "Helped bring a quest to completion".to_string(),
        unlocked_at: Utc::now(),
    }
}

#[tokio::test]
async fn test_import_rejects_duplicate_grants() {
    let (repo, engine) = setup();
    let mut quest = roof_quest(0);
    quest.grants = vec![granted("alice"), granted("alice")];

    let err = engine.register_quest(quest).await.unwrap_err();
    assert!(matches!(err, EngineError::Validation(_)));
    assert!(repo.load("roof").await.unwrap().is_none());
}

#[tokio::test]
async fn test_import_rejects_non_active_status() {
    let (repo, engine) = setup();
    for status in [QuestStatus::Completed, QuestStatus::Archived] {
        let mut quest = roof_quest(0);
        quest.status = status;
        assert!(matches!(
            engine.register_quest(quest).await,
            Err(EngineError::Validation(_))
        ));
    }
    assert!(repo.list_ids().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_import_rejects_prefilled_ledger() {
    let (_repo, engine) = setup();
    let mut quest = roof_quest(0);
    quest.contributions = vec![Contribution {
        id: 1,
        quest_id: "roof".to_string(),
        stage_id: "money".to_string(),
        user_id: "alice".to_string(),
        role: Role::Financial,
        amount: Some(90),
        action: None,
        timestamp: Utc::now(),
        client_id: None,
    }];
    assert!(matches!(
        engine.register_quest(quest).await,
        Err(EngineError::Validation(_))
    ));
    assert!(matches!(
        engine.quest("roof").await,
        Err(EngineError::NotFound(_))
    ));
}

#[tokio::test]
async fn test_replay_after_completion_is_invalid_state() {
    let (_repo, engine) = setup();
    engine.register_quest(roof_quest(0)).await.unwrap();
    engine.join("roof", "donor", Role::Financial).await.unwrap();

    let mut request = donation("donor", 1000);
    request.client_id = Some("client-final".to_string());
    engine.contribute(request.clone()).await.unwrap();
    assert_eq!(engine.quest("roof").await.unwrap().status, QuestStatus::Completed);

    let err = engine.contribute(request).await.unwrap_err();
    assert!(matches!(err, EngineError::InvalidState(_)));
    let quest = engine.quest("roof").await.unwrap();
    assert_eq!(quest.contributions.len(), 1);
    assert_eq!(collected(&quest, "money"), 1000);
}
