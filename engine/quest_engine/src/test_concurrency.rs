use std::sync::Arc;

use crate::invariants::{assert_all_quest_invariants, assert_ledger_matches_counters};
use crate::repository::{LocalCacheRepository, DEFAULT_QUOTA_BYTES};
use crate::{
    ContributionRequest, EngineConfig, EngineError, EngineEvent, Quest, QuestEngine, Requirement,
    Role, Stage,
};

const DONORS: usize = 16;

async fn setup(needed: u64) -> Arc<QuestEngine> {
    let repo = Arc::new(LocalCacheRepository::in_memory(DEFAULT_QUOTA_BYTES));
    let engine = Arc::new(QuestEngine::new(repo, EngineConfig::default()));
    let fund = Stage::new("fund", "Fund", Some(Requirement::financial(needed, "RUB"))).unwrap();
    engine
        .register_quest(Quest::new("well", "Village well", vec![fund]).unwrap())
        .await
        .unwrap();
    for i in 0..DONORS {
        engine
            .join("well", &format!("donor-{i}"), Role::Financial)
            .await
            .unwrap();
    }
    engine
}

fn donation(i: usize, amount: u64) -> ContributionRequest {
    ContributionRequest {
        quest_id: "well".to_string(),
        stage_id: "fund".to_string(),
        user_id: format!("donor-{i}"),
        role: Role::Financial,
        amount: Some(amount),
        action: None,
        timestamp: None,
        client_id: None,
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_donations_never_overcommit() {
    // 16 donors x 100 against a need of 1050: exactly 10 fit.
    let engine = setup(1050).await;

    let handles: Vec<_> = (0..DONORS)
        .map(|i| {
            let engine = engine.clone();
            tokio::spawn(async move { engine.contribute(donation(i, 100)).await })
        })
        .collect();

    let mut accepted = 0;
    let mut rejected = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => accepted += 1,
            Err(EngineError::Overcommit { .. }) => rejected += 1,
            Err(other) => panic!("unexpected error: {other}"),
        }
    }
    assert_eq!(accepted, 10);
    assert_eq!(rejected, DONORS - 10);

    let quest = engine.quest("well").await.unwrap();
    let requirement = quest.stages[0].requirement.as_ref().unwrap();
    assert_eq!(requirement.collected(), 1000);
    assert_all_quest_invariants(&quest);
    assert_ledger_matches_counters(&quest);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_crossing_grants_exactly_once() {
    // Every donor tries to close the whole gap at once; one wins.
    let engine = setup(500).await;
    let mut rx = engine.subscribe();

    let handles: Vec<_> = (0..DONORS)
        .map(|i| {
            let engine = engine.clone();
            tokio::spawn(async move { engine.contribute(donation(i, 500)).await })
        })
        .collect();

    let mut winners = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => winners += 1,
            Err(EngineError::InvalidState(_)) | Err(EngineError::Overcommit { .. }) => {}
            Err(other) => panic!("unexpected error: {other}"),
        }
    }
    assert_eq!(winners, 1);

    let quest = engine.quest("well").await.unwrap();
    assert_eq!(quest.grants.len(), DONORS);
    assert_all_quest_invariants(&quest);

    let mut unlocked = 0;
    let mut status_changes = 0;
    while let Ok(event) = rx.try_recv() {
        match event {
            EngineEvent::AchievementUnlocked { .. } => unlocked += 1,
            EngineEvent::StatusChanged { .. } => status_changes += 1,
            _ => {}
        }
    }
    assert_eq!(unlocked, DONORS);
    assert_eq!(status_changes, 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_unlock_calls_create_one_record() {
    let engine = setup(10).await;
    engine.contribute(donation(0, 10)).await.unwrap();

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let engine = engine.clone();
            tokio::spawn(async move { engine.unlock("well", "donor-3").await })
        })
        .collect();

    let mut grants = Vec::new();
    for handle in handles {
        grants.push(handle.await.unwrap().unwrap());
    }
    assert!(grants.windows(2).all(|w| w[0] == w[1]));

    let quest = engine.quest("well").await.unwrap();
    assert_eq!(
        quest.grants.iter().filter(|g| g.user_id == "donor-3").count(),
        1
    );
}
