use std::collections::HashMap;
use std::sync::Arc;

use futures::future::join_all;
use serde_json::json;

use pao::{
    ActionProof, Decision, Error, GovernanceConfig, OrgKind, OrgStatus, PaoService,
    TransitionState,
};
use pao_storage::MemoryStorage;

fn signer(authority: &str) -> GovernanceConfig {
    GovernanceConfig::DirectSigner {
        authority: authority.to_string(),
    }
}

fn council(members: &[&str], quorum: f64, approval: f64) -> GovernanceConfig {
    GovernanceConfig::ThresholdVote {
        voters: members.iter().map(|m| (m.to_string(), 1.0)).collect(),
        quorum,
        approval_threshold: approval,
        voting_window_secs: 3600,
    }
}

#[tokio::test]
async fn data_survives_a_committed_transition() {
    let service = PaoService::in_memory();
    let id = service
        .register(OrgKind::Pao, None, signer("founder"))
        .await
        .unwrap();

    service
        .registry()
        .update_data(&id, |data| {
            data.insert("treasury".to_string(), json!({ "balance": 1200 }));
            data.insert("charter".to_string(), json!("v1"));
            Ok(())
        })
        .await
        .unwrap();
    let before = service.lookup(&id).unwrap().data;

    let handle = service
        .begin_transition(
            &id,
            council(&["a", "b", "c"], 0.5, 0.5),
            &ActionProof::unsigned("founder"),
        )
        .await
        .unwrap();
    service.commit_transition(&handle).await.unwrap();

    let after = service.lookup(&id).unwrap();
    assert_eq!(after.data, before);
    assert_eq!(after.version, 1);
    assert_eq!(after.status, OrgStatus::Active);
    assert_eq!(after.governance, council(&["a", "b", "c"], 0.5, 0.5));
}

#[tokio::test]
async fn version_is_monotone_and_untouched_by_abort() {
    let service = PaoService::in_memory();
    let id = service
        .register(OrgKind::Pao, None, signer("founder"))
        .await
        .unwrap();

    // Committed transition bumps the version
    let handle = service
        .begin_transition(&id, signer("successor"), &ActionProof::unsigned("founder"))
        .await
        .unwrap();
    service.commit_transition(&handle).await.unwrap();
    assert_eq!(service.lookup(&id).unwrap().version, 1);

    // Aborted transition leaves it alone
    let handle = service
        .begin_transition(&id, signer("founder"), &ActionProof::unsigned("successor"))
        .await
        .unwrap();
    service
        .abort_transition(&handle, "new module failed validation")
        .await
        .unwrap();

    let record = service.lookup(&id).unwrap();
    assert_eq!(record.version, 1);
    assert_eq!(record.status, OrgStatus::Active);
    assert_eq!(record.governance, signer("successor"));

    let tx = service.transitions().transition(&handle).await.unwrap();
    assert_eq!(tx.state, TransitionState::Aborted);

    // The record accepts a fresh transition afterwards
    let handle = service
        .begin_transition(&id, signer("founder"), &ActionProof::unsigned("successor"))
        .await
        .unwrap();
    service.commit_transition(&handle).await.unwrap();
    assert_eq!(service.lookup(&id).unwrap().version, 2);
}

#[tokio::test]
async fn second_begin_fails_while_staged() {
    let service = PaoService::in_memory();
    let id = service
        .register(OrgKind::Pao, None, signer("founder"))
        .await
        .unwrap();

    let _staged = service
        .begin_transition(&id, signer("cfg-a"), &ActionProof::unsigned("founder"))
        .await
        .unwrap();
    assert_eq!(service.lookup(&id).unwrap().status, OrgStatus::Migrating);

    let second = service
        .begin_transition(&id, signer("cfg-b"), &ActionProof::unsigned("founder"))
        .await;
    assert!(matches!(second, Err(Error::TransitionInProgress(_))));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_begins_have_exactly_one_winner() {
    let service = Arc::new(PaoService::in_memory());
    let id = service
        .register(OrgKind::Pao, None, signer("founder"))
        .await
        .unwrap();

    let tasks: Vec<_> = (0..8)
        .map(|i| {
            let service = service.clone();
            let id = id.clone();
            tokio::spawn(async move {
                service
                    .begin_transition(
                        &id,
                        signer(&format!("candidate-{}", i)),
                        &ActionProof::unsigned("founder"),
                    )
                    .await
            })
        })
        .collect();

    let outcomes: Vec<_> = join_all(tasks)
        .await
        .into_iter()
        .map(|joined| joined.unwrap())
        .collect();

    let winners = outcomes.iter().filter(|r| r.is_ok()).count();
    assert_eq!(winners, 1);
    for outcome in outcomes.iter().filter(|r| r.is_err()) {
        assert!(matches!(
            outcome,
            Err(Error::TransitionInProgress(_))
        ));
    }
    assert_eq!(service.lookup(&id).unwrap().status, OrgStatus::Migrating);
}

#[tokio::test]
async fn two_of_three_approvals_then_cancellation_rejects() {
    let service = PaoService::in_memory();
    // Council that requires all three members to approve
    let id = service
        .register(OrgKind::Pao, None, council(&["a", "b", "c"], 1.0, 1.0))
        .await
        .unwrap();
    let original = service.lookup(&id).unwrap().governance;

    let handle = service
        .begin_transition(&id, signer("new-boss"), &ActionProof::unsigned("a"))
        .await
        .unwrap();
    // Ballot is open; the record is not held across the wait
    assert_eq!(service.lookup(&id).unwrap().status, OrgStatus::Active);

    let d1 = service
        .transitions()
        .cast_approval(&handle, "a", true)
        .await
        .unwrap();
    assert!(matches!(d1, Decision::Pending(_)));
    let d2 = service
        .transitions()
        .cast_approval(&handle, "b", true)
        .await
        .unwrap();
    assert!(matches!(d2, Decision::Pending(_)));

    service
        .transitions()
        .cancel(&handle, "proposer withdrew")
        .await
        .unwrap();

    let tx = service.transitions().transition(&handle).await.unwrap();
    assert_eq!(tx.state, TransitionState::Rejected);

    let record = service.lookup(&id).unwrap();
    assert_eq!(record.status, OrgStatus::Active);
    assert_eq!(record.governance, original);
    assert_eq!(record.version, 0);
    // The cancelled ballot's tally is gone from the record's data
    assert!(record.data.is_empty());
}

#[tokio::test]
async fn voted_transition_stages_and_commits() {
    let service = PaoService::in_memory();
    let id = service
        .register(OrgKind::Pao, None, council(&["a", "b", "c"], 1.0, 0.5))
        .await
        .unwrap();

    let handle = service
        .begin_transition(&id, signer("delegate"), &ActionProof::unsigned("a"))
        .await
        .unwrap();

    service
        .transitions()
        .cast_approval(&handle, "a", true)
        .await
        .unwrap();
    service
        .transitions()
        .cast_approval(&handle, "b", true)
        .await
        .unwrap();
    let decision = service
        .transitions()
        .cast_approval(&handle, "c", false)
        .await
        .unwrap();
    // Everyone voted: 2 of 3 approve against a 0.5 threshold
    assert_eq!(decision, Decision::Approved);
    assert_eq!(service.lookup(&id).unwrap().status, OrgStatus::Migrating);

    service.commit_transition(&handle).await.unwrap();
    let record = service.lookup(&id).unwrap();
    assert_eq!(record.governance, signer("delegate"));
    assert_eq!(record.version, 1);
}

#[tokio::test]
async fn ineligible_voter_is_turned_away() {
    let service = PaoService::in_memory();
    let id = service
        .register(OrgKind::Pao, None, council(&["a", "b"], 1.0, 1.0))
        .await
        .unwrap();
    let handle = service
        .begin_transition(&id, signer("x"), &ActionProof::unsigned("a"))
        .await
        .unwrap();

    let result = service
        .transitions()
        .cast_approval(&handle, "stranger", true)
        .await;
    assert!(matches!(result, Err(Error::Rejected(_))));
}

#[tokio::test]
async fn rejected_begin_surfaces_the_reason() {
    let service = PaoService::in_memory();
    let id = service
        .register(OrgKind::Pao, None, signer("founder"))
        .await
        .unwrap();

    let result = service
        .begin_transition(&id, signer("usurper"), &ActionProof::unsigned("usurper"))
        .await;
    match result {
        Err(Error::Rejected(reason)) => assert!(reason.contains("usurper")),
        other => panic!("expected rejection, got {:?}", other.map(|h| h.to_string())),
    }
    // Nothing changed
    let record = service.lookup(&id).unwrap();
    assert_eq!(record.status, OrgStatus::Active);
    assert_eq!(record.version, 0);
}

#[tokio::test]
async fn commit_requires_a_staged_transition() {
    let service = PaoService::in_memory();
    let id = service
        .register(OrgKind::Pao, None, council(&["a", "b"], 1.0, 1.0))
        .await
        .unwrap();
    let handle = service
        .begin_transition(&id, signer("x"), &ActionProof::unsigned("a"))
        .await
        .unwrap();

    // Ballot still open: commit is invalid
    let result = service.commit_transition(&handle).await;
    assert!(matches!(result, Err(Error::InvalidState(_))));
}

#[tokio::test]
async fn transition_data_map_is_intact_after_voted_migration() {
    let service = PaoService::in_memory();
    let id = service
        .register(OrgKind::Pao, None, council(&["a", "b"], 1.0, 0.5))
        .await
        .unwrap();
    service
        .registry()
        .update_data(&id, |data| {
            data.insert("ledger".to_string(), json!([1, 2, 3]));
            Ok(())
        })
        .await
        .unwrap();

    let handle = service
        .begin_transition(&id, signer("next"), &ActionProof::unsigned("a"))
        .await
        .unwrap();
    service
        .transitions()
        .cast_approval(&handle, "a", true)
        .await
        .unwrap();
    service
        .transitions()
        .cast_approval(&handle, "b", true)
        .await
        .unwrap();

    // Snapshot once the ballot has concluded, before the commit
    let before = service.lookup(&id).unwrap().data;
    service.commit_transition(&handle).await.unwrap();
    let after = service.lookup(&id).unwrap().data;

    assert_eq!(after, before);
    assert_eq!(after.get("ledger"), Some(&json!([1, 2, 3])));

    let mut extra = HashMap::new();
    extra.insert("post".to_string(), json!(true));
    service
        .registry()
        .update_data(&id, move |data| {
            data.extend(extra);
            Ok(())
        })
        .await
        .unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_begins_open_at_most_one_ballot() {
    let service = Arc::new(PaoService::in_memory());
    // A council evaluator answers every request with an open ballot
    let id = service
        .register(OrgKind::Pao, None, council(&["a", "b", "c"], 1.0, 1.0))
        .await
        .unwrap();

    let tasks: Vec<_> = (0..8)
        .map(|i| {
            let service = service.clone();
            let id = id.clone();
            tokio::spawn(async move {
                service
                    .begin_transition(
                        &id,
                        signer(&format!("candidate-{}", i)),
                        &ActionProof::unsigned("a"),
                    )
                    .await
            })
        })
        .collect();

    let outcomes: Vec<_> = join_all(tasks)
        .await
        .into_iter()
        .map(|joined| joined.unwrap())
        .collect();

    // Were two ballots ever open at once, the loser would later be
    // resolved under whichever rules won; exactly one may open.
    let openers = outcomes.iter().filter(|r| r.is_ok()).count();
    assert_eq!(openers, 1);
    for outcome in outcomes.iter().filter(|r| r.is_err()) {
        assert!(matches!(outcome, Err(Error::TransitionInProgress(_))));
    }
    // The single open ballot does not hold the record
    assert_eq!(service.lookup(&id).unwrap().status, OrgStatus::Active);
}

#[tokio::test]
async fn staged_transition_survives_restart() {
    let storage: Arc<dyn pao_storage::Storage> = Arc::new(MemoryStorage::new());
    let (id, handle);
    {
        let service = PaoService::with_storage(storage.clone());
        id = service
            .register(OrgKind::Pao, None, signer("founder"))
            .await
            .unwrap();
        handle = service
            .begin_transition(
                &id,
                council(&["a", "b"], 1.0, 1.0),
                &ActionProof::unsigned("founder"),
            )
            .await
            .unwrap();
    }

    // A rebuilt service over the same storage sees the staged transition
    // and can still commit it
    let service = PaoService::load(storage).await.unwrap();
    assert_eq!(service.lookup(&id).unwrap().status, OrgStatus::Migrating);
    service.commit_transition(&handle).await.unwrap();

    let record = service.lookup(&id).unwrap();
    assert_eq!(record.version, 1);
    assert_eq!(record.status, OrgStatus::Active);
    assert_eq!(record.governance, council(&["a", "b"], 1.0, 1.0));
}

#[tokio::test]
async fn staged_transition_can_be_aborted_after_restart() {
    let storage: Arc<dyn pao_storage::Storage> = Arc::new(MemoryStorage::new());
    let (id, handle);
    {
        let service = PaoService::with_storage(storage.clone());
        id = service
            .register(OrgKind::Pao, None, signer("founder"))
            .await
            .unwrap();
        handle = service
            .begin_transition(&id, signer("successor"), &ActionProof::unsigned("founder"))
            .await
            .unwrap();
    }

    let service = PaoService::load(storage).await.unwrap();
    service
        .abort_transition(&handle, "operator rollback")
        .await
        .unwrap();

    let record = service.lookup(&id).unwrap();
    assert_eq!(record.status, OrgStatus::Active);
    assert_eq!(record.version, 0);
    assert_eq!(record.governance, signer("founder"));
}

#[tokio::test]
async fn concluded_ballot_leaves_no_tally_behind() {
    let service = PaoService::in_memory();
    let id = service
        .register(OrgKind::Pao, None, council(&["a", "b"], 1.0, 0.5))
        .await
        .unwrap();

    let handle = service
        .begin_transition(&id, signer("next"), &ActionProof::unsigned("a"))
        .await
        .unwrap();
    // While the ballot is open its tally lives in the record's data
    assert!(!service.lookup(&id).unwrap().data.is_empty());

    service
        .transitions()
        .cast_approval(&handle, "a", true)
        .await
        .unwrap();
    service
        .transitions()
        .cast_approval(&handle, "b", true)
        .await
        .unwrap();

    assert_eq!(service.lookup(&id).unwrap().status, OrgStatus::Migrating);
    assert!(service.lookup(&id).unwrap().data.is_empty());
}
