use std::collections::HashMap;

use pao::{Error, GovernanceConfig, OrgId, OrgKind, OrgStatus, PaoService};

fn signer(authority: &str) -> GovernanceConfig {
    GovernanceConfig::DirectSigner {
        authority: authority.to_string(),
    }
}

fn council(members: &[&str]) -> GovernanceConfig {
    GovernanceConfig::ThresholdVote {
        voters: members.iter().map(|m| (m.to_string(), 1.0)).collect(),
        quorum: 0.5,
        approval_threshold: 0.5,
        voting_window_secs: 3600,
    }
}

#[tokio::test]
async fn register_creates_active_record_at_version_zero() {
    let service = PaoService::in_memory();
    let id = service
        .register(OrgKind::Pao, None, signer("founder"))
        .await
        .unwrap();

    let record = service.lookup(&id).unwrap();
    assert_eq!(record.kind, OrgKind::Pao);
    assert_eq!(record.version, 0);
    assert_eq!(record.status, OrgStatus::Active);
    assert!(record.data.is_empty());
}

#[tokio::test]
async fn lookup_of_unknown_org_fails() {
    let service = PaoService::in_memory();
    let result = service.lookup(&OrgId::from("org:missing"));
    assert!(matches!(result, Err(Error::NotFound(_))));
}

#[tokio::test]
async fn dependents_cover_the_whole_subtree() {
    let service = PaoService::in_memory();
    let p = service
        .register(OrgKind::Pao, None, signer("founder"))
        .await
        .unwrap();
    let s1 = service
        .register(OrgKind::Sao, Some(p.clone()), GovernanceConfig::Delegated)
        .await
        .unwrap();
    let s2 = service
        .register(OrgKind::Sao, Some(s1.clone()), GovernanceConfig::Delegated)
        .await
        .unwrap();
    let s3 = service
        .register(OrgKind::Sao, Some(s2.clone()), council(&["a", "b"]))
        .await
        .unwrap();

    let dependents = service.registry().list_dependents(&p).unwrap();
    assert_eq!(dependents.len(), 3);
    for id in [&s1, &s2, &s3] {
        assert!(dependents.contains(id));
    }

    let mid = service.registry().list_dependents(&s1).unwrap();
    assert_eq!(mid.len(), 2);
    assert!(!mid.contains(&s1));
}

#[tokio::test]
async fn no_registration_sequence_can_produce_a_cycle() {
    let service = PaoService::in_memory();

    // A parent must exist before its children, so self-parenting via an
    // explicit id is rejected outright.
    let id = OrgId::from("org:self");
    let result = service
        .registry()
        .register(
            OrgKind::Sao,
            Some(id.clone()),
            signer("founder"),
            Some(id),
        )
        .await;
    assert!(matches!(result, Err(Error::InvalidParent(_))));

    // And every chain built from valid registrations terminates at a
    // parentless PAO.
    let p = service
        .register(OrgKind::Pao, None, signer("founder"))
        .await
        .unwrap();
    let mut current = p.clone();
    for _ in 0..4 {
        current = service
            .register(OrgKind::Sao, Some(current), GovernanceConfig::Delegated)
            .await
            .unwrap();
    }
    let mut walked = 0;
    let mut cursor = service.lookup(&current).unwrap();
    while let Some(parent) = cursor.parent.clone() {
        cursor = service.lookup(&parent).unwrap();
        walked += 1;
        assert!(walked <= 5, "parent chain did not terminate");
    }
    assert_eq!(cursor.id, p);
    assert_eq!(cursor.kind, OrgKind::Pao);
}

#[tokio::test]
async fn frozen_organizations_reject_mutations() {
    let service = PaoService::in_memory();
    let id = service
        .register(OrgKind::Pao, None, signer("founder"))
        .await
        .unwrap();

    service.registry().freeze(&id).await.unwrap();
    assert_eq!(service.lookup(&id).unwrap().status, OrgStatus::Frozen);

    let begin = service
        .begin_transition(
            &id,
            signer("other"),
            &pao::ActionProof::unsigned("founder"),
        )
        .await;
    assert!(matches!(begin, Err(Error::InvalidState(_))));

    service.registry().thaw(&id).await.unwrap();
    assert_eq!(service.lookup(&id).unwrap().status, OrgStatus::Active);
}

#[tokio::test]
async fn failed_operations_do_not_disturb_other_records() {
    let service = PaoService::in_memory();
    let a = service
        .register(OrgKind::Pao, None, signer("alice"))
        .await
        .unwrap();
    let b = service
        .register(OrgKind::Pao, None, signer("bob"))
        .await
        .unwrap();

    // A rejected transition on `a` leaves `b` untouched
    let result = service
        .begin_transition(&a, signer("mallory"), &pao::ActionProof::unsigned("mallory"))
        .await;
    assert!(matches!(result, Err(Error::Rejected(_))));

    let record_b = service.lookup(&b).unwrap();
    assert_eq!(record_b.status, OrgStatus::Active);
    assert_eq!(record_b.version, 0);

    let mut hash = HashMap::new();
    hash.insert("x".to_string(), serde_json::json!(true));
    service
        .registry()
        .update_data(&b, move |data| {
            data.extend(hash);
            Ok(())
        })
        .await
        .unwrap();
    assert_eq!(service.lookup(&b).unwrap().data.len(), 1);
}
