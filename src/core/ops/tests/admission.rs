use serde_json::json;

use super::{engine, engine_with, event_kinds};
use crate::core::ops::OpsError;
use crate::core::store::types::ProposalStatus;

#[tokio::test]
async fn listed_kind_is_auto_approved_with_mission() {
    let engine = engine_with(&[("auto_approve", json!({"enabled": true, "kinds": ["analysis"]}))]).await;
    let out = engine
        .proposals
        .create_proposal("analyst", "analysis", "Quarterly numbers", None)
        .await
        .unwrap();
    assert_eq!(out.proposal.status, ProposalStatus::Approved);
    assert!(out.proposal.decided_at.is_some());
    let mission = out.mission.expect("mission");
    assert_eq!(mission.mission.proposal_id, out.proposal.id);

    assert_eq!(
        event_kinds(&engine.store).await,
        vec!["proposal.created", "proposal.approved", "mission.created"]
    );
    let approved = engine
        .store
        .list_events(Some("proposal.approved"), 1)
        .await
        .unwrap();
    assert_eq!(approved[0].payload.as_ref().unwrap()["auto"], true);
}

#[tokio::test]
async fn unlisted_kind_stays_pending() {
    let engine = engine_with(&[("auto_approve", json!({"enabled": true, "kinds": ["analysis"]}))]).await;
    let out = engine
        .proposals
        .create_proposal("ops", "deploy", "Deploy v4", Some("rollout notes"))
        .await
        .unwrap();
    assert_eq!(out.proposal.status, ProposalStatus::Pending);
    assert!(out.proposal.decided_at.is_none());
    assert!(out.mission.is_none());
    assert!(engine.store.list_missions(None, 10).await.unwrap().is_empty());
}

#[tokio::test]
async fn disabled_or_missing_auto_approve_never_approves() {
    let engine = engine_with(&[("auto_approve", json!({"enabled": false, "kinds": ["analysis"]}))]).await;
    let out = engine
        .proposals
        .create_proposal("a", "analysis", "t", None)
        .await
        .unwrap();
    assert_eq!(out.proposal.status, ProposalStatus::Pending);

    let bare = engine_with(&[]).await;
    let out = bare
        .proposals
        .create_proposal("a", "analysis", "t", None)
        .await
        .unwrap();
    assert_eq!(out.proposal.status, ProposalStatus::Pending);
}

#[tokio::test]
async fn zero_daily_cap_rejects_without_persisting() {
    let engine = engine_with(&[("daily_proposal_cap", json!({"max": 0}))]).await;
    let err = engine
        .proposals
        .create_proposal("research", "research", "Deep dive", None)
        .await
        .unwrap_err();
    assert!(matches!(err, OpsError::Admission(ref reason) if reason == "Daily cap reached: 0/0"));
    assert_eq!(err.status_code(), 429);

    assert!(engine.store.list_proposals(None, 50).await.unwrap().is_empty());
    let rejected = engine
        .store
        .list_events(Some("proposal.rejected"), 10)
        .await
        .unwrap();
    assert_eq!(rejected.len(), 1);
    let payload = rejected[0].payload.as_ref().unwrap();
    assert_eq!(payload["agent_id"], "research");
    assert_eq!(payload["reason"], "Daily cap reached: 0/0");
}

#[tokio::test]
async fn daily_cap_is_per_agent() {
    let engine = engine_with(&[("daily_proposal_cap", json!({"max": 2}))]).await;
    for i in 0..2 {
        engine
            .proposals
            .create_proposal("busy", "note", &format!("n{i}"), None)
            .await
            .unwrap();
    }
    assert!(matches!(
        engine.proposals.create_proposal("busy", "note", "n2", None).await,
        Err(OpsError::Admission(_))
    ));
    engine
        .proposals
        .create_proposal("quiet", "note", "n0", None)
        .await
        .unwrap();
}

#[tokio::test]
async fn kind_cap_applies_only_when_configured() {
    let engine = engine_with(&[("content_cap", json!({"max_per_day": 1}))]).await;
    engine
        .proposals
        .create_proposal("writer", "content", "Post 1", None)
        .await
        .unwrap();
    let err = engine
        .proposals
        .create_proposal("other-writer", "content", "Post 2", None)
        .await
        .unwrap_err();
    assert_eq!(err.to_string(), "Kind cap 'content': 1/1");

    for i in 0..5 {
        engine
            .proposals
            .create_proposal("writer", "research", &format!("r{i}"), None)
            .await
            .unwrap();
    }
}

#[tokio::test]
async fn missing_fields_are_validation_errors() {
    let engine = engine().await;
    for (agent, kind, title) in [("", "analysis", "t"), ("a", " ", "t"), ("a", "analysis", "")] {
        let err = engine
            .proposals
            .create_proposal(agent, kind, title, None)
            .await
            .unwrap_err();
        assert!(matches!(err, OpsError::Validation(_)));
        assert_eq!(err.status_code(), 400);
    }
    assert!(engine.store.list_proposals(None, 50).await.unwrap().is_empty());
    assert!(event_kinds(&engine.store).await.is_empty());
}

#[tokio::test]
async fn policy_snapshot_is_frozen_at_creation() {
    let engine = engine_with(&[("daily_proposal_cap", json!({"max": 10}))]).await;
    let out = engine
        .proposals
        .create_proposal("a", "deploy", "t", None)
        .await
        .unwrap();
    assert_eq!(out.proposal.policy_snapshot["daily_proposal_cap"]["max"], 10);

    engine
        .store
        .set_policy("daily_proposal_cap", &json!({"max": 99}))
        .await
        .unwrap();
    let stored = engine.store.get_proposal(&out.proposal.id).await.unwrap().unwrap();
    assert_eq!(stored.policy_snapshot["daily_proposal_cap"]["max"], 10);
}
