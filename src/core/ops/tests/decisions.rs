use super::{engine, event_kinds};
use crate::core::ops::OpsError;
use crate::core::store::types::ProposalStatus;

#[tokio::test]
async fn approve_pending_creates_mission() {
    let engine = engine().await;
    let created = engine
        .proposals
        .create_proposal("ops", "deploy", "Deploy v4", None)
        .await
        .unwrap();
    let approved = engine
        .proposals
        .approve_proposal(&created.proposal.id)
        .await
        .unwrap();
    assert_eq!(approved.proposal_id, created.proposal.id);
    assert_eq!(approved.mission.unwrap().steps.len(), 3);

    let stored = engine
        .store
        .get_proposal(&created.proposal.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.status, ProposalStatus::Approved);
    assert!(stored.decided_at.is_some());

    let approvals = engine
        .store
        .list_events(Some("proposal.approved"), 5)
        .await
        .unwrap();
    assert_eq!(approvals[0].payload.as_ref().unwrap()["auto"], false);
}

#[tokio::test]
async fn approve_twice_is_a_state_error_and_keeps_one_mission() {
    let engine = engine().await;
    let created = engine
        .proposals
        .create_proposal("ops", "deploy", "Deploy v4", None)
        .await
        .unwrap();
    engine
        .proposals
        .approve_proposal(&created.proposal.id)
        .await
        .unwrap();
    let err = engine
        .proposals
        .approve_proposal(&created.proposal.id)
        .await
        .unwrap_err();
    assert!(matches!(err, OpsError::State(ref m) if m == "Proposal is 'approved', not 'pending'"));
    assert_eq!(engine.store.list_missions(None, 10).await.unwrap().len(), 1);
}

#[tokio::test]
async fn approve_unknown_is_not_found() {
    let engine = engine().await;
    let err = engine.proposals.approve_proposal("missing").await.unwrap_err();
    assert!(matches!(err, OpsError::NotFound(_)));
}

#[tokio::test]
async fn reject_is_idempotent_in_effect() {
    let engine = engine().await;
    let created = engine
        .proposals
        .create_proposal("ops", "deploy", "Deploy v4", None)
        .await
        .unwrap();
    engine
        .proposals
        .reject_proposal(&created.proposal.id, Some("not this week"))
        .await
        .unwrap();
    let second = engine
        .proposals
        .reject_proposal(&created.proposal.id, None)
        .await;
    assert!(matches!(second, Err(OpsError::State(_))));

    let stored = engine
        .store
        .get_proposal(&created.proposal.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.status, ProposalStatus::Rejected);

    let rejections = engine
        .store
        .list_events(Some("proposal.rejected"), 5)
        .await
        .unwrap();
    assert_eq!(rejections.len(), 1);
    assert_eq!(rejections[0].payload.as_ref().unwrap()["reason"], "not this week");
}

#[tokio::test]
async fn reject_cannot_undo_approval() {
    let engine = engine().await;
    let created = engine
        .proposals
        .create_proposal("analyst", "analysis", "auto", None)
        .await
        .unwrap();
    assert!(matches!(
        engine.proposals.reject_proposal(&created.proposal.id, None).await,
        Err(OpsError::State(_))
    ));
    assert!(matches!(
        engine.proposals.reject_proposal("nope", None).await,
        Err(OpsError::NotFound(_))
    ));
    assert_eq!(
        event_kinds(&engine.store).await,
        vec!["proposal.created", "proposal.approved", "mission.created"]
    );
}

#[tokio::test]
async fn approve_retries_expansion_left_undone_by_a_failure() {
    let engine = engine().await;
    let created = engine
        .proposals
        .create_proposal("ops", "deploy", "Deploy v4", None)
        .await
        .unwrap();
    engine
        .store
        .execute_batch(
            "CREATE TRIGGER block_missions BEFORE INSERT ON ops_missions
             BEGIN SELECT RAISE(ABORT, 'mission insert blocked'); END;",
        )
        .await
        .unwrap();

    let first = engine
        .proposals
        .approve_proposal(&created.proposal.id)
        .await
        .unwrap();
    assert!(first.mission.is_none());
    let stored = engine
        .store
        .get_proposal(&created.proposal.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.status, ProposalStatus::Approved);

    engine
        .store
        .execute_batch("DROP TRIGGER block_missions;")
        .await
        .unwrap();
    let retried = engine
        .proposals
        .approve_proposal(&created.proposal.id)
        .await
        .unwrap();
    assert_eq!(retried.mission.unwrap().steps.len(), 3);
    assert!(
        engine
            .store
            .get_mission_for_proposal(&created.proposal.id)
            .await
            .unwrap()
            .is_some()
    );

    // Once the mission exists the proposal is decided for good.
    let again = engine
        .proposals
        .approve_proposal(&created.proposal.id)
        .await
        .unwrap_err();
    assert!(matches!(again, OpsError::State(_)));
    assert_eq!(engine.store.list_missions(None, 10).await.unwrap().len(), 1);
    assert_eq!(
        engine
            .store
            .list_events(Some("proposal.approved"), 5)
            .await
            .unwrap()
            .len(),
        1
    );
}
