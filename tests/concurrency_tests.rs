mod common;

use automarket::application::payments::{AuthorizeRequest, ReleaseRequest};
use automarket::domain::ledger::LedgerOperation;
use automarket::domain::payment::{PaymentRef, PaymentStatus};
use automarket::domain::ports::MarketStore;
use automarket::domain::proposal::ProposalStatus;
use automarket::domain::store::ProposalFilter;
use automarket::error::MarketError;
use automarket::infrastructure::ledger::HoldState;
use common::harness;
use std::time::Duration;
use uuid::Uuid;

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_accepts_on_one_project_have_a_single_winner() {
    let h = harness().await;
    let project = h.open_project().await;
    let a = h.propose(&h.expert, project.id, 40_000).await.unwrap();
    let b = h.propose(&h.rival, project.id, 42_000).await.unwrap();

    let mut handles = Vec::new();
    for _ in 0..4 {
        for proposal_id in [a.id, b.id] {
            let workflow = h.engine.workflow().clone();
            let client = h.client;
            handles.push(tokio::spawn(async move {
                workflow.accept(&client, proposal_id).await
            }));
        }
    }

    let mut winners = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => winners += 1,
            Err(MarketError::Conflict { .. }) => {}
            Err(other) => panic!("unexpected error: {other}"),
        }
    }
    assert_eq!(winners, 1);

    let proposals = h
        .store
        .proposals(&ProposalFilter {
            project_id: Some(project.id),
            ..Default::default()
        })
        .await
        .unwrap();
    let accepted = proposals
        .iter()
        .filter(|p| p.status == ProposalStatus::Accepted)
        .count();
    let rejected = proposals
        .iter()
        .filter(|p| p.status == ProposalStatus::Rejected)
        .count();
    assert_eq!(accepted, 1);
    assert_eq!(rejected, 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_bids_by_one_expert_leave_one_live_proposal() {
    let h = harness().await;
    let project = h.open_project().await;

    let mut handles = Vec::new();
    for price in 1..=8 {
        let workflow = h.engine.workflow().clone();
        let expert = h.expert;
        let project_id = project.id;
        handles.push(tokio::spawn(async move {
            workflow
                .create_proposal(
                    &expert,
                    automarket::application::workflow::NewProposal {
                        id: None,
                        project_id,
                        price: common::money(price * 1_000),
                        estimated_days: 5,
                        message: String::new(),
                    },
                )
                .await
        }));
    }

    let mut created = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => created += 1,
            Err(err @ MarketError::Conflict { .. }) => assert!(err.existing_id().is_some()),
            Err(other) => panic!("unexpected error: {other}"),
        }
    }
    assert_eq!(created, 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_releases_make_one_transfer() {
    let h = harness().await;
    let (project, _, payment) = h.ready_for_release(100_000).await;
    // Keep the first transfer in flight long enough for the others to collide with it.
    h.ledger
        .delay_next(LedgerOperation::Transfer, Duration::from_millis(100))
        .await;

    let mut handles = Vec::new();
    for _ in 0..8 {
        let payments = h.engine.payments().clone();
        let client = h.client;
        let request = ReleaseRequest {
            payment_id: payment.id,
            project_id: project.id,
            expert_id: h.expert.user_id,
        };
        handles.push(tokio::spawn(async move {
            payments.release(&client, request).await
        }));
    }

    let mut released = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => released += 1,
            Err(MarketError::Conflict { .. }) => {}
            Err(other) => panic!("unexpected error: {other}"),
        }
    }

    assert_eq!(released, 1);
    assert_eq!(h.ledger.calls(LedgerOperation::Transfer).await, 1);
    assert_eq!(h.ledger.transfers().await.len(), 1);
    let stored = h.store.payment(payment.id).await.unwrap().unwrap();
    assert_eq!(stored.status, PaymentStatus::Released);
    assert!(stored.reservation.is_none());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_duplicate_authorize_keeps_the_winners_hold_alive() {
    let h = harness().await;
    let (project, _) = h.contracted().await;
    h.ledger
        .delay_next(LedgerOperation::Authorize, Duration::from_millis(100))
        .await;
    h.ledger
        .delay_next(LedgerOperation::Authorize, Duration::from_millis(150))
        .await;

    let payment_id = Uuid::new_v4();
    let request = || AuthorizeRequest {
        payment_id: Some(payment_id),
        project_id: project.id,
        expert_id: h.expert.user_id,
        amount: common::money(30_000),
    };
    let payments = h.engine.payments();
    let (first, second) = tokio::join!(
        payments.authorize(&h.client, request()),
        payments.authorize(&h.client, request())
    );

    let (stored, duplicate) = match (first, second) {
        (Ok(stored), Err(err)) | (Err(err), Ok(stored)) => (stored, err),
        other => panic!("expected exactly one winner, got {other:?}"),
    };
    assert!(matches!(duplicate, MarketError::Conflict { .. }));
    assert_eq!(duplicate.existing_id(), Some(payment_id));
    assert_eq!(h.ledger.calls(LedgerOperation::Refund).await, 0);
    let hold = h.ledger.hold(&stored.hold_ref).await.unwrap();
    assert_eq!(hold.state, HoldState::Held);

    let paid = payments
        .confirm(&h.client, &PaymentRef::Id(payment_id))
        .await
        .unwrap();
    assert_eq!(paid.status, PaymentStatus::Paid);
    let hold = h.ledger.hold(&stored.hold_ref).await.unwrap();
    assert_eq!(hold.state, HoldState::Captured);
}
