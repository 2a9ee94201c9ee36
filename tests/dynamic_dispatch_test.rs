mod common;

use automarket::domain::ledger::{HoldRequest, IdempotencyKey, LedgerMetadata, LedgerOperation};
use automarket::domain::money::{Currency, Money};
use automarket::domain::ports::{LedgerGateway, LedgerHandle, MarketStore, MarketStoreHandle};
use automarket::domain::store::{ChangeSet, Record};
use automarket::domain::user::{Actor, Role};
use automarket::infrastructure::in_memory::InMemoryMarketStore;
use automarket::infrastructure::ledger::SimulatedLedger;
use std::sync::Arc;
use uuid::Uuid;

#[tokio::test]
async fn test_ports_as_trait_objects() {
    let store: MarketStoreHandle = Arc::new(InMemoryMarketStore::new());
    let ledger: LedgerHandle = Arc::new(SimulatedLedger::new());

    let user = Actor::new(Uuid::new_v4(), Role::Expert);
    let payment_id = Uuid::new_v4();

    // Verify Send + Sync by spawning tasks
    let store_task = {
        let store = store.clone();
        tokio::spawn(async move {
            store
                .commit(ChangeSet::new().put(Record::User(common::profile(user, Some("acct_1")))))
                .await
                .unwrap();
            store.user(user.user_id).await.unwrap().unwrap()
        })
    };

    let ledger_task = {
        let ledger = ledger.clone();
        tokio::spawn(async move {
            let request = HoldRequest {
                amount: Money::from_minor(2_500),
                currency: Currency::eur(),
                metadata: LedgerMetadata::new(),
                idempotency_key: IdempotencyKey::for_payment(
                    payment_id,
                    LedgerOperation::Authorize,
                ),
            };
            let first = ledger.authorize(request.clone()).await.unwrap();
            let replay = ledger.authorize(request).await.unwrap();
            (first, replay)
        })
    };

    let stored = store_task.await.unwrap();
    assert_eq!(stored.role, Role::Expert);

    let (first, replay) = ledger_task.await.unwrap();
    assert_eq!(first, replay);
}
