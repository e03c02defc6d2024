//! Event hook tests: every lifecycle transition publishes its event exactly once, after commit.
use std::sync::{
    atomic::{AtomicI32, Ordering},
    Arc,
};

use chrono::Duration;
use futures_util::FutureExt;
use log::*;
use serde_json::json;
use tamweel_engine::{
    db_types::{ApplicationStatus, NewApplication, NewOffer},
    events::{EventHandlers, EventHooks},
    AuctionFlowApi,
    SqliteDatabase,
};
use tokio::runtime::Runtime;

use crate::support::prepare_env::{prepare_test_env, random_db_path, tear_down};

mod support;

#[derive(Default, Clone)]
struct HookCalled {
    called: Arc<AtomicI32>,
}

impl HookCalled {
    pub fn called(&self) {
        let _ = self.called.fetch_add(1, Ordering::Relaxed);
    }

    pub fn count(&self) -> i32 {
        self.called.load(Ordering::Relaxed)
    }
}

async fn setup(hooks: EventHooks) -> AuctionFlowApi<SqliteDatabase> {
    let url = random_db_path();
    let db = prepare_test_env(&url).await;
    let handlers = EventHandlers::new(10, hooks);
    let producers = handlers.producers();
    handlers.start_handlers().await;
    AuctionFlowApi::new(db, producers)
}

#[test]
fn on_application_created() {
    let rt = Runtime::new().unwrap();
    let event = HookCalled::default();
    let event_copy = event.clone();
    rt.block_on(async move {
        let mut hooks = EventHooks::default();
        hooks.on_application_created(move |ev| {
            info!("🪝️ {:?}", ev.application.application_id);
            event_copy.called();
            async {}.boxed()
        });
        let api = setup(hooks).await;
        api.process_new_application(NewApplication::new("biz-1", json!({"amount_sar": 10_000})))
            .await
            .expect("Error processing application");
        api.process_new_application(NewApplication::new("biz-2", json!({"amount_sar": 20_000})))
            .await
            .expect("Error processing application");
        tokio::time::sleep(std::time::Duration::from_millis(250)).await;
        tear_down(api.db().clone()).await;
    });
    assert_eq!(event.count(), 2);
    info!("🪝️ test complete");
}

#[test]
fn on_auction_closed_fires_for_both_outcomes() {
    let rt = Runtime::new().unwrap();
    let completed = HookCalled::default();
    let ignored = HookCalled::default();
    let (completed_copy, ignored_copy) = (completed.clone(), ignored.clone());
    rt.block_on(async move {
        let mut hooks = EventHooks::default();
        hooks.on_auction_closed(move |ev| {
            match ev.outcome {
                ApplicationStatus::Completed => completed_copy.called(),
                ApplicationStatus::Ignored => ignored_copy.called(),
                ApplicationStatus::LiveAuction => panic!("a live auction cannot close"),
            }
            async {}.boxed()
        });
        let api = setup(hooks).await;
        let with_offer = api
            .process_new_application(
                NewApplication::new("biz-1", json!({})).with_auction_window(Duration::seconds(2)),
            )
            .await
            .unwrap();
        api.process_new_application(NewApplication::new("biz-2", json!({})).with_auction_window(Duration::seconds(2)))
            .await
            .unwrap();
        api.submit_offer(NewOffer::new(with_offer.application_id.clone(), "bank-a", json!({"rate": 0.1})))
            .await
            .unwrap();

        tokio::time::sleep(std::time::Duration::from_millis(2500)).await;
        api.sweep_expired_auctions(Duration::hours(24)).await.unwrap();
        // Idempotence carries through to the hooks: a second sweep publishes nothing
        api.sweep_expired_auctions(Duration::hours(24)).await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(250)).await;
        tear_down(api.db().clone()).await;
    });
    assert_eq!(completed.count(), 1);
    assert_eq!(ignored.count(), 1);
}

#[test]
fn on_offer_selected() {
    let rt = Runtime::new().unwrap();
    let event = HookCalled::default();
    let event_copy = event.clone();
    rt.block_on(async move {
        let mut hooks = EventHooks::default();
        hooks.on_offer_selected(move |ev| {
            info!("🪝️ winning offer {:?}", ev.offer.offer_id);
            event_copy.called();
            async {}.boxed()
        });
        let api = setup(hooks).await;
        let app = api
            .process_new_application(
                NewApplication::new("biz-1", json!({})).with_auction_window(Duration::seconds(2)),
            )
            .await
            .unwrap();
        let id = app.application_id.clone();
        let (offer, _) =
            api.submit_offer(NewOffer::new(id.clone(), "bank-a", json!({"rate": 0.1}))).await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(2500)).await;
        api.sweep_expired_auctions(Duration::hours(24)).await.unwrap();
        api.select_winning_offer(&id, &offer.offer_id, "biz-1").await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(250)).await;
        tear_down(api.db().clone()).await;
    });
    assert_eq!(event.count(), 1);
}
