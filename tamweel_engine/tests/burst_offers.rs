//! Concurrency test: many banks bidding on the same application at the same instant must all land, with no lost
//! updates on the offer counter, the claim set or the collected revenue.
use std::sync::Arc;

use log::*;
use serde_json::json;
use tamweel_common::Halalas;
use tamweel_engine::{
    db_types::{ClaimKind, NewApplication, NewOffer},
    events::EventProducers,
    ApplicationManagement,
    AuctionFlowApi,
    SqliteDatabase,
};
use tokio::runtime::Runtime;

use crate::support::prepare_env::{prepare_test_env, random_db_path, tear_down};

mod support;

const NUM_BANKS: i64 = 12;
const ACCESS_FEE: Halalas = Halalas::from_sar(500);

#[test]
fn burst_offers() {
    info!("🚀️ Starting concurrent offer injection test");

    let sys = Runtime::new().unwrap();

    sys.block_on(async move {
        let url = random_db_path();
        let db = prepare_test_env(&url).await;
        let api = Arc::new(AuctionFlowApi::new(db, EventProducers::default()));

        let app = api
            .process_new_application(NewApplication::new("biz-burst", json!({"amount_sar": 1_000_000})))
            .await
            .expect("Error creating application");
        let id = app.application_id.clone();

        info!("🚀️ Injecting {NUM_BANKS} concurrent offers");
        let mut handles = Vec::new();
        for i in 0..NUM_BANKS {
            let api = Arc::clone(&api);
            let id = id.clone();
            handles.push(tokio::spawn(async move {
                let offer = NewOffer::new(id, format!("bank-{i:02}"), json!({"rate": 0.08 + (i as f64) / 100.0}))
                    .with_access_fee(ACCESS_FEE);
                api.submit_offer(offer).await
            }));
        }
        for handle in handles {
            let (_, counted) = handle.await.expect("task panicked").expect("Error submitting offer");
            assert!(counted, "every bank's first offer must be counted");
        }

        let app = api.db().fetch_application(&id).await.unwrap().unwrap();
        assert_eq!(app.offers_count, NUM_BANKS, "no lost updates on the offer counter");
        assert_eq!(app.revenue_collected, ACCESS_FEE * NUM_BANKS);
        let purchased = api.db().fetch_claims(&id, ClaimKind::Purchased).await.unwrap();
        assert_eq!(purchased.len() as i64, NUM_BANKS, "every bank appears in the purchased set exactly once");

        let offers = api.db().fetch_offers_for_application(&id).await.unwrap();
        assert_eq!(offers.len() as i64, NUM_BANKS);
        tear_down(api.db().clone()).await;
    });
    info!("🚀️ test complete");
}

#[test]
fn concurrent_resubmissions_never_double_count() {
    let sys = Runtime::new().unwrap();

    sys.block_on(async move {
        let url = random_db_path();
        let db = prepare_test_env(&url).await;
        let api = Arc::new(AuctionFlowApi::new(db, EventProducers::default()));

        let app = api
            .process_new_application(NewApplication::new("biz-resubmit", json!({"amount_sar": 50_000})))
            .await
            .unwrap();
        let id = app.application_id.clone();

        // The same bank hammers the endpoint; only one offer row, one count, one fee may result.
        let mut handles = Vec::new();
        for i in 0..8 {
            let api = Arc::clone(&api);
            let id = id.clone();
            handles.push(tokio::spawn(async move {
                let offer =
                    NewOffer::new(id, "bank-00", json!({"rate": 0.10 + (i as f64) / 100.0})).with_access_fee(ACCESS_FEE);
                api.submit_offer(offer).await
            }));
        }
        let mut counted_total = 0;
        for handle in handles {
            let (_, counted) = handle.await.expect("task panicked").expect("Error submitting offer");
            if counted {
                counted_total += 1;
            }
        }
        assert_eq!(counted_total, 1, "exactly one of the racing submissions counts");

        let app = api.db().fetch_application(&id).await.unwrap().unwrap();
        assert_eq!(app.offers_count, 1);
        assert_eq!(app.revenue_collected, ACCESS_FEE);
        let offers = api.db().fetch_offers_for_application(&id).await.unwrap();
        assert_eq!(offers.len(), 1);
        tear_down(api.db().clone()).await;
    });
}
