//! Reconciliation tests: manufactured drift between the cached aggregates and the source-of-truth counts is
//! detected, corrected in place, and reported; a second pass comes back clean.
use serde_json::json;
use tamweel_common::Halalas;
use tamweel_engine::{
    db_types::{ApplicationStatus, ClaimKind, NewApplication, NewOffer},
    events::EventProducers,
    traits::DriftKind,
    ApplicationManagement,
    AuctionFlowApi,
    SqliteDatabase,
};

use crate::support::prepare_env::{prepare_test_env, random_db_path, tear_down};

mod support;

const ACCESS_FEE: Halalas = Halalas::from_sar(500);

async fn setup_with_offers() -> (AuctionFlowApi<SqliteDatabase>, tamweel_engine::db_types::ApplicationId) {
    let url = random_db_path();
    let db = prepare_test_env(&url).await;
    let api = AuctionFlowApi::new(db, EventProducers::default());
    let app = api
        .process_new_application(NewApplication::new("biz-rec", json!({"amount_sar": 75_000})))
        .await
        .unwrap();
    let id = app.application_id.clone();
    api.submit_offer(NewOffer::new(id.clone(), "bank-a", json!({"rate": 0.10})).with_access_fee(ACCESS_FEE))
        .await
        .unwrap();
    api.submit_offer(NewOffer::new(id.clone(), "bank-b", json!({"rate": 0.12})).with_access_fee(ACCESS_FEE))
        .await
        .unwrap();
    (api, id)
}

#[tokio::test]
async fn clean_state_reconciles_clean() {
    let (api, _) = setup_with_offers().await;
    let report = api.reconcile_aggregates().await.unwrap();
    assert!(report.is_clean(), "nothing has drifted, nothing to correct: {:?}", report.drifts);
    assert_eq!(report.applications_scanned, 1);
    tear_down(api.db().clone()).await;
}

#[tokio::test]
async fn corrupted_offer_counter_is_corrected() {
    let (api, id) = setup_with_offers().await;
    // Simulate the drift the legacy repair scripts used to chase: the counter and the table disagree.
    sqlx::query("UPDATE applications SET offers_count = 7 WHERE application_id = $1")
        .bind(id.as_str())
        .execute(api.db().pool())
        .await
        .unwrap();

    let report = api.reconcile_aggregates().await.unwrap();
    let drift = report
        .drifts
        .iter()
        .find(|d| d.kind == DriftKind::OffersCount)
        .expect("offer count drift must be reported");
    assert_eq!(drift.cached, 7);
    assert_eq!(drift.actual, 2);

    let app = api.db().fetch_application(&id).await.unwrap().unwrap();
    assert_eq!(app.offers_count, 2);
    // The correction leaves a trace in the audit log
    let audit = api.db().fetch_audit_log(&id).await.unwrap();
    assert!(audit.iter().any(|e| e.actor == "reconciliation" && e.reason.contains("offers_count 7 -> 2")));

    let second = api.reconcile_aggregates().await.unwrap();
    assert!(second.is_clean(), "a second pass must find nothing: {:?}", second.drifts);
    tear_down(api.db().clone()).await;
}

#[tokio::test]
async fn missing_purchased_claims_are_backfilled() {
    let (api, id) = setup_with_offers().await;
    sqlx::query("DELETE FROM application_claims WHERE application_id = $1 AND bank_user_id = $2")
        .bind(id.as_str())
        .bind("bank-b")
        .execute(api.db().pool())
        .await
        .unwrap();

    let report = api.reconcile_aggregates().await.unwrap();
    assert!(report.drifts.iter().any(|d| d.kind == DriftKind::PurchasedSet));

    let purchased = api.db().fetch_claims(&id, ClaimKind::Purchased).await.unwrap();
    assert_eq!(purchased, vec!["bank-a".to_string(), "bank-b".to_string()]);

    let second = api.reconcile_aggregates().await.unwrap();
    assert!(second.is_clean());
    tear_down(api.db().clone()).await;
}

#[tokio::test]
async fn stale_tracking_status_is_refreshed() {
    let (api, id) = setup_with_offers().await;
    sqlx::query("UPDATE application_tracking SET current_application_status = 'Ignored' WHERE application_id = $1")
        .bind(id.as_str())
        .execute(api.db().pool())
        .await
        .unwrap();

    let report = api.reconcile_aggregates().await.unwrap();
    let drift = report
        .drifts
        .iter()
        .find(|d| d.kind == DriftKind::TrackingStatus)
        .expect("stale tracking rows must be reported");
    assert_eq!(drift.cached, 2, "both banks' rows were stale");

    let rows = api.db().fetch_tracking_for_application(&id).await.unwrap();
    assert!(rows.iter().all(|r| r.current_application_status == ApplicationStatus::LiveAuction));

    let second = api.reconcile_aggregates().await.unwrap();
    assert!(second.is_clean());
    tear_down(api.db().clone()).await;
}
