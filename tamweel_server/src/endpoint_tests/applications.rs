use actix_web::{
    test,
    test::TestRequest,
    web,
    App,
};
use chrono::{Duration, Utc};
use serde_json::json;
use tamweel_engine::{
    db_types::{ApplicationStatus, OfferStatus},
    events::EventProducers,
    ApplicationApi,
    AuctionFlowApi,
    SqliteDatabase,
};

use super::helpers::{api_scope, as_admin, as_bank, as_bank_employee, as_business, test_db};
use crate::{
    config::ServerConfig,
    data_objects::{ApplicationCreatedResponse, ClaimResponse, OfferResponse, SelectOfferResponse, SweepSummary},
    routes::health,
};

macro_rules! init_app {
    ($db:expr) => {{
        let config = ServerConfig::default();
        test::init_service(
            App::new()
                .app_data(web::Data::new(AuctionFlowApi::new($db.clone(), EventProducers::default())))
                .app_data(web::Data::new(ApplicationApi::new($db.clone())))
                .app_data(web::Data::new(config))
                .service(health)
                .service(api_scope()),
        )
        .await
    }};
}

/// Pull the auction window into the past so that time-driven behaviour can be exercised without sleeping. Both
/// bounds move together, preserving the window-length invariant.
async fn backdate_auction(db: &SqliteDatabase, application_id: &str, hours: i64) {
    let submitted = Utc::now() - Duration::hours(hours);
    let end = submitted + Duration::hours(48);
    sqlx::query("UPDATE applications SET submitted_at = $2, auction_end_time = $3 WHERE application_id = $1")
        .bind(application_id)
        .bind(submitted)
        .bind(end)
        .execute(db.pool())
        .await
        .expect("Error backdating application");
}

#[actix_web::test]
async fn health_needs_no_identity() {
    let db = test_db().await;
    let app = init_app!(db);
    let req = TestRequest::get().uri("/health").to_request();
    let res = test::call_service(&app, req).await;
    assert!(res.status().is_success());
}

#[actix_web::test]
async fn api_calls_without_identity_are_unauthorized() {
    let db = test_db().await;
    let app = init_app!(db);
    let req = TestRequest::post().uri("/api/applications").set_json(json!({"payload": {}})).to_request();
    let res = test::call_service(&app, req).await;
    assert_eq!(res.status().as_u16(), 401);
}

#[actix_web::test]
async fn banks_cannot_submit_applications() {
    let db = test_db().await;
    let app = init_app!(db);
    let req = as_bank(TestRequest::post().uri("/api/applications"), "bank-1")
        .set_json(json!({"payload": {}}))
        .to_request();
    let res = test::call_service(&app, req).await;
    assert_eq!(res.status().as_u16(), 403);
}

#[actix_web::test]
async fn business_submits_one_live_application() {
    let db = test_db().await;
    let app = init_app!(db);

    let req = as_business(TestRequest::post().uri("/api/applications"), "biz-1")
        .set_json(json!({"payload": {"amount_sar": 120_000}}))
        .to_request();
    let res = test::call_service(&app, req).await;
    assert!(res.status().is_success());
    let created: ApplicationCreatedResponse = test::read_body_json(res).await;
    assert_eq!(created.status, ApplicationStatus::LiveAuction);

    // A second live application for the same business is rejected before any write
    let req = as_business(TestRequest::post().uri("/api/applications"), "biz-1")
        .set_json(json!({"payload": {"amount_sar": 5_000}}))
        .to_request();
    let res = test::call_service(&app, req).await;
    assert_eq!(res.status().as_u16(), 400);

    // The business can read it back; another business cannot
    let uri = format!("/api/applications/{}", created.application_id);
    let res = test::call_service(&app, as_business(TestRequest::get().uri(&uri), "biz-1").to_request()).await;
    assert!(res.status().is_success());
    let res = test::call_service(&app, as_business(TestRequest::get().uri(&uri), "biz-2").to_request()).await;
    assert_eq!(res.status().as_u16(), 403);
}

#[actix_web::test]
async fn claims_are_idempotent_over_http() {
    let db = test_db().await;
    let app = init_app!(db);
    let req = as_business(TestRequest::post().uri("/api/applications"), "biz-2")
        .set_json(json!({"payload": {}}))
        .to_request();
    let created: ApplicationCreatedResponse = test::call_and_read_body_json(&app, req).await;
    let uri = format!("/api/applications/{}/claim", created.application_id);

    let req = as_bank(TestRequest::post().uri(&uri), "bank-1").set_json(json!({"kind": "purchased"})).to_request();
    let claim: ClaimResponse = test::call_and_read_body_json(&app, req).await;
    assert!(claim.accepted);

    let req = as_bank(TestRequest::post().uri(&uri), "bank-1").set_json(json!({"kind": "purchased"})).to_request();
    let claim: ClaimResponse = test::call_and_read_body_json(&app, req).await;
    assert!(!claim.accepted, "re-claiming is a no-op, not an error");
}

#[actix_web::test]
async fn offers_flow_and_late_bids() {
    let db = test_db().await;
    let app = init_app!(db);
    let req = as_business(TestRequest::post().uri("/api/applications"), "biz-3")
        .set_json(json!({"payload": {}}))
        .to_request();
    let created: ApplicationCreatedResponse = test::call_and_read_body_json(&app, req).await;
    let offers_uri = format!("/api/applications/{}/offers", created.application_id);

    // A delegated employee bids on behalf of the bank
    let req = as_bank_employee(TestRequest::post().uri(&offers_uri), "employee-9", "bank-1")
        .set_json(json!({"terms": {"rate": 0.11, "settlement_days": 3}}))
        .to_request();
    let offer: OfferResponse = test::call_and_read_body_json(&app, req).await;
    assert_eq!(offer.status, OfferStatus::Submitted);

    // Once the window elapses, bids bounce with 409 even though no sweep has run
    backdate_auction(&db, created.application_id.as_str(), 49).await;
    let req = as_bank(TestRequest::post().uri(&offers_uri), "bank-2")
        .set_json(json!({"terms": {"rate": 0.15}}))
        .to_request();
    let res = test::call_service(&app, req).await;
    assert_eq!(res.status().as_u16(), 409);
}

#[actix_web::test]
async fn selection_flow_over_http() {
    let db = test_db().await;
    let app = init_app!(db);
    let req = as_business(TestRequest::post().uri("/api/applications"), "biz-4")
        .set_json(json!({"payload": {}}))
        .to_request();
    let created: ApplicationCreatedResponse = test::call_and_read_body_json(&app, req).await;
    let id = created.application_id.clone();

    let offers_uri = format!("/api/applications/{id}/offers");
    let req = as_bank(TestRequest::post().uri(&offers_uri), "bank-1")
        .set_json(json!({"terms": {"rate": 0.10}}))
        .to_request();
    let offer_a: OfferResponse = test::call_and_read_body_json(&app, req).await;
    let req = as_bank(TestRequest::post().uri(&offers_uri), "bank-2")
        .set_json(json!({"terms": {"rate": 0.12}}))
        .to_request();
    let offer_b: OfferResponse = test::call_and_read_body_json(&app, req).await;

    // Close the window and resolve it via the manual recovery endpoint
    backdate_auction(&db, id.as_str(), 49).await;
    let req = as_admin(TestRequest::post().uri("/api/admin/sweep")).to_request();
    let sweep: SweepSummary = test::call_and_read_body_json(&app, req).await;
    assert_eq!(sweep.completed, 1);

    let select_uri = format!("/api/applications/{id}/select-offer");
    let req = as_business(TestRequest::post().uri(&select_uri), "biz-4")
        .set_json(json!({"offer_id": offer_a.offer_id}))
        .to_request();
    let selected: SelectOfferResponse = test::call_and_read_body_json(&app, req).await;
    assert_eq!(selected.selected_offer_id, offer_a.offer_id);
    assert_eq!(selected.status, ApplicationStatus::Completed);

    // A second selection conflicts
    let req = as_business(TestRequest::post().uri(&select_uri), "biz-4")
        .set_json(json!({"offer_id": offer_b.offer_id}))
        .to_request();
    let res = test::call_service(&app, req).await;
    assert_eq!(res.status().as_u16(), 409);

    // The audit trail is admin-only and shows the full journey
    let audit_uri = format!("/api/applications/{id}/audit");
    let res = test::call_service(&app, as_business(TestRequest::get().uri(&audit_uri), "biz-4").to_request()).await;
    assert_eq!(res.status().as_u16(), 403);
    let res = test::call_service(&app, as_admin(TestRequest::get().uri(&audit_uri)).to_request()).await;
    assert!(res.status().is_success());
}

#[actix_web::test]
async fn admin_search_filters_by_status() {
    let db = test_db().await;
    let app = init_app!(db);
    let req = as_business(TestRequest::post().uri("/api/applications"), "biz-5")
        .set_json(json!({"payload": {}}))
        .to_request();
    let _: ApplicationCreatedResponse = test::call_and_read_body_json(&app, req).await;

    let req = as_admin(TestRequest::get().uri("/api/search/applications?status=live_auction&business_user_id=biz-5"))
        .to_request();
    let res = test::call_service(&app, req).await;
    assert!(res.status().is_success());
    let found: Vec<serde_json::Value> = test::read_body_json(res).await;
    assert_eq!(found.len(), 1);

    // An unknown status is rejected up front
    let req = as_admin(TestRequest::get().uri("/api/search/applications?status=deal_won")).to_request();
    let res = test::call_service(&app, req).await;
    assert_eq!(res.status().as_u16(), 400);
}
