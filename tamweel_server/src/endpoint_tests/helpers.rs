//! Shared scaffolding for endpoint tests: a migrated throwaway database, the `/api` scope as the server wires it,
//! and helpers for stamping gateway-resolved identities onto test requests.
use std::sync::atomic::{AtomicU64, Ordering};

use actix_web::{dev::HttpServiceFactory, test::TestRequest, web};
use tamweel_engine::SqliteDatabase;

use crate::{
    auth::{BANK_USER_ID_HEADER, USER_ID_HEADER, USER_TYPE_HEADER},
    middleware::IdentityMiddlewareFactory,
    routes::{
        AdminReconcileRoute,
        AdminSweepRoute,
        ApplicationsSearchRoute,
        AuditTrailRoute,
        CreateApplicationRoute,
        GetApplicationRoute,
        MyApplicationRoute,
        OffersForApplicationRoute,
        RecordClaimRoute,
        SelectOfferRoute,
        SubmitOfferRoute,
        WithdrawOfferRoute,
    },
};

static DB_COUNTER: AtomicU64 = AtomicU64::new(0);

pub async fn test_db() -> SqliteDatabase {
    let _ = env_logger::try_init();
    let n = DB_COUNTER.fetch_add(1, Ordering::Relaxed);
    let url = format!(
        "sqlite://{}/tamweel_endpoint_{}_{n}.db?mode=rwc",
        std::env::temp_dir().display(),
        std::process::id()
    );
    let db = SqliteDatabase::new_with_url(&url, 5).await.expect("Error creating test database");
    db.run_migrations().await.expect("Error running migrations");
    db
}

/// The `/api` scope exactly as `create_server_instance` registers it.
pub fn api_scope() -> impl HttpServiceFactory {
    web::scope("/api")
        .wrap(IdentityMiddlewareFactory)
        .service(CreateApplicationRoute::<SqliteDatabase>::new())
        .service(MyApplicationRoute::<SqliteDatabase>::new())
        .service(ApplicationsSearchRoute::<SqliteDatabase>::new())
        .service(RecordClaimRoute::<SqliteDatabase>::new())
        .service(SubmitOfferRoute::<SqliteDatabase>::new())
        .service(WithdrawOfferRoute::<SqliteDatabase>::new())
        .service(OffersForApplicationRoute::<SqliteDatabase>::new())
        .service(SelectOfferRoute::<SqliteDatabase>::new())
        .service(AuditTrailRoute::<SqliteDatabase>::new())
        .service(GetApplicationRoute::<SqliteDatabase>::new())
        .service(AdminSweepRoute::<SqliteDatabase>::new())
        .service(AdminReconcileRoute::<SqliteDatabase>::new())
}

pub fn as_business(req: TestRequest, user_id: &str) -> TestRequest {
    req.insert_header((USER_ID_HEADER, user_id)).insert_header((USER_TYPE_HEADER, "business"))
}

pub fn as_bank(req: TestRequest, bank_id: &str) -> TestRequest {
    req.insert_header((USER_ID_HEADER, bank_id)).insert_header((USER_TYPE_HEADER, "bank"))
}

pub fn as_bank_employee(req: TestRequest, employee_id: &str, bank_id: &str) -> TestRequest {
    req.insert_header((USER_ID_HEADER, employee_id))
        .insert_header((USER_TYPE_HEADER, "bank"))
        .insert_header((BANK_USER_ID_HEADER, bank_id))
}

pub fn as_admin(req: TestRequest) -> TestRequest {
    req.insert_header((USER_ID_HEADER, "ops-1")).insert_header((USER_TYPE_HEADER, "admin"))
}
