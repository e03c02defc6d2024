use std::time::Duration;

use actix_web::{dev::Server, http::KeepAlive, middleware::Logger, web, App, HttpServer};
use futures::FutureExt;
use log::*;
use tamweel_engine::{
    events::{EventHandlers, EventHooks, EventProducers},
    ApplicationApi,
    AuctionFlowApi,
    SqliteDatabase,
};

use crate::{
    auction_clock::start_auction_clock,
    config::ServerConfig,
    errors::ServerError,
    middleware::IdentityMiddlewareFactory,
    reconciliation_worker::start_reconciliation_worker,
    routes::{
        health,
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

pub async fn run_server(config: ServerConfig) -> Result<(), ServerError> {
    let db = SqliteDatabase::new_with_url(&config.database_url, 25)
        .await
        .map_err(|e| ServerError::InitializeError(e.to_string()))?;
    db.run_migrations().await.map_err(|e| ServerError::InitializeError(e.to_string()))?;

    let handlers = EventHandlers::new(50, notification_hooks());
    let producers = handlers.producers();
    handlers.start_handlers().await;

    start_auction_clock(
        db.clone(),
        producers.clone(),
        config.selection_window,
        Duration::from_secs(config.sweep_interval_secs),
    );
    start_reconciliation_worker(db.clone(), Duration::from_secs(config.reconcile_interval_secs));

    let srv = create_server_instance(config, db, producers)?;
    srv.await.map_err(|e| ServerError::Unspecified(e.to_string()))
}

/// Notification delivery is owned by a downstream dispatcher; the hooks shipped with the server record the moment
/// each notification became due. They run strictly after the corresponding transition has committed, and a failure
/// in here can never roll a transition back.
fn notification_hooks() -> EventHooks {
    let mut hooks = EventHooks::default();
    hooks.on_application_created(|ev| {
        info!(
            "📣️ Notify: application [{}] entered live auction (ends {})",
            ev.application.application_id, ev.application.auction_end_time
        );
        async {}.boxed()
    });
    hooks.on_auction_closed(|ev| {
        info!("📣️ Notify: auction for [{}] closed as {}", ev.application.application_id, ev.outcome);
        async {}.boxed()
    });
    hooks.on_offer_selected(|ev| {
        info!(
            "📣️ Notify: offer [{}] by bank {} selected on [{}]",
            ev.offer.offer_id, ev.offer.bank_user_id, ev.application.application_id
        );
        async {}.boxed()
    });
    hooks
}

pub fn create_server_instance(
    config: ServerConfig,
    db: SqliteDatabase,
    producers: EventProducers,
) -> Result<Server, ServerError> {
    let host = config.host.clone();
    let port = config.port;
    let srv = HttpServer::new(move || {
        let flow_api = AuctionFlowApi::new(db.clone(), producers.clone());
        let application_api = ApplicationApi::new(db.clone());
        let app = App::new()
            .wrap(Logger::new("%t (%D ms) %s %a %{Host}i %U").log_target("tmw::access_log"))
            .app_data(web::Data::new(flow_api))
            .app_data(web::Data::new(application_api))
            .app_data(web::Data::new(config.clone()));
        // Everything under /api carries a gateway-resolved identity; per-route ACLs are applied by the route
        // definitions themselves.
        let api_scope = web::scope("/api")
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
            .service(AdminReconcileRoute::<SqliteDatabase>::new());
        app.service(health).service(api_scope)
    })
    .keep_alive(KeepAlive::Timeout(Duration::from_secs(600)))
    .bind((host.as_str(), port))?
    .run();
    Ok(srv)
}
