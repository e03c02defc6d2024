//! Request handler definitions
//!
//! Define each route and its handler here.
//! Handlers that are more than a line or two MUST go into a separate module. Keep this module neat and tidy 🙏
//!
//! A note about performance:
//! Since each worker thread processes its requests sequentially, handlers which block the current thread will cause
//! the current worker to stop processing new requests. For this reason, any long, non-cpu-bound operation (e.g. I/O,
//! database operations, etc.) should be expressed as futures or asynchronous functions. Async handlers get executed
//! concurrently by worker threads and thus don't block execution.
use actix_web::{get, web, HttpResponse, Responder};
use log::*;
use tamweel_common::Halalas;
use tamweel_engine::{
    db_types::{ApplicationId, ClaimKind, NewApplication, NewOffer},
    ApplicationApi,
    ApplicationManagement,
    AuctionFlowApi,
    MarketplaceDatabase,
    MarketplaceError,
};

use crate::{
    auth::{ResolvedIdentity, UserType},
    config::ServerConfig,
    data_objects::{
        ApplicationCreatedResponse,
        ApplicationDetail,
        ApplicationSearchParams,
        ClaimRequest,
        ClaimResponse,
        CreateApplicationRequest,
        JsonResponse,
        OfferRequest,
        OfferResponse,
        ReconciliationSummary,
        SelectOfferRequest,
        SelectOfferResponse,
        SweepSummary,
    },
    errors::ServerError,
};

// Actix-web cannot handle generics in handlers, so it's implemented manually using the `route!` macro
#[macro_export]
macro_rules! route {
    ($name:ident => $method:ident $path:literal impl $($bounds:ty),+) => {
        paste::paste! { pub struct [<$name:camel Route>]< $( [< T $bounds:camel> ],)+ >( $( core::marker::PhantomData<fn() -> [< T $bounds:camel> ] >,)+ );}
        paste::paste! { impl< $( [< T $bounds:camel> ],)+ > [<$name:camel Route>]< $( [< T $bounds:camel> ],)+ > {
            #[allow(clippy::new_without_default)]
            pub fn new() -> Self {
                Self($( core::marker::PhantomData::<fn() -> [< T $bounds:camel> ] >,)+)
            }
        }}
        paste::paste! { impl<$( [< T $bounds:camel >] , )+> actix_web::dev::HttpServiceFactory for [<$name:camel Route>]<$([<T $bounds:camel>],)+>
        where
            $([<T $bounds:camel>]: $bounds + 'static,)+
        {
            fn register(self, config: &mut actix_web::dev::AppService) {
                let res = actix_web::Resource::new($path)
                    .name(stringify!($name))
                    .guard(actix_web::guard::$method())
                    .to($name::< $( [< T $bounds:camel >], )+>);
                actix_web::dev::HttpServiceFactory::register(res, config);
            }
        }}
    };

    ($name:ident => $method:ident $path:literal impl $($bounds:ty),+ where requires [$($user_types:expr),*])  => {
        paste::paste! { pub struct [<$name:camel Route>]< $( [< T $bounds:camel> ],)+ >( $( core::marker::PhantomData<fn() -> [< T $bounds:camel> ] >,)+ );}
        paste::paste! { impl< $( [< T $bounds:camel> ],)+ > [<$name:camel Route>]< $( [< T $bounds:camel> ],)+ > {
            #[allow(clippy::new_without_default)]
            pub fn new() -> Self {
                Self($( core::marker::PhantomData::<fn() -> [< T $bounds:camel> ] >,)+)
            }
        }}
        paste::paste! { impl<$( [< T $bounds:camel >] , )+> actix_web::dev::HttpServiceFactory for [<$name:camel Route>]<$([<T $bounds:camel>],)+>
        where
            $([<T $bounds:camel>]: $bounds + 'static,)+
        {
            fn register(self, config: &mut actix_web::dev::AppService) {
                let res = actix_web::Resource::new($path)
                    .name(stringify!($name))
                    .guard(actix_web::guard::$method())
                    .to($name::< $( [< T $bounds:camel >], )+>)
                    .wrap($crate::middleware::AclMiddlewareFactory::new(&[$($user_types),*]));
                actix_web::dev::HttpServiceFactory::register(res, config);
            }
        }}
    };
}

#[get("/health")]
pub async fn health() -> impl Responder {
    trace!("💻️ GET health");
    HttpResponse::Ok().body("👍️\n")
}

//----------------------------------------------   Applications  ----------------------------------------------------

route!(create_application => Post "/applications" impl MarketplaceDatabase where requires [UserType::Business]);
/// Route handler for business application submission.
///
/// The submitting business is taken from the resolved identity. The auction window length comes from server
/// configuration; a business with a live auction already open gets a 400.
pub async fn create_application<B: MarketplaceDatabase>(
    identity: ResolvedIdentity,
    body: web::Json<CreateApplicationRequest>,
    api: web::Data<AuctionFlowApi<B>>,
    config: web::Data<ServerConfig>,
) -> Result<HttpResponse, ServerError> {
    debug!("💻️ POST applications for business {}", identity.user_id);
    let application = NewApplication::new(identity.user_id, body.into_inner().payload)
        .with_auction_window(config.auction_window);
    let application = api.process_new_application(application).await?;
    Ok(HttpResponse::Ok().json(ApplicationCreatedResponse {
        application_id: application.application_id,
        status: application.status,
        auction_end_time: application.auction_end_time,
    }))
}

route!(my_application => Get "/my/application" impl ApplicationManagement where requires [UserType::Business]);
/// Route handler for a business fetching its own latest application.
pub async fn my_application<B: ApplicationManagement>(
    identity: ResolvedIdentity,
    api: web::Data<ApplicationApi<B>>,
) -> Result<HttpResponse, ServerError> {
    debug!("💻️ GET my application for {}", identity.user_id);
    let application = api
        .latest_application_for_business(&identity.user_id)
        .await?
        .ok_or_else(|| ServerError::NoRecordFound(format!("No application for business {}", identity.user_id)))?;
    Ok(HttpResponse::Ok().json(application))
}

route!(get_application => Get "/applications/{id}" impl MarketplaceDatabase where requires []);
/// Route handler for fetching one application, claim sets included.
///
/// A bank viewing a live application is recorded in the `opened_by` claim set as a side effect; viewing a closed
/// one is allowed and records nothing. Businesses can only fetch their own application.
pub async fn get_application<B: MarketplaceDatabase>(
    identity: ResolvedIdentity,
    path: web::Path<String>,
    flow_api: web::Data<AuctionFlowApi<B>>,
    api: web::Data<ApplicationApi<B>>,
) -> Result<HttpResponse, ServerError> {
    let id = ApplicationId::from(path.into_inner());
    debug!("💻️ GET application {id} for {}", identity.user_id);
    let application =
        api.application(&id).await?.ok_or_else(|| ServerError::NoRecordFound(format!("Application {id}")))?;
    if identity.user_type == UserType::Business && application.business_user_id != identity.user_id {
        return Err(ServerError::InsufficientPermissions("You do not own this application".to_string()));
    }
    if identity.user_type == UserType::Bank {
        match flow_api.record_claim(&id, identity.acting_bank_id(), ClaimKind::Opened, Halalas::default()).await {
            Ok(_) | Err(MarketplaceError::WindowClosed(_)) => {},
            Err(e) => warn!("💻️ Could not record opened claim on {id}: {e}"),
        }
    }
    let opened_by = api.claims(&id, ClaimKind::Opened).await?;
    let purchased_by = api.claims(&id, ClaimKind::Purchased).await?;
    Ok(HttpResponse::Ok().json(ApplicationDetail { application, opened_by, purchased_by }))
}

route!(applications_search => Get "/search/applications" impl ApplicationManagement where requires [UserType::Admin]);
pub async fn applications_search<B: ApplicationManagement>(
    query: web::Query<ApplicationSearchParams>,
    api: web::Data<ApplicationApi<B>>,
) -> Result<HttpResponse, ServerError> {
    debug!("💻️ GET applications search for [{:?}]", query.0);
    let filter = query.into_inner().into_filter().map_err(ServerError::InvalidRequestBody)?;
    let applications = api.search_applications(filter).await?;
    Ok(HttpResponse::Ok().json(applications))
}

route!(audit_trail => Get "/applications/{id}/audit" impl ApplicationManagement where requires [UserType::Admin]);
/// The append-only status transition trail for one application. The first stop for "why is this stuck".
pub async fn audit_trail<B: ApplicationManagement>(
    path: web::Path<String>,
    api: web::Data<ApplicationApi<B>>,
) -> Result<HttpResponse, ServerError> {
    let id = ApplicationId::from(path.into_inner());
    debug!("💻️ GET audit trail for {id}");
    let entries = api.audit_log(&id).await?;
    Ok(HttpResponse::Ok().json(entries))
}

//----------------------------------------------   Claims & Offers  -------------------------------------------------

route!(record_claim => Post "/applications/{id}/claim" impl MarketplaceDatabase where requires [UserType::Bank]);
/// Route handler for bank claims (viewed / purchased).
///
/// Claims are idempotent: re-claiming returns `accepted: false` rather than an error. A `Purchased` claim carries
/// the configured access fee, collected once per bank. Claims against a closed window get a 409.
pub async fn record_claim<B: MarketplaceDatabase>(
    identity: ResolvedIdentity,
    path: web::Path<String>,
    body: web::Json<ClaimRequest>,
    api: web::Data<AuctionFlowApi<B>>,
    config: web::Data<ServerConfig>,
) -> Result<HttpResponse, ServerError> {
    let id = ApplicationId::from(path.into_inner());
    let kind = body.kind;
    debug!("💻️ POST claim {kind} on {id} by bank {}", identity.acting_bank_id());
    let fee = match kind {
        ClaimKind::Purchased => config.access_fee,
        ClaimKind::Opened => Halalas::default(),
    };
    let outcome = api.record_claim(&id, identity.acting_bank_id(), kind, fee).await?;
    Ok(HttpResponse::Ok().json(ClaimResponse { accepted: outcome.newly_added }))
}

route!(submit_offer => Post "/applications/{id}/offers" impl MarketplaceDatabase where requires [UserType::Bank]);
/// Route handler for bank offer submission.
///
/// One offer per bank per application: re-submission while the window is open replaces the terms. Submission after
/// `auction_end_time` gets a 409, whether or not the auction clock has already flipped the status.
pub async fn submit_offer<B: MarketplaceDatabase>(
    identity: ResolvedIdentity,
    path: web::Path<String>,
    body: web::Json<OfferRequest>,
    api: web::Data<AuctionFlowApi<B>>,
    config: web::Data<ServerConfig>,
) -> Result<HttpResponse, ServerError> {
    let id = ApplicationId::from(path.into_inner());
    debug!("💻️ POST offer on {id} by bank {}", identity.acting_bank_id());
    let mut offer = NewOffer::new(id, identity.acting_bank_id(), body.into_inner().terms)
        .with_access_fee(config.access_fee);
    if let Some(submitter) = identity.delegated_submitter() {
        offer = offer.submitted_by(submitter);
    }
    let (offer, _) = api.submit_offer(offer).await?;
    Ok(HttpResponse::Ok().json(OfferResponse { offer_id: offer.offer_id, status: offer.status }))
}

route!(withdraw_offer => Delete "/applications/{id}/offers" impl MarketplaceDatabase where requires [UserType::Bank]);
/// Route handler for a bank withdrawing its live offer while the auction window is still open.
pub async fn withdraw_offer<B: MarketplaceDatabase>(
    identity: ResolvedIdentity,
    path: web::Path<String>,
    api: web::Data<AuctionFlowApi<B>>,
) -> Result<HttpResponse, ServerError> {
    let id = ApplicationId::from(path.into_inner());
    debug!("💻️ DELETE offer on {id} by bank {}", identity.acting_bank_id());
    let offer = api.withdraw_offer(&id, identity.acting_bank_id()).await?;
    Ok(HttpResponse::Ok().json(JsonResponse::success(format!("Offer {} withdrawn", offer.offer_id))))
}

route!(offers_for_application => Get "/applications/{id}/offers" impl MarketplaceDatabase where requires []);
/// Route handler for listing offers against an application.
///
/// The owning business and admins see every offer; a bank sees only its own.
pub async fn offers_for_application<B: MarketplaceDatabase>(
    identity: ResolvedIdentity,
    path: web::Path<String>,
    api: web::Data<ApplicationApi<B>>,
) -> Result<HttpResponse, ServerError> {
    let id = ApplicationId::from(path.into_inner());
    debug!("💻️ GET offers for {id} by {}", identity.user_id);
    let application =
        api.application(&id).await?.ok_or_else(|| ServerError::NoRecordFound(format!("Application {id}")))?;
    let offers = api.offers_for_application(&id).await?;
    let offers = match identity.user_type {
        UserType::Admin => offers,
        UserType::Business => {
            if application.business_user_id != identity.user_id {
                return Err(ServerError::InsufficientPermissions("You do not own this application".to_string()));
            }
            offers
        },
        UserType::Bank => {
            let bank = identity.acting_bank_id();
            offers.into_iter().filter(|o| o.bank_user_id == bank).collect()
        },
    };
    Ok(HttpResponse::Ok().json(offers))
}

route!(select_offer => Post "/applications/{id}/select-offer" impl MarketplaceDatabase where requires [UserType::Business]);
/// Route handler for the business-side terminal action: selecting the winning offer.
///
/// Exactly one selection can ever commit per application. A concurrent loser gets a 409.
pub async fn select_offer<B: MarketplaceDatabase>(
    identity: ResolvedIdentity,
    path: web::Path<String>,
    body: web::Json<SelectOfferRequest>,
    api: web::Data<AuctionFlowApi<B>>,
) -> Result<HttpResponse, ServerError> {
    let id = ApplicationId::from(path.into_inner());
    let offer_id = body.into_inner().offer_id;
    debug!("💻️ POST select offer {offer_id} on {id} by {}", identity.user_id);
    let result = api.select_winning_offer(&id, &offer_id, &identity.user_id).await?;
    Ok(HttpResponse::Ok().json(SelectOfferResponse {
        status: result.application.status,
        selected_offer_id: result.winning_offer.offer_id,
    }))
}

//----------------------------------------------   Admin recovery  --------------------------------------------------

route!(admin_sweep => Post "/admin/sweep" impl MarketplaceDatabase where requires [UserType::Admin]);
/// Manual trigger for the auction clock tick. Idempotent; safe to invoke at any time for recovery.
pub async fn admin_sweep<B: MarketplaceDatabase>(
    api: web::Data<AuctionFlowApi<B>>,
    config: web::Data<ServerConfig>,
) -> Result<HttpResponse, ServerError> {
    info!("💻️ POST admin sweep");
    let result = api.sweep_expired_auctions(config.selection_window).await?;
    Ok(HttpResponse::Ok().json(SweepSummary::from(&result)))
}

route!(admin_reconcile => Post "/admin/reconcile" impl MarketplaceDatabase where requires [UserType::Admin]);
/// Manual trigger for the reconciliation pass. Idempotent; safe to invoke at any time for recovery.
pub async fn admin_reconcile<B: MarketplaceDatabase>(
    api: web::Data<AuctionFlowApi<B>>,
) -> Result<HttpResponse, ServerError> {
    info!("💻️ POST admin reconcile");
    let report = api.reconcile_aggregates().await?;
    Ok(HttpResponse::Ok().json(ReconciliationSummary::from(&report)))
}
