//! `SqliteDatabase` is a concrete implementation of a marketplace engine backend.
//!
//! Unsurprisingly, it uses SQLite as the backend and implements all the traits defined in the [`crate::traits`]
//! module. Every state-changing trait method is one transaction built out of the connection-level functions in
//! [`super::db`]; the application row is the serialization point, and no offer or tracking row is ever touched by a
//! transaction that does not also go through its parent application.
use std::{fmt::Debug, sync::Arc};

use chrono::{DateTime, Duration, Utc};
use log::{error, warn};
use sqlx::SqlitePool;
use tamweel_common::Halalas;
use tokio::sync::Mutex;

use super::db::{applications, audit, db_url, new_pool, offers, tracking};
use crate::{
    db_types::{
        Application,
        ApplicationId,
        ApplicationStatus,
        ClaimKind,
        NewApplication,
        NewOffer,
        Offer,
        OfferId,
        OfferStatus,
        StatusAuditEntry,
        TrackingRecord,
    },
    market_api::application_objects::ApplicationQueryFilter,
    sqlite::db::tracking::TrackingStamp,
    traits::{
        ApplicationApiError,
        ApplicationManagement,
        ClaimOutcome,
        DriftKind,
        DriftRecord,
        MarketplaceDatabase,
        MarketplaceError,
        ReconciliationReport,
        SelectionResult,
        SweepResult,
    },
};

/// Who the audit log blames for time-driven transitions.
const AUCTION_CLOCK_ACTOR: &str = "auction_clock";
const RECONCILIATION_ACTOR: &str = "reconciliation";

#[derive(Clone)]
pub struct SqliteDatabase {
    url: String,
    pool: SqlitePool,
    /// Serializes write transactions. Two concurrent SQLite transactions that both read and then upgrade to a
    /// write deadlock with SQLITE_BUSY rather than queueing; taking this lock for the duration of each (short)
    /// write transaction linearizes them instead. Reads run concurrently off the pool.
    write_lock: Arc<Mutex<()>>,
}

impl Debug for SqliteDatabase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "SqliteDatabase ({:?})", self.pool)
    }
}

impl SqliteDatabase {
    /// Connects to the database at `TMW_DATABASE_URL` (or the default path).
    pub async fn new(max_connections: u32) -> Result<Self, MarketplaceError> {
        let url = db_url();
        Self::new_with_url(&url, max_connections).await
    }

    pub async fn new_with_url(url: &str, max_connections: u32) -> Result<Self, MarketplaceError> {
        let pool = new_pool(url, max_connections).await?;
        Ok(Self { url: url.to_string(), pool, write_lock: Arc::new(Mutex::new(())) })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Applies the embedded schema migrations.
    pub async fn run_migrations(&self) -> Result<(), MarketplaceError> {
        sqlx::migrate!("./src/sqlite/migrations")
            .run(&self.pool)
            .await
            .map_err(|e| MarketplaceError::DatabaseError(e.to_string()))
    }

    /// Resolves a single expired auction in its own short transaction. Returns `None` when another sweep got there
    /// first (the guarded update matched nothing).
    async fn resolve_one(
        &self,
        application_id: &ApplicationId,
        selection_window: Duration,
        now: DateTime<Utc>,
    ) -> Result<Option<Application>, MarketplaceError> {
        let _write = self.write_lock.lock().await;
        let mut tx = self.pool.begin().await?;
        let resolved = applications::resolve_expired_auction(application_id, now + selection_window, now, &mut tx).await?;
        let resolved = match resolved {
            Some(application) => {
                tracking::refresh_status(application_id, application.status, now, &mut tx).await?;
                audit::append(
                    application_id,
                    ApplicationStatus::LiveAuction,
                    application.status,
                    "auction window elapsed",
                    AUCTION_CLOCK_ACTOR,
                    &mut tx,
                )
                .await?;
                Some(application)
            },
            None => None,
        };
        tx.commit().await?;
        Ok(resolved)
    }

    /// Expires the live offers of one application whose selection window lapsed unselected. Guarded on offer
    /// status, so a repeat run finds nothing to expire and appends nothing.
    async fn expire_selection_window(
        &self,
        application_id: &ApplicationId,
        now: DateTime<Utc>,
    ) -> Result<Vec<Offer>, MarketplaceError> {
        let _write = self.write_lock.lock().await;
        let mut tx = self.pool.begin().await?;
        let expired = offers::expire_offers_for_application(application_id, now, &mut tx).await?;
        if !expired.is_empty() {
            audit::append(
                application_id,
                ApplicationStatus::Completed,
                ApplicationStatus::Completed,
                "selection window elapsed",
                AUCTION_CLOCK_ACTOR,
                &mut tx,
            )
            .await?;
        }
        tx.commit().await?;
        Ok(expired)
    }

    /// Recomputes one application's aggregates and corrects whatever has drifted.
    async fn reconcile_application(
        &self,
        application_id: &ApplicationId,
        now: DateTime<Utc>,
        report: &mut ReconciliationReport,
    ) -> Result<(), MarketplaceError> {
        let _write = self.write_lock.lock().await;
        let mut tx = self.pool.begin().await?;
        let Some(application) = applications::fetch_application(application_id, &mut tx).await? else {
            tx.commit().await?;
            return Ok(());
        };
        let actual = offers::count_live_offers(application_id, &mut tx).await?;
        if actual != application.offers_count {
            applications::set_offers_count(application_id, actual, &mut tx).await?;
            audit::append(
                application_id,
                application.status,
                application.status,
                &format!("reconciliation: offers_count {} -> {actual}", application.offers_count),
                RECONCILIATION_ACTOR,
                &mut tx,
            )
            .await?;
            warn!(
                "⚖️ ReconciliationDrift on {application_id}: offers_count cached {} but counted {actual}",
                application.offers_count
            );
            report.drifts.push(DriftRecord {
                application_id: application_id.clone(),
                kind: DriftKind::OffersCount,
                cached: application.offers_count,
                actual,
            });
        }
        let backfilled = applications::backfill_purchased_claims(application_id, &mut tx).await?;
        if backfilled > 0 {
            let purchased = applications::fetch_claims(application_id, ClaimKind::Purchased, &mut tx).await?;
            #[allow(clippy::cast_possible_wrap)]
            let set_size = purchased.len() as i64;
            #[allow(clippy::cast_possible_wrap)]
            let missing = backfilled as i64;
            warn!(
                "⚖️ ReconciliationDrift on {application_id}: {missing} bank(s) held offers without a Purchased claim"
            );
            report.drifts.push(DriftRecord {
                application_id: application_id.clone(),
                kind: DriftKind::PurchasedSet,
                cached: set_size - missing,
                actual: set_size,
            });
        }
        let stale = tracking::refresh_status(application_id, application.status, now, &mut tx).await?;
        if stale > 0 {
            warn!("⚖️ ReconciliationDrift on {application_id}: {stale} tracking row(s) carried a stale status copy");
            #[allow(clippy::cast_possible_wrap)]
            report.drifts.push(DriftRecord {
                application_id: application_id.clone(),
                kind: DriftKind::TrackingStatus,
                cached: stale as i64,
                actual: 0,
            });
        }
        tx.commit().await?;
        Ok(())
    }
}

impl ApplicationManagement for SqliteDatabase {
    async fn fetch_application(&self, id: &ApplicationId) -> Result<Option<Application>, ApplicationApiError> {
        let mut conn = self.pool.acquire().await?;
        let application = applications::fetch_application(id, &mut conn).await?;
        Ok(application)
    }

    async fn fetch_active_application_for_business(
        &self,
        business_user_id: &str,
    ) -> Result<Option<Application>, ApplicationApiError> {
        let mut conn = self.pool.acquire().await?;
        let application = applications::fetch_active_for_business(business_user_id, Utc::now(), &mut conn).await?;
        Ok(application)
    }

    async fn fetch_latest_application_for_business(
        &self,
        business_user_id: &str,
    ) -> Result<Option<Application>, ApplicationApiError> {
        let mut conn = self.pool.acquire().await?;
        let application = applications::fetch_latest_for_business(business_user_id, &mut conn).await?;
        Ok(application)
    }

    async fn fetch_offer(&self, offer_id: &OfferId) -> Result<Option<Offer>, ApplicationApiError> {
        let mut conn = self.pool.acquire().await?;
        let offer = offers::fetch_offer_by_offer_id(offer_id, &mut conn).await?;
        Ok(offer)
    }

    async fn fetch_offers_for_application(&self, id: &ApplicationId) -> Result<Vec<Offer>, ApplicationApiError> {
        let mut conn = self.pool.acquire().await?;
        let offers = offers::fetch_offers_for_application(id, &mut conn).await?;
        Ok(offers)
    }

    async fn fetch_claims(&self, id: &ApplicationId, kind: ClaimKind) -> Result<Vec<String>, ApplicationApiError> {
        let mut conn = self.pool.acquire().await?;
        let banks = applications::fetch_claims(id, kind, &mut conn).await?;
        Ok(banks)
    }

    async fn fetch_tracking_for_application(
        &self,
        id: &ApplicationId,
    ) -> Result<Vec<TrackingRecord>, ApplicationApiError> {
        let mut conn = self.pool.acquire().await?;
        let records = tracking::fetch_for_application(id, &mut conn).await?;
        Ok(records)
    }

    async fn fetch_audit_log(&self, id: &ApplicationId) -> Result<Vec<StatusAuditEntry>, ApplicationApiError> {
        let mut conn = self.pool.acquire().await?;
        let entries = audit::fetch_for_application(id, &mut conn).await?;
        Ok(entries)
    }

    async fn search_applications(
        &self,
        query: ApplicationQueryFilter,
    ) -> Result<Vec<Application>, ApplicationApiError> {
        let mut conn = self.pool.acquire().await?;
        let applications = applications::search_applications(query, &mut conn).await?;
        Ok(applications)
    }
}

impl MarketplaceDatabase for SqliteDatabase {
    fn url(&self) -> &str {
        self.url.as_str()
    }

    async fn insert_application(&self, application: NewApplication) -> Result<Application, MarketplaceError> {
        if application.business_user_id.trim().is_empty() {
            return Err(MarketplaceError::ValidationError("business_user_id must not be empty".to_string()));
        }
        if application.auction_window <= Duration::zero() {
            return Err(MarketplaceError::ValidationError("auction window must be positive".to_string()));
        }
        let _write = self.write_lock.lock().await;
        let mut tx = self.pool.begin().await?;
        if applications::has_live_application(&application.business_user_id, Utc::now(), &mut tx).await? {
            return Err(MarketplaceError::DuplicateActiveApplication(application.business_user_id));
        }
        let application = applications::insert_application(application, &mut tx).await?;
        audit::append(
            &application.application_id,
            ApplicationStatus::LiveAuction,
            ApplicationStatus::LiveAuction,
            "application submitted",
            &application.business_user_id,
            &mut tx,
        )
        .await?;
        tx.commit().await?;
        Ok(application)
    }

    async fn record_claim(
        &self,
        application_id: &ApplicationId,
        bank_user_id: &str,
        kind: ClaimKind,
        access_fee: Halalas,
    ) -> Result<ClaimOutcome, MarketplaceError> {
        let _write = self.write_lock.lock().await;
        let mut tx = self.pool.begin().await?;
        let application = applications::fetch_application(application_id, &mut tx)
            .await?
            .ok_or_else(|| MarketplaceError::ApplicationNotFound(application_id.clone()))?;
        let now = Utc::now();
        if !application.auction_is_open(now) {
            return Err(MarketplaceError::WindowClosed(application_id.clone()));
        }
        let newly_added = applications::add_claim(application_id, bank_user_id, kind, &mut tx).await?;
        if newly_added && kind == ClaimKind::Purchased {
            applications::add_revenue(application_id, access_fee, &mut tx).await?;
        }
        let stamp = match kind {
            ClaimKind::Opened => TrackingStamp::Opened,
            ClaimKind::Purchased => TrackingStamp::Purchased,
        };
        tracking::stamp(&application, bank_user_id, stamp, now, &mut tx).await?;
        let application = applications::fetch_application(application_id, &mut tx)
            .await?
            .ok_or_else(|| MarketplaceError::ApplicationNotFound(application_id.clone()))?;
        tx.commit().await?;
        Ok(ClaimOutcome { application, newly_added })
    }

    async fn submit_offer(&self, offer: NewOffer) -> Result<(Offer, bool), MarketplaceError> {
        let application_id = offer.application_id.clone();
        let _write = self.write_lock.lock().await;
        let mut tx = self.pool.begin().await?;
        let application = applications::fetch_application(&application_id, &mut tx)
            .await?
            .ok_or_else(|| MarketplaceError::ApplicationNotFound(application_id.clone()))?;
        let now = Utc::now();
        if !application.auction_is_open(now) {
            return Err(MarketplaceError::WindowClosed(application_id.clone()));
        }
        let access_fee = offer.access_fee;
        let bank_user_id = offer.bank_user_id.clone();
        let (offer, newly_counted) = offers::upsert_offer(offer, &mut tx).await?;
        if newly_counted {
            applications::increment_offers_count(&application_id, &mut tx).await?;
        }
        let claim_added = applications::add_claim(&application_id, &bank_user_id, ClaimKind::Purchased, &mut tx).await?;
        if claim_added {
            applications::add_revenue(&application_id, access_fee, &mut tx).await?;
        }
        tracking::stamp(&application, &bank_user_id, TrackingStamp::Purchased, now, &mut tx).await?;
        tracking::stamp(&application, &bank_user_id, TrackingStamp::OfferSubmitted, now, &mut tx).await?;
        tx.commit().await?;
        Ok((offer, newly_counted))
    }

    async fn withdraw_offer(
        &self,
        application_id: &ApplicationId,
        bank_user_id: &str,
    ) -> Result<Offer, MarketplaceError> {
        let _write = self.write_lock.lock().await;
        let mut tx = self.pool.begin().await?;
        let application = applications::fetch_application(application_id, &mut tx)
            .await?
            .ok_or_else(|| MarketplaceError::ApplicationNotFound(application_id.clone()))?;
        let now = Utc::now();
        if !application.auction_is_open(now) {
            return Err(MarketplaceError::WindowClosed(application_id.clone()));
        }
        let offer = offers::mark_withdrawn(application_id, bank_user_id, now, &mut tx).await?.ok_or_else(|| {
            MarketplaceError::NoOfferForBank {
                application_id: application_id.clone(),
                bank_user_id: bank_user_id.to_string(),
            }
        })?;
        applications::decrement_offers_count(application_id, &mut tx).await?;
        tx.commit().await?;
        Ok(offer)
    }

    async fn select_winning_offer(
        &self,
        application_id: &ApplicationId,
        offer_id: &OfferId,
        business_user_id: &str,
    ) -> Result<SelectionResult, MarketplaceError> {
        let _write = self.write_lock.lock().await;
        let mut tx = self.pool.begin().await?;
        let application = applications::fetch_application(application_id, &mut tx)
            .await?
            .ok_or_else(|| MarketplaceError::ApplicationNotFound(application_id.clone()))?;
        if application.business_user_id != business_user_id {
            return Err(MarketplaceError::NotOwner(business_user_id.to_string()));
        }
        let now = Utc::now();
        match application.effective_status(now) {
            ApplicationStatus::LiveAuction => {
                return Err(MarketplaceError::ValidationError(
                    "the auction window is still open; offers cannot be selected yet".to_string(),
                ))
            },
            ApplicationStatus::Ignored => {
                return Err(MarketplaceError::ValidationError(
                    "the auction closed without offers; there is nothing to select".to_string(),
                ))
            },
            ApplicationStatus::Completed => {},
        }
        if application.has_selection() {
            return Err(MarketplaceError::AlreadySelected(application_id.clone()));
        }
        if !application.selection_is_open(now) {
            return Err(MarketplaceError::SelectionWindowClosed(application_id.clone()));
        }
        let offer = offers::fetch_offer_by_offer_id(offer_id, &mut tx)
            .await?
            .ok_or_else(|| MarketplaceError::OfferNotFound(offer_id.clone()))?;
        if offer.application_id != *application_id {
            return Err(MarketplaceError::ValidationError(format!(
                "offer {offer_id} does not belong to application {application_id}"
            )));
        }
        if offer.status != OfferStatus::Submitted {
            return Err(MarketplaceError::ValidationError(format!(
                "offer {offer_id} is not live (status: {})",
                offer.status
            )));
        }
        if !applications::stamp_selection(application_id, offer_id.as_str(), now, &mut tx).await? {
            // A concurrent selection committed between our fetch and the guarded update.
            return Err(MarketplaceError::AlreadySelected(application_id.clone()));
        }
        let winning_offer = offers::mark_selected(offer_id, now, &mut tx)
            .await?
            .ok_or_else(|| MarketplaceError::AlreadySelected(application_id.clone()))?;
        let losing_offers = offers::mark_deal_lost(application_id, offer_id, now, &mut tx).await?;
        let updated = applications::fetch_application(application_id, &mut tx)
            .await?
            .ok_or_else(|| MarketplaceError::ApplicationNotFound(application_id.clone()))?;
        tracking::refresh_status(application_id, updated.status, now, &mut tx).await?;
        tracking::stamp(&updated, &winning_offer.bank_user_id, TrackingStamp::OfferSelected, now, &mut tx).await?;
        for loser in &losing_offers {
            tracking::stamp(&updated, &loser.bank_user_id, TrackingStamp::OfferLost, now, &mut tx).await?;
        }
        audit::append(
            application_id,
            application.status,
            ApplicationStatus::Completed,
            "offer selected",
            business_user_id,
            &mut tx,
        )
        .await?;
        tx.commit().await?;
        Ok(SelectionResult { application: updated, winning_offer, losing_offers })
    }

    async fn sweep_expired_auctions(&self, selection_window: Duration) -> Result<SweepResult, MarketplaceError> {
        let now = Utc::now();
        let mut result = SweepResult::default();
        let candidates = {
            let mut conn = self.pool.acquire().await?;
            applications::fetch_expired_live_auctions(now, &mut conn).await?
        };
        for candidate in candidates {
            match self.resolve_one(&candidate.application_id, selection_window, now).await {
                Ok(Some(application)) => match application.status {
                    ApplicationStatus::Completed => result.completed.push(application),
                    ApplicationStatus::Ignored => result.ignored.push(application),
                    ApplicationStatus::LiveAuction => {},
                },
                // Another sweep instance resolved this row between our scan and the guarded update.
                Ok(None) => {},
                Err(e) => {
                    error!("🕰️ Failed to resolve application {}: {e}. Will retry next tick.", candidate.application_id);
                    result.failed.push(candidate.application_id.clone());
                },
            }
        }
        let stale_selections = {
            let mut conn = self.pool.acquire().await?;
            applications::fetch_expired_selection_windows(now, &mut conn).await?
        };
        for application in stale_selections {
            match self.expire_selection_window(&application.application_id, now).await {
                Ok(mut expired) => result.expired_offers.append(&mut expired),
                Err(e) => {
                    error!(
                        "🕰️ Failed to expire offers for application {}: {e}. Will retry next tick.",
                        application.application_id
                    );
                    result.failed.push(application.application_id.clone());
                },
            }
        }
        Ok(result)
    }

    async fn reconcile_aggregates(&self) -> Result<ReconciliationReport, MarketplaceError> {
        let now = Utc::now();
        let mut report = ReconciliationReport::default();
        let ids = {
            let mut conn = self.pool.acquire().await?;
            applications::fetch_all_application_ids(&mut conn).await?
        };
        report.applications_scanned = ids.len();
        for id in ids {
            if let Err(e) = self.reconcile_application(&id, now, &mut report).await {
                error!("⚖️ Failed to reconcile application {id}: {e}. Will retry next pass.");
            }
        }
        Ok(report)
    }

    async fn close(&mut self) -> Result<(), MarketplaceError> {
        self.pool.close().await;
        Ok(())
    }
}
