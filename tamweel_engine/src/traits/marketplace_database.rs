use chrono::Duration;
use tamweel_common::Halalas;
use thiserror::Error;

use crate::{
    db_types::{Application, ApplicationId, ClaimKind, NewApplication, NewOffer, Offer, OfferId},
    traits::{
        data_objects::{ClaimOutcome, ReconciliationReport, SelectionResult, SweepResult},
        ApplicationApiError,
        ApplicationManagement,
    },
};

/// This trait defines the highest level of behaviour for backends supporting the marketplace engine.
///
/// This behaviour includes:
/// * Creating applications and opening their auction windows.
/// * Registering bank claims (viewed / purchased) with set semantics.
/// * The offer submission, withdrawal and selection flows.
/// * The time-driven transition sweep and the aggregate reconciliation pass.
///
/// Every state-changing method is a single atomic transaction with the application row as the serialization point.
/// Partial writes are never observable.
#[allow(async_fn_in_trait)]
pub trait MarketplaceDatabase: Clone + ApplicationManagement {
    /// The URL of the database
    fn url(&self) -> &str;

    /// Stores a new application with status `LiveAuction` and `auction_end_time = submitted_at + auction_window`.
    ///
    /// A business may only have one application whose *effective* status is `LiveAuction` at a time. The check runs
    /// against `auction_end_time`, not the cached status column, so a stale cache cannot let a duplicate in.
    async fn insert_application(&self, application: NewApplication) -> Result<Application, MarketplaceError>;

    /// Idempotently adds `bank_user_id` to the application's claim set for `kind`.
    ///
    /// Re-adding an existing member is a no-op (`newly_added == false`), not an error. A `Purchased` claim that
    /// grows the set also adds `access_fee` to the application's collected revenue, exactly once per bank.
    ///
    /// Fails with [`MarketplaceError::WindowClosed`] when the application's effective status is no longer
    /// `LiveAuction`.
    async fn record_claim(
        &self,
        application_id: &ApplicationId,
        bank_user_id: &str,
        kind: ClaimKind,
        access_fee: Halalas,
    ) -> Result<ClaimOutcome, MarketplaceError>;

    /// Submits a bank's offer against a live application, in a single atomic transaction:
    /// * the offer row is inserted, or updated in place if this bank already has one (one offer per bank per
    ///   application; re-submission replaces the terms rather than creating a duplicate),
    /// * `offers_count` is incremented only when the offer is new (or re-activates a withdrawn row),
    /// * the bank is added to the `Purchased` claim set (with the access fee, first time only),
    /// * the tracking projection row is upserted.
    ///
    /// Returns the offer and whether it was newly counted. Fails with [`MarketplaceError::WindowClosed`] when the
    /// auction window has elapsed, regardless of whether the sweeper has flipped the cached status yet.
    async fn submit_offer(&self, offer: NewOffer) -> Result<(Offer, bool), MarketplaceError>;

    /// Withdraws the bank's offer while the auction window is still open.
    ///
    /// The offer is marked `Withdrawn` and `offers_count` is decremented, so a withdrawn offer does not count
    /// toward the `Completed` resolution. The bank stays in the `Purchased` claim set; revenue is not refunded.
    async fn withdraw_offer(
        &self,
        application_id: &ApplicationId,
        bank_user_id: &str,
    ) -> Result<Offer, MarketplaceError>;

    /// The business-side terminal action: pick one winning offer.
    ///
    /// Verifies ownership, that the effective status is `Completed`, and that the selection window (when stamped)
    /// has not elapsed. In one transaction: the chosen offer becomes `Selected`, every live sibling becomes
    /// `DealLost`, the application stamps `selected_offer_id`/`selected_at`, tracking rows are refreshed and an
    /// audit entry is appended.
    ///
    /// Selection is single-writer. A concurrent caller loses the guarded update and gets
    /// [`MarketplaceError::AlreadySelected`], surfaced, never swallowed.
    async fn select_winning_offer(
        &self,
        application_id: &ApplicationId,
        offer_id: &OfferId,
        business_user_id: &str,
    ) -> Result<SelectionResult, MarketplaceError>;

    /// The auction clock tick: resolves every application whose time window has elapsed.
    ///
    /// * `LiveAuction` rows past `auction_end_time` become `Completed` (offers exist; a selection window of
    ///   `selection_window` from now, typically 24 hours, is stamped) or `Ignored` (none).
    /// * `Completed` rows whose selection window elapsed unselected have their live offers marked `Expired`.
    ///
    /// Each row transitions in its own short transaction whose UPDATE repeats the precondition, so the sweep is
    /// idempotent and safely re-entrant: a second run over the same rows matches nothing and does nothing. A row
    /// that fails to transition is logged, reported in the result and retried on the next tick; it never aborts
    /// the rest of the batch.
    async fn sweep_expired_auctions(&self, selection_window: Duration) -> Result<SweepResult, MarketplaceError>;

    /// Recomputes cached aggregates from source-of-truth counts and corrects any drift.
    ///
    /// `offers_count` is compared against `COUNT(*)` over live offers and against the size of the `Purchased`
    /// claim set; stale tracking-row status copies are refreshed. Corrections are applied in place, logged, and
    /// reported. Running it twice in a row yields a clean second report.
    async fn reconcile_aggregates(&self) -> Result<ReconciliationReport, MarketplaceError>;

    /// Closes the database connection.
    async fn close(&mut self) -> Result<(), MarketplaceError> {
        Ok(())
    }
}

#[derive(Debug, Clone, Error)]
pub enum MarketplaceError {
    #[error("We have an internal database engine error (configuration/uptime etc.): {0}")]
    DatabaseError(String),
    #[error("Malformed input or violated precondition. {0}")]
    ValidationError(String),
    #[error("Business {0} already has an application in a live auction")]
    DuplicateActiveApplication(String),
    #[error("The auction window for application {0} has closed")]
    WindowClosed(ApplicationId),
    #[error("The selection window for application {0} has closed")]
    SelectionWindowClosed(ApplicationId),
    #[error("An offer has already been selected for application {0}")]
    AlreadySelected(ApplicationId),
    #[error("The requested application {0} does not exist")]
    ApplicationNotFound(ApplicationId),
    #[error("The requested offer {0} does not exist")]
    OfferNotFound(OfferId),
    #[error("Bank {bank_user_id} has no offer against application {application_id}")]
    NoOfferForBank { application_id: ApplicationId, bank_user_id: String },
    #[error("User {0} does not own this application")]
    NotOwner(String),
    #[error("{0}")]
    QueryError(#[from] ApplicationApiError),
}

impl From<sqlx::Error> for MarketplaceError {
    fn from(e: sqlx::Error) -> Self {
        MarketplaceError::DatabaseError(e.to_string())
    }
}
