use std::fmt::Debug;

use chrono::Duration;
use log::*;
use tamweel_common::Halalas;

use crate::{
    db_types::{Application, ApplicationId, ClaimKind, NewApplication, NewOffer, Offer, OfferId},
    events::{ApplicationCreatedEvent, AuctionClosedEvent, EventProducers, OfferSelectedEvent},
    traits::{ClaimOutcome, MarketplaceDatabase, MarketplaceError, ReconciliationReport, SelectionResult, SweepResult},
};

/// `AuctionFlowApi` is the primary API for moving applications through the auction lifecycle in response to
/// business submissions, bank bids and the scheduled maintenance ticks.
///
/// Event hooks fire *after* the backend transaction has committed; a state transition is never held hostage to a
/// notification consumer.
pub struct AuctionFlowApi<B> {
    db: B,
    producers: EventProducers,
}

impl<B> Debug for AuctionFlowApi<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "AuctionFlowApi")
    }
}

impl<B> AuctionFlowApi<B> {
    pub fn new(db: B, producers: EventProducers) -> Self {
        Self { db, producers }
    }
}

impl<B> AuctionFlowApi<B>
where B: MarketplaceDatabase
{
    /// Submit a new application to the marketplace.
    ///
    /// The application opens with a live auction window. A business can only have one live application at a time;
    /// a second submission while the first window is open is rejected.
    pub async fn process_new_application(&self, application: NewApplication) -> Result<Application, MarketplaceError> {
        let application = self.db.insert_application(application).await?;
        debug!(
            "🔄️📦️ Application [{}] accepted for business {}. Auction closes at {}",
            application.application_id, application.business_user_id, application.auction_end_time
        );
        self.call_application_created_hook(&application).await;
        Ok(application)
    }

    /// Record a bank's claim (viewed or purchased) against a live application. Idempotent: the outcome reports
    /// whether the claim set actually grew.
    pub async fn record_claim(
        &self,
        application_id: &ApplicationId,
        bank_user_id: &str,
        kind: ClaimKind,
        access_fee: Halalas,
    ) -> Result<ClaimOutcome, MarketplaceError> {
        let outcome = self.db.record_claim(application_id, bank_user_id, kind, access_fee).await?;
        trace!(
            "🔄️🏷️ Claim {kind} by bank {bank_user_id} on [{application_id}] processed (newly added: {})",
            outcome.newly_added
        );
        Ok(outcome)
    }

    /// Submit or re-submit a bank's offer against a live application.
    pub async fn submit_offer(&self, offer: NewOffer) -> Result<(Offer, bool), MarketplaceError> {
        let application_id = offer.application_id.clone();
        let (offer, newly_counted) = self.db.submit_offer(offer).await?;
        debug!(
            "🔄️💰️ Offer [{}] by bank {} against [{application_id}] processed (counted: {newly_counted})",
            offer.offer_id, offer.bank_user_id
        );
        Ok((offer, newly_counted))
    }

    /// Withdraw the bank's live offer while the auction window is still open.
    pub async fn withdraw_offer(
        &self,
        application_id: &ApplicationId,
        bank_user_id: &str,
    ) -> Result<Offer, MarketplaceError> {
        let offer = self.db.withdraw_offer(application_id, bank_user_id).await?;
        debug!("🔄️💰️ Offer [{}] withdrawn by bank {bank_user_id}", offer.offer_id);
        Ok(offer)
    }

    /// The business-side terminal action: select the winning offer. Exactly one selection can ever commit per
    /// application; the losing caller of a concurrent pair receives `AlreadySelected`.
    pub async fn select_winning_offer(
        &self,
        application_id: &ApplicationId,
        offer_id: &OfferId,
        business_user_id: &str,
    ) -> Result<SelectionResult, MarketplaceError> {
        let result = self.db.select_winning_offer(application_id, offer_id, business_user_id).await?;
        info!(
            "🔄️🏆️ Offer [{}] selected on [{application_id}]. {} sibling offer(s) marked lost.",
            result.winning_offer.offer_id,
            result.losing_offers.len()
        );
        self.call_offer_selected_hook(&result).await;
        Ok(result)
    }

    /// One auction clock tick. Resolves every elapsed auction window and expires stale selection windows, then
    /// publishes an `AuctionClosed` event per resolved application.
    pub async fn sweep_expired_auctions(&self, selection_window: Duration) -> Result<SweepResult, MarketplaceError> {
        let result = self.db.sweep_expired_auctions(selection_window).await?;
        for application in result.completed.iter().chain(result.ignored.iter()) {
            self.call_auction_closed_hook(application).await;
        }
        Ok(result)
    }

    /// One reconciliation pass over cached aggregates. Corrections happen inside the backend; this simply reports.
    pub async fn reconcile_aggregates(&self) -> Result<ReconciliationReport, MarketplaceError> {
        let report = self.db.reconcile_aggregates().await?;
        if report.is_clean() {
            debug!("🔄️⚖️ Reconciliation pass clean ({} applications scanned)", report.applications_scanned);
        } else {
            warn!(
                "🔄️⚖️ Reconciliation pass corrected {} drift(s) across {} applications",
                report.drifts.len(),
                report.applications_scanned
            );
        }
        Ok(report)
    }

    async fn call_application_created_hook(&self, application: &Application) {
        for emitter in &self.producers.application_created_producer {
            trace!("🔄️📦️ Notifying application created hook subscribers");
            let event = ApplicationCreatedEvent::new(application.clone());
            emitter.publish_event(event).await;
        }
    }

    async fn call_auction_closed_hook(&self, application: &Application) {
        for emitter in &self.producers.auction_closed_producer {
            trace!("🔄️🕰️ Notifying auction closed hook subscribers");
            let event = AuctionClosedEvent::new(application.clone());
            emitter.publish_event(event).await;
        }
    }

    async fn call_offer_selected_hook(&self, result: &SelectionResult) {
        for emitter in &self.producers.offer_selected_producer {
            trace!("🔄️🏆️ Notifying offer selected hook subscribers");
            let event = OfferSelectedEvent::new(result.application.clone(), result.winning_offer.clone());
            emitter.publish_event(event).await;
        }
    }

    pub fn db(&self) -> &B {
        &self.db
    }

    pub fn db_mut(&mut self) -> &mut B {
        &mut self.db
    }
}
