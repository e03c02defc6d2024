use serde::{Deserialize, Serialize};

use crate::db_types::{Application, ApplicationId, Offer};

/// Result of an idempotent claim registration.
#[derive(Debug, Clone)]
pub struct ClaimOutcome {
    /// The application after the claim was processed.
    pub application: Application,
    /// False when the bank was already in the claim set and the call was a no-op.
    pub newly_added: bool,
}

/// Result of a winning-offer selection transaction.
#[derive(Debug, Clone)]
pub struct SelectionResult {
    pub application: Application,
    pub winning_offer: Offer,
    /// Sibling offers that were forced to `DealLost` in the same transaction.
    pub losing_offers: Vec<Offer>,
}

/// Everything a single auction clock tick changed.
#[derive(Debug, Clone, Default)]
pub struct SweepResult {
    /// Applications that resolved to `Completed` (offers on the table).
    pub completed: Vec<Application>,
    /// Applications that resolved to `Ignored` (no offers).
    pub ignored: Vec<Application>,
    /// Offers marked `Expired` because their selection window elapsed unselected.
    pub expired_offers: Vec<Offer>,
    /// Applications that failed to transition this tick. They stay as they are and are retried on the next tick.
    pub failed: Vec<ApplicationId>,
}

impl SweepResult {
    pub fn total_transitions(&self) -> usize {
        self.completed.len() + self.ignored.len()
    }

    pub fn is_empty(&self) -> bool {
        self.total_transitions() == 0 && self.expired_offers.is_empty() && self.failed.is_empty()
    }
}

/// Which cached aggregate disagreed with the source-of-truth count.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DriftKind {
    /// `applications.offers_count` vs `COUNT(*)` over live offers.
    OffersCount,
    /// `applications.offers_count` vs the size of the `Purchased` claim set. The claim set is the wider of the two
    /// (a bank can purchase access and never bid), so this only fires when the counter exceeds the set.
    PurchasedSet,
    /// A tracking row carried a stale copy of the application status.
    TrackingStatus,
}

/// One discrepancy found and corrected by the reconciliation job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DriftRecord {
    pub application_id: ApplicationId,
    pub kind: DriftKind,
    pub cached: i64,
    pub actual: i64,
}

/// Outcome of one reconciliation pass. Drift is corrected in place and reported here; it is never surfaced to an
/// external caller as an error.
#[derive(Debug, Clone, Default)]
pub struct ReconciliationReport {
    pub applications_scanned: usize,
    pub drifts: Vec<DriftRecord>,
}

impl ReconciliationReport {
    pub fn is_clean(&self) -> bool {
        self.drifts.is_empty()
    }
}
