//! Database types for the marketplace engine.
//!
//! These are the records that back the auction state machine. The one rule that everything else in this crate hangs
//! off is that an application's *effective* status is computed from its timestamps and counters
//! ([`Application::effective_status`]); the `status` column that gets persisted alongside it is a query cache that the
//! auction clock keeps convergent, never an authority of its own.
use std::{fmt::Display, str::FromStr};

use chrono::{DateTime, Duration, Utc};
use log::error;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::{types::Json, FromRow, Type};
use tamweel_common::Halalas;
use thiserror::Error;

/// How long banks may bid on a freshly submitted application.
pub const DEFAULT_AUCTION_WINDOW: Duration = Duration::hours(48);
/// How long a business has to pick a winning offer once the auction resolves with offers on the table.
pub const DEFAULT_SELECTION_WINDOW: Duration = Duration::hours(24);

//--------------------------------------    ApplicationId    ---------------------------------------------------------
#[derive(Debug, Clone, PartialEq, Eq, Hash, Type, Serialize, Deserialize)]
#[sqlx(transparent)]
pub struct ApplicationId(pub String);

impl FromStr for ApplicationId {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(s.to_string()))
    }
}

impl From<String> for ApplicationId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl Display for ApplicationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl ApplicationId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

//--------------------------------------       OfferId       ---------------------------------------------------------
#[derive(Debug, Clone, PartialEq, Eq, Hash, Type, Serialize, Deserialize)]
#[sqlx(transparent)]
pub struct OfferId(pub String);

impl FromStr for OfferId {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(s.to_string()))
    }
}

impl From<String> for OfferId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl Display for OfferId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl OfferId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

//--------------------------------------  ApplicationStatus  ---------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Type, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApplicationStatus {
    /// The auction window is open and banks may claim the application and submit offers.
    LiveAuction,
    /// The auction window elapsed with at least one live offer. Terminal.
    Completed,
    /// The auction window elapsed without any offers. Terminal.
    Ignored,
}

impl ApplicationStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, ApplicationStatus::Completed | ApplicationStatus::Ignored)
    }
}

impl Display for ApplicationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ApplicationStatus::LiveAuction => write!(f, "LiveAuction"),
            ApplicationStatus::Completed => write!(f, "Completed"),
            ApplicationStatus::Ignored => write!(f, "Ignored"),
        }
    }
}

#[derive(Debug, Clone, Error)]
#[error("Invalid status: {0}")]
pub struct ConversionError(String);

impl FromStr for ApplicationStatus {
    type Err = ConversionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "LiveAuction" => Ok(Self::LiveAuction),
            "Completed" => Ok(Self::Completed),
            "Ignored" => Ok(Self::Ignored),
            s => Err(ConversionError(format!("Invalid application status: {s}"))),
        }
    }
}

impl From<String> for ApplicationStatus {
    fn from(value: String) -> Self {
        value.parse().unwrap_or_else(|_| {
            error!("Invalid application status: {value}. But this conversion cannot fail. Defaulting to LiveAuction");
            ApplicationStatus::LiveAuction
        })
    }
}

//--------------------------------------     OfferStatus     ---------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Type, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OfferStatus {
    /// The offer is live. During the auction window a re-submission by the same bank updates it in place.
    Submitted,
    /// The business picked this offer. At most one per application.
    Selected,
    /// A sibling offer was selected instead.
    DealLost,
    /// The selection window elapsed without the business picking any offer.
    Expired,
    /// The bank withdrew the offer while the auction window was still open.
    Withdrawn,
}

impl Display for OfferStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OfferStatus::Submitted => write!(f, "Submitted"),
            OfferStatus::Selected => write!(f, "Selected"),
            OfferStatus::DealLost => write!(f, "DealLost"),
            OfferStatus::Expired => write!(f, "Expired"),
            OfferStatus::Withdrawn => write!(f, "Withdrawn"),
        }
    }
}

impl FromStr for OfferStatus {
    type Err = ConversionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Submitted" => Ok(Self::Submitted),
            "Selected" => Ok(Self::Selected),
            "DealLost" => Ok(Self::DealLost),
            "Expired" => Ok(Self::Expired),
            "Withdrawn" => Ok(Self::Withdrawn),
            s => Err(ConversionError(format!("Invalid offer status: {s}"))),
        }
    }
}

//--------------------------------------      ClaimKind      ---------------------------------------------------------
/// The two interactions a bank can have recorded against an application. Claims are set-valued per
/// `(application, bank)`: recording the same claim twice is a no-op, never an error and never a double count.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Type, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClaimKind {
    /// The bank viewed the application.
    Opened,
    /// The bank paid the access fee and may submit an offer.
    Purchased,
}

impl Display for ClaimKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ClaimKind::Opened => write!(f, "Opened"),
            ClaimKind::Purchased => write!(f, "Purchased"),
        }
    }
}

impl FromStr for ClaimKind {
    type Err = ConversionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Opened" => Ok(Self::Opened),
            "Purchased" => Ok(Self::Purchased),
            s => Err(ConversionError(format!("Invalid claim kind: {s}"))),
        }
    }
}

//--------------------------------------     Application     ---------------------------------------------------------
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Application {
    pub id: i64,
    pub application_id: ApplicationId,
    pub business_user_id: String,
    /// Cached status. Use [`Application::effective_status`] for anything that gates a write.
    pub status: ApplicationStatus,
    pub submitted_at: DateTime<Utc>,
    pub auction_end_time: DateTime<Utc>,
    pub offer_selection_end_time: Option<DateTime<Utc>>,
    pub offers_count: i64,
    pub revenue_collected: Halalas,
    pub selected_offer_id: Option<OfferId>,
    pub selected_at: Option<DateTime<Utc>>,
    /// The financing request as submitted by the business. Opaque to the state machine.
    pub payload: Json<Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Application {
    /// The authoritative status, derived purely from the clock and the offer counter.
    ///
    /// The stored `status` column lags behind this between auction clock ticks; every precondition check in the
    /// engine goes through here so that a late-running sweep can never open a window that the wall clock has
    /// already closed.
    pub fn effective_status(&self, now: DateTime<Utc>) -> ApplicationStatus {
        if now < self.auction_end_time {
            ApplicationStatus::LiveAuction
        } else if self.offers_count > 0 {
            ApplicationStatus::Completed
        } else {
            ApplicationStatus::Ignored
        }
    }

    /// True while banks may still claim and bid.
    pub fn auction_is_open(&self, now: DateTime<Utc>) -> bool {
        self.effective_status(now) == ApplicationStatus::LiveAuction
    }

    /// True if the business can still select a winning offer.
    ///
    /// The selection window is stamped by the auction clock when the auction resolves to `Completed`. Until that
    /// happens `offer_selection_end_time` is unset and selection is gated on the effective status alone.
    pub fn selection_is_open(&self, now: DateTime<Utc>) -> bool {
        self.effective_status(now) == ApplicationStatus::Completed
            && self.selected_offer_id.is_none()
            && self.offer_selection_end_time.map(|t| now < t).unwrap_or(true)
    }

    pub fn has_selection(&self) -> bool {
        self.selected_offer_id.is_some()
    }
}

//--------------------------------------    NewApplication   ---------------------------------------------------------
#[derive(Debug, Clone)]
pub struct NewApplication {
    /// The verified business submitting the financing request.
    pub business_user_id: String,
    /// The financing request details. Opaque to the state machine.
    pub payload: Value,
    pub submitted_at: DateTime<Utc>,
    /// Length of the bidding window. `auction_end_time` is always `submitted_at + auction_window`.
    pub auction_window: Duration,
}

impl NewApplication {
    pub fn new<S: Into<String>>(business_user_id: S, payload: Value) -> Self {
        Self {
            business_user_id: business_user_id.into(),
            payload,
            submitted_at: Utc::now(),
            auction_window: DEFAULT_AUCTION_WINDOW,
        }
    }

    pub fn with_auction_window(mut self, window: Duration) -> Self {
        self.auction_window = window;
        self
    }

    /// Backdate the submission. The auction end moves with it, keeping the window invariant intact.
    pub fn with_submitted_at(mut self, submitted_at: DateTime<Utc>) -> Self {
        self.submitted_at = submitted_at;
        self
    }

    pub fn auction_end_time(&self) -> DateTime<Utc> {
        self.submitted_at + self.auction_window
    }
}

//--------------------------------------        Offer        ---------------------------------------------------------
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Offer {
    pub id: i64,
    pub offer_id: OfferId,
    pub application_id: ApplicationId,
    pub bank_user_id: String,
    /// The employee who physically submitted the bid, when it was not the bank account itself.
    pub submitted_by_user_id: Option<String>,
    /// Financial terms (fees, rates, settlement times, validity). Opaque to the state machine.
    pub terms: Json<Value>,
    /// What the bank paid the marketplace for access to this application.
    pub access_fee: Halalas,
    pub status: OfferStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

//--------------------------------------       NewOffer      ---------------------------------------------------------
#[derive(Debug, Clone)]
pub struct NewOffer {
    pub application_id: ApplicationId,
    pub bank_user_id: String,
    pub submitted_by_user_id: Option<String>,
    pub terms: Value,
    pub access_fee: Halalas,
}

impl NewOffer {
    pub fn new<S: Into<String>>(application_id: ApplicationId, bank_user_id: S, terms: Value) -> Self {
        Self {
            application_id,
            bank_user_id: bank_user_id.into(),
            submitted_by_user_id: None,
            terms,
            access_fee: Halalas::default(),
        }
    }

    pub fn with_access_fee(mut self, fee: Halalas) -> Self {
        self.access_fee = fee;
        self
    }

    pub fn submitted_by<S: Into<String>>(mut self, user_id: S) -> Self {
        self.submitted_by_user_id = Some(user_id.into());
        self
    }
}

//--------------------------------------   TrackingRecord    ---------------------------------------------------------
/// Denormalized per-`(application, bank)` timeline used for analytics and SLA computation.
///
/// This is a projection, not a source of truth. It is upserted opportunistically by every state-changing operation
/// and refreshed by the auction clock and the reconciliation job; between refreshes it may be stale and must be
/// treated as advisory.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct TrackingRecord {
    pub id: i64,
    pub application_id: ApplicationId,
    pub bank_user_id: String,
    /// Copy of the application's status at the last refresh. Advisory.
    pub current_application_status: ApplicationStatus,
    pub submitted_at: DateTime<Utc>,
    pub auction_end_time: DateTime<Utc>,
    pub opened_at: Option<DateTime<Utc>>,
    pub purchased_at: Option<DateTime<Utc>>,
    pub offer_submitted_at: Option<DateTime<Utc>>,
    pub offer_selected_at: Option<DateTime<Utc>>,
    pub offer_lost_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

//--------------------------------------  StatusAuditEntry   ---------------------------------------------------------
/// One immutable row per status transition, appended in the same transaction as the transition itself.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct StatusAuditEntry {
    pub id: i64,
    pub application_id: ApplicationId,
    pub from_status: ApplicationStatus,
    pub to_status: ApplicationStatus,
    pub reason: String,
    pub actor: String,
    pub created_at: DateTime<Utc>,
}
