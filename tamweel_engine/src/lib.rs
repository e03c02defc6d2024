//! Tamweel Marketplace Engine
//!
//! The Tamweel marketplace connects businesses submitting point-of-sale financing applications with banks that bid
//! on them through a time-boxed auction. This library contains the core lifecycle logic. It is transport-agnostic.
//!
//! The library is divided into two main sections:
//! 1. Database management and control ([`mod@sqlite`]). SQLite is the supported backend. You should never need to
//!    access the database directly. Instead, use the public API provided by the engine. The exception is the data
//!    types used in the database. These are defined in the `db_types` module and are public.
//! 2. The engine public API ([`mod@market_api`]). This provides the public-facing functionality of the engine:
//!    application submission, bank claims and offers, winning-offer selection, and the two scheduled maintenance
//!    passes (the auction clock sweep and aggregate reconciliation). Specific backends need to implement the traits
//!    in [`mod@traits`] in order to act as a backend for the marketplace server.
//!
//! The engine also provides a set of events that can be subscribed to. These events are emitted after the
//! corresponding state transition has durably committed. For example, when a business picks a winning offer, an
//! `OfferSelectedEvent` is emitted. Handlers are async and fire-and-forget; they can never roll a transition back.
pub mod db_types;
pub mod events;
pub mod helpers;
mod market_api;
#[cfg(feature = "sqlite")]
mod sqlite;
pub mod traits;

pub use market_api::{application_objects, ApplicationApi, AuctionFlowApi};
#[cfg(feature = "sqlite")]
pub use sqlite::SqliteDatabase;
pub use traits::{
    ApplicationApiError,
    ApplicationManagement,
    ClaimOutcome,
    MarketplaceDatabase,
    MarketplaceError,
    ReconciliationReport,
    SelectionResult,
    SweepResult,
};
