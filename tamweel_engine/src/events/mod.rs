//! Post-commit event hooks.
//!
//! State transitions in the engine publish events *after* the underlying transaction has durably committed.
//! Subscribers (the notification dispatcher, typically) react asynchronously; a slow or failing subscriber can
//! neither block nor roll back the transition that produced the event.
mod channel;
mod hooks;

pub use channel::{EventHandler, EventProducer, Handler};
pub use hooks::{EventHandlers, EventHooks, EventProducers};
use serde::{Deserialize, Serialize};

use crate::db_types::{Application, ApplicationStatus, Offer};

/// A business submitted an application and its auction window opened.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApplicationCreatedEvent {
    pub application: Application,
}

impl ApplicationCreatedEvent {
    pub fn new(application: Application) -> Self {
        Self { application }
    }
}

/// The auction clock resolved an application whose bidding window elapsed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuctionClosedEvent {
    pub application: Application,
    /// `Completed` when offers were on the table, `Ignored` otherwise.
    pub outcome: ApplicationStatus,
}

impl AuctionClosedEvent {
    pub fn new(application: Application) -> Self {
        let outcome = application.status;
        Self { application, outcome }
    }
}

/// The business picked a winning offer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OfferSelectedEvent {
    pub application: Application,
    pub offer: Offer,
}

impl OfferSelectedEvent {
    pub fn new(application: Application, offer: Offer) -> Self {
        Self { application, offer }
    }
}
