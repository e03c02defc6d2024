use std::{future::Future, pin::Pin, sync::Arc};

use crate::events::{
    channel::{EventHandler, EventProducer, Handler},
    ApplicationCreatedEvent,
    AuctionClosedEvent,
    OfferSelectedEvent,
};

/// The producer ends of every registered hook. Cloned into the API layer, which publishes after each commit.
#[derive(Default, Clone)]
pub struct EventProducers {
    pub application_created_producer: Vec<EventProducer<ApplicationCreatedEvent>>,
    pub auction_closed_producer: Vec<EventProducer<AuctionClosedEvent>>,
    pub offer_selected_producer: Vec<EventProducer<OfferSelectedEvent>>,
}

pub struct EventHandlers {
    pub on_application_created: Option<EventHandler<ApplicationCreatedEvent>>,
    pub on_auction_closed: Option<EventHandler<AuctionClosedEvent>>,
    pub on_offer_selected: Option<EventHandler<OfferSelectedEvent>>,
}

impl EventHandlers {
    pub fn new(buffer_size: usize, hooks: EventHooks) -> Self {
        let on_application_created = hooks.on_application_created.map(|f| EventHandler::new(buffer_size, f));
        let on_auction_closed = hooks.on_auction_closed.map(|f| EventHandler::new(buffer_size, f));
        let on_offer_selected = hooks.on_offer_selected.map(|f| EventHandler::new(buffer_size, f));
        Self { on_application_created, on_auction_closed, on_offer_selected }
    }

    pub fn producers(&self) -> EventProducers {
        let mut result = EventProducers::default();
        if let Some(handler) = &self.on_application_created {
            result.application_created_producer.push(handler.subscribe());
        }
        if let Some(handler) = &self.on_auction_closed {
            result.auction_closed_producer.push(handler.subscribe());
        }
        if let Some(handler) = &self.on_offer_selected {
            result.offer_selected_producer.push(handler.subscribe());
        }
        result
    }

    pub async fn start_handlers(self) {
        if let Some(handler) = self.on_application_created {
            tokio::spawn(async move {
                handler.start_handler().await;
            });
        }
        if let Some(handler) = self.on_auction_closed {
            tokio::spawn(async move {
                handler.start_handler().await;
            });
        }
        if let Some(handler) = self.on_offer_selected {
            tokio::spawn(async move {
                handler.start_handler().await;
            });
        }
    }
}

#[derive(Default, Clone)]
pub struct EventHooks {
    pub on_application_created: Option<Handler<ApplicationCreatedEvent>>,
    pub on_auction_closed: Option<Handler<AuctionClosedEvent>>,
    pub on_offer_selected: Option<Handler<OfferSelectedEvent>>,
}

impl EventHooks {
    pub fn on_application_created<F>(&mut self, f: F) -> &mut Self
    where F: (Fn(ApplicationCreatedEvent) -> Pin<Box<dyn Future<Output = ()> + Send>>) + Send + Sync + 'static {
        self.on_application_created = Some(Arc::new(f));
        self
    }

    pub fn on_auction_closed<F>(&mut self, f: F) -> &mut Self
    where F: (Fn(AuctionClosedEvent) -> Pin<Box<dyn Future<Output = ()> + Send>>) + Send + Sync + 'static {
        self.on_auction_closed = Some(Arc::new(f));
        self
    }

    pub fn on_offer_selected<F>(&mut self, f: F) -> &mut Self
    where F: (Fn(OfferSelectedEvent) -> Pin<Box<dyn Future<Output = ()> + Send>>) + Send + Sync + 'static {
        self.on_offer_selected = Some(Arc::new(f));
        self
    }
}
