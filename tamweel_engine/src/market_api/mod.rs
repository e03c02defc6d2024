//! The marketplace engine public API.
//!
//! [`AuctionFlowApi`] is the write side: everything that moves an application through its lifecycle, plus the two
//! scheduled maintenance passes. [`ApplicationApi`] is the read side. Both are thin wrappers over a backend
//! implementing the traits in [`crate::traits`]; the flow API additionally owns the post-commit event producers.
mod application_api;
pub mod application_objects;
mod auction_flow_api;

pub use application_api::ApplicationApi;
pub use auction_flow_api::AuctionFlowApi;
