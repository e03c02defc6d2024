//! # Tamweel Marketplace server
//!
//! This crate hosts the HTTP tier and the scheduled workers of the marketplace. It is responsible for:
//! * Accepting application submissions from businesses and opening their auction windows.
//! * Accepting bank claims, offers and withdrawals while a window is open.
//! * Accepting the business's winning-offer selection.
//! * Running the auction clock (the transition sweeper) and the reconciliation job on fixed in-process intervals.
//!
//! ## Configuration
//! The server is configured via environment variables. See [config](config/index.html) for more information.
//!
//! ## Identity
//! Every `/api` call arrives with an identity already resolved by the upstream gateway
//! (`x-tmw-user-id` / `x-tmw-user-type` / `x-tmw-bank-user-id`). The server trusts that resolution; it does not
//! re-authenticate.
pub mod auction_clock;
pub mod auth;
pub mod cli;
pub mod config;
pub mod data_objects;
pub mod errors;
pub mod middleware;
pub mod reconciliation_worker;
pub mod routes;
pub mod server;

#[cfg(test)]
mod endpoint_tests;
