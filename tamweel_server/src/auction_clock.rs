use chrono::Duration;
use log::*;
use tamweel_engine::{db_types::Application, events::EventProducers, AuctionFlowApi, SqliteDatabase};
use tokio::task::JoinHandle;

/// Starts the auction clock. Do not await the returned JoinHandle, as it will run indefinitely.
///
/// Every tick resolves the auction windows the wall clock has already closed. The tick interval only bounds how
/// stale the cached status column can get; the deadline itself is enforced by the effective-status checks on every
/// write path, so a late tick can never let a bid sneak in.
pub fn start_auction_clock(
    db: SqliteDatabase,
    producers: EventProducers,
    selection_window: Duration,
    tick_interval: std::time::Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut timer = tokio::time::interval(tick_interval);
        let api = AuctionFlowApi::new(db, producers);
        info!("🕰️ Auction clock started");
        loop {
            timer.tick().await;
            debug!("🕰️ Running auction window sweep");
            match api.sweep_expired_auctions(selection_window).await {
                Ok(result) => {
                    if result.is_empty() {
                        trace!("🕰️ Nothing to resolve this tick");
                        continue;
                    }
                    info!(
                        "🕰️ {} auction(s) resolved: {} completed, {} ignored, {} offer(s) expired",
                        result.total_transitions(),
                        result.completed.len(),
                        result.ignored.len(),
                        result.expired_offers.len()
                    );
                    debug!("🕰️ Completed: {}", application_list(&result.completed));
                    debug!("🕰️ Ignored: {}", application_list(&result.ignored));
                    if !result.failed.is_empty() {
                        warn!(
                            "🕰️ {} application(s) failed to transition and will be retried next tick: {:?}",
                            result.failed.len(),
                            result.failed
                        );
                    }
                },
                Err(e) => {
                    error!("🕰️ Error running auction window sweep: {e}");
                },
            }
        }
    })
}

fn application_list(applications: &[Application]) -> String {
    applications
        .iter()
        .map(|a| format!("[{}] business: {} offers: {}", a.application_id, a.business_user_id, a.offers_count))
        .collect::<Vec<String>>()
        .join(", ")
}
