use log::*;
use tamweel_engine::{events::EventProducers, AuctionFlowApi, SqliteDatabase};
use tokio::task::JoinHandle;

/// Starts the reconciliation worker. Do not await the returned JoinHandle, as it will run indefinitely.
///
/// Each pass recomputes the cached aggregates from source-of-truth counts and corrects drift in place. This is the
/// designed replacement for the one-off "fix stuck applications" scripts: recurring drift correction as a scheduled
/// feature instead of a manual incident response.
pub fn start_reconciliation_worker(db: SqliteDatabase, pass_interval: std::time::Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut timer = tokio::time::interval(pass_interval);
        let api = AuctionFlowApi::new(db, EventProducers::default());
        info!("⚖️ Reconciliation worker started");
        loop {
            timer.tick().await;
            debug!("⚖️ Running reconciliation pass");
            match api.reconcile_aggregates().await {
                Ok(report) => {
                    if report.is_clean() {
                        trace!("⚖️ Clean pass over {} application(s)", report.applications_scanned);
                    } else {
                        warn!(
                            "⚖️ Corrected {} drift(s) across {} application(s): {:?}",
                            report.drifts.len(),
                            report.applications_scanned,
                            report.drifts
                        );
                    }
                },
                Err(e) => {
                    error!("⚖️ Error running reconciliation pass: {e}");
                },
            }
        }
    })
}
