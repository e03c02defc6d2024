use chrono::{DateTime, Utc};
use sqlx::SqliteConnection;

use crate::db_types::{Application, ApplicationId, ApplicationStatus, TrackingRecord};

/// Which timeline column a state-changing operation stamps.
#[derive(Debug, Clone, Copy)]
pub enum TrackingStamp {
    Opened,
    Purchased,
    OfferSubmitted,
    OfferSelected,
    OfferLost,
}

impl TrackingStamp {
    fn column(&self) -> &'static str {
        match self {
            TrackingStamp::Opened => "opened_at",
            TrackingStamp::Purchased => "purchased_at",
            TrackingStamp::OfferSubmitted => "offer_submitted_at",
            TrackingStamp::OfferSelected => "offer_selected_at",
            TrackingStamp::OfferLost => "offer_lost_at",
        }
    }
}

/// Upserts the `(application, bank)` timeline row and stamps one milestone column.
///
/// The upsert keeps the unique `(application_id, bank_user_id)` constraint authoritative: there is never a second
/// row for the pair, no matter how many operations stamp it. The status copy is refreshed on every stamp.
pub async fn stamp(
    application: &Application,
    bank_user_id: &str,
    milestone: TrackingStamp,
    now: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<(), sqlx::Error> {
    let column = milestone.column();
    let sql = format!(
        r#"
            INSERT INTO application_tracking (
                application_id,
                bank_user_id,
                current_application_status,
                submitted_at,
                auction_end_time,
                {column},
                updated_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $6)
            ON CONFLICT (application_id, bank_user_id) DO UPDATE SET
                current_application_status = excluded.current_application_status,
                {column} = COALESCE(application_tracking.{column}, excluded.{column}),
                updated_at = excluded.updated_at
        "#
    );
    sqlx::query(&sql)
        .bind(application.application_id.as_str())
        .bind(bank_user_id)
        .bind(application.status)
        .bind(application.submitted_at)
        .bind(application.auction_end_time)
        .bind(now)
        .execute(conn)
        .await?;
    Ok(())
}

/// Refreshes the status copy on every tracking row of an application. Returns how many rows were actually stale,
/// which the reconciliation job reports as drift.
pub async fn refresh_status(
    application_id: &ApplicationId,
    status: ApplicationStatus,
    now: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<u64, sqlx::Error> {
    let result = sqlx::query(
        "UPDATE application_tracking SET current_application_status = $2, updated_at = $3 WHERE application_id = $1 \
         AND current_application_status != $2",
    )
    .bind(application_id.as_str())
    .bind(status)
    .bind(now)
    .execute(conn)
    .await?;
    Ok(result.rows_affected())
}

pub async fn fetch_for_application(
    application_id: &ApplicationId,
    conn: &mut SqliteConnection,
) -> Result<Vec<TrackingRecord>, sqlx::Error> {
    let records = sqlx::query_as("SELECT * FROM application_tracking WHERE application_id = $1 ORDER BY bank_user_id")
        .bind(application_id.as_str())
        .fetch_all(conn)
        .await?;
    Ok(records)
}
