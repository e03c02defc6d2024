use chrono::{DateTime, Utc};
use log::debug;
use sqlx::{QueryBuilder, SqliteConnection};
use tamweel_common::Halalas;

use crate::{
    db_types::{Application, ApplicationId, ApplicationStatus, ClaimKind, NewApplication},
    helpers::new_application_id,
    market_api::application_objects::ApplicationQueryFilter,
    traits::MarketplaceError,
};

/// Inserts a new application with an open auction window. This is not atomic on its own. Callers embed it inside a
/// transaction together with the one-live-application-per-business check and pass `&mut *tx` as the connection.
pub async fn insert_application(
    application: NewApplication,
    conn: &mut SqliteConnection,
) -> Result<Application, MarketplaceError> {
    let now = Utc::now();
    let application_id = new_application_id();
    let auction_end_time = application.auction_end_time();
    let payload = application.payload.to_string();
    let application = sqlx::query_as(
        r#"
            INSERT INTO applications (
                application_id,
                business_user_id,
                status,
                submitted_at,
                auction_end_time,
                payload,
                created_at,
                updated_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING *;
        "#,
    )
    .bind(&application_id)
    .bind(application.business_user_id)
    .bind(ApplicationStatus::LiveAuction)
    .bind(application.submitted_at)
    .bind(auction_end_time)
    .bind(payload)
    .bind(now)
    .bind(now)
    .fetch_one(conn)
    .await?;
    debug!("🗃️ Application [{application_id}] inserted, auction closes at {auction_end_time}");
    Ok(application)
}

/// True when the business has an application whose auction window is still open.
///
/// The check runs on `auction_end_time` alone. The cached status column never enters into it, so a stale cache
/// cannot admit a duplicate.
pub async fn has_live_application(
    business_user_id: &str,
    now: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<bool, sqlx::Error> {
    let count: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM applications WHERE business_user_id = $1 AND auction_end_time > $2")
            .bind(business_user_id)
            .bind(now)
            .fetch_one(conn)
            .await?;
    Ok(count > 0)
}

pub async fn fetch_application(
    application_id: &ApplicationId,
    conn: &mut SqliteConnection,
) -> Result<Option<Application>, sqlx::Error> {
    let application = sqlx::query_as("SELECT * FROM applications WHERE application_id = $1")
        .bind(application_id.as_str())
        .fetch_optional(conn)
        .await?;
    Ok(application)
}

pub async fn fetch_latest_for_business(
    business_user_id: &str,
    conn: &mut SqliteConnection,
) -> Result<Option<Application>, sqlx::Error> {
    let application =
        sqlx::query_as("SELECT * FROM applications WHERE business_user_id = $1 ORDER BY submitted_at DESC LIMIT 1")
            .bind(business_user_id)
            .fetch_optional(conn)
            .await?;
    Ok(application)
}

pub async fn fetch_active_for_business(
    business_user_id: &str,
    now: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<Option<Application>, sqlx::Error> {
    let application = sqlx::query_as(
        "SELECT * FROM applications WHERE business_user_id = $1 AND auction_end_time > $2 ORDER BY submitted_at \
         DESC LIMIT 1",
    )
    .bind(business_user_id)
    .bind(now)
    .fetch_optional(conn)
    .await?;
    Ok(application)
}

/// The atomic "add member" operation on a claim set. Returns `true` when the set grew, `false` when the bank was
/// already a member (a no-op, not an error).
pub async fn add_claim(
    application_id: &ApplicationId,
    bank_user_id: &str,
    kind: ClaimKind,
    conn: &mut SqliteConnection,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        "INSERT OR IGNORE INTO application_claims (application_id, bank_user_id, kind, created_at) VALUES ($1, $2, \
         $3, $4)",
    )
    .bind(application_id.as_str())
    .bind(bank_user_id)
    .bind(kind)
    .bind(Utc::now())
    .execute(conn)
    .await?;
    Ok(result.rows_affected() > 0)
}

pub async fn fetch_claims(
    application_id: &ApplicationId,
    kind: ClaimKind,
    conn: &mut SqliteConnection,
) -> Result<Vec<String>, sqlx::Error> {
    let banks = sqlx::query_scalar(
        "SELECT bank_user_id FROM application_claims WHERE application_id = $1 AND kind = $2 ORDER BY bank_user_id",
    )
    .bind(application_id.as_str())
    .bind(kind)
    .fetch_all(conn)
    .await?;
    Ok(banks)
}

/// Backfills `Purchased` claims for every bank that holds a live offer. Reconciliation only; the hot path records
/// claims as part of the offer transaction.
pub async fn backfill_purchased_claims(
    application_id: &ApplicationId,
    conn: &mut SqliteConnection,
) -> Result<u64, sqlx::Error> {
    let result = sqlx::query(
        r#"
            INSERT OR IGNORE INTO application_claims (application_id, bank_user_id, kind, created_at)
            SELECT application_id, bank_user_id, 'Purchased', $2
            FROM offers WHERE application_id = $1 AND status != 'Withdrawn'
        "#,
    )
    .bind(application_id.as_str())
    .bind(Utc::now())
    .execute(conn)
    .await?;
    Ok(result.rows_affected())
}

pub async fn add_revenue(
    application_id: &ApplicationId,
    amount: Halalas,
    conn: &mut SqliteConnection,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        "UPDATE applications SET revenue_collected = revenue_collected + $2, updated_at = $3 WHERE application_id = \
         $1",
    )
    .bind(application_id.as_str())
    .bind(amount)
    .bind(Utc::now())
    .execute(conn)
    .await?;
    Ok(())
}

/// Atomic `+1` on the cached offer counter. Only the offer-insertion transaction calls this; the reconciliation job
/// is the only place that recounts.
pub async fn increment_offers_count(
    application_id: &ApplicationId,
    conn: &mut SqliteConnection,
) -> Result<(), sqlx::Error> {
    sqlx::query("UPDATE applications SET offers_count = offers_count + 1, updated_at = $2 WHERE application_id = $1")
        .bind(application_id.as_str())
        .bind(Utc::now())
        .execute(conn)
        .await?;
    Ok(())
}

pub async fn decrement_offers_count(
    application_id: &ApplicationId,
    conn: &mut SqliteConnection,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        "UPDATE applications SET offers_count = MAX(offers_count - 1, 0), updated_at = $2 WHERE application_id = $1",
    )
    .bind(application_id.as_str())
    .bind(Utc::now())
    .execute(conn)
    .await?;
    Ok(())
}

pub async fn set_offers_count(
    application_id: &ApplicationId,
    count: i64,
    conn: &mut SqliteConnection,
) -> Result<(), sqlx::Error> {
    sqlx::query("UPDATE applications SET offers_count = $2, updated_at = $3 WHERE application_id = $1")
        .bind(application_id.as_str())
        .bind(count)
        .bind(Utc::now())
        .execute(conn)
        .await?;
    Ok(())
}

/// Resolves one application whose auction window has elapsed.
///
/// The UPDATE repeats the sweep precondition (`status = LiveAuction AND auction_end_time <= now`), so this is
/// idempotent: once a row has transitioned it no longer matches and the call returns `None`. The completed/ignored
/// branch is taken inside the statement from the row's own `offers_count`, and the selection window is stamped only
/// on the completed branch.
pub async fn resolve_expired_auction(
    application_id: &ApplicationId,
    selection_end: DateTime<Utc>,
    now: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<Option<Application>, sqlx::Error> {
    let application = sqlx::query_as(
        r#"
            UPDATE applications SET
                status = CASE WHEN offers_count > 0 THEN 'Completed' ELSE 'Ignored' END,
                offer_selection_end_time = CASE WHEN offers_count > 0 THEN $2 ELSE offer_selection_end_time END,
                updated_at = $3
            WHERE application_id = $1 AND status = 'LiveAuction' AND auction_end_time <= $3
            RETURNING *;
        "#,
    )
    .bind(application_id.as_str())
    .bind(selection_end)
    .bind(now)
    .fetch_optional(conn)
    .await?;
    Ok(application)
}

/// Stamps the winning offer on the application. Guarded by `selected_offer_id IS NULL`; returns `false` when a
/// concurrent selection already committed. Also converges the cached status to `Completed`, which the effective
/// status already is whenever the caller's precondition checks pass, so selection works even before the sweeper
/// has visited the row.
pub async fn stamp_selection(
    application_id: &ApplicationId,
    offer_id: &str,
    now: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        "UPDATE applications SET selected_offer_id = $2, selected_at = $3, status = 'Completed', updated_at = $3 \
         WHERE application_id = $1 AND selected_offer_id IS NULL",
    )
    .bind(application_id.as_str())
    .bind(offer_id)
    .bind(now)
    .execute(conn)
    .await?;
    Ok(result.rows_affected() > 0)
}

/// Sweep candidates: applications the wall clock has already resolved but the cached status hasn't caught up with.
pub async fn fetch_expired_live_auctions(
    now: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<Vec<Application>, sqlx::Error> {
    let applications = sqlx::query_as(
        "SELECT * FROM applications WHERE status = 'LiveAuction' AND auction_end_time <= $1 ORDER BY \
         auction_end_time ASC",
    )
    .bind(now)
    .fetch_all(conn)
    .await?;
    Ok(applications)
}

/// Completed applications whose selection window elapsed with no selection. Their live offers are due to expire.
pub async fn fetch_expired_selection_windows(
    now: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<Vec<Application>, sqlx::Error> {
    let applications = sqlx::query_as(
        r#"
            SELECT * FROM applications
            WHERE status = 'Completed'
              AND selected_offer_id IS NULL
              AND offer_selection_end_time IS NOT NULL
              AND offer_selection_end_time <= $1
              AND EXISTS (SELECT 1 FROM offers
                          WHERE offers.application_id = applications.application_id AND offers.status = 'Submitted')
            ORDER BY offer_selection_end_time ASC
        "#,
    )
    .bind(now)
    .fetch_all(conn)
    .await?;
    Ok(applications)
}

pub async fn fetch_all_application_ids(conn: &mut SqliteConnection) -> Result<Vec<ApplicationId>, sqlx::Error> {
    let ids = sqlx::query_scalar("SELECT application_id FROM applications ORDER BY id ASC").fetch_all(conn).await?;
    Ok(ids)
}

/// Fetches applications according to criteria specified in the `ApplicationQueryFilter`.
///
/// Resulting applications are ordered by `submitted_at` in ascending order.
pub async fn search_applications(
    query: ApplicationQueryFilter,
    conn: &mut SqliteConnection,
) -> Result<Vec<Application>, sqlx::Error> {
    let mut builder = QueryBuilder::new(
        r#"
    SELECT * FROM applications
    "#,
    );
    if !query.is_empty() {
        builder.push("WHERE ");
    }
    let mut where_clause = builder.separated(" AND ");
    if let Some(business_user_id) = query.business_user_id {
        where_clause.push("business_user_id = ");
        where_clause.push_bind_unseparated(business_user_id);
    }
    if query.status.as_ref().map(|s| !s.is_empty()).unwrap_or(false) {
        let mut statuses = vec![];
        query.status.as_ref().unwrap().iter().for_each(|s| {
            statuses.push(format!("'{s}'"));
        });
        let status_clause = statuses.join(",");
        where_clause.push(format!("status IN ({status_clause})"));
    }
    if let Some(since) = query.since {
        where_clause.push("submitted_at >= ");
        where_clause.push_bind_unseparated(since);
    }
    if let Some(until) = query.until {
        where_clause.push("submitted_at <= ");
        where_clause.push_bind_unseparated(until);
    }
    builder.push(" ORDER BY submitted_at ASC");
    let query = builder.build_query_as::<Application>();
    let applications = query.fetch_all(conn).await?;
    Ok(applications)
}
