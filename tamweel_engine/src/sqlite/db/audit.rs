use chrono::Utc;
use sqlx::SqliteConnection;

use crate::db_types::{ApplicationId, ApplicationStatus, StatusAuditEntry};

/// Appends one immutable audit row. Always called inside the transaction that performs the transition it records.
pub async fn append(
    application_id: &ApplicationId,
    from_status: ApplicationStatus,
    to_status: ApplicationStatus,
    reason: &str,
    actor: &str,
    conn: &mut SqliteConnection,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        "INSERT INTO status_audit_log (application_id, from_status, to_status, reason, actor, created_at) VALUES \
         ($1, $2, $3, $4, $5, $6)",
    )
    .bind(application_id.as_str())
    .bind(from_status)
    .bind(to_status)
    .bind(reason)
    .bind(actor)
    .bind(Utc::now())
    .execute(conn)
    .await?;
    Ok(())
}

pub async fn fetch_for_application(
    application_id: &ApplicationId,
    conn: &mut SqliteConnection,
) -> Result<Vec<StatusAuditEntry>, sqlx::Error> {
    let entries = sqlx::query_as("SELECT * FROM status_audit_log WHERE application_id = $1 ORDER BY id ASC")
        .bind(application_id.as_str())
        .fetch_all(conn)
        .await?;
    Ok(entries)
}
