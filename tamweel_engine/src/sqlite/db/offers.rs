use chrono::{DateTime, Utc};
use log::debug;
use sqlx::SqliteConnection;

use crate::{
    db_types::{ApplicationId, NewOffer, Offer, OfferId, OfferStatus},
    helpers::new_offer_id,
    traits::MarketplaceError,
};

/// Inserts the bank's offer, or updates it in place when the bank already has one against this application.
///
/// Returns the offer and whether it should be counted as new: a fresh insert counts, as does re-activating a
/// previously withdrawn row. A plain re-submission over a live offer replaces the terms and does not count again.
pub async fn upsert_offer(offer: NewOffer, conn: &mut SqliteConnection) -> Result<(Offer, bool), MarketplaceError> {
    let existing = fetch_offer_for_bank(&offer.application_id, &offer.bank_user_id, &mut *conn).await?;
    let now = Utc::now();
    let terms = offer.terms.to_string();
    match existing {
        None => {
            let offer_id = new_offer_id();
            let inserted: Offer = sqlx::query_as(
                r#"
                    INSERT INTO offers (
                        offer_id,
                        application_id,
                        bank_user_id,
                        submitted_by_user_id,
                        terms,
                        access_fee,
                        status,
                        created_at,
                        updated_at
                    ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $8)
                    RETURNING *;
                "#,
            )
            .bind(&offer_id)
            .bind(offer.application_id.as_str())
            .bind(offer.bank_user_id)
            .bind(offer.submitted_by_user_id)
            .bind(terms)
            .bind(offer.access_fee)
            .bind(OfferStatus::Submitted)
            .bind(now)
            .fetch_one(conn)
            .await?;
            debug!("🗃️ Offer [{offer_id}] inserted against application {}", inserted.application_id);
            Ok((inserted, true))
        },
        Some(previous) => {
            let reactivated = previous.status == OfferStatus::Withdrawn;
            let updated: Offer = sqlx::query_as(
                r#"
                    UPDATE offers SET
                        terms = $2,
                        submitted_by_user_id = $3,
                        status = 'Submitted',
                        updated_at = $4
                    WHERE offer_id = $1
                    RETURNING *;
                "#,
            )
            .bind(previous.offer_id.as_str())
            .bind(terms)
            .bind(offer.submitted_by_user_id)
            .bind(now)
            .fetch_one(conn)
            .await?;
            debug!(
                "🗃️ Offer [{}] re-submitted by {} (reactivated: {reactivated})",
                updated.offer_id, updated.bank_user_id
            );
            Ok((updated, reactivated))
        },
    }
}

pub async fn fetch_offer_by_offer_id(
    offer_id: &OfferId,
    conn: &mut SqliteConnection,
) -> Result<Option<Offer>, sqlx::Error> {
    let offer =
        sqlx::query_as("SELECT * FROM offers WHERE offer_id = $1").bind(offer_id.as_str()).fetch_optional(conn).await?;
    Ok(offer)
}

pub async fn fetch_offer_for_bank(
    application_id: &ApplicationId,
    bank_user_id: &str,
    conn: &mut SqliteConnection,
) -> Result<Option<Offer>, sqlx::Error> {
    let offer = sqlx::query_as("SELECT * FROM offers WHERE application_id = $1 AND bank_user_id = $2")
        .bind(application_id.as_str())
        .bind(bank_user_id)
        .fetch_optional(conn)
        .await?;
    Ok(offer)
}

pub async fn fetch_offers_for_application(
    application_id: &ApplicationId,
    conn: &mut SqliteConnection,
) -> Result<Vec<Offer>, sqlx::Error> {
    let offers = sqlx::query_as("SELECT * FROM offers WHERE application_id = $1 ORDER BY created_at DESC")
        .bind(application_id.as_str())
        .fetch_all(conn)
        .await?;
    Ok(offers)
}

/// The count the cached `offers_count` must agree with: every offer that has not been withdrawn.
pub async fn count_live_offers(
    application_id: &ApplicationId,
    conn: &mut SqliteConnection,
) -> Result<i64, sqlx::Error> {
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM offers WHERE application_id = $1 AND status != $2")
        .bind(application_id.as_str())
        .bind(OfferStatus::Withdrawn)
        .fetch_one(conn)
        .await?;
    Ok(count)
}

/// Marks the chosen offer `Selected`. Guarded on the current status being `Submitted`; a withdrawn or expired offer
/// cannot win. The partial unique index on `(application_id) WHERE status = 'Selected'` backs this up at the schema
/// level.
pub async fn mark_selected(
    offer_id: &OfferId,
    now: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<Option<Offer>, sqlx::Error> {
    let offer = sqlx::query_as(
        "UPDATE offers SET status = 'Selected', updated_at = $2 WHERE offer_id = $1 AND status = 'Submitted' \
         RETURNING *;",
    )
    .bind(offer_id.as_str())
    .bind(now)
    .fetch_optional(conn)
    .await?;
    Ok(offer)
}

/// Forces every live sibling of the winning offer to `DealLost`. Runs in the same transaction as [`mark_selected`].
pub async fn mark_deal_lost(
    application_id: &ApplicationId,
    except_offer_id: &OfferId,
    now: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<Vec<Offer>, sqlx::Error> {
    let offers = sqlx::query_as(
        "UPDATE offers SET status = 'DealLost', updated_at = $3 WHERE application_id = $1 AND offer_id != $2 AND \
         status = 'Submitted' RETURNING *;",
    )
    .bind(application_id.as_str())
    .bind(except_offer_id.as_str())
    .bind(now)
    .fetch_all(conn)
    .await?;
    Ok(offers)
}

/// Marks the bank's live offer `Withdrawn`. Returns `None` when the bank has no live offer to withdraw.
pub async fn mark_withdrawn(
    application_id: &ApplicationId,
    bank_user_id: &str,
    now: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<Option<Offer>, sqlx::Error> {
    let offer = sqlx::query_as(
        "UPDATE offers SET status = 'Withdrawn', updated_at = $3 WHERE application_id = $1 AND bank_user_id = $2 AND \
         status = 'Submitted' RETURNING *;",
    )
    .bind(application_id.as_str())
    .bind(bank_user_id)
    .bind(now)
    .fetch_optional(conn)
    .await?;
    Ok(offer)
}

/// Expires every live offer on an application whose selection window elapsed unselected.
pub async fn expire_offers_for_application(
    application_id: &ApplicationId,
    now: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<Vec<Offer>, sqlx::Error> {
    let offers = sqlx::query_as(
        "UPDATE offers SET status = 'Expired', updated_at = $2 WHERE application_id = $1 AND status = 'Submitted' \
         RETURNING *;",
    )
    .bind(application_id.as_str())
    .bind(now)
    .fetch_all(conn)
    .await?;
    Ok(offers)
}
