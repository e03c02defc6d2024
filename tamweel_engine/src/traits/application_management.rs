use thiserror::Error;

use crate::{
    db_types::{Application, ApplicationId, ClaimKind, Offer, OfferId, StatusAuditEntry, TrackingRecord},
    market_api::application_objects::ApplicationQueryFilter,
};

/// Read-side behaviour for marketplace backends.
///
/// Nothing here mutates state. Claim sets are returned as sorted bank id lists; the tracking rows are the advisory
/// projection and may be stale between refreshes.
#[allow(async_fn_in_trait)]
pub trait ApplicationManagement {
    async fn fetch_application(&self, id: &ApplicationId) -> Result<Option<Application>, ApplicationApiError>;

    /// The business's most recent application whose effective status is still `LiveAuction`, if any.
    async fn fetch_active_application_for_business(
        &self,
        business_user_id: &str,
    ) -> Result<Option<Application>, ApplicationApiError>;

    /// The business's most recently submitted application, in any state.
    async fn fetch_latest_application_for_business(
        &self,
        business_user_id: &str,
    ) -> Result<Option<Application>, ApplicationApiError>;

    async fn fetch_offer(&self, offer_id: &OfferId) -> Result<Option<Offer>, ApplicationApiError>;

    /// All offers against the application, most recent first.
    async fn fetch_offers_for_application(&self, id: &ApplicationId) -> Result<Vec<Offer>, ApplicationApiError>;

    /// The bank ids in the application's claim set for `kind`, sorted.
    async fn fetch_claims(&self, id: &ApplicationId, kind: ClaimKind) -> Result<Vec<String>, ApplicationApiError>;

    async fn fetch_tracking_for_application(
        &self,
        id: &ApplicationId,
    ) -> Result<Vec<TrackingRecord>, ApplicationApiError>;

    /// The append-only status transition trail, oldest first.
    async fn fetch_audit_log(&self, id: &ApplicationId) -> Result<Vec<StatusAuditEntry>, ApplicationApiError>;

    /// Fetches applications according to criteria specified in the `ApplicationQueryFilter`.
    async fn search_applications(
        &self,
        query: ApplicationQueryFilter,
    ) -> Result<Vec<Application>, ApplicationApiError>;
}

#[derive(Debug, Clone, Error)]
pub enum ApplicationApiError {
    #[error("Database error: {0}")]
    DatabaseError(String),
    #[error("The requested application {0} does not exist")]
    ApplicationNotFound(ApplicationId),
}

impl ApplicationApiError {
    pub fn dne(id: ApplicationId) -> Self {
        Self::ApplicationNotFound(id)
    }
}

impl From<sqlx::Error> for ApplicationApiError {
    fn from(e: sqlx::Error) -> Self {
        ApplicationApiError::DatabaseError(e.to_string())
    }
}
