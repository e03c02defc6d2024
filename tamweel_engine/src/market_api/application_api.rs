use crate::{
    db_types::{Application, ApplicationId, ClaimKind, Offer, OfferId, StatusAuditEntry, TrackingRecord},
    market_api::application_objects::ApplicationQueryFilter,
    traits::{ApplicationApiError, ApplicationManagement},
};

/// Read-side API for applications, offers, claim sets and the audit trail.
pub struct ApplicationApi<B> {
    db: B,
}

impl<B> ApplicationApi<B> {
    pub fn new(db: B) -> Self {
        Self { db }
    }
}

impl<B> ApplicationApi<B>
where B: ApplicationManagement
{
    pub async fn application(&self, id: &ApplicationId) -> Result<Option<Application>, ApplicationApiError> {
        self.db.fetch_application(id).await
    }

    /// The application, or an `ApplicationNotFound` error if it does not exist.
    pub async fn expect_application(&self, id: &ApplicationId) -> Result<Application, ApplicationApiError> {
        self.db.fetch_application(id).await?.ok_or_else(|| ApplicationApiError::dne(id.clone()))
    }

    pub async fn active_application_for_business(
        &self,
        business_user_id: &str,
    ) -> Result<Option<Application>, ApplicationApiError> {
        self.db.fetch_active_application_for_business(business_user_id).await
    }

    pub async fn latest_application_for_business(
        &self,
        business_user_id: &str,
    ) -> Result<Option<Application>, ApplicationApiError> {
        self.db.fetch_latest_application_for_business(business_user_id).await
    }

    pub async fn offer(&self, offer_id: &OfferId) -> Result<Option<Offer>, ApplicationApiError> {
        self.db.fetch_offer(offer_id).await
    }

    pub async fn offers_for_application(&self, id: &ApplicationId) -> Result<Vec<Offer>, ApplicationApiError> {
        self.db.fetch_offers_for_application(id).await
    }

    /// The bank ids in the application's claim set for `kind`, sorted.
    pub async fn claims(&self, id: &ApplicationId, kind: ClaimKind) -> Result<Vec<String>, ApplicationApiError> {
        self.db.fetch_claims(id, kind).await
    }

    pub async fn tracking_for_application(
        &self,
        id: &ApplicationId,
    ) -> Result<Vec<TrackingRecord>, ApplicationApiError> {
        self.db.fetch_tracking_for_application(id).await
    }

    pub async fn audit_log(&self, id: &ApplicationId) -> Result<Vec<StatusAuditEntry>, ApplicationApiError> {
        self.db.fetch_audit_log(id).await
    }

    pub async fn search_applications(
        &self,
        query: ApplicationQueryFilter,
    ) -> Result<Vec<Application>, ApplicationApiError> {
        self.db.search_applications(query).await
    }
}
