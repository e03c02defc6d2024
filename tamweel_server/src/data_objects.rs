use std::fmt::Display;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tamweel_engine::{
    application_objects::ApplicationQueryFilter,
    db_types::{Application, ApplicationId, ApplicationStatus, ClaimKind, OfferId, OfferStatus},
    traits::{DriftRecord, ReconciliationReport, SweepResult},
};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateApplicationRequest {
    /// The financing request details. Opaque to the marketplace.
    pub payload: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApplicationCreatedResponse {
    pub application_id: ApplicationId,
    pub status: ApplicationStatus,
    pub auction_end_time: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClaimRequest {
    pub kind: ClaimKind,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClaimResponse {
    /// False when the bank was already in the claim set (the call was an idempotent no-op).
    pub accepted: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OfferRequest {
    /// Financial terms of the bid. Opaque to the marketplace.
    pub terms: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OfferResponse {
    pub offer_id: OfferId,
    pub status: OfferStatus,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SelectOfferRequest {
    pub offer_id: OfferId,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SelectOfferResponse {
    pub status: ApplicationStatus,
    pub selected_offer_id: OfferId,
}

/// Full application view including the claim registry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApplicationDetail {
    #[serde(flatten)]
    pub application: Application,
    pub opened_by: Vec<String>,
    pub purchased_by: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SweepSummary {
    pub completed: usize,
    pub ignored: usize,
    pub offers_expired: usize,
    pub failed: usize,
}

impl From<&SweepResult> for SweepSummary {
    fn from(result: &SweepResult) -> Self {
        Self {
            completed: result.completed.len(),
            ignored: result.ignored.len(),
            offers_expired: result.expired_offers.len(),
            failed: result.failed.len(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconciliationSummary {
    pub applications_scanned: usize,
    pub drifts: Vec<DriftRecord>,
}

impl From<&ReconciliationReport> for ReconciliationSummary {
    fn from(report: &ReconciliationReport) -> Self {
        Self { applications_scanned: report.applications_scanned, drifts: report.drifts.clone() }
    }
}

/// Query parameters for the admin application search. Statuses arrive as a comma-separated list because query
/// string deserialization has no sequence syntax.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ApplicationSearchParams {
    pub business_user_id: Option<String>,
    /// e.g. `status=live_auction,completed`
    pub status: Option<String>,
    pub since: Option<DateTime<Utc>>,
    pub until: Option<DateTime<Utc>>,
}

impl ApplicationSearchParams {
    pub fn into_filter(self) -> Result<ApplicationQueryFilter, String> {
        let status = match self.status {
            None => None,
            Some(s) => {
                let mut statuses = Vec::new();
                for part in s.split(',').map(str::trim).filter(|p| !p.is_empty()) {
                    let status = serde_json::from_value::<ApplicationStatus>(Value::String(part.to_string()))
                        .map_err(|_| format!("Invalid application status: {part}"))?;
                    statuses.push(status);
                }
                Some(statuses)
            },
        };
        Ok(ApplicationQueryFilter { business_user_id: self.business_user_id, status, since: self.since, until: self.until })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonResponse {
    pub success: bool,
    pub message: String,
}

impl JsonResponse {
    pub fn success<S: Display>(message: S) -> Self {
        Self { success: true, message: message.to_string() }
    }

    pub fn failure<S: Display>(message: S) -> Self {
        Self { success: false, message: message.to_string() }
    }
}
