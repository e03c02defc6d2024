use std::fmt::Display;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::db_types::ApplicationStatus;

/// Criteria for the admin application search. All fields are optional and AND-ed together.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ApplicationQueryFilter {
    pub business_user_id: Option<String>,
    pub status: Option<Vec<ApplicationStatus>>,
    pub since: Option<DateTime<Utc>>,
    pub until: Option<DateTime<Utc>>,
}

impl ApplicationQueryFilter {
    pub fn is_empty(&self) -> bool {
        self.business_user_id.is_none()
            && self.status.as_ref().map(|s| s.is_empty()).unwrap_or(true)
            && self.since.is_none()
            && self.until.is_none()
    }

    pub fn with_status(mut self, status: ApplicationStatus) -> Self {
        self.status.get_or_insert_with(Vec::new).push(status);
        self
    }

    pub fn for_business<S: Into<String>>(mut self, business_user_id: S) -> Self {
        self.business_user_id = Some(business_user_id.into());
        self
    }
}

impl Display for ApplicationQueryFilter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut parts = vec![];
        if let Some(b) = &self.business_user_id {
            parts.push(format!("business={b}"));
        }
        if let Some(statuses) = &self.status {
            let s = statuses.iter().map(|s| s.to_string()).collect::<Vec<String>>().join("|");
            parts.push(format!("status={s}"));
        }
        if let Some(since) = &self.since {
            parts.push(format!("since={since}"));
        }
        if let Some(until) = &self.until {
            parts.push(format!("until={until}"));
        }
        write!(f, "{}", parts.join(","))
    }
}
