//! Resolved identity handling.
//!
//! Authentication happens upstream: the gateway verifies the session and forwards the resolved identity in the
//! `x-tmw-user-id`, `x-tmw-user-type` and (for delegated bank employees) `x-tmw-bank-user-id` headers. The server
//! trusts this resolution and does not re-authenticate; this module only parses it into a typed
//! [`ResolvedIdentity`] that handlers extract as a parameter.
use std::{fmt::Display, future::Future, pin::Pin, str::FromStr};

use actix_web::{dev::Payload, FromRequest, HttpMessage, HttpRequest};
use serde::{Deserialize, Serialize};

use crate::errors::AuthError;

pub const USER_ID_HEADER: &str = "x-tmw-user-id";
pub const USER_TYPE_HEADER: &str = "x-tmw-user-type";
pub const BANK_USER_ID_HEADER: &str = "x-tmw-bank-user-id";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UserType {
    /// A business that submits financing applications.
    Business,
    /// A bank (or a delegated bank employee) that bids on applications.
    Bank,
    /// Marketplace operations staff.
    Admin,
}

impl Display for UserType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            UserType::Business => write!(f, "business"),
            UserType::Bank => write!(f, "bank"),
            UserType::Admin => write!(f, "admin"),
        }
    }
}

impl FromStr for UserType {
    type Err = AuthError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "business" => Ok(Self::Business),
            "bank" => Ok(Self::Bank),
            "admin" => Ok(Self::Admin),
            other => Err(AuthError::UnknownUserType(other.to_string())),
        }
    }
}

/// The identity the upstream gateway resolved for this request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedIdentity {
    pub user_id: String,
    pub user_type: UserType,
    /// Set when the caller is an employee acting on behalf of a bank account.
    pub bank_user_id: Option<String>,
}

impl ResolvedIdentity {
    /// The bank account this call acts for: the delegating bank when the caller is an employee, the caller itself
    /// otherwise.
    pub fn acting_bank_id(&self) -> &str {
        self.bank_user_id.as_deref().unwrap_or(&self.user_id)
    }

    /// The submitting employee, when it is not the bank account itself.
    pub fn delegated_submitter(&self) -> Option<&str> {
        self.bank_user_id.as_ref().map(|_| self.user_id.as_str())
    }

    pub fn from_request_headers(req: &HttpRequest) -> Result<Self, AuthError> {
        let user_id = header_value(req, USER_ID_HEADER)?.ok_or(AuthError::IdentityMissing)?;
        let user_type = header_value(req, USER_TYPE_HEADER)?.ok_or(AuthError::IdentityMissing)?.parse::<UserType>()?;
        let bank_user_id = header_value(req, BANK_USER_ID_HEADER)?;
        Ok(Self { user_id, user_type, bank_user_id })
    }
}

fn header_value(req: &HttpRequest, name: &str) -> Result<Option<String>, AuthError> {
    match req.headers().get(name) {
        None => Ok(None),
        Some(value) => {
            let s = value.to_str().map_err(|_| AuthError::MalformedIdentity(name.to_string()))?;
            if s.is_empty() {
                Ok(None)
            } else {
                Ok(Some(s.to_string()))
            }
        },
    }
}

impl FromRequest for ResolvedIdentity {
    type Error = actix_web::Error;
    type Future = Pin<Box<dyn Future<Output = Result<Self, Self::Error>>>>;

    fn from_request(req: &HttpRequest, _payload: &mut Payload) -> Self::Future {
        // The identity middleware has already parsed the headers into a request extension; fall back to parsing
        // directly so that the extractor also works on routes outside the middleware's scope (tests, mostly).
        let identity = req
            .extensions()
            .get::<ResolvedIdentity>()
            .cloned()
            .map(Ok)
            .unwrap_or_else(|| ResolvedIdentity::from_request_headers(req));
        Box::pin(async move { identity.map_err(|e| crate::errors::ServerError::from(e).into()) })
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn acting_bank_falls_back_to_the_caller() {
        let direct =
            ResolvedIdentity { user_id: "bank-1".into(), user_type: UserType::Bank, bank_user_id: None };
        assert_eq!(direct.acting_bank_id(), "bank-1");
        assert!(direct.delegated_submitter().is_none());

        let delegated = ResolvedIdentity {
            user_id: "employee-7".into(),
            user_type: UserType::Bank,
            bank_user_id: Some("bank-1".into()),
        };
        assert_eq!(delegated.acting_bank_id(), "bank-1");
        assert_eq!(delegated.delegated_submitter(), Some("employee-7"));
    }

    #[test]
    fn user_types_parse() {
        assert_eq!("business".parse::<UserType>().unwrap(), UserType::Business);
        assert_eq!("bank".parse::<UserType>().unwrap(), UserType::Bank);
        assert_eq!("admin".parse::<UserType>().unwrap(), UserType::Admin);
        assert!("wizard".parse::<UserType>().is_err());
    }
}
