use actix_web::{
    error::ResponseError,
    http::{header::ContentType, StatusCode},
    HttpResponse,
};
use tamweel_engine::{ApplicationApiError, MarketplaceError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("Could not initialize server. {0}")]
    InitializeError(String),
    #[error("An error occurred on the backend of the server. {0}")]
    BackendError(String),
    #[error("Could not read request body: {0}")]
    InvalidRequestBody(String),
    #[error("An I/O error happened in the server. {0}")]
    IOError(#[from] std::io::Error),
    #[error("Invalid server configuration. {0}")]
    ConfigurationError(String),
    #[error("UnspecifiedError. {0}")]
    Unspecified(String),
    #[error("Authentication Error. {0}")]
    AuthenticationError(#[from] AuthError),
    #[error("The data was not found. {0}")]
    NoRecordFound(String),
    #[error("Insufficient Permissions. {0}")]
    InsufficientPermissions(String),
    #[error("{0}")]
    MarketplaceError(#[from] MarketplaceError),
}

impl ResponseError for ServerError {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::InvalidRequestBody(_) => StatusCode::BAD_REQUEST,
            Self::AuthenticationError(e) => match e {
                AuthError::IdentityMissing => StatusCode::UNAUTHORIZED,
                AuthError::MalformedIdentity(_) => StatusCode::BAD_REQUEST,
                AuthError::UnknownUserType(_) => StatusCode::BAD_REQUEST,
                AuthError::ForbiddenUserType(_) => StatusCode::FORBIDDEN,
            },
            Self::MarketplaceError(e) => match e {
                MarketplaceError::ValidationError(_) => StatusCode::BAD_REQUEST,
                MarketplaceError::DuplicateActiveApplication(_) => StatusCode::BAD_REQUEST,
                MarketplaceError::WindowClosed(_) => StatusCode::CONFLICT,
                MarketplaceError::SelectionWindowClosed(_) => StatusCode::CONFLICT,
                MarketplaceError::AlreadySelected(_) => StatusCode::CONFLICT,
                MarketplaceError::ApplicationNotFound(_) => StatusCode::NOT_FOUND,
                MarketplaceError::OfferNotFound(_) => StatusCode::NOT_FOUND,
                MarketplaceError::NoOfferForBank { .. } => StatusCode::NOT_FOUND,
                MarketplaceError::NotOwner(_) => StatusCode::FORBIDDEN,
                MarketplaceError::DatabaseError(_) => StatusCode::INTERNAL_SERVER_ERROR,
                MarketplaceError::QueryError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
            Self::InitializeError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::BackendError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::IOError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::ConfigurationError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Unspecified(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::NoRecordFound(_) => StatusCode::NOT_FOUND,
            Self::InsufficientPermissions(_) => StatusCode::FORBIDDEN,
        }
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code())
            .insert_header(ContentType::json())
            .body(serde_json::json!({ "error": self.to_string() }).to_string())
    }
}

#[derive(Debug, Clone, Error)]
pub enum AuthError {
    #[error("No resolved identity was supplied with the request.")]
    IdentityMissing,
    #[error("The {0} header could not be read.")]
    MalformedIdentity(String),
    #[error("Unknown user type: {0}")]
    UnknownUserType(String),
    #[error("This endpoint is not available to {0} users.")]
    ForbiddenUserType(String),
}

impl From<ApplicationApiError> for ServerError {
    fn from(e: ApplicationApiError) -> Self {
        match e {
            ApplicationApiError::ApplicationNotFound(id) => Self::NoRecordFound(format!("Application {id}")),
            ApplicationApiError::DatabaseError(e) => Self::BackendError(format!("Database error: {e}")),
        }
    }
}
