use argon2::Error as Argon2Error;
use jsonwebtoken::errors::{Error as JwtError, ErrorKind as JwtErrorKind};
use log::{error, warn};
use mongodb::error::Error as DbError;
use rocket::{
    http::{Status, StatusClass},
    response::{self, status::Custom, Responder},
    serde::json::Json,
    Request,
};
use serde::Serialize;
use thiserror::Error;

use crate::logging::RequestId;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    /// A required field was missing or blank.
    #[error("Invalid input: {0}")]
    InvalidInput(String),
    #[error("Not found: {0}")]
    NotFound(String),
    /// The voting code has already been spent.
    #[error("Already used: {0}")]
    AlreadyUsed(String),
    #[error("Invalid candidate: {0}")]
    InvalidCandidate(String),
    /// The backing store failed; safe for the caller to retry later.
    #[error("Store unavailable: {0}")]
    StoreUnavailable(#[from] DbError),
    #[error("Unauthorized: {0}")]
    Unauthorized(String),
    #[error(transparent)]
    Jwt(#[from] JwtError),
    #[error(transparent)]
    Argon2(#[from] Argon2Error),
    #[error("{1}")]
    Status(Status, String),
}

impl Error {
    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound(what.into())
    }

    pub fn already_used() -> Self {
        Self::AlreadyUsed("This voting code has already been used".to_string())
    }

    /// The HTTP status this error maps to.
    pub fn status(&self) -> Status {
        match self {
            Self::InvalidInput(_) => Status::BadRequest,
            Self::NotFound(_) | Self::InvalidCandidate(_) => Status::NotFound,
            Self::AlreadyUsed(_) => Status::Conflict,
            Self::StoreUnavailable(_) => Status::InternalServerError,
            Self::Unauthorized(_) => Status::Unauthorized,
            Self::Jwt(err) => match err.kind() {
                JwtErrorKind::ExpiredSignature | JwtErrorKind::ImmatureSignature => {
                    Status::Unauthorized
                }
                _ => Status::BadRequest,
            },
            Self::Argon2(_) => Status::BadRequest,
            Self::Status(status, _) => *status,
        }
    }

    /// The message shown to the end user. Infrastructure details stay in the log.
    fn public_message(&self) -> String {
        match self {
            Self::StoreUnavailable(_) => "Internal server error".to_string(),
            Self::InvalidInput(msg)
            | Self::NotFound(msg)
            | Self::AlreadyUsed(msg)
            | Self::InvalidCandidate(msg)
            | Self::Unauthorized(msg)
            | Self::Status(_, msg) => msg.clone(),
            other => other.to_string(),
        }
    }
}

/// JSON body of an error response.
#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
}

impl<'r, 'o: 'r> Responder<'r, 'o> for Error {
    fn respond_to(self, req: &'r Request<'_>) -> response::Result<'o> {
        let id = req.local_cache(RequestId::next);
        let status = self.status();
        match status.class() {
            StatusClass::ServerError => error!("req{id} failed: {self}"),
            _ => warn!("req{id} rejected: {self}"),
        }
        let body = ErrorBody {
            error: self.public_message(),
        };
        Custom(status, Json(body)).respond_to(req)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn taxonomy_statuses() {
        assert_eq!(
            Error::InvalidInput(String::new()).status(),
            Status::BadRequest
        );
        assert_eq!(Error::not_found("code").status(), Status::NotFound);
        assert_eq!(Error::AlreadyUsed(String::new()).status(), Status::Conflict);
        assert_eq!(
            Error::InvalidCandidate(String::new()).status(),
            Status::NotFound
        );
        assert_eq!(
            Error::Status(Status::UnprocessableEntity, String::new()).status(),
            Status::UnprocessableEntity
        );
    }

    #[test]
    fn rejection_messages() {
        let err = Error::AlreadyUsed("This voting code has already been used".to_string());
        assert_eq!(err.public_message(), "This voting code has already been used");
        assert_eq!(
            err.to_string(),
            "Already used: This voting code has already been used"
        );
    }
}
