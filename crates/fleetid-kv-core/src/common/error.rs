//! Error types for the key/value coordination service.
//!
//! `From<Error>` for `tonic::Status` carries each case to clients with a
//! status code they can branch on:
//!
//! - `LeaseNotFound` -> `NOT_FOUND`
//! - `InvalidRequest` -> `INVALID_ARGUMENT`
//! - `ServiceShutdown` -> `UNAVAILABLE`

use tonic::{Code, Status};

pub type Result<T> = core::result::Result<T, Error>;

/// Unified error type for the key/value service.
#[derive(Clone, thiserror::Error, Debug, PartialEq, Eq)]
pub enum Error {
    /// The lease was never granted or has expired.
    #[error("Lease {lease_id} not found or expired")]
    LeaseNotFound { lease_id: i64 },

    /// The client request was malformed.
    #[error("Invalid request: {reason}")]
    InvalidRequest { reason: String },

    /// The service is in the process of shutting down.
    #[error("Service is shutting down")]
    ServiceShutdown,
}

impl From<Error> for Status {
    fn from(err: Error) -> Self {
        match err {
            Error::LeaseNotFound { lease_id } => {
                Status::not_found(format!("Lease {lease_id} not found or expired"))
            }
            Error::InvalidRequest { reason } => Status::invalid_argument(reason),
            Error::ServiceShutdown => Status::unavailable("Service is shutting down"),
        }
    }
}

impl Error {
    /// Recovers a service error from a status returned to a client.
    ///
    /// `lease_id` is the lease the failed call referred to, if any; it is
    /// needed because the status message is not parsed. Returns `None` for
    /// codes the service does not emit itself (transport failures, deadline
    /// exceeded and the like).
    pub fn from_status(status: &Status, lease_id: Option<i64>) -> Option<Self> {
        match (status.code(), lease_id) {
            (Code::NotFound, Some(lease_id)) => Some(Self::LeaseNotFound { lease_id }),
            (Code::InvalidArgument, _) => Some(Self::InvalidRequest {
                reason: status.message().to_owned(),
            }),
            (Code::Unavailable, _) if status.message() == "Service is shutting down" => {
                Some(Self::ServiceShutdown)
            }
            _ => None,
        }
    }
}
