//! Router errors.
use displaydoc::Display;
use http::StatusCode;
use thiserror::Error;
use tower::BoxError;

pub use crate::cache::CacheError;
pub use crate::configuration::ConfigurationError;

/// Errors produced while resolving a persisted query.
///
/// These are returned to the client: the `Display` output is the response
/// body and [`ApqError::status_code`] the response status.
#[derive(Error, Display, Debug, Clone, PartialEq, Eq)]
#[ignore_extra_doc_attributes]
#[non_exhaustive]
pub enum ApqError {
    /// malformed extensions: {reason}
    MalformedExtensions {
        /// Why the extensions could not be decoded.
        reason: String,
    },

    /// request was malformed: {reason}
    MalformedRequest {
        /// Why the request could not be decoded.
        reason: String,
    },

    /// provided sha does not match query
    ///
    /// The exact wording is relied upon by clients.
    HashMismatch,

    /// persisted query not found
    PersistedQueryNotFound,

    /// persisted query not found
    ///
    /// Raised by the bare hash protocol, where a miss is a server side
    /// resolution failure.
    PersistedQueryNotFoundBareHash,

    /// no query provided
    NoQueryProvided,
}

impl ApqError {
    /// The HTTP status code the error is reported with.
    pub fn status_code(&self) -> StatusCode {
        match self {
            ApqError::PersistedQueryNotFoundBareHash => StatusCode::INTERNAL_SERVER_ERROR,
            ApqError::MalformedExtensions { .. }
            | ApqError::MalformedRequest { .. }
            | ApqError::HashMismatch
            | ApqError::PersistedQueryNotFound
            | ApqError::NoQueryProvided => StatusCode::BAD_REQUEST,
        }
    }

    /// A stable machine readable error code.
    pub fn extension_code(&self) -> &'static str {
        match self {
            ApqError::MalformedExtensions { .. } => "MALFORMED_EXTENSIONS",
            ApqError::MalformedRequest { .. } => "MALFORMED_REQUEST",
            ApqError::HashMismatch => "PERSISTED_QUERY_HASH_MISMATCH",
            ApqError::PersistedQueryNotFound | ApqError::PersistedQueryNotFoundBareHash => {
                "PERSISTED_QUERY_NOT_FOUND"
            }
            ApqError::NoQueryProvided => "NO_QUERY_PROVIDED",
        }
    }
}

/// Errors that abort the handling of a request.
///
/// Unlike [`ApqError`] these are not part of the persisted query protocol:
/// they signal that a collaborator (the cache backend or the upstream
/// GraphQL server) failed.
#[derive(Error, Display, Debug)]
#[non_exhaustive]
pub enum DispatchError {
    /// persisted query storage failed: {0}
    Storage(#[from] CacheError),

    /// query execution failed: {0}
    Execution(#[source] BoxError),
}

impl DispatchError {
    /// The HTTP status code the error is reported with.
    pub fn status_code(&self) -> StatusCode {
        match self {
            DispatchError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
            DispatchError::Execution(_) => StatusCode::BAD_GATEWAY,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_mismatch_message_is_stable() {
        assert_eq!(
            ApqError::HashMismatch.to_string(),
            "provided sha does not match query"
        );
        assert_eq!(ApqError::HashMismatch.status_code(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn not_found_status_depends_on_protocol() {
        assert_eq!(
            ApqError::PersistedQueryNotFound.status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ApqError::PersistedQueryNotFoundBareHash.status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            ApqError::PersistedQueryNotFound.to_string(),
            ApqError::PersistedQueryNotFoundBareHash.to_string()
        );
    }

    #[test]
    fn malformed_extensions_carries_reason() {
        let err = ApqError::MalformedExtensions {
            reason: "expected value at line 1 column 1".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "malformed extensions: expected value at line 1 column 1"
        );
        assert_eq!(err.extension_code(), "MALFORMED_EXTENSIONS");
    }

    #[test]
    fn dispatch_errors_map_to_server_statuses() {
        let storage = DispatchError::from(CacheError::Unavailable("down".to_string()));
        assert_eq!(storage.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(
            storage.to_string(),
            "persisted query storage failed: cache backend unavailable: down"
        );

        let execution = DispatchError::Execution("connection refused".into());
        assert_eq!(execution.status_code(), StatusCode::BAD_GATEWAY);
    }
}
