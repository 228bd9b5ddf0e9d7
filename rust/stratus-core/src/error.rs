use std::fmt::Display;

use http::StatusCode;
use thiserror::Error;

use crate::{auth::VerificationFailure, config::ConfigurationError};

/// The method and path of a request that produced an error, so that callers
/// can log or act on failures without re-deriving what was being attempted.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RequestContext {
    pub method: String,
    pub path: String,
}

impl RequestContext {
    pub fn new(method: &str, path: &str) -> Self {
        RequestContext {
            method: method.to_ascii_uppercase(),
            path: path.to_string(),
        }
    }
}

impl Display for RequestContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "request: method={}, path={}", self.method, self.path)
    }
}

/// Errors surfaced by stratus sessions. None of them are retried on the
/// caller's behalf.
#[derive(Error, Debug)]
pub enum StratusError {
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),

    #[error("[{status}] {reason} <{context}>")]
    Authentication {
        status: u16,
        reason: String,
        context: RequestContext,
    },

    #[error("[404] {reason} <{context}>")]
    NotFound {
        reason: String,
        context: RequestContext,
    },

    #[error("[304] Not modified <{context}>")]
    NotModified { context: RequestContext },

    #[error("[412] Missing capability: {}", .0.join(", "))]
    MissingCapability(Vec<String>),

    #[error("Transport failure <{context}>: {source}")]
    Transport {
        context: RequestContext,
        #[source]
        source: reqwest::Error,
    },

    #[error("[{status}] {reason} <{context}>")]
    Http {
        status: u16,
        reason: String,
        context: RequestContext,
    },

    #[error("[{status}] {reason} <{context}>")]
    Ocs {
        status: u16,
        reason: String,
        context: RequestContext,
    },

    #[error(transparent)]
    Verification(#[from] VerificationFailure),

    #[error("Unexpected response <{context}>: {reason}")]
    UnexpectedResponse {
        reason: String,
        context: RequestContext,
    },

    #[error("Invalid request <{context}>: {reason}")]
    InvalidRequest {
        reason: String,
        context: RequestContext,
    },
}

impl StratusError {
    /// The HTTP (or OCS) status code associated with this error, if any
    pub fn status_code(&self) -> Option<u16> {
        match self {
            StratusError::Authentication { status, .. }
            | StratusError::Http { status, .. }
            | StratusError::Ocs { status, .. } => Some(*status),
            StratusError::NotFound { .. } => Some(404),
            StratusError::NotModified { .. } => Some(304),
            StratusError::MissingCapability(_) => Some(412),
            StratusError::Transport { source, .. } => source.status().map(|status| status.as_u16()),
            _ => None,
        }
    }

    /// The request this error was raised for, if it was raised for one
    pub fn context(&self) -> Option<&RequestContext> {
        match self {
            StratusError::Authentication { context, .. }
            | StratusError::NotFound { context, .. }
            | StratusError::NotModified { context }
            | StratusError::Transport { context, .. }
            | StratusError::Http { context, .. }
            | StratusError::Ocs { context, .. }
            | StratusError::UnexpectedResponse { context, .. }
            | StratusError::InvalidRequest { context, .. } => Some(context),
            _ => None,
        }
    }
}

/// Map a status code onto the error taxonomy. Codes 996-999 are the server's
/// own out-of-band error statuses and are treated as failures even though
/// they sit outside the HTTP error ranges.
pub fn check_status(status: u16, context: &RequestContext) -> Result<(), StratusError> {
    let reason = match status {
        996 => "Server error",
        997 => "Unauthorised",
        998 => "Not found",
        999 => "Unknown error",
        304 => {
            return Err(StratusError::NotModified {
                context: context.clone(),
            })
        }
        _ if status < 400 => return Ok(()),
        _ => StatusCode::from_u16(status)
            .ok()
            .and_then(|status| status.canonical_reason())
            .unwrap_or("Unknown error"),
    };

    Err(match status {
        401 | 403 | 997 => StratusError::Authentication {
            status,
            reason: reason.into(),
            context: context.clone(),
        },
        404 | 998 => StratusError::NotFound {
            reason: reason.into(),
            context: context.clone(),
        },
        _ => StratusError::Http {
            status,
            reason: reason.into(),
            context: context.clone(),
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn context() -> RequestContext {
        RequestContext::new("get", "/ocs/v1.php/cloud/capabilities")
    }

    #[test]
    fn it_lets_success_statuses_through() {
        for status in [200, 201, 204, 207] {
            assert!(check_status(status, &context()).is_ok());
        }
    }

    #[test]
    fn it_maps_credentials_rejections_to_authentication_errors() {
        for status in [401, 403, 997] {
            let error = check_status(status, &context()).unwrap_err();
            assert!(matches!(error, StratusError::Authentication { .. }));
            assert_eq!(error.status_code(), Some(status));
        }
    }

    #[test]
    fn it_maps_not_found_and_not_modified_to_typed_errors() {
        assert!(matches!(
            check_status(404, &context()),
            Err(StratusError::NotFound { .. })
        ));
        assert!(matches!(
            check_status(998, &context()),
            Err(StratusError::NotFound { .. })
        ));
        assert!(matches!(
            check_status(304, &context()),
            Err(StratusError::NotModified { .. })
        ));
    }

    #[test]
    fn it_annotates_errors_with_the_request() {
        let error = check_status(500, &context()).unwrap_err();
        assert_eq!(
            error.to_string(),
            "[500] Internal Server Error <request: method=GET, path=/ocs/v1.php/cloud/capabilities>"
        );
        assert_eq!(error.context(), Some(&context()));
    }

    #[test]
    fn it_names_server_specific_statuses() {
        let error = check_status(996, &context()).unwrap_err();
        assert!(error.to_string().starts_with("[996] Server error"));
        let error = check_status(999, &context()).unwrap_err();
        assert!(error.to_string().starts_with("[999] Unknown error"));
    }
}
