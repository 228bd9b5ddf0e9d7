use std::sync::Arc;

use async_trait::async_trait;
use axum::{
    extract::{FromRequest, Request},
    http::{StatusCode, Uri},
};
use bytes::Bytes;
use stratus_core::{api::Session, auth::InboundIdentity};

use crate::{AppErrorResponse, AppState};

/// Inbound bodies larger than this are refused before verification
pub const MAX_BODY_SIZE: usize = 16 * 1024 * 1024;

/// A call from the server whose signature has been verified.
///
/// Extracting a [VerifiedCall] consumes the body, so it must be the last
/// argument of a handler. When verification fails the request is answered
/// with `401` and the handler never runs.
pub struct VerifiedCall {
    pub identity: InboundIdentity,
    /// Acts as the user the server called on behalf of, and carries the
    /// server's request id on every call it makes
    pub session: Session,
    pub uri: Uri,
    pub body: Bytes,
}

#[async_trait]
impl FromRequest<Arc<AppState>> for VerifiedCall {
    type Rejection = AppErrorResponse;

    async fn from_request(request: Request, state: &Arc<AppState>) -> Result<Self, Self::Rejection> {
        let (parts, body) = request.into_parts();

        let body = axum::body::to_bytes(body, MAX_BODY_SIZE)
            .await
            .map_err(|error| {
                warn!("Unable to read inbound body: {}", error);
                StatusCode::BAD_REQUEST
            })?;

        let path_and_query = parts
            .uri
            .path_and_query()
            .map(|path_and_query| path_and_query.as_str())
            .unwrap_or("/");

        let identity = state
            .verifier()
            .verify(parts.method.as_str(), path_and_query, &parts.headers, &body)
            .map_err(|failure| {
                warn!(
                    "Refused {} {}: {}",
                    parts.method, path_and_query, failure
                );
                failure
            })?;

        trace!(
            "Verified {} {} from {} (user: {:?})",
            parts.method,
            path_and_query,
            identity.app_id,
            identity.user
        );

        let mut session = state.session().for_user(identity.user.as_deref())?;
        if let Some(request_id) = &identity.request_id {
            session = session.with_request_id(request_id)?;
        }

        Ok(VerifiedCall {
            identity,
            session,
            uri: parts.uri,
            body,
        })
    }
}
