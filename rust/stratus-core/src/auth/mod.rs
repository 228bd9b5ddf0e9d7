//! Application request signing.
//!
//! A registered external application proves its identity by signing each
//! request with a secret it shares with the server. The same construction is
//! used in both directions: [RequestSigner] for requests the application
//! sends, [InboundVerifier] for requests the server sends to the application.

mod canonical;
mod signer;
mod verifier;

pub use canonical::*;
pub use signer::*;
pub use verifier::*;

use std::time::{SystemTime, UNIX_EPOCH};

pub const AE_VERSION: &str = "ae-version";
pub const EX_APP_ID: &str = "ex-app-id";
pub const EX_APP_VERSION: &str = "ex-app-version";
pub const NC_USER_ID: &str = "nc-user-id";
pub const AE_DATA_HASH: &str = "ae-data-hash";
pub const AE_SIGN_TIME: &str = "ae-sign-time";
pub const AE_SIGNATURE: &str = "ae-signature";
pub const AE_REQUEST_ID: &str = "ae-request-id";

/// Seconds since the UNIX epoch
pub fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_secs())
        .unwrap_or_default()
}
