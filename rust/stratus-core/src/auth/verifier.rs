use std::time::Duration;

use http::HeaderMap;
use thiserror::Error;

use crate::config::{AppIdentity, Configuration};

use super::{
    body_digest, canonical_string, signature_matches, unix_now, SignedFields, AE_DATA_HASH,
    AE_REQUEST_ID, AE_SIGNATURE, AE_SIGN_TIME, AE_VERSION, EX_APP_ID, EX_APP_VERSION, NC_USER_ID,
};

/// How far a request's sign time may drift from local time, in either
/// direction
pub const DEFAULT_FRESHNESS_WINDOW: Duration = Duration::from_secs(5 * 60);

/// Why an inbound request was refused. Every variant means the request must
/// be answered with an authentication failure and not acted upon.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum VerificationFailure {
    #[error("Missing required headers: {}", .0.join(", "))]
    MissingHeaders(Vec<String>),

    #[error("Header {0} is not valid UTF-8")]
    MalformedHeader(&'static str),

    #[error("Invalid AE-SIGN-TIME: {0:?}")]
    MalformedTimestamp(String),

    #[error("Invalid AE-SIGN-TIME: {timestamp} is outside the accepted window around {now}")]
    Expired { timestamp: i64, now: i64 },

    #[error("Invalid AE-SIGNATURE")]
    SignatureMismatch,

    #[error("Invalid AE-DATA-HASH")]
    DataHashMismatch,

    #[error("Invalid EX-APP-ID: {actual} != {expected}")]
    AppIdMismatch { expected: String, actual: String },

    #[error("Inbound verification requires application credentials")]
    NotAnApplication,
}

/// Who a verified inbound request came from
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InboundIdentity {
    pub app_id: String,
    pub app_version: String,
    /// The impersonated user; `None` for a system-level call
    pub user: Option<String>,
    /// Passed through unverified so that follow-up calls can be correlated
    pub request_id: Option<String>,
}

impl InboundIdentity {
    pub fn is_system(&self) -> bool {
        self.user.is_none()
    }
}

/// Checks requests the server sends to this application, using the same
/// canonicalization as the [super::RequestSigner].
#[derive(Clone)]
pub struct InboundVerifier {
    identity: AppIdentity,
    freshness_window: Duration,
}

impl InboundVerifier {
    pub fn new(identity: AppIdentity) -> Self {
        InboundVerifier {
            identity,
            freshness_window: DEFAULT_FRESHNESS_WINDOW,
        }
    }

    pub fn from_configuration(configuration: &Configuration) -> Result<Self, VerificationFailure> {
        configuration
            .app_identity()
            .cloned()
            .map(Self::new)
            .ok_or(VerificationFailure::NotAnApplication)
    }

    pub fn with_freshness_window(mut self, window: Duration) -> Self {
        self.freshness_window = window;
        self
    }

    pub fn app_id(&self) -> &str {
        &self.identity.app_id
    }

    /// Verify a request given its method, its raw path and query as received,
    /// its headers and its body
    pub fn verify(
        &self,
        method: &str,
        path_and_query: &str,
        headers: &HeaderMap,
        body: &[u8],
    ) -> Result<InboundIdentity, VerificationFailure> {
        self.verify_at(method, path_and_query, headers, body, unix_now())
    }

    /// [InboundVerifier::verify] as though the current time were `now`
    pub fn verify_at(
        &self,
        method: &str,
        path_and_query: &str,
        headers: &HeaderMap,
        body: &[u8],
        now: u64,
    ) -> Result<InboundIdentity, VerificationFailure> {
        let header = |name: &'static str| -> Result<Option<String>, VerificationFailure> {
            headers
                .get(name)
                .map(|value| {
                    std::str::from_utf8(value.as_bytes())
                        .map(|value| value.to_string())
                        .map_err(|_| VerificationFailure::MalformedHeader(name))
                })
                .transpose()
                .map(|value| value.filter(|value| !value.is_empty()))
        };

        let ae_version = header(AE_VERSION)?;
        let app_id = header(EX_APP_ID)?;
        let app_version = header(EX_APP_VERSION)?;
        let data_hash = header(AE_DATA_HASH)?;
        let sign_time = header(AE_SIGN_TIME)?;
        let signature = header(AE_SIGNATURE)?;
        let user = header(NC_USER_ID)?;

        let (
            Some(ae_version),
            Some(app_id),
            Some(app_version),
            Some(data_hash),
            Some(sign_time),
            Some(signature),
        ) = (
            ae_version.clone(),
            app_id.clone(),
            app_version.clone(),
            data_hash.clone(),
            sign_time.clone(),
            signature.clone(),
        )
        else {
            let missing = [
                (AE_VERSION, ae_version.is_none()),
                (EX_APP_ID, app_id.is_none()),
                (EX_APP_VERSION, app_version.is_none()),
                (AE_DATA_HASH, data_hash.is_none()),
                (AE_SIGN_TIME, sign_time.is_none()),
                (AE_SIGNATURE, signature.is_none()),
            ]
            .into_iter()
            .filter(|(_, missing)| *missing)
            .map(|(name, _)| name.to_ascii_uppercase())
            .collect();
            return Err(VerificationFailure::MissingHeaders(missing));
        };

        let timestamp = sign_time
            .parse::<i64>()
            .map_err(|_| VerificationFailure::MalformedTimestamp(sign_time.clone()))?;
        let now = i64::try_from(now).unwrap_or(i64::MAX);
        let window = i64::try_from(self.freshness_window.as_secs()).unwrap_or(i64::MAX);
        if timestamp < now.saturating_sub(window) || timestamp > now.saturating_add(window) {
            return Err(VerificationFailure::Expired { timestamp, now });
        }

        let fields = SignedFields {
            ae_version,
            app_id: app_id.clone(),
            app_version: app_version.clone(),
            user: user.clone(),
            data_hash: data_hash.clone(),
            sign_time,
        };
        let canonical = canonical_string(method, path_and_query, &fields);
        if !signature_matches(self.identity.secret(), &canonical, &signature) {
            return Err(VerificationFailure::SignatureMismatch);
        }

        if body_digest(Some(body)) != data_hash {
            return Err(VerificationFailure::DataHashMismatch);
        }

        if app_id != self.identity.app_id {
            return Err(VerificationFailure::AppIdMismatch {
                expected: self.identity.app_id.clone(),
                actual: app_id,
            });
        }

        Ok(InboundIdentity {
            app_id,
            app_version,
            user,
            request_id: header(AE_REQUEST_ID)?,
        })
    }
}

impl std::fmt::Debug for InboundVerifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InboundVerifier")
            .field("identity", &self.identity)
            .field("freshness_window", &self.freshness_window)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use http::{HeaderName, HeaderValue};

    use super::*;
    use crate::{auth::RequestSigner, config::Credentials};

    const NOW: u64 = 1_700_000_000;

    fn identity() -> AppIdentity {
        AppIdentity::new("skeleton", "1.0.0", "12345")
    }

    fn signer(user: Option<&str>) -> RequestSigner {
        RequestSigner::try_new(&Credentials::AppToken(identity()))
            .unwrap()
            .with_user(user)
            .unwrap()
    }

    fn verifier() -> InboundVerifier {
        InboundVerifier::new(identity())
    }

    #[test]
    fn it_accepts_what_the_signer_produces() {
        for (method, path, body) in [
            ("GET", "/heartbeat", &b""[..]),
            ("PUT", "/enabled?enabled=1", &b""[..]),
            ("POST", "/ocs/v1.php/apps/x?format=json", &br#"{"a":1}"#[..]),
        ] {
            let signed = signer(Some("admin")).sign_at(method, path, Some(body), NOW);
            let identity = verifier()
                .verify_at(method, path, &signed.headers, body, NOW)
                .unwrap();

            assert_eq!(identity.app_id, "skeleton");
            assert_eq!(identity.user.as_deref(), Some("admin"));
            assert!(!identity.is_system());
        }
    }

    #[test]
    fn it_reports_system_calls_without_a_user() {
        let signed = signer(None).sign_at("GET", "/heartbeat", None, NOW);
        let identity = verifier()
            .verify_at("GET", "/heartbeat", &signed.headers, b"", NOW)
            .unwrap();
        assert!(identity.is_system());
    }

    #[test]
    fn it_accepts_non_ascii_users() {
        let signed = signer(Some("zoë")).sign_at("GET", "/heartbeat", None, NOW);
        let identity = verifier()
            .verify_at("GET", "/heartbeat", &signed.headers, b"", NOW)
            .unwrap();
        assert_eq!(identity.user.as_deref(), Some("zoë"));
    }

    #[test]
    fn it_rejects_a_flipped_signature_byte() {
        let mut signed = signer(None).sign_at("GET", "/heartbeat", None, NOW);
        let signature = signed.signature.unwrap();
        let flipped = if signature.starts_with('0') { "1" } else { "0" };
        signed.headers.insert(
            HeaderName::from_static(AE_SIGNATURE),
            HeaderValue::from_str(&format!("{flipped}{}", &signature[1..])).unwrap(),
        );

        assert_eq!(
            verifier().verify_at("GET", "/heartbeat", &signed.headers, b"", NOW),
            Err(VerificationFailure::SignatureMismatch)
        );
    }

    #[test]
    fn it_rejects_a_signature_with_one_letter_upper_cased() {
        let mut signed = signer(None).sign_at("GET", "/heartbeat", None, NOW);
        let signature = signed.signature.unwrap();
        let position = signature
            .find(|character: char| character.is_ascii_lowercase())
            .unwrap();
        let mut altered = signature.clone();
        altered.replace_range(
            position..position + 1,
            &signature[position..position + 1].to_ascii_uppercase(),
        );
        signed.headers.insert(
            HeaderName::from_static(AE_SIGNATURE),
            HeaderValue::from_str(&altered).unwrap(),
        );

        assert_eq!(
            verifier().verify_at("GET", "/heartbeat", &signed.headers, b"", NOW),
            Err(VerificationFailure::SignatureMismatch)
        );
    }

    #[test]
    fn it_rejects_a_different_method_or_path() {
        let signed = signer(None).sign_at("GET", "/heartbeat", None, NOW);

        assert_eq!(
            verifier().verify_at("PUT", "/heartbeat", &signed.headers, b"", NOW),
            Err(VerificationFailure::SignatureMismatch)
        );
        assert_eq!(
            verifier().verify_at("GET", "/heartbeaT", &signed.headers, b"", NOW),
            Err(VerificationFailure::SignatureMismatch)
        );
        assert_eq!(
            verifier().verify_at("GET", "/heartbeat?x=1", &signed.headers, b"", NOW),
            Err(VerificationFailure::SignatureMismatch)
        );
    }

    #[test]
    fn it_rejects_a_modified_body() {
        let signed = signer(None).sign_at("POST", "/enabled", Some(b"abc"), NOW);
        assert_eq!(
            verifier().verify_at("POST", "/enabled", &signed.headers, b"abd", NOW),
            Err(VerificationFailure::DataHashMismatch)
        );
    }

    #[test]
    fn it_rejects_replays_outside_the_window() {
        let signed = signer(None).sign_at("GET", "/heartbeat", None, NOW);

        assert!(verifier()
            .verify_at("GET", "/heartbeat", &signed.headers, b"", NOW + 300)
            .is_ok());
        assert!(matches!(
            verifier().verify_at("GET", "/heartbeat", &signed.headers, b"", NOW + 301),
            Err(VerificationFailure::Expired { .. })
        ));
        assert!(matches!(
            verifier().verify_at("GET", "/heartbeat", &signed.headers, b"", NOW - 301),
            Err(VerificationFailure::Expired { .. })
        ));
        assert!(matches!(
            verifier()
                .with_freshness_window(Duration::from_secs(10))
                .verify_at("GET", "/heartbeat", &signed.headers, b"", NOW + 11),
            Err(VerificationFailure::Expired { .. })
        ));
    }

    #[test]
    fn it_accepts_any_timestamp_within_an_unbounded_window() {
        let signed = signer(None).sign_at("GET", "/heartbeat", None, NOW);

        for window in [u64::MAX, i64::MAX as u64, i64::MAX as u64 - 1] {
            assert!(verifier()
                .with_freshness_window(Duration::from_secs(window))
                .verify_at("GET", "/heartbeat", &signed.headers, b"", NOW + 86_400)
                .is_ok());
        }
    }

    #[test]
    fn it_rejects_another_applications_requests() {
        let other = RequestSigner::try_new(&Credentials::AppToken(AppIdentity::new(
            "intruder", "1.0.0", "12345",
        )))
        .unwrap();
        let signed = other.sign_at("GET", "/heartbeat", None, NOW);

        assert_eq!(
            verifier().verify_at("GET", "/heartbeat", &signed.headers, b"", NOW),
            Err(VerificationFailure::AppIdMismatch {
                expected: "skeleton".into(),
                actual: "intruder".into()
            })
        );
    }

    #[test]
    fn it_rejects_requests_signed_with_another_secret() {
        let other = RequestSigner::try_new(&Credentials::AppToken(AppIdentity::new(
            "skeleton", "1.0.0", "54321",
        )))
        .unwrap();
        let signed = other.sign_at("GET", "/heartbeat", None, NOW);

        assert_eq!(
            verifier().verify_at("GET", "/heartbeat", &signed.headers, b"", NOW),
            Err(VerificationFailure::SignatureMismatch)
        );
    }

    #[test]
    fn it_names_missing_headers() {
        let mut signed = signer(None).sign_at("GET", "/heartbeat", None, NOW);
        signed.headers.remove(AE_SIGNATURE);
        signed
            .headers
            .insert(HeaderName::from_static(AE_VERSION), HeaderValue::from_static(""));

        assert_eq!(
            verifier().verify_at("GET", "/heartbeat", &signed.headers, b"", NOW),
            Err(VerificationFailure::MissingHeaders(vec![
                "AE-VERSION".into(),
                "AE-SIGNATURE".into()
            ]))
        );
        assert!(matches!(
            verifier().verify_at("GET", "/heartbeat", &HeaderMap::new(), b"", NOW),
            Err(VerificationFailure::MissingHeaders(_))
        ));
    }

    #[test]
    fn it_rejects_malformed_timestamps() {
        let mut signed = signer(None).sign_at("GET", "/heartbeat", None, NOW);
        signed.headers.insert(
            HeaderName::from_static(AE_SIGN_TIME),
            HeaderValue::from_static("yesterday"),
        );

        assert_eq!(
            verifier().verify_at("GET", "/heartbeat", &signed.headers, b"", NOW),
            Err(VerificationFailure::MalformedTimestamp("yesterday".into()))
        );
    }

    #[test]
    fn it_passes_the_request_id_through() {
        let mut signed = signer(None).sign_at("GET", "/heartbeat", None, NOW);
        signed.headers.insert(
            HeaderName::from_static(AE_REQUEST_ID),
            HeaderValue::from_static("req-1"),
        );

        let identity = verifier()
            .verify_at("GET", "/heartbeat", &signed.headers, b"", NOW)
            .unwrap();
        assert_eq!(identity.request_id.as_deref(), Some("req-1"));
    }

    #[test]
    fn it_requires_application_credentials() {
        let configuration =
            Configuration::new("https://example.org", Credentials::basic("admin", "admin"))
                .unwrap();
        assert!(matches!(
            InboundVerifier::from_configuration(&configuration),
            Err(VerificationFailure::NotAnApplication)
        ));
    }
}
