use base64::{engine::general_purpose::STANDARD, Engine as _};
use http::{header::AUTHORIZATION, HeaderMap, HeaderName, HeaderValue};

use crate::config::{AppIdentity, AuthMode, ConfigurationError, Credentials};

use super::{
    body_digest, canonical_string, compute_signature, unix_now, SignedFields, AE_DATA_HASH,
    AE_SIGNATURE, AE_SIGN_TIME, AE_VERSION, EX_APP_ID, EX_APP_VERSION, NC_USER_ID,
};

/// The headers to attach to one outbound request, plus what was signed.
/// Built per call and never reused.
#[derive(Clone, Debug)]
pub struct SignedRequest {
    pub method: String,
    pub path: String,
    /// Absent for basic credentials
    pub timestamp: Option<u64>,
    /// Absent for basic credentials
    pub signature: Option<String>,
    pub headers: HeaderMap,
}

#[derive(Clone)]
enum SignerMode {
    Basic {
        authorization: HeaderValue,
    },
    AppToken {
        identity: AppIdentity,
        static_headers: HeaderMap,
    },
}

/// Produces the authentication headers for outbound requests. All header
/// values are validated up front, so signing itself never fails.
#[derive(Clone)]
pub struct RequestSigner {
    mode: SignerMode,
    user: Option<String>,
    user_header: Option<HeaderValue>,
}

impl RequestSigner {
    pub fn try_new(credentials: &Credentials) -> Result<Self, ConfigurationError> {
        let mode = match credentials {
            Credentials::Basic { user, password } => {
                let token = STANDARD.encode(format!("{user}:{password}"));
                let mut authorization = HeaderValue::from_str(&format!("Basic {token}"))
                    .map_err(|_| ConfigurationError::InvalidHeaderValue("Authorization"))?;
                authorization.set_sensitive(true);
                SignerMode::Basic { authorization }
            }
            Credentials::AppToken(identity) => {
                let mut static_headers = HeaderMap::new();
                for (name, value) in [
                    (AE_VERSION, &identity.ae_version),
                    (EX_APP_ID, &identity.app_id),
                    (EX_APP_VERSION, &identity.app_version),
                ] {
                    static_headers.insert(
                        HeaderName::from_static(name),
                        HeaderValue::from_str(value)
                            .map_err(|_| ConfigurationError::InvalidHeaderValue(name))?,
                    );
                }
                SignerMode::AppToken {
                    identity: identity.clone(),
                    static_headers,
                }
            }
        };

        let user = match credentials {
            Credentials::Basic { user, .. } => Some(user.clone()),
            Credentials::AppToken(_) => None,
        };

        Ok(RequestSigner {
            mode,
            user_header: None,
            user,
        })
    }

    /// A signer that impersonates `user`; only meaningful for application
    /// credentials, where the user is carried in a signed header. Basic
    /// credentials always act as their own user and ignore this.
    pub fn with_user(mut self, user: Option<&str>) -> Result<Self, ConfigurationError> {
        if let SignerMode::AppToken { .. } = self.mode {
            let user = user.filter(|user| !user.is_empty());
            self.user_header = user
                .map(|user| {
                    HeaderValue::from_str(user)
                        .map_err(|_| ConfigurationError::InvalidHeaderValue(NC_USER_ID))
                })
                .transpose()?;
            self.user = user.map(String::from);
        }
        Ok(self)
    }

    pub fn auth_mode(&self) -> AuthMode {
        match self.mode {
            SignerMode::Basic { .. } => AuthMode::Basic,
            SignerMode::AppToken { .. } => AuthMode::AppToken,
        }
    }

    /// The user requests are made as, if any
    pub fn user(&self) -> Option<&str> {
        self.user.as_deref()
    }

    pub fn sign(&self, method: &str, path_and_query: &str, body: Option<&[u8]>) -> SignedRequest {
        self.sign_at(method, path_and_query, body, unix_now())
    }

    /// Sign as though the current time were `timestamp` (UNIX seconds)
    pub fn sign_at(
        &self,
        method: &str,
        path_and_query: &str,
        body: Option<&[u8]>,
        timestamp: u64,
    ) -> SignedRequest {
        let method = method.to_ascii_uppercase();
        let mut headers = HeaderMap::new();

        let (timestamp, signature) = match &self.mode {
            SignerMode::Basic { authorization } => {
                headers.insert(AUTHORIZATION, authorization.clone());
                (None, None)
            }
            SignerMode::AppToken {
                identity,
                static_headers,
            } => {
                let fields = SignedFields {
                    ae_version: identity.ae_version.clone(),
                    app_id: identity.app_id.clone(),
                    app_version: identity.app_version.clone(),
                    user: self.user.clone(),
                    data_hash: body_digest(body),
                    sign_time: timestamp.to_string(),
                };
                let canonical = canonical_string(&method, path_and_query, &fields);
                let signature = compute_signature(identity.secret(), &canonical);

                headers.extend(static_headers.clone());
                if let Some(user) = &self.user_header {
                    headers.insert(HeaderName::from_static(NC_USER_ID), user.clone());
                }
                // Hex digits and decimal digits are always valid header values
                for (name, value) in [
                    (AE_DATA_HASH, &fields.data_hash),
                    (AE_SIGN_TIME, &fields.sign_time),
                    (AE_SIGNATURE, &signature),
                ] {
                    if let Ok(value) = HeaderValue::from_str(value) {
                        headers.insert(HeaderName::from_static(name), value);
                    }
                }

                trace!("Signed {} {} at {}", method, path_and_query, timestamp);
                (Some(timestamp), Some(signature))
            }
        };

        SignedRequest {
            method,
            path: path_and_query.to_string(),
            timestamp,
            signature,
            headers,
        }
    }
}

impl std::fmt::Debug for RequestSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestSigner")
            .field("auth_mode", &self.auth_mode())
            .field("user", &self.user)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{canonical_string, signature_matches};

    fn app_signer() -> RequestSigner {
        RequestSigner::try_new(&Credentials::AppToken(AppIdentity::new(
            "skeleton", "1.0.0", "12345",
        )))
        .unwrap()
    }

    #[test]
    fn it_sends_basic_authorization_in_basic_mode() {
        let signer = RequestSigner::try_new(&Credentials::basic("admin", "secret")).unwrap();
        let signed = signer.sign("get", "/ocs/v1.php/cloud/capabilities?format=json", None);

        assert_eq!(signed.method, "GET");
        assert_eq!(
            signed.headers.get(AUTHORIZATION).unwrap(),
            "Basic YWRtaW46c2VjcmV0"
        );
        assert!(signed.signature.is_none());
        assert!(signed.headers.get(AE_SIGNATURE).is_none());
        assert_eq!(signer.user(), Some("admin"));
    }

    #[test]
    fn it_ignores_impersonation_in_basic_mode() {
        let signer = RequestSigner::try_new(&Credentials::basic("admin", "secret"))
            .unwrap()
            .with_user(Some("someone-else"))
            .unwrap();
        assert_eq!(signer.user(), Some("admin"));
    }

    #[test]
    fn it_attaches_the_full_header_set_in_app_mode() {
        let signed = app_signer()
            .with_user(Some("admin"))
            .unwrap()
            .sign_at("post", "/ocs/v1.php/apps/test", Some(b"{}"), 1_700_000_000);

        for name in [
            AE_VERSION,
            EX_APP_ID,
            EX_APP_VERSION,
            NC_USER_ID,
            AE_DATA_HASH,
            AE_SIGN_TIME,
            AE_SIGNATURE,
        ] {
            assert!(signed.headers.contains_key(name), "missing {name}");
        }
        assert!(!signed.headers.contains_key(AUTHORIZATION));
        assert_eq!(signed.headers.get(AE_SIGN_TIME).unwrap(), "1700000000");
        assert_eq!(signed.headers.get(NC_USER_ID).unwrap(), "admin");
        assert_eq!(signed.timestamp, Some(1_700_000_000));
    }

    #[test]
    fn it_signs_the_canonical_string() {
        let signed = app_signer().sign_at("GET", "/heartbeat", None, 1_700_000_000);
        let fields = SignedFields {
            ae_version: "1.0.0".into(),
            app_id: "skeleton".into(),
            app_version: "1.0.0".into(),
            user: None,
            data_hash: body_digest(None),
            sign_time: "1700000000".into(),
        };
        let canonical = canonical_string("GET", "/heartbeat", &fields);

        assert!(signature_matches(
            b"12345",
            &canonical,
            signed.signature.as_deref().unwrap()
        ));
        assert!(!signed.headers.contains_key(NC_USER_ID));
    }

    #[test]
    fn it_rejects_users_that_cannot_be_sent_as_headers() {
        assert_eq!(
            app_signer().with_user(Some("bad\nuser")).err(),
            Some(ConfigurationError::InvalidHeaderValue(NC_USER_ID))
        );
    }
}
