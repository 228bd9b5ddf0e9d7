use std::{path::Path, time::Duration};

use bytes::Bytes;
use http::{
    header::{CONTENT_TYPE, HeaderName},
    HeaderMap, HeaderValue, Method, StatusCode,
};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::Value;

use crate::{
    auth::{quote_path, RequestSigner},
    check_status,
    config::{ConfigKey, Configuration, ConfigurationError},
    RequestContext, StratusError,
};

pub const CAPABILITIES_PATH: &str = "/ocs/v1.php/cloud/capabilities";
pub const OCS_API_REQUEST: &str = "ocs-apirequest";

pub(crate) const MAX_IDLE_PER_HOST: usize = 20;
pub(crate) const POOL_IDLE_TIMEOUT: Duration = Duration::from_secs(60);

/// Which surface of the server a request is aimed at
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Channel {
    /// A path relative to the base URL, sent as-is
    Raw,
    /// An OCS endpoint; the response is a JSON envelope
    Ocs,
    /// A path below the DAV root; uses the DAV timeout
    Dav,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub enum RequestBody {
    #[default]
    Empty,
    Raw(Bytes),
    /// Already-serialized JSON; sent with `Content-Type: application/json`
    Json(Bytes),
}

impl RequestBody {
    pub fn json<T: Serialize>(value: &T) -> Result<Self, serde_json::Error> {
        Ok(RequestBody::Json(serde_json::to_vec(value)?.into()))
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            RequestBody::Empty => None,
            RequestBody::Raw(bytes) | RequestBody::Json(bytes) => Some(bytes),
        }
    }
}

impl From<Bytes> for RequestBody {
    fn from(bytes: Bytes) -> Self {
        RequestBody::Raw(bytes)
    }
}

impl From<&str> for RequestBody {
    fn from(text: &str) -> Self {
        RequestBody::Raw(Bytes::copy_from_slice(text.as_bytes()))
    }
}

impl From<String> for RequestBody {
    fn from(text: String) -> Self {
        RequestBody::Raw(text.into())
    }
}

/// One call against the server, described independently of the transport
#[derive(Clone, Debug)]
pub struct ApiRequest {
    pub method: Method,
    pub path: String,
    pub query: Vec<(String, String)>,
    pub headers: HeaderMap,
    pub body: RequestBody,
}

impl ApiRequest {
    pub fn new(method: Method, path: &str) -> Self {
        ApiRequest {
            method,
            path: path.to_string(),
            query: Vec::new(),
            headers: HeaderMap::new(),
            body: RequestBody::Empty,
        }
    }

    pub fn get(path: &str) -> Self {
        Self::new(Method::GET, path)
    }

    pub fn post(path: &str) -> Self {
        Self::new(Method::POST, path)
    }

    pub fn put(path: &str) -> Self {
        Self::new(Method::PUT, path)
    }

    pub fn delete(path: &str) -> Self {
        Self::new(Method::DELETE, path)
    }

    pub fn with_query(mut self, key: &str, value: &str) -> Self {
        self.query.push((key.to_string(), value.to_string()));
        self
    }

    pub fn with_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    pub fn with_body<B: Into<RequestBody>>(mut self, body: B) -> Self {
        self.body = body.into();
        self
    }
}

/// Status, headers and the fully-read body of a response
#[derive(Clone, Debug)]
pub struct ApiResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl ApiResponse {
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    pub fn json<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_slice(&self.body)
    }
}

/// A request with its URL, headers (signature included), body and timeout
/// settled, ready to hand to a transport
pub(crate) struct PreparedRequest {
    pub method: Method,
    pub url: String,
    pub headers: HeaderMap,
    pub body: Option<Bytes>,
    pub timeout: Option<Duration>,
    pub context: RequestContext,
}

pub(crate) fn prepare(
    configuration: &Configuration,
    signer: &RequestSigner,
    default_headers: &HeaderMap,
    channel: Channel,
    request: ApiRequest,
) -> Result<PreparedRequest, StratusError> {
    let ApiRequest {
        method,
        path,
        mut query,
        headers: request_headers,
        body,
    } = request;

    let path = match channel {
        Channel::Dav => format!("{}{}", configuration.dav_url_suffix(), path),
        Channel::Raw | Channel::Ocs => path,
    };
    let context = RequestContext::new(method.as_str(), &path);

    if channel == Channel::Ocs {
        query.push(("format".into(), "json".into()));
    }

    let mut path_and_query = quote_path(&path);
    if !query.is_empty() {
        let encoded =
            serde_urlencoded::to_string(&query).map_err(|error| StratusError::InvalidRequest {
                reason: error.to_string(),
                context: context.clone(),
            })?;
        path_and_query.push('?');
        path_and_query.push_str(&encoded);
    }

    let mut headers = default_headers.clone();
    headers.extend(request_headers);
    if let RequestBody::Json(_) = body {
        headers
            .entry(CONTENT_TYPE)
            .or_insert(HeaderValue::from_static("application/json"));
    }

    // A GET never carries a body, so its digest is always that of empty input
    let body = if method == Method::GET {
        None
    } else {
        body.as_bytes().map(Bytes::copy_from_slice)
    };

    let signed = signer.sign(method.as_str(), &path_and_query, body.as_deref());
    headers.extend(signed.headers);

    let timeouts = configuration.timeouts();
    let timeout = match channel {
        Channel::Dav => timeouts.dav,
        Channel::Raw | Channel::Ocs => timeouts.http,
    };

    Ok(PreparedRequest {
        method,
        url: format!("{}{}", configuration.base_url(), path_and_query),
        headers,
        body,
        timeout,
        context,
    })
}

/// Headers every session sends unless told otherwise
pub(crate) fn default_headers() -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(
        HeaderName::from_static(OCS_API_REQUEST),
        HeaderValue::from_static("true"),
    );
    headers
}

#[derive(Deserialize)]
struct OcsEnvelope {
    ocs: OcsPayload,
}

#[derive(Deserialize)]
struct OcsPayload {
    meta: OcsMeta,
    #[serde(default)]
    data: Value,
}

#[derive(Deserialize)]
struct OcsMeta {
    status: String,
    statuscode: u16,
    #[serde(default)]
    message: Option<String>,
}

/// Map the HTTP status, then unwrap the OCS envelope and return its `data`
pub(crate) fn parse_ocs(
    status: StatusCode,
    body: &[u8],
    context: &RequestContext,
) -> Result<Value, StratusError> {
    check_status(status.as_u16(), context)?;

    let envelope: OcsEnvelope =
        serde_json::from_slice(body).map_err(|error| StratusError::UnexpectedResponse {
            reason: format!("not an OCS envelope: {error}"),
            context: context.clone(),
        })?;
    let OcsPayload { meta, data } = envelope.ocs;

    if meta.status == "ok" {
        return Ok(data);
    }

    let reason = meta.message.unwrap_or_default();
    let context = context.clone();
    Err(match meta.statuscode {
        404 | 998 => StratusError::NotFound { reason, context },
        401 | 403 | 997 => StratusError::Authentication {
            status: meta.statuscode,
            reason,
            context,
        },
        status => StratusError::Ocs {
            status,
            reason,
            context,
        },
    })
}

pub(crate) fn load_root_certificate(path: &Path) -> Result<reqwest::Certificate, StratusError> {
    let invalid = |reason: String| {
        StratusError::Configuration(ConfigurationError::Invalid {
            key: ConfigKey::NcVerifyTls,
            reason,
        })
    };
    let pem = std::fs::read(path)
        .map_err(|error| invalid(format!("unable to read {}: {error}", path.display())))?;
    reqwest::Certificate::from_pem(&pem).map_err(|error| invalid(error.to_string()))
}

pub(crate) fn client_build_error(error: reqwest::Error) -> StratusError {
    StratusError::Configuration(ConfigurationError::Invalid {
        key: ConfigKey::NcVerifyTls,
        reason: format!("unable to build HTTP client: {error}"),
    })
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::{
        auth::{AE_SIGNATURE, NC_USER_ID},
        config::{AppIdentity, Credentials, Timeouts},
    };

    fn app_configuration() -> Configuration {
        Configuration::new(
            "https://example.org/cloud",
            Credentials::AppToken(AppIdentity::new("skeleton", "1.0.0", "12345")),
        )
        .unwrap()
    }

    fn signer(configuration: &Configuration) -> RequestSigner {
        RequestSigner::try_new(configuration.credentials()).unwrap()
    }

    #[test]
    fn it_appends_the_json_format_to_ocs_calls() {
        let configuration = app_configuration();
        let prepared = prepare(
            &configuration,
            &signer(&configuration),
            &default_headers(),
            Channel::Ocs,
            ApiRequest::get("/ocs/v2.php/search/providers").with_query("term", "a b"),
        )
        .unwrap();

        assert_eq!(
            prepared.url,
            "https://example.org/cloud/ocs/v2.php/search/providers?term=a+b&format=json"
        );
        assert_eq!(prepared.headers.get(OCS_API_REQUEST).unwrap(), "true");
        assert!(prepared.headers.contains_key(AE_SIGNATURE));
        assert_eq!(prepared.timeout, Some(Duration::from_secs(50)));
        assert_eq!(prepared.context.path, "/ocs/v2.php/search/providers");
    }

    #[test]
    fn it_prefixes_and_encodes_dav_paths() {
        let configuration = app_configuration();
        let prepared = prepare(
            &configuration,
            &signer(&configuration),
            &default_headers(),
            Channel::Dav,
            ApiRequest::new(Method::from_bytes(b"PROPFIND").unwrap(), "/files/admin/a b.txt"),
        )
        .unwrap();

        assert_eq!(
            prepared.url,
            "https://example.org/cloud/remote.php/dav/files/admin/a%20b.txt"
        );
        assert_eq!(prepared.timeout, Some(Duration::from_secs(150)));
        assert_eq!(prepared.context.method, "PROPFIND");
    }

    #[test]
    fn it_uses_the_configured_timeouts() {
        let configuration = app_configuration().with_timeouts(Timeouts::disabled());
        let prepared = prepare(
            &configuration,
            &signer(&configuration),
            &default_headers(),
            Channel::Raw,
            ApiRequest::get("/status.php"),
        )
        .unwrap();

        assert_eq!(prepared.timeout, None);
        assert_eq!(prepared.url, "https://example.org/cloud/status.php");
    }

    #[test]
    fn it_labels_json_bodies_and_drops_get_bodies() {
        let configuration = app_configuration();
        let body = RequestBody::json(&json!({"shareType": 0})).unwrap();

        let prepared = prepare(
            &configuration,
            &signer(&configuration),
            &default_headers(),
            Channel::Ocs,
            ApiRequest::post("/ocs/v1.php/apps/files_sharing/api/v1/shares").with_body(body.clone()),
        )
        .unwrap();
        assert_eq!(
            prepared.headers.get(CONTENT_TYPE).unwrap(),
            "application/json"
        );
        assert_eq!(prepared.body.as_deref(), Some(&br#"{"shareType":0}"#[..]));

        let prepared = prepare(
            &configuration,
            &signer(&configuration),
            &default_headers(),
            Channel::Ocs,
            ApiRequest::get("/ocs/v1.php/cloud/user").with_body(body),
        )
        .unwrap();
        assert!(prepared.body.is_none());
    }

    #[test]
    fn it_lets_the_signer_override_caller_headers() {
        let configuration = app_configuration();
        let prepared = prepare(
            &configuration,
            &signer(&configuration).with_user(Some("admin")).unwrap(),
            &default_headers(),
            Channel::Ocs,
            ApiRequest::get("/ocs/v1.php/cloud/user").with_header(
                HeaderName::from_static(NC_USER_ID),
                HeaderValue::from_static("mallory"),
            ),
        )
        .unwrap();

        let users: Vec<_> = prepared.headers.get_all(NC_USER_ID).iter().collect();
        assert_eq!(users, vec!["admin"]);
    }

    fn context() -> RequestContext {
        RequestContext::new("GET", CAPABILITIES_PATH)
    }

    #[test]
    fn it_returns_ocs_data_on_success() {
        let body = json!({"ocs": {"meta": {"status": "ok", "statuscode": 100, "message": "OK"}, "data": {"id": "admin"}}});
        let data = parse_ocs(StatusCode::OK, body.to_string().as_bytes(), &context()).unwrap();
        assert_eq!(data, json!({"id": "admin"}));
    }

    #[test]
    fn it_maps_ocs_failures() {
        let envelope = |statuscode: u16| {
            json!({"ocs": {"meta": {"status": "failure", "statuscode": statuscode, "message": "nope"}, "data": []}})
                .to_string()
        };

        for (statuscode, expected) in [(404, "not found"), (998, "not found"), (997, "auth"), (403, "auth"), (102, "ocs")] {
            let error = parse_ocs(StatusCode::OK, envelope(statuscode).as_bytes(), &context()).unwrap_err();
            let actual = match error {
                StratusError::NotFound { .. } => "not found",
                StratusError::Authentication { .. } => "auth",
                StratusError::Ocs { status, .. } => {
                    assert_eq!(status, statuscode);
                    "ocs"
                }
                other => panic!("unexpected {other:?}"),
            };
            assert_eq!(actual, expected, "statuscode {statuscode}");
        }
    }

    #[test]
    fn it_checks_the_http_status_before_the_envelope() {
        assert!(matches!(
            parse_ocs(StatusCode::UNAUTHORIZED, b"", &context()),
            Err(StratusError::Authentication { status: 401, .. })
        ));
        assert!(matches!(
            parse_ocs(StatusCode::OK, b"<html>", &context()),
            Err(StratusError::UnexpectedResponse { .. })
        ));
    }
}
