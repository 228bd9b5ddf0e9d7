use std::sync::Arc;

use http::{HeaderMap, HeaderName, HeaderValue, Method};
use once_cell::sync::OnceCell;
use parking_lot::Mutex;
use serde_json::Value;

use crate::{
    auth::{RequestSigner, AE_REQUEST_ID},
    capabilities::{CapabilityCache, CapabilityDocument, ServerVersion},
    check_status,
    config::{AuthMode, Configuration, ConfigurationError, TlsVerification},
    RequestContext, StratusError,
};

use super::{
    client_build_error, default_headers, load_root_certificate, parse_ocs, prepare, ApiRequest,
    ApiResponse, Channel, PreparedRequest, CAPABILITIES_PATH, MAX_IDLE_PER_HOST,
    POOL_IDLE_TIMEOUT,
};

/// An authenticated connection to one server, in either credential mode.
///
/// A [Session] owns its [Configuration], a lazily-built connection pool, a
/// cached capability document and the headers of the most recent response.
/// Clones share all of these; use [Session::for_user] to act as another user
/// with a fresh capability cache.
///
/// Nothing is retried: every failure is surfaced to the caller annotated with
/// the method and path it was raised for.
#[derive(Clone)]
pub struct Session {
    configuration: Arc<Configuration>,
    signer: RequestSigner,
    headers: HeaderMap,
    client: Arc<OnceCell<reqwest::Client>>,
    capabilities: CapabilityCache,
    last_response_headers: Arc<Mutex<HeaderMap>>,
}

impl Session {
    pub fn new(configuration: Configuration) -> Result<Self, StratusError> {
        let signer = RequestSigner::try_new(configuration.credentials())?;

        if configuration.verify_tls().is_disabled() {
            warn!(
                "TLS certificate verification is disabled for {}; this is only safe for local development",
                configuration.base_url()
            );
        }

        debug!(
            "Session for {} ({} mode)",
            configuration.base_url(),
            configuration.auth_mode()
        );

        Ok(Session {
            configuration: Arc::new(configuration),
            signer,
            headers: default_headers(),
            client: Arc::new(OnceCell::new()),
            capabilities: CapabilityCache::default(),
            last_response_headers: Arc::new(Mutex::new(HeaderMap::new())),
        })
    }

    /// Send these headers with every request (the signature headers always
    /// take precedence)
    pub fn with_headers(mut self, headers: HeaderMap) -> Self {
        self.headers.extend(headers);
        self
    }

    /// Tag every request with the id of the inbound call that caused it
    pub fn with_request_id(self, request_id: &str) -> Result<Self, StratusError> {
        let value = HeaderValue::from_str(request_id)
            .map_err(|_| ConfigurationError::InvalidHeaderValue(AE_REQUEST_ID))?;
        let mut headers = HeaderMap::new();
        headers.insert(HeaderName::from_static(AE_REQUEST_ID), value);
        Ok(self.with_headers(headers))
    }

    /// A session that shares this one's configuration and connection pool
    /// but acts as `user` and starts with an empty capability cache.
    /// Impersonation only applies to application credentials.
    pub fn for_user(&self, user: Option<&str>) -> Result<Self, StratusError> {
        Ok(Session {
            configuration: self.configuration.clone(),
            signer: self.signer.clone().with_user(user)?,
            headers: self.headers.clone(),
            client: self.client.clone(),
            capabilities: CapabilityCache::default(),
            last_response_headers: Arc::new(Mutex::new(HeaderMap::new())),
        })
    }

    /// Headers sent with every request, alongside the authentication ones
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn configuration(&self) -> &Configuration {
        &self.configuration
    }

    pub fn auth_mode(&self) -> AuthMode {
        self.configuration.auth_mode()
    }

    /// The user requests are made as; the basic user in basic mode
    pub fn user(&self) -> Option<&str> {
        self.signer.user()
    }

    /// Headers of the most recent response received through this session
    pub fn last_response_headers(&self) -> HeaderMap {
        self.last_response_headers.lock().clone()
    }

    fn client(&self) -> Result<&reqwest::Client, StratusError> {
        self.client.get_or_try_init(|| -> Result<reqwest::Client, StratusError> {
            let builder = reqwest::Client::builder()
                .pool_max_idle_per_host(MAX_IDLE_PER_HOST)
                .pool_idle_timeout(POOL_IDLE_TIMEOUT);

            let builder = match self.configuration.verify_tls() {
                TlsVerification::Enabled => builder,
                TlsVerification::Disabled => builder.danger_accept_invalid_certs(true),
                TlsVerification::CaBundle(path) => {
                    builder.add_root_certificate(load_root_certificate(path)?)
                }
            };

            builder.build().map_err(client_build_error)
        })
    }

    async fn execute(
        &self,
        channel: Channel,
        request: ApiRequest,
    ) -> Result<(ApiResponse, RequestContext), StratusError> {
        let PreparedRequest {
            method,
            url,
            headers,
            body,
            timeout,
            context,
        } = prepare(
            &self.configuration,
            &self.signer,
            &self.headers,
            channel,
            request,
        )?;

        trace!("{} {}", method, url);

        let mut builder = self.client()?.request(method, &url).headers(headers);
        if let Some(body) = body {
            builder = builder.body(body);
        }
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }

        let transport_error = |source: reqwest::Error| StratusError::Transport {
            context: context.clone(),
            source,
        };

        let response = builder.send().await.map_err(transport_error)?;
        let status = response.status();
        let headers = response.headers().clone();
        *self.last_response_headers.lock() = headers.clone();
        let body = response.bytes().await.map_err(transport_error)?;

        debug!("[{}] <{}>", status.as_u16(), context);

        Ok((
            ApiResponse {
                status,
                headers,
                body,
            },
            context,
        ))
    }

    /// Perform a request against a path relative to the base URL, mapping
    /// error statuses onto [StratusError]
    pub async fn request(&self, request: ApiRequest) -> Result<ApiResponse, StratusError> {
        let (response, context) = self.execute(Channel::Raw, request).await?;
        check_status(response.status.as_u16(), &context)?;
        Ok(response)
    }

    /// Call an OCS endpoint and return the `data` of its envelope
    pub async fn ocs(&self, request: ApiRequest) -> Result<Value, StratusError> {
        let (response, context) = self.execute(Channel::Ocs, request).await?;
        parse_ocs(response.status, &response.body, &context)
    }

    /// Call a path below the DAV root. The response is returned whatever its
    /// status, since multi-status and conditional answers are part of DAV.
    pub async fn dav(&self, request: ApiRequest) -> Result<ApiResponse, StratusError> {
        let (response, _) = self.execute(Channel::Dav, request).await?;
        Ok(response)
    }

    /// Fetch the capability document again and replace the cached one
    pub async fn update_server_info(&self) -> Result<Arc<CapabilityDocument>, StratusError> {
        let data = self
            .ocs(ApiRequest::new(Method::GET, CAPABILITIES_PATH))
            .await?;
        Ok(self.capabilities.replace(data))
    }

    /// The cached capability document, fetched on first use
    pub async fn capability_document(&self) -> Result<Arc<CapabilityDocument>, StratusError> {
        match self.capabilities.get() {
            Some(document) => Ok(document),
            None => self.update_server_info().await,
        }
    }

    /// The `capabilities` section of the capability document
    pub async fn capabilities(&self) -> Result<Value, StratusError> {
        Ok(self.capability_document().await?.capabilities().clone())
    }

    pub async fn check_capability(&self, capability: &str) -> Result<bool, StratusError> {
        Ok(self.capability_document().await?.has(capability))
    }

    /// The capabilities from `capabilities` that are absent or disabled
    pub async fn check_capabilities<I, S>(&self, capabilities: I) -> Result<Vec<String>, StratusError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Ok(self.capability_document().await?.missing(capabilities))
    }

    pub async fn require_capabilities<I, S>(&self, capabilities: I) -> Result<(), StratusError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.capability_document().await?.require(capabilities)
    }

    pub async fn server_version(&self) -> Result<ServerVersion, StratusError> {
        self.capability_document().await?.require_server_version()
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("base_url", &self.configuration.base_url())
            .field("auth_mode", &self.configuration.auth_mode())
            .field("user", &self.user())
            .field("verify_tls", &self.configuration.verify_tls().to_string())
            .finish()
    }
}
