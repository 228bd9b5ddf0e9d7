//! A blocking [BlockingSession] for callers without an async runtime. It
//! prepares, signs and interprets requests exactly like [super::Session];
//! only the transport differs.

use std::sync::Arc;

use http::{HeaderMap, Method};
use once_cell::sync::OnceCell;
use parking_lot::Mutex;
use serde_json::Value;

use crate::{
    auth::RequestSigner,
    capabilities::{CapabilityCache, CapabilityDocument, ServerVersion},
    check_status,
    config::{AuthMode, Configuration, TlsVerification},
    RequestContext, StratusError,
};

use super::{
    client_build_error, default_headers, load_root_certificate, parse_ocs, prepare, ApiRequest,
    ApiResponse, Channel, PreparedRequest, CAPABILITIES_PATH, MAX_IDLE_PER_HOST,
    POOL_IDLE_TIMEOUT,
};

#[derive(Clone)]
pub struct BlockingSession {
    configuration: Arc<Configuration>,
    signer: RequestSigner,
    headers: HeaderMap,
    client: Arc<OnceCell<reqwest::blocking::Client>>,
    capabilities: CapabilityCache,
    last_response_headers: Arc<Mutex<HeaderMap>>,
}

impl BlockingSession {
    pub fn new(configuration: Configuration) -> Result<Self, StratusError> {
        let signer = RequestSigner::try_new(configuration.credentials())?;

        if configuration.verify_tls().is_disabled() {
            warn!(
                "TLS certificate verification is disabled for {}; this is only safe for local development",
                configuration.base_url()
            );
        }

        Ok(BlockingSession {
            configuration: Arc::new(configuration),
            signer,
            headers: default_headers(),
            client: Arc::new(OnceCell::new()),
            capabilities: CapabilityCache::default(),
            last_response_headers: Arc::new(Mutex::new(HeaderMap::new())),
        })
    }

    pub fn with_headers(mut self, headers: HeaderMap) -> Self {
        self.headers.extend(headers);
        self
    }

    pub fn for_user(&self, user: Option<&str>) -> Result<Self, StratusError> {
        Ok(BlockingSession {
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

    pub fn user(&self) -> Option<&str> {
        self.signer.user()
    }

    pub fn last_response_headers(&self) -> HeaderMap {
        self.last_response_headers.lock().clone()
    }

    fn client(&self) -> Result<&reqwest::blocking::Client, StratusError> {
        self.client
            .get_or_try_init(|| -> Result<reqwest::blocking::Client, StratusError> {
                let builder = reqwest::blocking::Client::builder()
                    .pool_max_idle_per_host(MAX_IDLE_PER_HOST)
                    .pool_idle_timeout(POOL_IDLE_TIMEOUT)
                    // Timeouts are applied per request
                    .timeout(None);

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

    fn execute(
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
            builder = builder.body(body.to_vec());
        }
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }

        let transport_error = |source: reqwest::Error| StratusError::Transport {
            context: context.clone(),
            source,
        };

        let response = builder.send().map_err(transport_error)?;
        let status = response.status();
        let headers = response.headers().clone();
        *self.last_response_headers.lock() = headers.clone();
        let body = response.bytes().map_err(transport_error)?;

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

    pub fn request(&self, request: ApiRequest) -> Result<ApiResponse, StratusError> {
        let (response, context) = self.execute(Channel::Raw, request)?;
        check_status(response.status.as_u16(), &context)?;
        Ok(response)
    }

    pub fn ocs(&self, request: ApiRequest) -> Result<Value, StratusError> {
        let (response, context) = self.execute(Channel::Ocs, request)?;
        parse_ocs(response.status, &response.body, &context)
    }

    pub fn dav(&self, request: ApiRequest) -> Result<ApiResponse, StratusError> {
        let (response, _) = self.execute(Channel::Dav, request)?;
        Ok(response)
    }

    pub fn update_server_info(&self) -> Result<Arc<CapabilityDocument>, StratusError> {
        let data = self.ocs(ApiRequest::new(Method::GET, CAPABILITIES_PATH))?;
        Ok(self.capabilities.replace(data))
    }

    pub fn capability_document(&self) -> Result<Arc<CapabilityDocument>, StratusError> {
        match self.capabilities.get() {
            Some(document) => Ok(document),
            None => self.update_server_info(),
        }
    }

    pub fn capabilities(&self) -> Result<Value, StratusError> {
        Ok(self.capability_document()?.capabilities().clone())
    }

    pub fn check_capability(&self, capability: &str) -> Result<bool, StratusError> {
        Ok(self.capability_document()?.has(capability))
    }

    pub fn check_capabilities<I, S>(&self, capabilities: I) -> Result<Vec<String>, StratusError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Ok(self.capability_document()?.missing(capabilities))
    }

    pub fn require_capabilities<I, S>(&self, capabilities: I) -> Result<(), StratusError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.capability_document()?.require(capabilities)
    }

    pub fn server_version(&self) -> Result<ServerVersion, StratusError> {
        self.capability_document()?.require_server_version()
    }
}

impl std::fmt::Debug for BlockingSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BlockingSession")
            .field("base_url", &self.configuration.base_url())
            .field("auth_mode", &self.configuration.auth_mode())
            .field("user", &self.user())
            .field("verify_tls", &self.configuration.verify_tls().to_string())
            .finish()
    }
}
