use std::{fmt::Display, net::TcpListener, sync::Arc, time::Duration};

use anyhow::Result;
use async_trait::async_trait;
use axum::{
    routing::{get, put},
    Router,
};
use stratus_core::{
    api::Session,
    auth::InboundVerifier,
    config::Configuration,
    StratusError,
};
use tower_http::trace::TraceLayer;

use crate::{
    handlers::{enabled_route, heartbeat_route, scopes_route},
    ApiScopes,
};

/// The endpoints the server calls on an external application
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AppRoute {
    Heartbeat,
    Enabled,
    Scopes,
}

impl Display for AppRoute {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let fragment = match self {
            AppRoute::Heartbeat => "heartbeat",
            AppRoute::Enabled => "enabled",
            AppRoute::Scopes => "scopes",
        };
        write!(f, "/{fragment}")
    }
}

/// What an application does when the server calls it
#[async_trait]
pub trait ExAppHandlers: Send + Sync + 'static {
    /// The server enabled or disabled the application. Return an empty
    /// string on success, or a description of what went wrong.
    async fn enabled(&self, enabled: bool, session: Session) -> String;

    async fn heartbeat(&self) -> String {
        "ok".into()
    }
}

/// Everything the lifecycle endpoints share
pub struct AppState {
    configuration: Configuration,
    verifier: InboundVerifier,
    session: Session,
    handlers: Arc<dyn ExAppHandlers>,
    scopes: ApiScopes,
}

impl AppState {
    /// Requires application credentials; there is nothing to verify inbound
    /// calls against otherwise
    pub fn try_new<H>(configuration: Configuration, handlers: H) -> Result<Self, StratusError>
    where
        H: ExAppHandlers,
    {
        let verifier = InboundVerifier::from_configuration(&configuration)?;
        let session = Session::new(configuration.clone())?;

        Ok(AppState {
            configuration,
            verifier,
            session,
            handlers: Arc::new(handlers),
            scopes: ApiScopes::default(),
        })
    }

    pub fn with_scopes(mut self, scopes: ApiScopes) -> Self {
        self.scopes = scopes;
        self
    }

    pub fn with_freshness_window(mut self, window: Duration) -> Self {
        self.verifier = self.verifier.with_freshness_window(window);
        self
    }

    pub fn configuration(&self) -> &Configuration {
        &self.configuration
    }

    pub fn verifier(&self) -> &InboundVerifier {
        &self.verifier
    }

    /// The system-level session; derive user sessions from it
    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn handlers(&self) -> &dyn ExAppHandlers {
        self.handlers.as_ref()
    }

    pub fn scopes(&self) -> &ApiScopes {
        &self.scopes
    }
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route(&AppRoute::Heartbeat.to_string(), get(heartbeat_route))
        .route(&AppRoute::Enabled.to_string(), put(enabled_route))
        .route(&AppRoute::Scopes.to_string(), get(scopes_route))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

pub async fn start_app(listener: TcpListener, state: AppState) -> Result<()> {
    listener.set_nonblocking(true)?;
    let listener = tokio::net::TcpListener::from_std(listener)?;

    info!(
        "Application {} is listening on {}",
        state.verifier().app_id(),
        listener.local_addr()?
    );
    debug!("Calls back to {}", state.configuration().base_url());

    axum::serve(listener, router(Arc::new(state))).await?;

    Ok(())
}
