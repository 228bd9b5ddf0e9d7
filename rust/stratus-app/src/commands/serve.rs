use std::net::{IpAddr, TcpListener};

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use stratus_app::{start_app, ApiScope, ApiScopes, AppState, ExAppHandlers};
use stratus_core::{api::Session, config::CredentialResolver};

/// Logs lifecycle events and otherwise does nothing
pub struct LoggingHandlers;

#[async_trait]
impl ExAppHandlers for LoggingHandlers {
    async fn enabled(&self, enabled: bool, session: Session) -> String {
        info!(
            "Enabled set to {} (acting as {:?})",
            enabled,
            session.user()
        );
        String::new()
    }
}

pub async fn serve(
    resolver: CredentialResolver,
    interface: Option<IpAddr>,
    port: Option<u16>,
) -> Result<()> {
    info!("Starting stratus application server...");

    let configuration = resolver.resolve()?;
    let settings = resolver.resolve_app_server()?;

    let interface = match interface {
        Some(interface) => interface,
        None => settings.host.parse()?,
    };
    let port = port
        .or(settings.port)
        .ok_or_else(|| anyhow!("No port configured; pass --port or set APP_PORT"))?;

    let state = AppState::try_new(configuration, LoggingHandlers)?.with_scopes(ApiScopes::new(
        &[ApiScope::System],
        &[ApiScope::Dav, ApiScope::Notifications],
    ));

    let listener = TcpListener::bind((interface, port))?;

    start_app(listener, state).await
}
