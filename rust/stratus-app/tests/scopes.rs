//! Granted scopes come from the server's capability document, and only
//! change once that document is refreshed.

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use anyhow::Result;
use axum::{extract::State, routing::get, Json, Router};
use serde_json::{json, Value};
use stratus_app::ApiScope;
use stratus_core::{
    api::{Session, CAPABILITIES_PATH},
    config::{AppIdentity, Configuration, Credentials},
    tracing::initialize_tracing,
};

async fn capabilities(State(ecosystem_enabled): State<Arc<AtomicBool>>) -> Json<Value> {
    let mut capabilities = json!({ "theming": {} });
    if ecosystem_enabled.load(Ordering::SeqCst) {
        capabilities["app_ecosystem_v2"] = json!({ "scopes": [2, 3, 10, 12] });
    }

    Json(json!({
        "ocs": {
            "meta": { "status": "ok", "statuscode": 100, "message": "OK" },
            "data": {
                "version": {
                    "major": 28, "minor": 0, "micro": 1,
                    "string": "28.0.1", "extendedSupport": false
                },
                "capabilities": capabilities
            }
        }
    }))
}

async fn session(ecosystem_enabled: Arc<AtomicBool>) -> Result<Session> {
    initialize_tracing(None);

    let app = Router::new()
        .route(CAPABILITIES_PATH, get(capabilities))
        .with_state(ecosystem_enabled);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
    let address = listener.local_addr()?;
    tokio::spawn(async move { axum::serve(listener, app).await });

    Ok(Session::new(Configuration::new(
        &format!("http://{address}"),
        Credentials::AppToken(AppIdentity::new("skeleton", "1.0.0", "12345")),
    )?)?)
}

#[tokio::test]
async fn it_reports_the_scopes_the_server_granted() -> Result<()> {
    let session = session(Arc::new(AtomicBool::new(true))).await?;

    assert!(ApiScope::System.is_allowed(&session).await?);
    assert!(ApiScope::UserInfo.is_allowed(&session).await?);
    assert!(!ApiScope::FilesSharing.is_allowed(&session).await?);

    Ok(())
}

#[tokio::test]
async fn it_sees_a_disabled_app_ecosystem_only_after_a_refresh() -> Result<()> {
    let ecosystem_enabled = Arc::new(AtomicBool::new(true));
    let session = session(ecosystem_enabled.clone()).await?;

    assert!(ApiScope::Dav.is_allowed(&session).await?);

    ecosystem_enabled.store(false, Ordering::SeqCst);
    assert!(ApiScope::Dav.is_allowed(&session).await?);

    session.update_server_info().await?;
    assert!(!ApiScope::Dav.is_allowed(&session).await?);

    Ok(())
}
