use std::{collections::HashMap, sync::Arc};

use axum::{
    extract::{Query, State},
    http::StatusCode,
    Json,
};
use serde_json::{json, Value};

use crate::{AppErrorResponse, AppState, VerifiedCall};

/// Reads the `enabled` query flag: `1`/`true` or `0`/`false`
pub fn parse_enabled_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" => Some(true),
        "0" | "false" => Some(false),
        _ => None,
    }
}

pub async fn enabled_route(
    State(state): State<Arc<AppState>>,
    call: VerifiedCall,
) -> Result<Json<Value>, AppErrorResponse> {
    let Query(query) = Query::<HashMap<String, String>>::try_from_uri(&call.uri)
        .map_err(|_| StatusCode::BAD_REQUEST)?;

    let enabled = query
        .get("enabled")
        .and_then(|value| parse_enabled_flag(value))
        .ok_or(StatusCode::BAD_REQUEST)?;

    info!(
        "Application {} by the server",
        if enabled { "enabled" } else { "disabled" }
    );

    let error = state.handlers().enabled(enabled, call.session).await;
    if !error.is_empty() {
        warn!("Enabled handler reported: {}", error);
    }

    Ok(Json(json!({ "error": error })))
}
