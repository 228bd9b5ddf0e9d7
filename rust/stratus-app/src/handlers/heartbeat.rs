use std::sync::Arc;

use axum::{extract::State, Json};
use serde_json::{json, Value};

use crate::{AppState, VerifiedCall};

pub async fn heartbeat_route(State(state): State<Arc<AppState>>, _call: VerifiedCall) -> Json<Value> {
    let status = state.handlers().heartbeat().await;
    Json(json!({ "status": status }))
}
