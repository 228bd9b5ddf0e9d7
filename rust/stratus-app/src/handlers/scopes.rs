use std::sync::Arc;

use axum::{extract::State, Json};

use crate::{ApiScopes, AppState, VerifiedCall};

pub async fn scopes_route(State(state): State<Arc<AppState>>, _call: VerifiedCall) -> Json<ApiScopes> {
    Json(state.scopes().clone())
}
