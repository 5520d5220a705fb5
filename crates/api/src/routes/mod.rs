pub mod health;
pub mod jobs;

use axum::Router;

use crate::state::AppState;
use crate::ws;

/// Build the `/api/v1` route tree.
///
/// ```text
/// /jobs                      POST submit, GET list
/// /jobs/{id}                 GET status snapshot
/// ```
pub fn api_routes() -> Router<AppState> {
    Router::new().nest("/jobs", jobs::router())
}

/// Build the `/ws` route tree.
///
/// ```text
/// /ws/progress               owner subscription (?owner_id=..)
/// /ws/progress/entity/{id}   entity subscription
/// ```
pub fn ws_routes() -> Router<AppState> {
    ws::router()
}
