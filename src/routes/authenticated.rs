use crate::{AppState, handlers};
use axum::{
    Router,
    routing::{delete, get, post},
};

/// Authenticated Router Module
///
/// Routes for any signed-in user. The router above wraps this module in a layer
/// that extracts `AuthUser`, so unauthenticated requests get 401 before any handler
/// runs; handlers then use the resolved id for ownership checks.
pub fn authenticated_routes() -> Router<AppState> {
    Router::<AppState>::new()
        // GET/PUT /me
        // The caller's profile; only the display name is editable.
        .route("/me", get(handlers::get_me).put(handlers::update_me))
        // GET /me/holds
        .route("/me/holds", get(handlers::get_my_holds))
        // GET /me/fines and /me/fines/summary
        .route("/me/fines", get(handlers::get_my_fines))
        .route("/me/fines/summary", get(handlers::get_my_fine_summary))
        // POST /items/{id}/holds
        // Patron-only; staff accounts receive 403 from the handler.
        .route("/items/{id}/holds", post(handlers::place_hold))
        // DELETE /holds/{id}
        // Cancels one of the caller's own active holds.
        .route("/holds/{id}", delete(handlers::cancel_hold))
}
