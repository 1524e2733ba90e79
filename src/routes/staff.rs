use crate::{AppState, handlers};
use axum::{
    Router,
    routing::{get, post, put},
};

/// Staff Router Module
///
/// Librarian-only endpoints, mounted under `/staff`. The whole router is wrapped in
/// the `guard::require_librarian` route layer, so handlers here assume the caller
/// already passed the role check and do not repeat it.
pub fn staff_routes() -> Router<AppState> {
    Router::new()
        // --- Catalog management ---
        .route("/items", post(handlers::create_item))
        .route(
            "/items/{id}",
            put(handlers::update_item).delete(handlers::delete_item),
        )
        // --- Holds queue ---
        // GET /staff/holds?status=Pending
        .route("/holds", get(handlers::get_all_holds))
        // PUT /staff/holds/{id}/status
        // Lifecycle transitions; Ready reserves a copy.
        .route("/holds/{id}/status", put(handlers::update_hold_status))
        // --- Fines ---
        .route(
            "/fines",
            get(handlers::get_all_fines).post(handlers::create_fine),
        )
        .route("/fines/{id}/pay", put(handlers::pay_fine))
        // --- Accounts & dashboard ---
        .route("/users", post(handlers::create_user))
        .route("/stats", get(handlers::get_staff_stats))
}
