use crate::{AppState, handlers};
use axum::{
    Router,
    routing::{get, post},
};

/// Public Router Module
///
/// Endpoints reachable without a session: health, sign-in, self-registration and
/// read-only catalog browsing.
pub fn public_routes() -> Router<AppState> {
    Router::new()
        // GET /health
        // Liveness check for monitoring and load balancers.
        .route("/health", get(|| async { "ok" }))
        // POST /login
        // Exchanges credentials for a session token.
        .route("/login", post(handlers::login))
        // POST /register
        // Creates a Patron account.
        .route("/register", post(handlers::register))
        // GET /items?search=...&item_type=...
        .route("/items", get(handlers::get_items))
        // GET /items/{id}
        .route("/items/{id}", get(handlers::get_item))
}
