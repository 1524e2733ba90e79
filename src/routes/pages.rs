use crate::{AppState, guard};
use axum::{Router, routing::get};

/// Pages Router Module
///
/// What the front-end router consults before rendering a librarian page. Both
/// routes are public: an anonymous caller must get a redirect decision, not a 401.
pub fn page_routes() -> Router<AppState> {
    Router::new()
        // GET /navigation/librarian
        // JSON decision with the redirect target and `replace: true` on denial.
        .route("/navigation/librarian", get(guard::librarian_navigation))
        // GET /pages/librarian[/...]
        // 200 when allowed, otherwise 303 to /login or /access-denied.
        .route("/pages/librarian", get(guard::librarian_page))
        .route("/pages/librarian/{*path}", get(guard::librarian_page))
}
