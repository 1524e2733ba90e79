use axum::{
    Router,
    extract::{FromRef, Request},
    http::HeaderName,
    middleware::{self, Next},
    response::Response,
};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::{DefaultOnResponse, TraceLayer},
};
use tracing::{Level, Span};

// --- Module Structure ---

pub mod auth;
pub mod config;
pub mod error;
pub mod guard;
pub mod handlers;
pub mod models;
pub mod password;
pub mod repository;
pub mod session;

// Routing segregated by access level (public, authenticated, librarian, pages).
pub mod routes;
use auth::AuthUser;
use routes::{authenticated, pages, public, staff};

// --- Public Re-exports ---

pub use config::AppConfig;
pub use error::AppError;
pub use guard::{AuthorizationDecision, evaluate};
pub use repository::{PostgresRepository, RepositoryState};
pub use session::{Session, SessionStore, StaffRole, UserRole};

/// ApiDoc
///
/// Aggregates every `#[utoipa::path]` handler and `ToSchema` model into the OpenAPI
/// document served at `/api-docs/openapi.json`.
#[derive(OpenApi)]
#[openapi(
    paths(
        handlers::login, handlers::register, handlers::get_me, handlers::update_me,
        handlers::get_items, handlers::get_item, handlers::create_item, handlers::update_item,
        handlers::delete_item, handlers::place_hold, handlers::get_my_holds, handlers::cancel_hold,
        handlers::get_all_holds, handlers::update_hold_status, handlers::get_my_fines,
        handlers::get_my_fine_summary, handlers::get_all_fines, handlers::create_fine,
        handlers::pay_fine, handlers::create_user, handlers::get_staff_stats,
        guard::librarian_navigation, guard::librarian_page
    ),
    components(
        schemas(
            models::Item, models::ItemType, models::Hold, models::HoldStatus, models::Fine,
            models::LoginRequest, models::LoginResponse, models::RegisterRequest,
            models::CreateUserRequest, models::UpdateProfileRequest, models::CreateItemRequest,
            models::UpdateItemRequest, models::UpdateHoldStatusRequest, models::CreateFineRequest,
            models::UserProfile, models::FineSummary, models::StaffDashboardStats,
            session::UserRole, session::StaffRole,
            guard::AuthorizationDecision, guard::NavigationCheck,
        )
    ),
    tags(
        (name = "library-portal", description = "Library catalog, holds and fines API")
    )
)]
struct ApiDoc;

/// AppState
///
/// The single, immutable container of shared services and configuration, cloned
/// into every request.
#[derive(Clone)]
pub struct AppState {
    /// Persistence layer.
    pub repo: RepositoryState,
    /// Loaded environment configuration.
    pub config: AppConfig,
}

// --- Axum FromRef Extractor Implementations ---

// Let extractors such as `AuthUser` and `CurrentSession` pull just what they need.

impl FromRef<AppState> for RepositoryState {
    fn from_ref(app_state: &AppState) -> RepositoryState {
        app_state.repo.clone()
    }
}

impl FromRef<AppState> for AppConfig {
    fn from_ref(app_state: &AppState) -> AppConfig {
        app_state.config.clone()
    }
}

/// auth_middleware
///
/// Route layer for `authenticated_routes`. Extracting `AuthUser` is the check:
/// a request without a valid session is rejected with 401 before the handler runs.
async fn auth_middleware(_auth_user: AuthUser, request: Request, next: Next) -> Response {
    next.run(request).await
}

/// create_router
///
/// Assembles the routing tree, applies scoped and global middleware and registers
/// the application state.
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_methods(Any)
        .allow_origin(Any)
        .allow_headers(Any);

    let x_request_id = HeaderName::from_static("x-request-id");

    let base_router = Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        // Public routes and page gates: no layer, the guard decides inside.
        .merge(public::public_routes())
        .merge(pages::page_routes())
        // Any signed-in user.
        .merge(
            authenticated::authenticated_routes().route_layer(middleware::from_fn_with_state(
                state.clone(),
                auth_middleware,
            )),
        )
        // Librarians only: the role guard runs on every request under /staff.
        .nest(
            "/staff",
            staff::staff_routes().route_layer(middleware::from_fn_with_state(
                state.clone(),
                guard::require_librarian,
            )),
        )
        .with_state(state);

    base_router
        .layer(
            ServiceBuilder::new()
                // Every request gets a UUID correlation id...
                .layer(SetRequestIdLayer::new(x_request_id.clone(), MakeRequestUuid))
                // ...recorded on its tracing span...
                .layer(
                    TraceLayer::new_for_http()
                        .make_span_with(trace_span_logger)
                        .on_response(
                            DefaultOnResponse::new()
                                .level(Level::INFO)
                                .latency_unit(tower_http::LatencyUnit::Millis),
                        ),
                )
                // ...and echoed back to the client.
                .layer(PropagateRequestIdLayer::new(x_request_id)),
        )
        .layer(cors)
}

/// trace_span_logger
///
/// Builds the per-request span so every log line of a request carries its id.
fn trace_span_logger(request: &axum::http::Request<axum::body::Body>) -> Span {
    let request_id = request
        .headers()
        .get("x-request-id")
        .and_then(|value| value.to_str().ok())
        .unwrap_or("unknown");

    tracing::info_span!(
        "http_request",
        method = ?request.method(),
        uri = ?request.uri(),
        req_id = %request_id,
    )
}
