mod common;

use axum::{
    extract::FromRequestParts,
    http::{Method, Request, Uri, header, request::Parts},
};
use common::{InMemoryRepository, TEST_JWT_SECRET, app_state, test_config};
use jsonwebtoken::{EncodingKey, Header, encode};
use library_portal::{
    AppError, StaffRole, UserRole,
    auth::{AuthUser, Claims, CurrentSession, decode_token, issue_token},
    config::Env,
};
use std::{sync::Arc, time::SystemTime};
use uuid::Uuid;

// --- Helper Functions ---

fn create_token(user_id: Uuid, exp_offset: i64) -> String {
    let now = SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .unwrap()
        .as_secs() as i64;

    let claims = Claims {
        sub: user_id,
        iat: now as usize,
        exp: (now + exp_offset) as usize,
    };

    let key = EncodingKey::from_secret(TEST_JWT_SECRET.as_bytes());
    encode(&Header::default(), &claims, &key).unwrap()
}

fn get_request_parts(method: Method, uri: Uri) -> Parts {
    let request = Request::builder()
        .method(method)
        .uri(uri)
        .body(axum::body::Body::empty())
        .unwrap();
    let (parts, _) = request.into_parts();
    parts
}

fn bearer_parts(token: &str) -> Parts {
    let mut parts = get_request_parts(Method::GET, "/".parse().unwrap());
    parts.headers.insert(
        header::AUTHORIZATION,
        header::HeaderValue::from_str(&format!("Bearer {}", token)).unwrap(),
    );
    parts
}

fn production_config() -> library_portal::AppConfig {
    let mut config = test_config();
    config.env = Env::Production;
    config
}

// --- Tests ---

#[tokio::test]
async fn test_auth_success_with_valid_jwt() {
    let repo = Arc::new(InMemoryRepository::new());
    let user = repo.seed_user("Patron", None);
    let state = app_state(repo, production_config());

    let mut parts = bearer_parts(&create_token(user.id, 3600));
    let auth_user = AuthUser::from_request_parts(&mut parts, &state).await.unwrap();

    assert_eq!(auth_user.id, user.id);
    assert_eq!(auth_user.user_role, Some(UserRole::Patron));
    assert_eq!(auth_user.staff_role, None);
}

#[tokio::test]
async fn test_auth_failure_with_missing_header() {
    let state = app_state(Arc::new(InMemoryRepository::new()), production_config());
    let mut parts = get_request_parts(Method::GET, "/".parse().unwrap());

    let auth_user = AuthUser::from_request_parts(&mut parts, &state).await;

    assert!(matches!(auth_user, Err(AppError::Unauthorized)));
}

#[tokio::test]
async fn test_auth_failure_with_expired_jwt() {
    let repo = Arc::new(InMemoryRepository::new());
    let user = repo.seed_user("Patron", None);
    let state = app_state(repo, production_config());

    // Well past the default 60s leeway.
    let mut parts = bearer_parts(&create_token(user.id, -3600));
    let auth_user = AuthUser::from_request_parts(&mut parts, &state).await;

    assert!(matches!(auth_user, Err(AppError::Unauthorized)));
}

#[tokio::test]
async fn test_auth_failure_with_wrong_secret() {
    let repo = Arc::new(InMemoryRepository::new());
    let user = repo.seed_user("Staff", Some("Librarian"));
    let mut config = production_config();
    config.jwt_secret = "a-different-secret".to_string();
    let state = app_state(repo, config);

    let mut parts = bearer_parts(&create_token(user.id, 3600));
    let auth_user = AuthUser::from_request_parts(&mut parts, &state).await;

    assert!(matches!(auth_user, Err(AppError::Unauthorized)));
}

#[tokio::test]
async fn test_auth_failure_when_user_was_deleted() {
    let repo = Arc::new(InMemoryRepository::new());
    let user = repo.seed_user("Patron", None);
    let token = create_token(user.id, 3600);
    repo.remove_user(user.id);
    let state = app_state(repo, production_config());

    let mut parts = bearer_parts(&token);
    let auth_user = AuthUser::from_request_parts(&mut parts, &state).await;

    assert!(matches!(auth_user, Err(AppError::Unauthorized)));
}

#[tokio::test]
async fn test_local_bypass_success() {
    let repo = Arc::new(InMemoryRepository::new());
    let user = repo.seed_user("Staff", Some("Librarian"));
    let state = app_state(repo, test_config());

    let mut parts = get_request_parts(Method::GET, "/".parse().unwrap());
    parts.headers.insert(
        header::HeaderName::from_static("x-user-id"),
        header::HeaderValue::from_str(&user.id.to_string()).unwrap(),
    );

    let auth_user = AuthUser::from_request_parts(&mut parts, &state).await.unwrap();

    assert_eq!(auth_user.id, user.id);
    assert_eq!(auth_user.user_role, Some(UserRole::Staff));
    assert_eq!(auth_user.staff_role, Some(StaffRole::Librarian));
}

#[tokio::test]
async fn test_local_bypass_disabled_in_prod() {
    let repo = Arc::new(InMemoryRepository::new());
    let user = repo.seed_user("Staff", Some("Librarian"));
    let state = app_state(repo, production_config());

    let mut parts = get_request_parts(Method::GET, "/".parse().unwrap());
    parts.headers.insert(
        header::HeaderName::from_static("x-user-id"),
        header::HeaderValue::from_str(&user.id.to_string()).unwrap(),
    );

    let auth_user = AuthUser::from_request_parts(&mut parts, &state).await;

    assert!(matches!(auth_user, Err(AppError::Unauthorized)));
}

#[tokio::test]
async fn test_current_session_is_anonymous_without_credentials() {
    let state = app_state(Arc::new(InMemoryRepository::new()), production_config());
    let mut parts = get_request_parts(Method::GET, "/".parse().unwrap());

    let current = CurrentSession::from_request_parts(&mut parts, &state).await.unwrap();

    assert!(!current.session.is_authenticated());
    assert_eq!(current.user_id, None);
}

#[tokio::test]
async fn test_current_session_drops_invalid_token() {
    let state = app_state(Arc::new(InMemoryRepository::new()), production_config());
    let mut parts = bearer_parts("not-a-jwt");

    let current = CurrentSession::from_request_parts(&mut parts, &state).await.unwrap();

    assert_eq!(current.session.token, None);
}

#[tokio::test]
async fn test_current_session_reads_roles_from_the_database() {
    let repo = Arc::new(InMemoryRepository::new());
    let user = repo.seed_user("Staff", Some("Librarian"));
    let token = create_token(user.id, 3600);
    let state = app_state(repo.clone(), production_config());

    let mut parts = bearer_parts(&token);
    let before = CurrentSession::from_request_parts(&mut parts, &state).await.unwrap();
    assert!(before.session.is_librarian());

    // Demotion is visible on the very next request with the same token.
    repo.set_staff_role(user.id, Some("AssistantLibrarian"));
    let mut parts = bearer_parts(&token);
    let after = CurrentSession::from_request_parts(&mut parts, &state).await.unwrap();
    assert!(after.session.is_authenticated());
    assert!(!after.session.is_librarian());
}

#[tokio::test]
async fn test_unknown_stored_role_fails_closed() {
    let repo = Arc::new(InMemoryRepository::new());
    let user = repo.seed_user("librarian", Some("Librarian"));
    let state = app_state(repo, production_config());

    let mut parts = bearer_parts(&create_token(user.id, 3600));
    let current = CurrentSession::from_request_parts(&mut parts, &state).await.unwrap();

    assert!(current.session.is_authenticated());
    assert_eq!(current.session.user_role, None);
    assert!(!current.session.is_librarian());
}

#[test]
fn test_issued_token_round_trips_subject() {
    let config = test_config();
    let user_id = Uuid::new_v4();

    let token = issue_token(user_id, &config).unwrap();
    let claims = decode_token(&token, TEST_JWT_SECRET).unwrap();

    assert_eq!(claims.sub, user_id);
    assert_eq!(claims.exp - claims.iat, config.token_ttl_secs as usize);
}
