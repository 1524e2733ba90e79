//! Role-authorization guard for librarian-only views.
//!
//! [`evaluate`] is the whole policy: a pure function from a [`Session`] to an
//! [`AuthorizationDecision`]. The rest of this module adapts that decision to the
//! router: a route layer for the librarian API, a page gate that answers with a
//! redirect, and a JSON navigation check for the single-page front end.

use axum::{
    Json,
    extract::Request,
    middleware::Next,
    response::{IntoResponse, Redirect, Response},
};
use serde::{Deserialize, Serialize};
use ts_rs::TS;
use utoipa::ToSchema;

use crate::{auth::CurrentSession, error::AppError, session::Session};

pub const LOGIN_PATH: &str = "/login";
pub const ACCESS_DENIED_PATH: &str = "/access-denied";

/// AuthorizationDecision
///
/// Outcome of one guarded navigation. Exactly one is produced per evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub enum AuthorizationDecision {
    Allow,
    RedirectToLogin,
    RedirectToAccessDenied,
}

/// NotAuthorized
///
/// The two ways a navigation can be refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotAuthorized {
    Unauthenticated,
    InsufficientRole,
}

impl AuthorizationDecision {
    pub fn denial(&self) -> Option<NotAuthorized> {
        match self {
            AuthorizationDecision::Allow => None,
            AuthorizationDecision::RedirectToLogin => Some(NotAuthorized::Unauthenticated),
            AuthorizationDecision::RedirectToAccessDenied => Some(NotAuthorized::InsufficientRole),
        }
    }

    /// Where the router should send the caller; `None` means render the page.
    pub fn redirect_location(&self) -> Option<&'static str> {
        match self {
            AuthorizationDecision::Allow => None,
            AuthorizationDecision::RedirectToLogin => Some(LOGIN_PATH),
            AuthorizationDecision::RedirectToAccessDenied => Some(ACCESS_DENIED_PATH),
        }
    }
}

impl From<NotAuthorized> for AppError {
    fn from(reason: NotAuthorized) -> Self {
        match reason {
            NotAuthorized::Unauthenticated => AppError::Unauthorized,
            NotAuthorized::InsufficientRole => AppError::Forbidden,
        }
    }
}

/// evaluate
///
/// Decides whether a librarian-only view may be reached. First match wins:
/// 1. no token → `RedirectToLogin`
/// 2. not (Staff and Librarian) → `RedirectToAccessDenied`
/// 3. otherwise → `Allow`
///
/// Missing or unrecognised role data never grants access.
pub fn evaluate(session: &Session) -> AuthorizationDecision {
    if !session.is_authenticated() {
        AuthorizationDecision::RedirectToLogin
    } else if !session.is_librarian() {
        AuthorizationDecision::RedirectToAccessDenied
    } else {
        AuthorizationDecision::Allow
    }
}

/// require_librarian
///
/// Route layer for the librarian API. The session is resolved afresh for every
/// request; non-`Allow` decisions become 401 / 403 before the handler runs.
pub async fn require_librarian(
    CurrentSession { session, user_id }: CurrentSession,
    request: Request,
    next: Next,
) -> Response {
    match evaluate(&session).denial() {
        None => next.run(request).await,
        Some(reason) => {
            tracing::debug!(
                ?reason,
                user_id = ?user_id,
                path = %request.uri().path(),
                "Librarian route refused"
            );
            AppError::from(reason).into_response()
        }
    }
}

/// NavigationCheck
///
/// Answer to a front-end router asking whether it may render a librarian page.
/// `replace` tells the router to replace the current history entry so the guarded
/// page cannot be reached again with the back button.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct NavigationCheck {
    pub decision: AuthorizationDecision,
    pub location: Option<String>,
    pub replace: bool,
}

impl From<AuthorizationDecision> for NavigationCheck {
    fn from(decision: AuthorizationDecision) -> Self {
        let location = decision.redirect_location();
        NavigationCheck {
            decision,
            location: location.map(str::to_string),
            replace: location.is_some(),
        }
    }
}

/// librarian_navigation
///
/// [Public Route] Always 200; the decision is in the body.
#[utoipa::path(
    get,
    path = "/navigation/librarian",
    responses((status = 200, description = "Guard decision for the caller", body = NavigationCheck))
)]
pub async fn librarian_navigation(
    CurrentSession { session, .. }: CurrentSession,
) -> Json<NavigationCheck> {
    Json(NavigationCheck::from(evaluate(&session)))
}

/// librarian_page
///
/// [Page Gate] Server-side twin of the navigation check: `Allow` answers 200,
/// anything else a `303 See Other` to the login or access-denied page.
#[utoipa::path(
    get,
    path = "/pages/librarian",
    responses(
        (status = 200, description = "Caller may view librarian pages", body = NavigationCheck),
        (status = 303, description = "Redirect to /login or /access-denied")
    )
)]
pub async fn librarian_page(CurrentSession { session, .. }: CurrentSession) -> Response {
    let decision = evaluate(&session);
    match decision.redirect_location() {
        None => Json(NavigationCheck::from(decision)).into_response(),
        Some(location) => Redirect::to(location).into_response(),
    }
}
