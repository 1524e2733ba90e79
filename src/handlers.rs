use crate::{
    AppState,
    auth::{AuthUser, issue_token},
    error::{AppError, Result},
    models::{
        CreateFineRequest, CreateItemRequest, CreateUserRequest, Fine, FineSummary, Hold,
        HoldStatus, Item, ItemType, LoginRequest, LoginResponse, MAX_FINE_CENTS, NewUser,
        RegisterRequest, StaffDashboardStats, UpdateHoldStatusRequest, UpdateItemRequest,
        UpdateProfileRequest, UserProfile,
    },
    password::{hash_password, verify_password},
    session::{StaffRole, UserRole},
};
use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
};
use serde::Deserialize;
use uuid::Uuid;

// --- Filter Structs ---

/// ItemFilter
///
/// Query parameters for the public catalog listing (GET /items).
#[derive(Deserialize, utoipa::IntoParams)]
pub struct ItemFilter {
    /// Case-insensitive match against title, author and ISBN.
    pub search: Option<String>,
    pub item_type: Option<ItemType>,
}

/// HoldFilter
#[derive(Deserialize, utoipa::IntoParams)]
pub struct HoldFilter {
    pub status: Option<HoldStatus>,
}

/// FineFilter
#[derive(Deserialize, utoipa::IntoParams)]
pub struct FineFilter {
    #[serde(default)]
    pub unpaid_only: bool,
}

fn require_non_empty(value: &str, field: &str) -> Result<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(AppError::BadRequest(format!("{} must not be empty", field)));
    }
    Ok(trimmed.to_string())
}

fn normalize_email(email: &str) -> Result<String> {
    let email = require_non_empty(email, "Email")?;
    if !email.contains('@') {
        return Err(AppError::BadRequest("Email is not valid".to_string()));
    }
    Ok(email.to_lowercase())
}

// --- Authentication ---

/// login
///
/// [Public Route] Exchanges email and password for a session token.
/// Unknown email and wrong password are indistinguishable to the caller.
#[utoipa::path(
    post,
    path = "/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Signed in", body = LoginResponse),
        (status = 401, description = "Invalid credentials")
    )
)]
pub async fn login(
    State(state): State<AppState>,
    Json(payload): Json<LoginRequest>,
) -> Result<Json<LoginResponse>> {
    let user = state
        .repo
        .get_user_by_email(payload.email.trim())
        .await
        .ok_or(AppError::Unauthorized)?;

    if !verify_password(&payload.password, &user.password_hash)? {
        tracing::info!(user_id = %user.id, "Failed login attempt");
        return Err(AppError::Unauthorized);
    }

    let token = issue_token(user.id, &state.config)?;
    let profile = user.profile();
    tracing::info!(user_id = %user.id, "User signed in");

    Ok(Json(LoginResponse {
        token,
        user_id: user.id,
        user_role: profile.user_role,
        staff_role: profile.staff_role,
        expires_in: state.config.token_ttl_secs,
    }))
}

/// register
///
/// [Public Route] Self-service signup. Always creates a Patron; staff accounts are
/// created by a librarian through POST /staff/users.
#[utoipa::path(
    post,
    path = "/register",
    request_body = RegisterRequest,
    responses(
        (status = 201, description = "Registered", body = UserProfile),
        (status = 400, description = "Invalid input"),
        (status = 409, description = "Email already registered")
    )
)]
pub async fn register(
    State(state): State<AppState>,
    Json(payload): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<UserProfile>)> {
    let new_user = NewUser {
        email: normalize_email(&payload.email)?,
        full_name: require_non_empty(&payload.full_name, "Full name")?,
        user_role: UserRole::Patron,
        staff_role: None,
        password_hash: hash_password(&payload.password)?,
    };

    let user = state.repo.create_user(new_user).await?;
    Ok((StatusCode::CREATED, Json(user.profile())))
}

// --- Profile ---

/// get_me
///
/// [Authenticated Route] The caller's profile.
#[utoipa::path(
    get,
    path = "/me",
    responses((status = 200, description = "Profile", body = UserProfile))
)]
pub async fn get_me(
    AuthUser { id, .. }: AuthUser,
    State(state): State<AppState>,
) -> Result<Json<UserProfile>> {
    let user = state
        .repo
        .get_user(id)
        .await
        .ok_or_else(|| AppError::NotFound("User not found".to_string()))?;
    Ok(Json(user.profile()))
}

/// update_me
///
/// [Authenticated Route] Updates the caller's display name. Roles cannot be changed here.
#[utoipa::path(
    put,
    path = "/me",
    request_body = UpdateProfileRequest,
    responses((status = 200, description = "Updated", body = UserProfile))
)]
pub async fn update_me(
    AuthUser { id, .. }: AuthUser,
    State(state): State<AppState>,
    Json(payload): Json<UpdateProfileRequest>,
) -> Result<Json<UserProfile>> {
    let full_name = require_non_empty(&payload.full_name, "Full name")?;
    let user = state
        .repo
        .update_user_name(id, &full_name)
        .await
        .ok_or_else(|| AppError::NotFound("User not found".to_string()))?;
    Ok(Json(user.profile()))
}

// --- Catalog ---

/// get_items
///
/// [Public Route] Catalog listing with search and type filter.
#[utoipa::path(
    get,
    path = "/items",
    params(ItemFilter),
    responses((status = 200, description = "Matching items", body = [Item]))
)]
pub async fn get_items(
    State(state): State<AppState>,
    Query(filter): Query<ItemFilter>,
) -> Json<Vec<Item>> {
    let search = filter.search.filter(|s| !s.trim().is_empty());
    let item_type = filter.item_type.map(|t| t.as_str().to_string());
    Json(state.repo.list_items(search, item_type).await)
}

/// get_item
///
/// [Public Route] A single catalog entry.
#[utoipa::path(
    get,
    path = "/items/{id}",
    params(("id" = Uuid, Path, description = "Item ID")),
    responses(
        (status = 200, description = "Found", body = Item),
        (status = 404, description = "Not Found")
    )
)]
pub async fn get_item(State(state): State<AppState>, Path(id): Path<Uuid>) -> Result<Json<Item>> {
    state
        .repo
        .get_item(id)
        .await
        .map(Json)
        .ok_or_else(|| AppError::NotFound("Item not found".to_string()))
}

/// create_item
///
/// [Librarian Route] Adds a catalog entry; every copy starts available.
#[utoipa::path(
    post,
    path = "/staff/items",
    request_body = CreateItemRequest,
    responses((status = 201, description = "Created", body = Item))
)]
pub async fn create_item(
    State(state): State<AppState>,
    Json(mut payload): Json<CreateItemRequest>,
) -> Result<(StatusCode, Json<Item>)> {
    payload.title = require_non_empty(&payload.title, "Title")?;
    payload.author = require_non_empty(&payload.author, "Author")?;
    if payload.total_copies < 0 {
        return Err(AppError::BadRequest(
            "Total copies must not be negative".to_string(),
        ));
    }

    let item = state.repo.create_item(payload).await?;
    tracing::info!(item_id = %item.id, "Catalog item created");
    Ok((StatusCode::CREATED, Json(item)))
}

/// update_item
///
/// [Librarian Route] Partial update. Changing `total_copies` shifts the available
/// count by the same amount and is refused if that would go below zero.
#[utoipa::path(
    put,
    path = "/staff/items/{id}",
    request_body = UpdateItemRequest,
    responses(
        (status = 200, description = "Updated", body = Item),
        (status = 400, description = "Invalid update"),
        (status = 404, description = "Not Found")
    )
)]
pub async fn update_item(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateItemRequest>,
) -> Result<Json<Item>> {
    state
        .repo
        .update_item(id, &payload)
        .await?
        .map(Json)
        .ok_or_else(|| AppError::NotFound("Item not found".to_string()))
}

/// delete_item
///
/// [Librarian Route] Removes a catalog entry.
#[utoipa::path(
    delete,
    path = "/staff/items/{id}",
    params(("id" = Uuid, Path, description = "Item ID")),
    responses(
        (status = 204, description = "Deleted"),
        (status = 404, description = "Not Found")
    )
)]
pub async fn delete_item(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode> {
    if state.repo.delete_item(id).await? {
        tracing::info!(item_id = %id, "Catalog item deleted");
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(AppError::NotFound("Item not found".to_string()))
    }
}

// --- Holds ---

/// place_hold
///
/// [Authenticated Route] A patron reserves an item. One active hold per item, and
/// at most `max_active_holds` active holds overall.
#[utoipa::path(
    post,
    path = "/items/{id}/holds",
    params(("id" = Uuid, Path, description = "Item ID")),
    responses(
        (status = 201, description = "Hold placed", body = Hold),
        (status = 403, description = "Only patrons can place holds"),
        (status = 404, description = "Item not found"),
        (status = 409, description = "Duplicate hold or hold limit reached")
    )
)]
pub async fn place_hold(
    user: AuthUser,
    State(state): State<AppState>,
    Path(item_id): Path<Uuid>,
) -> Result<(StatusCode, Json<Hold>)> {
    if !user.is_patron() {
        return Err(AppError::Forbidden);
    }

    if state.repo.get_item(item_id).await.is_none() {
        return Err(AppError::NotFound("Item not found".to_string()));
    }

    let hold = state
        .repo
        .place_hold(item_id, user.id, state.config.max_active_holds)
        .await?;
    tracing::info!(hold_id = %hold.id, patron_id = %user.id, "Hold placed");
    Ok((StatusCode::CREATED, Json(hold)))
}

/// get_my_holds
///
/// [Authenticated Route] The caller's holds, newest first.
#[utoipa::path(
    get,
    path = "/me/holds",
    responses((status = 200, description = "My holds", body = [Hold]))
)]
pub async fn get_my_holds(
    AuthUser { id, .. }: AuthUser,
    State(state): State<AppState>,
) -> Json<Vec<Hold>> {
    Json(state.repo.list_holds_for_patron(id).await)
}

/// cancel_hold
///
/// [Authenticated Route] A patron cancels one of their own active holds.
/// Holds that are not theirs, or no longer active, answer 404.
#[utoipa::path(
    delete,
    path = "/holds/{id}",
    params(("id" = Uuid, Path, description = "Hold ID")),
    responses(
        (status = 204, description = "Cancelled"),
        (status = 404, description = "Not Found or Not Yours")
    )
)]
pub async fn cancel_hold(
    AuthUser { id: user_id, .. }: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode> {
    let not_found = || AppError::NotFound("Hold not found".to_string());

    let hold = state
        .repo
        .get_hold(id)
        .await
        .filter(|h| h.patron_id == user_id)
        .ok_or_else(not_found)?;

    let current = hold.status().filter(HoldStatus::is_active).ok_or_else(not_found)?;
    let delta = current
        .transition_delta(HoldStatus::Cancelled)
        .ok_or_else(not_found)?;

    state
        .repo
        .transition_hold(id, current, HoldStatus::Cancelled, delta)
        .await?
        .ok_or_else(not_found)?;

    Ok(StatusCode::NO_CONTENT)
}

/// get_all_holds
///
/// [Librarian Route] Every hold, optionally filtered by status, oldest first.
#[utoipa::path(
    get,
    path = "/staff/holds",
    params(HoldFilter),
    responses((status = 200, description = "Holds", body = [Hold]))
)]
pub async fn get_all_holds(
    State(state): State<AppState>,
    Query(filter): Query<HoldFilter>,
) -> Json<Vec<Hold>> {
    Json(state.repo.list_holds(filter.status).await)
}

/// update_hold_status
///
/// [Librarian Route] Moves a hold along its lifecycle:
/// Pending → Ready | Cancelled, Ready → Fulfilled | Cancelled.
/// Ready reserves a copy; cancelling a Ready hold releases it.
#[utoipa::path(
    put,
    path = "/staff/holds/{id}/status",
    params(("id" = Uuid, Path, description = "Hold ID")),
    request_body = UpdateHoldStatusRequest,
    responses(
        (status = 200, description = "Updated", body = Hold),
        (status = 404, description = "Not Found"),
        (status = 409, description = "Transition not allowed or no copy available")
    )
)]
pub async fn update_hold_status(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateHoldStatusRequest>,
) -> Result<Json<Hold>> {
    let hold = state
        .repo
        .get_hold(id)
        .await
        .ok_or_else(|| AppError::NotFound("Hold not found".to_string()))?;

    let current = hold
        .status()
        .ok_or_else(|| AppError::Internal(format!("Hold {} has unknown status {:?}", id, hold.status)))?;

    let delta = current.transition_delta(payload.status).ok_or_else(|| {
        AppError::Conflict(format!(
            "Cannot move a hold from {} to {}",
            current.as_str(),
            payload.status.as_str()
        ))
    })?;

    let updated = state
        .repo
        .transition_hold(id, current, payload.status, delta)
        .await?
        .ok_or_else(|| AppError::Conflict("Hold was modified concurrently".to_string()))?;

    tracing::info!(hold_id = %id, from = current.as_str(), to = payload.status.as_str(), "Hold status changed");
    Ok(Json(updated))
}

// --- Fines ---

/// get_my_fines
///
/// [Authenticated Route] The caller's fines, paid and unpaid.
#[utoipa::path(
    get,
    path = "/me/fines",
    responses((status = 200, description = "My fines", body = [Fine]))
)]
pub async fn get_my_fines(
    AuthUser { id, .. }: AuthUser,
    State(state): State<AppState>,
) -> Json<Vec<Fine>> {
    Json(state.repo.list_fines_for_patron(id).await)
}

/// get_my_fine_summary
///
/// [Authenticated Route] Outstanding total and count of unpaid fines.
#[utoipa::path(
    get,
    path = "/me/fines/summary",
    responses((status = 200, description = "Summary", body = FineSummary))
)]
pub async fn get_my_fine_summary(
    AuthUser { id, .. }: AuthUser,
    State(state): State<AppState>,
) -> Json<FineSummary> {
    let fines = state.repo.list_fines_for_patron(id).await;
    Json(FineSummary::from_fines(&fines))
}

/// get_all_fines
#[utoipa::path(
    get,
    path = "/staff/fines",
    params(FineFilter),
    responses((status = 200, description = "Fines", body = [Fine]))
)]
pub async fn get_all_fines(
    State(state): State<AppState>,
    Query(filter): Query<FineFilter>,
) -> Json<Vec<Fine>> {
    Json(state.repo.list_fines(filter.unpaid_only).await)
}

/// create_fine
///
/// [Librarian Route] Charges a patron. The target must be an existing Patron account.
#[utoipa::path(
    post,
    path = "/staff/fines",
    request_body = CreateFineRequest,
    responses(
        (status = 201, description = "Created", body = Fine),
        (status = 400, description = "Invalid amount or target")
    )
)]
pub async fn create_fine(
    State(state): State<AppState>,
    Json(mut payload): Json<CreateFineRequest>,
) -> Result<(StatusCode, Json<Fine>)> {
    if payload.amount_cents <= 0 {
        return Err(AppError::BadRequest("Amount must be positive".to_string()));
    }
    if payload.amount_cents > MAX_FINE_CENTS {
        return Err(AppError::BadRequest(format!(
            "Amount may not exceed {} cents",
            MAX_FINE_CENTS
        )));
    }
    payload.reason = require_non_empty(&payload.reason, "Reason")?;

    let is_patron = state
        .repo
        .get_user(payload.patron_id)
        .await
        .is_some_and(|u| u.role() == Some(UserRole::Patron));
    if !is_patron {
        return Err(AppError::BadRequest(
            "Fines can only be issued to patrons".to_string(),
        ));
    }

    if let Some(item_id) = payload.item_id {
        if state.repo.get_item(item_id).await.is_none() {
            return Err(AppError::BadRequest("Item does not exist".to_string()));
        }
    }

    let fine = state.repo.create_fine(payload).await?;
    tracing::info!(fine_id = %fine.id, patron_id = %fine.patron_id, amount_cents = fine.amount_cents, "Fine issued");
    Ok((StatusCode::CREATED, Json(fine)))
}

/// pay_fine
///
/// [Librarian Route] Records payment of a fine.
#[utoipa::path(
    put,
    path = "/staff/fines/{id}/pay",
    params(("id" = Uuid, Path, description = "Fine ID")),
    responses(
        (status = 200, description = "Paid", body = Fine),
        (status = 404, description = "Not Found"),
        (status = 409, description = "Already paid")
    )
)]
pub async fn pay_fine(State(state): State<AppState>, Path(id): Path<Uuid>) -> Result<Json<Fine>> {
    if let Some(fine) = state.repo.mark_fine_paid(id).await? {
        return Ok(Json(fine));
    }

    // Nothing updated: distinguish a missing fine from one already settled.
    match state.repo.get_fine(id).await {
        Some(_) => Err(AppError::Conflict("Fine is already paid".to_string())),
        None => Err(AppError::NotFound("Fine not found".to_string())),
    }
}

// --- Staff administration ---

/// create_user
///
/// [Librarian Route] Creates an account with explicit roles. A staff role is
/// required for Staff and forbidden for Patrons.
#[utoipa::path(
    post,
    path = "/staff/users",
    request_body = CreateUserRequest,
    responses(
        (status = 201, description = "Created", body = UserProfile),
        (status = 400, description = "Invalid role combination"),
        (status = 409, description = "Email already registered")
    )
)]
pub async fn create_user(
    State(state): State<AppState>,
    Json(payload): Json<CreateUserRequest>,
) -> Result<(StatusCode, Json<UserProfile>)> {
    let staff_role: Option<StaffRole> = match (payload.user_role, payload.staff_role) {
        (UserRole::Staff, Some(role)) => Some(role),
        (UserRole::Staff, None) => {
            return Err(AppError::BadRequest(
                "Staff accounts need a staff role".to_string(),
            ));
        }
        (UserRole::Patron, Some(_)) => {
            return Err(AppError::BadRequest(
                "Patron accounts cannot have a staff role".to_string(),
            ));
        }
        (UserRole::Patron, None) => None,
    };

    let new_user = NewUser {
        email: normalize_email(&payload.email)?,
        full_name: require_non_empty(&payload.full_name, "Full name")?,
        user_role: payload.user_role,
        staff_role,
        password_hash: hash_password(&payload.password)?,
    };

    let user = state.repo.create_user(new_user).await?;
    tracing::info!(user_id = %user.id, role = %user.user_role, "Account created by librarian");
    Ok((StatusCode::CREATED, Json(user.profile())))
}

/// get_staff_stats
///
/// [Librarian Route] Dashboard counters.
#[utoipa::path(
    get,
    path = "/staff/stats",
    responses((status = 200, description = "Stats", body = StaffDashboardStats))
)]
pub async fn get_staff_stats(State(state): State<AppState>) -> Result<Json<StaffDashboardStats>> {
    Ok(Json(state.repo.get_stats().await?))
}
