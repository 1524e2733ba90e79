use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use ts_rs::TS;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::session::{StaffRole, UserRole};

// --- Core Application Schemas (Mapped to Database) ---

/// User
///
/// Account record from the `users` table. Roles are kept as the raw stored tags;
/// they are only interpreted when a `Session` is built from them.
/// Never serialized: responses go through `UserProfile`.
#[derive(Debug, Clone, FromRow, Default)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    pub full_name: String,
    // 'Staff' or 'Patron'.
    pub user_role: String,
    // 'Librarian' or 'AssistantLibrarian' for staff, NULL otherwise.
    pub staff_role: Option<String>,
    pub password_hash: String,
    pub created_at: DateTime<Utc>,
}

impl User {
    pub fn role(&self) -> Option<UserRole> {
        UserRole::parse(&self.user_role)
    }

    pub fn profile(&self) -> UserProfile {
        UserProfile {
            id: self.id,
            email: self.email.clone(),
            full_name: self.full_name.clone(),
            user_role: self.role(),
            staff_role: self.staff_role.as_deref().and_then(StaffRole::parse),
        }
    }
}

/// NewUser
///
/// Insert payload for `Repository::create_user`; the password is already hashed.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub email: String,
    pub full_name: String,
    pub user_role: UserRole,
    pub staff_role: Option<StaffRole>,
    pub password_hash: String,
}

/// ItemType
///
/// The kinds of material the catalog holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub enum ItemType {
    Book,
    Dvd,
    Magazine,
    Audiobook,
}

impl ItemType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ItemType::Book => "Book",
            ItemType::Dvd => "Dvd",
            ItemType::Magazine => "Magazine",
            ItemType::Audiobook => "Audiobook",
        }
    }
}

/// Item
///
/// A catalog entry from the `items` table.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, FromRow, Default)]
#[ts(export)]
pub struct Item {
    pub id: Uuid,
    pub title: String,
    pub author: String,
    pub isbn: Option<String>,
    pub item_type: String,
    pub publication_year: Option<i32>,
    pub total_copies: i32,
    // Copies on the shelf and not reserved by a Ready hold.
    pub available_copies: i32,
    #[ts(type = "string")]
    pub created_at: DateTime<Utc>,
    #[ts(type = "string")]
    pub updated_at: DateTime<Utc>,
}

impl Item {
    /// Applies a partial update. A change to `total_copies` moves `available_copies`
    /// by the same amount; the result may not leave fewer than zero available.
    pub fn apply_update(&self, req: &UpdateItemRequest) -> Result<Item, String> {
        let mut next = self.clone();

        if let Some(title) = &req.title {
            if title.trim().is_empty() {
                return Err("Title must not be empty".to_string());
            }
            next.title = title.trim().to_string();
        }
        if let Some(author) = &req.author {
            if author.trim().is_empty() {
                return Err("Author must not be empty".to_string());
            }
            next.author = author.trim().to_string();
        }
        if let Some(isbn) = &req.isbn {
            next.isbn = Some(isbn.clone());
        }
        if let Some(item_type) = req.item_type {
            next.item_type = item_type.as_str().to_string();
        }
        if let Some(year) = req.publication_year {
            next.publication_year = Some(year);
        }
        if let Some(total) = req.total_copies {
            if total < 0 {
                return Err("Total copies must not be negative".to_string());
            }
            let available = self.available_copies + (total - self.total_copies);
            if available < 0 {
                return Err(format!(
                    "Cannot reduce copies to {}: {} are out on loan or reserved",
                    total,
                    self.total_copies - self.available_copies
                ));
            }
            next.total_copies = total;
            next.available_copies = available;
        }

        Ok(next)
    }
}

/// HoldStatus
///
/// Lifecycle of a hold. `Pending` and `Ready` are active; the other two are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub enum HoldStatus {
    Pending,
    Ready,
    Fulfilled,
    Cancelled,
}

impl HoldStatus {
    pub const ACTIVE: [HoldStatus; 2] = [HoldStatus::Pending, HoldStatus::Ready];

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "Pending" => Some(HoldStatus::Pending),
            "Ready" => Some(HoldStatus::Ready),
            "Fulfilled" => Some(HoldStatus::Fulfilled),
            "Cancelled" => Some(HoldStatus::Cancelled),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            HoldStatus::Pending => "Pending",
            HoldStatus::Ready => "Ready",
            HoldStatus::Fulfilled => "Fulfilled",
            HoldStatus::Cancelled => "Cancelled",
        }
    }

    pub fn is_active(&self) -> bool {
        Self::ACTIVE.contains(self)
    }

    /// Change to the item's `available_copies` when moving from `self` to `next`,
    /// or `None` if the transition is not allowed.
    ///
    /// A Ready hold keeps one copy aside; fulfilling it hands that copy over, so
    /// only cancelling a Ready hold puts it back.
    pub fn transition_delta(&self, next: HoldStatus) -> Option<i32> {
        match (self, next) {
            (HoldStatus::Pending, HoldStatus::Ready) => Some(-1),
            (HoldStatus::Pending, HoldStatus::Cancelled) => Some(0),
            (HoldStatus::Ready, HoldStatus::Fulfilled) => Some(0),
            (HoldStatus::Ready, HoldStatus::Cancelled) => Some(1),
            _ => None,
        }
    }
}

/// Hold
///
/// A patron's reservation of an item, from the `holds` table.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, FromRow, Default)]
#[ts(export)]
pub struct Hold {
    pub id: Uuid,
    pub item_id: Uuid,
    pub patron_id: Uuid,
    pub status: String,
    #[ts(type = "string")]
    pub created_at: DateTime<Utc>,
    #[ts(type = "string")]
    pub updated_at: DateTime<Utc>,
    // Loaded via a JOIN on items.
    #[sqlx(default)]
    pub item_title: Option<String>,
}

impl Hold {
    pub fn status(&self) -> Option<HoldStatus> {
        HoldStatus::parse(&self.status)
    }
}

/// Largest single fine, in cents.
pub const MAX_FINE_CENTS: i64 = 1_000_000;

/// Fine
///
/// A charge against a patron, from the `fines` table. Amounts are in cents.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, FromRow, Default)]
#[ts(export)]
pub struct Fine {
    pub id: Uuid,
    pub patron_id: Uuid,
    pub item_id: Option<Uuid>,
    pub amount_cents: i64,
    pub reason: String,
    pub paid: bool,
    #[ts(type = "string")]
    pub created_at: DateTime<Utc>,
    #[ts(type = "string | null")]
    pub paid_at: Option<DateTime<Utc>>,
}

// --- Request Payloads (Input Schemas) ---

/// LoginRequest
///
/// Credentials for POST /login.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

/// RegisterRequest
///
/// Self-service signup (POST /register). Always creates a Patron account.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct RegisterRequest {
    pub email: String,
    pub password: String,
    pub full_name: String,
}

/// CreateUserRequest
///
/// Librarian-created account (POST /staff/users) with explicit roles.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct CreateUserRequest {
    pub email: String,
    pub password: String,
    pub full_name: String,
    pub user_role: UserRole,
    #[serde(default)]
    pub staff_role: Option<StaffRole>,
}

/// UpdateProfileRequest
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct UpdateProfileRequest {
    pub full_name: String,
}

/// CreateItemRequest
///
/// New catalog entry (POST /staff/items). All copies start on the shelf.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct CreateItemRequest {
    pub title: String,
    pub author: String,
    #[serde(default)]
    pub isbn: Option<String>,
    pub item_type: ItemType,
    #[serde(default)]
    pub publication_year: Option<i32>,
    pub total_copies: i32,
}

/// UpdateItemRequest
///
/// Partial update (PUT /staff/items/{id}); omitted fields are left unchanged.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct UpdateItemRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub isbn: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub item_type: Option<ItemType>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub publication_year: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_copies: Option<i32>,
}

/// UpdateHoldStatusRequest
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct UpdateHoldStatusRequest {
    pub status: HoldStatus,
}

/// CreateFineRequest
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct CreateFineRequest {
    pub patron_id: Uuid,
    #[serde(default)]
    pub item_id: Option<Uuid>,
    pub amount_cents: i64,
    pub reason: String,
}

// --- Output Schemas ---

/// LoginResponse
///
/// Everything the front end keeps in its session store after signing in.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct LoginResponse {
    pub token: String,
    pub user_id: Uuid,
    pub user_role: Option<UserRole>,
    pub staff_role: Option<StaffRole>,
    /// Seconds until the token expires.
    pub expires_in: u64,
}

/// UserProfile
///
/// Output schema for GET /me and account creation.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct UserProfile {
    pub id: Uuid,
    pub email: String,
    pub full_name: String,
    pub user_role: Option<UserRole>,
    pub staff_role: Option<StaffRole>,
}

/// FineSummary
///
/// Totals over a patron's unpaid fines (GET /me/fines/summary).
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default, PartialEq, Eq)]
#[ts(export)]
pub struct FineSummary {
    pub outstanding_cents: i64,
    pub count_unpaid: i64,
}

impl FineSummary {
    pub fn from_fines(fines: &[Fine]) -> Self {
        fines
            .iter()
            .filter(|f| !f.paid)
            .fold(FineSummary::default(), |acc, f| FineSummary {
                outstanding_cents: acc.outstanding_cents.saturating_add(f.amount_cents),
                count_unpaid: acc.count_unpaid + 1,
            })
    }
}

/// StaffDashboardStats
///
/// Output schema for GET /staff/stats.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct StaffDashboardStats {
    pub total_items: i64,
    pub total_patrons: i64,
    pub active_holds: i64,
    pub outstanding_fines_cents: i64,
}
