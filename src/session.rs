use serde::{Deserialize, Serialize};
use ts_rs::TS;
use utoipa::ToSchema;

/// UserRole
///
/// The coarse role of an account. Stored as the exact strings `"Staff"` and
/// `"Patron"` in the `users.user_role` column and in JSON payloads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub enum UserRole {
    Staff,
    Patron,
}

impl UserRole {
    /// Parses a stored role tag. Only the exact tags are recognised; anything
    /// else (other casing, padding, empty) yields `None`.
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "Staff" => Some(UserRole::Staff),
            "Patron" => Some(UserRole::Patron),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            UserRole::Staff => "Staff",
            UserRole::Patron => "Patron",
        }
    }
}

/// StaffRole
///
/// Fine-grained role, only meaningful when the account is `UserRole::Staff`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub enum StaffRole {
    Librarian,
    AssistantLibrarian,
}

impl StaffRole {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "Librarian" => Some(StaffRole::Librarian),
            "AssistantLibrarian" => Some(StaffRole::AssistantLibrarian),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            StaffRole::Librarian => "Librarian",
            StaffRole::AssistantLibrarian => "AssistantLibrarian",
        }
    }
}

/// Session
///
/// The credential and role state of the caller for one navigation. The guard only
/// ever reads it; it is rebuilt from the request every time.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Session {
    /// Opaque credential. `None` or empty means unauthenticated.
    pub token: Option<String>,
    pub user_role: Option<UserRole>,
    /// Ignored unless `user_role` is `Staff`.
    pub staff_role: Option<StaffRole>,
}

impl Session {
    /// A session with no credential at all.
    pub fn anonymous() -> Self {
        Self::default()
    }

    /// Builds a session from raw store values. Unknown role strings are dropped,
    /// so they can never satisfy a role comparison.
    pub fn from_raw(token: Option<&str>, user_role: Option<&str>, staff_role: Option<&str>) -> Self {
        Session {
            token: token.filter(|t| !t.is_empty()).map(str::to_owned),
            user_role: user_role.and_then(UserRole::parse),
            staff_role: staff_role.and_then(StaffRole::parse),
        }
    }

    pub fn is_authenticated(&self) -> bool {
        self.token.as_deref().is_some_and(|t| !t.is_empty())
    }

    /// token present AND Staff AND Librarian.
    pub fn is_librarian(&self) -> bool {
        self.is_authenticated()
            && self.user_role == Some(UserRole::Staff)
            && self.staff_role == Some(StaffRole::Librarian)
    }
}

/// SessionStore
///
/// Read interface over wherever the raw session values live. Values are raw
/// strings; [`SessionStore::session`] is the only place they are interpreted.
pub trait SessionStore {
    fn token(&self) -> Option<&str>;
    fn user_role(&self) -> Option<&str>;
    fn staff_role(&self) -> Option<&str>;

    /// Snapshot of the current values as a typed `Session`.
    fn session(&self) -> Session {
        Session::from_raw(self.token(), self.user_role(), self.staff_role())
    }
}
