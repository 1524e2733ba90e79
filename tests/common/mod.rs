#![allow(dead_code)]

use async_trait::async_trait;
use axum::{Router, body::Body, http::Request};
use chrono::Utc;
use library_portal::{
    AppConfig, AppState, create_router,
    error::{AppError, Result},
    models::{
        CreateFineRequest, CreateItemRequest, Fine, Hold, HoldStatus, Item, NewUser,
        StaffDashboardStats, UpdateItemRequest, User,
    },
    repository::{Repository, RepositoryState},
};
use std::sync::{
    Arc, Mutex,
    atomic::{AtomicBool, Ordering},
};
use uuid::Uuid;

pub const TEST_JWT_SECRET: &str = "test-secret-value-1234567890";

// --- In-memory repository ---

#[derive(Default)]
struct Store {
    users: Vec<User>,
    items: Vec<Item>,
    holds: Vec<Hold>,
    fines: Vec<Fine>,
}

/// A `Repository` backed by vectors behind a mutex, mirroring the Postgres
/// implementation's rules (unique emails, one active hold per item, copy counts).
#[derive(Default)]
pub struct InMemoryRepository {
    store: Mutex<Store>,
    offline: AtomicBool,
}

impl InMemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn seed_user(&self, user_role: &str, staff_role: Option<&str>) -> User {
        self.seed_user_with_hash(user_role, staff_role, "")
    }

    pub fn seed_user_with_hash(
        &self,
        user_role: &str,
        staff_role: Option<&str>,
        password_hash: &str,
    ) -> User {
        let id = Uuid::new_v4();
        let user = User {
            id,
            email: format!("{}@library.test", id.simple()),
            full_name: format!("{} user", user_role),
            user_role: user_role.to_string(),
            staff_role: staff_role.map(str::to_string),
            password_hash: password_hash.to_string(),
            created_at: Utc::now(),
        };
        self.store.lock().unwrap().users.push(user.clone());
        user
    }

    pub fn seed_item(&self, title: &str, copies: i32) -> Item {
        let item = Item {
            id: Uuid::new_v4(),
            title: title.to_string(),
            author: "Test Author".to_string(),
            isbn: None,
            item_type: "Book".to_string(),
            publication_year: Some(2020),
            total_copies: copies,
            available_copies: copies,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        self.store.lock().unwrap().items.push(item.clone());
        item
    }

    pub fn seed_fine(&self, patron_id: Uuid, amount_cents: i64, paid: bool) -> Fine {
        let fine = Fine {
            id: Uuid::new_v4(),
            patron_id,
            item_id: None,
            amount_cents,
            reason: "Overdue".to_string(),
            paid,
            created_at: Utc::now(),
            paid_at: paid.then(Utc::now),
        };
        self.store.lock().unwrap().fines.push(fine.clone());
        fine
    }

    pub fn remove_user(&self, id: Uuid) {
        self.store.lock().unwrap().users.retain(|u| u.id != id);
    }

    pub fn set_staff_role(&self, id: Uuid, staff_role: Option<&str>) {
        let mut store = self.store.lock().unwrap();
        if let Some(user) = store.users.iter_mut().find(|u| u.id == id) {
            user.staff_role = staff_role.map(str::to_string);
        }
    }

    pub fn item_snapshot(&self, id: Uuid) -> Option<Item> {
        self.store.lock().unwrap().items.iter().find(|i| i.id == id).cloned()
    }

    /// Makes every fallible write fail as if the database were unreachable.
    pub fn go_offline(&self) {
        self.offline.store(true, Ordering::SeqCst);
    }

    pub fn user_count(&self) -> usize {
        self.store.lock().unwrap().users.len()
    }

    pub fn active_hold_count(&self, patron_id: Uuid) -> usize {
        self.store
            .lock()
            .unwrap()
            .holds
            .iter()
            .filter(|h| h.patron_id == patron_id && is_active(h))
            .count()
    }

    fn check_online(&self) -> Result<()> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(AppError::Database(sqlx::Error::PoolTimedOut));
        }
        Ok(())
    }

    fn with_title(store: &Store, mut hold: Hold) -> Hold {
        hold.item_title = store
            .items
            .iter()
            .find(|i| i.id == hold.item_id)
            .map(|i| i.title.clone());
        hold
    }
}

fn is_active(hold: &Hold) -> bool {
    hold.status().is_some_and(|s| s.is_active())
}

#[async_trait]
impl Repository for InMemoryRepository {
    async fn get_user(&self, id: Uuid) -> Option<User> {
        self.store.lock().unwrap().users.iter().find(|u| u.id == id).cloned()
    }

    async fn get_user_by_email(&self, email: &str) -> Option<User> {
        self.store
            .lock()
            .unwrap()
            .users
            .iter()
            .find(|u| u.email.eq_ignore_ascii_case(email))
            .cloned()
    }

    async fn create_user(&self, user: NewUser) -> Result<User> {
        let mut store = self.store.lock().unwrap();
        if store.users.iter().any(|u| u.email.eq_ignore_ascii_case(&user.email)) {
            return Err(AppError::Conflict(
                "An account with this email already exists".to_string(),
            ));
        }
        let created = User {
            id: Uuid::new_v4(),
            email: user.email,
            full_name: user.full_name,
            user_role: user.user_role.as_str().to_string(),
            staff_role: user.staff_role.map(|r| r.as_str().to_string()),
            password_hash: user.password_hash,
            created_at: Utc::now(),
        };
        store.users.push(created.clone());
        Ok(created)
    }

    async fn update_user_name(&self, id: Uuid, full_name: &str) -> Option<User> {
        let mut store = self.store.lock().unwrap();
        let user = store.users.iter_mut().find(|u| u.id == id)?;
        user.full_name = full_name.to_string();
        Some(user.clone())
    }

    async fn list_items(&self, search: Option<String>, item_type: Option<String>) -> Vec<Item> {
        let store = self.store.lock().unwrap();
        let needle = search.map(|s| s.to_lowercase());
        let mut items: Vec<Item> = store
            .items
            .iter()
            .filter(|i| item_type.as_ref().is_none_or(|t| &i.item_type == t))
            .filter(|i| {
                needle.as_ref().is_none_or(|n| {
                    i.title.to_lowercase().contains(n)
                        || i.author.to_lowercase().contains(n)
                        || i.isbn.as_ref().is_some_and(|isbn| isbn.to_lowercase().contains(n))
                })
            })
            .cloned()
            .collect();
        items.sort_by(|a, b| a.title.cmp(&b.title));
        items
    }

    async fn get_item(&self, id: Uuid) -> Option<Item> {
        self.item_snapshot(id)
    }

    async fn create_item(&self, req: CreateItemRequest) -> Result<Item> {
        let item = Item {
            id: Uuid::new_v4(),
            title: req.title,
            author: req.author,
            isbn: req.isbn,
            item_type: req.item_type.as_str().to_string(),
            publication_year: req.publication_year,
            total_copies: req.total_copies,
            available_copies: req.total_copies,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        self.store.lock().unwrap().items.push(item.clone());
        Ok(item)
    }

    async fn update_item(&self, id: Uuid, changes: &UpdateItemRequest) -> Result<Option<Item>> {
        self.check_online()?;
        let mut store = self.store.lock().unwrap();
        let Some(slot) = store.items.iter_mut().find(|i| i.id == id) else {
            return Ok(None);
        };
        let next = slot.apply_update(changes).map_err(AppError::BadRequest)?;
        *slot = Item {
            updated_at: Utc::now(),
            ..next
        };
        Ok(Some(slot.clone()))
    }

    async fn delete_item(&self, id: Uuid) -> Result<bool> {
        let mut store = self.store.lock().unwrap();
        let before = store.items.len();
        store.items.retain(|i| i.id != id);
        store.holds.retain(|h| h.item_id != id);
        Ok(store.items.len() < before)
    }

    async fn place_hold(&self, item_id: Uuid, patron_id: Uuid, max_active: i64) -> Result<Hold> {
        self.check_online()?;
        let mut store = self.store.lock().unwrap();
        let active: Vec<&Hold> = store
            .holds
            .iter()
            .filter(|h| h.patron_id == patron_id && is_active(h))
            .collect();
        if active.len() as i64 >= max_active {
            return Err(AppError::Conflict(format!("Hold limit of {} reached", max_active)));
        }
        if active.iter().any(|h| h.item_id == item_id) {
            return Err(AppError::Conflict(
                "An active hold on this item already exists".to_string(),
            ));
        }
        let hold = Hold {
            id: Uuid::new_v4(),
            item_id,
            patron_id,
            status: HoldStatus::Pending.as_str().to_string(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
            item_title: None,
        };
        store.holds.push(hold.clone());
        Ok(Self::with_title(&store, hold))
    }

    async fn get_hold(&self, id: Uuid) -> Option<Hold> {
        let store = self.store.lock().unwrap();
        let hold = store.holds.iter().find(|h| h.id == id).cloned()?;
        Some(Self::with_title(&store, hold))
    }

    async fn list_holds_for_patron(&self, patron_id: Uuid) -> Vec<Hold> {
        let store = self.store.lock().unwrap();
        let mut holds: Vec<Hold> = store
            .holds
            .iter()
            .filter(|h| h.patron_id == patron_id)
            .cloned()
            .map(|h| Self::with_title(&store, h))
            .collect();
        holds.reverse();
        holds
    }

    async fn list_holds(&self, status: Option<HoldStatus>) -> Vec<Hold> {
        let store = self.store.lock().unwrap();
        store
            .holds
            .iter()
            .filter(|h| status.is_none_or(|s| h.status == s.as_str()))
            .cloned()
            .map(|h| Self::with_title(&store, h))
            .collect()
    }

    async fn transition_hold(
        &self,
        id: Uuid,
        from: HoldStatus,
        to: HoldStatus,
        copy_delta: i32,
    ) -> Result<Option<Hold>> {
        self.check_online()?;
        let mut store = self.store.lock().unwrap();
        let Some(hold_idx) = store
            .holds
            .iter()
            .position(|h| h.id == id && h.status == from.as_str())
        else {
            return Ok(None);
        };
        let item_id = store.holds[hold_idx].item_id;

        if copy_delta != 0 {
            let Some(item) = store.items.iter_mut().find(|i| i.id == item_id) else {
                return Err(AppError::Conflict("No copy available to reserve".to_string()));
            };
            if item.available_copies + copy_delta < 0 {
                return Err(AppError::Conflict("No copy available to reserve".to_string()));
            }
            item.available_copies += copy_delta;
        }

        let hold = &mut store.holds[hold_idx];
        hold.status = to.as_str().to_string();
        hold.updated_at = Utc::now();
        let hold = hold.clone();
        Ok(Some(Self::with_title(&store, hold)))
    }

    async fn list_fines_for_patron(&self, patron_id: Uuid) -> Vec<Fine> {
        self.store
            .lock()
            .unwrap()
            .fines
            .iter()
            .filter(|f| f.patron_id == patron_id)
            .cloned()
            .collect()
    }

    async fn list_fines(&self, unpaid_only: bool) -> Vec<Fine> {
        self.store
            .lock()
            .unwrap()
            .fines
            .iter()
            .filter(|f| !unpaid_only || !f.paid)
            .cloned()
            .collect()
    }

    async fn get_fine(&self, id: Uuid) -> Option<Fine> {
        self.store.lock().unwrap().fines.iter().find(|f| f.id == id).cloned()
    }

    async fn create_fine(&self, req: CreateFineRequest) -> Result<Fine> {
        let fine = Fine {
            id: Uuid::new_v4(),
            patron_id: req.patron_id,
            item_id: req.item_id,
            amount_cents: req.amount_cents,
            reason: req.reason,
            paid: false,
            created_at: Utc::now(),
            paid_at: None,
        };
        self.store.lock().unwrap().fines.push(fine.clone());
        Ok(fine)
    }

    async fn mark_fine_paid(&self, id: Uuid) -> Result<Option<Fine>> {
        let mut store = self.store.lock().unwrap();
        let Some(fine) = store.fines.iter_mut().find(|f| f.id == id && !f.paid) else {
            return Ok(None);
        };
        fine.paid = true;
        fine.paid_at = Some(Utc::now());
        Ok(Some(fine.clone()))
    }

    async fn get_stats(&self) -> Result<StaffDashboardStats> {
        self.check_online()?;
        let store = self.store.lock().unwrap();
        Ok(StaffDashboardStats {
            total_items: store.items.len() as i64,
            total_patrons: store.users.iter().filter(|u| u.user_role == "Patron").count() as i64,
            active_holds: store.holds.iter().filter(|h| is_active(h)).count() as i64,
            outstanding_fines_cents: store
                .fines
                .iter()
                .filter(|f| !f.paid)
                .map(|f| f.amount_cents)
                .sum(),
        })
    }
}

// --- App helpers ---

pub fn test_config() -> AppConfig {
    AppConfig {
        jwt_secret: TEST_JWT_SECRET.to_string(),
        ..AppConfig::default()
    }
}

pub fn app_state(repo: Arc<InMemoryRepository>, config: AppConfig) -> AppState {
    AppState {
        repo: repo as RepositoryState,
        config,
    }
}

pub fn app(repo: Arc<InMemoryRepository>) -> Router {
    create_router(app_state(repo, test_config()))
}

/// A request authenticated through the local `x-user-id` bypass.
pub fn request_as(method: &str, uri: &str, user_id: Option<Uuid>, body: Option<serde_json::Value>) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(id) = user_id {
        builder = builder.header("x-user-id", id.to_string());
    }
    match body {
        Some(json) => builder
            .header("Content-Type", "application/json")
            .body(Body::from(json.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

pub async fn body_json<T: serde::de::DeserializeOwned>(response: axum::response::Response) -> T {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}
