use crate::{
    error::{AppError, Result},
    models::{
        CreateFineRequest, CreateItemRequest, Fine, Hold, HoldStatus, Item, NewUser,
        StaffDashboardStats, UpdateItemRequest, User,
    },
};
use async_trait::async_trait;
use sqlx::{PgPool, query_builder::QueryBuilder};
use std::sync::Arc;
use uuid::Uuid;

/// Repository Trait
///
/// Defines the abstract contract for all persistence operations, so handlers and the
/// session resolver work against `Arc<dyn Repository>` without knowing whether they
/// talk to Postgres or an in-memory fake.
///
/// Read methods log and degrade (empty list / `None`); write methods and anything a
/// business rule depends on return `Result` so failures reach the caller.
#[async_trait]
pub trait Repository: Send + Sync {
    // --- Users ---
    async fn get_user(&self, id: Uuid) -> Option<User>;
    async fn get_user_by_email(&self, email: &str) -> Option<User>;
    // Conflict on duplicate email.
    async fn create_user(&self, user: NewUser) -> Result<User>;
    async fn update_user_name(&self, id: Uuid, full_name: &str) -> Option<User>;

    // --- Catalog ---
    async fn list_items(&self, search: Option<String>, item_type: Option<String>) -> Vec<Item>;
    async fn get_item(&self, id: Uuid) -> Option<Item>;
    async fn create_item(&self, req: CreateItemRequest) -> Result<Item>;
    /// Applies `changes` to the stored row in one unit of work, so copy counts are
    /// computed from the row as it is at write time. `None` if the item does not
    /// exist; BadRequest if the result would be invalid.
    async fn update_item(&self, id: Uuid, changes: &UpdateItemRequest) -> Result<Option<Item>>;
    async fn delete_item(&self, id: Uuid) -> Result<bool>;

    // --- Holds ---
    /// Creates a Pending hold. Conflict if the patron already has an active hold on
    /// the item or already has `max_active` active holds. The count and the insert
    /// are atomic per patron.
    async fn place_hold(&self, item_id: Uuid, patron_id: Uuid, max_active: i64) -> Result<Hold>;
    async fn get_hold(&self, id: Uuid) -> Option<Hold>;
    async fn list_holds_for_patron(&self, patron_id: Uuid) -> Vec<Hold>;
    async fn list_holds(&self, status: Option<HoldStatus>) -> Vec<Hold>;
    /// Moves a hold from `from` to `to` and shifts the item's available copies by
    /// `copy_delta` in one unit of work. `None` if the hold is no longer in `from`;
    /// Conflict if the item has no copy left to reserve.
    async fn transition_hold(
        &self,
        id: Uuid,
        from: HoldStatus,
        to: HoldStatus,
        copy_delta: i32,
    ) -> Result<Option<Hold>>;

    // --- Fines ---
    async fn list_fines_for_patron(&self, patron_id: Uuid) -> Vec<Fine>;
    async fn list_fines(&self, unpaid_only: bool) -> Vec<Fine>;
    async fn get_fine(&self, id: Uuid) -> Option<Fine>;
    async fn create_fine(&self, req: CreateFineRequest) -> Result<Fine>;
    // `None` if the fine does not exist or is already paid.
    async fn mark_fine_paid(&self, id: Uuid) -> Result<Option<Fine>>;

    async fn get_stats(&self) -> Result<StaffDashboardStats>;
}

/// RepositoryState
///
/// The concrete type used to share the persistence layer across the application state.
pub type RepositoryState = Arc<dyn Repository>;

const USER_COLUMNS: &str =
    "id, email, full_name, user_role, staff_role, password_hash, created_at";
const ITEM_COLUMNS: &str = "id, title, author, isbn, item_type, publication_year, total_copies, available_copies, created_at, updated_at";
const FINE_COLUMNS: &str =
    "id, patron_id, item_id, amount_cents, reason, paid, created_at, paid_at";
const HOLD_SELECT: &str = r#"SELECT h.id, h.item_id, h.patron_id, h.status, h.created_at, h.updated_at, i.title AS item_title
               FROM holds h LEFT JOIN items i ON h.item_id = i.id"#;

/// PostgresRepository
///
/// The concrete implementation of the `Repository` trait, backed by PostgreSQL.
pub struct PostgresRepository {
    pool: PgPool,
}

impl PostgresRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn conflict_on_unique(e: sqlx::Error, what: &str) -> AppError {
    match &e {
        sqlx::Error::Database(db) if db.is_unique_violation() => {
            AppError::Conflict(format!("{} already exists", what))
        }
        _ => AppError::Database(e),
    }
}

#[async_trait]
impl Repository for PostgresRepository {
    async fn get_user(&self, id: Uuid) -> Option<User> {
        sqlx::query_as::<_, User>(&format!("SELECT {} FROM users WHERE id = $1", USER_COLUMNS))
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .unwrap_or_else(|e| {
                tracing::error!("get_user error: {:?}", e);
                None
            })
    }

    async fn get_user_by_email(&self, email: &str) -> Option<User> {
        sqlx::query_as::<_, User>(&format!(
            "SELECT {} FROM users WHERE lower(email) = lower($1)",
            USER_COLUMNS
        ))
        .bind(email)
        .fetch_optional(&self.pool)
        .await
        .unwrap_or_else(|e| {
            tracing::error!("get_user_by_email error: {:?}", e);
            None
        })
    }

    async fn create_user(&self, user: NewUser) -> Result<User> {
        sqlx::query_as::<_, User>(&format!(
            r#"INSERT INTO users (id, email, full_name, user_role, staff_role, password_hash, created_at)
               VALUES ($1, $2, $3, $4, $5, $6, NOW())
               RETURNING {}"#,
            USER_COLUMNS
        ))
        .bind(Uuid::new_v4())
        .bind(&user.email)
        .bind(&user.full_name)
        .bind(user.user_role.as_str())
        .bind(user.staff_role.map(|r| r.as_str()))
        .bind(&user.password_hash)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| conflict_on_unique(e, "An account with this email"))
    }

    async fn update_user_name(&self, id: Uuid, full_name: &str) -> Option<User> {
        sqlx::query_as::<_, User>(&format!(
            "UPDATE users SET full_name = $2 WHERE id = $1 RETURNING {}",
            USER_COLUMNS
        ))
        .bind(id)
        .bind(full_name)
        .fetch_optional(&self.pool)
        .await
        .unwrap_or_else(|e| {
            tracing::error!("update_user_name error: {:?}", e);
            None
        })
    }

    /// list_items
    ///
    /// Catalog search built with QueryBuilder so user input is always bound, never
    /// spliced into the SQL.
    async fn list_items(&self, search: Option<String>, item_type: Option<String>) -> Vec<Item> {
        let mut builder: QueryBuilder<sqlx::Postgres> =
            QueryBuilder::new(format!("SELECT {} FROM items WHERE TRUE", ITEM_COLUMNS));

        if let Some(t) = item_type {
            builder.push(" AND item_type = ");
            builder.push_bind(t);
        }

        if let Some(s) = search {
            let pattern = format!("%{}%", s);
            builder.push(" AND (title ILIKE ");
            builder.push_bind(pattern.clone());
            builder.push(" OR author ILIKE ");
            builder.push_bind(pattern.clone());
            builder.push(" OR isbn ILIKE ");
            builder.push_bind(pattern);
            builder.push(")");
        }

        builder.push(" ORDER BY title ASC");

        match builder.build_query_as::<Item>().fetch_all(&self.pool).await {
            Ok(items) => items,
            Err(e) => {
                tracing::error!("list_items error: {:?}", e);
                vec![]
            }
        }
    }

    async fn get_item(&self, id: Uuid) -> Option<Item> {
        sqlx::query_as::<_, Item>(&format!("SELECT {} FROM items WHERE id = $1", ITEM_COLUMNS))
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .unwrap_or_else(|e| {
                tracing::error!("get_item error: {:?}", e);
                None
            })
    }

    async fn create_item(&self, req: CreateItemRequest) -> Result<Item> {
        let item = sqlx::query_as::<_, Item>(&format!(
            r#"INSERT INTO items (id, title, author, isbn, item_type, publication_year, total_copies, available_copies, created_at, updated_at)
               VALUES ($1, $2, $3, $4, $5, $6, $7, $7, NOW(), NOW())
               RETURNING {}"#,
            ITEM_COLUMNS
        ))
        .bind(Uuid::new_v4())
        .bind(&req.title)
        .bind(&req.author)
        .bind(&req.isbn)
        .bind(req.item_type.as_str())
        .bind(req.publication_year)
        .bind(req.total_copies)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| conflict_on_unique(e, "An item with this ISBN"))?;
        Ok(item)
    }

    async fn update_item(&self, id: Uuid, changes: &UpdateItemRequest) -> Result<Option<Item>> {
        let mut tx = self.pool.begin().await?;

        // Row lock: a hold transition touching this item waits for the commit.
        let current = sqlx::query_as::<_, Item>(&format!(
            "SELECT {} FROM items WHERE id = $1 FOR UPDATE",
            ITEM_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(current) = current else {
            return Ok(None);
        };
        let next = current.apply_update(changes).map_err(AppError::BadRequest)?;

        let saved = sqlx::query_as::<_, Item>(&format!(
            r#"UPDATE items
               SET title = $2, author = $3, isbn = $4, item_type = $5, publication_year = $6,
                   total_copies = $7, available_copies = $8, updated_at = NOW()
               WHERE id = $1
               RETURNING {}"#,
            ITEM_COLUMNS
        ))
        .bind(id)
        .bind(&next.title)
        .bind(&next.author)
        .bind(&next.isbn)
        .bind(&next.item_type)
        .bind(next.publication_year)
        .bind(next.total_copies)
        .bind(next.available_copies)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| conflict_on_unique(e, "An item with this ISBN"))?;

        tx.commit().await?;
        Ok(Some(saved))
    }

    async fn delete_item(&self, id: Uuid) -> Result<bool> {
        let res = sqlx::query("DELETE FROM items WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(res.rows_affected() > 0)
    }

    async fn place_hold(&self, item_id: Uuid, patron_id: Uuid, max_active: i64) -> Result<Hold> {
        let mut tx = self.pool.begin().await?;

        // Locking the patron row serialises concurrent placements by the same patron.
        sqlx::query("SELECT id FROM users WHERE id = $1 FOR UPDATE")
            .bind(patron_id)
            .execute(&mut *tx)
            .await?;

        let active = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM holds WHERE patron_id = $1 AND status IN ('Pending', 'Ready')",
        )
        .bind(patron_id)
        .fetch_one(&mut *tx)
        .await?;

        if active >= max_active {
            return Err(AppError::Conflict(format!("Hold limit of {} reached", max_active)));
        }

        // CTE so the returned row carries the item title like every other hold read.
        let hold = sqlx::query_as::<_, Hold>(
            r#"
            WITH inserted AS (
                INSERT INTO holds (id, item_id, patron_id, status, created_at, updated_at)
                VALUES ($1, $2, $3, 'Pending', NOW(), NOW())
                RETURNING id, item_id, patron_id, status, created_at, updated_at
            )
            SELECT h.id, h.item_id, h.patron_id, h.status, h.created_at, h.updated_at, i.title AS item_title
            FROM inserted h JOIN items i ON h.item_id = i.id
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(item_id)
        .bind(patron_id)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| conflict_on_unique(e, "An active hold on this item"))?;

        tx.commit().await?;
        Ok(hold)
    }

    async fn get_hold(&self, id: Uuid) -> Option<Hold> {
        sqlx::query_as::<_, Hold>(&format!("{} WHERE h.id = $1", HOLD_SELECT))
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .unwrap_or_else(|e| {
                tracing::error!("get_hold error: {:?}", e);
                None
            })
    }

    async fn list_holds_for_patron(&self, patron_id: Uuid) -> Vec<Hold> {
        sqlx::query_as::<_, Hold>(&format!(
            "{} WHERE h.patron_id = $1 ORDER BY h.created_at DESC",
            HOLD_SELECT
        ))
        .bind(patron_id)
        .fetch_all(&self.pool)
        .await
        .unwrap_or_else(|e| {
            tracing::error!("list_holds_for_patron error: {:?}", e);
            vec![]
        })
    }

    async fn list_holds(&self, status: Option<HoldStatus>) -> Vec<Hold> {
        let mut builder: QueryBuilder<sqlx::Postgres> = QueryBuilder::new(HOLD_SELECT);
        if let Some(s) = status {
            builder.push(" WHERE h.status = ");
            builder.push_bind(s.as_str());
        }
        builder.push(" ORDER BY h.created_at ASC");

        match builder.build_query_as::<Hold>().fetch_all(&self.pool).await {
            Ok(holds) => holds,
            Err(e) => {
                tracing::error!("list_holds error: {:?}", e);
                vec![]
            }
        }
    }

    async fn transition_hold(
        &self,
        id: Uuid,
        from: HoldStatus,
        to: HoldStatus,
        copy_delta: i32,
    ) -> Result<Option<Hold>> {
        let mut tx = self.pool.begin().await?;

        let item_id = sqlx::query_scalar::<_, Uuid>(
            "UPDATE holds SET status = $3, updated_at = NOW() WHERE id = $1 AND status = $2 RETURNING item_id",
        )
        .bind(id)
        .bind(from.as_str())
        .bind(to.as_str())
        .fetch_optional(&mut *tx)
        .await?;

        let Some(item_id) = item_id else {
            return Ok(None);
        };

        if copy_delta != 0 {
            let adjusted = sqlx::query(
                "UPDATE items SET available_copies = available_copies + $2, updated_at = NOW() WHERE id = $1 AND available_copies + $2 >= 0",
            )
            .bind(item_id)
            .bind(copy_delta)
            .execute(&mut *tx)
            .await?;

            if adjusted.rows_affected() == 0 {
                // Dropping the transaction rolls the status change back.
                return Err(AppError::Conflict("No copy available to reserve".to_string()));
            }
        }

        // Read back inside the transaction so the answer matches what was committed.
        let hold = sqlx::query_as::<_, Hold>(&format!("{} WHERE h.id = $1", HOLD_SELECT))
            .bind(id)
            .fetch_one(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(Some(hold))
    }

    async fn list_fines_for_patron(&self, patron_id: Uuid) -> Vec<Fine> {
        sqlx::query_as::<_, Fine>(&format!(
            "SELECT {} FROM fines WHERE patron_id = $1 ORDER BY created_at DESC",
            FINE_COLUMNS
        ))
        .bind(patron_id)
        .fetch_all(&self.pool)
        .await
        .unwrap_or_else(|e| {
            tracing::error!("list_fines_for_patron error: {:?}", e);
            vec![]
        })
    }

    async fn list_fines(&self, unpaid_only: bool) -> Vec<Fine> {
        sqlx::query_as::<_, Fine>(&format!(
            "SELECT {} FROM fines WHERE (NOT $1 OR paid = false) ORDER BY created_at DESC",
            FINE_COLUMNS
        ))
        .bind(unpaid_only)
        .fetch_all(&self.pool)
        .await
        .unwrap_or_else(|e| {
            tracing::error!("list_fines error: {:?}", e);
            vec![]
        })
    }

    async fn get_fine(&self, id: Uuid) -> Option<Fine> {
        sqlx::query_as::<_, Fine>(&format!("SELECT {} FROM fines WHERE id = $1", FINE_COLUMNS))
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .unwrap_or_else(|e| {
                tracing::error!("get_fine error: {:?}", e);
                None
            })
    }

    async fn create_fine(&self, req: CreateFineRequest) -> Result<Fine> {
        let fine = sqlx::query_as::<_, Fine>(&format!(
            r#"INSERT INTO fines (id, patron_id, item_id, amount_cents, reason, paid, created_at)
               VALUES ($1, $2, $3, $4, $5, false, NOW())
               RETURNING {}"#,
            FINE_COLUMNS
        ))
        .bind(Uuid::new_v4())
        .bind(req.patron_id)
        .bind(req.item_id)
        .bind(req.amount_cents)
        .bind(&req.reason)
        .fetch_one(&self.pool)
        .await?;
        Ok(fine)
    }

    async fn mark_fine_paid(&self, id: Uuid) -> Result<Option<Fine>> {
        let fine = sqlx::query_as::<_, Fine>(&format!(
            "UPDATE fines SET paid = true, paid_at = NOW() WHERE id = $1 AND paid = false RETURNING {}",
            FINE_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(fine)
    }

    /// get_stats
    ///
    /// Compiles the staff dashboard counters in one round trip.
    async fn get_stats(&self) -> Result<StaffDashboardStats> {
        let (total_items, total_patrons, active_holds, outstanding_fines_cents) =
            sqlx::query_as::<_, (i64, i64, i64, i64)>(
                r#"SELECT
                    (SELECT COUNT(*) FROM items),
                    (SELECT COUNT(*) FROM users WHERE user_role = 'Patron'),
                    (SELECT COUNT(*) FROM holds WHERE status IN ('Pending', 'Ready')),
                    (SELECT COALESCE(SUM(amount_cents), 0)::BIGINT FROM fines WHERE paid = false)"#,
            )
            .fetch_one(&self.pool)
            .await?;

        Ok(StaffDashboardStats {
            total_items,
            total_patrons,
            active_holds,
            outstanding_fines_cents,
        })
    }
}
