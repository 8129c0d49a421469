use chrono::Utc;
use sea_orm::sea_query::{Expr, Query, SimpleExpr, SubQueryStatement};
use sea_orm::{
    ColumnTrait, Condition, DatabaseConnection, DbErr, EntityTrait, PaginatorTrait, QueryFilter,
    QueryOrder, Set, SqlErr,
};
use std::future::Future;
use std::time::Duration;
use tracing::warn;
use uuid::Uuid;

use crate::db::credential_store::{
    CredentialStore, DeleteOutcome, NewUser, StoreError, User, UserChanges,
};
use crate::entities::users;

pub struct UserRepository {
    conn: DatabaseConnection,
    timeout: Duration,
}

impl UserRepository {
    #[must_use]
    pub const fn new(conn: DatabaseConnection, timeout: Duration) -> Self {
        Self { conn, timeout }
    }

    /// Runs a store operation under the configured deadline.
    async fn bounded<T, F>(&self, operation: &'static str, fut: F) -> Result<T, StoreError>
    where
        F: Future<Output = Result<T, DbErr>>,
    {
        match tokio::time::timeout(self.timeout, fut).await {
            Ok(result) => result.map_err(|err| map_db_err(operation, err)),
            Err(_) => {
                warn!(operation, timeout = ?self.timeout, "Store operation timed out");
                Err(StoreError::Unavailable(format!(
                    "{operation} timed out after {:?}",
                    self.timeout
                )))
            }
        }
    }
}

fn map_db_err(operation: &str, err: DbErr) -> StoreError {
    if matches!(err.sql_err(), Some(SqlErr::UniqueConstraintViolation(_))) {
        return StoreError::Conflict;
    }
    StoreError::Unavailable(format!("{operation}: {err}"))
}

/// `(SELECT COUNT(id) FROM users WHERE is_admin) > 1`, evaluated inside the
/// DELETE so the check and the write see the same snapshot.
fn more_than_one_admin() -> SimpleExpr {
    let admin_count = Query::select()
        .expr(Expr::col(users::Column::Id).count())
        .from(users::Entity)
        .and_where(users::Column::IsAdmin.eq(true))
        .to_owned();

    Expr::expr(SimpleExpr::SubQuery(
        None,
        Box::new(SubQueryStatement::SelectStatement(admin_count)),
    ))
    .gt(1)
}

#[async_trait::async_trait]
impl CredentialStore for UserRepository {
    async fn find_by_username(&self, username: &str) -> Result<User, StoreError> {
        let user = self
            .bounded(
                "find_by_username",
                users::Entity::find()
                    .filter(users::Column::Username.eq(username))
                    .one(&self.conn),
            )
            .await?;

        user.map(User::from).ok_or(StoreError::NotFound)
    }

    async fn find_by_id(&self, id: &str) -> Result<User, StoreError> {
        let user = self
            .bounded(
                "find_by_id",
                users::Entity::find_by_id(id.to_string()).one(&self.conn),
            )
            .await?;

        user.map(User::from).ok_or(StoreError::NotFound)
    }

    async fn list_all(&self) -> Result<Vec<User>, StoreError> {
        let users = self
            .bounded(
                "list_all",
                users::Entity::find()
                    .order_by_asc(users::Column::CreatedAt)
                    .order_by_asc(users::Column::Username)
                    .all(&self.conn),
            )
            .await?;

        Ok(users.into_iter().map(User::from).collect())
    }

    async fn count_all(&self) -> Result<u64, StoreError> {
        self.bounded("count_all", users::Entity::find().count(&self.conn))
            .await
    }

    async fn count_admins(&self) -> Result<u64, StoreError> {
        self.bounded(
            "count_admins",
            users::Entity::find()
                .filter(users::Column::IsAdmin.eq(true))
                .count(&self.conn),
        )
        .await
    }

    async fn insert(&self, user: NewUser) -> Result<String, StoreError> {
        let id = Uuid::new_v4().to_string();
        let now = Utc::now();

        let active = users::ActiveModel {
            id: Set(id.clone()),
            username: Set(user.username),
            email: Set(user.email),
            password_hash: Set(user.password_hash),
            is_admin: Set(user.is_admin),
            must_change_password: Set(user.must_change_password),
            created_at: Set(now),
            updated_at: Set(now),
        };

        self.bounded(
            "insert",
            users::Entity::insert(active).exec_without_returning(&self.conn),
        )
        .await?;

        Ok(id)
    }

    async fn update_fields(&self, id: &str, changes: UserChanges) -> Result<User, StoreError> {
        // Single statement; `updated_at` never moves backwards.
        let mut update = users::Entity::update_many()
            .col_expr(
                users::Column::UpdatedAt,
                Expr::cust_with_values("MAX(?, \"updated_at\")", [Utc::now()]),
            )
            .filter(users::Column::Id.eq(id));

        if let Some(email) = changes.email {
            update = update.col_expr(users::Column::Email, Expr::value(email));
        }
        if let Some(password_hash) = changes.password_hash {
            update = update.col_expr(users::Column::PasswordHash, Expr::value(password_hash));
        }
        if let Some(is_admin) = changes.is_admin {
            update = update.col_expr(users::Column::IsAdmin, Expr::value(is_admin));
        }
        if let Some(must_change) = changes.must_change_password {
            update = update.col_expr(users::Column::MustChangePassword, Expr::value(must_change));
        }

        let result = self.bounded("update_fields", update.exec(&self.conn)).await?;
        if result.rows_affected == 0 {
            return Err(StoreError::NotFound);
        }

        self.find_by_id(id).await
    }

    async fn delete(&self, id: &str) -> Result<(), StoreError> {
        let result = self
            .bounded(
                "delete",
                users::Entity::delete_by_id(id.to_string()).exec(&self.conn),
            )
            .await?;

        if result.rows_affected == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    async fn delete_unless_last_admin(&self, id: &str) -> Result<DeleteOutcome, StoreError> {
        let result = self
            .bounded(
                "delete_unless_last_admin",
                users::Entity::delete_many()
                    .filter(users::Column::Id.eq(id))
                    .filter(
                        Condition::any()
                            .add(users::Column::IsAdmin.eq(false))
                            .add(more_than_one_admin()),
                    )
                    .exec(&self.conn),
            )
            .await?;

        if result.rows_affected > 0 {
            return Ok(DeleteOutcome::Deleted);
        }

        match self.find_by_id(id).await {
            Ok(_) => Ok(DeleteOutcome::LastAdmin),
            Err(StoreError::NotFound) => Ok(DeleteOutcome::NotFound),
            Err(err) => Err(err),
        }
    }
}
