use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::{FromRow, PgExecutor, PgPool, Postgres, Transaction};

use crate::database::manager::DatabaseError;
use crate::database::repository::Entity;
use crate::filter::EntitySpec;

#[derive(Debug, Clone, FromRow)]
pub struct User {
    pub id: i64,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub mobile_number: String,
    pub password_hash: String,
    pub is_active: bool,
    pub is_locked: bool,
    pub activation_token: Option<String>,
    pub activation_expires_at: Option<DateTime<Utc>>,
    pub reset_token: Option<String>,
    pub reset_expires_at: Option<DateTime<Utc>>,
    pub reset_request_count: i32,
    pub last_reset_request_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Entity for User {
    const NOUN: &'static str = "User";

    fn spec() -> EntitySpec {
        EntitySpec::new("users")
            .search(["first_name", "last_name", "email"])
            .filters(["id", "is_active", "is_locked", "email", "mobile_number"])
    }
}

pub struct NewUser<'a> {
    pub first_name: &'a str,
    pub last_name: &'a str,
    pub email: &'a str,
    pub mobile_number: &'a str,
    pub password_hash: &'a str,
    pub is_active: bool,
    pub activation_token: Option<&'a str>,
    pub activation_expires_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct MonthlyCount {
    pub month: String,
    pub count: i64,
    pub month_num: i32,
}

impl User {
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }

    pub async fn find_by_email(pool: &PgPool, email: &str) -> Result<Option<User>, DatabaseError> {
        Ok(sqlx::query_as::<_, User>("SELECT * FROM users WHERE email = $1")
            .bind(email)
            .fetch_optional(pool)
            .await?)
    }

    pub async fn insert<'e>(executor: impl PgExecutor<'e>, user: NewUser<'_>) -> Result<i64, DatabaseError> {
        sqlx::query_scalar::<_, i64>(
            r#"INSERT INTO users
                   (first_name, last_name, email, mobile_number, password_hash, is_active,
                    activation_token, activation_expires_at)
               VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
               RETURNING id"#,
        )
        .bind(user.first_name)
        .bind(user.last_name)
        .bind(user.email)
        .bind(user.mobile_number)
        .bind(user.password_hash)
        .bind(user.is_active)
        .bind(user.activation_token)
        .bind(user.activation_expires_at)
        .fetch_one(executor)
        .await
        .map_err(|e| DatabaseError::on_write(e, "Email or mobile number already exists"))
    }

    pub async fn activate(pool: &PgPool, id: i64) -> Result<(), DatabaseError> {
        sqlx::query(
            r#"UPDATE users
               SET is_active = TRUE, is_locked = FALSE, activation_token = NULL,
                   activation_expires_at = NULL, updated_at = NOW()
               WHERE id = $1"#,
        )
        .bind(id)
        .execute(pool)
        .await?;
        Ok(())
    }

    pub async fn lock(pool: &PgPool, id: i64) -> Result<(), DatabaseError> {
        sqlx::query("UPDATE users SET is_locked = TRUE, updated_at = NOW() WHERE id = $1")
            .bind(id)
            .execute(pool)
            .await?;
        Ok(())
    }

    /// Stores a reset token digest and counts the request.
    pub async fn record_reset_request(
        pool: &PgPool,
        id: i64,
        token_digest: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<(), DatabaseError> {
        sqlx::query(
            r#"UPDATE users
               SET reset_token = $2, reset_expires_at = $3,
                   reset_request_count = reset_request_count + 1,
                   last_reset_request_at = NOW(), updated_at = NOW()
               WHERE id = $1"#,
        )
        .bind(id)
        .bind(token_digest)
        .bind(expires_at)
        .execute(pool)
        .await?;
        Ok(())
    }

    pub async fn reset_password(pool: &PgPool, id: i64, password_hash: &str) -> Result<(), DatabaseError> {
        sqlx::query(
            r#"UPDATE users
               SET password_hash = $2, reset_token = NULL, reset_expires_at = NULL,
                   reset_request_count = 0, updated_at = NOW()
               WHERE id = $1"#,
        )
        .bind(id)
        .bind(password_hash)
        .execute(pool)
        .await?;
        Ok(())
    }

    pub async fn set_flags<'e>(
        executor: impl PgExecutor<'e>,
        id: i64,
        is_active: bool,
        is_locked: bool,
    ) -> Result<(), DatabaseError> {
        let result = sqlx::query("UPDATE users SET is_active = $2, is_locked = $3, updated_at = NOW() WHERE id = $1")
            .bind(id)
            .bind(is_active)
            .bind(is_locked)
            .execute(executor)
            .await?;
        if result.rows_affected() == 0 {
            return Err(DatabaseError::NotFound("User not found".to_string()));
        }
        Ok(())
    }

    /// Clears the user's roles and inserts the given set.
    pub async fn replace_roles(tx: &mut Transaction<'_, Postgres>, id: i64, role_ids: &[i64]) -> Result<(), DatabaseError> {
        sqlx::query("DELETE FROM user_roles WHERE user_id = $1")
            .bind(id)
            .execute(&mut **tx)
            .await?;
        sqlx::query(
            r#"INSERT INTO user_roles (user_id, role_id)
               SELECT $1, r.id FROM roles r WHERE r.id = ANY($2)
               ON CONFLICT DO NOTHING"#,
        )
        .bind(id)
        .bind(role_ids)
        .execute(&mut **tx)
        .await?;
        Ok(())
    }

    pub async fn assign_role_named<'e>(executor: impl PgExecutor<'e>, id: i64, role_name: &str) -> Result<(), DatabaseError> {
        sqlx::query(
            r#"INSERT INTO user_roles (user_id, role_id)
               SELECT $1, r.id FROM roles r WHERE r.role_name = $2
               ON CONFLICT DO NOTHING"#,
        )
        .bind(id)
        .bind(role_name)
        .execute(executor)
        .await?;
        Ok(())
    }

    pub async fn count_active(pool: &PgPool) -> Result<i64, DatabaseError> {
        Ok(sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM users WHERE is_active = TRUE")
            .fetch_one(pool)
            .await?)
    }

    /// Registrations grouped by calendar month name, ordered by month number.
    pub async fn monthly_counts(pool: &PgPool) -> Result<Vec<MonthlyCount>, DatabaseError> {
        Ok(sqlx::query_as::<_, MonthlyCount>(
            r#"SELECT TO_CHAR(created_at, 'Mon') AS month,
                      COUNT(*) AS count,
                      EXTRACT(MONTH FROM created_at)::INT AS month_num
               FROM users
               GROUP BY TO_CHAR(created_at, 'Mon'), month_num
               ORDER BY month_num"#,
        )
        .fetch_all(pool)
        .await?)
    }
}
