use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::{FromRow, PgPool, Postgres, Transaction};

use crate::database::manager::DatabaseError;
use crate::database::repository::Entity;
use crate::filter::EntitySpec;

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Role {
    pub id: i64,
    pub role_name: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Entity for Role {
    const NOUN: &'static str = "Role";

    fn spec() -> EntitySpec {
        EntitySpec::new("roles").search(["role_name"]).filters(["id", "role_name"])
    }
}

/// Role name with the number of users holding it.
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct RoleUsage {
    pub name: String,
    pub users: i64,
}

impl Role {
    pub async fn insert(tx: &mut Transaction<'_, Postgres>, name: &str) -> Result<i64, DatabaseError> {
        sqlx::query_scalar::<_, i64>("INSERT INTO roles (role_name) VALUES ($1) RETURNING id")
            .bind(name)
            .fetch_one(&mut **tx)
            .await
            .map_err(|e| DatabaseError::on_write(e, "Role already exists"))
    }

    pub async fn rename(tx: &mut Transaction<'_, Postgres>, id: i64, name: &str) -> Result<(), DatabaseError> {
        let result = sqlx::query("UPDATE roles SET role_name = $2, updated_at = NOW() WHERE id = $1")
            .bind(id)
            .bind(name)
            .execute(&mut **tx)
            .await
            .map_err(|e| DatabaseError::on_write(e, "Role already exists"))?;
        if result.rows_affected() == 0 {
            return Err(DatabaseError::NotFound("Role not found".to_string()));
        }
        Ok(())
    }

    /// Clears the role's permissions and inserts the given set.
    pub async fn replace_permissions(
        tx: &mut Transaction<'_, Postgres>,
        id: i64,
        permission_ids: &[i64],
    ) -> Result<(), DatabaseError> {
        sqlx::query("DELETE FROM role_permissions WHERE role_id = $1")
            .bind(id)
            .execute(&mut **tx)
            .await?;
        sqlx::query(
            r#"INSERT INTO role_permissions (role_id, permission_id)
               SELECT $1, p.id FROM permissions p WHERE p.id = ANY($2)
               ON CONFLICT DO NOTHING"#,
        )
        .bind(id)
        .bind(permission_ids)
        .execute(&mut **tx)
        .await?;
        Ok(())
    }

    pub async fn for_user(pool: &PgPool, user_id: i64) -> Result<Vec<Role>, DatabaseError> {
        Ok(sqlx::query_as::<_, Role>(
            r#"SELECT r.* FROM roles r
               JOIN user_roles ur ON ur.role_id = r.id
               WHERE ur.user_id = $1
               ORDER BY r.id"#,
        )
        .bind(user_id)
        .fetch_all(pool)
        .await?)
    }

    pub async fn for_permission(pool: &PgPool, permission_id: i64) -> Result<Vec<Role>, DatabaseError> {
        Ok(sqlx::query_as::<_, Role>(
            r#"SELECT r.* FROM roles r
               JOIN role_permissions rp ON rp.role_id = r.id
               WHERE rp.permission_id = $1
               ORDER BY r.id"#,
        )
        .bind(permission_id)
        .fetch_all(pool)
        .await?)
    }

    pub async fn usage(pool: &PgPool) -> Result<Vec<RoleUsage>, DatabaseError> {
        Ok(sqlx::query_as::<_, RoleUsage>(
            r#"SELECT r.role_name AS name, COUNT(ur.user_id) AS users
               FROM roles r
               LEFT JOIN user_roles ur ON ur.role_id = r.id
               GROUP BY r.id, r.role_name
               ORDER BY r.id"#,
        )
        .fetch_all(pool)
        .await?)
    }
}
