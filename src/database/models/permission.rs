use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::{FromRow, PgPool, Postgres, Transaction};

use crate::database::manager::DatabaseError;
use crate::database::repository::Entity;
use crate::filter::EntitySpec;

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Permission {
    pub id: i64,
    pub permission_name: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Entity for Permission {
    const NOUN: &'static str = "Permission";

    fn spec() -> EntitySpec {
        EntitySpec::new("permissions")
            .search(["permission_name"])
            .filters(["id", "permission_name"])
    }
}

/// Permission name with the number of roles granting it.
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct PermissionUsage {
    pub name: String,
    pub value: i64,
}

impl Permission {
    pub async fn insert(tx: &mut Transaction<'_, Postgres>, name: &str) -> Result<i64, DatabaseError> {
        sqlx::query_scalar::<_, i64>("INSERT INTO permissions (permission_name) VALUES ($1) RETURNING id")
            .bind(name)
            .fetch_one(&mut **tx)
            .await
            .map_err(|e| DatabaseError::on_write(e, "Permission already exists"))
    }

    pub async fn rename(tx: &mut Transaction<'_, Postgres>, id: i64, name: &str) -> Result<(), DatabaseError> {
        let result = sqlx::query("UPDATE permissions SET permission_name = $2, updated_at = NOW() WHERE id = $1")
            .bind(id)
            .bind(name)
            .execute(&mut **tx)
            .await
            .map_err(|e| DatabaseError::on_write(e, "Permission already exists"))?;
        if result.rows_affected() == 0 {
            return Err(DatabaseError::NotFound("Permission not found".to_string()));
        }
        Ok(())
    }

    /// Clears the roles granting this permission and inserts the given set.
    pub async fn replace_roles(tx: &mut Transaction<'_, Postgres>, id: i64, role_ids: &[i64]) -> Result<(), DatabaseError> {
        sqlx::query("DELETE FROM role_permissions WHERE permission_id = $1")
            .bind(id)
            .execute(&mut **tx)
            .await?;
        sqlx::query(
            r#"INSERT INTO role_permissions (role_id, permission_id)
               SELECT r.id, $1 FROM roles r WHERE r.id = ANY($2)
               ON CONFLICT DO NOTHING"#,
        )
        .bind(id)
        .bind(role_ids)
        .execute(&mut **tx)
        .await?;
        Ok(())
    }

    pub async fn for_role(pool: &PgPool, role_id: i64) -> Result<Vec<Permission>, DatabaseError> {
        Ok(sqlx::query_as::<_, Permission>(
            r#"SELECT p.* FROM permissions p
               JOIN role_permissions rp ON rp.permission_id = p.id
               WHERE rp.role_id = $1
               ORDER BY p.id"#,
        )
        .bind(role_id)
        .fetch_all(pool)
        .await?)
    }

    /// Union of the permission names over every role the user holds.
    pub async fn names_for_user(pool: &PgPool, user_id: i64) -> Result<Vec<String>, DatabaseError> {
        Ok(sqlx::query_scalar::<_, String>(
            r#"SELECT DISTINCT p.permission_name
               FROM permissions p
               JOIN role_permissions rp ON rp.permission_id = p.id
               JOIN user_roles ur ON ur.role_id = rp.role_id
               WHERE ur.user_id = $1
               ORDER BY p.permission_name"#,
        )
        .bind(user_id)
        .fetch_all(pool)
        .await?)
    }

    pub async fn usage(pool: &PgPool) -> Result<Vec<PermissionUsage>, DatabaseError> {
        Ok(sqlx::query_as::<_, PermissionUsage>(
            r#"SELECT p.permission_name AS name, COUNT(rp.role_id) AS value
               FROM permissions p
               LEFT JOIN role_permissions rp ON rp.permission_id = p.id
               GROUP BY p.id, p.permission_name
               ORDER BY p.id"#,
        )
        .fetch_all(pool)
        .await?)
    }
}
