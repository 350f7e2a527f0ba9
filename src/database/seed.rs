use sqlx::PgPool;
use tracing::info;

use crate::auth::AuthProvider;
use crate::config::DatabaseConfig;
use crate::database::manager::DatabaseError;
use crate::database::models::{NewUser, User};

pub const PERMISSIONS: [&str; 36] = [
    "create_permission",
    "create_role",
    "data_collection_overview",
    "delete_media",
    "delete_permission",
    "delete_role",
    "edit_permission",
    "edit_role",
    "edit_user",
    "security_overview",
    "upload_media",
    "view_permissions",
    "view_roles",
    "view_users",
    "field_overview",
    "create_agent",
    "view_agents",
    "edit_agent",
    "delete_agent",
    "create_group",
    "view_groups",
    "edit_group",
    "delete_group",
    "create_officer",
    "view_officers",
    "edit_officer",
    "delete_officer",
    "create_member",
    "view_members",
    "edit_member",
    "delete_member",
    "create_loan",
    "view_loans",
    "edit_loan",
    "delete_loan",
    "office_overview",
];

pub const ROLES: [&str; 4] = ["Admin", "Officer", "Agent", "Member"];

/// Role granted every permission.
pub const ADMIN_ROLE: &str = "Admin";

/// Seeds permissions, roles and the optional admin user; safe to run repeatedly.
pub async fn run(pool: &PgPool, config: &DatabaseConfig, auth: &dyn AuthProvider) -> Result<(), DatabaseError> {
    let mut tx = pool.begin().await?;

    let inserted = sqlx::query(
        "INSERT INTO permissions (permission_name) SELECT UNNEST($1::TEXT[]) ON CONFLICT (permission_name) DO NOTHING",
    )
    .bind(&PERMISSIONS[..])
    .execute(&mut *tx)
    .await?
    .rows_affected();
    info!("Seeded {} new permissions", inserted);

    let inserted = sqlx::query("INSERT INTO roles (role_name) SELECT UNNEST($1::TEXT[]) ON CONFLICT (role_name) DO NOTHING")
        .bind(&ROLES[..])
        .execute(&mut *tx)
        .await?
        .rows_affected();
    info!("Seeded {} new roles", inserted);

    sqlx::query(
        r#"INSERT INTO role_permissions (role_id, permission_id)
           SELECT r.id, p.id FROM roles r CROSS JOIN permissions p
           WHERE r.role_name = $1
           ON CONFLICT DO NOTHING"#,
    )
    .bind(ADMIN_ROLE)
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;

    if let (Some(email), Some(password)) = (&config.admin_email, &config.admin_password) {
        seed_admin(pool, email, password, auth).await?;
    }
    Ok(())
}

async fn seed_admin(pool: &PgPool, email: &str, password: &str, auth: &dyn AuthProvider) -> Result<(), DatabaseError> {
    if User::find_by_email(pool, email).await?.is_some() {
        info!("Admin {} already exists, skipping", email);
        return Ok(());
    }

    let digest = auth.hash(password).map_err(|e| DatabaseError::QueryError(e.to_string()))?;
    let mut tx = pool.begin().await?;
    let id = User::insert(
        &mut *tx,
        NewUser {
            first_name: "System",
            last_name: "Administrator",
            email,
            mobile_number: "0000000000",
            password_hash: &digest,
            is_active: true,
            activation_token: None,
            activation_expires_at: None,
        },
    )
    .await?;
    User::assign_role_named(&mut *tx, id, ADMIN_ROLE).await?;
    tx.commit().await?;

    info!("Admin {} seeded", email);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn permission_names_are_unique() {
        let mut names = PERMISSIONS.to_vec();
        names.sort_unstable();
        names.dedup();
        assert_eq!(names.len(), PERMISSIONS.len());
    }

    #[test]
    fn every_entity_has_crud_permissions() {
        for noun in ["agent", "group", "officer", "member", "loan"] {
            for verb in ["create", "edit", "delete"] {
                let name = format!("{}_{}", verb, noun);
                assert!(PERMISSIONS.contains(&name.as_str()), "{} missing", name);
            }
            assert!(PERMISSIONS.contains(&format!("view_{}s", noun).as_str()));
        }
    }
}
