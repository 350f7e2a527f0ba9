use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::{FromRow, PgPool};

use crate::database::manager::DatabaseError;
use crate::database::models::profile::Placement;
use crate::database::repository::Entity;
use crate::filter::{EntitySpec, Join};

pub const GROUP_AGENT: Join = Join::left("agents", "a", "a.id", "agent_id");
pub const GROUP_AGENT_USER: Join = Join::left("users", "au", "au.id", "a.user_id");

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Group {
    pub id: i64,
    pub group_name: String,
    pub is_active: bool,
    pub agent_id: i64,
    pub country_id: i64,
    pub region_id: i64,
    pub city_id: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub agent_first_name: Option<String>,
    pub agent_last_name: Option<String>,
}

impl Entity for Group {
    const NOUN: &'static str = "Group";

    fn spec() -> EntitySpec {
        EntitySpec::new("groups")
            .select([
                r#""groups".*"#,
                r#""au"."first_name" AS agent_first_name"#,
                r#""au"."last_name" AS agent_last_name"#,
            ])
            .join(GROUP_AGENT)
            .join(GROUP_AGENT_USER)
            .search(["group_name"])
            .filters(["id", "group_name", "is_active", "agent_id", "country_id", "region_id", "city_id"])
    }
}

/// A member row attached to a group listing.
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct GroupMember {
    pub group_id: i64,
    pub id: i64,
    pub member_first_name: String,
    pub member_last_name: String,
}

impl Group {
    pub async fn insert(pool: &PgPool, name: &str, agent_id: i64, placement: Placement) -> Result<i64, DatabaseError> {
        sqlx::query_scalar::<_, i64>(
            r#"INSERT INTO groups (group_name, is_active, agent_id, country_id, region_id, city_id)
               VALUES ($1, TRUE, $2, $3, $4, $5)
               RETURNING id"#,
        )
        .bind(name)
        .bind(agent_id)
        .bind(placement.country_id)
        .bind(placement.region_id)
        .bind(placement.city_id)
        .fetch_one(pool)
        .await
        .map_err(|e| DatabaseError::on_write(e, "Group already exists"))
    }

    /// Changes the active flag and the owning agent.
    pub async fn update(pool: &PgPool, id: i64, is_active: bool, agent_id: i64) -> Result<(), DatabaseError> {
        let result = sqlx::query("UPDATE groups SET is_active = $2, agent_id = $3, updated_at = NOW() WHERE id = $1")
            .bind(id)
            .bind(is_active)
            .bind(agent_id)
            .execute(pool)
            .await
            .map_err(|e| DatabaseError::on_write(e, "Group already exists"))?;
        if result.rows_affected() == 0 {
            return Err(DatabaseError::NotFound("Group not found".to_string()));
        }
        Ok(())
    }

    /// Members of every listed group, in one query.
    pub async fn members_of(pool: &PgPool, group_ids: &[i64]) -> Result<Vec<GroupMember>, DatabaseError> {
        if group_ids.is_empty() {
            return Ok(vec![]);
        }
        Ok(sqlx::query_as::<_, GroupMember>(
            r#"SELECT gm.group_id, m.id, u.first_name AS member_first_name, u.last_name AS member_last_name
               FROM group_members gm
               JOIN members m ON m.id = gm.member_id
               JOIN users u ON u.id = m.user_id
               WHERE gm.group_id = ANY($1)
               ORDER BY m.id"#,
        )
        .bind(group_ids)
        .fetch_all(pool)
        .await?)
    }
}
