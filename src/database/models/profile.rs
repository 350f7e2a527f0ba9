use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::{FromRow, PgExecutor, PgPool, Postgres, Transaction};

use crate::database::manager::DatabaseError;
use crate::database::repository::Repository;
use crate::filter::{EntitySpec, Join, Scope};

/// Users joined onto a profile table as `u`.
pub const PROFILE_USER: Join = Join::left("users", "u", "u.id", "user_id");
/// Owning agent of a member, and that agent's user.
pub const MEMBER_AGENT: Join = Join::left("agents", "a", "a.id", "agent_id");
pub const MEMBER_AGENT_USER: Join = Join::left("users", "au", "au.id", "a.user_id");
/// Group membership rows for a member.
pub const MEMBER_GROUPS: Join = Join::inner("group_members", "gm", "gm.member_id", "id");

/// The three kinds of profile wrapping a user account.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProfileKind {
    Agent,
    Officer,
    Member,
}

impl ProfileKind {
    pub fn table(self) -> &'static str {
        match self {
            ProfileKind::Agent => "agents",
            ProfileKind::Officer => "officers",
            ProfileKind::Member => "members",
        }
    }

    /// Noun used in messages; also the name of the role granted on creation.
    pub fn noun(self) -> &'static str {
        match self {
            ProfileKind::Agent => "Agent",
            ProfileKind::Officer => "Officer",
            ProfileKind::Member => "Member",
        }
    }

    fn select(self) -> Vec<String> {
        let t = self.table();
        let mut columns: Vec<String> = ["id", "user_id", "is_active", "last_login", "country_id", "region_id", "city_id", "created_at", "updated_at"]
            .iter()
            .map(|c| format!("\"{}\".\"{}\"", t, c))
            .collect();
        columns.extend(["first_name", "last_name", "email", "mobile_number"].iter().map(|c| format!("\"u\".\"{}\"", c)));
        columns
    }

    pub fn spec(self) -> EntitySpec {
        let spec = EntitySpec::new(self.table())
            .join(PROFILE_USER)
            .search(["u.first_name", "u.last_name"]);

        match self {
            ProfileKind::Member => {
                let mut select = self.select();
                select.push("\"members\".\"agent_id\"".to_string());
                select.push("\"au\".\"first_name\" AS agent_first_name".to_string());
                select.push("\"au\".\"last_name\" AS agent_last_name".to_string());
                spec.select(select)
                    .join(MEMBER_AGENT)
                    .join(MEMBER_AGENT_USER)
                    .filters(["id", "user_id", "agent_id", "is_active", "country_id", "region_id", "city_id"])
            }
            _ => spec
                .select(self.select())
                .filters(["id", "user_id", "is_active", "country_id", "region_id", "city_id"]),
        }
    }
}

/// Agent or officer row with its user's identity columns.
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Profile {
    pub id: i64,
    pub user_id: i64,
    pub is_active: bool,
    pub last_login: Option<DateTime<Utc>>,
    pub country_id: i64,
    pub region_id: i64,
    pub city_id: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub mobile_number: String,
}

impl Profile {
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Member {
    #[sqlx(flatten)]
    #[serde(flatten)]
    pub profile: Profile,
    pub agent_id: i64,
    pub agent_first_name: Option<String>,
    pub agent_last_name: Option<String>,
}

/// Location assignment shared by profiles and groups.
#[derive(Debug, Clone, Copy)]
pub struct Placement {
    pub country_id: i64,
    pub region_id: i64,
    pub city_id: i64,
}

/// A group a member belongs to.
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct MemberGroup {
    pub member_id: i64,
    pub id: i64,
    pub group_name: String,
}

pub fn repository(pool: &PgPool, kind: ProfileKind) -> Repository<Profile> {
    Repository::new(pool, kind.spec(), kind.noun())
}

pub fn members(pool: &PgPool) -> Repository<Member> {
    Repository::new(pool, ProfileKind::Member.spec(), ProfileKind::Member.noun())
}

impl ProfileKind {
    /// Profile owned by the given user, if any.
    pub async fn for_user(self, pool: &PgPool, user_id: i64) -> Result<Option<Profile>, DatabaseError> {
        repository(pool, self).select_one([Scope::eq("user_id", user_id)]).await
    }

    pub async fn insert<'e>(
        self,
        executor: impl PgExecutor<'e>,
        user_id: i64,
        placement: Placement,
        agent_id: Option<i64>,
    ) -> Result<i64, DatabaseError> {
        let query = match (self, agent_id) {
            (ProfileKind::Member, Some(_)) => {
                "INSERT INTO members (user_id, is_active, country_id, region_id, city_id, agent_id) \
                 VALUES ($1, TRUE, $2, $3, $4, $5) RETURNING id"
                    .to_string()
            }
            (ProfileKind::Member, None) => {
                return Err(DatabaseError::QueryError("member profiles require an owning agent".to_string()));
            }
            _ => format!(
                "INSERT INTO \"{}\" (user_id, is_active, country_id, region_id, city_id) \
                 VALUES ($1, TRUE, $2, $3, $4) RETURNING id",
                self.table()
            ),
        };

        let mut q = sqlx::query_scalar::<_, i64>(&query)
            .bind(user_id)
            .bind(placement.country_id)
            .bind(placement.region_id)
            .bind(placement.city_id);
        if let Some(agent_id) = agent_id {
            q = q.bind(agent_id);
        }
        q.fetch_one(executor)
            .await
            .map_err(|e| DatabaseError::on_write(e, &format!("{} already exists", self.noun())))
    }

    pub async fn set_active(self, pool: &PgPool, id: i64, is_active: bool) -> Result<(), DatabaseError> {
        let query = format!("UPDATE \"{}\" SET is_active = $2, updated_at = NOW() WHERE id = $1", self.table());
        let result = sqlx::query(&query).bind(id).bind(is_active).execute(pool).await?;
        if result.rows_affected() == 0 {
            return Err(DatabaseError::NotFound(format!("{} not found", self.noun())));
        }
        Ok(())
    }
}

impl Member {
    /// Clears the member's group links and inserts the given set.
    pub async fn replace_groups(tx: &mut Transaction<'_, Postgres>, member_id: i64, group_ids: &[i64]) -> Result<(), DatabaseError> {
        sqlx::query("DELETE FROM group_members WHERE member_id = $1")
            .bind(member_id)
            .execute(&mut **tx)
            .await?;
        sqlx::query(
            r#"INSERT INTO group_members (group_id, member_id)
               SELECT g.id, $1 FROM groups g WHERE g.id = ANY($2)
               ON CONFLICT DO NOTHING"#,
        )
        .bind(member_id)
        .bind(group_ids)
        .execute(&mut **tx)
        .await?;
        Ok(())
    }

    /// Groups of every listed member, in one query.
    pub async fn groups_of(pool: &PgPool, member_ids: &[i64]) -> Result<Vec<MemberGroup>, DatabaseError> {
        if member_ids.is_empty() {
            return Ok(vec![]);
        }
        Ok(sqlx::query_as::<_, MemberGroup>(
            r#"SELECT gm.member_id, g.id, g.group_name
               FROM group_members gm
               JOIN groups g ON g.id = gm.group_id
               WHERE gm.member_id = ANY($1)
               ORDER BY g.id"#,
        )
        .bind(member_ids)
        .fetch_all(pool)
        .await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::Filter;

    #[test]
    fn member_query_joins_owner_names() {
        let mut filter = Filter::new(ProfileKind::Member.spec()).unwrap();
        filter.scope(Scope::via(MEMBER_GROUPS, "gm.group_id", 5));
        let sql = filter.to_sql().unwrap();
        assert!(sql.query.contains(r#"LEFT JOIN "agents" AS "a" ON "a"."id" = "members"."agent_id""#));
        assert!(sql.query.contains(r#"LEFT JOIN "users" AS "au" ON "au"."id" = "a"."user_id""#));
        assert!(sql.query.contains(r#"INNER JOIN "group_members" AS "gm" ON "gm"."member_id" = "members"."id""#));
        assert!(sql.query.contains(r#"WHERE "gm"."group_id" = $1"#));
    }

    #[test]
    fn officer_search_uses_user_names() {
        let spec = ProfileKind::Officer.spec();
        assert_eq!(spec.table, "officers");
        assert_eq!(spec.search_columns, vec!["u.first_name", "u.last_name"]);
        assert!(spec.select.iter().any(|c| c == "\"u\".\"mobile_number\""));
    }
}
