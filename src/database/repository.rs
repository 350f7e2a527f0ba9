use sqlx::{self, postgres::PgRow, FromRow, PgPool};

use crate::database::manager::DatabaseError;
use crate::database::query_builder::{Page, QueryBuilder};
use crate::filter::{EntitySpec, Filter, PageRequest, Scope};

/// A row type with a fixed query description.
pub trait Entity: for<'r> FromRow<'r, PgRow> + Send + Unpin {
    /// Human noun for messages ("Agent not found").
    const NOUN: &'static str;

    fn spec() -> EntitySpec;
}

/// Typed read/delete access to one table through the filter engine.
pub struct Repository<T> {
    pool: PgPool,
    spec: EntitySpec,
    noun: &'static str,
    _phantom: std::marker::PhantomData<T>,
}

impl<T: Entity> Repository<T> {
    pub fn of(pool: &PgPool) -> Self {
        Self::new(pool, T::spec(), T::NOUN)
    }
}

impl<T> Repository<T>
where
    T: for<'r> FromRow<'r, PgRow> + Send + Unpin,
{
    pub fn new(pool: &PgPool, spec: EntitySpec, noun: &'static str) -> Self {
        Self {
            pool: pool.clone(),
            spec,
            noun,
            _phantom: std::marker::PhantomData,
        }
    }

    fn builder(&self, scopes: impl IntoIterator<Item = Scope>) -> Result<QueryBuilder<T>, DatabaseError> {
        let mut filter = Filter::new(self.spec.clone())?;
        filter.scopes(scopes);
        Ok(QueryBuilder::new(filter))
    }

    pub async fn paginate(
        &self,
        request: &PageRequest,
        scopes: impl IntoIterator<Item = Scope>,
        legacy_total: bool,
    ) -> Result<Page<T>, DatabaseError> {
        self.builder(scopes)?.page(&self.pool, request, legacy_total).await
    }

    pub async fn select_any(&self, scopes: impl IntoIterator<Item = Scope>) -> Result<Vec<T>, DatabaseError> {
        self.builder(scopes)?.select_all(&self.pool).await
    }

    pub async fn select_one(&self, scopes: impl IntoIterator<Item = Scope>) -> Result<Option<T>, DatabaseError> {
        self.builder(scopes)?.select_optional(&self.pool).await
    }

    pub async fn find(&self, id: i64) -> Result<Option<T>, DatabaseError> {
        self.select_one([Scope::eq("id", id)]).await
    }

    pub async fn select_404(&self, id: i64) -> Result<T, DatabaseError> {
        self.find(id)
            .await?
            .ok_or_else(|| DatabaseError::NotFound(format!("{} not found", self.noun)))
    }

    pub async fn count(&self, scopes: impl IntoIterator<Item = Scope>) -> Result<i64, DatabaseError> {
        self.builder(scopes)?.count(&self.pool).await
    }

    pub async fn select_ids(&self, ids: &[i64]) -> Result<Vec<T>, DatabaseError> {
        if ids.is_empty() {
            return Ok(vec![]);
        }
        self.select_any([Scope::any_of("id", ids.iter().copied())]).await
    }

    /// Looks the row up first so a miss is a 404, then hard-deletes it.
    pub async fn delete_404(&self, id: i64) -> Result<(), DatabaseError> {
        self.select_404(id).await?;
        let query = format!("DELETE FROM \"{}\" WHERE \"id\" = $1", self.spec.table);
        sqlx::query(&query).bind(id).execute(&self.pool).await?;
        Ok(())
    }
}
