use serde_json::Value;
use sqlx::{self, postgres::PgArguments, FromRow, PgPool, Row};

use crate::database::manager::DatabaseError;
use crate::filter::types::SqlResult;
use crate::filter::{Filter, PageRequest};

/// One page of typed rows with both counts.
#[derive(Debug, Clone)]
pub struct Page<T> {
    pub items: Vec<T>,
    /// Rows matching the scopes only
    pub total_count: i64,
    /// Rows matching scopes, search and criteria
    pub count: i64,
    pub page: i64,
    pub limit: i64,
}

impl<T> Page<T> {
    /// Same window and counts over a different item list, e.g. a projection of these rows.
    pub fn with_items<U>(self, items: Vec<U>) -> Page<U> {
        Page {
            items,
            total_count: self.total_count,
            count: self.count,
            page: self.page,
            limit: self.limit,
        }
    }

    pub fn map<U>(self, f: impl FnMut(T) -> U) -> Page<U> {
        Page {
            items: self.items.into_iter().map(f).collect(),
            total_count: self.total_count,
            count: self.count,
            page: self.page,
            limit: self.limit,
        }
    }
}

pub struct QueryBuilder<T> {
    filter: Filter,
    _phantom: std::marker::PhantomData<T>,
}

impl<T> QueryBuilder<T>
where
    T: for<'r> FromRow<'r, sqlx::postgres::PgRow> + Send + Unpin,
{
    pub fn new(filter: Filter) -> Self {
        Self {
            filter,
            _phantom: std::marker::PhantomData,
        }
    }

    pub async fn select_all(&self, pool: &PgPool) -> Result<Vec<T>, DatabaseError> {
        let sql_result = self.filter.to_sql()?;
        fetch_all(pool, &sql_result).await
    }

    pub async fn select_optional(&self, pool: &PgPool) -> Result<Option<T>, DatabaseError> {
        let sql_result = self.filter.to_sql()?;
        let mut q = sqlx::query_as::<_, T>(&sql_result.query);
        for p in sql_result.params.iter() {
            q = bind_param_query_as(q, p);
        }
        let row = q.fetch_optional(pool).await?;
        Ok(row)
    }

    pub async fn count(&self, pool: &PgPool) -> Result<i64, DatabaseError> {
        count(pool, &self.filter.to_count_sql()?).await
    }

    /// Scoped total, filtered count and the page itself. With `legacy_total`
    /// both counts report the filtered number.
    pub async fn page(mut self, pool: &PgPool, request: &PageRequest, legacy_total: bool) -> Result<Page<T>, DatabaseError> {
        self.filter.assign(request)?;

        let count = count(pool, &self.filter.to_count_sql()?).await?;
        let total_count = if legacy_total {
            count
        } else {
            count_scoped(pool, &self.filter).await?
        };
        let items = fetch_all(pool, &self.filter.to_sql()?).await?;

        tracing::debug!(table = self.filter.table(), page = request.page, count, total_count, "Page fetched");

        Ok(Page {
            items,
            total_count,
            count,
            page: request.page,
            limit: request.limit,
        })
    }
}

async fn count_scoped(pool: &PgPool, filter: &Filter) -> Result<i64, DatabaseError> {
    count(pool, &filter.to_scoped_count_sql()?).await
}

async fn count(pool: &PgPool, sql_result: &SqlResult) -> Result<i64, DatabaseError> {
    let mut q = sqlx::query(&sql_result.query);
    for p in sql_result.params.iter() {
        q = bind_param_query(q, p);
    }
    let row = q.fetch_one(pool).await?;
    let count: i64 = row.try_get("count")?;
    Ok(count)
}

async fn fetch_all<T>(pool: &PgPool, sql_result: &SqlResult) -> Result<Vec<T>, DatabaseError>
where
    T: for<'r> FromRow<'r, sqlx::postgres::PgRow> + Send + Unpin,
{
    let mut q = sqlx::query_as::<_, T>(&sql_result.query);
    for p in sql_result.params.iter() {
        q = bind_param_query_as(q, p);
    }
    Ok(q.fetch_all(pool).await?)
}

pub(crate) fn bind_param_query<'q>(
    q: sqlx::query::Query<'q, sqlx::Postgres, PgArguments>,
    v: &'q Value,
) -> sqlx::query::Query<'q, sqlx::Postgres, PgArguments> {
    match v {
        Value::Null => {
            let none: Option<String> = None;
            q.bind(none)
        }
        Value::Bool(b) => q.bind(*b),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                q.bind(i)
            } else if let Some(f) = n.as_f64() {
                q.bind(f)
            } else {
                q.bind(n.to_string())
            }
        }
        Value::String(s) => q.bind(s.as_str()),
        // Arrays are expanded into IN lists before binding
        Value::Array(_) => q,
        Value::Object(_) => q.bind(v),
    }
}

pub(crate) fn bind_param_query_as<'q, O>(
    q: sqlx::query::QueryAs<'q, sqlx::Postgres, O, PgArguments>,
    v: &'q Value,
) -> sqlx::query::QueryAs<'q, sqlx::Postgres, O, PgArguments>
where
    O: for<'r> FromRow<'r, sqlx::postgres::PgRow>,
{
    match v {
        Value::Null => {
            let none: Option<String> = None;
            q.bind(none)
        }
        Value::Bool(b) => q.bind(*b),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                q.bind(i)
            } else if let Some(f) = n.as_f64() {
                q.bind(f)
            } else {
                q.bind(n.to_string())
            }
        }
        Value::String(s) => q.bind(s.as_str()),
        Value::Array(_) => q,
        Value::Object(_) => q.bind(v),
    }
}
