use serde_json::{Map, Value};

use super::error::FilterError;
use super::filter_order::FilterOrder;
use super::filter_where::{is_identifier, join_sql, FilterWhere};
use super::params::PageRequest;
use super::types::{EntitySpec, FilterOrderInfo, Join, Scope, SortDirection, SqlResult};

/// One parameterized query over an entity: scopes narrow the row set,
/// search and criteria come from the caller, order and limit shape the page.
#[derive(Debug, Clone)]
pub struct Filter {
    spec: EntitySpec,
    scopes: Vec<Scope>,
    search: Option<String>,
    criteria: Map<String, Value>,
    order: Option<FilterOrderInfo>,
    limit: Option<i64>,
    offset: Option<i64>,
}

impl Filter {
    pub fn new(spec: EntitySpec) -> Result<Self, FilterError> {
        Self::validate_table_name(spec.table)?;
        Ok(Self {
            spec,
            scopes: vec![],
            search: None,
            criteria: Map::new(),
            order: None,
            limit: None,
            offset: None,
        })
    }

    pub fn table(&self) -> &'static str {
        self.spec.table
    }

    /// Applies a normalized page request: search, criteria, sort and window.
    pub fn assign(&mut self, request: &PageRequest) -> Result<&mut Self, FilterError> {
        self.search(request.search.as_deref());
        self.criteria(&request.filters)?;
        self.order(request.sort_column, request.sort_order);
        self.limit(request.limit, Some(request.skip))?;
        Ok(self)
    }

    pub fn scope(&mut self, scope: Scope) -> &mut Self {
        self.scopes.push(scope);
        self
    }

    pub fn scopes(&mut self, scopes: impl IntoIterator<Item = Scope>) -> &mut Self {
        self.scopes.extend(scopes);
        self
    }

    pub fn search(&mut self, pattern: Option<&str>) -> &mut Self {
        self.search = pattern.map(str::to_string);
        self
    }

    pub fn criteria(&mut self, criteria: &Map<String, Value>) -> Result<&mut Self, FilterError> {
        // Validate eagerly so bad keys fail before any statement is built.
        FilterWhere::new(self.spec.table).criteria(criteria, &self.spec.filter_columns)?;
        self.criteria = criteria.clone();
        Ok(self)
    }

    pub fn order(&mut self, column: &'static str, sort: SortDirection) -> &mut Self {
        self.order = Some(FilterOrderInfo { column, sort });
        self
    }

    pub fn limit(&mut self, limit: i64, offset: Option<i64>) -> Result<&mut Self, FilterError> {
        if limit < 0 { return Err(FilterError::InvalidFilterCriteria("Limit must be non-negative".to_string())); }
        if let Some(off) = offset { if off < 0 { return Err(FilterError::InvalidFilterCriteria("Offset must be non-negative".to_string())); } }
        self.limit = Some(limit);
        self.offset = offset;
        Ok(self)
    }

    /// Page statement: every predicate, ordered, windowed.
    pub fn to_sql(&self) -> Result<SqlResult, FilterError> {
        let (where_clause, params) = self.where_all()?;
        let query = [
            format!("SELECT {}", self.build_select_clause()),
            self.build_from_clause()?,
            Self::prefix("WHERE", where_clause),
            FilterOrder::generate(self.spec.table, self.order.as_ref())?,
            self.build_limit_clause(),
        ].into_iter().filter(|s| !s.is_empty()).collect::<Vec<_>>().join(" ");

        Ok(SqlResult { query, params })
    }

    /// Rows matching every predicate.
    pub fn to_count_sql(&self) -> Result<SqlResult, FilterError> {
        let (where_clause, params) = self.where_all()?;
        self.count_statement(where_clause, params)
    }

    /// Rows matching the scopes only, ignoring search and criteria.
    pub fn to_scoped_count_sql(&self) -> Result<SqlResult, FilterError> {
        let mut w = FilterWhere::new(self.spec.table);
        w.scopes(&self.scopes)?;
        let (where_clause, params) = w.build();
        self.count_statement(where_clause, params)
    }

    fn where_all(&self) -> Result<(String, Vec<Value>), FilterError> {
        let mut w = FilterWhere::new(self.spec.table);
        w.scopes(&self.scopes)?
            .search(&self.spec.search_columns, self.search.as_deref())?
            .criteria(&self.criteria, &self.spec.filter_columns)?;
        Ok(w.build())
    }

    fn count_statement(&self, where_clause: String, params: Vec<Value>) -> Result<SqlResult, FilterError> {
        let query = [
            format!("SELECT COUNT(DISTINCT \"{}\".\"id\") AS count", self.spec.table),
            self.build_from_clause()?,
            Self::prefix("WHERE", where_clause),
        ].into_iter().filter(|s| !s.is_empty()).collect::<Vec<_>>().join(" ");
        Ok(SqlResult { query, params })
    }

    fn build_select_clause(&self) -> String {
        if self.spec.select.is_empty() {
            format!("\"{}\".*", self.spec.table)
        } else {
            self.spec.select.join(", ")
        }
    }

    fn build_from_clause(&self) -> Result<String, FilterError> {
        let mut parts = vec![format!("FROM \"{}\"", self.spec.table)];
        let mut seen: Vec<&Join> = vec![];
        let scope_joins = self.scopes.iter().filter_map(|s| match s {
            Scope::Via { join, .. } => Some(join),
            _ => None,
        });
        for join in self.spec.joins.iter().chain(scope_joins) {
            if seen.contains(&join) { continue; }
            parts.push(join_sql(self.spec.table, join)?);
            seen.push(join);
        }
        Ok(parts.join(" "))
    }

    fn build_limit_clause(&self) -> String {
        match (self.limit, self.offset) {
            (Some(l), Some(o)) if o > 0 => format!("LIMIT {} OFFSET {}", l, o),
            (Some(l), _) => format!("LIMIT {}", l),
            _ => String::new(),
        }
    }

    fn prefix(keyword: &str, clause: String) -> String {
        if clause.is_empty() { clause } else { format!("{} {}", keyword, clause) }
    }

    fn validate_table_name(name: &str) -> Result<(), FilterError> {
        if name.is_empty() { return Err(FilterError::InvalidTableName("Table name cannot be empty".to_string())); }
        if !is_identifier(name) {
            return Err(FilterError::InvalidTableName(format!("Invalid table name format: {}", name)));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn agents() -> EntitySpec {
        EntitySpec::new("agents")
            .select(["\"agents\".\"id\"", "\"u\".\"first_name\""])
            .join(Join::left("users", "u", "u.id", "user_id"))
            .search(["u.first_name", "u.last_name"])
            .filters(["is_active", "country_id"])
    }

    #[test]
    fn page_statement_places_scopes_before_search() {
        let mut filter = Filter::new(agents()).unwrap();
        filter
            .scopes(Scope::positive("country_id", 3))
            .search(Some("%jo%"))
            .order("user_id", SortDirection::Desc);
        filter.limit(9, Some(18)).unwrap();

        let sql = filter.to_sql().unwrap();
        assert_eq!(
            sql.query,
            concat!(
                r#"SELECT "agents"."id", "u"."first_name" FROM "agents" "#,
                r#"LEFT JOIN "users" AS "u" ON "u"."id" = "agents"."user_id" "#,
                r#"WHERE "agents"."country_id" = $1 AND ("u"."first_name" ILIKE $2 OR "u"."last_name" ILIKE $2) "#,
                r#"ORDER BY "agents"."user_id" DESC, "agents"."id" ASC LIMIT 9 OFFSET 18"#
            )
        );
        assert_eq!(sql.params, vec![json!(3), json!("%jo%")]);
    }

    #[test]
    fn non_positive_scope_is_dropped() {
        let mut filter = Filter::new(agents()).unwrap();
        filter.scopes(Scope::positive("country_id", 0));
        let sql = filter.to_count_sql().unwrap();
        assert_eq!(
            sql.query,
            r#"SELECT COUNT(DISTINCT "agents"."id") AS count FROM "agents" LEFT JOIN "users" AS "u" ON "u"."id" = "agents"."user_id""#
        );
        assert!(sql.params.is_empty());
    }

    #[test]
    fn scoped_count_ignores_search_and_criteria() {
        let mut filter = Filter::new(agents()).unwrap();
        filter.scope(Scope::eq("is_active", true)).search(Some("%zzz%"));
        filter.criteria(json!({ "country_id": 2 }).as_object().unwrap()).unwrap();

        let scoped = filter.to_scoped_count_sql().unwrap();
        assert!(scoped.query.ends_with(r#"WHERE "agents"."is_active" = $1"#));
        assert_eq!(scoped.params, vec![json!(true)]);

        let filtered = filter.to_count_sql().unwrap();
        assert_eq!(filtered.params, vec![json!(true), json!("%zzz%"), json!(2)]);
    }

    #[test]
    fn join_scope_adds_its_join_once() {
        let gm = Join::inner("group_members", "gm", "gm.member_id", "id");
        let mut filter = Filter::new(EntitySpec::new("members")).unwrap();
        filter.scope(Scope::via(gm, "gm.group_id", 7));
        let sql = filter.to_sql().unwrap();
        assert_eq!(
            sql.query,
            concat!(
                r#"SELECT "members".* FROM "members" "#,
                r#"INNER JOIN "group_members" AS "gm" ON "gm"."member_id" = "members"."id" "#,
                r#"WHERE "gm"."group_id" = $1 ORDER BY "members"."id" ASC"#
            )
        );
    }

    #[test]
    fn unknown_criteria_column_fails_eagerly() {
        let mut filter = Filter::new(agents()).unwrap();
        let err = filter.criteria(json!({ "password_hash": "x" }).as_object().unwrap()).err().unwrap();
        assert!(matches!(err, FilterError::InvalidColumn(_)));
    }

    #[test]
    fn rejects_bad_table_name() {
        assert!(Filter::new(EntitySpec::new("users; --")).is_err());
    }
}
