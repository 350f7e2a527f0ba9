use serde_json::{Map, Value};

use super::error::FilterError;
use super::types::{ColumnKind, Join, JoinKind, Scope};

/// Accumulates WHERE predicates and their `$n` parameters for one statement.
pub struct FilterWhere<'a> {
    table: &'a str,
    param_values: Vec<Value>,
    param_index: usize,
    conditions: Vec<String>,
}

impl<'a> FilterWhere<'a> {
    pub fn new(table: &'a str) -> Self {
        Self {
            table,
            param_values: vec![],
            param_index: 0,
            conditions: vec![],
        }
    }

    pub fn scopes(&mut self, scopes: &[Scope]) -> Result<&mut Self, FilterError> {
        for scope in scopes {
            let sql = self.scope(scope)?;
            self.conditions.push(sql);
        }
        Ok(self)
    }

    /// One pattern parameter, ORed across every searchable column.
    pub fn search(&mut self, columns: &[&str], pattern: Option<&str>) -> Result<&mut Self, FilterError> {
        let Some(pattern) = pattern else { return Ok(self) };
        if columns.is_empty() { return Ok(self); }

        let placeholder = self.param(Value::String(pattern.to_string()));
        let mut parts = Vec::with_capacity(columns.len());
        for column in columns {
            parts.push(format!("{} ILIKE {}", qualify(self.table, column)?, placeholder));
        }
        self.conditions.push(format!("({})", parts.join(" OR ")));
        Ok(self)
    }

    /// Equality criteria keyed by column name; keys outside `allowed` are rejected.
    pub fn criteria(&mut self, criteria: &Map<String, Value>, allowed: &[&str]) -> Result<&mut Self, FilterError> {
        for (key, value) in criteria {
            let column = allowed
                .iter()
                .find(|c| **c == key.as_str() || unqualified(c) == key.as_str())
                .ok_or_else(|| FilterError::InvalidColumn(key.clone()))?;
            let quoted = qualify(self.table, column)?;
            let kind = ColumnKind::of(column);
            let mismatched = match value {
                Value::Array(values) => values.iter().any(|v| v.is_null() || !kind.accepts(v)),
                Value::Object(_) => false,
                scalar => !kind.accepts(scalar),
            };
            if mismatched {
                return Err(FilterError::InvalidFilterCriteria(format!("wrong value type for {}", key)));
            }
            let sql = match value {
                Value::Null => format!("{} IS NULL", quoted),
                Value::Array(values) => self.in_list(&quoted, values),
                Value::Object(_) => {
                    return Err(FilterError::InvalidFilterCriteria(format!("nested criteria for {}", key)));
                }
                scalar => format!("{} = {}", quoted, self.param(scalar.clone())),
            };
            self.conditions.push(sql);
        }
        Ok(self)
    }

    pub fn build(self) -> (String, Vec<Value>) {
        let where_clause = if self.conditions.is_empty() { String::new() } else { self.conditions.join(" AND ") };
        (where_clause, self.param_values)
    }

    fn scope(&mut self, scope: &Scope) -> Result<String, FilterError> {
        match scope {
            Scope::Eq { column, value } => {
                let quoted = qualify(self.table, column)?;
                if value.is_null() { return Ok(format!("{} IS NULL", quoted)); }
                Ok(format!("{} = {}", quoted, self.param(value.clone())))
            }
            Scope::In { column, values } => {
                let quoted = qualify(self.table, column)?;
                Ok(self.in_list(&quoted, values))
            }
            Scope::Via { join, column, value } => {
                if !column.starts_with(&format!("{}.", join.alias)) {
                    return Err(FilterError::InvalidScope(format!("{} is not a column of {}", column, join.alias)));
                }
                let quoted = qualify(self.table, column)?;
                Ok(format!("{} = {}", quoted, self.param(value.clone())))
            }
        }
    }

    fn in_list(&mut self, quoted: &str, values: &[Value]) -> String {
        if values.is_empty() { return "1=0".to_string(); }
        let params: Vec<String> = values.iter().map(|v| self.param(v.clone())).collect();
        format!("{} IN ({})", quoted, params.join(", "))
    }

    fn param(&mut self, value: Value) -> String {
        self.param_values.push(value);
        self.param_index += 1;
        format!("${}", self.param_index)
    }
}

/// `col` becomes `"table"."col"`; `alias.col` becomes `"alias"."col"`.
pub fn qualify(table: &str, column: &str) -> Result<String, FilterError> {
    let (owner, name) = match column.split_once('.') {
        Some((owner, name)) => (owner, name),
        None => (table, column),
    };
    if !is_identifier(owner) || !is_identifier(name) {
        return Err(FilterError::InvalidColumn(column.to_string()));
    }
    Ok(format!("\"{}\".\"{}\"", owner, name))
}

pub fn join_sql(table: &str, join: &Join) -> Result<String, FilterError> {
    if !is_identifier(join.table) || !is_identifier(join.alias) {
        return Err(FilterError::InvalidTableName(join.table.to_string()));
    }
    let kind = match join.kind {
        JoinKind::Inner => "INNER JOIN",
        JoinKind::Left => "LEFT JOIN",
    };
    Ok(format!(
        "{} \"{}\" AS \"{}\" ON {} = {}",
        kind,
        join.table,
        join.alias,
        qualify(table, join.left)?,
        qualify(table, join.right)?
    ))
}

pub fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) if first.is_ascii_alphabetic() || first == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

fn unqualified(column: &str) -> &str {
    column.rsplit_once('.').map(|(_, name)| name).unwrap_or(column)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn search_reuses_one_parameter_across_columns() {
        let mut w = FilterWhere::new("agents");
        w.search(&["u.first_name", "u.last_name"], Some("%ann%")).unwrap();
        let (sql, params) = w.build();
        assert_eq!(sql, r#"("u"."first_name" ILIKE $1 OR "u"."last_name" ILIKE $1)"#);
        assert_eq!(params, vec![json!("%ann%")]);
    }

    #[test]
    fn criteria_reject_unknown_columns() {
        let mut w = FilterWhere::new("loans");
        let criteria = json!({ "password": "x" });
        let err = w.criteria(criteria.as_object().unwrap(), &["status", "group_id"]).err().unwrap();
        assert!(matches!(err, FilterError::InvalidColumn(c) if c == "password"));
    }

    #[test]
    fn criteria_arrays_become_in_lists() {
        let mut w = FilterWhere::new("loans");
        let criteria = json!({ "status": ["pending", "approved"], "group_id": 4 });
        w.criteria(criteria.as_object().unwrap(), &["status", "group_id"]).unwrap();
        let (sql, params) = w.build();
        assert_eq!(sql, r#""loans"."status" IN ($1, $2) AND "loans"."group_id" = $3"#);
        assert_eq!(params, vec![json!("pending"), json!("approved"), json!(4)]);
    }

    #[test]
    fn criteria_values_must_match_column_type() {
        let allowed = ["id", "country_name", "is_active"];
        for criteria in [
            json!({ "country_name": 5 }),
            json!({ "id": "abc" }),
            json!({ "id": 1.5 }),
            json!({ "is_active": "yes" }),
            json!({ "id": [1, "two"] }),
        ] {
            let mut w = FilterWhere::new("countries");
            let err = w.criteria(criteria.as_object().unwrap(), &allowed).err();
            assert!(matches!(err, Some(FilterError::InvalidFilterCriteria(_))), "{} accepted", criteria);
        }

        let mut w = FilterWhere::new("countries");
        let criteria = json!({ "id": [1, 2], "country_name": "Kenya", "is_active": true });
        w.criteria(criteria.as_object().unwrap(), &allowed).unwrap();
        assert_eq!(w.build().1, vec![json!(1), json!(2), json!("Kenya"), json!(true)]);
    }

    #[test]
    fn column_kind_follows_name() {
        assert_eq!(ColumnKind::of("id"), ColumnKind::Integer);
        assert_eq!(ColumnKind::of("gm.group_id"), ColumnKind::Integer);
        assert_eq!(ColumnKind::of("is_fully_paid"), ColumnKind::Boolean);
        assert_eq!(ColumnKind::of("status"), ColumnKind::Text);
    }

    #[test]
    fn empty_in_scope_matches_nothing() {
        let mut w = FilterWhere::new("members");
        w.scopes(&[Scope::any_of("id", Vec::<i64>::new())]).unwrap();
        assert_eq!(w.build().0, "1=0");
    }

    #[test]
    fn qualify_rejects_injection() {
        assert!(qualify("countries", "country_name; drop table users").is_err());
        assert_eq!(qualify("countries", "country_name").unwrap(), r#""countries"."country_name""#);
    }
}
