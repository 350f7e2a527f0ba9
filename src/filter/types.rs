use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    Asc,
    Desc,
}

impl SortDirection {
    pub fn to_sql(&self) -> &'static str {
        match self {
            SortDirection::Asc => "ASC",
            SortDirection::Desc => "DESC",
        }
    }

    /// Lower-cases the raw value; anything other than "asc"/"desc" is ascending.
    pub fn parse_lenient(raw: Option<&str>) -> Self {
        match raw.map(|s| s.to_ascii_lowercase()).as_deref() {
            Some("desc") => SortDirection::Desc,
            _ => SortDirection::Asc,
        }
    }
}

#[derive(Debug, Clone)]
pub struct FilterOrderInfo {
    pub column: &'static str,
    pub sort: SortDirection,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinKind {
    Inner,
    Left,
}

/// A relation attached to the base table: `<kind> JOIN table AS alias ON left = right`.
#[derive(Debug, Clone, PartialEq)]
pub struct Join {
    pub kind: JoinKind,
    pub table: &'static str,
    pub alias: &'static str,
    pub left: &'static str,
    pub right: &'static str,
}

impl Join {
    pub const fn left(table: &'static str, alias: &'static str, left: &'static str, right: &'static str) -> Self {
        Self { kind: JoinKind::Left, table, alias, left, right }
    }

    pub const fn inner(table: &'static str, alias: &'static str, left: &'static str, right: &'static str) -> Self {
        Self { kind: JoinKind::Inner, table, alias, left, right }
    }
}

/// Caller-supplied constraint narrowing a query to a subset of rows.
#[derive(Debug, Clone, PartialEq)]
pub enum Scope {
    Eq { column: &'static str, value: Value },
    In { column: &'static str, values: Vec<Value> },
    Via { join: Join, column: &'static str, value: Value },
}

impl Scope {
    pub fn eq(column: &'static str, value: impl Into<Value>) -> Self {
        Scope::Eq { column, value: value.into() }
    }

    pub fn any_of<V: Into<Value>>(column: &'static str, values: impl IntoIterator<Item = V>) -> Self {
        Scope::In { column, values: values.into_iter().map(Into::into).collect() }
    }

    pub fn via(join: Join, column: &'static str, value: impl Into<Value>) -> Self {
        Scope::Via { join, column, value: value.into() }
    }

    /// Equality on an identifier; zero or negative means "no constraint".
    pub fn positive(column: &'static str, id: i64) -> Option<Self> {
        (id > 0).then(|| Scope::eq(column, id))
    }

    /// Join-based constraint on an identifier; zero or negative means "no constraint".
    pub fn positive_via(join: Join, column: &'static str, id: i64) -> Option<Self> {
        (id > 0).then(|| Scope::via(join, column, id))
    }
}

/// Value type a filterable column accepts, read from the column's name:
/// `id` and `*_id` are integers, `is_*` are booleans, everything else is text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnKind {
    Integer,
    Boolean,
    Text,
}

impl ColumnKind {
    pub fn of(column: &str) -> Self {
        let name = column.rsplit_once('.').map(|(_, name)| name).unwrap_or(column);
        if name == "id" || name.ends_with("_id") {
            ColumnKind::Integer
        } else if name.starts_with("is_") {
            ColumnKind::Boolean
        } else {
            ColumnKind::Text
        }
    }

    /// Null always matches; it becomes `IS NULL`.
    pub fn accepts(self, value: &Value) -> bool {
        match (self, value) {
            (_, Value::Null) => true,
            (ColumnKind::Integer, Value::Number(n)) => n.is_i64(),
            (ColumnKind::Boolean, Value::Bool(_)) => true,
            (ColumnKind::Text, Value::String(_)) => true,
            _ => false,
        }
    }
}

/// Static description of how an entity is queried.
#[derive(Debug, Clone)]
pub struct EntitySpec {
    pub table: &'static str,
    /// Select expressions; trusted text from entity definitions only.
    pub select: Vec<String>,
    /// To-one relations loaded with the row.
    pub joins: Vec<Join>,
    pub search_columns: Vec<&'static str>,
    pub filter_columns: Vec<&'static str>,
}

impl EntitySpec {
    pub fn new(table: &'static str) -> Self {
        Self {
            table,
            select: vec![],
            joins: vec![],
            search_columns: vec![],
            filter_columns: vec![],
        }
    }

    pub fn select<S: Into<String>>(mut self, columns: impl IntoIterator<Item = S>) -> Self {
        self.select = columns.into_iter().map(Into::into).collect();
        self
    }

    pub fn join(mut self, join: Join) -> Self {
        self.joins.push(join);
        self
    }

    pub fn search(mut self, columns: impl IntoIterator<Item = &'static str>) -> Self {
        self.search_columns = columns.into_iter().collect();
        self
    }

    pub fn filters(mut self, columns: impl IntoIterator<Item = &'static str>) -> Self {
        self.filter_columns = columns.into_iter().collect();
        self
    }
}

#[derive(Debug, Clone)]
pub struct SqlResult {
    pub query: String,
    pub params: Vec<Value>,
}
