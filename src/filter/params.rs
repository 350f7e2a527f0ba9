use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::HashMap;

use super::error::FilterError;
use super::types::SortDirection;
use crate::config::FilterConfig;

/// Shortest search term that is applied; shorter terms are ignored.
pub const MIN_SEARCH_LEN: usize = 3;

/// Per-route paging rules: sortable columns and defaults.
#[derive(Debug, Clone)]
pub struct QueryRules {
    pub sort_columns: &'static [&'static str],
    pub default_sort: &'static str,
    pub default_page: i64,
    pub default_limit: i64,
    pub max_limit: Option<i64>,
}

impl QueryRules {
    pub const fn new(sort_columns: &'static [&'static str], default_sort: &'static str) -> Self {
        Self {
            sort_columns,
            default_sort,
            default_page: 1,
            default_limit: 9,
            max_limit: None,
        }
    }

    pub fn with_config(mut self, config: &FilterConfig) -> Self {
        self.default_page = config.default_page.max(1);
        self.default_limit = config.default_limit.max(1);
        self.max_limit = config.max_limit;
        self
    }
}

/// Canonical page request produced from raw query parameters.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PageRequest {
    pub page: i64,
    pub limit: i64,
    pub skip: i64,
    pub sort_order: SortDirection,
    pub sort_column: &'static str,
    /// `%term%`, present only when the term is long enough.
    pub search: Option<String>,
    pub filters: Map<String, Value>,
}

impl PageRequest {
    pub fn from_query(query: &HashMap<String, String>, rules: &QueryRules) -> Result<Self, FilterError> {
        let mut page = positive(query.get("page")).unwrap_or(rules.default_page);
        let mut limit = positive(query.get("limit")).unwrap_or(rules.default_limit);
        if let Some(max) = rules.max_limit {
            if limit > max {
                tracing::debug!("Limit {} exceeds max {}, capping to max", limit, max);
                limit = max;
            }
        }

        // A window past i64::MAX rows cannot exist; treat it like a garbage page.
        let skip = match (page - 1).checked_mul(limit) {
            Some(skip) => skip,
            None => {
                tracing::debug!("Page {} with limit {} overflows, using default page", page, limit);
                page = rules.default_page;
                (page - 1).saturating_mul(limit)
            }
        };

        let sort_order = SortDirection::parse_lenient(query.get("sortOrder").map(String::as_str));
        let sort_column = query
            .get("sortByColumn")
            .and_then(|requested| rules.sort_columns.iter().find(|c| **c == requested.as_str()))
            .copied()
            .unwrap_or(rules.default_sort);

        let search = query
            .get("search")
            .filter(|term| term.chars().count() >= MIN_SEARCH_LEN)
            .map(|term| format!("%{}%", term));

        let filters = parse_filters(query.get("filters").map(String::as_str).unwrap_or("{}"))?;

        Ok(Self {
            page,
            limit,
            skip,
            sort_order,
            sort_column,
            search,
            filters,
        })
    }
}

fn positive(raw: Option<&String>) -> Option<i64> {
    raw.and_then(|v| v.trim().parse::<i64>().ok()).filter(|v| *v >= 1)
}

fn parse_filters(raw: &str) -> Result<Map<String, Value>, FilterError> {
    match serde_json::from_str::<Value>(raw)? {
        Value::Object(map) => Ok(map),
        Value::Null => Ok(Map::new()),
        other => Err(FilterError::InvalidFilterCriteria(other.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const COUNTRIES: QueryRules = QueryRules::new(&["country_name"], "country_name");

    fn query(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    #[test]
    fn defaults_when_empty() {
        let req = PageRequest::from_query(&HashMap::new(), &COUNTRIES).unwrap();
        assert_eq!(req.page, 1);
        assert_eq!(req.limit, 9);
        assert_eq!(req.skip, 0);
        assert_eq!(req.sort_order, SortDirection::Asc);
        assert_eq!(req.sort_column, "country_name");
        assert_eq!(req.search, None);
        assert!(req.filters.is_empty());
    }

    #[test]
    fn skip_follows_page_and_limit() {
        let req = PageRequest::from_query(&query(&[("page", "3"), ("limit", "20")]), &COUNTRIES).unwrap();
        assert_eq!(req.skip, 40);
    }

    #[test]
    fn garbage_numbers_fall_back() {
        let req = PageRequest::from_query(&query(&[("page", "-2"), ("limit", "abc")]), &COUNTRIES).unwrap();
        assert_eq!((req.page, req.limit), (1, 9));
        let req = PageRequest::from_query(&query(&[("page", "0"), ("limit", "0")]), &COUNTRIES).unwrap();
        assert_eq!((req.page, req.limit), (1, 9));
    }

    #[test]
    fn oversized_page_falls_back_instead_of_overflowing() {
        let max = i64::MAX.to_string();
        let req = PageRequest::from_query(&query(&[("page", max.as_str()), ("limit", "2")]), &COUNTRIES).unwrap();
        assert_eq!((req.page, req.limit, req.skip), (1, 2, 0));

        let uncapped = QueryRules { max_limit: None, ..COUNTRIES };
        let req = PageRequest::from_query(&query(&[("page", max.as_str()), ("limit", max.as_str())]), &uncapped).unwrap();
        assert_eq!((req.page, req.skip), (1, 0));

        let req = PageRequest::from_query(&query(&[("page", "4611686018427387904"), ("limit", "2")]), &uncapped).unwrap();
        assert_eq!(req.skip, 9223372036854775806);
    }

    #[test]
    fn sort_column_outside_whitelist_uses_default() {
        let req = PageRequest::from_query(&query(&[("sortByColumn", "droptable")]), &COUNTRIES).unwrap();
        assert_eq!(req.sort_column, "country_name");
    }

    #[test]
    fn sort_order_is_case_insensitive() {
        let req = PageRequest::from_query(&query(&[("sortOrder", "DESC")]), &COUNTRIES).unwrap();
        assert_eq!(req.sort_order, SortDirection::Desc);
        let req = PageRequest::from_query(&query(&[("sortOrder", "sideways")]), &COUNTRIES).unwrap();
        assert_eq!(req.sort_order, SortDirection::Asc);
    }

    #[test]
    fn short_search_is_ignored() {
        let req = PageRequest::from_query(&query(&[("search", "ke")]), &COUNTRIES).unwrap();
        assert_eq!(req.search, None);
        let req = PageRequest::from_query(&query(&[("search", "ken")]), &COUNTRIES).unwrap();
        assert_eq!(req.search.as_deref(), Some("%ken%"));
    }

    #[test]
    fn filters_must_be_a_json_object() {
        let req = PageRequest::from_query(&query(&[("filters", r#"{"status":"pending"}"#)]), &COUNTRIES).unwrap();
        assert_eq!(req.filters.get("status"), Some(&json!("pending")));

        assert!(PageRequest::from_query(&query(&[("filters", "{oops")]), &COUNTRIES).is_err());
        assert!(PageRequest::from_query(&query(&[("filters", "[1,2]")]), &COUNTRIES).is_err());
    }

    #[test]
    fn limit_is_capped_by_config() {
        let rules = QueryRules { max_limit: Some(50), ..COUNTRIES };
        let req = PageRequest::from_query(&query(&[("limit", "500")]), &rules).unwrap();
        assert_eq!(req.limit, 50);
    }
}
