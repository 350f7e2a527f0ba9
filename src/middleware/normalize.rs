use axum::{
    extract::{Request, State},
    middleware::{from_fn_with_state, Next},
    response::Response,
    routing::MethodRouter,
};
use std::collections::HashMap;

use crate::error::ApiError;
use crate::filter::{PageRequest, QueryRules};
use crate::state::AppState;

/// Attaches the paging normalizer to a route; handlers read the result
/// through `Extension<PageRequest>`.
pub fn paged(route: MethodRouter<AppState>, rules: QueryRules) -> MethodRouter<AppState> {
    route.route_layer(from_fn_with_state(rules, normalize))
}

pub async fn normalize(State(rules): State<QueryRules>, mut request: Request, next: Next) -> Result<Response, ApiError> {
    let query = parse_query(request.uri().query());
    let page = PageRequest::from_query(&query, &rules)?;

    tracing::debug!(
        page = page.page,
        limit = page.limit,
        sort = page.sort_column,
        search = page.search.is_some(),
        "Query normalized"
    );

    request.extensions_mut().insert(page);
    Ok(next.run(request).await)
}

/// Last value wins for repeated keys.
fn parse_query(raw: Option<&str>) -> HashMap<String, String> {
    raw.map(|q| url::form_urlencoded::parse(q.as_bytes()).into_owned().collect())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn query_values_are_percent_decoded() {
        let query = parse_query(Some("search=mary%20ann&filters=%7B%22status%22%3A%22pending%22%7D&page=2"));
        assert_eq!(query["search"], "mary ann");
        assert_eq!(query["filters"], r#"{"status":"pending"}"#);
        assert_eq!(query["page"], "2");
    }

    #[test]
    fn missing_query_is_empty() {
        assert!(parse_query(None).is_empty());
    }
}
