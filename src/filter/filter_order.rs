use super::error::FilterError;
use super::filter_where::qualify;
use super::types::FilterOrderInfo;

pub struct FilterOrder;

impl FilterOrder {
    /// `ORDER BY` on the chosen column with the primary key as tie-breaker,
    /// so OFFSET pages stay stable when the sort column has duplicates.
    pub fn generate(table: &str, info: Option<&FilterOrderInfo>) -> Result<String, FilterError> {
        let id = qualify(table, "id")?;
        let Some(info) = info else { return Ok(format!("ORDER BY {} ASC", id)) };

        let column = qualify(table, info.column)?;
        if column == id {
            return Ok(format!("ORDER BY {} {}", id, info.sort.to_sql()));
        }
        Ok(format!("ORDER BY {} {}, {} ASC", column, info.sort.to_sql(), id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::types::SortDirection;

    #[test]
    fn orders_by_qualified_column_then_id() {
        let info = FilterOrderInfo { column: "country_name", sort: SortDirection::Desc };
        assert_eq!(
            FilterOrder::generate("countries", Some(&info)).unwrap(),
            r#"ORDER BY "countries"."country_name" DESC, "countries"."id" ASC"#
        );
    }

    #[test]
    fn defaults_to_id() {
        assert_eq!(FilterOrder::generate("roles", None).unwrap(), r#"ORDER BY "roles"."id" ASC"#);
    }
}
