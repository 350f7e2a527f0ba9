use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::{FromRow, PgPool};

use crate::database::manager::DatabaseError;
use crate::filter::EntitySpec;

/// Foreign key from a level to the level above it.
#[derive(Debug, Clone, Copy)]
pub struct ParentKey {
    pub column: &'static str,
    pub field: &'static str,
    pub noun: &'static str,
    pub table: &'static str,
}

/// One level of the administrative geography tree.
#[derive(Debug)]
pub struct GeoLevel {
    pub noun: &'static str,
    pub path: &'static str,
    pub table: &'static str,
    pub name_column: &'static str,
    /// Request/response field carrying the name, e.g. `CountryName`.
    pub name_field: &'static str,
    pub sort_columns: &'static [&'static str],
    pub parent: Option<ParentKey>,
    /// Path of the level below, if any.
    pub children: Option<&'static str>,
}

macro_rules! parent {
    ($column:literal, $field:literal, $noun:literal, $table:literal) => {
        Some(ParentKey { column: $column, field: $field, noun: $noun, table: $table })
    };
}

pub static LEVELS: [GeoLevel; 11] = [
    GeoLevel {
        noun: "Country", path: "countries", table: "countries",
        name_column: "country_name", name_field: "CountryName", sort_columns: &["country_name"],
        parent: None, children: Some("regions"),
    },
    GeoLevel {
        noun: "Region", path: "regions", table: "regions",
        name_column: "region_name", name_field: "RegionName", sort_columns: &["region_name"],
        parent: parent!("country_id", "CountryID", "Country", "countries"), children: Some("counties"),
    },
    GeoLevel {
        noun: "County", path: "counties", table: "counties",
        name_column: "county_name", name_field: "CountyName", sort_columns: &["county_name"],
        parent: parent!("region_id", "RegionID", "Region", "regions"), children: Some("sub-counties"),
    },
    GeoLevel {
        noun: "SubCounty", path: "sub-counties", table: "sub_counties",
        name_column: "sub_county_name", name_field: "SubCountyName", sort_columns: &["sub_county_name"],
        parent: parent!("county_id", "CountyID", "County", "counties"), children: Some("wards"),
    },
    GeoLevel {
        noun: "Ward", path: "wards", table: "wards",
        name_column: "ward_name", name_field: "WardName", sort_columns: &["ward_name"],
        parent: parent!("sub_county_id", "SubCountyID", "SubCounty", "sub_counties"), children: Some("locations"),
    },
    GeoLevel {
        noun: "Location", path: "locations", table: "locations",
        name_column: "location_name", name_field: "LocationName", sort_columns: &["location_name"],
        parent: parent!("ward_id", "WardID", "Ward", "wards"), children: Some("sub-locations"),
    },
    GeoLevel {
        noun: "SubLocation", path: "sub-locations", table: "sub_locations",
        name_column: "sub_location_name", name_field: "SubLocationName", sort_columns: &["sub_location_name"],
        parent: parent!("location_id", "LocationID", "Location", "locations"), children: Some("villages"),
    },
    GeoLevel {
        noun: "Village", path: "villages", table: "villages",
        name_column: "village_name", name_field: "VillageName", sort_columns: &["village_name"],
        parent: parent!("sub_location_id", "SubLocationID", "SubLocation", "sub_locations"), children: Some("roads"),
    },
    GeoLevel {
        noun: "Road", path: "roads", table: "roads",
        name_column: "road_name", name_field: "RoadName", sort_columns: &["road_name"],
        parent: parent!("village_id", "VillageID", "Village", "villages"), children: Some("plots"),
    },
    GeoLevel {
        noun: "Plot", path: "plots", table: "plots",
        name_column: "plot_name", name_field: "PlotName", sort_columns: &["plot_name"],
        parent: parent!("road_id", "RoadID", "Road", "roads"), children: Some("units"),
    },
    GeoLevel {
        noun: "Unit", path: "units", table: "units",
        name_column: "unit_name", name_field: "UnitName", sort_columns: &["unit_name"],
        parent: parent!("plot_id", "PlotID", "Plot", "plots"), children: None,
    },
];

impl GeoLevel {
    pub fn by_path(path: &str) -> Option<&'static GeoLevel> {
        LEVELS.iter().find(|level| level.path == path)
    }

    pub fn child(&self) -> Option<&'static GeoLevel> {
        self.children.and_then(GeoLevel::by_path)
    }

    pub fn spec(&self) -> EntitySpec {
        let t = self.table;
        let parent = match self.parent {
            Some(parent) => format!("\"{}\".\"{}\" AS parent_id", t, parent.column),
            None => "NULL::BIGINT AS parent_id".to_string(),
        };
        let mut filters = vec!["id", self.name_column];
        filters.extend(self.parent.map(|p| p.column));

        EntitySpec::new(t)
            .select([
                format!("\"{}\".\"id\" AS id", t),
                format!("\"{}\".\"{}\" AS name", t, self.name_column),
                parent,
                format!("\"{}\".\"created_at\" AS created_at", t),
                format!("\"{}\".\"updated_at\" AS updated_at", t),
            ])
            .search([self.name_column])
            .filters(filters)
    }

    pub async fn insert(&self, pool: &PgPool, name: &str, parent_id: Option<i64>) -> Result<i64, DatabaseError> {
        let duplicate = format!("{} already exists", self.name_field);
        let id = match (self.parent, parent_id) {
            (Some(parent), Some(parent_id)) => {
                let query = format!(
                    "INSERT INTO \"{}\" (\"{}\", \"{}\") VALUES ($1, $2) RETURNING id",
                    self.table, self.name_column, parent.column
                );
                sqlx::query_scalar::<_, i64>(&query).bind(name).bind(parent_id).fetch_one(pool).await
            }
            _ => {
                let query = format!("INSERT INTO \"{}\" (\"{}\") VALUES ($1) RETURNING id", self.table, self.name_column);
                sqlx::query_scalar::<_, i64>(&query).bind(name).fetch_one(pool).await
            }
        }
        .map_err(|e| DatabaseError::on_write(e, &duplicate))?;
        Ok(id)
    }

    /// Renames and optionally re-parents a node.
    pub async fn update(&self, pool: &PgPool, id: i64, name: &str, parent_id: Option<i64>) -> Result<(), DatabaseError> {
        let duplicate = format!("{} already exists", self.name_field);
        let result = match (self.parent, parent_id) {
            (Some(parent), Some(parent_id)) => {
                let query = format!(
                    "UPDATE \"{}\" SET \"{}\" = $1, \"{}\" = $2, updated_at = NOW() WHERE id = $3",
                    self.table, self.name_column, parent.column
                );
                sqlx::query(&query).bind(name).bind(parent_id).bind(id).execute(pool).await
            }
            _ => {
                let query = format!(
                    "UPDATE \"{}\" SET \"{}\" = $1, updated_at = NOW() WHERE id = $2",
                    self.table, self.name_column
                );
                sqlx::query(&query).bind(name).bind(id).execute(pool).await
            }
        }
        .map_err(|e| DatabaseError::on_write(e, &duplicate))?;

        if result.rows_affected() == 0 {
            return Err(DatabaseError::NotFound(format!("{} not found", self.noun)));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct GeoNode {
    pub id: i64,
    pub name: String,
    pub parent_id: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::Filter;

    #[test]
    fn levels_chain_parent_to_child() {
        for pair in LEVELS.windows(2) {
            let (upper, lower) = (&pair[0], &pair[1]);
            assert_eq!(upper.children, Some(lower.path));
            assert_eq!(lower.parent.map(|p| p.table), Some(upper.table));
        }
        assert!(LEVELS[0].parent.is_none());
        assert!(LEVELS[10].child().is_none());
    }

    #[test]
    fn lookup_by_path() {
        let level = GeoLevel::by_path("sub-counties").unwrap();
        assert_eq!(level.table, "sub_counties");
        assert_eq!(level.child().map(|c| c.noun), Some("Ward"));
        assert!(GeoLevel::by_path("cities").is_none());
    }

    #[test]
    fn root_level_selects_null_parent() {
        let sql = Filter::new(LEVELS[0].spec()).unwrap().to_sql().unwrap();
        assert!(sql.query.contains("NULL::BIGINT AS parent_id"));
        assert!(sql.query.starts_with(r#"SELECT "countries"."id" AS id, "countries"."country_name" AS name"#));
    }
}
