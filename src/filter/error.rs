use thiserror::Error;

#[derive(Error, Debug)]
pub enum FilterError {
    #[error("Invalid table name: {0}")]
    InvalidTableName(String),

    #[error("Invalid column name: {0}")]
    InvalidColumn(String),

    #[error("Invalid filter criteria: {0}")]
    InvalidFilterCriteria(String),

    #[error("Invalid scope: {0}")]
    InvalidScope(String),

    #[error("JSON parsing error: {0}")]
    JsonError(#[from] serde_json::Error),
}
