//! Error types for the catalog layer.

use thiserror::Error;

/// Catalog operation result type.
pub type Result<T> = std::result::Result<T, CatalogError>;

/// Catalog errors.
#[derive(Error, Debug)]
pub enum CatalogError {
    /// The store could not be reached within the reconnection budget.
    #[error("catalog unavailable after {attempts} attempts ({op})")]
    Unavailable { op: &'static str, attempts: u32 },

    /// Unique constraint violated (production or artifact name exists).
    #[error("conflict: {0}")]
    Conflict(String),

    /// Row lookup came back empty.
    #[error("not found: {0}")]
    NotFound(String),

    /// Any other SQLx failure (malformed query, type mismatch, ...).
    #[error("catalog error: {0}")]
    Sqlx(#[from] sqlx::Error),

    /// A stored value could not be interpreted (unknown status code, ...).
    #[error("invalid catalog data: {0}")]
    InvalidData(String),
}

impl CatalogError {
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn invalid_data(msg: impl Into<String>) -> Self {
        Self::InvalidData(msg.into())
    }
}
