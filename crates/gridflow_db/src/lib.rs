//! Production catalog for GridFlow.
//!
//! A narrow CRUD interface over SQLite via sqlx. The single exported
//! contract is: each public operation either succeeds against a valid
//! session or returns [`CatalogError::Unavailable`] after exhausting a
//! bounded reconnection budget. Callers never see reconnection.
//!
//! # Example
//!
//! ```rust,ignore
//! use gridflow_db::Catalog;
//!
//! let catalog = Catalog::open("sqlite:prod.sqlite?mode=rwc").await?;
//! catalog.init_schema().await?;
//! let prod_id = catalog.create_mc_production(&spec).await?;
//! ```

pub mod catalog;
pub mod error;
pub mod models;
pub mod schema;

pub use catalog::{Catalog, CatalogConfig, McProductionSpec, ProdKind, RecoProductionSpec};
pub use error::{CatalogError, Result};
pub use models::{FileRow, JobRow, JobSubmitRow, ProductionRow};
