//! CLI command implementations.

pub mod create_credential;
pub mod delete_production;
pub mod error;
pub mod launch;
pub mod mc_production;
pub mod reco_production;
pub mod reco_submit;
pub mod report_jobs;
pub mod serve;
pub mod sites;
pub mod verify_production;

use anyhow::Result;
use gridflow_db::{Catalog, CatalogConfig};

/// Global options shared by every command.
pub struct Context {
    pub database: String,
    pub verbose: bool,
}

impl Context {
    /// Open the catalog and make sure the schema exists.
    pub async fn open_catalog(&self) -> Result<Catalog> {
        let config = CatalogConfig {
            url: self.database.clone(),
            ..CatalogConfig::sqlite("")
        };
        let catalog = Catalog::open_with(config).await?;
        catalog.init_schema().await?;
        Ok(catalog)
    }
}
