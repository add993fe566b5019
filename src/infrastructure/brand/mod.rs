mod config_catalog;

pub use config_catalog::ConfigBrandCatalog;
