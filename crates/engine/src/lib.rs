// pathways-engine library entry point: persistence and the restoration runner.

pub mod config;
pub mod error;
pub mod restore;
pub mod service;
pub mod store;

pub use error::RestoreError;
pub use service::PathwaysService;
pub use store::meta_db::MetaDb;
