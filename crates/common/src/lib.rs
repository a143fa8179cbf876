// pathways-common: record types and pure logic shared across the Pathways workspace

pub mod catalog;
pub mod machine;
pub mod summary;
pub mod types;
