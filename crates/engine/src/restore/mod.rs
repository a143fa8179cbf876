// Restoration workflow over the metadata store.

pub mod catalog;
pub mod collection;
pub mod root;
pub mod runner;
pub mod session;
pub mod session_state;
