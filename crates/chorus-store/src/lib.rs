pub mod database;
pub mod error;
pub mod group_messages;
pub mod messages;
pub mod migrations;
pub mod mirror;
pub mod models;
pub mod read_states;

pub use database::Database;
pub use error::{Result, StoreError};
pub use mirror::SqliteMirror;
