//! Read-only access to the Messages store
//!
//! Opens `~/Library/Messages/chat.db` without ever writing to it, tolerates
//! schema drift across macOS releases, and maps rows into normalized records.

pub mod body;
mod connection;
pub mod export;
pub mod queries;
pub mod schema;

pub use connection::Store;
pub use schema::{StoreSchema, Table};
