//! imessage-mcp - iMessage tools for AI agents
//!
//! Reads the local Messages database, sends through Messages.app via
//! AppleScript, and exposes both as MCP tools over stdio or HTTP.

pub mod automation;
pub mod contacts;
pub mod error;
pub mod mcp;
pub mod store;
pub mod types;
pub mod watch;

pub use error::{ErrorKind, IMessageError, Result};
pub use store::Store;
pub use types::*;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
