//! MCP (Model Context Protocol) server implementation
//!
//! JSON-RPC over stdio, and optionally HTTP, exposing the iMessage tools.

pub mod handler;
#[cfg(feature = "http")]
pub mod http;
pub mod protocol;
pub mod tools;

pub use handler::IMessageHandler;
pub use protocol::{
    methods, process_line, InitializeResult, McpHandler, McpRequest, McpResponse, McpServer,
    ToolCallResult,
};
pub use tools::{get_tool_definitions, TOOL_DEFINITIONS};
