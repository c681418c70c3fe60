//! MCP server constants.

/// MCP protocol version supported by this server.
pub const MCP_PROTOCOL_VERSION: &str = "2024-11-05";

/// Server name as reported during MCP initialization.
pub const SERVER_NAME: &str = "lookout";

/// Server version as reported during MCP initialization.
pub const SERVER_VERSION: &str = env!("CARGO_PKG_VERSION");
