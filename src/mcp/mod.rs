//! MCP (Model Context Protocol) implementation.
//!
//! - [`ToolRegistry`]: named tools bound to adapter operations
//! - [`Arguments`]: argument validation against a tool descriptor
//! - [`Dispatcher`]: lookup, validation, execution and error mapping
//! - [`McpServer`]: the pmcp transport over stdio or streamable HTTP

mod dispatcher;
mod schema;
pub mod server;
mod tools;

pub use dispatcher::{map_source_error, Dispatcher};
pub use schema::Arguments;
pub use server::McpServer;
pub use tools::{RegistryError, Tool, ToolHandler, ToolRegistry};
