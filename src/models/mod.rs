//! Core data models for records, tools and search operations.

mod query;
mod record;
mod tool;

pub use query::{Page, SearchQuery};
pub use record::{Record, RecordBuilder, SourceKind};
pub use tool::{
    ErrorKind, ParamSpec, ParamType, ToolDescriptor, ToolError, ToolRequest, ToolResult,
};
