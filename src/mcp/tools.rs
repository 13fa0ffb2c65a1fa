//! Tool registry for MCP tools.

use std::collections::HashMap;
use std::sync::Arc;

use super::schema::Arguments;
use crate::models::{Page, SourceKind, ToolDescriptor};
use crate::sources::{Source, SourceError, SourceRegistry};

/// A callable tool: its descriptor bound to the adapter operation behind it
#[derive(Clone)]
pub struct Tool {
    /// Name, parameters and description advertised to callers
    pub descriptor: ToolDescriptor,

    /// Source whose adapter executes this tool
    pub source: SourceKind,

    /// Handler executing the adapter operation
    pub handler: Arc<dyn ToolHandler>,
}

impl Tool {
    pub fn new(
        descriptor: ToolDescriptor,
        source: SourceKind,
        handler: Arc<dyn ToolHandler>,
    ) -> Self {
        Self {
            descriptor,
            source,
            handler,
        }
    }

    /// Tool name
    pub fn name(&self) -> &str {
        &self.descriptor.name
    }
}

impl std::fmt::Debug for Tool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Tool")
            .field("name", &self.descriptor.name)
            .field("source", &self.source)
            .field("parameters", &self.descriptor.parameters.len())
            .finish()
    }
}

/// Handler for executing a tool
///
/// Arguments reach the handler already validated against the tool's
/// descriptor, with defaults applied.
#[async_trait::async_trait]
pub trait ToolHandler: Send + Sync + std::fmt::Debug {
    /// Execute the tool with the given arguments
    async fn call(&self, args: &Arguments) -> Result<Page, SourceError>;
}

/// Errors raised while building the registry
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    #[error("Tool '{0}' is already registered")]
    DuplicateTool(String),

    #[error("Tool '{0}' not found")]
    UnknownTool(String),
}

/// Registry for all tools
///
/// Built once at startup; read-only afterwards, so lookups need no locking.
#[derive(Debug, Clone, Default)]
pub struct ToolRegistry {
    tools: HashMap<String, Tool>,
    order: Vec<String>,
}

impl ToolRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a registry holding every tool of every source in `sources`
    pub fn from_sources(sources: &SourceRegistry) -> Result<Self, RegistryError> {
        let mut registry = Self::new();
        for source in sources.all() {
            registry.register_source(Arc::clone(source))?;
        }

        tracing::debug!("Registered {} tools", registry.len());
        Ok(registry)
    }

    /// Register all tools exposed by one adapter
    pub fn register_source(&mut self, source: Arc<dyn Source>) -> Result<(), RegistryError> {
        for tool in source.tools() {
            self.register(tool)?;
        }
        Ok(())
    }

    /// Register a tool; names must be unique
    pub fn register(&mut self, tool: Tool) -> Result<(), RegistryError> {
        let name = tool.name().to_string();
        if self.tools.contains_key(&name) {
            return Err(RegistryError::DuplicateTool(name));
        }

        self.order.push(name.clone());
        self.tools.insert(name, tool);
        Ok(())
    }

    /// Resolve a tool by exact name
    pub fn lookup(&self, name: &str) -> Result<&Tool, RegistryError> {
        self.tools
            .get(name)
            .ok_or_else(|| RegistryError::UnknownTool(name.to_string()))
    }

    /// Get a tool by name
    pub fn get(&self, name: &str) -> Option<&Tool> {
        self.tools.get(name)
    }

    /// All descriptors, in registration order
    pub fn list(&self) -> Vec<&ToolDescriptor> {
        self.all().map(|tool| &tool.descriptor).collect()
    }

    /// All tools, in registration order
    pub fn all(&self) -> impl Iterator<Item = &Tool> {
        self.order.iter().filter_map(|name| self.tools.get(name))
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ParamSpec;

    #[derive(Debug)]
    struct EmptyHandler;

    #[async_trait::async_trait]
    impl ToolHandler for EmptyHandler {
        async fn call(&self, _args: &Arguments) -> Result<Page, SourceError> {
            Ok(Page::empty())
        }
    }

    fn tool(name: &str) -> Tool {
        Tool::new(
            ToolDescriptor::new(name, "test tool")
                .param(ParamSpec::string("query", "terms").required()),
            SourceKind::PubMed,
            Arc::new(EmptyHandler),
        )
    }

    #[test]
    fn test_register_and_lookup() {
        let mut registry = ToolRegistry::new();
        registry.register(tool("a_search")).unwrap();
        registry.register(tool("a_fetch")).unwrap();

        assert_eq!(registry.len(), 2);
        assert_eq!(registry.lookup("a_fetch").unwrap().name(), "a_fetch");
        assert_eq!(
            registry.lookup("missing").unwrap_err(),
            RegistryError::UnknownTool("missing".to_string())
        );
    }

    #[test]
    fn test_duplicate_rejected() {
        let mut registry = ToolRegistry::new();
        registry.register(tool("a_search")).unwrap();

        assert_eq!(
            registry.register(tool("a_search")).unwrap_err(),
            RegistryError::DuplicateTool("a_search".to_string())
        );
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_list_keeps_registration_order() {
        let mut registry = ToolRegistry::new();
        for name in ["z_tool", "a_tool", "m_tool"] {
            registry.register(tool(name)).unwrap();
        }

        let names: Vec<&str> = registry.list().iter().map(|d| d.name.as_str()).collect();
        assert_eq!(names, vec!["z_tool", "a_tool", "m_tool"]);
    }
}
