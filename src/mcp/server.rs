//! MCP server implementation using pmcp (Pragmatic AI's rust-mcp-sdk).
//!
//! Every registry tool is advertised with a JSON Schema generated from its
//! descriptor; `tools/call` goes through the [`Dispatcher`] and returns the
//! serialized Tool Result. Served over stdio or streamable HTTP.

use async_trait::async_trait;
use pmcp::{
    server::streamable_http_server::StreamableHttpServer, Error, RequestHandlerExtra, Server,
    ServerCapabilities, ToolHandler, ToolInfo,
};
use serde_json::{Map, Value};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

use super::dispatcher::Dispatcher;
use crate::models::{ToolRequest, ToolResult};

/// The MCP server
#[derive(Debug, Clone)]
pub struct McpServer {
    server: Arc<Mutex<Server>>,
}

impl McpServer {
    /// Create a new MCP server around `dispatcher`
    ///
    /// `request_timeout` is the transport deadline for one `tools/call`.
    pub fn new(dispatcher: Dispatcher, request_timeout: Duration) -> Result<Self, Error> {
        let mut builder = Server::builder()
            .name(env!("CARGO_PKG_NAME"))
            .version(env!("CARGO_PKG_VERSION"))
            .capabilities(ServerCapabilities::default());

        for descriptor in dispatcher.tools() {
            let wrapper = ToolWrapper {
                name: descriptor.name.clone(),
                description: descriptor.description.clone(),
                input_schema: descriptor.input_schema(),
                dispatcher: dispatcher.clone(),
                request_timeout,
            };
            builder = builder.tool(wrapper.name.clone(), wrapper);
        }

        Ok(Self {
            server: Arc::new(Mutex::new(builder.build()?)),
        })
    }

    /// Run the server in stdio mode
    pub async fn run_stdio(self) -> Result<(), Error> {
        tracing::info!("Starting MCP server in stdio mode");

        // run_stdio() takes ownership of the Server
        let server = Arc::try_unwrap(self.server)
            .map_err(|_| Error::internal("MCP server is still shared"))?
            .into_inner();

        server.run_stdio().await
    }

    /// Run the server in streamable HTTP mode
    pub async fn run_http(&self, addr: &str) -> Result<(SocketAddr, JoinHandle<()>), Error> {
        let socket_addr: SocketAddr = addr
            .parse()
            .map_err(|e| Error::invalid_params(format!("Invalid address '{}': {}", addr, e)))?;

        tracing::info!("Starting MCP server in HTTP mode on {}", socket_addr);
        StreamableHttpServer::new(socket_addr, self.server.clone())
            .start()
            .await
    }
}

/// Adapts one registry tool to pmcp's ToolHandler
#[derive(Debug, Clone)]
struct ToolWrapper {
    name: String,
    description: String,
    input_schema: Value,
    dispatcher: Dispatcher,
    request_timeout: Duration,
}

/// `tools/call` arguments must be an object; absent means no arguments
fn into_arguments(args: Value) -> Result<Map<String, Value>, Error> {
    match args {
        Value::Object(map) => Ok(map),
        Value::Null => Ok(Map::new()),
        other => Err(Error::invalid_params(format!(
            "Tool arguments must be a JSON object, got {}",
            match other {
                Value::Array(_) => "an array",
                Value::String(_) => "a string",
                Value::Number(_) => "a number",
                _ => "a boolean",
            }
        ))),
    }
}

#[async_trait]
impl ToolHandler for ToolWrapper {
    async fn handle(&self, args: Value, _extra: RequestHandlerExtra) -> Result<Value, Error> {
        let request = ToolRequest {
            tool: self.name.clone(),
            arguments: into_arguments(args)?,
        };

        let result: ToolResult =
            tokio::time::timeout(self.request_timeout, self.dispatcher.invoke(&request))
                .await
                .map_err(|_| Error::internal(format!("{} exceeded the request deadline", self.name)))?;

        serde_json::to_value(result).map_err(|e| Error::internal(e.to_string()))
    }

    fn metadata(&self) -> Option<ToolInfo> {
        Some(ToolInfo::new(
            self.name.clone(),
            Some(self.description.clone()),
            self.input_schema.clone(),
        ))
    }
}
