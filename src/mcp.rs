use std::sync::Arc;

use rmcp::{
    ServerHandler,
    ServiceExt,
    handler::server::{router::tool::ToolRouter, wrapper::Parameters},
    model::{
        CallToolResult,
        Content,
        Implementation,
        ServerCapabilities,
        ServerInfo,
    },
    tool,
    tool_handler,
    tool_router,
};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::{
    engine::{Engine, SearchOutcome},
    error,
    response::Response,
};

/// How many matched records the text summary lists before eliding.
const SUMMARY_PREVIEW: usize = 5;

#[derive(Clone)]
pub struct SieveMcpServer {
    engine: Arc<Engine>,
    tool_router: ToolRouter<Self>,
}

impl SieveMcpServer {
    pub fn new(engine: Arc<Engine>) -> Self {
        Self {
            engine,
            tool_router: Self::tool_router(),
        }
    }
}

#[tool_router(router = tool_router)]
impl SieveMcpServer {
    /// Run a boolean prefix query against the loaded records.
    #[tool(
        name = "sieve_query",
        description = "Query indexed records. The query is an object such as {\"and\": [\"type:p\", \"name:j*\", {\"or\": [\"!type:v\"]}], \"select\": [\"name\"], \"wel\": 20}. Terms are field:value prefixes; * and ? are wildcards; a leading ! selects everything in that field except the value."
    )]
    pub async fn sieve_query(
        &self,
        params: Parameters<QueryParams>,
    ) -> Result<CallToolResult, rmcp::ErrorData> {
        let query = params.0.query;
        let engine = self.engine.clone();
        let outcome = tokio::task::spawn_blocking(move || engine.search_value(&query))
            .await
            .map_err(|e| mcp_error("query worker failed", e))?;

        match outcome {
            Ok(outcome) => {
                let summary = format_summary(&outcome);
                let structured = serde_json::to_value(Response::search(outcome))
                    .map_err(|e| mcp_error("failed to serialize results", e))?;
                {
                    let mut result = CallToolResult::success(vec![Content::text(summary)]);
                    result.structured_content = Some(structured);
                    Ok(result)
                }
            }
            Err(e) if e.is_client_error() => {
                let response = Response::failed(&e);
                let structured = serde_json::to_value(&response)
                    .map_err(|e| mcp_error("failed to serialize results", e))?;
                {
                    let mut result = CallToolResult::error(vec![Content::text(response.message)]);
                    result.structured_content = Some(structured);
                    Ok(result)
                }
            }
            Err(e) => Err(mcp_error("query failed", e)),
        }
    }

    /// List the field paths present in the index.
    #[tool(
        name = "sieve_keys",
        description = "List every field path present in the indexed records, e.g. name, addresses:city."
    )]
    pub async fn sieve_keys(&self) -> Result<CallToolResult, rmcp::ErrorData> {
        let fields = self.engine.field_paths();
        let text = fields.join("\n");
        let structured = serde_json::to_value(Response::keys(fields))
            .map_err(|e| mcp_error("failed to serialize keys", e))?;
        {
            let mut result = CallToolResult::success(vec![Content::text(text)]);
            result.structured_content = Some(structured);
            Ok(result)
        }
    }
}

#[tool_handler(router = self.tool_router)]
impl ServerHandler for SieveMcpServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo::new(ServerCapabilities::builder().enable_tools().build())
            .with_server_info(
                Implementation::new("sieve", env!("CARGO_PKG_VERSION")).with_title("sieve MCP"),
            )
            .with_instructions(
                "Use sieve_keys to discover fields, then sieve_query with field:value terms combined under and/or.",
            )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct QueryParams {
    /// Query object with an "and" or "or" list, plus optional "select" and "wel".
    pub query: Value,
}

fn format_summary(outcome: &SearchOutcome) -> String {
    if outcome.count() == 0 {
        return "No records matched".to_string();
    }

    let suffix = if outcome.count() == 1 { "" } else { "s" };
    let mut lines = vec![format!("Matched {} record{suffix}:", outcome.count())];
    for (id, view) in outcome.records.iter().zip(&outcome.views).take(SUMMARY_PREVIEW) {
        lines.push(format!("#{id} {view}"));
    }
    if outcome.count() > SUMMARY_PREVIEW {
        lines.push(format!("... {} more", outcome.count() - SUMMARY_PREVIEW));
    }
    if outcome.truncated() {
        lines.push("Expansion limit reached; results may be incomplete.".to_string());
    }
    lines.join("\n")
}

fn mcp_error(message: &str, error: impl std::fmt::Display) -> rmcp::ErrorData {
    rmcp::ErrorData::internal_error(
        message.to_string(),
        Some(json!({ "error": error.to_string() })),
    )
}

pub fn run_mcp(engine: Arc<Engine>) -> error::Result<()> {
    let server = SieveMcpServer::new(engine);

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|e| {
            error::Error::Config(format!("failed to start tokio runtime: {e}"))
        })?;

    runtime.block_on(async move {
        let transport = rmcp::transport::stdio();
        let running = server.serve(transport).await.map_err(|e| {
            error::Error::Config(format!(
                "MCP server initialization failed: {e}"
            ))
        })?;
        running.waiting().await.map_err(|e| {
            error::Error::Config(format!("MCP server error: {e}"))
        })?;
        Ok(())
    })
}
