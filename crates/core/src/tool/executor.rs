use std::future::ready;
use std::pin::Pin;

use futures_util::future::join_all;
use search_agent_model::{ModelTool, ToolCallRequest};
use tracing::Instrument;

use crate::tool::{Error, ToolObject, ToolResult};

/// An executor that handles tool call requests from the model.
pub struct Executor {
    // Registration order is kept so that requests are built the same way
    // every time.
    tools: Vec<Box<dyn ToolObject>>,
}

impl Executor {
    pub fn with_tools(tools: Vec<Box<dyn ToolObject>>) -> Self {
        let mut deduped: Vec<Box<dyn ToolObject>> =
            Vec::with_capacity(tools.len());
        for tool in tools {
            // Later registrations replace earlier ones with the same name.
            if let Some(pos) =
                deduped.iter().position(|t| t.name() == tool.name())
            {
                warn!("tool registered twice: {}", tool.name());
                deduped[pos] = tool;
            } else {
                deduped.push(tool);
            }
        }
        Self { tools: deduped }
    }

    #[inline]
    pub fn definitions(&self) -> Vec<ModelTool> {
        self.tools
            .iter()
            .map(|tool| ModelTool {
                name: tool.name().to_owned(),
                description: tool.description().to_owned(),
                parameters: tool.parameter_schema().clone(),
            })
            .collect()
    }

    fn find(&self, name: &str) -> Option<&dyn ToolObject> {
        self.tools
            .iter()
            .find(|tool| tool.name() == name)
            .map(|tool| tool.as_ref())
    }

    /// Runs all requests concurrently, the results are in request order.
    pub async fn execute_all(
        &self,
        requests: &[ToolCallRequest],
    ) -> Vec<ToolResult> {
        let futures = requests.iter().map(|req| {
            let fut: Pin<Box<dyn Future<Output = ToolResult> + Send>> =
                match self.find(&req.name) {
                    Some(tool) => {
                        trace!(
                            "spawning a tool ({}) with args: {:?}",
                            req.id, req.arguments
                        );
                        tool.execute(req.arguments.clone())
                    }
                    None => {
                        warn!("tool not found: {}", req.name);
                        Box::pin(ready(Err(Error::not_found().with_reason(
                            format!("no tool named `{}`", req.name),
                        ))))
                    }
                };
            fut.instrument(debug_span!("tool execute", id = %req.id, name = %req.name))
        });
        join_all(futures).await
    }
}
