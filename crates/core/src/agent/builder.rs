use std::sync::Arc;

use search_agent_model::ModelProvider;

use super::{Agent, TranscriptFn};
use crate::model_client::ModelClient;
use crate::observe::Observer;
use crate::tool::{AnyTool, Executor as ToolExecutor, Tool, ToolObject};

/// [`Agent`] builder.
pub struct AgentBuilder {
    model_client: ModelClient,
    tools: Vec<Box<dyn ToolObject>>,
    observer: Option<Arc<dyn Observer>>,
    system_prompt: Option<String>,
    request_tags: Vec<(String, String)>,
    max_steps: usize,
    on_transcript: Option<TranscriptFn>,
}

impl AgentBuilder {
    /// The default number of transitions a run may make.
    pub const DEFAULT_MAX_STEPS: usize = 25;

    /// Creates a new builder with the specified model provider.
    #[inline]
    pub fn with_model_provider<P: ModelProvider + 'static>(
        provider: P,
    ) -> Self {
        Self {
            model_client: ModelClient::new(provider),
            tools: vec![],
            observer: None,
            system_prompt: None,
            request_tags: vec![],
            max_steps: Self::DEFAULT_MAX_STEPS,
            on_transcript: None,
        }
    }

    /// Sets a system prompt, which is sent ahead of the conversation in
    /// every model request but never recorded in the conversation.
    #[inline]
    pub fn with_system_prompt<S: Into<String>>(mut self, prompt: S) -> Self {
        self.system_prompt = Some(prompt.into());
        self
    }

    /// Registers a tool.
    #[inline]
    pub fn with_tool<T: Tool>(mut self, tool: T) -> Self {
        let tool = Box::new(AnyTool(tool));
        self.tools.push(tool);
        self
    }

    /// Attaches an observer that receives the loop events.
    #[inline]
    pub fn with_observer(mut self, observer: impl Observer + 'static) -> Self {
        self.observer = Some(Arc::new(observer));
        self
    }

    /// Adds a tag to every model request made by the agent.
    #[inline]
    pub fn with_request_tag<K, V>(mut self, key: K, value: V) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        self.request_tags.push((key.into(), value.into()));
        self
    }

    /// Sets the number of transitions a run may make before it's aborted.
    #[inline]
    pub fn with_max_steps(mut self, max_steps: usize) -> Self {
        self.max_steps = max_steps;
        self
    }

    /// Attaches a callback receiving assistant text as it streams in.
    #[inline]
    pub fn on_transcript(
        mut self,
        on_transcript: impl Fn(String) + Send + Sync + 'static,
    ) -> Self {
        self.on_transcript = Some(Arc::new(on_transcript));
        self
    }

    /// Builds the agent.
    #[inline]
    pub fn build(self) -> Agent {
        let AgentBuilder {
            model_client,
            tools,
            observer,
            system_prompt,
            request_tags,
            max_steps,
            on_transcript,
        } = self;

        Agent {
            model_client,
            tool_executor: Arc::new(ToolExecutor::with_tools(tools)),
            observer,
            system_prompt,
            request_tags,
            max_steps,
            on_transcript,
        }
    }
}
