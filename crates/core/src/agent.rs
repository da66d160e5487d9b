mod builder;
mod state;

use std::sync::Arc;
use std::time::Duration;

use search_agent_model::{
    ModelMessage, ModelRequest, ToolCallRequest, ToolCallResult,
};
use tokio::time::timeout;

use crate::conversation::Conversation;
use crate::error::AgentError;
use crate::model_client::ModelClient;
use crate::observe::{LoopEvent, LoopEventKind, Observer};
use crate::tool::Executor as ToolExecutor;
pub use builder::AgentBuilder;
pub use state::LoopState;

type TranscriptFn = Arc<dyn Fn(String) + Send + Sync>;

/// Tags attached to every model request of the decision loop.
const BASE_REQUEST_TAGS: [(&str, &str); 2] =
    [("Node", "agent_decision"), ("Request-Type", "reasoning")];

/// An agent that answers a conversation by alternating between the model
/// and tools until the model gives a final answer.
///
/// The agent holds no per-conversation state. The caller owns the
/// [`Conversation`], and independent conversations may run concurrently
/// on the same agent.
#[derive(Clone)]
pub struct Agent {
    model_client: ModelClient,
    tool_executor: Arc<ToolExecutor>,
    observer: Option<Arc<dyn Observer>>,
    system_prompt: Option<String>,
    request_tags: Vec<(String, String)>,
    max_steps: usize,
    on_transcript: Option<TranscriptFn>,
}

/// Per-run options.
#[derive(Clone, Debug, Default)]
pub struct RunOptions {
    session_id: Option<String>,
    tags: Vec<(String, String)>,
    timeout: Option<Duration>,
}

impl RunOptions {
    /// Sets the session id, which is sent as the `Session` request tag and
    /// attached to the loop events.
    #[inline]
    pub fn with_session_id<S: Into<String>>(mut self, session_id: S) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    /// Adds a tag to the model requests of this run.
    #[inline]
    pub fn with_tag<K, V>(mut self, key: K, value: V) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        self.tags.push((key.into(), value.into()));
        self
    }

    /// Aborts the run with [`AgentError::Timeout`] if it takes longer than
    /// `duration`.
    #[inline]
    pub fn with_timeout(mut self, duration: Duration) -> Self {
        self.timeout = Some(duration);
        self
    }
}

impl Agent {
    /// Runs the decision loop on `conversation` and returns it with the
    /// new messages appended.
    ///
    /// The last message of a successful run is the final answer, see
    /// [`Conversation::final_answer`].
    #[inline]
    pub async fn run(
        &self,
        conversation: Conversation,
    ) -> Result<Conversation, AgentError> {
        self.run_with(conversation, RunOptions::default()).await
    }

    /// Same as [`Agent::run`], with per-run options.
    ///
    /// # Cancel safety
    ///
    /// Dropping the returned future cancels the run. Since the conversation
    /// is moved into the run, the caller should keep a copy if it needs to
    /// retry.
    pub async fn run_with(
        &self,
        conversation: Conversation,
        options: RunOptions,
    ) -> Result<Conversation, AgentError> {
        if !conversation.has_user_message() {
            return Err(AgentError::EmptyConversation);
        }
        conversation.validate()?;

        let session = options.session_id.as_deref();
        self.notify(
            session,
            LoopEventKind::RunStarted {
                messages: conversation.len(),
            },
        );

        let mut steps = 0;
        let result = match options.timeout {
            Some(limit) => {
                let run = self.drive(conversation, &options, &mut steps);
                match timeout(limit, run).await {
                    Ok(result) => result,
                    Err(_) => Err(AgentError::Timeout(limit)),
                }
            }
            None => self.drive(conversation, &options, &mut steps).await,
        };

        if let Err(err) = &result {
            error!("run failed after {steps} steps: {err}");
        }
        self.notify(
            session,
            LoopEventKind::RunFinished {
                steps,
                error: result.as_ref().err().map(|err| err.to_string()),
            },
        );
        result
    }

    async fn drive(
        &self,
        mut conversation: Conversation,
        options: &RunOptions,
        steps: &mut usize,
    ) -> Result<Conversation, AgentError> {
        let tags = self.request_tags(options);

        let mut state = if conversation.pending_tool_calls().is_empty() {
            LoopState::INITIAL
        } else {
            debug!("resuming with pending tool calls");
            LoopState::Tool
        };

        loop {
            if !state.is_terminal() && *steps >= self.max_steps {
                return Err(AgentError::StepLimitExceeded(self.max_steps));
            }

            let next = match state {
                LoopState::Model => {
                    self.invoke_model(&mut conversation, &tags).await?
                }
                LoopState::Tool => self.run_tools(&mut conversation).await?,
                LoopState::Done => return Ok(conversation),
            };
            debug_assert!(state.successors().contains(&next));

            *steps += 1;
            debug!("step {}: {state} -> {next}", *steps);
            self.notify(
                options.session_id.as_deref(),
                LoopEventKind::Transition {
                    step: *steps,
                    from: state,
                    to: next,
                },
            );
            state = next;
        }
    }

    async fn invoke_model(
        &self,
        conversation: &mut Conversation,
        tags: &[(String, String)],
    ) -> Result<LoopState, AgentError> {
        let mut messages = Vec::with_capacity(conversation.len() + 1);
        if let Some(prompt) = &self.system_prompt {
            messages.push(ModelMessage::system(prompt.clone()));
        }
        messages.extend_from_slice(conversation.messages());

        let request = ModelRequest {
            messages,
            tools: self.tool_executor.definitions(),
            tags: tags.to_vec(),
        };
        let on_transcript = self.on_transcript.clone();
        let resp = self
            .model_client
            .send_request(request, move |delta| {
                if let Some(on_transcript) = &on_transcript {
                    on_transcript(delta);
                }
            })
            .await
            .map_err(AgentError::Model)?;

        let next = if resp.tool_calls.is_empty() {
            LoopState::Done
        } else {
            LoopState::Tool
        };
        conversation.push(resp.into_message());
        Ok(next)
    }

    async fn run_tools(
        &self,
        conversation: &mut Conversation,
    ) -> Result<LoopState, AgentError> {
        let requests: Vec<ToolCallRequest> = conversation
            .pending_tool_calls()
            .into_iter()
            .cloned()
            .collect();
        let results = self.tool_executor.execute_all(&requests).await;

        // Nothing is recorded if any call can't ever succeed.
        for (req, result) in requests.iter().zip(&results) {
            match result {
                Err(err) if err.kind().is_fatal() => {
                    return Err(AgentError::Configuration {
                        tool: req.name.clone(),
                        reason: err.reason().into_owned(),
                    });
                }
                _ => {}
            }
        }

        for (req, result) in requests.into_iter().zip(results) {
            let (content, is_error) = match result {
                Ok(content) => (content, false),
                Err(err) => {
                    warn!("tool call {} ({}) failed: {err}", req.id, req.name);
                    (err.to_string(), true)
                }
            };
            conversation.push(ModelMessage::Tool(ToolCallResult {
                id: req.id,
                content,
                is_error,
            }));
        }
        Ok(LoopState::Model)
    }

    fn request_tags(&self, options: &RunOptions) -> Vec<(String, String)> {
        let mut tags: Vec<(String, String)> = BASE_REQUEST_TAGS
            .iter()
            .map(|(key, value)| ((*key).to_owned(), (*value).to_owned()))
            .collect();
        tags.extend(self.request_tags.iter().cloned());
        tags.extend(options.tags.iter().cloned());
        if let Some(session_id) = &options.session_id {
            tags.push(("Session".to_owned(), session_id.clone()));
        }
        tags
    }

    fn notify(&self, session: Option<&str>, kind: LoopEventKind) {
        let Some(observer) = &self.observer else {
            return;
        };
        let event = LoopEvent {
            session: session.map(str::to_owned),
            kind,
        };
        if let Err(err) = observer.observe(&event) {
            warn!("failed to notify the observer: {err}");
        }
    }
}
