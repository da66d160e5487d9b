use std::time::Duration;

use backoff::future::retry;
use backoff::{ExponentialBackoff, ExponentialBackoffBuilder};
use search_agent_core::observe::Observer;
use search_agent_core::tool::Tool;
use search_agent_core::{
    Agent, AgentBuilder, AgentError, Conversation, RunOptions,
};
use search_agent_model::{ErrorKind as ModelErrorKind, ModelProvider};
use search_agent_openai_model::{OpenAIConfigBuilder, OpenAIProvider};

use crate::config::Config;
use crate::observe::HeliconeTraceObserver;
use crate::tools::WebSearchTool;

const HELICONE_PROPERTY_PREFIX: &str = "Helicone-Property-";
const DEFAULT_SESSION_PREFIX: &str = "search_agent";

/// A session builder.
///
/// See [`Session`].
pub struct SessionBuilder {
    agent_builder: AgentBuilder,
    retry_policy: ExponentialBackoff,
    session_prefix: String,
}

impl SessionBuilder {
    /// Creates a session builder with a specified model provider.
    pub fn with_model_provider<M: ModelProvider + 'static>(
        provider: M,
    ) -> Self {
        let agent_builder = AgentBuilder::with_model_provider(provider);
        let retry_policy = ExponentialBackoffBuilder::new()
            .with_initial_interval(Duration::from_secs(1))
            .with_max_elapsed_time(Some(Duration::from_secs(60)))
            .build();
        Self {
            agent_builder,
            retry_policy,
            session_prefix: DEFAULT_SESSION_PREFIX.to_owned(),
        }
    }

    /// Creates a session builder wired to the services in `config`: the
    /// model behind the Helicone proxy, the Tavily search tool, and the
    /// Helicone trace endpoint if one is configured.
    pub fn from_config(config: &Config) -> Self {
        let openai_config =
            OpenAIConfigBuilder::with_api_key(&config.openai_api_key)
                .with_model(&config.model)
                .with_base_url(&config.openai_base_url)
                .with_header(
                    "Helicone-Auth",
                    format!("Bearer {}", config.helicone_api_key),
                )
                .with_tag_header_prefix(HELICONE_PROPERTY_PREFIX)
                .build();
        let search_tool = WebSearchTool::new(&config.tavily_api_key)
            .with_base_url(&config.tavily_base_url)
            .with_max_results(config.search_max_results);

        let mut builder =
            Self::with_model_provider(OpenAIProvider::new(openai_config))
                .with_tool(search_tool);
        if let Some(endpoint) = &config.helicone_trace_url {
            debug!("posting loop events to {endpoint}");
            builder = builder.with_observer(HeliconeTraceObserver::new(
                endpoint,
                &config.helicone_api_key,
            ));
        }
        builder
    }

    /// Sets the system prompt for the agent.
    #[inline]
    pub fn with_system_prompt<S: Into<String>>(mut self, prompt: S) -> Self {
        self.agent_builder = self.agent_builder.with_system_prompt(prompt);
        self
    }

    /// Registers a tool.
    #[inline]
    pub fn with_tool<T: Tool>(mut self, tool: T) -> Self {
        self.agent_builder = self.agent_builder.with_tool(tool);
        self
    }

    /// Attaches an observer that receives the loop events.
    #[inline]
    pub fn with_observer(mut self, observer: impl Observer + 'static) -> Self {
        self.agent_builder = self.agent_builder.with_observer(observer);
        self
    }

    /// Attaches a callback to be invoked when assistant text streams in.
    #[inline]
    pub fn on_transcript(
        mut self,
        on_transcript: impl Fn(String) + Send + Sync + 'static,
    ) -> Self {
        self.agent_builder = self.agent_builder.on_transcript(on_transcript);
        self
    }

    /// Sets the prefix of the per-turn session ids, which are reported as
    /// `<prefix>_<turn>`.
    #[inline]
    pub fn with_session_prefix<S: Into<String>>(mut self, prefix: S) -> Self {
        self.session_prefix = prefix.into();
        self
    }

    /// Sets how rate-limited turns are retried.
    #[inline]
    pub fn with_retry_policy(mut self, policy: ExponentialBackoff) -> Self {
        self.retry_policy = policy;
        self
    }

    /// Builds a new session.
    pub fn build(self) -> Session {
        Session {
            agent: self.agent_builder.build(),
            conversation: Conversation::new(),
            retry_policy: self.retry_policy,
            session_prefix: self.session_prefix,
            turns: 0,
        }
    }
}

/// A chat session, like a window that displays messages and has a input box.
///
/// The session holds a fully configured agent and the conversation so far,
/// every message is answered with the previous turns as context.
pub struct Session {
    agent: Agent,
    conversation: Conversation,
    retry_policy: ExponentialBackoff,
    session_prefix: String,
    turns: usize,
}

impl Session {
    /// Sends a message to the session and returns the final answer.
    ///
    /// Rate-limited runs are retried with exponential backoff. If the turn
    /// fails, the conversation is left as it was before the message.
    pub async fn send_message(
        &mut self,
        message: &str,
    ) -> Result<String, AgentError> {
        self.turns += 1;
        let input = self.conversation.clone().with_user(message);
        let options = RunOptions::default().with_session_id(format!(
            "{}_{}",
            self.session_prefix, self.turns
        ));

        let agent = &self.agent;
        let conversation = retry(self.retry_policy.clone(), || {
            let input = input.clone();
            let options = options.clone();
            async move {
                agent.run_with(input, options).await.map_err(|err| {
                    if err.model_error_kind()
                        == Some(ModelErrorKind::RateLimitExceeded)
                    {
                        warn!("rate limited, will retry: {err}");
                        backoff::Error::transient(err)
                    } else {
                        backoff::Error::permanent(err)
                    }
                })
            }
        })
        .await?;

        let answer = conversation.final_answer().unwrap_or_default().to_owned();
        self.conversation = conversation;
        Ok(answer)
    }

    /// Returns the conversation so far.
    #[inline]
    pub fn conversation(&self) -> &Conversation {
        &self.conversation
    }

    /// Forgets the conversation so far.
    #[inline]
    pub fn reset(&mut self) {
        self.conversation = Conversation::new();
    }
}

#[cfg(test)]
mod tests {
    use search_agent_model::ModelMessage;
    use search_agent_test_model::{PresetResponse, TestModelProvider};

    use super::*;

    fn fast_retry() -> ExponentialBackoff {
        ExponentialBackoffBuilder::new()
            .with_initial_interval(Duration::from_millis(1))
            .with_max_interval(Duration::from_millis(5))
            .with_max_elapsed_time(Some(Duration::from_secs(5)))
            .build()
    }

    #[tokio::test]
    async fn test_follow_up_keeps_context() {
        let mut model_provider = TestModelProvider::default();
        model_provider.add_user_input_step();
        model_provider.add_assistant_response_step(PresetResponse::text(
            "It is 18C and sunny in San Francisco.",
        ));
        model_provider.add_user_input_step();
        model_provider.add_assistant_response_step(PresetResponse::text(
            "It is 12C and cloudy in New York.",
        ));

        let mut session =
            SessionBuilder::with_model_provider(model_provider.clone())
                .with_session_prefix("weather_query")
                .build();

        let answer = session
            .send_message("what is the weather in sf")
            .await
            .unwrap();
        assert_eq!(answer, "It is 18C and sunny in San Francisco.");
        let answer = session.send_message("what about ny").await.unwrap();
        assert_eq!(answer, "It is 12C and cloudy in New York.");
        assert_eq!(session.conversation().len(), 4);

        let requests = model_provider.requests();
        assert_eq!(requests.len(), 2);
        assert_eq!(
            requests[1].messages[..2],
            session.conversation().messages()[..2]
        );
        let session_tag = |idx: usize| {
            requests[idx]
                .tags
                .iter()
                .find(|(key, _)| key == "Session")
                .map(|(_, value)| value.clone())
        };
        assert_eq!(session_tag(0).as_deref(), Some("weather_query_1"));
        assert_eq!(session_tag(1).as_deref(), Some("weather_query_2"));

        session.reset();
        assert!(session.conversation().is_empty());
    }

    #[tokio::test]
    async fn test_retry_rate_limit() {
        let mut model_provider = TestModelProvider::default();
        model_provider.add_user_input_step();
        model_provider.add_assistant_response_step(
            PresetResponse::text("Hi there.").with_failures(2),
        );

        let mut session =
            SessionBuilder::with_model_provider(model_provider.clone())
                .with_retry_policy(fast_retry())
                .build();

        let answer = session.send_message("Hello").await.unwrap();
        assert_eq!(answer, "Hi there.");
        assert_eq!(model_provider.requests().len(), 3);
    }

    #[tokio::test]
    async fn test_permanent_error() {
        let mut model_provider = TestModelProvider::default();
        model_provider.add_user_input_step();
        model_provider.add_assistant_response_step(
            PresetResponse::text("unreachable").with_failures(0),
        );

        let mut session =
            SessionBuilder::with_model_provider(model_provider.clone())
                .with_system_prompt("You are a helpful assistant.")
                .with_retry_policy(fast_retry())
                .build();

        let err = session.send_message("Hello").await.unwrap_err();
        assert_eq!(err.model_error_kind(), Some(ModelErrorKind::Other));
        assert_eq!(model_provider.requests().len(), 1);
        assert!(matches!(
            model_provider.requests()[0].messages[0],
            ModelMessage::System { .. }
        ));
        assert!(session.conversation().is_empty());
    }

    #[test]
    fn test_from_config() {
        let config = Config::from_lookup(|name| match name {
            "OPENAI_API_KEY" => Some("sk-test".to_owned()),
            "HELICONE_API_KEY" => Some("sk-helicone".to_owned()),
            "TAVILY_API_KEY" => Some("tvly-test".to_owned()),
            "HELICONE_TRACE_URL" => Some("http://localhost:1/trace".to_owned()),
            _ => None,
        })
        .unwrap();
        let session = SessionBuilder::from_config(&config).build();
        assert!(session.conversation().is_empty());
    }

    #[test]
    fn test_missing_config_fails_before_any_run() {
        let err = Config::from_lookup(|name| match name {
            "OPENAI_API_KEY" => Some("sk-test".to_owned()),
            _ => None,
        })
        .unwrap_err();
        assert_eq!(
            err,
            crate::ConfigError::MissingVariables(vec![
                "HELICONE_API_KEY".to_owned(),
                "TAVILY_API_KEY".to_owned(),
            ])
        );
    }
}
