//! Conversation-related types.

use std::collections::HashSet;

use search_agent_model::{ModelMessage, ToolCallRequest};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// An ordered, append-only message history.
///
/// The caller owns the conversation between runs: feed the conversation
/// returned by a run, plus a new user message, into the next run to keep
/// the context.
///
/// The serialized form is a JSON array of role-tagged messages. Decoding
/// validates that every tool result answers a call from the assistant
/// message right before it.
#[derive(Clone, Default, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<ModelMessage>", into = "Vec<ModelMessage>")]
pub struct Conversation {
    messages: Vec<ModelMessage>,
}

/// Describes why a message sequence is not a valid conversation.
#[derive(Error, Clone, Debug, PartialEq, Eq)]
pub enum ConversationError {
    /// A tool result doesn't answer any call of the preceding assistant
    /// message.
    #[error("tool result #{index} answers unknown call `{id}`")]
    UnknownToolCall {
        /// Position of the tool result.
        index: usize,
        /// The call id it refers to.
        id: String,
    },
    /// A call was answered twice.
    #[error("tool result #{index} answers call `{id}` again")]
    DuplicateToolResult {
        /// Position of the second tool result.
        index: usize,
        /// The call id it refers to.
        id: String,
    },
    /// A message follows an assistant message whose calls are not all
    /// answered yet.
    #[error("message #{index} comes before all tool calls are answered")]
    UnresolvedToolCalls {
        /// Position of the offending message.
        index: usize,
    },
}

impl Conversation {
    /// Creates an empty conversation.
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a conversation from existing messages after validating them.
    pub fn from_messages(
        messages: Vec<ModelMessage>,
    ) -> Result<Self, ConversationError> {
        let conversation = Self { messages };
        conversation.validate()?;
        Ok(conversation)
    }

    /// Appends a user message.
    #[inline]
    pub fn push_user<S: Into<String>>(&mut self, content: S) {
        self.messages.push(ModelMessage::user(content));
    }

    /// Appends a user message, builder style.
    #[inline]
    pub fn with_user<S: Into<String>>(mut self, content: S) -> Self {
        self.push_user(content);
        self
    }

    #[inline]
    pub(crate) fn push(&mut self, msg: ModelMessage) {
        self.messages.push(msg);
    }

    /// Returns the messages in order.
    #[inline]
    pub fn messages(&self) -> &[ModelMessage] {
        &self.messages
    }

    /// Consumes the conversation and returns its messages.
    #[inline]
    pub fn into_messages(self) -> Vec<ModelMessage> {
        self.messages
    }

    /// Returns the number of messages.
    #[inline]
    pub fn len(&self) -> usize {
        self.messages.len()
    }

    /// Returns `true` if there are no messages.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Returns the last message.
    #[inline]
    pub fn last(&self) -> Option<&ModelMessage> {
        self.messages.last()
    }

    /// Returns the final answer, which is the text of the last message if
    /// it's an assistant message without tool calls.
    pub fn final_answer(&self) -> Option<&str> {
        match self.messages.last()? {
            ModelMessage::Assistant {
                content,
                tool_calls,
            } if tool_calls.is_empty() => Some(content),
            _ => None,
        }
    }

    /// Returns `true` if there is at least one user message.
    #[inline]
    pub fn has_user_message(&self) -> bool {
        self.messages
            .iter()
            .any(|msg| matches!(msg, ModelMessage::User { .. }))
    }

    /// Returns the tool calls of the last assistant message that have no
    /// result yet, in emission order.
    pub fn pending_tool_calls(&self) -> Vec<&ToolCallRequest> {
        let Some(assistant_idx) = self
            .messages
            .iter()
            .rposition(|msg| matches!(msg, ModelMessage::Assistant { .. }))
        else {
            return vec![];
        };
        let answered: HashSet<&str> = self.messages[assistant_idx + 1..]
            .iter()
            .filter_map(|msg| match msg {
                ModelMessage::Tool(result) => Some(result.id.as_str()),
                _ => None,
            })
            .collect();
        self.messages[assistant_idx]
            .tool_calls()
            .iter()
            .filter(|req| !answered.contains(req.id.as_str()))
            .collect()
    }

    /// Checks the tool call ordering rules.
    ///
    /// Every tool result must answer a call of the closest preceding
    /// assistant message, with only other tool results in between. No
    /// other message may follow an assistant message until all its calls
    /// are answered. Calls left unanswered at the tail are allowed.
    pub fn validate(&self) -> Result<(), ConversationError> {
        // Calls of the last assistant message that are still unanswered.
        let mut open: Vec<&str> = vec![];
        // Calls of the last assistant message, answered or not.
        let mut known: Vec<&str> = vec![];

        for (index, msg) in self.messages.iter().enumerate() {
            match msg {
                ModelMessage::Tool(result) => {
                    let id = result.id.as_str();
                    if let Some(pos) = open.iter().position(|c| *c == id) {
                        open.remove(pos);
                    } else if known.contains(&id) {
                        return Err(ConversationError::DuplicateToolResult {
                            index,
                            id: id.to_owned(),
                        });
                    } else {
                        return Err(ConversationError::UnknownToolCall {
                            index,
                            id: id.to_owned(),
                        });
                    }
                }
                _ if !open.is_empty() => {
                    return Err(ConversationError::UnresolvedToolCalls {
                        index,
                    });
                }
                ModelMessage::Assistant { tool_calls, .. } => {
                    known = tool_calls.iter().map(|c| c.id.as_str()).collect();
                    open = known.clone();
                }
                ModelMessage::System { .. } | ModelMessage::User { .. } => {
                    known.clear();
                }
            }
        }
        Ok(())
    }
}

impl TryFrom<Vec<ModelMessage>> for Conversation {
    type Error = ConversationError;

    #[inline]
    fn try_from(messages: Vec<ModelMessage>) -> Result<Self, Self::Error> {
        Self::from_messages(messages)
    }
}

impl From<Conversation> for Vec<ModelMessage> {
    #[inline]
    fn from(conversation: Conversation) -> Self {
        conversation.messages
    }
}

#[cfg(test)]
mod tests {
    use search_agent_model::ToolCallResult;
    use serde_json::json;

    use super::*;

    fn call(id: &str) -> ToolCallRequest {
        ToolCallRequest {
            id: id.to_owned(),
            name: "tavily_search_results_json".to_owned(),
            arguments: json!({ "query": "weather" }),
        }
    }

    fn result(id: &str) -> ModelMessage {
        ModelMessage::Tool(ToolCallResult {
            id: id.to_owned(),
            content: "ok".to_owned(),
            is_error: false,
        })
    }

    #[test]
    fn test_round_trip() {
        let conversation = Conversation::from_messages(vec![
            ModelMessage::user("what is the weather in sf"),
            ModelMessage::assistant("", vec![call("a"), call("b")]),
            result("b"),
            result("a"),
            ModelMessage::assistant("Sunny.", vec![]),
            ModelMessage::user("what about ny"),
        ])
        .unwrap();

        let json = serde_json::to_string(&conversation).unwrap();
        let decoded: Conversation = serde_json::from_str(&json).unwrap();
        assert_eq!(decoded, conversation);
        assert_eq!(decoded.messages()[1].tool_calls()[1].id, "b");
    }

    #[test]
    fn test_decode_rejects_orphan_result() {
        let json = json!([
            { "role": "user", "content": "hi" },
            { "role": "tool", "tool_call_id": "x", "content": "?" }
        ]);
        let err = serde_json::from_value::<Conversation>(json).unwrap_err();
        assert!(err.to_string().contains("unknown call `x`"));
    }

    #[test]
    fn test_validate() {
        let err = Conversation::from_messages(vec![
            ModelMessage::user("hi"),
            ModelMessage::assistant("", vec![call("a")]),
            result("a"),
            result("a"),
        ])
        .unwrap_err();
        assert_eq!(
            err,
            ConversationError::DuplicateToolResult {
                index: 3,
                id: "a".to_owned()
            }
        );

        let err = Conversation::from_messages(vec![
            ModelMessage::user("hi"),
            ModelMessage::assistant("", vec![call("a"), call("b")]),
            result("a"),
            ModelMessage::user("hello?"),
        ])
        .unwrap_err();
        assert_eq!(err, ConversationError::UnresolvedToolCalls { index: 3 });

        // Results from an earlier turn can't be replayed later.
        let err = Conversation::from_messages(vec![
            ModelMessage::user("hi"),
            ModelMessage::assistant("", vec![call("a")]),
            result("a"),
            ModelMessage::assistant("done", vec![]),
            result("a"),
        ])
        .unwrap_err();
        assert!(matches!(err, ConversationError::UnknownToolCall { .. }));
    }

    #[test]
    fn test_pending_tool_calls() {
        let mut conversation = Conversation::new().with_user("hi");
        assert!(conversation.pending_tool_calls().is_empty());
        assert!(conversation.has_user_message());

        conversation.push(ModelMessage::assistant("", vec![call("a"), call("b")]));
        conversation.push(result("a"));
        conversation.validate().unwrap();
        let pending: Vec<_> = conversation
            .pending_tool_calls()
            .into_iter()
            .map(|c| c.id.as_str())
            .collect();
        assert_eq!(pending, vec!["b"]);
        assert_eq!(conversation.final_answer(), None);

        conversation.push(result("b"));
        conversation.push(ModelMessage::assistant("Sunny.", vec![]));
        assert!(conversation.pending_tool_calls().is_empty());
        assert_eq!(conversation.final_answer(), Some("Sunny."));
    }
}
