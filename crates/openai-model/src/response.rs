use std::collections::VecDeque;
use std::pin::Pin;
use std::task::{Context, Poll, ready};

use pin_project_lite::pin_project;
use search_agent_model::{
    ErrorKind, ModelFinishReason, ModelResponse, ModelResponseEvent,
};

use crate::Error;
use crate::io::{Sse, SseError};
use crate::proto::{ChatCompletionChunk, ToolCall, finish_tool_call};

struct PartialState {
    sse: Sse,
    id: Option<String>,
    tool_calls: Vec<ToolCall>,
    // Tool calls are streamed in pieces, so they can only be emitted after
    // the server reports a finish reason. This field records the index of
    // the tool calls that are complete but not yet returned.
    pending_tool_call_idx: VecDeque<usize>,
    // This field will be cleared after the response returns the complete
    // event.
    pending_finish_reason: Option<ModelFinishReason>,
    // Set once a finish reason arrives. The stream must not end before.
    finished: bool,
}

type PinnedFuture<T> = Pin<Box<dyn Future<Output = T> + Send>>;
type NextEvent = Result<(Option<ModelResponseEvent>, PartialState), Error>;

pin_project! {
    pub struct OpenAIResponse {
        next_event_fut: Option<PinnedFuture<NextEvent>>,
    }
}

impl OpenAIResponse {
    #[inline]
    pub fn from_sse(sse: Sse) -> Self {
        let partial_state = PartialState {
            sse,
            id: None,
            tool_calls: Default::default(),
            pending_tool_call_idx: Default::default(),
            pending_finish_reason: Default::default(),
            finished: false,
        };
        let next_event_fut = async move { next_event(partial_state).await };
        Self {
            next_event_fut: Some(Box::pin(next_event_fut)),
        }
    }
}

impl ModelResponse for OpenAIResponse {
    type Error = crate::Error;

    fn poll_next_event(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Result<Option<ModelResponseEvent>, Self::Error>> {
        let this = self.project();
        let Some(next_event_fut) = this.next_event_fut else {
            // The stream has been exhausted.
            return Poll::Ready(Ok(None));
        };
        let (event, partial_state) =
            match ready!(next_event_fut.as_mut().poll(cx)) {
                Ok((Some(event), partial_state)) => (event, partial_state),
                Ok((None, _)) => {
                    *this.next_event_fut = None;
                    return Poll::Ready(Ok(None));
                }
                Err(err) => {
                    *this.next_event_fut = None;
                    return Poll::Ready(Err(err));
                }
            };

        // The stream may still have more data to pull, create a new future for
        // the next event.
        let next_event_fut = async move { next_event(partial_state).await };
        *this.next_event_fut = Some(Box::pin(next_event_fut));

        Poll::Ready(Ok(Some(event)))
    }
}

async fn next_event(
    mut partial_state: PartialState,
) -> Result<(Option<ModelResponseEvent>, PartialState), Error> {
    let mut message_delta = None;

    while !partial_state.finished {
        let sse_event = match partial_state.sse.next_event().await {
            Ok(Some(event)) => event,
            Ok(None) => return Err(truncated_stream()),
            Err(SseError::ChunksError(err)) => {
                return Err(Error::new(
                    format!("stream interrupted: {}", err.0),
                    ErrorKind::Other,
                ));
            }
            Err(SseError::InvalidPayload) => {
                return Err(Error::new(
                    "invalid event stream payload",
                    ErrorKind::InvalidResponse,
                ));
            }
        };
        trace!("got sse event: {sse_event}");
        if sse_event == "[DONE]" {
            return Err(truncated_stream());
        }

        let mut chunk = serde_json::from_str::<ChatCompletionChunk>(&sse_event)
            .map_err(|err| {
                Error::new(format!("{err}"), ErrorKind::InvalidResponse)
            })?;

        // Chunks without choices carry usage or filter results only.
        let Some(choice) = chunk.choices.pop() else {
            continue;
        };
        if partial_state.id.get_or_insert_with(|| chunk.id.clone()) != &chunk.id
        {
            return Err(Error::new(
                "chunk id mismatch",
                ErrorKind::InvalidResponse,
            ));
        };

        if let Some(content) = choice.delta.content {
            if !content.is_empty() {
                message_delta = Some(content);
            }
        }
        if let Some(tool_calls) = choice.delta.tool_calls {
            for tool_call in tool_calls {
                merge_tool_call(&mut partial_state.tool_calls, tool_call);
            }
        }

        if let Some(finish_reason) = choice.finish_reason {
            let finish_reason = if finish_reason == "tool_calls"
                || !partial_state.tool_calls.is_empty()
            {
                ModelFinishReason::ToolCalls
            } else {
                ModelFinishReason::Stop
            };
            partial_state
                .pending_tool_call_idx
                .extend(0..partial_state.tool_calls.len());
            partial_state.pending_finish_reason = Some(finish_reason);
            partial_state.finished = true;
            break;
        }

        if message_delta.is_some() {
            break;
        }
    }

    // The order of events are important. Always emit message delta first, then
    // emit pending tool calls, and finally emit pending finish reason if any.

    if let Some(message_delta) = message_delta {
        return Ok((
            Some(ModelResponseEvent::MessageDelta(message_delta)),
            partial_state,
        ));
    }

    if let Some(idx) = partial_state.pending_tool_call_idx.pop_front() {
        let req = finish_tool_call(&partial_state.tool_calls[idx])?;
        return Ok((Some(ModelResponseEvent::ToolCall(req)), partial_state));
    }

    if let Some(finish_reason) = partial_state.pending_finish_reason.take() {
        return Ok((
            Some(ModelResponseEvent::Completed(finish_reason)),
            partial_state,
        ));
    }

    Ok((None, partial_state))
}

#[inline]
fn truncated_stream() -> Error {
    Error::new(
        "stream ended before a finish reason",
        ErrorKind::InvalidResponse,
    )
}

/// Patches a streamed tool call fragment into the partial tool calls.
fn merge_tool_call(partial_tool_calls: &mut Vec<ToolCall>, tool_call: ToolCall) {
    let Some(partial_tool_call) = partial_tool_calls
        .iter_mut()
        .find(|t| t.index == tool_call.index)
    else {
        partial_tool_calls.push(tool_call);
        return;
    };
    if let Some(id) = tool_call.id {
        partial_tool_call.id.get_or_insert_default().push_str(&id);
    }
    if let Some(ty) = tool_call.r#type {
        partial_tool_call.r#type.get_or_insert_default().push_str(&ty);
    }
    if let Some(function) = tool_call.function {
        match partial_tool_call.function {
            Some(ref mut partial_func) => {
                if let Some(name) = function.name {
                    partial_func.name.get_or_insert_default().push_str(&name);
                }
                if let Some(arguments) = function.arguments {
                    partial_func
                        .arguments
                        .get_or_insert_default()
                        .push_str(&arguments);
                }
            }
            None => partial_tool_call.function = Some(function),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::future::poll_fn;
    use std::pin::pin;

    use bytes::Bytes;
    use serde_json::json;

    use super::*;
    use crate::io::Chunks;

    async fn collect_events(
        fixture: &'static [u8],
    ) -> Result<Vec<ModelResponseEvent>, Error> {
        let chunks = Chunks::from_vec_deque(
            fixture
                .chunks(17)
                .map(Bytes::from_static)
                .collect(),
        );
        let mut resp = pin!(OpenAIResponse::from_sse(Sse::new(chunks)));
        let mut events = vec![];
        while let Some(event) =
            poll_fn(|cx| resp.as_mut().poll_next_event(cx)).await?
        {
            events.push(event);
        }
        Ok(events)
    }

    #[tokio::test]
    async fn test_tool_call_events() {
        let events =
            collect_events(include_bytes!("../fixtures/tool_calls.txt"))
                .await
                .unwrap();
        assert_eq!(
            events,
            vec![
                ModelResponseEvent::MessageDelta("Let me search.".to_owned()),
                ModelResponseEvent::ToolCall(search_agent_model::ToolCallRequest {
                    id: "call_sf".to_owned(),
                    name: "tavily_search_results_json".to_owned(),
                    arguments: json!({ "query": "weather in sf" }),
                }),
                ModelResponseEvent::ToolCall(search_agent_model::ToolCallRequest {
                    id: "call_ny".to_owned(),
                    name: "tavily_search_results_json".to_owned(),
                    arguments: json!({ "query": "weather in ny" }),
                }),
                ModelResponseEvent::Completed(ModelFinishReason::ToolCalls),
            ]
        );
    }

    #[tokio::test]
    async fn test_text_events() {
        let events = collect_events(include_bytes!("../fixtures/text.txt"))
            .await
            .unwrap();
        let text: String = events
            .iter()
            .filter_map(|event| match event {
                ModelResponseEvent::MessageDelta(delta) => Some(delta.as_str()),
                _ => None,
            })
            .collect();
        assert_eq!(text, "It is 18C and sunny in San Francisco.");
        assert_eq!(
            events.last(),
            Some(&ModelResponseEvent::Completed(ModelFinishReason::Stop))
        );
    }

    #[tokio::test]
    async fn test_truncated_stream() {
        let err = collect_events(include_bytes!("../fixtures/truncated.txt"))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidResponse);
        assert_eq!(err.message(), "stream ended before a finish reason");

        // `[DONE]` without a finish reason is truncated as well.
        let err = collect_events(
            b"data: {\"id\":\"chatcmpl-1\",\"choices\":[{\"delta\":\
              {\"content\":\"It is\"},\"finish_reason\":null}]}\n\n\
              data: [DONE]\n\n",
        )
        .await
        .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidResponse);
    }

    #[tokio::test]
    async fn test_tool_call_without_id() {
        let err = collect_events(
            b"data: {\"id\":\"chatcmpl-1\",\"choices\":[{\"delta\":\
              {\"tool_calls\":[{\"index\":0,\"type\":\"function\",\
              \"function\":{\"name\":\"tavily_search_results_json\",\
              \"arguments\":\"{}\"}}]},\"finish_reason\":\"tool_calls\"}]}\n\n",
        )
        .await
        .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidResponse);
    }

    #[tokio::test]
    async fn test_malformed_chunk() {
        let err = collect_events(b"data: {\"id\": 1}\n\n").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidResponse);
    }
}
