//! Trace-based observability side channel.

use reqwest::Client;
use search_agent_core::observe::{LoopEvent, ObserveError, Observer};
use tokio::runtime::Handle;

/// An observer that posts every loop event as JSON to a Helicone-style
/// trace endpoint.
///
/// Delivery happens in a background task, so a slow or failing endpoint
/// never holds up the loop. Failed deliveries are only logged.
pub struct HeliconeTraceObserver {
    client: Client,
    endpoint: String,
    api_key: String,
}

impl HeliconeTraceObserver {
    /// Creates an observer posting to `endpoint` with bearer auth.
    #[inline]
    pub fn new<E, K>(endpoint: E, api_key: K) -> Self
    where
        E: Into<String>,
        K: Into<String>,
    {
        Self {
            client: Client::new(),
            endpoint: endpoint.into(),
            api_key: api_key.into(),
        }
    }
}

impl Observer for HeliconeTraceObserver {
    fn observe(&self, event: &LoopEvent) -> Result<(), ObserveError> {
        let handle = Handle::try_current()
            .map_err(|err| ObserveError(format!("no async runtime: {err}")))?;
        let req = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(event);

        handle.spawn(async move {
            match req.send().await.and_then(|resp| resp.error_for_status()) {
                Ok(_) => trace!("delivered a trace event"),
                Err(err) => warn!("failed to deliver a trace event: {err}"),
            }
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use search_agent_core::LoopState;
    use search_agent_core::observe::LoopEventKind;
    use serde_json::{Value, json};
    use tokio::time::sleep;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    fn transition() -> LoopEvent {
        LoopEvent {
            session: Some("weather_query_sf".to_owned()),
            kind: LoopEventKind::Transition {
                step: 1,
                from: LoopState::Model,
                to: LoopState::Tool,
            },
        }
    }

    #[tokio::test]
    async fn test_post_event() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/trace"))
            .and(header("authorization", "Bearer sk-helicone"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let observer = HeliconeTraceObserver::new(
            format!("{}/v1/trace", server.uri()),
            "sk-helicone",
        );
        observer.observe(&transition()).unwrap();

        let mut received = vec![];
        for _ in 0..100 {
            received = server.received_requests().await.unwrap_or_default();
            if !received.is_empty() {
                break;
            }
            sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(received.len(), 1);
        let body: Value = serde_json::from_slice(&received[0].body).unwrap();
        assert_eq!(
            body,
            json!({
                "session": "weather_query_sf",
                "type": "transition",
                "step": 1,
                "from": "MODEL",
                "to": "TOOL"
            })
        );
    }

    #[tokio::test]
    async fn test_failed_delivery_is_not_an_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let observer = HeliconeTraceObserver::new(server.uri(), "sk-helicone");
        assert!(observer.observe(&transition()).is_ok());
    }

    #[test]
    fn test_no_runtime() {
        let observer =
            HeliconeTraceObserver::new("http://localhost:1", "sk-helicone");
        assert!(observer.observe(&transition()).is_err());
    }
}
