//! PNG rendering of the loop diagram through a mermaid.ink service.

use base64::Engine as _;
use base64::engine::general_purpose::URL_SAFE;
use reqwest::{Client, StatusCode};
use thiserror::Error;

/// The public mermaid.ink service.
pub const MERMAID_INK_URL: &str = "https://mermaid.ink";

/// Errors returned by [`render_png`].
#[derive(Error, Debug)]
pub enum RenderError {
    /// The renderer couldn't be reached.
    #[error("failed to reach the renderer: {0}")]
    Request(#[from] reqwest::Error),
    /// The renderer refused the diagram.
    #[error("renderer returned {0}")]
    Status(StatusCode),
}

/// Returns the URL of the PNG rendering of `mermaid`.
pub fn png_url(base_url: &str, mermaid: &str) -> String {
    format!(
        "{}/img/{}?type=png",
        base_url.trim_end_matches('/'),
        URL_SAFE.encode(mermaid)
    )
}

/// Fetches the PNG rendering of `mermaid` from the service at `base_url`.
pub async fn render_png(
    client: &Client,
    base_url: &str,
    mermaid: &str,
) -> Result<Vec<u8>, RenderError> {
    let url = png_url(base_url, mermaid);
    trace!("rendering the diagram: {url}");
    let resp = client.get(&url).send().await?;
    let status = resp.status();
    if !status.is_success() {
        return Err(RenderError::Status(status));
    }
    Ok(resp.bytes().await?.to_vec())
}

#[cfg(test)]
mod tests {
    use search_agent_core::graph::topology;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    const PNG_MAGIC: &[u8] = b"\x89PNG\r\n\x1a\n";

    #[test]
    fn test_png_url() {
        let mermaid = topology().to_mermaid();
        let url = png_url("https://mermaid.ink/", &mermaid);
        let encoded = url
            .strip_prefix("https://mermaid.ink/img/")
            .and_then(|rest| rest.strip_suffix("?type=png"))
            .unwrap();
        assert!(!encoded.contains('/'));
        assert_eq!(URL_SAFE.decode(encoded).unwrap(), mermaid.as_bytes());
    }

    #[tokio::test]
    async fn test_render_png() {
        let mermaid = topology().to_mermaid();
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(format!("/img/{}", URL_SAFE.encode(&mermaid))))
            .and(query_param("type", "png"))
            .respond_with(
                ResponseTemplate::new(200).set_body_raw(PNG_MAGIC, "image/png"),
            )
            .mount(&server)
            .await;

        let png = render_png(&Client::new(), &server.uri(), &mermaid)
            .await
            .unwrap();
        assert_eq!(png, PNG_MAGIC);
    }

    #[tokio::test]
    async fn test_render_failure() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(400))
            .mount(&server)
            .await;

        let err = render_png(&Client::new(), &server.uri(), "graph TD;")
            .await
            .unwrap_err();
        assert!(matches!(err, RenderError::Status(StatusCode::BAD_REQUEST)));
    }
}
