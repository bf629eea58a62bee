//! HTTP page reader and HTML text extraction.

use std::sync::LazyLock;
use std::time::Duration;

use async_trait::async_trait;
use regex::Regex;
use reqwest::redirect::Policy;
use reqwest::{Client, Response};
use scraper::{ElementRef, Html, Selector};
use tracing::{debug, instrument};
use url::Url;

use hottake_shared::{HotTakeError, Result};

use crate::guard::is_ssrf_target;
use crate::{PageContent, PageReader, USER_AGENT};

static WHITESPACE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").unwrap());

static TITLE: LazyLock<Selector> = LazyLock::new(|| Selector::parse("title").unwrap());
static DESCRIPTION: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse(r#"meta[name="description"]"#).unwrap());
static BODY: LazyLock<Selector> = LazyLock::new(|| Selector::parse("body").unwrap());

/// Largest body read from one page; longer streams are cut here.
const MAX_BODY_BYTES: usize = 2 * 1024 * 1024;

const MAX_REDIRECTS: usize = 5;

/// Elements whose text never reaches the reader.
const HIDDEN_TAGS: &[&str] = &["script", "style", "noscript", "template"];

// ---------------------------------------------------------------------------
// HttpPageReader
// ---------------------------------------------------------------------------

/// Fetches pages over HTTP and extracts their visible text.
pub struct HttpPageReader {
    client: Client,
    /// Allow localhost/private IPs (for integration tests with mock servers).
    allow_localhost: bool,
}

impl HttpPageReader {
    /// Create a reader with a shared connection pool.
    pub fn new() -> Result<Self> {
        Ok(Self {
            client: build_client(false)?,
            allow_localhost: false,
        })
    }

    /// Allow fetching localhost/private IPs (for integration tests).
    #[cfg(test)]
    pub fn allow_localhost(self) -> Self {
        Self {
            client: build_client(true).expect("client builds"),
            allow_localhost: true,
        }
    }
}

fn build_client(allow_localhost: bool) -> Result<Client> {
    Client::builder()
        .user_agent(USER_AGENT)
        .redirect(redirect_policy(allow_localhost))
        .build()
        .map_err(|e| HotTakeError::FetchFailure(format!("failed to build HTTP client: {e}")))
}

/// Every redirect hop goes through the same SSRF check as the first request.
fn redirect_policy(allow_localhost: bool) -> Policy {
    Policy::custom(move |attempt| {
        if attempt.previous().len() > MAX_REDIRECTS {
            attempt.error("too many redirects")
        } else if !allow_localhost && is_ssrf_target(attempt.url()) {
            let msg = format!("redirect to private or non-http target {}", attempt.url());
            attempt.error(msg)
        } else {
            attempt.follow()
        }
    })
}

#[async_trait]
impl PageReader for HttpPageReader {
    #[instrument(skip_all, fields(url = %url))]
    async fn read(&self, url: &str, deadline: Duration) -> Result<PageContent> {
        let parsed = Url::parse(url)
            .map_err(|e| HotTakeError::FetchFailure(format!("invalid url '{url}': {e}")))?;

        if !self.allow_localhost && is_ssrf_target(&parsed) {
            return Err(HotTakeError::FetchFailure(format!(
                "{url}: refusing to fetch private or non-http target"
            )));
        }

        let response = self
            .client
            .get(parsed.as_str())
            .timeout(deadline)
            .send()
            .await
            .map_err(|e| map_request_error(url, deadline, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(HotTakeError::FetchFailure(format!("{url}: HTTP {status}")));
        }

        if let Some(len) = response.content_length() {
            if len > MAX_BODY_BYTES as u64 {
                return Err(HotTakeError::FetchFailure(format!(
                    "{url}: response too large ({len} bytes, max {MAX_BODY_BYTES})"
                )));
            }
        }

        let body = read_capped(url, deadline, response).await?;

        debug!(bytes = body.len(), "page fetched");
        Ok(extract_page(&body))
    }
}

/// Read at most [`MAX_BODY_BYTES`] of the body, decoding it lossily.
async fn read_capped(url: &str, deadline: Duration, mut response: Response) -> Result<String> {
    let mut body = Vec::new();
    while let Some(chunk) = response
        .chunk()
        .await
        .map_err(|e| map_request_error(url, deadline, e))?
    {
        let room = MAX_BODY_BYTES - body.len();
        if chunk.len() >= room {
            body.extend_from_slice(&chunk[..room]);
            debug!(max = MAX_BODY_BYTES, "body cut at size cap");
            break;
        }
        body.extend_from_slice(&chunk);
    }
    Ok(String::from_utf8_lossy(&body).into_owned())
}

fn map_request_error(url: &str, deadline: Duration, err: reqwest::Error) -> HotTakeError {
    if err.is_timeout() {
        HotTakeError::timeout(format!("fetch {url}"), deadline)
    } else {
        HotTakeError::FetchFailure(format!("{url}: {err}"))
    }
}

// ---------------------------------------------------------------------------
// Extraction
// ---------------------------------------------------------------------------

/// Extract title, meta description, and visible body text from an HTML document.
pub fn extract_page(html: &str) -> PageContent {
    let doc = Html::parse_document(html);

    let title = doc
        .select(&TITLE)
        .next()
        .map(|el| collapse_whitespace(&el.text().collect::<String>()))
        .unwrap_or_default();

    let description = doc
        .select(&DESCRIPTION)
        .next()
        .and_then(|el| el.value().attr("content"))
        .map(collapse_whitespace)
        .unwrap_or_default();

    let text = match doc.select(&BODY).next() {
        Some(body) => visible_text(body),
        None => visible_text(doc.root_element()),
    };

    PageContent {
        title,
        description,
        text,
    }
}

fn visible_text(root: ElementRef<'_>) -> String {
    let mut out = String::new();
    for node in root.descendants() {
        let Some(text) = node.value().as_text() else {
            continue;
        };
        let hidden = node.ancestors().any(|a| {
            a.value()
                .as_element()
                .is_some_and(|e| HIDDEN_TAGS.contains(&e.name()))
        });
        if !hidden {
            out.push_str(text);
            out.push(' ');
        }
    }
    collapse_whitespace(&out)
}

fn collapse_whitespace(text: &str) -> String {
    WHITESPACE.replace_all(text, " ").trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    const ARTICLE: &str = r#"<html>
<head>
  <title>  Studio delays
  sequel </title>
  <meta name="description" content="Fans are not happy">
  <style>body { color: red }</style>
</head>
<body>
  <nav>Home</nav>
  <h1>Sequel delayed</h1>
  <p>The studio said the game needs <b>more</b> time.</p>
  <script>window.analytics = {};</script>
  <noscript>Enable JS</noscript>
</body>
</html>"#;

    #[test]
    fn extracts_title_description_and_text() {
        let page = extract_page(ARTICLE);
        assert_eq!(page.title, "Studio delays sequel");
        assert_eq!(page.description, "Fans are not happy");
        assert_eq!(
            page.text,
            "Home Sequel delayed The studio said the game needs more time."
        );
    }

    #[test]
    fn missing_metadata_is_empty() {
        let page = extract_page("<p>just text</p>");
        assert_eq!(page.title, "");
        assert_eq!(page.description, "");
        assert_eq!(page.text, "just text");
    }

    #[tokio::test]
    async fn reads_page_from_server() {
        let server = wiremock::MockServer::start().await;
        wiremock::Mock::given(wiremock::matchers::method("GET"))
            .and(wiremock::matchers::path("/article"))
            .respond_with(wiremock::ResponseTemplate::new(200).set_body_string(ARTICLE))
            .mount(&server)
            .await;

        let reader = HttpPageReader::new().unwrap().allow_localhost();
        let page = reader
            .read(&format!("{}/article", server.uri()), Duration::from_secs(5))
            .await
            .unwrap();
        assert_eq!(page.title, "Studio delays sequel");
        assert!(page.text.contains("more time"));
    }

    #[tokio::test]
    async fn http_error_is_fetch_failure() {
        let server = wiremock::MockServer::start().await;
        wiremock::Mock::given(wiremock::matchers::any())
            .respond_with(wiremock::ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let reader = HttpPageReader::new().unwrap().allow_localhost();
        let err = reader
            .read(&server.uri(), Duration::from_secs(5))
            .await
            .unwrap_err();
        assert!(matches!(err, HotTakeError::FetchFailure(_)), "{err}");
        assert!(err.to_string().contains("503"));
    }

    #[tokio::test]
    async fn slow_server_is_transport_timeout() {
        let server = wiremock::MockServer::start().await;
        wiremock::Mock::given(wiremock::matchers::any())
            .respond_with(
                wiremock::ResponseTemplate::new(200)
                    .set_body_string(ARTICLE)
                    .set_delay(Duration::from_secs(5)),
            )
            .mount(&server)
            .await;

        let reader = HttpPageReader::new().unwrap().allow_localhost();
        let err = reader
            .read(&server.uri(), Duration::from_millis(200))
            .await
            .unwrap_err();
        assert!(matches!(err, HotTakeError::TransportTimeout { .. }), "{err}");
    }

    #[tokio::test]
    async fn refuses_private_targets_by_default() {
        let reader = HttpPageReader::new().unwrap();
        let err = reader
            .read("http://127.0.0.1:9/", Duration::from_secs(1))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("refusing"));

        let err = reader
            .read("http://[::ffff:127.0.0.1]:9/secret", Duration::from_secs(1))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("refusing"), "{err}");

        let err = reader
            .read("not a url", Duration::from_secs(1))
            .await
            .unwrap_err();
        assert!(matches!(err, HotTakeError::FetchFailure(_)));
    }

    async fn redirect_server() -> wiremock::MockServer {
        let server = wiremock::MockServer::start().await;
        wiremock::Mock::given(wiremock::matchers::path("/start"))
            .respond_with(
                wiremock::ResponseTemplate::new(302)
                    .insert_header("Location", format!("{}/secret", server.uri()).as_str()),
            )
            .mount(&server)
            .await;
        server
    }

    #[tokio::test]
    async fn redirect_to_private_target_is_refused() {
        let server = redirect_server().await;
        wiremock::Mock::given(wiremock::matchers::path("/secret"))
            .respond_with(wiremock::ResponseTemplate::new(200).set_body_string("internal admin"))
            .expect(0)
            .mount(&server)
            .await;

        // Only the redirect hop is guarded: the mock server itself is on loopback.
        let reader = HttpPageReader {
            client: build_client(false).unwrap(),
            allow_localhost: true,
        };
        let err = reader
            .read(&format!("{}/start", server.uri()), Duration::from_secs(5))
            .await
            .unwrap_err();
        assert!(matches!(err, HotTakeError::FetchFailure(_)), "{err}");
    }

    #[tokio::test]
    async fn redirects_are_followed_when_allowed() {
        let server = redirect_server().await;
        wiremock::Mock::given(wiremock::matchers::path("/secret"))
            .respond_with(wiremock::ResponseTemplate::new(200).set_body_string(ARTICLE))
            .expect(1)
            .mount(&server)
            .await;

        let reader = HttpPageReader::new().unwrap().allow_localhost();
        let page = reader
            .read(&format!("{}/start", server.uri()), Duration::from_secs(5))
            .await
            .unwrap();
        assert_eq!(page.title, "Studio delays sequel");
    }

    #[tokio::test]
    async fn oversized_body_is_refused() {
        let server = wiremock::MockServer::start().await;
        wiremock::Mock::given(wiremock::matchers::any())
            .respond_with(
                wiremock::ResponseTemplate::new(200).set_body_string("a".repeat(MAX_BODY_BYTES + 1)),
            )
            .mount(&server)
            .await;

        let reader = HttpPageReader::new().unwrap().allow_localhost();
        let err = reader
            .read(&server.uri(), Duration::from_secs(5))
            .await
            .unwrap_err();
        assert!(matches!(err, HotTakeError::FetchFailure(_)), "{err}");
        assert!(err.to_string().contains("too large"), "{err}");
    }
}
