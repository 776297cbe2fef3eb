//! Transport session: navigation, direct fetches, and passive capture
//!
//! The session owns the network context for one run. It captures the JSON
//! body of any response whose URL matches the record-bearing endpoint
//! pattern, and it can issue direct API calls with a realistic header set
//! when a stable request shape is known.
//!
//! Failure semantics: every method except `open` degrades to an empty
//! result. A broken navigation is logged and yields nothing; it never aborts
//! the run.

use async_trait::async_trait;
use regex::Regex;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, ORIGIN, REFERER};
use reqwest::Client;
use scraper::{Html, Selector};
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::domain::RawCapture;
use crate::infrastructure::config::EndpointConfig;
use crate::infrastructure::errors::ExtractionError;

/// URL predicate for record-bearing endpoints: an `api` URL that also
/// mentions schemes or search.
pub fn is_capture_url(url: &str) -> bool {
    let lower = url.to_lowercase();
    lower.contains("api") && (lower.contains("scheme") || lower.contains("search"))
}

/// A navigable session with passive response capture.
///
/// Implemented by [`HttpSession`] in production and by scripted sessions in
/// tests. Methods take `&mut self`: one run drives one session sequentially.
#[async_trait]
pub trait TransportSession: Send {
    /// Acquire the underlying network resources. The only fatal operation:
    /// failure aborts the run before any strategy executes. Safe to call
    /// again on an already-open session.
    async fn open(&mut self) -> Result<(), ExtractionError>;

    /// Navigate to a page. A timeout is a valid, logged, empty-result
    /// outcome — never an error.
    async fn goto(&mut self, url: &str, timeout_ms: u64);

    /// Issue a direct request against a known endpoint shape. Returns the
    /// structured body, or `None` on any transport failure.
    async fn fetch_direct(&mut self, url: &str) -> Option<Value>;

    /// Best-effort attempt to make more data appear on the current page
    /// (pagination links, "load more" candidates). Absence of effect is
    /// expected and common.
    async fn trigger_load(&mut self);

    /// Return and clear the accumulated capture buffer.
    fn drain_captures(&mut self) -> Vec<RawCapture>;

    /// Rendered markup of the most recent successful navigation, if any.
    /// Consumed by the DOM-fallback strategy.
    fn current_page(&self) -> Option<(&str, &str)> {
        None
    }

    /// Release all resources. The runner guarantees this runs on every exit
    /// path; calling it twice is harmless.
    async fn close(&mut self);
}

/// Candidate selectors for elements that load more data when followed.
/// Soft signals, tried in order; each is independently fallible.
const TRIGGER_PROBES: &[&str] = &[
    "a[rel=\"next\"]",
    "button.load-more",
    "button[class*=\"loadMore\"]",
    ".pagination a",
    "a[class*=\"next\"]",
];

/// reqwest-backed [`TransportSession`].
///
/// Direct API responses matching [`is_capture_url`] are captured verbatim.
/// Page navigations additionally scan the fetched HTML for an embedded JSON
/// state blob (server-rendered equivalent of the XHR this session cannot
/// observe) and capture that too.
pub struct HttpSession {
    endpoint: EndpointConfig,
    client: Option<Client>,
    captures: Vec<RawCapture>,
    /// Last successfully fetched page, kept for `trigger_load` probes.
    current_page: Option<(String, String)>,
    state_blob_re: Regex,
}

impl HttpSession {
    pub fn new(endpoint: EndpointConfig) -> Self {
        Self {
            endpoint,
            client: None,
            captures: Vec::new(),
            current_page: None,
            // window.__INITIAL_STATE__ = {...}; style inline state
            state_blob_re: Regex::new(
                r"window\.__(?:INITIAL_STATE|NUXT|PRELOADED_STATE)__\s*=\s*(\{.*\})",
            )
            .expect("static regex"),
        }
    }

    fn default_headers(&self) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json, text/plain, */*"));
        if let Ok(referer) = HeaderValue::from_str(&format!("{}/search", self.endpoint.base_url)) {
            headers.insert(REFERER, referer);
        }
        if let Ok(origin) = HeaderValue::from_str(&self.endpoint.base_url) {
            headers.insert(ORIGIN, origin);
        }
        if let Some(key) = &self.endpoint.api_key {
            if let Ok(value) = HeaderValue::from_str(key) {
                headers.insert("x-api-key", value);
            }
        }
        headers
    }

    fn record_capture(&mut self, url: &str, payload: Value) {
        debug!("📥 Captured structured response from {}", url);
        self.captures.push(RawCapture::new(url, payload));
    }

    /// Pull an embedded JSON state blob out of fetched page HTML, if any.
    fn extract_state_blob(&self, html: &str) -> Option<Value> {
        let document = Html::parse_document(html);
        // Next.js style: a dedicated JSON script tag.
        if let Ok(selector) = Selector::parse("script#__NEXT_DATA__") {
            if let Some(script) = document.select(&selector).next() {
                let text: String = script.text().collect();
                if let Ok(value) = serde_json::from_str::<Value>(&text) {
                    return Some(value);
                }
            }
        }
        // Inline assignment style.
        if let Some(caps) = self.state_blob_re.captures(html) {
            if let Ok(value) = serde_json::from_str::<Value>(&caps[1]) {
                return Some(value);
            }
        }
        None
    }
}

#[async_trait]
impl TransportSession for HttpSession {
    async fn open(&mut self) -> Result<(), ExtractionError> {
        if self.client.is_some() {
            return Ok(());
        }
        let client = Client::builder()
            .user_agent(&self.endpoint.user_agent)
            .default_headers(self.default_headers())
            .cookie_store(true)
            .gzip(true)
            .timeout(Duration::from_secs(60))
            .build()
            .map_err(|e| ExtractionError::TransportInit(e.to_string()))?;
        info!("🌐 Transport session opened for {}", self.endpoint.base_url);
        self.client = Some(client);
        Ok(())
    }

    async fn goto(&mut self, url: &str, timeout_ms: u64) {
        let Some(client) = self.client.clone() else {
            warn!("goto called on a closed session: {}", url);
            return;
        };
        debug!("➡️ goto {}", url);
        let request = async {
            let response = client.get(url).send().await?;
            response.text().await
        };
        match tokio::time::timeout(Duration::from_millis(timeout_ms), request).await {
            Ok(Ok(body)) => {
                if let Some(blob) = self.extract_state_blob(&body) {
                    self.record_capture(url, blob);
                }
                self.current_page = Some((url.to_string(), body));
            }
            Ok(Err(e)) => {
                // Empty-result outcome, the run continues.
                warn!("Navigation to {} failed: {}", url, e);
            }
            Err(_) => {
                warn!(
                    "{}",
                    ExtractionError::NavigationTimeout {
                        url: url.to_string(),
                        timeout_ms,
                    }
                );
            }
        }
    }

    async fn fetch_direct(&mut self, url: &str) -> Option<Value> {
        let client = self.client.clone()?;
        debug!("🌐 GET {}", url);
        let response = match client.get(url).send().await {
            Ok(response) => response,
            Err(e) => {
                warn!("Direct fetch of {} failed: {}", url, e);
                return None;
            }
        };
        if !response.status().is_success() {
            warn!("Direct fetch of {} returned HTTP {}", url, response.status());
            return None;
        }
        let body = match response.text().await {
            Ok(body) => body,
            Err(e) => {
                warn!("Failed to read body from {}: {}", url, e);
                return None;
            }
        };
        match serde_json::from_str::<Value>(&body) {
            Ok(value) => {
                if is_capture_url(url) {
                    self.record_capture(url, value.clone());
                }
                Some(value)
            }
            Err(e) => {
                warn!(
                    "{}",
                    ExtractionError::CaptureParse {
                        url: url.to_string(),
                        reason: e.to_string(),
                    }
                );
                None
            }
        }
    }

    async fn trigger_load(&mut self) {
        let Some((page_url, html)) = self.current_page.clone() else {
            return;
        };
        let candidates: Vec<String> = {
            let document = Html::parse_document(&html);
            TRIGGER_PROBES
                .iter()
                .filter_map(|probe| Selector::parse(probe).ok())
                .filter_map(|selector| {
                    document
                        .select(&selector)
                        .next()
                        .and_then(|el| el.value().attr("href"))
                        .map(ToString::to_string)
                })
                .collect()
        };
        let Some(href) = candidates.into_iter().next() else {
            debug!("No trigger probe matched on {}", page_url);
            return;
        };
        let next_url = match url::Url::parse(&page_url).and_then(|base| base.join(&href)) {
            Ok(resolved) => resolved.to_string(),
            Err(_) => return,
        };
        debug!("🔁 Trigger probe following {}", next_url);
        self.goto(&next_url, 15_000).await;
    }

    fn drain_captures(&mut self) -> Vec<RawCapture> {
        std::mem::take(&mut self.captures)
    }

    fn current_page(&self) -> Option<(&str, &str)> {
        self.current_page
            .as_ref()
            .map(|(url, html)| (url.as_str(), html.as_str()))
    }

    async fn close(&mut self) {
        if self.client.take().is_some() {
            info!("🔌 Transport session closed");
        }
        self.captures.clear();
        self.current_page = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn capture_predicate_matches_scheme_and_search_apis() {
        assert!(is_capture_url("https://api.example.gov/search/v4/schemes?q=x"));
        assert!(is_capture_url("https://example.gov/api/schemes/123"));
        assert!(is_capture_url("https://example.gov/api/search?keyword=y"));
        assert!(!is_capture_url("https://example.gov/about"));
        assert!(!is_capture_url("https://example.gov/schemes")); // no "api"
    }

    #[test]
    fn extracts_next_data_blob() {
        let session = HttpSession::new(EndpointConfig::default());
        let html = r#"<html><body>
            <script id="__NEXT_DATA__" type="application/json">{"props":{"schemes":[]}}</script>
        </body></html>"#;
        let blob = session.extract_state_blob(html).unwrap();
        assert_eq!(blob, json!({"props": {"schemes": []}}));
    }

    #[test]
    fn extracts_inline_state_assignment() {
        let session = HttpSession::new(EndpointConfig::default());
        let html = r#"<script>window.__INITIAL_STATE__ = {"results":[{"name":"A"}]}</script>"#;
        let blob = session.extract_state_blob(html).unwrap();
        assert_eq!(blob["results"][0]["name"], "A");
    }

    #[test]
    fn no_blob_yields_none() {
        let session = HttpSession::new(EndpointConfig::default());
        assert!(session.extract_state_blob("<html><p>hello</p></html>").is_none());
    }

    #[tokio::test]
    async fn drain_empties_the_buffer() {
        let mut session = HttpSession::new(EndpointConfig::default());
        session.record_capture("https://api.x/schemes", json!({"a": 1}));
        assert_eq!(session.drain_captures().len(), 1);
        assert!(session.drain_captures().is_empty());
    }

    #[tokio::test]
    async fn methods_degrade_when_closed() {
        let mut session = HttpSession::new(EndpointConfig::default());
        // Never opened: fetch returns nothing, goto is a no-op.
        assert!(session.fetch_direct("https://api.x/schemes").await.is_none());
        session.goto("https://example.gov", 10).await;
        assert!(session.drain_captures().is_empty());
    }
}
