//! Web search augmentation
//!
//! When a send request enables search, the outbound user turn is prefixed
//! with a context block built from search results. Search never fails a
//! request: on any error the turn gets a current-date header instead.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use scraper::{ElementRef, Html, Node, Selector};
use std::time::Duration;

use crate::errors::{ChatError, Result};

const DUCKDUCKGO_HTML_URL: &str = "https://html.duckduckgo.com/html/";
const USER_AGENT: &str = "Mozilla/5.0 (compatible; localchat)";
const DEFAULT_RESULT_COUNT: usize = 5;
const PAGE_TEXT_LIMIT: usize = 1500;
const SEARCH_TIMEOUT: Duration = Duration::from_secs(10);
const PAGE_TIMEOUT: Duration = Duration::from_secs(5);

/// Appended to the system prompt whenever search is enabled
pub const GROUNDING_INSTRUCTIONS: &str = "\n\nIMPORTANT: The user has enabled web search. \
Their message includes real-time search results with the current date and time. You MUST:\
\n- Base your answer ONLY on the provided search results and conversation context.\
\n- NEVER invent facts, URLs, dates, or numbers that are not in the search results.\
\n- If the search results do not contain enough information, say so honestly.\
\n- Cite the source when referencing specific data from the results.";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchResult {
    pub title: String,
    pub url: String,
    pub snippet: String,
}

/// Search backend
#[async_trait]
pub trait WebSearch: Send + Sync {
    async fn search(&self, query: &str) -> Result<Vec<SearchResult>>;

    /// Plain text of a result page; `None` when it cannot be fetched
    async fn page_text(&self, url: &str) -> Option<String>;
}

/// `[Current date and time: ...]`
pub fn date_header(now: DateTime<Utc>) -> String {
    format!(
        "[Current date and time: {}]",
        now.format("%A, %B %d, %Y, %I:%M %p UTC")
    )
}

/// System prompt with grounding instructions appended
pub fn grounded_system_prompt(system_prompt: &str) -> String {
    format!("{}{}", system_prompt, GROUNDING_INSTRUCTIONS)
}

/// Format results into the context block placed ahead of the user's text
pub fn context_block(
    query: &str,
    results: &[SearchResult],
    top_page: Option<&str>,
    now: DateTime<Utc>,
) -> Option<String> {
    let top = results.first()?;

    let mut lines = vec![
        date_header(now),
        format!("[Web Search Results for: \"{}\"]\n", query),
        "[Detailed source]".to_string(),
        format!("{} ({})", top.title, top.url),
        top_page
            .filter(|text| !text.is_empty())
            .unwrap_or(&top.snippet)
            .to_string(),
        String::new(),
    ];

    if results.len() > 1 {
        lines.push("[Additional sources]".to_string());
        for (i, r) in results.iter().enumerate().skip(1) {
            lines.push(format!("{}. {} - {} ({})", i + 1, r.title, r.snippet, r.url));
        }
        lines.push(String::new());
    }

    Some(lines.join("\n"))
}

/// User turn text as sent to the model when search is enabled
pub async fn augment(search: &dyn WebSearch, text: &str, now: DateTime<Utc>) -> String {
    let block = match search.search(text).await {
        Ok(results) if !results.is_empty() => {
            let page = search.page_text(&results[0].url).await;
            context_block(text, &results, page.as_deref(), now)
        }
        Ok(_) => None,
        Err(e) => {
            tracing::warn!(error = %e, "Web search failed; sending date header only");
            None
        }
    };

    let prefix = block.unwrap_or_else(|| date_header(now));
    format!("{}\n---\n{}", prefix, text)
}

/// DuckDuckGo HTML endpoint scraper
#[derive(Debug, Clone)]
pub struct DuckDuckGoSearch {
    client: reqwest::Client,
    max_results: usize,
}

impl DuckDuckGoSearch {
    pub fn new() -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(SEARCH_TIMEOUT)
            .build()?;
        Ok(Self {
            client,
            max_results: DEFAULT_RESULT_COUNT,
        })
    }

    pub fn with_max_results(mut self, max_results: usize) -> Self {
        self.max_results = max_results.max(1);
        self
    }
}

#[async_trait]
impl WebSearch for DuckDuckGoSearch {
    async fn search(&self, query: &str) -> Result<Vec<SearchResult>> {
        let response = self
            .client
            .get(DUCKDUCKGO_HTML_URL)
            .query(&[("q", query)])
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(ChatError::from_status(response.status().as_u16(), String::new()));
        }
        let html = response.text().await?;
        let mut results = parse_results(&html);
        results.truncate(self.max_results);
        tracing::debug!(query, results = results.len(), "Web search finished");
        Ok(results)
    }

    async fn page_text(&self, url: &str) -> Option<String> {
        let response = self.client.get(url).timeout(PAGE_TIMEOUT).send().await.ok()?;
        if !response.status().is_success() {
            return None;
        }
        let html = response.text().await.ok()?;
        let text: String = strip_html(&html).chars().take(PAGE_TEXT_LIMIT).collect();
        Some(text)
    }
}

/// Extract result entries from a DuckDuckGo HTML results page
pub fn parse_results(html: &str) -> Vec<SearchResult> {
    let (Ok(result), Ok(link), Ok(snippet)) = (
        Selector::parse(".result"),
        Selector::parse("a.result__a"),
        Selector::parse(".result__snippet"),
    ) else {
        return Vec::new();
    };

    let document = Html::parse_document(html);
    document
        .select(&result)
        .filter_map(|entry| {
            let anchor = entry.select(&link).next()?;
            let url = resolve_redirect(anchor.value().attr("href")?)?;
            Some(SearchResult {
                title: inline_text(anchor),
                url,
                snippet: entry.select(&snippet).next().map(inline_text).unwrap_or_default(),
            })
        })
        .collect()
}

/// Result links go through `/l/?uddg=<target>`; unwrap to the target
fn resolve_redirect(href: &str) -> Option<String> {
    let absolute = if href.starts_with("//") {
        format!("https:{}", href)
    } else {
        href.to_string()
    };
    let parsed = reqwest::Url::parse(&absolute).ok()?;
    match parsed.query_pairs().find(|(key, _)| key == "uddg") {
        Some((_, target)) => Some(target.into_owned()),
        None => Some(absolute),
    }
}

/// Text of an inline element; nested tags join without extra spacing
fn inline_text(element: ElementRef<'_>) -> String {
    collapse_whitespace(&element.text().collect::<String>())
}

const SKIPPED_ELEMENTS: [&str; 4] = ["script", "style", "noscript", "template"];

/// Visible text of a page with whitespace collapsed
pub fn strip_html(html: &str) -> String {
    let document = Html::parse_document(html);
    let mut parts: Vec<&str> = Vec::new();

    for node in document.root_element().descendants() {
        if let Node::Text(text) = node.value() {
            let hidden = node.ancestors().any(|ancestor| {
                matches!(ancestor.value(), Node::Element(e) if SKIPPED_ELEMENTS.iter().any(|name| *name == e.name()))
            });
            if !hidden {
                parts.push(&**text);
            }
        }
    }

    collapse_whitespace(&parts.join(" "))
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    const RESULTS_HTML: &str = r#"
        <div class="result">
          <h2><a rel="nofollow" class="result__a" href="//duckduckgo.com/l/?uddg=https%3A%2F%2Fwww.rust-lang.org%2F&amp;rut=abc">The <b>Rust</b> Programming Language</a></h2>
          <a class="result__snippet" href="x">A language empowering <b>everyone</b></a>
        </div>
        <div class="result">
          <h2><a rel="nofollow" class="result__a" href="https://doc.rust-lang.org/book/">The Book</a></h2>
          <a class="result__snippet" href="y">Learn Rust &amp; more</a>
        </div>
    "#;

    struct Scripted {
        results: Result<Vec<SearchResult>>,
        page: Option<String>,
    }

    #[async_trait]
    impl WebSearch for Scripted {
        async fn search(&self, _query: &str) -> Result<Vec<SearchResult>> {
            match &self.results {
                Ok(results) => Ok(results.clone()),
                Err(_) => Err(ChatError::ProviderUnavailable {
                    endpoint: "search".into(),
                    reason: "offline".into(),
                }),
            }
        }

        async fn page_text(&self, _url: &str) -> Option<String> {
            self.page.clone()
        }
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 7, 14, 5, 0).unwrap()
    }

    #[test]
    fn test_parse_results() {
        let results = parse_results(RESULTS_HTML);
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].title, "The Rust Programming Language");
        assert_eq!(results[0].url, "https://www.rust-lang.org/");
        assert_eq!(results[0].snippet, "A language empowering everyone");
        assert_eq!(results[1].url, "https://doc.rust-lang.org/book/");
        assert_eq!(results[1].snippet, "Learn Rust & more");
    }

    #[test]
    fn test_parse_results_decodes_nested_markup() {
        let html = r#"
            <div class="result results_links">
              <h2><a class="result__a" href="https://example.com/a?x=1&amp;y=2"><span>It&#8217;s <b>Rust</b></span> &amp; <i>Tokio</i></a></h2>
              <a class="result__snippet" href="z">Tom &#x26; Jerry&#8217;s &quot;guide&quot;</a>
            </div>
            <div class="result"><span>no link here</span></div>
        "#;

        let results = parse_results(html);
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].title, "It\u{2019}s Rust & Tokio");
        assert_eq!(results[0].url, "https://example.com/a?x=1&y=2");
        assert_eq!(results[0].snippet, "Tom & Jerry\u{2019}s \"guide\"");
    }

    #[test]
    fn test_strip_html() {
        let html = "<html><style>p{}</style><p>Hello\n  <i>world</i></p><script>x()</script></html>";
        assert_eq!(strip_html(html), "Hello world");
    }

    #[test]
    fn test_date_header_format() {
        assert_eq!(
            date_header(now()),
            "[Current date and time: Friday, March 07, 2025, 02:05 PM UTC]"
        );
    }

    #[test]
    fn test_context_block_layout() {
        let results = parse_results(RESULTS_HTML);
        let block = context_block("rust", &results, Some("Full page text"), now()).unwrap();
        assert!(block.starts_with("[Current date and time:"));
        assert!(block.contains("[Web Search Results for: \"rust\"]"));
        assert!(block.contains("The Rust Programming Language (https://www.rust-lang.org/)\nFull page text"));
        assert!(block.contains("[Additional sources]\n2. The Book - Learn Rust & more (https://doc.rust-lang.org/book/)"));
        assert!(context_block("rust", &[], None, now()).is_none());
    }

    #[tokio::test]
    async fn test_augment_with_results() {
        let search = Scripted {
            results: Ok(parse_results(RESULTS_HTML)),
            page: None,
        };
        let text = augment(&search, "what is rust", now()).await;
        assert!(text.contains("A language empowering everyone"));
        assert!(text.ends_with("\n---\nwhat is rust"));
    }

    #[tokio::test]
    async fn test_augment_degrades_to_date_header() {
        let failing = Scripted {
            results: Err(ChatError::Config("unused".into())),
            page: None,
        };
        let text = augment(&failing, "news today", now()).await;
        assert_eq!(
            text,
            "[Current date and time: Friday, March 07, 2025, 02:05 PM UTC]\n---\nnews today"
        );

        let empty = Scripted {
            results: Ok(Vec::new()),
            page: None,
        };
        assert!(augment(&empty, "q", now()).await.starts_with("[Current date and time:"));
    }

    #[test]
    fn test_grounded_prompt() {
        let prompt = grounded_system_prompt("You are helpful.");
        assert!(prompt.starts_with("You are helpful.\n\nIMPORTANT"));
        assert!(prompt.contains("NEVER invent facts"));
    }
}
