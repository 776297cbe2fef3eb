//! Extraction strategies as data
//!
//! Each strategy is one named, independent way of querying the source. New
//! strategies are additions to the chain, not new control flow: the runner
//! interprets the `StrategyKind`, and everything a strategy needs (endpoint
//! shapes, sweep terms, budgets) comes from configuration.

use scraper::{Html, Selector};
use tracing::debug;
use url::Url;

use crate::domain::scheme::SchemeRecord;
use crate::infrastructure::config::ExtractionConfig;

/// The last-resort strategy name, reported in `strategy_source` when the
/// bundled seed dataset had to stand in for the source.
pub const SEED_STRATEGY: &str = "seed-data";

/// Name of the unfiltered paginated strategy; detail enrichment keys off it.
pub const PAGINATED_STRATEGY: &str = "paginated-api";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StrategyKind {
    /// Walk the search API page by page with no filter.
    PaginatedApi,
    /// One search request per configured keyword.
    KeywordSearch,
    /// One filtered request per configured category.
    CategorySweep,
    /// One filtered request per configured ministry.
    MinistrySweep,
    /// Navigate rendered pages and scrape scheme cards from the markup.
    DomFallback,
}

#[derive(Debug, Clone, Copy)]
pub struct StrategyPlan {
    pub name: &'static str,
    pub kind: StrategyKind,
}

/// The ordered chain a run executes. Every strategy runs regardless of what
/// earlier ones found: different query shapes surface different subsets of
/// the catalog.
pub fn strategy_chain() -> Vec<StrategyPlan> {
    vec![
        StrategyPlan { name: PAGINATED_STRATEGY, kind: StrategyKind::PaginatedApi },
        StrategyPlan { name: "keyword-search", kind: StrategyKind::KeywordSearch },
        StrategyPlan { name: "category-sweep", kind: StrategyKind::CategorySweep },
        StrategyPlan { name: "ministry-sweep", kind: StrategyKind::MinistrySweep },
        StrategyPlan { name: "dom-fallback", kind: StrategyKind::DomFallback },
    ]
}

/// Build the paginated search URL for one page offset.
pub fn paginated_url(config: &ExtractionConfig, page: u32) -> String {
    search_url(config, &[
        ("from", (page * config.page_size).to_string()),
        ("size", config.page_size.to_string()),
    ])
}

pub fn keyword_url(config: &ExtractionConfig, keyword: &str) -> String {
    search_url(config, &[
        ("q", keyword.to_string()),
        ("from", "0".to_string()),
        ("size", config.page_size.to_string()),
    ])
}

pub fn category_url(config: &ExtractionConfig, category: &str) -> String {
    filtered_url(config, "schemeCategory", category)
}

pub fn ministry_url(config: &ExtractionConfig, ministry: &str) -> String {
    filtered_url(config, "nodalMinistryName", ministry)
}

pub fn detail_url(config: &ExtractionConfig, external_id: &str) -> String {
    format!(
        "{}{}",
        config.endpoint.api_base_url,
        config.endpoint.detail_path.replace("{id}", external_id)
    )
}

/// Rendered search page for the DOM fallback, 1-based.
pub fn dom_page_url(config: &ExtractionConfig, page: u32) -> String {
    format!("{}/search?page={}", config.endpoint.base_url, page)
}

fn filtered_url(config: &ExtractionConfig, field: &str, term: &str) -> String {
    search_url(config, &[
        ("fq", format!("{field}:{term}")),
        ("from", "0".to_string()),
        ("size", config.page_size.to_string()),
    ])
}

fn search_url(config: &ExtractionConfig, params: &[(&str, String)]) -> String {
    let base = format!(
        "{}{}",
        config.endpoint.api_base_url, config.endpoint.search_path
    );
    match Url::parse(&base) {
        Ok(mut url) => {
            url.query_pairs_mut().append_pair("lang", "en");
            for (key, value) in params {
                url.query_pairs_mut().append_pair(key, value);
            }
            url.to_string()
        }
        // Malformed base URL degrades to the unparameterized endpoint; the
        // request will yield nothing and the run continues.
        Err(_) => base,
    }
}

/// Candidate selectors for scheme cards in rendered markup. Soft signals:
/// the first selector matching at least one element wins.
const CARD_SELECTORS: &[&str] = &[
    "div[class*=\"scheme\"]",
    "article",
    ".card",
    "li[class*=\"result\"]",
];
const CARD_NAME_SELECTORS: &[&str] = &["h2", "h3", "a[title]", ".title"];
const CARD_DESCRIPTION_SELECTORS: &[&str] = &["p", ".description"];

/// Scrape scheme cards out of a rendered page. Best-effort: an unmatched
/// page yields an empty list, never an error.
pub fn parse_scheme_cards(html: &str, source_url: &str) -> Vec<SchemeRecord> {
    let document = Html::parse_document(html);

    let cards: Vec<_> = CARD_SELECTORS
        .iter()
        .filter_map(|raw| Selector::parse(raw).ok())
        .map(|selector| document.select(&selector).collect::<Vec<_>>())
        .find(|matches| !matches.is_empty())
        .unwrap_or_default();

    let mut records = Vec::new();
    for card in cards {
        let Some(name) = first_text(&card, CARD_NAME_SELECTORS) else {
            continue;
        };
        let mut record = SchemeRecord::named(name);
        record.description = first_text(&card, CARD_DESCRIPTION_SELECTORS).unwrap_or_default();
        record.source_label = "dom-fallback".to_string();
        record.source_url = source_url.to_string();
        records.push(record);
    }
    debug!("DOM fallback parsed {} card(s) from {}", records.len(), source_url);
    records
}

fn first_text(card: &scraper::ElementRef<'_>, selectors: &[&str]) -> Option<String> {
    for raw in selectors {
        let Ok(selector) = Selector::parse(raw) else {
            continue;
        };
        if let Some(element) = card.select(&selector).next() {
            let text: String = element.text().collect::<String>().trim().to_string();
            if !text.is_empty() {
                return Some(text);
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chain_runs_api_strategies_before_dom_fallback() {
        let chain = strategy_chain();
        assert_eq!(chain.len(), 5);
        assert_eq!(chain[0].kind, StrategyKind::PaginatedApi);
        assert_eq!(chain[4].kind, StrategyKind::DomFallback);
    }

    #[test]
    fn paginated_url_encodes_offset_and_size() {
        let config = ExtractionConfig::default();
        let url = paginated_url(&config, 2);
        assert!(url.contains("from=100"), "{url}");
        assert!(url.contains("size=50"), "{url}");
        assert!(url.contains("lang=en"), "{url}");
    }

    #[test]
    fn filter_urls_escape_terms() {
        let config = ExtractionConfig::default();
        let url = category_url(&config, "Women and Child");
        assert!(url.contains("schemeCategory%3AWomen+and+Child"), "{url}");
    }

    #[test]
    fn detail_url_substitutes_the_id() {
        let config = ExtractionConfig::default();
        let url = detail_url(&config, "pmay-g");
        assert!(url.ends_with("/schemes/v5/public/schemes/pmay-g"), "{url}");
    }

    #[test]
    fn parses_scheme_cards_from_markup() {
        let html = r#"
            <div class="scheme-card"><h3>Card Yojana</h3><p>Helps farmers.</p></div>
            <div class="scheme-card"><h3>Second Yojana</h3></div>
            <div class="scheme-card"><p>No heading, dropped</p></div>
        "#;
        let records = parse_scheme_cards(html, "https://example.gov/search?page=1");
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].name, "Card Yojana");
        assert_eq!(records[0].description, "Helps farmers.");
        assert_eq!(records[0].source_label, "dom-fallback");
    }

    #[test]
    fn unmatched_markup_yields_no_cards() {
        assert!(parse_scheme_cards("<html><body><nav>menu</nav></body></html>", "u").is_empty());
    }
}
