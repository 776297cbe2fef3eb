//! Configuration for the extraction pipeline
//!
//! Options mirror what a caller passes to `runExtraction`: per-strategy page
//! budgets, courtesy delay, and persistence toggles. A JSON config file can
//! override defaults; `DATABASE_URL` overrides the store location.

use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{info, warn};

/// Where the source lives and how to speak to it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EndpointConfig {
    /// Origin of the scraped property, e.g. `https://www.myscheme.gov.in`.
    pub base_url: String,
    /// Paginated search API endpoint (relative to `api_base_url`).
    pub search_path: String,
    /// Per-scheme detail endpoint; `{id}` is replaced with the external id.
    pub detail_path: String,
    /// API origin when it differs from the page origin.
    pub api_base_url: String,
    /// Site-issued API key sent as `x-api-key` when known.
    pub api_key: Option<String>,
    /// User agent presented on all requests.
    pub user_agent: String,
}

impl Default for EndpointConfig {
    fn default() -> Self {
        Self {
            base_url: "https://www.myscheme.gov.in".to_string(),
            search_path: "/search/v4/schemes".to_string(),
            detail_path: "/schemes/v5/public/schemes/{id}".to_string(),
            api_base_url: "https://api.myscheme.gov.in".to_string(),
            api_key: None,
            user_agent: concat!(
                "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 ",
                "(KHTML, like Gecko) Chrome/120.0 Safari/537.36"
            )
            .to_string(),
        }
    }
}

/// Recognized `runExtraction` options plus per-strategy sweep lists.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractionConfig {
    /// Hard page cap for the paginated strategy. The source never signals
    /// end-of-data, so this bounds worst-case work.
    pub max_pages_per_strategy: u32,
    pub page_size: u32,
    /// Courtesy delay between sub-requests of one strategy. Etiquette, not
    /// correctness.
    pub inter_request_delay_ms: u64,
    /// Follow up list hits with per-scheme detail fetches.
    pub enrich_details: bool,
    /// Upsert finalized records into the store. Disable for dry runs.
    pub persist: bool,
    /// Upper bound on one navigation before it is treated as empty-result.
    pub navigation_timeout_ms: u64,
    /// Records per ingestion batch; bounds memory and paces progress events.
    pub ingest_batch_size: usize,
    /// Keywords driving the filtered-search strategy.
    pub search_keywords: Vec<String>,
    /// Category names driving the category sweep.
    pub categories: Vec<String>,
    /// Ministry names driving the ministry sweep.
    pub ministries: Vec<String>,
    pub endpoint: EndpointConfig,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            max_pages_per_strategy: 100,
            page_size: 50,
            inter_request_delay_ms: 1000,
            enrich_details: false,
            persist: true,
            navigation_timeout_ms: 30_000,
            ingest_batch_size: 50,
            search_keywords: [
                "scheme", "yojana", "pension", "scholarship", "farmer", "women",
                "health", "housing", "employment", "education",
            ]
            .iter()
            .map(ToString::to_string)
            .collect(),
            categories: [
                "Agriculture,Rural & Environment",
                "Banking,Financial Services and Insurance",
                "Education & Learning",
                "Health & Wellness",
                "Housing & Shelter",
                "Skills & Employment",
                "Social welfare & Empowerment",
                "Women and Child",
            ]
            .iter()
            .map(ToString::to_string)
            .collect(),
            ministries: [
                "Ministry Of Agriculture and Farmers Welfare",
                "Ministry Of Education",
                "Ministry Of Health & Family Welfare",
                "Ministry Of Housing & Urban Affairs",
                "Ministry Of Labour and Employment",
                "Ministry Of Rural Development",
                "Ministry Of Women and Child Development",
            ]
            .iter()
            .map(ToString::to_string)
            .collect(),
            endpoint: EndpointConfig::default(),
        }
    }
}

impl ExtractionConfig {
    /// Load configuration from a JSON file, falling back to defaults when the
    /// file is absent. A malformed file is an error; a missing one is not.
    pub fn load_or_default(path: &Path) -> anyhow::Result<Self> {
        if !path.exists() {
            info!("No config file at {}, using defaults", path.display());
            return Ok(Self::default());
        }
        let raw = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&raw)?;
        info!("Loaded extraction config from {}", path.display());
        Ok(config)
    }

    /// Database URL, resolved from the environment with a local default.
    pub fn database_url() -> String {
        std::env::var("DATABASE_URL").unwrap_or_else(|_| {
            warn!("DATABASE_URL not set, using ./schemes.db");
            "sqlite://schemes.db?mode=rwc".to_string()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let config = ExtractionConfig::default();
        assert_eq!(config.page_size, 50);
        assert_eq!(config.inter_request_delay_ms, 1000);
        assert_eq!(config.ingest_batch_size, 50);
        assert!(config.persist);
        assert!(!config.enrich_details);
    }

    #[test]
    fn missing_file_yields_defaults() {
        let config =
            ExtractionConfig::load_or_default(Path::new("/nonexistent/config.json")).unwrap();
        assert_eq!(config.max_pages_per_strategy, 100);
    }

    #[test]
    fn partial_file_fills_in_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{"page_size": 25}"#).unwrap();

        let config = ExtractionConfig::load_or_default(&path).unwrap();
        assert_eq!(config.page_size, 25);
        assert_eq!(config.inter_request_delay_ms, 1000);
    }
}
