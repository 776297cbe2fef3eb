//! Core domain types for extracted scheme records
//!
//! A `SchemeRecord` is the canonical shape every extraction strategy
//! normalizes into, regardless of which endpoint or payload nesting it
//! came from. Identity across strategies and runs is derived, never stored.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Administrative level a scheme is issued at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum SchemeLevel {
    Central,
    State,
    #[default]
    Unknown,
}

impl SchemeLevel {
    /// Parse a source-provided level string. Anything unrecognized maps to
    /// `Unknown` rather than failing the record.
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_lowercase().as_str() {
            "central" | "centre" | "central government" => Self::Central,
            "state" | "state government" | "state/ut" => Self::State,
            _ => Self::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Central => "Central",
            Self::State => "State",
            Self::Unknown => "Unknown",
        }
    }
}

impl std::fmt::Display for SchemeLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Canonical representation of one scheme, produced by the normalizer.
///
/// Invariant: `name` is non-empty after trimming. The normalizer drops
/// elements that cannot resolve a name, so downstream components may rely
/// on this without re-checking.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchemeRecord {
    /// Source-assigned identifier. Authoritative for identity when present.
    pub external_id: Option<String>,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub ministry: String,
    #[serde(default)]
    pub department: String,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub sub_category: String,
    #[serde(default)]
    pub target_audience: String,
    #[serde(default)]
    pub level: SchemeLevel,
    /// Comma-joined region names, source order preserved.
    #[serde(default)]
    pub region_scope: String,
    pub launch_date: Option<NaiveDate>,
    /// Which strategy/endpoint produced this record.
    #[serde(default)]
    pub source_label: String,
    #[serde(default)]
    pub source_url: String,
    pub extracted_at: DateTime<Utc>,
}

impl SchemeRecord {
    /// Minimal constructor used by tests and the seed loader.
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            external_id: None,
            name: name.into(),
            description: String::new(),
            ministry: String::new(),
            department: String::new(),
            category: String::new(),
            sub_category: String::new(),
            target_audience: String::new(),
            level: SchemeLevel::Unknown,
            region_scope: String::new(),
            launch_date: None,
            source_label: String::new(),
            source_url: String::new(),
            extracted_at: Utc::now(),
        }
    }

    /// Derive the identity key used for dedup and store matching:
    /// `external_id` when present, else the lowercased trimmed name.
    pub fn identity_key(&self) -> IdentityKey {
        match &self.external_id {
            Some(id) if !id.trim().is_empty() => IdentityKey(id.trim().to_string()),
            _ => IdentityKey(self.name.trim().to_lowercase()),
        }
    }

    /// Layer `newer`'s non-empty fields over this record. A later strategy's
    /// non-empty value replaces ours even when ours is non-empty; an empty
    /// value never clobbers a filled one.
    pub fn merge_from(&mut self, newer: &SchemeRecord) {
        fn take(dst: &mut String, src: &str) {
            if !src.trim().is_empty() {
                *dst = src.to_string();
            }
        }
        if let Some(id) = &newer.external_id {
            if !id.trim().is_empty() {
                self.external_id = Some(id.clone());
            }
        }
        take(&mut self.name, &newer.name);
        take(&mut self.description, &newer.description);
        take(&mut self.ministry, &newer.ministry);
        take(&mut self.department, &newer.department);
        take(&mut self.category, &newer.category);
        take(&mut self.sub_category, &newer.sub_category);
        take(&mut self.target_audience, &newer.target_audience);
        take(&mut self.region_scope, &newer.region_scope);
        take(&mut self.source_label, &newer.source_label);
        take(&mut self.source_url, &newer.source_url);
        if newer.level != SchemeLevel::Unknown {
            self.level = newer.level;
        }
        if newer.launch_date.is_some() {
            self.launch_date = newer.launch_date;
        }
        self.extracted_at = newer.extracted_at;
    }
}

/// Derived identity of a scheme within a run and against the store.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct IdentityKey(pub String);

impl IdentityKey {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for IdentityKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// A structured response body observed by the transport session.
///
/// Owned by the strategy runner for the duration of one run and discarded
/// after normalization.
#[derive(Debug, Clone)]
pub struct RawCapture {
    pub source_url: String,
    pub payload: serde_json::Value,
    pub captured_at: DateTime<Utc>,
}

impl RawCapture {
    pub fn new(source_url: impl Into<String>, payload: serde_json::Value) -> Self {
        Self {
            source_url: source_url.into(),
            payload,
            captured_at: Utc::now(),
        }
    }
}

/// Row shape owned by the store: canonical fields plus storage metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersistedScheme {
    pub record: SchemeRecord,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Soft-delete flag. This pipeline never hard-deletes; deactivation is
    /// driven by collaborators outside this core.
    pub is_active: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identity_prefers_external_id() {
        let mut record = SchemeRecord::named("  PM Awas Yojana ");
        assert_eq!(record.identity_key().as_str(), "pm awas yojana");

        record.external_id = Some("S-042".to_string());
        assert_eq!(record.identity_key().as_str(), "S-042");
    }

    #[test]
    fn blank_external_id_falls_back_to_name() {
        let mut record = SchemeRecord::named("Kisan Credit");
        record.external_id = Some("   ".to_string());
        assert_eq!(record.identity_key().as_str(), "kisan credit");
    }

    #[test]
    fn merge_keeps_existing_when_newer_is_empty() {
        let mut base = SchemeRecord::named("Test Yojana");
        base.ministry = "M1".to_string();

        let mut newer = SchemeRecord::named("Test Yojana");
        newer.ministry = String::new();
        newer.category = "Agriculture".to_string();

        base.merge_from(&newer);
        assert_eq!(base.ministry, "M1");
        assert_eq!(base.category, "Agriculture");
    }

    #[test]
    fn merge_lets_later_non_empty_win() {
        let mut base = SchemeRecord::named("Test Yojana");
        base.ministry = "Old Ministry".to_string();

        let mut newer = SchemeRecord::named("Test Yojana");
        newer.ministry = "New Ministry".to_string();

        base.merge_from(&newer);
        assert_eq!(base.ministry, "New Ministry");
    }

    #[test]
    fn level_parsing_is_lenient() {
        assert_eq!(SchemeLevel::parse("Central"), SchemeLevel::Central);
        assert_eq!(SchemeLevel::parse(" state "), SchemeLevel::State);
        assert_eq!(SchemeLevel::parse("district"), SchemeLevel::Unknown);
    }
}
