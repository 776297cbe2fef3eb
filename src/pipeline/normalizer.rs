//! Capture normalization: heterogeneous payload shapes → canonical records
//!
//! The source emits record collections under at least six different nesting
//! patterns depending on which endpoint answered. Normalization tries a
//! fixed list of known paths in priority order; the first one yielding a
//! non-empty collection wins for that capture. Field values are resolved
//! through prioritized alias lists, looked up both on the element itself and
//! on its `fields` sub-object.
//!
//! Pure function over its input: no side effects beyond the returned batch.

use chrono::NaiveDate;
use serde_json::Value;
use tracing::debug;

use crate::domain::scheme::{RawCapture, SchemeLevel, SchemeRecord};

/// Known locations of the record-bearing collection, in priority order.
/// The empty path means "the payload root is itself the array".
const COLLECTION_PATHS: &[&str] = &[
    "data.hits.items",
    "data.results",
    "results",
    "",
    "data",
    "schemes",
    "hits",
    "items",
    // Server-rendered state blobs nest one level deeper.
    "props.pageProps.schemes",
    "props.pageProps.data.hits.items",
];

const EXTERNAL_ID_ALIASES: &[&str] = &["id", "schemeId", "scheme_id", "slug"];
const NAME_ALIASES: &[&str] = &["schemeName", "schemeShortTitle", "name", "title"];
const DESCRIPTION_ALIASES: &[&str] =
    &["briefDescription", "description", "detailedDescription", "schemeDescription"];
const MINISTRY_ALIASES: &[&str] = &["nodalMinistryName", "ministry", "ministryName"];
const DEPARTMENT_ALIASES: &[&str] = &["nodalDepartmentName", "department", "departmentName"];
const CATEGORY_ALIASES: &[&str] = &["schemeCategory", "category"];
const SUB_CATEGORY_ALIASES: &[&str] = &["schemeSubCategory", "subCategory"];
const AUDIENCE_ALIASES: &[&str] = &["targetBeneficiaries", "targetAudience", "beneficiaries"];
const LEVEL_ALIASES: &[&str] = &["level", "schemeLevel"];
const REGION_ALIASES: &[&str] = &["beneficiaryState", "states", "state"];
const LAUNCH_DATE_ALIASES: &[&str] = &["launchDate", "startDate"];

/// Separator for array-valued source fields.
const JOIN_SEPARATOR: &str = ", ";

/// Outcome of normalizing one capture.
#[derive(Debug, Default)]
pub struct NormalizedBatch {
    pub records: Vec<SchemeRecord>,
    /// Elements seen in the winning collection, before name filtering.
    pub discovered: u64,
    /// Elements dropped because no name alias resolved.
    pub skipped_no_name: u64,
}

/// Normalize one capture into zero or more canonical records.
///
/// `source_label` names the strategy that produced the capture; it is
/// stamped on every record for provenance.
pub fn normalize_capture(capture: &RawCapture, source_label: &str) -> NormalizedBatch {
    let Some(collection) = locate_collection(&capture.payload) else {
        // Detail endpoints answer with one object instead of a collection.
        // Accept it only when it actually resolves to a named record, so
        // status envelopes and empty pages still count as zero yield.
        let mut batch = NormalizedBatch::default();
        for scope in [capture.payload.get("data"), Some(&capture.payload)] {
            let Some(candidate) = scope.filter(|v| v.is_object()) else {
                continue;
            };
            if let Some(record) = normalize_element(candidate, source_label, &capture.source_url) {
                batch.discovered = 1;
                batch.records.push(record);
                return batch;
            }
        }
        debug!("No record collection found in capture from {}", capture.source_url);
        return batch;
    };

    let mut batch = NormalizedBatch::default();
    for element in collection {
        batch.discovered += 1;
        match normalize_element(element, source_label, &capture.source_url) {
            Some(record) => batch.records.push(record),
            None => batch.skipped_no_name += 1,
        }
    }
    if batch.skipped_no_name > 0 {
        debug!(
            "Skipped {} element(s) with no resolvable name from {}",
            batch.skipped_no_name, capture.source_url
        );
    }
    batch
}

/// Find the first known path holding a non-empty array. Later paths are not
/// tried once one matches.
fn locate_collection(payload: &Value) -> Option<&Vec<Value>> {
    for path in COLLECTION_PATHS {
        let candidate = walk_path(payload, path);
        if let Some(Value::Array(items)) = candidate {
            if !items.is_empty() {
                return Some(items);
            }
        }
    }
    None
}

fn walk_path<'a>(payload: &'a Value, path: &str) -> Option<&'a Value> {
    if path.is_empty() {
        return Some(payload);
    }
    path.split('.').try_fold(payload, |value, segment| value.get(segment))
}

fn normalize_element(element: &Value, source_label: &str, source_url: &str) -> Option<SchemeRecord> {
    let name = resolve_string(element, NAME_ALIASES)?;

    let mut record = SchemeRecord::named(name);
    record.external_id = resolve_string(element, EXTERNAL_ID_ALIASES);
    record.description = resolve_string(element, DESCRIPTION_ALIASES).unwrap_or_default();
    record.ministry = resolve_string(element, MINISTRY_ALIASES).unwrap_or_default();
    record.department = resolve_string(element, DEPARTMENT_ALIASES).unwrap_or_default();
    record.category = resolve_string(element, CATEGORY_ALIASES).unwrap_or_default();
    record.sub_category = resolve_string(element, SUB_CATEGORY_ALIASES).unwrap_or_default();
    record.target_audience = resolve_string(element, AUDIENCE_ALIASES).unwrap_or_default();
    record.region_scope = resolve_string(element, REGION_ALIASES).unwrap_or_default();
    record.level = resolve_string(element, LEVEL_ALIASES)
        .map(|raw| SchemeLevel::parse(&raw))
        .unwrap_or_default();
    record.launch_date = resolve_string(element, LAUNCH_DATE_ALIASES)
        .and_then(|raw| parse_launch_date(&raw));
    record.source_label = source_label.to_string();
    record.source_url = source_url.to_string();
    Some(record)
}

/// Resolve a field through its alias list, checking the element itself first
/// and then its `fields` sub-object. Returns a trimmed, non-empty string.
fn resolve_string(element: &Value, aliases: &[&str]) -> Option<String> {
    for scope in [Some(element), element.get("fields")].into_iter().flatten() {
        for alias in aliases {
            if let Some(text) = scope.get(alias).and_then(render_value) {
                return Some(text);
            }
        }
    }
    None
}

/// Render one JSON value as display text: strings pass through, numbers are
/// stringified (ids arrive as both), arrays join with `", "` preserving
/// source order, objects yield their `label`/`value` field.
fn render_value(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => {
            let trimmed = s.trim();
            (!trimmed.is_empty()).then(|| trimmed.to_string())
        }
        Value::Number(n) => Some(n.to_string()),
        Value::Array(items) => {
            let parts: Vec<String> = items.iter().filter_map(render_value).collect();
            (!parts.is_empty()).then(|| parts.join(JOIN_SEPARATOR))
        }
        Value::Object(map) => map
            .get("label")
            .or_else(|| map.get("value"))
            .and_then(render_value),
        _ => None,
    }
}

fn parse_launch_date(raw: &str) -> Option<NaiveDate> {
    let head = raw.get(..10).unwrap_or(raw);
    NaiveDate::parse_from_str(head, "%Y-%m-%d")
        .or_else(|_| NaiveDate::parse_from_str(raw, "%d-%m-%Y"))
        .or_else(|_| NaiveDate::parse_from_str(raw, "%d/%m/%Y"))
        .ok()
}
