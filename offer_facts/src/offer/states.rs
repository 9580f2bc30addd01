//! Eligible-state extraction.

use regex::Regex;
use std::sync::LazyLock;

const STATE_CODES: &[&str] = &[
    "AL", "AK", "AZ", "AR", "CA", "CO", "CT", "DE", "DC", "FL", "GA", "HI", "ID", "IL", "IN",
    "IA", "KS", "KY", "LA", "ME", "MD", "MA", "MI", "MN", "MS", "MO", "MT", "NE", "NV", "NH",
    "NJ", "NM", "NY", "NC", "ND", "OH", "OK", "OR", "PA", "RI", "SC", "SD", "TN", "TX", "UT",
    "VT", "VA", "WA", "WV", "WI", "WY", "ON", "PR",
];

/// Sorted longest first so "west virginia" wins over "virginia" in ordering.
const STATE_NAMES: &[(&str, &str)] = &[
    ("district of columbia", "DC"),
    ("washington d c", "DC"),
    ("north carolina", "NC"),
    ("south carolina", "SC"),
    ("new hampshire", "NH"),
    ("massachusetts", "MA"),
    ("pennsylvania", "PA"),
    ("rhode island", "RI"),
    ("west virginia", "WV"),
    ("north dakota", "ND"),
    ("south dakota", "SD"),
    ("connecticut", "CT"),
    ("puerto rico", "PR"),
    ("mississippi", "MS"),
    ("washington dc", "DC"),
    ("california", "CA"),
    ("new jersey", "NJ"),
    ("new mexico", "NM"),
    ("washington", "WA"),
    ("louisiana", "LA"),
    ("minnesota", "MN"),
    ("tennessee", "TN"),
    ("wisconsin", "WI"),
    ("new york", "NY"),
    ("oklahoma", "OK"),
    ("colorado", "CO"),
    ("delaware", "DE"),
    ("illinois", "IL"),
    ("kentucky", "KY"),
    ("maryland", "MD"),
    ("michigan", "MI"),
    ("missouri", "MO"),
    ("nebraska", "NE"),
    ("virginia", "VA"),
    ("arkansas", "AR"),
    ("alabama", "AL"),
    ("arizona", "AZ"),
    ("florida", "FL"),
    ("georgia", "GA"),
    ("indiana", "IN"),
    ("montana", "MT"),
    ("ontario", "ON"),
    ("vermont", "VT"),
    ("wyoming", "WY"),
    ("alaska", "AK"),
    ("hawaii", "HI"),
    ("kansas", "KS"),
    ("nevada", "NV"),
    ("oregon", "OR"),
    ("idaho", "ID"),
    ("maine", "ME"),
    ("texas", "TX"),
    ("iowa", "IA"),
    ("ohio", "OH"),
    ("utah", "UT"),
    ("d c", "DC"),
    ("dc", "DC"),
];

static STATE_CODE_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(r"\b({})\b", STATE_CODES.join("|"))).expect("valid state code regex")
});

static NON_WORD: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^\w\s]").expect("valid punctuation regex"));

static AVAILABLE_IN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\bavailable in\b").expect("valid availability regex"));

static ELIGIBILITY_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"(?i)\bin the following states:\s*(.+?)(?:\.|;|$)",
        r"(?i)\bavailable in\s+(.+?)(?:\bonly\b|\.|;|$)",
        r"(?i)\bnew (?:customers|players|users) in\s+(.+?)(?:\bonly\b|\.|;|$)",
        r"(?i)\bphysically present in\s+(.+?)(?:\bin order to wager\b|\.|;|$)",
    ]
    .iter()
    .map(|p| Regex::new(p).expect("valid eligibility regex"))
    .collect()
});

const POSITIVE_CUES: &[&str] = &[
    "in the following states:",
    "new customers in",
    "new players in",
    "new users in",
    "physically present in",
];

/// Extract the list of eligible state codes from terms text.
///
/// Returns an empty list when no reliable eligibility statement is found. Negative
/// statements ("not available in ...") never produce states.
pub fn extract_states(terms: &str) -> Vec<String> {
    if terms.trim().is_empty() {
        return Vec::new();
    }

    for pattern in ELIGIBILITY_PATTERNS.iter() {
        for caps in pattern.captures_iter(terms) {
            let (Some(whole), Some(fragment)) = (caps.get(0), caps.get(1)) else {
                continue;
            };
            if is_negated(terms, whole.start()) {
                continue;
            }
            let codes = state_codes_in(fragment.as_str());
            if !codes.is_empty() {
                return codes;
            }
        }
    }

    let lower = terms.to_lowercase();
    let positive_available = AVAILABLE_IN
        .find_iter(terms)
        .any(|m| !is_negated(terms, m.start()));
    if positive_available || POSITIVE_CUES.iter().any(|cue| lower.contains(cue)) {
        return state_codes_in(terms);
    }
    Vec::new()
}

/// Normalise a `states` field (list or delimited string) into state codes.
///
/// "ALL" or "nationwide" anywhere collapses the result to `["ALL"]`.
pub fn parse_states(value: &serde_json::Value) -> Vec<String> {
    let raw_values: Vec<String> = match value {
        serde_json::Value::Null => return Vec::new(),
        serde_json::Value::Array(items) => items
            .iter()
            .map(|item| match item {
                serde_json::Value::String(s) => s.trim().to_string(),
                other => other.to_string(),
            })
            .filter(|s| !s.is_empty())
            .collect(),
        serde_json::Value::String(s) => s
            .split([',', '|', '/', ';'])
            .map(|part| part.trim().to_string())
            .filter(|part| !part.is_empty())
            .collect(),
        other => vec![other.to_string()],
    };

    let mut codes = Vec::new();
    for raw in &raw_values {
        let upper = raw.to_uppercase();
        if upper == "ALL" || upper == "NATIONWIDE" {
            return vec!["ALL".to_string()];
        }
        if STATE_CODES.contains(&upper.as_str()) {
            codes.push(upper);
        } else {
            codes.extend(state_codes_in(raw));
        }
    }
    dedupe_preserving_order(codes)
}

/// Collect state codes and full state names mentioned in a fragment.
fn state_codes_in(fragment: &str) -> Vec<String> {
    let mut found: Vec<String> = STATE_CODE_PATTERN
        .captures_iter(fragment)
        .filter_map(|caps| caps.get(1).map(|m| m.as_str().to_string()))
        .collect();

    let normalized = NON_WORD.replace_all(&fragment.to_lowercase(), " ").to_string();
    let padded = format!(" {} ", normalized.split_whitespace().collect::<Vec<_>>().join(" "));
    for (name, code) in STATE_NAMES {
        if padded.contains(&format!(" {} ", name)) {
            found.push(code.to_string());
        }
    }

    dedupe_preserving_order(found)
}

/// Check whether the text right before `start` negates the statement.
fn is_negated(text: &str, start: usize) -> bool {
    let prefix: String = text[..start]
        .chars()
        .rev()
        .take(12)
        .collect::<Vec<_>>()
        .into_iter()
        .rev()
        .collect();
    prefix.to_lowercase().contains("not ")
}

fn dedupe_preserving_order(values: Vec<String>) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    values
        .into_iter()
        .filter(|v| !v.is_empty() && seen.insert(v.clone()))
        .collect()
}
