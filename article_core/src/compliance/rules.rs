//! Compliance rule set, loadable from configuration.

use serde::{Deserialize, Serialize};

/// A phrase that must not appear in article copy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BannedPhrase {
    /// Case-insensitive regular expression.
    pub pattern: String,
    pub message: String,
    /// A match immediately followed by this text is allowed.
    #[serde(default)]
    pub allowed_before: Option<String>,
}

impl BannedPhrase {
    fn new(pattern: &str, message: &str) -> Self {
        Self {
            pattern: pattern.to_string(),
            message: message.to_string(),
            allowed_before: None,
        }
    }
}

/// Rules the validator enforces.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ComplianceRules {
    pub banned_phrases: Vec<BannedPhrase>,

    /// Patterns that mark copy as gambling content.
    pub bet_triggers: Vec<String>,

    /// Phrases that satisfy the age/eligibility disclosure requirement.
    pub disclosure_markers: Vec<String>,

    /// Link targets that are placeholders when matched exactly (case-insensitive).
    pub placeholder_targets: Vec<String>,

    /// Link targets containing any of these are placeholders.
    pub placeholder_markers: Vec<String>,

    /// Domains external links may point to. Empty disables the check.
    pub allowed_domains: Vec<String>,

    /// Link anchors shorter than this many words are flagged.
    pub min_anchor_words: usize,

    pub max_paragraph_words: usize,

    /// At most one link per this many words.
    pub words_per_link: usize,
}

impl Default for ComplianceRules {
    fn default() -> Self {
        Self {
            banned_phrases: vec![
                BannedPhrase::new(r"\bsurefire\b", "Avoid 'surefire', it implies guaranteed outcomes"),
                BannedPhrase::new(r"\bguarantee[sd]?\b", "Avoid 'guarantee', no betting outcome is guaranteed"),
                BannedPhrase {
                    allowed_before: Some(" bet credit".to_string()),
                    ..BannedPhrase::new(r"\brisk[-\s]?free\b", "Avoid 'risk-free' unless referring to bet credits")
                },
                BannedPhrase::new(r"\bcan'?t lose\b", "Avoid 'can't lose', it is a misleading claim"),
                BannedPhrase::new(r"\bfree money\b", "Avoid 'free money', it is misleading"),
                BannedPhrase::new(r"\beasy win\b", "Avoid 'easy win', it is a misleading claim"),
                BannedPhrase::new(r"\bno[- ]brainer\b", "Avoid 'no-brainer', it implies certainty"),
            ],
            bet_triggers: [r"\bbet\b", r"\bwager\b", r"\bparlay\b", r"\bgambl", r"\bsportsbook\b"]
                .iter()
                .map(|p| p.to_string())
                .collect(),
            disclosure_markers: ["21+", "18+", "responsible", "gambler", "gambling problem"]
                .iter()
                .map(|m| m.to_string())
                .collect(),
            placeholder_targets: [
                "#", "about:blank", "http://", "https://", "url", "link", "todo", "tbd", "none",
                "null", "undefined",
            ]
            .iter()
            .map(|t| t.to_string())
            .collect(),
            placeholder_markers: ["{{", "}}", "placeholder", "your-link", "insert-link", "xxx"]
                .iter()
                .map(|m| m.to_string())
                .collect(),
            allowed_domains: Vec::new(),
            min_anchor_words: 2,
            max_paragraph_words: 130,
            words_per_link: 120,
        }
    }
}

impl ComplianceRules {
    /// Check whether a link target is empty or a placeholder.
    pub fn is_placeholder_target(&self, target: &str) -> bool {
        let target = target.trim().to_lowercase();
        target.is_empty()
            || target.starts_with("javascript:")
            || self.placeholder_targets.iter().any(|t| t.to_lowercase() == target)
            || self
                .placeholder_markers
                .iter()
                .any(|m| target.contains(&m.to_lowercase()))
    }

    /// Check whether an absolute link points outside the allowed domains.
    pub fn is_external(&self, target: &str) -> bool {
        if self.allowed_domains.is_empty() {
            return false;
        }
        let Some(host) = link_host(target) else {
            return false;
        };
        !self.allowed_domains.iter().any(|domain| {
            let domain = domain.trim().to_lowercase();
            host == domain || host.ends_with(&format!(".{}", domain))
        })
    }
}

/// Host of an absolute http(s) link, lowercased and without `www.`.
fn link_host(target: &str) -> Option<String> {
    let lower = target.trim().to_lowercase();
    let rest = lower
        .strip_prefix("https://")
        .or_else(|| lower.strip_prefix("http://"))?;
    let host = rest.split(['/', '?', '#', ':']).next()?.trim_start_matches("www.");
    (!host.is_empty()).then(|| host.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_placeholder_targets() {
        let rules = ComplianceRules::default();
        for target in ["", "  ", "#", "https://", "javascript:void(0)", "{{offer_url}}", "TODO", "https://placeholder.io/x"] {
            assert!(rules.is_placeholder_target(target), "{:?} should be a placeholder", target);
        }
        for target in ["https://go.example.org/fd", "/sportsbooks/fanduel"] {
            assert!(!rules.is_placeholder_target(target), "{:?} should be real", target);
        }
    }

    #[test]
    fn test_external_domains() {
        let mut rules = ComplianceRules::default();
        assert!(!rules.is_external("https://anywhere.io"));

        rules.allowed_domains = vec!["example.org".to_string()];
        assert!(!rules.is_external("https://www.example.org/page"));
        assert!(!rules.is_external("https://go.example.org/fd"));
        assert!(!rules.is_external("/relative/path"));
        assert!(rules.is_external("https://elsewhere.net/promo"));
    }

    #[test]
    fn test_rules_from_toml_keep_defaults() {
        let rules: ComplianceRules = toml::from_str("min_anchor_words = 3\nallowed_domains = [\"example.org\"]").unwrap();
        assert_eq!(rules.min_anchor_words, 3);
        assert_eq!(rules.max_paragraph_words, 130);
        assert_eq!(rules.banned_phrases.len(), 7);
    }
}
