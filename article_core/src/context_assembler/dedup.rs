//! Passage ranking, near-duplicate removal and token budgeting.

use std::cmp::Ordering;
use std::collections::HashSet;

use crate::collaborators::RetrievedPassage;

/// Result of filtering retrieved passages down to what fits in a prompt.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PassageSelection {
    /// Kept passages, most preferred first.
    pub kept: Vec<RetrievedPassage>,

    /// Passages dropped as near-duplicates of a preferred one.
    pub duplicates: usize,

    /// Passages that did not fit the remaining budget.
    pub over_budget: usize,

    /// Estimated tokens used by the kept passages.
    pub tokens: usize,
}

/// Rough token estimate: about three words per four tokens.
pub fn estimate_tokens(text: &str) -> usize {
    let words = text.split_whitespace().count();
    (words * 4).div_ceil(3)
}

/// Word-set Jaccard similarity between two texts, case-insensitive.
pub fn similarity(a: &str, b: &str) -> f32 {
    let left = word_set(a);
    let right = word_set(b);
    if left.is_empty() && right.is_empty() {
        return 1.0;
    }
    let shared = left.intersection(&right).count();
    let total = left.union(&right).count();
    shared as f32 / total as f32
}

/// Rank, deduplicate and budget passages.
///
/// Ranking is by score, then recency (undated passages last). A passage whose
/// similarity to an already kept one exceeds `threshold` is dropped. The budget is
/// filled greedily in rank order; a passage that does not fit is skipped and later,
/// smaller ones may still be kept.
pub fn select_passages(
    mut passages: Vec<RetrievedPassage>,
    threshold: f32,
    budget: usize,
) -> PassageSelection {
    passages.retain(|p| !p.text.trim().is_empty());
    passages.sort_by(compare_preference);

    let mut selection = PassageSelection::default();
    let mut unique: Vec<RetrievedPassage> = Vec::new();
    for passage in passages {
        let duplicate = unique
            .iter()
            .any(|kept| similarity(&kept.text, &passage.text) > threshold);
        if duplicate {
            selection.duplicates += 1;
        } else {
            unique.push(passage);
        }
    }

    for passage in unique {
        let cost = estimate_tokens(&passage.text);
        if selection.tokens + cost > budget {
            selection.over_budget += 1;
            continue;
        }
        selection.tokens += cost;
        selection.kept.push(passage);
    }

    selection
}

fn compare_preference(a: &RetrievedPassage, b: &RetrievedPassage) -> Ordering {
    a.cmp_relevance(b)
        .then_with(|| b.published_at.cmp(&a.published_at))
}

fn word_set(text: &str) -> HashSet<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(|w| w.to_lowercase())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn passage(text: &str, score: f32) -> RetrievedPassage {
        RetrievedPassage::new(text, "https://news.example.org", score)
    }

    #[test]
    fn test_similarity() {
        assert_eq!(similarity("The quick fox", "the QUICK fox!"), 1.0);
        assert_eq!(similarity("alpha beta", "gamma delta"), 0.0);
        let partial = similarity("a b c d", "a b c e");
        assert!((partial - 0.6).abs() < 1e-6);
    }

    #[test]
    fn test_estimate_tokens() {
        assert_eq!(estimate_tokens(""), 0);
        assert_eq!(estimate_tokens("one two three"), 4);
    }

    #[test]
    fn test_near_duplicates_keep_higher_score() {
        let selection = select_passages(
            vec![
                passage("NFL week one odds boosts are live today", 0.4),
                passage("NFL week one odds boosts are live today!", 0.9),
                passage("Completely different passage about the NBA draft", 0.5),
            ],
            0.85,
            1500,
        );

        assert_eq!(selection.duplicates, 1);
        assert_eq!(selection.kept.len(), 2);
        assert_eq!(selection.kept[0].score, 0.9);
    }

    #[test]
    fn test_recency_breaks_score_ties() {
        let older = passage("older story about parlays", 0.5)
            .with_published_at(Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap());
        let newer = passage("newer story about same game parlays", 0.5)
            .with_published_at(Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap());
        let undated = passage("undated story on teasers", 0.5);

        let selection = select_passages(vec![undated, older, newer], 0.85, 1500);
        let texts: Vec<_> = selection.kept.iter().map(|p| p.text.as_str()).collect();
        assert_eq!(
            texts,
            vec![
                "newer story about same game parlays",
                "older story about parlays",
                "undated story on teasers",
            ]
        );
    }

    #[test]
    fn test_dated_passage_wins_tie_against_undated() {
        let undated = passage("undated preview of the weekend slate", 0.7);
        let dated = passage("dated recap of thursday night football", 0.7)
            .with_published_at(Utc.with_ymd_and_hms(2024, 9, 6, 0, 0, 0).unwrap());

        let selection = select_passages(vec![undated, dated], 0.85, 1500);
        assert_eq!(selection.kept[0].text, "dated recap of thursday night football");
        assert_eq!(selection.kept[1].text, "undated preview of the weekend slate");
    }

    #[test]
    fn test_nan_score_ranks_last() {
        let selection = select_passages(
            vec![
                passage("low relevance notes on college lines", 0.1),
                passage("broken score on player props", f32::NAN),
                passage("high relevance guide to welcome bonuses", 0.9),
            ],
            0.85,
            estimate_tokens("high relevance guide to welcome bonuses"),
        );

        assert_eq!(selection.kept.len(), 1);
        assert_eq!(selection.kept[0].text, "high relevance guide to welcome bonuses");
        assert_eq!(selection.over_budget, 2);
    }

    #[test]
    fn test_non_finite_scores_keep_a_total_order() {
        let passages: Vec<RetrievedPassage> = (0..64)
            .map(|i| {
                let score = match i % 4 {
                    0 => f32::NAN,
                    1 => f32::INFINITY,
                    2 => f32::NEG_INFINITY,
                    _ => i as f32 / 64.0,
                };
                passage(&format!("passage number {} about market {}", i, i * 7), score)
            })
            .collect();

        let selection = select_passages(passages, 1.0, usize::MAX);
        assert_eq!(selection.kept.len(), 64);

        let ranks: Vec<f32> = selection.kept.iter().map(RetrievedPassage::ranking_score).collect();
        assert!(ranks.windows(2).all(|pair| pair[0] >= pair[1]));
        assert_eq!(selection.kept[0].score, f32::INFINITY);
        assert!(selection.kept[63].score.is_nan() || selection.kept[63].score == f32::NEG_INFINITY);
    }

    #[test]
    fn test_budget_skips_large_but_keeps_smaller() {
        let large = "word ".repeat(30);
        let selection = select_passages(
            vec![
                passage("short top passage", 0.9),
                passage(&large, 0.8),
                passage("tiny tail", 0.1),
            ],
            0.85,
            10,
        );

        let texts: Vec<_> = selection.kept.iter().map(|p| p.text.as_str()).collect();
        assert_eq!(texts, vec!["short top passage", "tiny tail"]);
        assert_eq!(selection.over_budget, 1);
        assert!(selection.tokens <= 10);
    }
}
