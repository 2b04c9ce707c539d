//! Lexicon/rule matcher: scores normalized text against every rule of every
//! category.
//!
//! Matching policy:
//! - phrase/keyword matches are word-boundary-aware (compiled into the rule
//!   regex at load time); occurrences are non-overlapping.
//! - each rule contributes `weight * occurrences`, with occurrences capped
//!   by `occurrence_cap` to blunt repetition abuse.
//! - triggered rules are reported ordered by |contribution| descending, then
//!   by first-occurrence position, then by rule id for a total order.

use std::collections::BTreeMap;

use crate::category::Category;
use crate::normalize::NormalizedText;
use crate::rules::RuleSet;

/// One triggered rule with its accounted contribution.
#[derive(Debug, Clone, PartialEq)]
pub struct RuleHit {
    pub rule_id: String,
    pub category: Category,
    /// Text of the first occurrence as it appears in the normalized input.
    pub matched: String,
    /// Occurrences counted toward the score (already capped).
    pub occurrences: usize,
    /// Occurrences found before capping.
    pub occurrences_found: usize,
    pub contribution: f32,
    /// Byte offset of the first occurrence.
    pub first_pos: usize,
}

/// Raw per-category rule scores plus the ordered trigger list.
#[derive(Debug, Default)]
pub struct MatchOutcome {
    pub scores: BTreeMap<Category, f32>,
    pub hits: Vec<RuleHit>,
}

pub fn match_rules(set: &RuleSet, text: &NormalizedText, occurrence_cap: usize) -> MatchOutcome {
    let mut out = MatchOutcome::default();
    if text.is_empty() {
        return out;
    }

    for rule in set.all() {
        let haystack = if rule.case_sensitive {
            text.cased.as_str()
        } else {
            text.folded.as_str()
        };

        let mut occurrences_found = 0usize;
        let mut first: Option<(usize, String)> = None;
        for m in rule.re.find_iter(haystack) {
            if m.as_str().is_empty() {
                continue; // degenerate regex; never count empty matches
            }
            occurrences_found += 1;
            if first.is_none() {
                first = Some((m.start(), m.as_str().to_string()));
            }
        }

        let Some((first_pos, matched)) = first else {
            continue;
        };

        let occurrences = occurrences_found.min(occurrence_cap);
        let contribution = rule.weight * occurrences as f32;

        *out.scores.entry(rule.category).or_insert(0.0) += contribution;
        out.hits.push(RuleHit {
            rule_id: rule.id.clone(),
            category: rule.category,
            matched,
            occurrences,
            occurrences_found,
            contribution,
            first_pos,
        });
    }

    out.hits.sort_by(|a, b| {
        b.contribution
            .abs()
            .partial_cmp(&a.contribution.abs())
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(a.first_pos.cmp(&b.first_pos))
            .then(a.rule_id.cmp(&b.rule_id))
    });
    out
}
