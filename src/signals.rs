//! Structured-signal detectors: URL, e-mail, phone number, ID-like digit
//! runs. These run over normalized text independently of category lexicons.
//!
//! Every hit scores for Privacy/PII; URL hits additionally score for
//! Promotion only when the deployment enables it (double classification is a
//! policy choice, not automatic). Hits are deduplicated by span: a later
//! detector never re-counts a span an earlier detector already claimed, and
//! hits fully contained in an earlier hit (a phone number inside a URL) are
//! dropped.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::category::Category;
use crate::config::SignalWeights;

static URL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\b(?:https?://|www\.)[^\s<>()]+").expect("url regex"));
static EMAIL_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b[a-z0-9._%+-]+@[a-z0-9.-]+\.[a-z]{2,}\b").expect("email regex")
});
// Grouped like a phone number: optional country code, then 3+3+2..4 digits
// with at most one separator between groups. Loose digit runs ("2019 2020
// 2021", "10 000 000") do not fit the group structure and stay unmatched.
static PHONE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?:\+|\b)\d{0,3}[\s.\-]?\(?\d{3}\)?[\s.\-]?\d{3}[\s.\-]?\d{2,4}\b")
        .expect("phone regex")
});
static ID_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\b\d{9,18}\b").expect("id regex"));

/// Fixed detector order; earlier detectors win span conflicts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignalKind {
    Url,
    Email,
    Phone,
    IdNumber,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SignalHit {
    pub kind: SignalKind,
    pub matched: String,
    pub span: (usize, usize),
    pub weight: f32,
    /// Categories this hit was credited to.
    pub categories: Vec<Category>,
}

#[derive(Debug, Default)]
pub struct SignalOutcome {
    pub scores: BTreeMap<Category, f32>,
    pub hits: Vec<SignalHit>,
}

pub fn detect(
    folded: &str,
    weights: &SignalWeights,
    url_counts_for_promotion: bool,
) -> SignalOutcome {
    let mut out = SignalOutcome::default();
    if folded.is_empty() {
        return out;
    }

    let detectors: [(SignalKind, &Regex, f32); 4] = [
        (SignalKind::Url, &URL_RE, weights.url),
        (SignalKind::Email, &EMAIL_RE, weights.email),
        (SignalKind::Phone, &PHONE_RE, weights.phone),
        (SignalKind::IdNumber, &ID_RE, weights.id_number),
    ];

    let mut claimed: Vec<(usize, usize)> = Vec::new();
    for (kind, re, weight) in detectors {
        for m in re.find_iter(folded) {
            let span = (m.start(), m.end());
            if claimed
                .iter()
                .any(|&(s, e)| span.0 >= s && span.1 <= e)
            {
                continue; // same or contained span already credited
            }
            claimed.push(span);

            let mut categories = vec![Category::Privacy];
            if kind == SignalKind::Url && url_counts_for_promotion {
                categories.push(Category::Promotion);
            }
            for &c in &categories {
                *out.scores.entry(c).or_insert(0.0) += weight;
            }
            out.hits.push(SignalHit {
                kind,
                matched: m.as_str().to_string(),
                span,
                weight,
                categories,
            });
        }
    }

    out.hits.sort_by(|a, b| {
        b.weight
            .partial_cmp(&a.weight)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(a.span.0.cmp(&b.span.0))
    });
    out
}
