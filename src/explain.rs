//! Explanation builder: assembles the auditable Decision Record from the
//! component outputs. Pure: it never recomputes a score, only aggregates
//! and orders what the matcher, detectors, retriever, blender and tiering
//! already produced.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::category::Category;
use crate::degrade::Mode;
use crate::matcher::RuleHit;
use crate::neighbor::{Neighbor, NeighborEvidence};
use crate::signals::{SignalHit, SignalKind};
use crate::tiering::{Tier, TierDecision};

pub const SCHEMA_VERSION: &str = "risk.decision.v1";

static DECISION_SEQ: AtomicU64 = AtomicU64::new(1);

/// Monotonically increasing, process-local decision id for audit
/// correlation.
pub fn next_decision_id() -> u64 {
    DECISION_SEQ.fetch_add(1, Ordering::Relaxed)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TriggeredRule {
    pub id: String,
    pub category: Category,
    pub matched: String,
    pub occurrences: usize,
    pub contribution: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegexSignal {
    pub detector: SignalKind,
    pub matched: String,
    pub span: [usize; 2],
    pub weight: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LikelyReason {
    pub category: Category,
    pub label: String,
    pub score: f32,
}

/// The complete, serializable decision. Owned by the caller; the engine
/// keeps no record state after returning it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionRecord {
    pub schema_version: String,
    pub decision_id: u64,
    pub ts: DateTime<Utc>,
    /// Short hash of the raw input; the record never carries the text itself.
    pub input_ref: String,
    pub scores: BTreeMap<Category, f32>,
    pub tier: Tier,
    pub flag: bool,
    pub hitl: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_category: Option<Category>,
    /// Ordered by contribution magnitude descending.
    pub triggered_rules: Vec<TriggeredRule>,
    pub matched_phrases: Vec<String>,
    pub regex_hits: Vec<RegexSignal>,
    /// Ordered by similarity descending; empty when unavailable.
    pub neighbors: Vec<Neighbor>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub neighbor_confidence: Option<f32>,
    /// Top contributing categories, descending (at most 3).
    pub likely_reasons: Vec<LikelyReason>,
    pub mode: Mode,
    pub reasons: Vec<String>,
}

/// Everything the builder aggregates; all of it was computed upstream.
pub struct DecisionParts<'a> {
    pub input_ref: String,
    pub blended: BTreeMap<Category, f32>,
    pub verdict: TierDecision,
    pub rule_hits: &'a [RuleHit],
    pub signal_hits: &'a [SignalHit],
    pub evidence: Option<&'a NeighborEvidence>,
    pub mode: Mode,
    /// Extra notes from orchestration (timeout fallback, forced mode, ...).
    pub notes: Vec<String>,
}

pub fn build(parts: DecisionParts<'_>, decision_id: u64, ts: DateTime<Utc>) -> DecisionRecord {
    let triggered_rules: Vec<TriggeredRule> = parts
        .rule_hits
        .iter()
        .map(|h| TriggeredRule {
            id: h.rule_id.clone(),
            category: h.category,
            matched: h.matched.clone(),
            occurrences: h.occurrences,
            contribution: h.contribution,
        })
        .collect();

    let matched_phrases = triggered_rules.iter().map(|t| t.matched.clone()).collect();

    let regex_hits = parts
        .signal_hits
        .iter()
        .map(|h| RegexSignal {
            detector: h.kind,
            matched: h.matched.clone(),
            span: [h.span.0, h.span.1],
            weight: h.weight,
        })
        .collect();

    let mut likely: Vec<LikelyReason> = parts
        .blended
        .iter()
        .filter(|(_, &s)| s > 0.0)
        .map(|(&category, &score)| LikelyReason {
            category,
            label: category.label().to_string(),
            score,
        })
        .collect();
    likely.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(a.category.cmp(&b.category))
    });
    likely.truncate(3);

    let mut reasons = parts.notes;
    if parts.verdict.top_category.is_none() {
        reasons.push("no signal detected".to_string());
    } else if parts.verdict.hitl {
        if let Some(cat) = parts.verdict.top_category {
            reasons.push(format!(
                "routed to human review: {} is low-confidence without corroborating evidence",
                cat.label()
            ));
        }
    }
    for t in triggered_rules.iter().take(3) {
        reasons.push(format!(
            "rule {} matched \"{}\" ({}x, {:+.2})",
            t.id, t.matched, t.occurrences, t.contribution
        ));
    }
    for h in parts.signal_hits.iter().take(3) {
        reasons.push(format!(
            "detector {:?} matched \"{}\" (+{:.2})",
            h.kind, h.matched, h.weight
        ));
    }

    DecisionRecord {
        schema_version: SCHEMA_VERSION.to_string(),
        decision_id,
        ts,
        input_ref: parts.input_ref,
        scores: parts.blended,
        tier: parts.verdict.tier,
        flag: parts.verdict.flag,
        hitl: parts.verdict.hitl,
        top_category: parts.verdict.top_category,
        triggered_rules,
        matched_phrases,
        regex_hits,
        neighbors: parts
            .evidence
            .map(|e| e.neighbors.clone())
            .unwrap_or_default(),
        neighbor_confidence: parts.evidence.map(|e| e.confidence),
        likely_reasons: likely,
        mode: parts.mode,
        reasons,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tiering::TierDecision;
    use chrono::TimeZone;

    fn empty_parts() -> DecisionParts<'static> {
        DecisionParts {
            input_ref: "abc123".into(),
            blended: BTreeMap::new(),
            verdict: TierDecision {
                tier: Tier::Low,
                flag: false,
                hitl: false,
                top_category: None,
                top_score: 0.0,
            },
            rule_hits: &[],
            signal_hits: &[],
            evidence: None,
            mode: Mode::Minimal,
            notes: Vec::new(),
        }
    }

    #[test]
    fn no_signal_record_serializes_with_expected_shape() {
        let ts = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
        let rec = build(empty_parts(), 42, ts);
        let v = serde_json::to_value(&rec).unwrap();

        assert_eq!(v["schema_version"], serde_json::json!(SCHEMA_VERSION));
        assert_eq!(v["decision_id"], serde_json::json!(42));
        assert_eq!(v["tier"], serde_json::json!("LOW"));
        assert_eq!(v["flag"], serde_json::json!(false));
        assert_eq!(v["mode"], serde_json::json!("minimal"));
        assert!(v["neighbors"].as_array().unwrap().is_empty());
        let reasons = v["reasons"].as_array().unwrap();
        assert!(reasons
            .iter()
            .any(|r| r.as_str().unwrap().contains("no signal")));
    }

    #[test]
    fn builder_is_deterministic_for_fixed_id_and_ts() {
        let ts = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
        let a = serde_json::to_string(&build(empty_parts(), 7, ts)).unwrap();
        let b = serde_json::to_string(&build(empty_parts(), 7, ts)).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn decision_ids_increase_monotonically() {
        let a = next_decision_id();
        let b = next_decision_id();
        assert!(b > a);
    }
}
