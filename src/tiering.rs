//! Tier assignment and flag/HITL routing.
//!
//! The maximum blended score across categories maps to a tier via two fixed
//! thresholds (lower edge inclusive: a score equal to `t_low` is MEDIUM, a
//! score equal to `t_high` is HIGH). MEDIUM auto-flags only high-signal
//! categories; everything else routes to human review. A low-confidence
//! category (e.g. Off-topic) on top with no corroborating neighbor evidence
//! routes to HITL regardless of score; ambiguity-by-category overrides pure
//! thresholding. Ties between categories resolve by the fixed priority order
//! in [`Category`].

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::category::Category;
use crate::neighbor::NeighborEvidence;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Tier {
    Low,
    Medium,
    High,
}

#[derive(Debug, Clone, Copy)]
pub struct TierPolicy<'a> {
    pub t_low: f32,
    pub t_high: f32,
    pub high_signal: &'a [Category],
}

#[derive(Debug, Clone, PartialEq)]
pub struct TierDecision {
    pub tier: Tier,
    pub flag: bool,
    /// Routed to human review; no automatic flag decision was made.
    pub hitl: bool,
    pub top_category: Option<Category>,
    pub top_score: f32,
}

pub fn assign(
    blended: &BTreeMap<Category, f32>,
    evidence: Option<&NeighborEvidence>,
    policy: TierPolicy<'_>,
) -> TierDecision {
    // Max score; Category::ALL iteration order gives the priority tie-break
    // (strictly-greater keeps the earlier, higher-priority category).
    let mut top: Option<(Category, f32)> = None;
    for cat in Category::ALL {
        if let Some(&s) = blended.get(&cat) {
            if top.map(|(_, best)| s > best).unwrap_or(true) {
                top = Some((cat, s));
            }
        }
    }

    let Some((top_category, top_score)) = top.filter(|&(_, s)| s > 0.0) else {
        return TierDecision {
            tier: Tier::Low,
            flag: false,
            hitl: false,
            top_category: None,
            top_score: 0.0,
        };
    };

    let high_signal = policy.high_signal.contains(&top_category);
    let corroborated = evidence
        .map(|e| e.corroborates(top_category))
        .unwrap_or(false);

    // Category override: low-confidence top category without corroboration
    // goes to a human, whatever the numbers say.
    if !high_signal && !corroborated {
        return TierDecision {
            tier: Tier::Medium,
            flag: false,
            hitl: true,
            top_category: Some(top_category),
            top_score,
        };
    }

    let (tier, flag, hitl) = if top_score >= policy.t_high {
        (Tier::High, true, false)
    } else if top_score >= policy.t_low {
        if high_signal {
            (Tier::Medium, true, false)
        } else {
            (Tier::Medium, false, true)
        }
    } else {
        (Tier::Low, false, false)
    };

    TierDecision {
        tier,
        flag,
        hitl,
        top_category: Some(top_category),
        top_score,
    }
}
