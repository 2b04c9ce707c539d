//! Score blending: `blended = alpha * rule + beta * neighbor` per category.
//!
//! Both component scores are clamped to [0, 1] before blending so the
//! weights stay comparable across categories with different lexicon sizes.
//! When neighbor evidence is absent the beta term is simply zero; alpha is
//! not renormalized, so missing semantic evidence never inflates rule-only
//! confidence.

use std::collections::BTreeMap;

use crate::category::Category;
use crate::neighbor::NeighborEvidence;

#[derive(Debug, Clone, Copy)]
pub struct BlendWeights {
    pub alpha: f32,
    pub beta: f32,
}

/// Normalize a raw accumulated rule score onto [0, 1].
pub fn normalize_rule_score(raw: f32) -> f32 {
    raw.clamp(0.0, 1.0)
}

pub fn blend_one(rule_score: f32, neighbor_score: Option<f32>, w: BlendWeights) -> f32 {
    let r = rule_score.clamp(0.0, 1.0);
    let n = neighbor_score.map(|s| s.clamp(0.0, 1.0)).unwrap_or(0.0);
    (w.alpha * r + w.beta * n).clamp(0.0, 1.0)
}

/// Blend every category present in either evidence source. Categories with
/// neither rule nor neighbor evidence are omitted (score 0).
pub fn blend_categories(
    rule_scores: &BTreeMap<Category, f32>,
    evidence: Option<&NeighborEvidence>,
    w: BlendWeights,
) -> BTreeMap<Category, f32> {
    let mut out = BTreeMap::new();
    for cat in Category::ALL {
        let rule = rule_scores.get(&cat).copied();
        let neigh = evidence.and_then(|e| e.scores.get(&cat).copied());
        if rule.is_none() && neigh.is_none() {
            continue;
        }
        out.insert(
            cat,
            blend_one(normalize_rule_score(rule.unwrap_or(0.0)), neigh, w),
        );
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    const W: BlendWeights = BlendWeights {
        alpha: 0.5,
        beta: 0.5,
    };

    #[test]
    fn blends_both_components() {
        let b = blend_one(0.9, Some(1.0), W);
        assert!((b - 0.95).abs() < 1e-6);
    }

    #[test]
    fn absent_neighbor_term_is_zero_not_renormalized() {
        let b = blend_one(0.9, None, W);
        assert!((b - 0.45).abs() < 1e-6);
    }

    #[test]
    fn components_are_clamped_before_blending() {
        // Raw rule sums can exceed 1 (many rules); clamp first.
        let b = blend_one(normalize_rule_score(2.7), None, BlendWeights { alpha: 1.0, beta: 0.0 });
        assert!((b - 1.0).abs() < 1e-6);
    }

    #[test]
    fn increasing_alpha_never_decreases_the_blend() {
        let lo = blend_one(0.6, Some(0.3), BlendWeights { alpha: 0.4, beta: 0.5 });
        let hi = blend_one(0.6, Some(0.3), BlendWeights { alpha: 0.9, beta: 0.5 });
        assert!(hi >= lo);
    }

    #[test]
    fn categories_without_evidence_are_omitted() {
        let rules = BTreeMap::from([(crate::category::Category::Toxic, 0.5f32)]);
        let out = blend_categories(&rules, None, W);
        assert_eq!(out.len(), 1);
        assert!(out.contains_key(&crate::category::Category::Toxic));
    }
}
