//! # Decision Engine
//! Orchestrates one decision: normalize → match rules + detect signals →
//! (maybe) retrieve neighbors → blend → tier → build the record.
//!
//! `decide()` is pure with respect to its inputs and suitable for offline
//! evaluation; retrieval is split out so callers can bound it with a timeout
//! and fall back to rule-only scoring (the same contract as an unavailable
//! index).

use chrono::Utc;

use crate::blend::{blend_categories, BlendWeights};
use crate::config::EngineConfig;
use crate::degrade::{DegradationController, IndexResources, Mode};
use crate::explain::{self, DecisionParts, DecisionRecord};
use crate::matcher::match_rules;
use crate::neighbor::NeighborEvidence;
use crate::normalize::normalize;
use crate::rules::SharedRules;
use crate::signals;
use crate::tiering::{self, TierPolicy};

pub struct RiskEngine {
    rules: SharedRules,
    degrade: DegradationController,
    cfg: EngineConfig,
}

/// Per-request switches.
#[derive(Debug, Clone, Copy, Default)]
pub struct EvalOptions {
    /// Force Minimal mode for this request (testing / privacy audits).
    pub force_minimal: bool,
}

impl RiskEngine {
    pub fn new(rules: SharedRules, degrade: DegradationController, cfg: EngineConfig) -> Self {
        Self {
            rules,
            degrade,
            cfg,
        }
    }

    /// Production boot: config, rule file, and index resources from their
    /// conventional paths / env overrides. Rule validation failure is fatal
    /// here; the engine fails closed at startup, never at decision time.
    pub fn bootstrap() -> anyhow::Result<Self> {
        let cfg = EngineConfig::load()?;
        let rules = SharedRules::load()?;
        let degrade = DegradationController::from_resources(&IndexResources::from_env());
        Ok(Self::new(rules, degrade, cfg))
    }

    pub fn config(&self) -> &EngineConfig {
        &self.cfg
    }

    pub fn rules(&self) -> &SharedRules {
        &self.rules
    }

    pub fn mode(&self) -> Mode {
        self.degrade.mode()
    }

    /// Neighbor retrieval half; run it under the caller's timeout.
    pub fn retrieve(&self, text: &str, force_minimal: bool) -> Option<NeighborEvidence> {
        let norm = normalize(text, self.cfg.strip_accents);
        self.degrade
            .retrieve(&norm.folded, self.cfg.top_k, force_minimal)
    }

    /// Scoring half: deterministic for fixed rules, config, and evidence.
    pub fn decide(
        &self,
        text: &str,
        mode: Mode,
        evidence: Option<&NeighborEvidence>,
        notes: Vec<String>,
    ) -> DecisionRecord {
        let rules = self.rules.current();
        let norm = normalize(text, self.cfg.strip_accents);
        let input_ref = anon_hash(text);

        let matched = match_rules(&rules, &norm, self.cfg.occurrence_cap);
        let detected = signals::detect(
            &norm.folded,
            &self.cfg.signal_weights,
            self.cfg.url_counts_for_promotion,
        );

        let mut raw = matched.scores;
        for (cat, w) in &detected.scores {
            *raw.entry(*cat).or_insert(0.0) += w;
        }

        let blended = blend_categories(
            &raw,
            evidence,
            BlendWeights {
                alpha: self.cfg.alpha,
                beta: self.cfg.beta,
            },
        );

        let verdict = tiering::assign(
            &blended,
            evidence,
            TierPolicy {
                t_low: self.cfg.t_low,
                t_high: self.cfg.t_high,
                high_signal: &self.cfg.high_signal_categories,
            },
        );

        explain::build(
            DecisionParts {
                input_ref,
                blended,
                verdict,
                rule_hits: &matched.hits,
                signal_hits: &detected.hits,
                evidence,
                mode,
                notes,
            },
            explain::next_decision_id(),
            Utc::now(),
        )
    }

    /// Convenience: retrieval and scoring in one synchronous call.
    pub fn evaluate(&self, text: &str) -> DecisionRecord {
        self.evaluate_with(text, EvalOptions::default())
    }

    pub fn evaluate_with(&self, text: &str, opts: EvalOptions) -> DecisionRecord {
        let evidence = self.retrieve(text, opts.force_minimal);
        let mode = self.degrade.effective_mode(opts.force_minimal);
        let mut notes = Vec::new();
        if opts.force_minimal {
            notes.push("degradation forced to minimal for this request".to_string());
        }
        self.decide(text, mode, evidence.as_ref(), notes)
    }
}

/// Short SHA-256 prefix used as the input text reference. Raw text never
/// appears in records or logs.
pub fn anon_hash(text: &str) -> String {
    use sha2::{Digest, Sha256};
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    let digest = hasher.finalize();
    let mut out = String::with_capacity(12);
    for b in digest.iter().take(6) {
        use std::fmt::Write as _;
        let _ = write!(&mut out, "{:02x}", b);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::category::Category;
    use crate::degrade::DegradationController;
    use crate::neighbor::{Case, CaseIndex};
    use crate::rules::RuleSet;
    use crate::tiering::Tier;

    const RULES: &str = r#"
        [[lexicon]]
        category = "promotion"
        phrase = "best price"
        weight = 0.4

        [[lexicon]]
        category = "promotion"
        phrase = "click my link"
        weight = 0.5

        [[lexicon]]
        category = "off_topic"
        phrase = "the weather"
        weight = 0.3
    "#;

    fn engine(cfg: EngineConfig, degrade: DegradationController) -> RiskEngine {
        RiskEngine::new(
            SharedRules::from_set(RuleSet::from_toml_str(RULES).unwrap()),
            degrade,
            cfg,
        )
    }

    fn rule_only_cfg() -> EngineConfig {
        EngineConfig {
            alpha: 1.0,
            beta: 0.0,
            t_low: 0.3,
            t_high: 0.7,
            ..EngineConfig::default()
        }
    }

    #[test]
    fn promo_lexicon_sums_to_high_flag() {
        let eng = engine(rule_only_cfg(), DegradationController::minimal());
        let rec = eng.evaluate("best price guaranteed, click my link now");
        assert!((rec.scores[&Category::Promotion] - 0.9).abs() < 1e-6);
        assert_eq!(rec.tier, Tier::High);
        assert!(rec.flag);
        assert_eq!(rec.mode, Mode::Minimal);
        assert!(rec.neighbors.is_empty());
    }

    #[test]
    fn blends_neighbor_evidence_when_index_loaded() {
        let idx = CaseIndex::from_cases(vec![
            Case {
                id: 1,
                text: "best price guaranteed, click my link now".into(),
                label: Category::Promotion,
            },
            Case {
                id: 2,
                text: "click my link for the best price".into(),
                label: Category::Promotion,
            },
            Case {
                id: 3,
                text: "great best price, click my link here".into(),
                label: Category::Promotion,
            },
        ]);
        let cfg = EngineConfig {
            alpha: 0.5,
            beta: 0.5,
            t_low: 0.3,
            t_high: 0.7,
            ..EngineConfig::default()
        };
        let eng = engine(cfg, DegradationController::full(idx));
        let rec = eng.evaluate("best price guaranteed, click my link now");
        // rule 0.9, neighbor vote 1.0 → 0.5*0.9 + 0.5*1.0 = 0.95
        assert!((rec.scores[&Category::Promotion] - 0.95).abs() < 0.02);
        assert_eq!(rec.tier, Tier::High);
        assert_eq!(rec.mode, Mode::Full);
        assert!(!rec.neighbors.is_empty());
    }

    #[test]
    fn empty_input_is_low_with_no_signal() {
        let eng = engine(rule_only_cfg(), DegradationController::minimal());
        let rec = eng.evaluate("");
        assert!(rec.scores.is_empty());
        assert_eq!(rec.tier, Tier::Low);
        assert!(!rec.flag);
        assert!(rec.reasons.iter().any(|r| r.contains("no signal")));
    }

    #[test]
    fn ambiguous_off_topic_routes_to_hitl() {
        let eng = engine(rule_only_cfg(), DegradationController::minimal());
        let rec = eng.evaluate("mostly about the weather today");
        assert_eq!(rec.top_category, Some(Category::OffTopic));
        assert_eq!(rec.tier, Tier::Medium);
        assert!(rec.hitl);
        assert!(!rec.flag);
    }

    #[test]
    fn force_minimal_hides_loaded_index() {
        let idx = CaseIndex::from_cases(vec![Case {
            id: 1,
            text: "click my link".into(),
            label: Category::Promotion,
        }]);
        let eng = engine(rule_only_cfg(), DegradationController::full(idx));
        let rec = eng.evaluate_with("click my link", EvalOptions { force_minimal: true });
        assert_eq!(rec.mode, Mode::Minimal);
        assert!(rec.neighbors.is_empty());
    }

    #[test]
    fn anon_hash_is_short_and_stable() {
        assert_eq!(anon_hash("abc"), anon_hash("abc"));
        assert_eq!(anon_hash("abc").len(), 12);
        assert_ne!(anon_hash("abc"), anon_hash("abd"));
    }
}
