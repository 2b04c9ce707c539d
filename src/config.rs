//! Engine configuration: blend weights, tier thresholds, retrieval knobs.
//!
//! Loaded from TOML (`config/engine.toml` by default), with `RISK_*`
//! environment overrides for the numeric tunables. Every field has a
//! compiled-in default so the engine boots without a config file.

use anyhow::Context;
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::category::Category;

pub const DEFAULT_ENGINE_CONFIG_PATH: &str = "config/engine.toml";

pub const ENV_ENGINE_CONFIG_PATH: &str = "RISK_ENGINE_CONFIG";
pub const ENV_ALPHA: &str = "RISK_ALPHA";
pub const ENV_BETA: &str = "RISK_BETA";
pub const ENV_T_LOW: &str = "RISK_T_LOW";
pub const ENV_T_HIGH: &str = "RISK_T_HIGH";
pub const ENV_TOP_K: &str = "RISK_TOP_K";

/// Per-detector weights for the structured-signal detectors.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SignalWeights {
    pub url: f32,
    pub email: f32,
    pub phone: f32,
    pub id_number: f32,
}

impl Default for SignalWeights {
    fn default() -> Self {
        Self {
            url: 0.5,
            email: 0.6,
            phone: 0.7,
            id_number: 0.8,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Rule-evidence blend weight.
    pub alpha: f32,
    /// Neighbor-evidence blend weight. Treated as 0 when no evidence exists;
    /// alpha is NOT renormalized in that case.
    pub beta: f32,
    /// Neighbor count per retrieval.
    pub top_k: usize,
    /// Lower tier threshold; a score equal to it is already MEDIUM.
    pub t_low: f32,
    /// Upper tier threshold; a score equal to it is already HIGH.
    pub t_high: f32,
    /// Categories whose MEDIUM hits auto-flag. Everything else routes to HITL.
    pub high_signal_categories: Vec<Category>,
    /// Max occurrences counted per rule (repetition-spam cap).
    pub occurrence_cap: usize,
    /// When true, a URL hit also scores for Promotion, not just Privacy.
    pub url_counts_for_promotion: bool,
    /// Fold Latin diacritics during normalization.
    pub strip_accents: bool,
    /// Budget for neighbor retrieval before falling back to rule-only scoring.
    pub retrieval_timeout_ms: u64,
    pub signal_weights: SignalWeights,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            alpha: 0.6,
            beta: 0.4,
            top_k: 5,
            t_low: 0.40,
            t_high: 0.70,
            high_signal_categories: Category::default_high_signal(),
            occurrence_cap: 3,
            url_counts_for_promotion: false,
            strip_accents: false,
            retrieval_timeout_ms: 500,
            signal_weights: SignalWeights::default(),
        }
    }
}

impl EngineConfig {
    /// Resolve the config path (env override, then default), load it if it
    /// exists, and apply env overrides on top. A missing file is not an
    /// error; a malformed one is.
    pub fn load() -> anyhow::Result<Self> {
        let path = std::env::var(ENV_ENGINE_CONFIG_PATH)
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(DEFAULT_ENGINE_CONFIG_PATH));

        let mut cfg = if path.exists() {
            Self::from_path(&path)?
        } else {
            Self::default()
        };
        cfg.apply_env_overrides();
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn from_path(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read engine config at {}", path.display()))?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(s: &str) -> anyhow::Result<Self> {
        let cfg: EngineConfig = toml::from_str(s).context("malformed engine config")?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn apply_env_overrides(&mut self) {
        if let Some(v) = parse_unit_env(ENV_ALPHA) {
            self.alpha = v;
        }
        if let Some(v) = parse_unit_env(ENV_BETA) {
            self.beta = v;
        }
        if let Some(v) = parse_unit_env(ENV_T_LOW) {
            self.t_low = v;
        }
        if let Some(v) = parse_unit_env(ENV_T_HIGH) {
            self.t_high = v;
        }
        if let Some(k) = std::env::var(ENV_TOP_K)
            .ok()
            .and_then(|s| s.trim().parse::<usize>().ok())
        {
            self.top_k = k.max(1);
        }
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if !(self.alpha.is_finite() && self.alpha >= 0.0) {
            anyhow::bail!("alpha must be a finite non-negative number");
        }
        if !(self.beta.is_finite() && self.beta >= 0.0) {
            anyhow::bail!("beta must be a finite non-negative number");
        }
        if !(self.t_low.is_finite() && self.t_high.is_finite() && self.t_low < self.t_high) {
            anyhow::bail!(
                "tier thresholds must satisfy t_low < t_high (got {} / {})",
                self.t_low,
                self.t_high
            );
        }
        if self.top_k == 0 {
            anyhow::bail!("top_k must be at least 1");
        }
        if self.occurrence_cap == 0 {
            anyhow::bail!("occurrence_cap must be at least 1");
        }
        Ok(())
    }
}

// parse optional float env and clamp to <0.0..=1.0>
fn parse_unit_env(name: &str) -> Option<f32> {
    std::env::var(name)
        .ok()
        .and_then(|s| s.trim().parse::<f32>().ok())
        .map(|v| v.clamp(0.0, 1.0))
}
