//! Degradation controller: decides once, at load time, which retrieval
//! resources exist and gates the neighbor retriever accordingly.
//!
//! Full:    prebuilt index artifact or real historical corpus present.
//! Mid:     only the small sample corpus present.
//! Minimal: no index at all; rule-only scoring.
//!
//! The active mode is stamped on every decision record. A per-request
//! override can force Minimal (used by tests and the privacy-constrained
//! deployment), never the other direction.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

use crate::neighbor::{CaseIndex, NeighborEvidence, NeighborRetriever, Unavailable};

pub const ENV_INDEX_ARTIFACT: &str = "RISK_INDEX_ARTIFACT";
pub const ENV_CASE_CORPUS: &str = "RISK_CASE_CORPUS";

pub const DEFAULT_CORPUS_PATH: &str = "data/cases.csv";
pub const DEFAULT_SAMPLE_PATH: &str = "data/samples/sample_cases.csv";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    Full,
    Mid,
    Minimal,
}

/// Resource candidates, tried in order at load time.
#[derive(Debug, Clone)]
pub struct IndexResources {
    pub artifact: Option<PathBuf>,
    pub corpus: Option<PathBuf>,
    pub sample: Option<PathBuf>,
}

impl IndexResources {
    /// Env-var overrides first, then the conventional paths.
    pub fn from_env() -> Self {
        let artifact = std::env::var(ENV_INDEX_ARTIFACT).ok().map(PathBuf::from);
        let corpus = Some(
            std::env::var(ENV_CASE_CORPUS)
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from(DEFAULT_CORPUS_PATH)),
        );
        Self {
            artifact,
            corpus,
            sample: Some(PathBuf::from(DEFAULT_SAMPLE_PATH)),
        }
    }
}

/// Gates the retriever behind the mode chosen at load time.
pub struct DegradationController {
    mode: Mode,
    retriever: Arc<dyn NeighborRetriever>,
}

impl std::fmt::Debug for DegradationController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DegradationController")
            .field("mode", &self.mode)
            .finish_non_exhaustive()
    }
}

impl DegradationController {
    /// Probe resources in order (artifact, corpus, sample) and settle on a
    /// mode. Load failures demote to the next candidate rather than failing
    /// the boot; an unusable index is the same as an absent one.
    pub fn from_resources(res: &IndexResources) -> Self {
        if let Some(path) = res.artifact.as_ref().filter(|p| p.exists()) {
            match CaseIndex::from_artifact(path) {
                Ok(idx) => {
                    info!(cases = idx.len(), path = %path.display(), "index artifact loaded");
                    return Self::full(idx);
                }
                Err(e) => warn!(error = %format!("{e:#}"), "index artifact unusable, trying corpus"),
            }
        }
        if let Some(path) = res.corpus.as_ref().filter(|p| p.exists()) {
            match CaseIndex::from_corpus_csv(path) {
                Ok(idx) => {
                    info!(cases = idx.len(), path = %path.display(), "case corpus indexed");
                    return Self::full(idx);
                }
                Err(e) => warn!(error = %format!("{e:#}"), "case corpus unusable, trying sample"),
            }
        }
        if let Some(path) = res.sample.as_ref().filter(|p| p.exists()) {
            match CaseIndex::from_corpus_csv(path) {
                Ok(idx) => {
                    info!(cases = idx.len(), path = %path.display(), "sample corpus indexed");
                    return Self::mid(idx);
                }
                Err(e) => warn!(error = %format!("{e:#}"), "sample corpus unusable"),
            }
        }
        info!("no case index available; running rule-only");
        Self::minimal()
    }

    pub fn full(retriever: impl NeighborRetriever + 'static) -> Self {
        Self {
            mode: Mode::Full,
            retriever: Arc::new(retriever),
        }
    }

    pub fn mid(retriever: impl NeighborRetriever + 'static) -> Self {
        Self {
            mode: Mode::Mid,
            retriever: Arc::new(retriever),
        }
    }

    pub fn minimal() -> Self {
        Self {
            mode: Mode::Minimal,
            retriever: Arc::new(Unavailable),
        }
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn effective_mode(&self, force_minimal: bool) -> Mode {
        if force_minimal {
            Mode::Minimal
        } else {
            self.mode
        }
    }

    /// Retrieve neighbor evidence unless the (effective) mode is Minimal.
    pub fn retrieve(
        &self,
        folded_text: &str,
        top_k: usize,
        force_minimal: bool,
    ) -> Option<NeighborEvidence> {
        if self.effective_mode(force_minimal) == Mode::Minimal {
            return None;
        }
        self.retriever.retrieve(folded_text, top_k)
    }
}
