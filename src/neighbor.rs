//! Semantic neighbor retrieval over a case index.
//!
//! The index stores historical cases with precomputed embeddings; retrieval
//! embeds the query with the same function and runs an exact inner-product
//! search (embeddings are L2-normalized, so inner product == cosine).
//!
//! The embedding is a deterministic hashed bag of character trigrams and
//! tokens (no model download, no nondeterminism), which keeps decisions
//! reproducible and lets the index be rebuilt anywhere from the corpus CSV.
//!
//! When no index is loaded the retriever seam reports `None` rather than
//! failing; that is the engine's primary degradation path.

use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

use crate::category::Category;

pub const EMBED_DIM: usize = 256;

/// Calibration window for mapping mean neighbor similarity onto [0, 1].
const CAL_LOW: f32 = 0.25;
const CAL_HIGH: f32 = 0.85;

/// A historical or sample text with its known label.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Case {
    pub id: u64,
    pub text: String,
    pub label: Category,
}

/// One retrieved neighbor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Neighbor {
    pub case_id: u64,
    pub label: Category,
    pub similarity: f32,
}

/// Ranked neighbor evidence for one query.
#[derive(Debug, Clone, Default)]
pub struct NeighborEvidence {
    /// Descending similarity; ties broken by ascending case id.
    pub neighbors: Vec<Neighbor>,
    /// Calibrated aggregate confidence in [0, 1].
    pub confidence: f32,
    /// Per-category similarity-weighted label vote, normalized to [0, 1].
    pub scores: BTreeMap<Category, f32>,
}

impl NeighborEvidence {
    pub fn corroborates(&self, category: Category) -> bool {
        self.neighbors.iter().any(|n| n.label == category)
    }
}

/// Retrieval seam: a loaded index or an "unavailable" stand-in. Scoring and
/// tiering never know which is behind it.
pub trait NeighborRetriever: Send + Sync {
    fn retrieve(&self, folded_text: &str, top_k: usize) -> Option<NeighborEvidence>;
}

/// Stand-in used when no corpus/index resource exists.
#[derive(Debug, Clone, Copy, Default)]
pub struct Unavailable;

impl NeighborRetriever for Unavailable {
    fn retrieve(&self, _folded_text: &str, _top_k: usize) -> Option<NeighborEvidence> {
        None
    }
}

/* ----------------------------
Embedding
---------------------------- */

/// Deterministic hashed trigram + token embedding, L2-normalized.
pub fn embed(folded_text: &str) -> Vec<f32> {
    let mut v = vec![0f32; EMBED_DIM];

    let chars: Vec<char> = folded_text.chars().collect();
    for w in chars.windows(3) {
        let mut h = FNV_OFFSET;
        for c in w {
            h = fnv1a_char(h, *c);
        }
        v[(h as usize) % EMBED_DIM] += 1.0;
    }
    for tok in folded_text.split_whitespace() {
        let mut h = FNV_OFFSET ^ 0x9e37;
        for c in tok.chars() {
            h = fnv1a_char(h, c);
        }
        v[(h as usize) % EMBED_DIM] += 1.0;
    }

    let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        for x in &mut v {
            *x /= norm;
        }
    }
    v
}

const FNV_OFFSET: u64 = 0xcbf29ce484222325;
const FNV_PRIME: u64 = 0x100000001b3;

fn fnv1a_char(mut h: u64, c: char) -> u64 {
    let mut buf = [0u8; 4];
    for b in c.encode_utf8(&mut buf).as_bytes() {
        h ^= *b as u64;
        h = h.wrapping_mul(FNV_PRIME);
    }
    h
}

fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

/* ----------------------------
Case index
---------------------------- */

/// Immutable in-memory case index: metadata plus one embedding per case.
#[derive(Debug, Default)]
pub struct CaseIndex {
    cases: Vec<Case>,
    embeddings: Vec<Vec<f32>>,
}

/// On-disk artifact: embeddings plus metadata keyed by id.
#[derive(Debug, Serialize, Deserialize)]
struct IndexArtifact {
    schema: String,
    dim: usize,
    cases: Vec<Case>,
    embeddings: Vec<Vec<f32>>,
}

const ARTIFACT_SCHEMA: &str = "risk.case-index.v1";

impl CaseIndex {
    /// Build from in-memory cases, embedding each text with [`embed`].
    /// Texts are folded with the same normalizer used for queries.
    pub fn from_cases(cases: Vec<Case>) -> Self {
        let embeddings = cases
            .iter()
            .map(|c| embed(&crate::normalize::normalize(&c.text, false).folded))
            .collect();
        Self { cases, embeddings }
    }

    /// Load a corpus CSV with columns `id,text,label` and embed it.
    pub fn from_corpus_csv(path: &Path) -> anyhow::Result<Self> {
        #[derive(Deserialize)]
        struct Row {
            id: u64,
            text: String,
            label: Category,
        }

        let mut rdr = csv::Reader::from_path(path)
            .with_context(|| format!("failed to open case corpus at {}", path.display()))?;
        let mut cases = Vec::new();
        for (i, row) in rdr.deserialize::<Row>().enumerate() {
            let row = row.with_context(|| {
                format!("bad corpus record {} in {}", i + 1, path.display())
            })?;
            cases.push(Case {
                id: row.id,
                text: row.text,
                label: row.label,
            });
        }
        if cases.is_empty() {
            anyhow::bail!("case corpus {} has no records", path.display());
        }
        Ok(Self::from_cases(cases))
    }

    /// Load a prebuilt index artifact (embeddings + metadata).
    pub fn from_artifact(path: &Path) -> anyhow::Result<Self> {
        let bytes = std::fs::read(path)
            .with_context(|| format!("failed to read index artifact at {}", path.display()))?;
        let art: IndexArtifact =
            serde_json::from_slice(&bytes).context("malformed index artifact")?;
        if art.schema != ARTIFACT_SCHEMA {
            anyhow::bail!("unexpected index schema `{}`", art.schema);
        }
        if art.dim != EMBED_DIM || art.embeddings.iter().any(|e| e.len() != EMBED_DIM) {
            anyhow::bail!("index artifact dimension mismatch (expected {EMBED_DIM})");
        }
        if art.cases.len() != art.embeddings.len() {
            anyhow::bail!("index artifact metadata/embedding count mismatch");
        }
        Ok(Self {
            cases: art.cases,
            embeddings: art.embeddings,
        })
    }

    /// Write the artifact consumed by [`CaseIndex::from_artifact`].
    pub fn write_artifact(&self, path: &Path) -> anyhow::Result<()> {
        let art = IndexArtifact {
            schema: ARTIFACT_SCHEMA.to_string(),
            dim: EMBED_DIM,
            cases: self.cases.clone(),
            embeddings: self.embeddings.clone(),
        };
        let bytes = serde_json::to_vec(&art)?;
        std::fs::write(path, bytes)
            .with_context(|| format!("failed to write index artifact to {}", path.display()))
    }

    pub fn len(&self) -> usize {
        self.cases.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cases.is_empty()
    }
}

impl NeighborRetriever for CaseIndex {
    fn retrieve(&self, folded_text: &str, top_k: usize) -> Option<NeighborEvidence> {
        if self.is_empty() || folded_text.is_empty() {
            return None;
        }
        let q = embed(folded_text);

        let mut ranked: Vec<Neighbor> = self
            .embeddings
            .iter()
            .zip(&self.cases)
            .map(|(e, c)| Neighbor {
                case_id: c.id,
                label: c.label,
                similarity: dot(&q, e),
            })
            .collect();
        ranked.sort_by(|a, b| {
            b.similarity
                .partial_cmp(&a.similarity)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.case_id.cmp(&b.case_id))
        });
        ranked.truncate(top_k.max(1));

        let sim_sum: f32 = ranked.iter().map(|n| n.similarity.max(0.0)).sum();
        let mut scores = BTreeMap::new();
        if sim_sum > 0.0 {
            for n in &ranked {
                *scores.entry(n.label).or_insert(0.0) += n.similarity.max(0.0) / sim_sum;
            }
        }

        let mean = ranked.iter().map(|n| n.similarity).sum::<f32>() / ranked.len() as f32;
        let confidence = ((mean - CAL_LOW) / (CAL_HIGH - CAL_LOW)).clamp(0.0, 1.0);

        Some(NeighborEvidence {
            neighbors: ranked,
            confidence,
            scores,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_index() -> CaseIndex {
        CaseIndex::from_cases(vec![
            Case {
                id: 1,
                text: "best price guaranteed, click my link".into(),
                label: Category::Promotion,
            },
            Case {
                id: 2,
                text: "huge discount, visit my shop link now".into(),
                label: Category::Promotion,
            },
            Case {
                id: 3,
                text: "you are a complete idiot".into(),
                label: Category::Toxic,
            },
            Case {
                id: 4,
                text: "the pasta here was lovely and the staff friendly".into(),
                label: Category::OffTopic,
            },
        ])
    }

    #[test]
    fn embedding_is_deterministic_and_normalized() {
        let a = embed("click my link");
        let b = embed("click my link");
        assert_eq!(a, b);
        let norm: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-4);
    }

    #[test]
    fn identical_text_is_its_own_nearest_neighbor() {
        let idx = sample_index();
        let ev = idx
            .retrieve("best price guaranteed, click my link", 3)
            .unwrap();
        assert_eq!(ev.neighbors[0].case_id, 1);
        assert!((ev.neighbors[0].similarity - 1.0).abs() < 1e-4);
        // Ranked descending.
        for w in ev.neighbors.windows(2) {
            assert!(w[0].similarity >= w[1].similarity);
        }
    }

    #[test]
    fn label_votes_are_similarity_weighted_and_normalized() {
        let idx = sample_index();
        let ev = idx.retrieve("best price, click my link now", 3).unwrap();
        let total: f32 = ev.scores.values().sum();
        assert!((total - 1.0).abs() < 1e-4);
        let promo = ev.scores.get(&Category::Promotion).copied().unwrap_or(0.0);
        assert!(promo > 0.5, "promotion vote should dominate, got {promo}");
    }

    #[test]
    fn top_k_bounds_result_length() {
        let idx = sample_index();
        assert_eq!(idx.retrieve("anything at all", 2).unwrap().neighbors.len(), 2);
        assert_eq!(idx.retrieve("anything at all", 99).unwrap().neighbors.len(), 4);
    }

    #[test]
    fn unavailable_reports_none() {
        assert!(Unavailable.retrieve("some text", 5).is_none());
        assert!(CaseIndex::default().retrieve("some text", 5).is_none());
    }

    #[test]
    fn corroborates_checks_labels() {
        let idx = sample_index();
        let ev = idx.retrieve("click my link", 4).unwrap();
        assert!(ev.corroborates(Category::Promotion));
        assert!(!ev.corroborates(Category::Misinformation));
    }

    #[test]
    fn artifact_round_trip() {
        let idx = sample_index();
        let path = std::env::temp_dir().join(format!(
            "case-index-test-{}.json",
            std::process::id()
        ));
        idx.write_artifact(&path).unwrap();
        let loaded = CaseIndex::from_artifact(&path).unwrap();
        std::fs::remove_file(&path).ok();
        assert_eq!(loaded.len(), idx.len());
        let a = idx.retrieve("click my link", 2).unwrap();
        let b = loaded.retrieve("click my link", 2).unwrap();
        assert_eq!(a.neighbors, b.neighbors);
    }
}
