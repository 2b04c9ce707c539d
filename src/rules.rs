//! Rule Store: declarative rule/lexicon definitions loaded from TOML.
//!
//! Schema (per entry):
//! - `[[rules]]`:   `{id, category, kind, pattern|keywords, weight, case_sensitive}`
//!   with `kind` one of `"phrase"`, `"regex"`, `"keywords"`.
//! - `[[lexicon]]`: `{category, phrase, weight}`; many entries may map to the
//!   same category and their weights accumulate.
//!
//! Validation happens entirely at load: unknown categories, invalid regexes,
//! duplicate rule ids, and out-of-range weights all fail the load before any
//! request can observe the set. Reload is swap-or-keep: a failed reload
//! leaves the previous rule set serving.

use anyhow::Context;
use regex::Regex;
use serde::Deserialize;
use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};
use tracing::info;

use crate::category::Category;
use crate::normalize::normalize;

pub const DEFAULT_RULES_PATH: &str = "config/rules.toml";
pub const ENV_RULES_PATH: &str = "RISK_RULES_PATH";

/// Sane range for rule weights; signed so rules can also discount a category.
pub const MIN_RULE_WEIGHT: f32 = -1.0;
pub const MAX_RULE_WEIGHT: f32 = 1.0;

/* ----------------------------
File schema (from TOML)
---------------------------- */

#[derive(Debug, Clone, Deserialize, Default)]
pub struct RuleFile {
    #[serde(default)]
    pub rules: Vec<RuleDef>,
    #[serde(default)]
    pub lexicon: Vec<LexiconEntry>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PatternKind {
    Phrase,
    Regex,
    Keywords,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RuleDef {
    pub id: String,
    pub category: Category,
    pub kind: PatternKind,
    #[serde(default)]
    pub pattern: Option<String>,
    #[serde(default)]
    pub keywords: Vec<String>,
    pub weight: f32,
    #[serde(default)]
    pub case_sensitive: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LexiconEntry {
    pub category: Category,
    pub phrase: String,
    pub weight: f32,
}

/* ----------------------------
Compiled structures
---------------------------- */

/// One loaded rule with its pattern compiled to a single regex.
#[derive(Debug)]
pub struct CompiledRule {
    pub id: String,
    pub category: Category,
    pub weight: f32,
    pub case_sensitive: bool,
    pub re: Regex,
    /// What to show in explanations (the phrase, or the raw pattern).
    pub display: String,
}

/// Immutable, queryable rule set indexed by category.
#[derive(Debug, Default)]
pub struct RuleSet {
    rules: Vec<CompiledRule>,
    by_category: BTreeMap<Category, Vec<usize>>,
}

impl RuleSet {
    pub fn from_toml_str(toml_str: &str) -> anyhow::Result<Self> {
        let file: RuleFile = toml::from_str(toml_str).context("malformed rule file")?;
        Self::compile(file)
    }

    pub fn from_path(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read rule file at {}", path.display()))?;
        Self::from_toml_str(&content)
            .with_context(|| format!("invalid rule file at {}", path.display()))
    }

    pub fn compile(file: RuleFile) -> anyhow::Result<Self> {
        let mut rules = Vec::with_capacity(file.rules.len() + file.lexicon.len());
        let mut seen_ids = HashSet::new();

        for def in &file.rules {
            if !seen_ids.insert(def.id.clone()) {
                anyhow::bail!("duplicate rule id `{}`", def.id);
            }
            validate_weight(&def.id, def.weight)?;
            rules.push(compile_rule(def)?);
        }

        // Lexicon entries become phrase rules with generated ids; duplicates
        // of the same phrase are allowed and accumulate at match time.
        for (i, entry) in file.lexicon.iter().enumerate() {
            let id = format!("lex:{}:{}", lexicon_slug(entry.category), i);
            validate_weight(&id, entry.weight)?;
            let phrase = normalize(&entry.phrase, false).folded;
            if phrase.is_empty() {
                anyhow::bail!("lexicon entry {} has an empty phrase", i);
            }
            rules.push(CompiledRule {
                id,
                category: entry.category,
                weight: entry.weight,
                case_sensitive: false,
                re: phrase_regex(&phrase, false)?,
                display: entry.phrase.clone(),
            });
        }

        let mut by_category: BTreeMap<Category, Vec<usize>> = BTreeMap::new();
        for (i, r) in rules.iter().enumerate() {
            by_category.entry(r.category).or_default().push(i);
        }

        Ok(Self { rules, by_category })
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn all(&self) -> &[CompiledRule] {
        &self.rules
    }

    pub fn for_category(&self, category: Category) -> impl Iterator<Item = &CompiledRule> {
        self.by_category
            .get(&category)
            .into_iter()
            .flatten()
            .map(move |&i| &self.rules[i])
    }
}

fn lexicon_slug(category: Category) -> &'static str {
    match category {
        Category::Privacy => "privacy",
        Category::Toxic => "toxic",
        Category::Promotion => "promotion",
        Category::Misinformation => "misinformation",
        Category::OffTopic => "off_topic",
    }
}

fn validate_weight(id: &str, weight: f32) -> anyhow::Result<()> {
    if !weight.is_finite() || !(MIN_RULE_WEIGHT..=MAX_RULE_WEIGHT).contains(&weight) {
        anyhow::bail!(
            "rule `{}` weight {} outside [{}, {}]",
            id,
            weight,
            MIN_RULE_WEIGHT,
            MAX_RULE_WEIGHT
        );
    }
    Ok(())
}

fn compile_rule(def: &RuleDef) -> anyhow::Result<CompiledRule> {
    let (re, display) = match def.kind {
        PatternKind::Phrase => {
            let raw = def
                .pattern
                .as_deref()
                .filter(|p| !p.trim().is_empty())
                .ok_or_else(|| anyhow::anyhow!("phrase rule `{}` is missing `pattern`", def.id))?;
            let norm = normalize(raw, false);
            let phrase = if def.case_sensitive {
                norm.cased
            } else {
                norm.folded
            };
            (phrase_regex(&phrase, def.case_sensitive)?, raw.to_string())
        }
        PatternKind::Regex => {
            let pat = def
                .pattern
                .as_deref()
                .ok_or_else(|| anyhow::anyhow!("regex rule `{}` is missing `pattern`", def.id))?;
            let full = if def.case_sensitive {
                pat.to_string()
            } else {
                format!("(?i){pat}")
            };
            let re = Regex::new(&full)
                .map_err(|e| anyhow::anyhow!("rule `{}` regex error: {}", def.id, e))?;
            (re, pat.to_string())
        }
        PatternKind::Keywords => {
            if def.keywords.is_empty() {
                anyhow::bail!("keywords rule `{}` has an empty keyword set", def.id);
            }
            let alts = def
                .keywords
                .iter()
                .map(|k| {
                    let norm = normalize(k, false);
                    let k = if def.case_sensitive {
                        norm.cased
                    } else {
                        norm.folded
                    };
                    if k.is_empty() {
                        anyhow::bail!("keywords rule `{}` contains an empty keyword", def.id)
                    } else {
                        Ok(regex::escape(&k))
                    }
                })
                .collect::<anyhow::Result<Vec<_>>>()?;
            let flags = if def.case_sensitive { "" } else { "(?i)" };
            let re = Regex::new(&format!(r"{flags}\b(?:{})\b", alts.join("|")))
                .map_err(|e| anyhow::anyhow!("rule `{}` keyword regex error: {}", def.id, e))?;
            (re, def.keywords.join(", "))
        }
    };

    Ok(CompiledRule {
        id: def.id.clone(),
        category: def.category,
        weight: def.weight,
        case_sensitive: def.case_sensitive,
        re,
        display,
    })
}

/// Word-boundary-aware regex for a literal phrase.
fn phrase_regex(phrase: &str, case_sensitive: bool) -> anyhow::Result<Regex> {
    let flags = if case_sensitive { "" } else { "(?i)" };
    Regex::new(&format!(r"{flags}\b{}\b", regex::escape(phrase)))
        .map_err(|e| anyhow::anyhow!("phrase `{}` regex error: {}", phrase, e))
}

/* ----------------------------
Shared handle with atomic reload
---------------------------- */

/// Shared, reloadable rule set. Readers clone an `Arc` snapshot; a reload
/// either fully replaces it or leaves the old snapshot serving.
#[derive(Debug)]
pub struct SharedRules {
    path: Option<PathBuf>,
    inner: RwLock<Arc<RuleSet>>,
}

impl SharedRules {
    /// Load from the configured path (env override, then default).
    pub fn load() -> anyhow::Result<Self> {
        let path = std::env::var(ENV_RULES_PATH)
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(DEFAULT_RULES_PATH));
        Self::load_from(path)
    }

    /// Load from an explicit rule file path, kept for later reloads.
    pub fn load_from(path: PathBuf) -> anyhow::Result<Self> {
        let set = RuleSet::from_path(&path)?;
        info!(rules = set.len(), path = %path.display(), "rule set loaded");
        Ok(Self {
            path: Some(path),
            inner: RwLock::new(Arc::new(set)),
        })
    }

    pub fn from_set(set: RuleSet) -> Self {
        Self {
            path: None,
            inner: RwLock::new(Arc::new(set)),
        }
    }

    /// Current snapshot. Cheap; safe to hold across a concurrent reload.
    pub fn current(&self) -> Arc<RuleSet> {
        self.inner.read().expect("rules lock poisoned").clone()
    }

    /// Re-read and re-compile the rule file, then swap. On any error the
    /// previous set keeps serving and the error is returned to the caller.
    pub fn reload(&self) -> anyhow::Result<usize> {
        let path = self
            .path
            .as_ref()
            .ok_or_else(|| anyhow::anyhow!("rule set was built in-memory; nothing to reload"))?;
        let fresh = RuleSet::from_path(path)?;
        let n = fresh.len();
        let mut guard = self.inner.write().expect("rules lock poisoned");
        *guard = Arc::new(fresh);
        info!(rules = n, "rule set reloaded");
        Ok(n)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const GOOD: &str = r#"
        [[rules]]
        id = "contact-push"
        category = "promotion"
        kind = "keywords"
        keywords = ["dm me", "whatsapp"]
        weight = 0.4

        [[rules]]
        id = "discount-regex"
        category = "promotion"
        kind = "regex"
        pattern = "\\b\\d{1,2}% off\\b"
        weight = 0.3

        [[lexicon]]
        category = "promotion"
        phrase = "best price"
        weight = 0.4

        [[lexicon]]
        category = "toxic"
        phrase = "idiot"
        weight = 0.5
    "#;

    #[test]
    fn compiles_rules_and_lexicon() {
        let set = RuleSet::from_toml_str(GOOD).unwrap();
        assert_eq!(set.len(), 4);
        assert_eq!(set.for_category(Category::Promotion).count(), 3);
        assert_eq!(set.for_category(Category::Toxic).count(), 1);
        assert_eq!(set.for_category(Category::Privacy).count(), 0);
    }

    #[test]
    fn rejects_duplicate_ids() {
        let toml = r#"
            [[rules]]
            id = "dup"
            category = "toxic"
            kind = "phrase"
            pattern = "a"
            weight = 0.1

            [[rules]]
            id = "dup"
            category = "toxic"
            kind = "phrase"
            pattern = "b"
            weight = 0.1
        "#;
        let err = RuleSet::from_toml_str(toml).unwrap_err();
        assert!(err.to_string().contains("duplicate rule id"));
    }

    #[test]
    fn rejects_invalid_regex() {
        let toml = r#"
            [[rules]]
            id = "broken"
            category = "privacy"
            kind = "regex"
            pattern = "(unclosed"
            weight = 0.2
        "#;
        let err = RuleSet::from_toml_str(toml).unwrap_err();
        assert!(format!("{err:#}").contains("regex error"));
    }

    #[test]
    fn rejects_unknown_category() {
        let toml = r#"
            [[rules]]
            id = "x"
            category = "gossip"
            kind = "phrase"
            pattern = "y"
            weight = 0.2
        "#;
        assert!(RuleSet::from_toml_str(toml).is_err());
    }

    #[test]
    fn rejects_out_of_range_weight() {
        let toml = r#"
            [[rules]]
            id = "heavy"
            category = "toxic"
            kind = "phrase"
            pattern = "z"
            weight = 5.0
        "#;
        let err = RuleSet::from_toml_str(toml).unwrap_err();
        assert!(err.to_string().contains("outside"));
    }

    #[test]
    fn reload_replaces_active_set_from_changed_file() {
        let path = std::env::temp_dir().join(format!(
            "risk-rules-test-{}.toml",
            std::process::id()
        ));
        std::fs::write(&path, GOOD).unwrap();
        let shared = SharedRules::load_from(path.clone()).unwrap();
        assert_eq!(shared.current().len(), 4);

        let extended = format!(
            "{GOOD}\n[[lexicon]]\ncategory = \"privacy\"\nphrase = \"home address\"\nweight = 0.4\n"
        );
        std::fs::write(&path, extended).unwrap();
        assert_eq!(shared.reload().unwrap(), 5);
        assert_eq!(shared.current().len(), 5);
        assert_eq!(shared.current().for_category(Category::Privacy).count(), 1);
        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn reload_failure_keeps_previous_set() {
        let set = RuleSet::from_toml_str(GOOD).unwrap();
        let shared = SharedRules::from_set(set);
        // In-memory sets have no backing file, so reload must fail...
        assert!(shared.reload().is_err());
        // ...and the previous snapshot keeps serving.
        assert_eq!(shared.current().len(), 4);
    }
}
