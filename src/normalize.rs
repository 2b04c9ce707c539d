//! Canonical text normalization for matching.
//!
//! Pure and idempotent: `normalize(normalize(x)) == normalize(x)`.
//! Pipeline: HTML entity decode (to fixpoint), zero-width strip, elongation
//! collapse (runs of the same character reduced to two), whitespace collapse.
//! The case-preserving form is kept alongside the casefolded one so that
//! case-sensitive rules still have something meaningful to match against.

/// Normalized views of one input text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedText {
    /// Canonical, casefolded form. All case-insensitive matching runs on this.
    pub folded: String,
    /// Same pipeline without the casefold, for case-sensitive rules.
    pub cased: String,
}

impl NormalizedText {
    pub fn is_empty(&self) -> bool {
        self.folded.is_empty()
    }
}

/// Normalize `input` for matching. `strip_accents` folds common Latin
/// diacritics (é → e) before matching; leave it off for non-Latin corpora.
pub fn normalize(input: &str, strip_accents: bool) -> NormalizedText {
    let cased = canonicalize(input, strip_accents);
    let folded = cased
        .chars()
        .flat_map(char::to_lowercase)
        .collect::<String>();
    // Lowercasing can itself create new elongation runs (e.g. "AAa").
    let folded = collapse_runs(&folded);
    NormalizedText { folded, cased }
}

fn canonicalize(input: &str, strip_accents: bool) -> String {
    // Entities may be double-encoded ("&amp;lt;"); decode until stable so a
    // second normalize pass finds nothing left to decode.
    let mut s = input.to_string();
    for _ in 0..4 {
        let decoded = html_escape::decode_html_entities(&s).to_string();
        if decoded == s {
            break;
        }
        s = decoded;
    }

    let mut out = String::with_capacity(s.len());
    for ch in s.chars() {
        if is_zero_width(ch) {
            continue;
        }
        if strip_accents {
            out.push(fold_accent(ch));
        } else {
            out.push(ch);
        }
    }

    let collapsed = collapse_runs(&out);
    collapse_whitespace(&collapsed)
}

fn is_zero_width(ch: char) -> bool {
    matches!(ch, '\u{200b}' | '\u{200c}' | '\u{200d}' | '\u{feff}')
}

/// Reduce any run of 3+ identical characters to 2 ("sooooo" → "soo",
/// "!!!!!" → "!!"). Whitespace runs are handled separately.
fn collapse_runs(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut prev: Option<char> = None;
    let mut run = 0usize;
    for ch in s.chars() {
        if Some(ch) == prev {
            run += 1;
        } else {
            prev = Some(ch);
            run = 1;
        }
        if run <= 2 || ch.is_whitespace() {
            out.push(ch);
        }
    }
    out
}

fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn fold_accent(ch: char) -> char {
    match ch {
        'á' | 'à' | 'â' | 'ä' | 'ã' | 'å' => 'a',
        'Á' | 'À' | 'Â' | 'Ä' | 'Ã' | 'Å' => 'A',
        'é' | 'è' | 'ê' | 'ë' => 'e',
        'É' | 'È' | 'Ê' | 'Ë' => 'E',
        'í' | 'ì' | 'î' | 'ï' => 'i',
        'Í' | 'Ì' | 'Î' | 'Ï' => 'I',
        'ó' | 'ò' | 'ô' | 'ö' | 'õ' => 'o',
        'Ó' | 'Ò' | 'Ô' | 'Ö' | 'Õ' => 'O',
        'ú' | 'ù' | 'û' | 'ü' => 'u',
        'Ú' | 'Ù' | 'Û' | 'Ü' => 'U',
        'ñ' => 'n',
        'Ñ' => 'N',
        'ç' => 'c',
        'Ç' => 'C',
        other => other,
    }
}
