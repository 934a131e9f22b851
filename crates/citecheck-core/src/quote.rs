//! Quote verification under the permitted-alteration grammar.
//!
//! Compares a quoted span against retrieved source text character by
//! character, tolerating only the documented alterations:
//!
//! - Bracketed substitutions: `[T]he` matches `the` (single-letter brackets
//!   compare case-insensitively); longer or empty bracket content stands in
//!   for unknown original material and matches like a gap.
//! - Elisions: a spaced three-dot run (`. . .`) or its unspaced form (`...`)
//!   is a wildcard gap. The four-dot forms (`. . . .` / `....`) additionally
//!   signal that sentence-boundary material was omitted.
//!
//! The comparator makes no judgment about where an elision is *legal* —
//! leading/trailing boundary legality is rule data evaluated by the
//! deterministic validator, not logic baked in here. Anything outside a
//! declared alteration must match exactly; the first divergence is reported.
//!
//! # Normalisation
//!
//! Before comparison both sides have curly quotation marks mapped to their
//! straight forms and whitespace runs (including newlines) collapsed to
//! single spaces. Nothing else is normalised.

use serde::{Deserialize, Serialize};

/// Result of verifying one quoted span.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuoteMatch {
    pub matched: bool,
    /// First divergence point, present when `matched` is false.
    pub diff: Option<String>,
}

/// Which elision form appeared.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EllipsisForm {
    ThreeDot,
    FourDot,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum GapOrigin {
    Substitution,
    Ellipsis(EllipsisForm),
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Elem {
    /// Exact character run.
    Lit(Vec<char>),
    /// Single bracketed letter — matches the source letter in either case.
    CaseChar(char),
    /// Wildcard over source characters.
    Gap(GapOrigin),
}

/// Verify a quoted span against source text.
///
/// The span must occur *within* the source (the source may extend on either
/// side); declared alterations are honoured, everything else must match
/// character-exact after normalisation.
pub fn verify_quote(quoted: &str, source: &str) -> QuoteMatch {
    let elems = parse_alterations(&normalize(quoted));
    let src: Vec<char> = normalize(source).chars().collect();

    if elems.is_empty() {
        return QuoteMatch {
            matched: true,
            diff: None,
        };
    }

    let mut deepest: Option<Divergence> = None;
    for start in 0..=src.len() {
        if try_match(&elems, 0, &src, start, 0, &mut deepest) {
            return QuoteMatch {
                matched: true,
                diff: None,
            };
        }
    }

    let diff = deepest
        .map(|d| d.render(&src))
        .unwrap_or_else(|| "quoted text not found in source".to_string());
    QuoteMatch {
        matched: false,
        diff: Some(diff),
    }
}

/// Elision form at the very start of a quoted span, if any.
pub fn leading_ellipsis(quoted: &str) -> Option<EllipsisForm> {
    match parse_alterations(&normalize(quoted)).first() {
        Some(Elem::Gap(GapOrigin::Ellipsis(form))) => Some(*form),
        _ => None,
    }
}

/// Elision form at the very end of a quoted span, if any.
pub fn trailing_ellipsis(quoted: &str) -> Option<EllipsisForm> {
    match parse_alterations(&normalize(quoted)).last() {
        Some(Elem::Gap(GapOrigin::Ellipsis(form))) => Some(*form),
        _ => None,
    }
}

// ── Normalisation ──

fn normalize(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut in_space = true; // swallows leading whitespace
    for c in s.chars() {
        let c = match c {
            '\u{2018}' | '\u{2019}' => '\'',
            '\u{201C}' | '\u{201D}' => '"',
            other => other,
        };
        if c.is_whitespace() {
            if !in_space {
                out.push(' ');
                in_space = true;
            }
        } else {
            out.push(c);
            in_space = false;
        }
    }
    while out.ends_with(' ') {
        out.pop();
    }
    out
}

// ── Alteration parsing ──

fn parse_alterations(quoted: &str) -> Vec<Elem> {
    let chars: Vec<char> = quoted.chars().collect();
    let mut elems: Vec<Elem> = Vec::new();
    let mut lit: Vec<char> = Vec::new();
    let mut i = 0;

    let flush = |lit: &mut Vec<char>, elems: &mut Vec<Elem>| {
        if !lit.is_empty() {
            elems.push(Elem::Lit(std::mem::take(lit)));
        }
    };

    while i < chars.len() {
        if chars[i] == '[' {
            if let Some(close) = chars[i + 1..].iter().position(|&c| c == ']') {
                let inner: Vec<char> = chars[i + 1..i + 1 + close].to_vec();
                flush(&mut lit, &mut elems);
                if inner.len() == 1 && inner[0].is_alphabetic() {
                    elems.push(Elem::CaseChar(inner[0]));
                } else {
                    elems.push(Elem::Gap(GapOrigin::Substitution));
                }
                i += close + 2;
                continue;
            }
            // Unclosed bracket: literal.
        }
        if let Some((form, len)) = ellipsis_at(&chars, i) {
            // The space before the dots (already in `lit`) and after them
            // stay literal; only the dot run itself becomes the gap.
            flush(&mut lit, &mut elems);
            elems.push(Elem::Gap(GapOrigin::Ellipsis(form)));
            i += len;
            continue;
        }
        lit.push(chars[i]);
        i += 1;
    }
    flush(&mut lit, &mut elems);
    elems
}

/// Recognise an elision starting at `i`. Dots must sit at a word boundary:
/// preceded by start-of-span or a space, followed by end-of-span or a space.
fn ellipsis_at(chars: &[char], i: usize) -> Option<(EllipsisForm, usize)> {
    if chars[i] != '.' {
        return None;
    }
    if i > 0 && chars[i - 1] != ' ' {
        return None;
    }
    // Longest form first so `. . . .` is not read as `. . .` plus a dot.
    const FORMS: [(&str, EllipsisForm); 4] = [
        (". . . .", EllipsisForm::FourDot),
        ("....", EllipsisForm::FourDot),
        (". . .", EllipsisForm::ThreeDot),
        ("...", EllipsisForm::ThreeDot),
    ];
    for (form_str, form) in FORMS {
        let pat: Vec<char> = form_str.chars().collect();
        if chars[i..].starts_with(&pat) {
            let end = i + pat.len();
            if end == chars.len() || chars[end] == ' ' {
                return Some((form, pat.len()));
            }
        }
    }
    None
}

// ── Matching ──

#[derive(Debug, Clone)]
struct Divergence {
    /// Quoted characters successfully matched before diverging. The
    /// divergence reported to the user is the one with the most progress,
    /// not the one deepest into the source, so a start offset near the end
    /// of the source cannot shadow the real mismatch point.
    progress: usize,
    src_idx: usize,
    expected: String,
    source_ended: bool,
}

impl Divergence {
    fn render(&self, src: &[char]) -> String {
        if self.source_ended {
            return format!(
                "source ended at offset {} while expecting '{}'",
                self.src_idx, self.expected
            );
        }
        let window_end = (self.src_idx + 12).min(src.len());
        let found: String = src[self.src_idx..window_end].iter().collect();
        format!(
            "expected '{}' at source offset {}, found '{}'",
            self.expected, self.src_idx, found
        )
    }
}

fn note_divergence(deepest: &mut Option<Divergence>, d: Divergence) {
    let deeper = match deepest {
        Some(existing) => {
            (d.progress, d.src_idx) > (existing.progress, existing.src_idx)
        }
        None => true,
    };
    if deeper {
        *deepest = Some(d);
    }
}

fn try_match(
    elems: &[Elem],
    ei: usize,
    src: &[char],
    si: usize,
    done: usize,
    deepest: &mut Option<Divergence>,
) -> bool {
    let Some(elem) = elems.get(ei) else {
        // All quoted material consumed; trailing source is fine.
        return true;
    };

    match elem {
        Elem::Lit(lit) => {
            for (k, &expected) in lit.iter().enumerate() {
                match src.get(si + k) {
                    Some(&found) if found == expected => {}
                    Some(_) => {
                        note_divergence(
                            deepest,
                            Divergence {
                                progress: done + k,
                                src_idx: si + k,
                                expected: window(lit, k),
                                source_ended: false,
                            },
                        );
                        return false;
                    }
                    None => {
                        note_divergence(
                            deepest,
                            Divergence {
                                progress: done + k,
                                src_idx: si + k,
                                expected: window(lit, k),
                                source_ended: true,
                            },
                        );
                        return false;
                    }
                }
            }
            try_match(elems, ei + 1, src, si + lit.len(), done + lit.len(), deepest)
        }
        Elem::CaseChar(c) => match src.get(si) {
            Some(&found)
                if found == *c
                    || found.to_lowercase().eq(c.to_lowercase())
                    || found.to_uppercase().eq(c.to_uppercase()) =>
            {
                try_match(elems, ei + 1, src, si + 1, done + 1, deepest)
            }
            Some(_) => {
                note_divergence(
                    deepest,
                    Divergence {
                        progress: done,
                        src_idx: si,
                        expected: format!("[{c}]"),
                        source_ended: false,
                    },
                );
                false
            }
            None => {
                note_divergence(
                    deepest,
                    Divergence {
                        progress: done,
                        src_idx: si,
                        expected: format!("[{c}]"),
                        source_ended: true,
                    },
                );
                false
            }
        },
        Elem::Gap(_) => {
            // Shortest consumption first.
            for skip in 0..=src.len().saturating_sub(si) {
                if try_match(elems, ei + 1, src, si + skip, done, deepest) {
                    return true;
                }
            }
            false
        }
    }
}

/// A short expected-text window starting at literal offset `k`.
fn window(lit: &[char], k: usize) -> String {
    let end = (k + 12).min(lit.len());
    lit[k..end].iter().collect()
}
