//! Citation parsing and classification.
//!
//! Layered strategy: structural regexes for the known citation shapes first,
//! then a keyword heuristic when no structure matches, and finally
//! `CitationKind::Other` with the raw text kept verbatim. Parsing never
//! fails — unclassifiable text still flows through the deterministic
//! format checks downstream.
//!
//! Quote spans are taken from the prose surrounding the footnote, not from
//! the citation string itself.

use std::collections::BTreeMap;

use regex::Regex;
use tracing::debug;

use citecheck_core::{Citation, CitationKind, FootnoteRecord, QuoteSpan};

/// Layered citation classifier. Build once, reuse across the run.
pub struct CitationParser {
    case: Regex,
    statute: Regex,
    periodical: Regex,
    book: Regex,
    unpublished: Regex,
    supra: Regex,
}

impl Default for CitationParser {
    fn default() -> Self {
        Self::new()
    }
}

impl CitationParser {
    pub fn new() -> Self {
        // Static patterns, known-valid.
        let compile = |p: &str| Regex::new(p).expect("static citation pattern");
        Self {
            case: compile(
                r"^(?P<first>[^,]+?)\s+v\.\s+(?P<second>[^,]+?),\s+(?P<volume>\d+)\s+(?P<reporter>[A-Z][\w.' ]*?)\s+(?P<page>\d+)(?:,\s*\d+(?:-\d+)?)?\s*\((?P<paren>[^)]*?(?P<year>\d{4}))\)",
            ),
            statute: compile(
                r"(?:(?P<title>\d+)\s+)?(?P<code>U\.S\.C\.|C\.F\.R\.|Stat\.)\s*§{1,2}?\s*(?P<section>[\w.()-]+)?",
            ),
            periodical: compile(
                r"(?P<volume>\d+)\s+(?P<journal>[A-Z][\w.'& ]*?(?:L\. Rev\.|L\.J\.|J\.|Rev\.))\s+(?P<page>\d+)(?:,\s*\d+(?:-\d+)?)?\s*\((?P<year>\d{4})\)",
            ),
            book: compile(
                r"^(?P<author>[^,]+),\s+(?P<title>[^,(]+?)\s*\((?:[^)]*?\s)?(?P<year>\d{4})\)$",
            ),
            unpublished: compile(r"No\.\s+[\w:-]+.*?\d{4}\s+WL\s+\d+|slip op\."),
            supra: compile(r"(?P<referent>^[^,]+?),?\s+supra(?:\s+note\s+(?P<note>\d+))?"),
        }
    }

    /// Parse one extracted footnote tuple into a typed citation.
    ///
    /// Never errors: total classification failure yields `Other` with the
    /// raw text recorded verbatim.
    pub fn parse(&self, record: &FootnoteRecord) -> Citation {
        let raw = record.citation_text.trim().to_string();
        let (kind, components) = self.classify(&raw);
        debug!(
            footnote = record.footnote_number,
            kind = kind.as_str(),
            "citation classified"
        );

        let surrounding = record.surrounding_text.trim();
        Citation {
            id: Citation::id_for(record.footnote_number),
            footnote_number: record.footnote_number,
            raw_text: raw,
            kind,
            components,
            quoted_spans: extract_quote_spans(surrounding),
            proposition: (!surrounding.is_empty()).then(|| surrounding.to_string()),
            source_excerpt: record.source_excerpt.clone(),
        }
    }

    fn classify(&self, raw: &str) -> (CitationKind, BTreeMap<String, String>) {
        let mut components = BTreeMap::new();

        // Short forms carry a marker component; their kind stays `Other`
        // since the referent's kind cannot be recovered from the short form.
        if raw.starts_with("Id.") || raw.starts_with("id.") {
            components.insert("short_form".into(), "id".into());
            return (CitationKind::Other, components);
        }
        if let Some(caps) = self.supra.captures(raw) {
            components.insert("short_form".into(), "supra".into());
            if let Some(referent) = caps.name("referent") {
                components.insert("referent".into(), referent.as_str().trim().into());
            }
            if let Some(note) = caps.name("note") {
                components.insert("supra_note".into(), note.as_str().into());
            }
            return (CitationKind::Other, components);
        }

        // Layer 1: structural patterns.
        if let Some(caps) = self.case.captures(raw) {
            for name in ["first", "second", "volume", "reporter", "page", "year"] {
                if let Some(m) = caps.name(name) {
                    let key = match name {
                        "first" => "party_first",
                        "second" => "party_second",
                        other => other,
                    };
                    components.insert(key.into(), m.as_str().trim().into());
                }
            }
            return (CitationKind::Case, components);
        }
        if raw.contains("U.N.T.S.") || raw.contains("T.I.A.S.") || raw.contains("U.S.T.") {
            if let Some(year) = find_year(raw) {
                components.insert("year".into(), year);
            }
            return (CitationKind::Treaty, components);
        }
        if self.unpublished.is_match(raw) {
            return (CitationKind::Unpublished, components);
        }
        if let Some(caps) = self.statute.captures(raw) {
            if caps.name("section").is_some() || raw.contains('§') {
                for name in ["title", "code", "section"] {
                    if let Some(m) = caps.name(name) {
                        components.insert(name.into(), m.as_str().into());
                    }
                }
                if let Some(year) = find_year(raw) {
                    components.insert("year".into(), year);
                }
                return (CitationKind::Statute, components);
            }
        }
        if let Some(caps) = self.periodical.captures(raw) {
            for name in ["volume", "journal", "page", "year"] {
                if let Some(m) = caps.name(name) {
                    components.insert(name.into(), m.as_str().trim().into());
                }
            }
            return (CitationKind::Periodical, components);
        }
        if is_foreign(raw) {
            if let Some(year) = find_year(raw) {
                components.insert("year".into(), year);
            }
            return (CitationKind::Foreign, components);
        }
        if let Some(caps) = self.book.captures(raw) {
            for name in ["author", "title", "year"] {
                if let Some(m) = caps.name(name) {
                    components.insert(name.into(), m.as_str().trim().into());
                }
            }
            return (CitationKind::Book, components);
        }

        // Layer 2: keyword heuristics over whatever structure is present.
        components.clear();
        if raw.contains(" v. ") {
            return (CitationKind::Case, components);
        }
        if raw.contains("U.S.C.") || raw.contains('§') || raw.contains("Stat.") {
            return (CitationKind::Statute, components);
        }
        if raw.contains("L. Rev.") || (raw.contains("J.") && raw.contains('(')) {
            return (CitationKind::Periodical, components);
        }

        // Layer 3: unclassifiable.
        (CitationKind::Other, components)
    }
}

fn is_foreign(raw: &str) -> bool {
    const MARKERS: [&str; 7] = [
        "EWCA", "EWHC", "UKSC", "UKHL", "All E.R.", "E.C.R.", "A.C.",
    ];
    MARKERS.iter().any(|m| raw.contains(m))
}

fn find_year(raw: &str) -> Option<String> {
    // First four-digit run that looks like a plausible year.
    let bytes = raw.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i].is_ascii_digit() {
            let start = i;
            while i < bytes.len() && bytes[i].is_ascii_digit() {
                i += 1;
            }
            if i - start == 4 {
                let year = &raw[start..i];
                if year.starts_with("1") || year.starts_with("2") {
                    return Some(year.to_string());
                }
            }
        } else {
            i += 1;
        }
    }
    None
}

/// Extract quotation-mark-delimited spans from the prose around a footnote.
/// Both straight and curly double quotes are recognised.
pub fn extract_quote_spans(surrounding: &str) -> Vec<QuoteSpan> {
    let mut spans = Vec::new();
    let chars: Vec<char> = surrounding.chars().collect();
    let mut i = 0;
    while i < chars.len() {
        let close = match chars[i] {
            '"' => Some('"'),
            '\u{201C}' => Some('\u{201D}'),
            _ => None,
        };
        if let Some(close) = close {
            if let Some(end) = chars[i + 1..].iter().position(|&c| c == close) {
                let text: String = chars[i + 1..i + 1 + end].iter().collect();
                let text = text.trim();
                if !text.is_empty() {
                    spans.push(QuoteSpan {
                        index: spans.len(),
                        text: text.to_string(),
                    });
                }
                i += end + 2;
                continue;
            }
        }
        i += 1;
    }
    spans
}
