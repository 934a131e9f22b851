//! Citation and footnote types shared across the validation pipeline.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Structural class of a citation, assigned by the parser.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CitationKind {
    Case,
    Statute,
    Book,
    Periodical,
    Unpublished,
    Foreign,
    Treaty,
    /// Unclassifiable — only format-intactness checks apply.
    Other,
}

impl CitationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Case => "case",
            Self::Statute => "statute",
            Self::Book => "book",
            Self::Periodical => "periodical",
            Self::Unpublished => "unpublished",
            Self::Foreign => "foreign",
            Self::Treaty => "treaty",
            Self::Other => "other",
        }
    }
}

/// A quotation-mark-delimited span found in the prose surrounding a footnote.
///
/// Spans come from the surrounding text, not from the citation string itself.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuoteSpan {
    /// Position of this span among the footnote's quoted spans, 0-based.
    pub index: usize,
    pub text: String,
}

/// One already-extracted footnote tuple handed to the engine.
///
/// Manuscript/PDF extraction is an external collaborator's job; the engine
/// only ever sees these records.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FootnoteRecord {
    pub footnote_number: u32,
    pub citation_text: String,
    /// Prose context around the footnote marker, used for quote-span and
    /// proposition extraction.
    #[serde(default)]
    pub surrounding_text: String,
    /// Source text retrieved for this citation, when available.
    #[serde(default)]
    pub source_excerpt: Option<String>,
}

/// A parsed citation. Immutable after parsing; downstream stages attach
/// findings rather than mutate the citation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Citation {
    /// Stable identifier, derived from the footnote number.
    pub id: String,
    pub footnote_number: u32,
    pub raw_text: String,
    pub kind: CitationKind,
    /// Extracted components, e.g. `party_first`, `reporter`, `year`.
    pub components: BTreeMap<String, String>,
    pub quoted_spans: Vec<QuoteSpan>,
    /// The proposition the citation is attached to, when one was extracted.
    pub proposition: Option<String>,
    pub source_excerpt: Option<String>,
}

impl Citation {
    /// Identifier for a citation at the given footnote number.
    pub fn id_for(footnote_number: u32) -> String {
        format!("fn-{footnote_number}")
    }

    /// Names of the elements this citation actually carries, for rule
    /// scope matching. Always includes `"format"`.
    pub fn elements(&self) -> Vec<&str> {
        let mut elems: Vec<&str> = vec!["format"];
        elems.extend(self.components.keys().map(String::as_str));
        if !self.quoted_spans.is_empty() {
            elems.push("quotation");
        }
        elems
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_round_trips_through_json() {
        let json = serde_json::to_string(&CitationKind::Periodical).unwrap();
        assert_eq!(json, "\"periodical\"");
        let parsed: CitationKind = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, CitationKind::Periodical);
    }

    #[test]
    fn footnote_record_defaults() {
        let json = r#"{"footnote_number": 7, "citation_text": "Smith v. Jones"}"#;
        let rec: FootnoteRecord = serde_json::from_str(json).unwrap();
        assert_eq!(rec.footnote_number, 7);
        assert!(rec.surrounding_text.is_empty());
        assert!(rec.source_excerpt.is_none());
    }

    #[test]
    fn elements_include_format_and_components() {
        let mut components = BTreeMap::new();
        components.insert("reporter".to_string(), "U.S.".to_string());
        let citation = Citation {
            id: Citation::id_for(3),
            footnote_number: 3,
            raw_text: "Smith v. Jones, 100 U.S. 1 (1980)".into(),
            kind: CitationKind::Case,
            components,
            quoted_spans: vec![QuoteSpan {
                index: 0,
                text: "erred".into(),
            }],
            proposition: None,
            source_excerpt: None,
        };
        let elems = citation.elements();
        assert!(elems.contains(&"format"));
        assert!(elems.contains(&"reporter"));
        assert!(elems.contains(&"quotation"));
    }
}
