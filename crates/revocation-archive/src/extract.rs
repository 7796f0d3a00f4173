//! Pull record links out of the entry page with CSS selectors.

use scraper::{Html, Selector};

use crate::types::{ArchiveError, ArchiveResult, RecordDescriptor};

/// An `<a>` inside a list item: rendered text plus raw `href`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Anchor {
    pub display_text: String,
    pub href: String,
}

/// Finds list-item links whose markup contains a keyphrase.
#[derive(Debug, Clone)]
pub struct RecordExtractor {
    keyphrase: String,
    min_records: usize,
}

impl RecordExtractor {
    pub fn new(keyphrase: impl Into<String>, min_records: usize) -> Self {
        Self {
            keyphrase: keyphrase.into(),
            min_records,
        }
    }

    /// Matching anchors in document order.
    ///
    /// Fewer than `min_records` matches means the page layout changed and is
    /// an error, never a partial result.
    pub fn extract(&self, html: &str) -> ArchiveResult<Vec<Anchor>> {
        let anchors = find_anchors(html, &self.keyphrase);
        if anchors.len() < self.min_records {
            return Err(ArchiveError::ExtractionShape {
                found: anchors.len(),
                required: self.min_records,
            });
        }
        tracing::info!("found {} records matching {:?}", anchors.len(), self.keyphrase);
        Ok(anchors)
    }
}

/// `li a[href]` elements whose outer HTML contains `keyphrase`.
pub fn find_anchors(html: &str, keyphrase: &str) -> Vec<Anchor> {
    let document = Html::parse_document(html);
    let Ok(sel) = Selector::parse("li a[href]") else {
        return Vec::new();
    };

    document
        .select(&sel)
        .filter(|a| a.html().contains(keyphrase))
        .filter_map(|a| {
            let href = a.value().attr("href")?.to_string();
            // leading text node is the display name; fall back to all text
            let display_text = a
                .children()
                .next()
                .and_then(|n| n.value().as_text().map(|t| String::from(&**t)))
                .filter(|t| !t.trim().is_empty())
                .unwrap_or_else(|| a.text().collect::<String>());
            Some(Anchor {
                display_text: display_text.trim().to_string(),
                href,
            })
        })
        .collect()
}

/// Document `<title>`, if present and non-blank.
pub fn page_title(html: &str) -> Option<String> {
    let document = Html::parse_document(html);
    let sel = Selector::parse("title").ok()?;
    let title: String = document.select(&sel).next()?.text().collect();
    let title = title.trim();
    (!title.is_empty()).then(|| title.to_string())
}

/// Turn anchors into descriptors rooted at `domain`.
pub fn unpack_descriptors(domain: &str, anchors: &[Anchor]) -> ArchiveResult<Vec<RecordDescriptor>> {
    anchors
        .iter()
        .map(|a| RecordDescriptor::new(domain, &a.display_text, &a.href))
        .collect()
}
