//! PDF text extraction with backend fallback.
//!
//! Extraction never silently returns empty text. Each [`PdfBackend`] is tried
//! in order; a backend that errors, panics, or yields only whitespace counts
//! as failed and the next one runs. When every backend fails the caller gets
//! [`KnowledgeError::UnreadablePdf`] naming each failure.
//!
//! | Order | Backend | Crate |
//! |-------|---------|-------|
//! | 1 | [`PdfExtractBackend`] | `pdf-extract` |
//! | 2 | [`LopdfBackend`] | `lopdf` |

use std::panic::{catch_unwind, AssertUnwindSafe};

use anyhow::{bail, Result};
use lopdf::{Document, Object};
use persona_harness_core::models::{PageMap, PageSpan};
use persona_harness_core::KnowledgeError;
use serde::Serialize;
use tracing::{debug, warn};

/// Pages are joined with this separator in [`Extraction::text`].
pub const PAGE_SEPARATOR: &str = "\n\n";

/// Metadata read from the PDF alongside the text.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DocMetadata {
    pub title: Option<String>,
    pub author: Option<String>,
    pub page_count: usize,
    /// Name of the backend that produced the text.
    pub backend: String,
}

/// Cleaned document text plus the char range of every page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Extraction {
    pub text: String,
    pub page_map: PageMap,
    pub metadata: DocMetadata,
}

/// A strategy for turning PDF bytes into per-page text.
pub trait PdfBackend: Send + Sync {
    fn name(&self) -> &'static str;

    /// Raw text of each page, in page order.
    fn try_extract(&self, bytes: &[u8]) -> Result<Vec<String>>;
}

pub struct PdfExtractBackend;

impl PdfBackend for PdfExtractBackend {
    fn name(&self) -> &'static str {
        "pdf-extract"
    }

    fn try_extract(&self, bytes: &[u8]) -> Result<Vec<String>> {
        pdf_extract::extract_text_from_mem_by_pages(bytes).map_err(|e| anyhow::anyhow!("{}", e))
    }
}

pub struct LopdfBackend;

impl PdfBackend for LopdfBackend {
    fn name(&self) -> &'static str {
        "lopdf"
    }

    fn try_extract(&self, bytes: &[u8]) -> Result<Vec<String>> {
        let doc = Document::load_mem(bytes)?;
        if doc.is_encrypted() {
            bail!("document is encrypted");
        }
        let mut pages = Vec::new();
        for page_number in doc.get_pages().keys() {
            pages.push(doc.extract_text(&[*page_number])?);
        }
        Ok(pages)
    }
}

/// Ordered backend list plus the size ceiling.
pub struct Extractor {
    backends: Vec<Box<dyn PdfBackend>>,
    max_bytes: usize,
}

impl Extractor {
    /// The default backend chain with a `max_bytes` ceiling.
    pub fn new(max_bytes: usize) -> Self {
        Self::with_backends(
            vec![Box::new(PdfExtractBackend), Box::new(LopdfBackend)],
            max_bytes,
        )
    }

    pub fn with_backends(backends: Vec<Box<dyn PdfBackend>>, max_bytes: usize) -> Self {
        Self {
            backends,
            max_bytes,
        }
    }

    pub fn max_bytes(&self) -> usize {
        self.max_bytes
    }

    pub fn extract(&self, bytes: &[u8]) -> Result<Extraction, KnowledgeError> {
        if bytes.len() > self.max_bytes {
            return Err(KnowledgeError::FileTooLarge {
                size: bytes.len(),
                limit: self.max_bytes,
            });
        }
        if !looks_like_pdf(bytes) {
            return Err(KnowledgeError::UnreadablePdf {
                reason: "missing %PDF- header".to_string(),
            });
        }

        let mut failures = Vec::new();
        for backend in &self.backends {
            match run_backend(backend.as_ref(), bytes) {
                Ok(pages) => {
                    let (title, author) = read_info(bytes);
                    let (text, page_map) = assemble_pages(&pages);
                    debug!(
                        backend = backend.name(),
                        pages = pages.len(),
                        chars = text.chars().count(),
                        "extracted pdf text"
                    );
                    return Ok(Extraction {
                        text,
                        metadata: DocMetadata {
                            title,
                            author,
                            page_count: pages.len(),
                            backend: backend.name().to_string(),
                        },
                        page_map,
                    });
                }
                Err(e) => {
                    warn!(backend = backend.name(), error = %e, "pdf backend failed");
                    failures.push(format!("{}: {}", backend.name(), e));
                }
            }
        }

        Err(KnowledgeError::UnreadablePdf {
            reason: if failures.is_empty() {
                "no extraction backend configured".to_string()
            } else {
                failures.join("; ")
            },
        })
    }
}

/// Extract with the default backend chain.
pub fn extract(bytes: &[u8], max_bytes: usize) -> Result<Extraction, KnowledgeError> {
    Extractor::new(max_bytes).extract(bytes)
}

fn looks_like_pdf(bytes: &[u8]) -> bool {
    let start = bytes
        .iter()
        .position(|b| !b.is_ascii_whitespace())
        .unwrap_or(bytes.len());
    bytes[start..].starts_with(b"%PDF-")
}

/// Run one backend, treating a panic or all-blank output as failure.
fn run_backend(backend: &dyn PdfBackend, bytes: &[u8]) -> Result<Vec<String>> {
    let pages = match catch_unwind(AssertUnwindSafe(|| backend.try_extract(bytes))) {
        Ok(result) => result?,
        Err(_) => bail!("backend panicked"),
    };
    if pages.iter().all(|p| p.trim().is_empty()) {
        bail!("no text found");
    }
    Ok(pages)
}

/// Clean each page and join them, recording page char ranges.
fn assemble_pages(pages: &[String]) -> (String, PageMap) {
    let mut text = String::new();
    let mut spans = Vec::with_capacity(pages.len());
    let mut offset = 0usize;
    for (i, raw) in pages.iter().enumerate() {
        if i > 0 {
            text.push_str(PAGE_SEPARATOR);
            offset += PAGE_SEPARATOR.chars().count();
        }
        let cleaned = clean_page(raw);
        let len = cleaned.chars().count();
        spans.push(PageSpan {
            page: i as u32 + 1,
            start: offset,
            end: offset + len,
        });
        text.push_str(&cleaned);
        offset += len;
    }
    (text, PageMap::new(spans))
}

/// Collapse whitespace runs and drop control characters.
fn clean_page(raw: &str) -> String {
    raw.split_whitespace()
        .map(|word| word.chars().filter(|c| !c.is_control()).collect::<String>())
        .filter(|word| !word.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Title and author from the document information dictionary.
fn read_info(bytes: &[u8]) -> (Option<String>, Option<String>) {
    let read = || -> Option<(Option<String>, Option<String>)> {
        let doc = Document::load_mem(bytes).ok()?;
        let info = match doc.trailer.get(b"Info").ok()? {
            Object::Reference(id) => doc.get_object(*id).ok()?.as_dict().ok()?,
            Object::Dictionary(dict) => dict,
            _ => return None,
        };
        let field = |key: &[u8]| {
            info.get(key)
                .ok()
                .and_then(decode_pdf_string)
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
        };
        Some((field(b"Title"), field(b"Author")))
    };
    catch_unwind(AssertUnwindSafe(read))
        .ok()
        .flatten()
        .unwrap_or((None, None))
}

/// Decode a PDF text string (UTF-16BE with BOM, otherwise byte text).
fn decode_pdf_string(obj: &Object) -> Option<String> {
    let Object::String(bytes, _) = obj else {
        return None;
    };
    if let Some(rest) = bytes.strip_prefix(&[0xFE, 0xFF]) {
        let units: Vec<u16> = rest
            .chunks_exact(2)
            .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
            .collect();
        Some(String::from_utf16_lossy(&units))
    } else {
        Some(String::from_utf8_lossy(bytes).into_owned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Fixed(Vec<&'static str>);

    impl PdfBackend for Fixed {
        fn name(&self) -> &'static str {
            "fixed"
        }
        fn try_extract(&self, _bytes: &[u8]) -> Result<Vec<String>> {
            Ok(self.0.iter().map(|s| s.to_string()).collect())
        }
    }

    struct Failing;

    impl PdfBackend for Failing {
        fn name(&self) -> &'static str {
            "failing"
        }
        fn try_extract(&self, _bytes: &[u8]) -> Result<Vec<String>> {
            bail!("cannot parse")
        }
    }

    struct Panicking;

    impl PdfBackend for Panicking {
        fn name(&self) -> &'static str {
            "panicking"
        }
        fn try_extract(&self, _bytes: &[u8]) -> Result<Vec<String>> {
            panic!("malformed font table")
        }
    }

    const HEADER: &[u8] = b"%PDF-1.4\n";

    #[test]
    fn oversize_input_rejected_before_parsing() {
        let bytes = vec![b'x'; 11];
        let err = extract(&bytes, 10).unwrap_err();
        assert_eq!(err, KnowledgeError::FileTooLarge { size: 11, limit: 10 });
    }

    #[test]
    fn non_pdf_rejected() {
        let err = extract(b"hello, not a pdf", 1024).unwrap_err();
        assert!(matches!(err, KnowledgeError::UnreadablePdf { .. }));
    }

    #[test]
    fn truncated_pdf_is_unreadable() {
        let err = extract(b"%PDF-1.4\n1 0 obj << /Type", 1024).unwrap_err();
        match err {
            KnowledgeError::UnreadablePdf { reason } => {
                assert!(reason.contains("pdf-extract"));
                assert!(reason.contains("lopdf"));
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn falls_back_past_failing_and_panicking_backends() {
        let extractor = Extractor::with_backends(
            vec![
                Box::new(Failing),
                Box::new(Panicking),
                Box::new(Fixed(vec!["page one"])),
            ],
            1024,
        );
        let out = extractor.extract(HEADER).unwrap();
        assert_eq!(out.text, "page one");
        assert_eq!(out.metadata.backend, "fixed");
    }

    #[test]
    fn blank_output_counts_as_failure() {
        let extractor =
            Extractor::with_backends(vec![Box::new(Fixed(vec!["  ", "\n\t"]))], 1024);
        assert!(matches!(
            extractor.extract(HEADER),
            Err(KnowledgeError::UnreadablePdf { .. })
        ));
    }

    #[test]
    fn pages_are_cleaned_and_mapped() {
        let extractor = Extractor::with_backends(
            vec![Box::new(Fixed(vec!["Alpha  beta\n", "", "gamma\u{7}\tdelta"]))],
            1024,
        );
        let out = extractor.extract(HEADER).unwrap();
        assert_eq!(out.text, "Alpha beta\n\n\n\ngamma delta");
        assert_eq!(out.metadata.page_count, 3);
        let spans = &out.page_map.spans;
        assert_eq!((spans[0].start, spans[0].end), (0, 10));
        assert_eq!((spans[1].start, spans[1].end), (12, 12));
        assert_eq!((spans[2].start, spans[2].end), (14, 25));
        let third: String = out.text.chars().skip(14).take(11).collect();
        assert_eq!(third, "gamma delta");
    }

    #[test]
    fn leading_whitespace_before_header_is_accepted() {
        assert!(looks_like_pdf(b"\r\n %PDF-1.7"));
        assert!(!looks_like_pdf(b"PDF-1.7"));
    }

    #[test]
    fn utf16_info_strings_decode() {
        let obj = Object::String(vec![0xFE, 0xFF, 0x00, 0x48, 0x00, 0x69], lopdf::StringFormat::Literal);
        assert_eq!(decode_pdf_string(&obj).as_deref(), Some("Hi"));
    }
}
