//! Document loader: validates uploads and extracts their text.
//!
//! A document is accepted only if it identifies itself as an SRS by
//! containing one of the configured marker phrases. For PDFs the marker
//! must appear on page one. For plain text it is checked against all
//! plain text accumulated so far in the batch, so a later text file may
//! ride on an earlier one's marker.
//!
//! The batch is all-or-nothing: one bad document fails the whole call and
//! no text is returned, so callers never index a partial upload.

use tracing::{info, warn};

use crate::error::{PipelineError, PipelineResult};
use crate::extract::{self, ExtractError, MIME_PDF, MIME_TEXT};
use crate::models::UploadedDocument;

/// Extracts and concatenates the text of every document in upload order.
pub fn load_documents(docs: &[UploadedDocument], markers: &[String]) -> PipelineResult<String> {
    if docs.is_empty() {
        return Err(PipelineError::NoDocuments);
    }

    let mut text = String::new();
    let mut plain_seen = String::new();

    for doc in docs {
        let media_type = extract::normalize_media_type(&doc.media_type);
        let pages = extract::extract_pages(&doc.bytes, &media_type).map_err(|e| {
            warn!(document = %doc.name, error = %e, "document rejected");
            match e {
                ExtractError::UnsupportedContentType(media_type) => {
                    PipelineError::UnsupportedMediaType {
                        name: doc.name.clone(),
                        media_type,
                    }
                }
                other => PipelineError::Unreadable {
                    name: doc.name.clone(),
                    reason: other.to_string(),
                },
            }
        })?;

        match media_type.as_str() {
            MIME_PDF => {
                let first_page = pages.first().map(String::as_str).unwrap_or_default();
                if !contains_marker(first_page, markers) {
                    warn!(document = %doc.name, "marker phrase missing from first page");
                    return Err(PipelineError::MissingMarker {
                        name: doc.name.clone(),
                    });
                }
                for page in &pages {
                    text.push_str(page);
                }
            }
            MIME_TEXT => {
                let body = pages.concat();
                plain_seen.push_str(&body);
                plain_seen.push('\n');
                if !contains_marker(&plain_seen, markers) {
                    warn!(document = %doc.name, "marker phrase missing from text");
                    return Err(PipelineError::MissingMarker {
                        name: doc.name.clone(),
                    });
                }
                text.push_str(&body);
                text.push('\n');
            }
            _ => {
                return Err(PipelineError::UnsupportedMediaType {
                    name: doc.name.clone(),
                    media_type: media_type.clone(),
                })
            }
        }

        info!(document = %doc.name, pages = pages.len(), "document loaded");
    }

    Ok(text)
}

/// Literal, case-sensitive substring match against any non-empty marker.
pub fn contains_marker(text: &str, markers: &[String]) -> bool {
    markers
        .iter()
        .filter(|m| !m.is_empty())
        .any(|m| text.contains(m.as_str()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn markers() -> Vec<String> {
        vec![
            "Software Requirements Specification".to_string(),
            "SRS".to_string(),
        ]
    }

    fn txt(name: &str, body: &str) -> UploadedDocument {
        UploadedDocument::new(name, MIME_TEXT, body.as_bytes().to_vec())
    }

    /// Minimal PDF with one Helvetica text line per page.
    fn pdf_with_pages(pages: &[&str]) -> Vec<u8> {
        let font_id = 3;
        let page_ids: Vec<usize> = (0..pages.len()).map(|i| 4 + 2 * i).collect();
        let kids: Vec<String> = page_ids.iter().map(|id| format!("{} 0 R", id)).collect();

        let mut objects = vec![
            "<< /Type /Catalog /Pages 2 0 R >>".to_string(),
            format!(
                "<< /Type /Pages /Kids [{}] /Count {} >>",
                kids.join(" "),
                pages.len()
            ),
            "<< /Type /Font /Subtype /Type1 /BaseFont /Helvetica >>".to_string(),
        ];
        for (page_id, text) in page_ids.iter().zip(pages) {
            objects.push(format!(
                "<< /Type /Page /Parent 2 0 R /MediaBox [0 0 612 792] /Contents {} 0 R /Resources << /Font << /F1 {} 0 R >> >> >>",
                page_id + 1,
                font_id
            ));
            let stream = format!("BT /F1 12 Tf 100 700 Td ({}) Tj ET", text);
            objects.push(format!(
                "<< /Length {} >> stream\n{}\nendstream",
                stream.len(),
                stream
            ));
        }

        let mut out = Vec::new();
        out.extend_from_slice(b"%PDF-1.4\n");
        let mut offsets = Vec::new();
        for (i, body) in objects.iter().enumerate() {
            offsets.push(out.len());
            out.extend_from_slice(format!("{} 0 obj {} endobj\n", i + 1, body).as_bytes());
        }
        let xref_start = out.len();
        out.extend_from_slice(format!("xref\n0 {}\n", objects.len() + 1).as_bytes());
        out.extend_from_slice(format!("{:010} 65535 f \n", 0).as_bytes());
        for offset in offsets {
            out.extend_from_slice(format!("{:010} 00000 n \n", offset).as_bytes());
        }
        out.extend_from_slice(
            format!(
                "trailer << /Size {} /Root 1 0 R >>\nstartxref\n{}\n%%EOF\n",
                objects.len() + 1,
                xref_start
            )
            .as_bytes(),
        );
        out
    }

    fn pdf(name: &str, pages: &[&str]) -> UploadedDocument {
        UploadedDocument::new(name, MIME_PDF, pdf_with_pages(pages))
    }

    #[test]
    fn accepts_text_with_full_phrase() {
        let docs = vec![txt(
            "a.txt",
            "Software Requirements Specification\nThe cart holds items.",
        )];
        let text = load_documents(&docs, &markers()).unwrap();
        assert!(text.contains("The cart holds items."));
        assert!(text.ends_with('\n'));
    }

    #[test]
    fn accepts_text_with_abbreviation() {
        let docs = vec![txt("a.txt", "Shop SRS v2")];
        assert!(load_documents(&docs, &markers()).is_ok());
    }

    #[test]
    fn rejects_text_without_marker() {
        let docs = vec![txt("notes.txt", "Meeting notes, nothing else.")];
        let err = load_documents(&docs, &markers()).unwrap_err();
        assert!(matches!(err, PipelineError::MissingMarker { ref name } if name == "notes.txt"));
    }

    #[test]
    fn marker_check_is_case_sensitive() {
        let docs = vec![txt("a.txt", "software requirements specification, srs")];
        assert!(load_documents(&docs, &markers()).is_err());
    }

    #[test]
    fn later_text_rides_on_earlier_marker() {
        let docs = vec![txt("a.txt", "SRS part one"), txt("b.txt", "part two")];
        let text = load_documents(&docs, &markers()).unwrap();
        assert_eq!(text, "SRS part one\npart two\n");
    }

    #[test]
    fn one_bad_document_fails_whole_batch() {
        let docs = vec![
            txt("a.txt", "SRS part one"),
            UploadedDocument::new("b.docx", "application/msword", b"SRS".to_vec()),
        ];
        let err = load_documents(&docs, &markers()).unwrap_err();
        assert!(matches!(err, PipelineError::UnsupportedMediaType { .. }));
    }

    #[test]
    fn empty_upload_rejected() {
        let err = load_documents(&[], &markers()).unwrap_err();
        assert!(matches!(err, PipelineError::NoDocuments));
    }

    #[test]
    fn unreadable_pdf_reported() {
        let docs = vec![UploadedDocument::new(
            "broken.pdf",
            MIME_PDF,
            b"not a pdf".to_vec(),
        )];
        let err = load_documents(&docs, &markers()).unwrap_err();
        assert!(matches!(err, PipelineError::Unreadable { .. }));
    }

    #[test]
    fn pdf_marker_on_first_page_accepts_all_pages() {
        let docs = vec![pdf("srs.pdf", &["Shop SRS v1", "Checkout requires login"])];
        let text = load_documents(&docs, &markers()).unwrap();
        assert!(text.contains("Shop SRS v1"));
        assert!(text.contains("Checkout requires login"));
    }

    #[test]
    fn pdf_marker_only_on_second_page_rejected() {
        let docs = vec![pdf("late.pdf", &["Checkout requires login", "Shop SRS v1"])];
        let err = load_documents(&docs, &markers()).unwrap_err();
        assert!(matches!(err, PipelineError::MissingMarker { ref name } if name == "late.pdf"));
    }

    #[test]
    fn custom_markers_respected() {
        let docs = vec![txt("a.txt", "Product Requirements Document")];
        let custom = vec!["Product Requirements".to_string()];
        assert!(load_documents(&docs, &custom).is_ok());
        assert!(load_documents(&docs, &markers()).is_err());
    }
}
