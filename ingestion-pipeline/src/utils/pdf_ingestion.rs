use async_trait::async_trait;
use bytes::Bytes;
use lopdf::Document;
use tracing::debug;

use common::error::AppError;

use super::text_extraction::TextExtractor;

const PDF_MAGIC: &[u8] = b"%PDF-";

/// Extracts the text layer of a PDF with `pdf-extract`, after `lopdf` has confirmed the
/// bytes form a readable, unencrypted document.
#[derive(Debug, Default, Clone, Copy)]
pub struct PdfTextExtractor;

#[async_trait]
impl TextExtractor for PdfTextExtractor {
    async fn extract(&self, document: Bytes) -> Result<String, AppError> {
        if !looks_like_pdf(&document) {
            return Err(AppError::Extraction(
                "Uploaded file is not a PDF document".into(),
            ));
        }

        let pages = inspect_structure(document.clone()).await?;

        let text = tokio::task::spawn_blocking(move || {
            pdf_extract::extract_text_from_mem(&document)
        })
        // pdf-extract panics on some malformed content streams.
        .await
        .map_err(|err| AppError::Extraction(format!("PDF text layer could not be read: {err}")))?
        .map_err(|err| AppError::Extraction(format!("Failed to extract text from PDF: {err}")))?;

        let text = normalize_text(&text);
        debug!(pages, text_chars = text.chars().count(), "pdf text extracted");

        Ok(text)
    }
}

fn looks_like_pdf(bytes: &[u8]) -> bool {
    // The header may be preceded by junk bytes; readers accept it within the first 1 KiB.
    bytes
        .windows(PDF_MAGIC.len())
        .take(1024)
        .any(|window| window == PDF_MAGIC)
}

/// Parses the PDF structure off the async executor and returns the page count.
async fn inspect_structure(pdf_bytes: Bytes) -> Result<usize, AppError> {
    tokio::task::spawn_blocking(move || -> Result<usize, AppError> {
        let document = Document::load_mem(&pdf_bytes)
            .map_err(|err| AppError::Extraction(format!("Failed to parse PDF: {err}")))?;

        if document.is_encrypted() {
            return Err(AppError::Extraction(
                "Encrypted PDF documents are not supported".into(),
            ));
        }

        let pages = document.get_pages().len();
        if pages == 0 {
            return Err(AppError::Extraction("PDF appears to have no pages".into()));
        }

        Ok(pages)
    })
    .await?
}

/// Drops carriage returns and form feeds and trims the result.
fn normalize_text(text: &str) -> String {
    text.replace(['\r', '\u{c}'], "").trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use lopdf::{
        content::{Content, Operation},
        dictionary, Object, Stream,
    };

    /// A one-page PDF whose content stream draws `line` in Courier.
    fn single_page_pdf(line: &str) -> Vec<u8> {
        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();
        let font_id = doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => "Courier",
        });
        let resources_id = doc.add_object(dictionary! {
            "Font" => dictionary! {
                "F1" => font_id,
            },
        });
        let content = Content {
            operations: vec![
                Operation::new("BT", vec![]),
                Operation::new("Tf", vec!["F1".into(), 24.into()]),
                Operation::new("Td", vec![72.into(), 720.into()]),
                Operation::new("Tj", vec![Object::string_literal(line)]),
                Operation::new("ET", vec![]),
            ],
        };
        let content_id = doc.add_object(Stream::new(
            dictionary! {},
            content.encode().expect("encode content"),
        ));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
        });
        doc.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => vec![page_id.into()],
                "Count" => 1,
                "Resources" => resources_id,
                "MediaBox" => vec![0.into(), 0.into(), 612.into(), 792.into()],
            }),
        );
        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        doc.trailer.set("Root", catalog_id);

        let mut bytes = Vec::new();
        doc.save_to(&mut bytes).expect("serialize pdf");
        bytes
    }

    #[tokio::test]
    async fn extracts_text_layer_of_a_valid_pdf() {
        let pdf = single_page_pdf("Refunds within 14 days.");

        let text = PdfTextExtractor
            .extract(Bytes::from(pdf))
            .await
            .expect("readable pdf");

        let compact: String = text.chars().filter(|c| !c.is_whitespace()).collect();
        assert!(compact.contains("Refundswithin14days."), "extracted {text:?}");
        assert_eq!(text, text.trim());
        assert!(!text.contains('\r'));
    }

    #[tokio::test]
    async fn structure_inspection_counts_pages() {
        let pages = inspect_structure(Bytes::from(single_page_pdf("page")))
            .await
            .expect("valid structure");
        assert_eq!(pages, 1);
    }

    #[tokio::test]
    async fn non_pdf_bytes_are_rejected_before_parsing() {
        let err = PdfTextExtractor
            .extract(Bytes::from_static(b"just some plain text"))
            .await
            .expect_err("not a pdf");
        assert!(matches!(err, AppError::Extraction(msg) if msg.contains("not a PDF")));
    }

    #[tokio::test]
    async fn truncated_pdf_is_an_extraction_error() {
        let err = PdfTextExtractor
            .extract(Bytes::from_static(b"%PDF-1.7\n1 0 obj\n<< /Type /Catalog"))
            .await
            .expect_err("broken pdf");
        assert!(matches!(err, AppError::Extraction(_)));
    }

    #[test]
    fn magic_header_detection() {
        assert!(looks_like_pdf(b"%PDF-1.4\n..."));
        assert!(looks_like_pdf(b"\xef\xbb\xbf%PDF-1.4"));
        assert!(!looks_like_pdf(b"PK\x03\x04"));
        assert!(!looks_like_pdf(b""));
    }

    #[test]
    fn normalize_text_strips_control_noise() {
        assert_eq!(normalize_text("\r\n Page one\u{c}\r\n"), "Page one");
    }
}
