//! Content extraction: raw item bytes to an indexable [`Body`].
//!
//! Dispatch is on the item's [`ContentType`]:
//!
//! | Type        | Result                                                  |
//! |-------------|---------------------------------------------------------|
//! | PlainText   | UTF-8 decode; invalid bytes are a decode error          |
//! | Pdf         | text of the first `pdf_page_limit` pages, in page order |
//! | Document    | `.docx` paragraphs joined with `\n`                     |
//! | Image       | `height x width x channels` pixel tensor                |
//! | Unsupported | error                                                   |
//!
//! Whitespace-only output yields `Ok(None)` and the item is dropped.
//! Extraction never panics on malformed input; the pipeline skips the
//! item and logs the error.

use std::io::Read;

use quick_xml::events::Event;
use sift_core::models::{Body, ContentType, ImageTensor, RawItem};

use crate::error::ExtractError;

/// Upper bound on decompressed bytes read from one ZIP entry.
const MAX_XML_ENTRY_BYTES: u64 = 50 * 1024 * 1024;

/// Default number of PDF pages read per document.
pub const DEFAULT_PDF_PAGE_LIMIT: usize = 30;

#[derive(Debug, Clone, Copy)]
pub struct Extractor {
    pdf_page_limit: usize,
}

impl Default for Extractor {
    fn default() -> Self {
        Self::new(DEFAULT_PDF_PAGE_LIMIT)
    }
}

/// Text pulled from a PDF plus how much of the document was read.
#[derive(Debug, Clone)]
pub struct PdfText {
    pub text: String,
    pub pages_read: usize,
    pub page_count: usize,
}

impl Extractor {
    pub fn new(pdf_page_limit: usize) -> Self {
        Self {
            pdf_page_limit: pdf_page_limit.max(1),
        }
    }

    pub fn extract(&self, item: &RawItem) -> Result<Option<Body>, ExtractError> {
        let body = match item.content_type {
            ContentType::PlainText => Body::Text(String::from_utf8(item.bytes.clone())?),
            ContentType::Pdf => Body::Text(self.extract_pdf(&item.bytes)?.text),
            ContentType::Document => Body::Text(extract_docx(&item.bytes)?),
            ContentType::Image => Body::Image(decode_image(&item.bytes)?),
            ContentType::Unsupported => {
                return Err(ExtractError::Unsupported(if item.extension.is_empty() {
                    item.name.clone()
                } else {
                    item.extension.clone()
                }))
            }
        };
        Ok(if body.is_empty() { None } else { Some(body) })
    }

    /// Read at most `pdf_page_limit` pages. Later pages are never parsed.
    ///
    /// A page whose text cannot be extracted (unusual fonts, images only)
    /// contributes nothing but still counts as read.
    pub fn extract_pdf(&self, bytes: &[u8]) -> Result<PdfText, ExtractError> {
        let doc = lopdf::Document::load_mem(bytes).map_err(|e| ExtractError::Pdf(e.to_string()))?;
        let pages = doc.get_pages();
        let page_count = pages.len();

        let mut parts = Vec::new();
        let mut pages_read = 0;
        for number in pages.keys().copied().take(self.pdf_page_limit) {
            pages_read += 1;
            match doc.extract_text(&[number]) {
                Ok(text) => parts.push(text.trim().to_string()),
                Err(e) => tracing::debug!(page = number, error = %e, "no text on PDF page"),
            }
        }

        Ok(PdfText {
            text: parts.join("\n"),
            pages_read,
            page_count,
        })
    }
}

fn extract_docx(bytes: &[u8]) -> Result<String, ExtractError> {
    let mut archive = zip::ZipArchive::new(std::io::Cursor::new(bytes))
        .map_err(|e| ExtractError::Document(e.to_string()))?;
    let entry = archive
        .by_name("word/document.xml")
        .map_err(|e| ExtractError::Document(e.to_string()))?;
    let mut xml = Vec::new();
    entry
        .take(MAX_XML_ENTRY_BYTES)
        .read_to_end(&mut xml)
        .map_err(|e| ExtractError::Document(e.to_string()))?;
    if xml.len() as u64 >= MAX_XML_ENTRY_BYTES {
        return Err(ExtractError::Document(
            "word/document.xml exceeds size limit".to_string(),
        ));
    }
    docx_paragraphs(&xml).map(|paras| paras.join("\n"))
}

/// Paragraph texts (`w:p`) in document order, runs (`w:t`) concatenated.
fn docx_paragraphs(xml: &[u8]) -> Result<Vec<String>, ExtractError> {
    let mut reader = quick_xml::Reader::from_reader(xml);
    let mut buf = Vec::new();
    let mut paragraphs = Vec::new();
    let mut current: Option<String> = None;
    let mut in_text = false;

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => match e.local_name().as_ref() {
                b"p" => current = Some(String::new()),
                b"t" => in_text = true,
                _ => {}
            },
            Ok(Event::Empty(e)) => {
                if e.local_name().as_ref() == b"p" {
                    paragraphs.push(String::new());
                }
            }
            Ok(Event::Text(te)) if in_text => {
                let text = te
                    .unescape()
                    .map_err(|e| ExtractError::Document(e.to_string()))?;
                if let Some(p) = current.as_mut() {
                    p.push_str(&text);
                }
            }
            Ok(Event::End(e)) => match e.local_name().as_ref() {
                b"t" => in_text = false,
                b"p" => {
                    if let Some(p) = current.take() {
                        paragraphs.push(p);
                    }
                }
                _ => {}
            },
            Ok(Event::Eof) => break,
            Err(e) => return Err(ExtractError::Document(e.to_string())),
            _ => {}
        }
        buf.clear();
    }
    Ok(paragraphs)
}

/// Decode to a raw pixel tensor, keeping the source channel layout.
fn decode_image(bytes: &[u8]) -> Result<ImageTensor, ExtractError> {
    use image::GenericImageView;

    let img = image::load_from_memory(bytes)?;
    // Normalize exotic layouts (16-bit, float) to 8 bits per channel.
    let img = match img {
        image::DynamicImage::ImageLuma8(_)
        | image::DynamicImage::ImageLumaA8(_)
        | image::DynamicImage::ImageRgb8(_)
        | image::DynamicImage::ImageRgba8(_) => img,
        other => image::DynamicImage::ImageRgba8(other.to_rgba8()),
    };
    let channels = img.color().channel_count();
    Ok(ImageTensor {
        height: img.height(),
        width: img.width(),
        channels,
        pixels: img.into_bytes(),
    })
}
