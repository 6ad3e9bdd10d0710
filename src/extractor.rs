//! Turns uploaded files into plain text for the prompt context.
//!
//! Only the text layer of each format is read: PDFs without a text layer come
//! back empty, Word documents yield their body paragraphs (tables, headers and
//! footers are skipped).

use std::io::{Cursor, Read};
use std::path::Path;

use quick_xml::events::Event;
use quick_xml::Reader;
use tracing::{debug, instrument};

use crate::error::ExtractError;

pub const WORD_DOCUMENT_MIME: &str =
    "application/vnd.openxmlformats-officedocument.wordprocessingml.document";

/// Media types the upload form accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaType {
    PlainText,
    Csv,
    Pdf,
    WordDocument,
    Png,
    Jpeg,
    Gif,
    Webp,
}

impl MediaType {
    /// Parses a declared MIME type, ignoring case and parameters such as `charset`.
    pub fn from_mime(mime: &str) -> Option<Self> {
        let essence = mime
            .split(';')
            .next()
            .unwrap_or_default()
            .trim()
            .to_ascii_lowercase();
        match essence.as_str() {
            "text/plain" => Some(Self::PlainText),
            "text/csv" => Some(Self::Csv),
            "application/pdf" => Some(Self::Pdf),
            WORD_DOCUMENT_MIME => Some(Self::WordDocument),
            "image/png" => Some(Self::Png),
            "image/jpeg" | "image/jpg" => Some(Self::Jpeg),
            "image/gif" => Some(Self::Gif),
            "image/webp" => Some(Self::Webp),
            _ => None,
        }
    }

    pub fn mime(&self) -> &'static str {
        match self {
            Self::PlainText => "text/plain",
            Self::Csv => "text/csv",
            Self::Pdf => "application/pdf",
            Self::WordDocument => WORD_DOCUMENT_MIME,
            Self::Png => "image/png",
            Self::Jpeg => "image/jpeg",
            Self::Gif => "image/gif",
            Self::Webp => "image/webp",
        }
    }

    pub fn is_image(&self) -> bool {
        matches!(self, Self::Png | Self::Jpeg | Self::Gif | Self::Webp)
    }
}

/// Guess the declared media type of a local file from its extension.
pub fn media_type_for_path(path: &Path) -> Option<MediaType> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_lowercase();

    match ext.as_str() {
        "txt" | "text" => Some(MediaType::PlainText),
        "csv" => Some(MediaType::Csv),
        "pdf" => Some(MediaType::Pdf),
        "docx" => Some(MediaType::WordDocument),
        "png" => Some(MediaType::Png),
        "jpg" | "jpeg" => Some(MediaType::Jpeg),
        "gif" => Some(MediaType::Gif),
        "webp" => Some(MediaType::Webp),
        _ => None,
    }
}

/// An upload held fully in memory together with the type its sender declared.
#[derive(Debug, Clone)]
pub struct UploadedFile {
    pub name: String,
    pub media_type: String,
    pub bytes: Vec<u8>,
}

impl UploadedFile {
    pub fn new(name: impl Into<String>, media_type: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            media_type: media_type.into(),
            bytes,
        }
    }

    /// Reads a local file, declaring its media type from the extension.
    pub fn from_path(path: &Path) -> std::io::Result<Self> {
        let bytes = std::fs::read(path)?;
        let media_type = media_type_for_path(path)
            .map(|m| m.mime())
            .unwrap_or("application/octet-stream");
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        Ok(Self::new(name, media_type, bytes))
    }
}

#[instrument(skip(file), fields(name = %file.name, media_type = %file.media_type, size = file.bytes.len()))]
pub fn extract(file: &UploadedFile) -> Result<String, ExtractError> {
    let text = match MediaType::from_mime(&file.media_type) {
        Some(MediaType::PlainText) => String::from_utf8(file.bytes.clone())?,
        Some(MediaType::Csv) => extract_csv(&file.bytes)?,
        Some(MediaType::Pdf) => extract_pdf(&file.bytes)?,
        Some(MediaType::WordDocument) => extract_docx(&file.bytes)?,
        _ => {
            return Err(ExtractError::UnsupportedFormat {
                media_type: file.media_type.clone(),
            })
        }
    };
    debug!(chars = text.chars().count(), "Extracted text from upload");
    Ok(text)
}

fn extract_csv(bytes: &[u8]) -> Result<String, ExtractError> {
    let decoded = String::from_utf8(bytes.to_vec())?;
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(decoded.as_bytes());

    let mut text = String::new();
    for record in reader.records() {
        let record = record.map_err(|e| ExtractError::extraction("CSV", e))?;
        text.push_str(&record.iter().collect::<Vec<_>>().join(", "));
        text.push('\n');
    }
    Ok(text)
}

fn extract_pdf(bytes: &[u8]) -> Result<String, ExtractError> {
    // pdf-extract panics on some malformed font tables instead of erroring.
    let pages = std::panic::catch_unwind(|| pdf_extract::extract_text_from_mem_by_pages(bytes))
        .map_err(|_| ExtractError::extraction("PDF", "parser aborted on malformed input"))?
        .map_err(|e| ExtractError::extraction("PDF", e))?;

    let mut text = String::new();
    for page in pages.iter().filter(|p| !p.trim().is_empty()) {
        // pdf-extract opens every page with blank lines.
        text.push_str(page.trim_start_matches(['\r', '\n']));
        text.push('\n');
    }
    debug!(pages = pages.len(), "Read PDF text layer");
    Ok(text)
}

fn extract_docx(bytes: &[u8]) -> Result<String, ExtractError> {
    let mut archive =
        zip::ZipArchive::new(Cursor::new(bytes)).map_err(|e| ExtractError::extraction("Word", e))?;
    let mut xml = String::new();
    archive
        .by_name("word/document.xml")
        .map_err(|e| ExtractError::extraction("Word", e))?
        .read_to_string(&mut xml)
        .map_err(|e| ExtractError::extraction("Word", e))?;

    Ok(body_paragraphs(&xml)?.join("\n"))
}

/// Paragraphs that are direct children of `w:body`, in document order.
fn body_paragraphs(xml: &str) -> Result<Vec<String>, ExtractError> {
    let mut reader = Reader::from_str(xml);
    let mut path: Vec<Vec<u8>> = Vec::new();
    let mut paragraphs = Vec::new();
    let mut current: Option<String> = None;
    let mut in_text = false;

    loop {
        let event = reader
            .read_event()
            .map_err(|e| ExtractError::extraction("Word", e))?;
        match event {
            Event::Start(e) => {
                let name = e.name().as_ref().to_vec();
                if name == b"w:p" && parent_is_body(&path) {
                    current = Some(String::new());
                } else if name == b"w:t" {
                    in_text = true;
                }
                path.push(name);
            }
            Event::Empty(e) => match e.name().as_ref() {
                b"w:p" if parent_is_body(&path) => paragraphs.push(String::new()),
                // Tab stops under w:pPr share the name; only run content is text.
                b"w:tab" if parent_is_run(&path) => {
                    if let Some(text) = current.as_mut() {
                        text.push('\t');
                    }
                }
                b"w:br" | b"w:cr" if parent_is_run(&path) => {
                    if let Some(text) = current.as_mut() {
                        text.push('\n');
                    }
                }
                _ => {}
            },
            Event::Text(t) if in_text => {
                if let Some(text) = current.as_mut() {
                    let decoded = t.decode().map_err(|e| ExtractError::extraction("Word", e))?;
                    text.push_str(&decoded);
                }
            }
            Event::GeneralRef(r) if in_text => {
                if let Some(text) = current.as_mut() {
                    if let Some(ch) = r
                        .resolve_char_ref()
                        .map_err(|e| ExtractError::extraction("Word", e))?
                    {
                        text.push(ch);
                    } else {
                        let name = r.decode().map_err(|e| ExtractError::extraction("Word", e))?;
                        let resolved = quick_xml::escape::resolve_predefined_entity(&name)
                            .ok_or_else(|| {
                                ExtractError::extraction("Word", format!("unknown entity &{};", name))
                            })?;
                        text.push_str(resolved);
                    }
                }
            }
            Event::End(e) => {
                path.pop();
                match e.name().as_ref() {
                    b"w:t" => in_text = false,
                    b"w:p" if parent_is_body(&path) => {
                        if let Some(text) = current.take() {
                            paragraphs.push(text);
                        }
                    }
                    _ => {}
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    Ok(paragraphs)
}

fn parent_is_body(path: &[Vec<u8>]) -> bool {
    path.last().is_some_and(|name| name.as_slice() == b"w:body")
}

fn parent_is_run(path: &[Vec<u8>]) -> bool {
    path.last().is_some_and(|name| name.as_slice() == b"w:r")
}
