//! Image and PDF understanding via a vision-capable completion model.

use base64::{engine::general_purpose::STANDARD, Engine};
use tracing::{info, instrument, warn};

use crate::error::CompletionError;
use crate::extractor::MediaType;
use crate::llm_interaction::CompletionClient;

pub const IMAGE_ANALYSIS_INSTRUCTION: &str = r#"You are an advanced OCR and image analysis system. Analyze this image thoroughly and extract ALL information:

PRIMARY TASKS:
1. **Text Extraction (OCR)**: Extract ALL visible text, including:
   - Printed text
   - HANDWRITTEN text (cursive, print, notes)
   - Text in any language
   - Numbers, dates, codes

2. **Document Analysis**: If this is a document, identify:
   - Document type (receipt, invoice, form, letter, note, etc.)
   - Key information (dates, amounts, names, addresses, phone numbers)
   - Line items, totals, calculations
   - Signatures or stamps

3. **Receipt/Invoice Analysis**: If this is a receipt or invoice, extract:
   - Store/business name and location
   - Date and time of transaction
   - Itemized list with prices
   - Subtotals, taxes, discounts
   - Total amount
   - Payment method
   - Receipt/transaction number

4. **Visual Content**: Describe what you see:
   - Objects, products, people, scenes
   - Brands, logos, labels
   - Colors, layout, condition
   - Any relevant visual details

5. **Handwritten Notes**: Pay special attention to handwritten content:
   - Transcribe handwritten text as accurately as possible
   - Note if handwriting is unclear
   - Capture margin notes, annotations, signatures

Provide a comprehensive, structured analysis with all extracted information."#;

pub const PDF_ANALYSIS_INSTRUCTION: &str = r#"Analyze the first 3 pages of this PDF document. Start each page with a line of the form "--- PAGE n VISUAL ANALYSIS ---". Extract ALL information including:
- Printed text
- Handwritten text, notes, or annotations
- Tables, charts, diagrams
- Signatures, stamps, marks
- Any visual elements

Provide a comprehensive analysis of each page."#;

/// Identify the image encoding from its leading bytes, falling back to PNG.
pub fn sniff_image_type(bytes: &[u8]) -> MediaType {
    if bytes.starts_with(b"\x89PNG\r\n\x1a\n") {
        MediaType::Png
    } else if bytes.starts_with(&[0xFF, 0xD8, 0xFF]) {
        MediaType::Jpeg
    } else if bytes.starts_with(b"GIF87a") || bytes.starts_with(b"GIF89a") {
        MediaType::Gif
    } else if bytes.len() >= 12 && &bytes[..4] == b"RIFF" && &bytes[8..12] == b"WEBP" {
        MediaType::Webp
    } else {
        MediaType::Png
    }
}

/// Base64 data URL for the raw image bytes, labelled with their own encoding.
pub fn image_data_url(bytes: &[u8]) -> String {
    format!(
        "data:{};base64,{}",
        sniff_image_type(bytes).mime(),
        STANDARD.encode(bytes)
    )
}

pub fn pdf_data_url(bytes: &[u8]) -> String {
    format!(
        "data:{};base64,{}",
        MediaType::Pdf.mime(),
        STANDARD.encode(bytes)
    )
}

#[derive(Debug, Clone)]
pub struct ImageDescriber {
    client: CompletionClient,
}

impl ImageDescriber {
    pub fn new(client: CompletionClient) -> Self {
        Self { client }
    }

    #[instrument(skip_all, fields(size = image.len()))]
    pub async fn describe(&self, image: &[u8]) -> Result<String, CompletionError> {
        let data_url = image_data_url(image);
        info!(kind = sniff_image_type(image).mime(), "Requesting image analysis");
        self.client
            .complete_with_image(IMAGE_ANALYSIS_INSTRUCTION, &data_url)
            .await
    }

    /// Like [`describe`](Self::describe), but a failure becomes the context text
    /// instead of an error so an unreadable image never ends the session.
    pub async fn describe_for_context(&self, image: &[u8]) -> String {
        match self.describe(image).await {
            Ok(description) => description,
            Err(e) => {
                warn!(error = %e, "Image analysis failed");
                format!("Error analyzing image: {}", e)
            }
        }
    }

    /// Visual reading of a whole PDF, handwriting included.
    #[instrument(skip_all, fields(file = filename, size = pdf.len()))]
    pub async fn analyze_pdf(&self, filename: &str, pdf: &[u8]) -> Result<String, CompletionError> {
        info!("Requesting PDF visual analysis");
        self.client
            .complete_with_file(PDF_ANALYSIS_INSTRUCTION, filename, &pdf_data_url(pdf))
            .await
    }

    /// The text layer followed by the visual analysis. A failed analysis is
    /// reported in place of the visual section and the text layer is kept.
    pub async fn pdf_report(&self, filename: &str, pdf: &[u8], text_layer: &str) -> String {
        let visual = match self.analyze_pdf(filename, pdf).await {
            Ok(analysis) => analysis,
            Err(e) => {
                warn!(error = %e, "PDF visual analysis failed");
                format!("Error analyzing PDF: {}", e)
            }
        };
        format!(
            "TEXT EXTRACTION:\n{}\n\nVISUAL ANALYSIS (with handwriting detection):\n{}",
            text_layer, visual
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sniffs_common_signatures() {
        assert_eq!(sniff_image_type(b"\x89PNG\r\n\x1a\n...."), MediaType::Png);
        assert_eq!(sniff_image_type(&[0xFF, 0xD8, 0xFF, 0xE0, 0x00]), MediaType::Jpeg);
        assert_eq!(sniff_image_type(b"GIF89a...."), MediaType::Gif);
        assert_eq!(sniff_image_type(b"RIFF\x10\x00\x00\x00WEBPVP8 "), MediaType::Webp);
    }

    #[test]
    fn unknown_bytes_default_to_png() {
        assert_eq!(sniff_image_type(b"BM6\x00\x00"), MediaType::Png);
        assert_eq!(sniff_image_type(b""), MediaType::Png);
    }

    #[test]
    fn data_url_carries_encoding_and_payload() {
        let url = image_data_url(&[0xFF, 0xD8, 0xFF]);
        assert_eq!(url, "data:image/jpeg;base64,/9j/");
    }

    #[test]
    fn pdf_data_url_is_labelled_as_pdf() {
        assert_eq!(pdf_data_url(b"%PDF"), "data:application/pdf;base64,JVBERg==");
    }
}
