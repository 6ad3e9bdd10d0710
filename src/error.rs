use thiserror::Error;

/// Shown in place of extracted text when an upload has no extractor.
pub const UNSUPPORTED_FILE_NOTICE: &str = "❌ Unsupported file type";

/// Failures turning an uploaded file into text.
#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("unsupported file type: {media_type}")]
    UnsupportedFormat { media_type: String },

    #[error("file is not valid UTF-8: {0}")]
    Decode(#[from] std::string::FromUtf8Error),

    #[error("failed to read {format} document: {reason}")]
    Extraction { format: &'static str, reason: String },
}

impl ExtractError {
    pub(crate) fn extraction(format: &'static str, reason: impl ToString) -> Self {
        Self::Extraction {
            format,
            reason: reason.to_string(),
        }
    }

    /// Text shown to the user when an upload could not be read.
    pub fn user_message(&self) -> String {
        match self {
            Self::UnsupportedFormat { .. } => UNSUPPORTED_FILE_NOTICE.to_string(),
            other => format!("❌ Could not read file: {}", other),
        }
    }
}

/// Failures talking to the completion provider.
#[derive(Debug, Error)]
pub enum CompletionError {
    #[error("OPENAI_API_KEY is not set")]
    MissingApiKey,

    #[error("request to completion API failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("completion API returned {status}: {body}")]
    Api {
        status: reqwest::StatusCode,
        body: String,
    },

    #[error("completion API response contained no message content")]
    EmptyResponse,

    #[error("failed to render prompt: {0}")]
    Template(#[from] minijinja::Error),
}
