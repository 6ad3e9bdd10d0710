// Runtime defaults loaded from the environment (.env is read in main before first use).

use std::env;

pub const DEFAULT_API_BASE: &str = "https://api.openai.com/v1";
pub const DEFAULT_MODEL: &str = "gpt-4o";
pub const DEFAULT_TIMEOUT_SECS: u64 = 120;
pub const DEFAULT_PORT: u16 = 8501;

// Use lazy_static so every lookup after the first is a plain read.
lazy_static::lazy_static! {
    pub static ref OPENAI_API_KEY: String = env::var("OPENAI_API_KEY").unwrap_or_default();
    pub static ref OPENAI_API_BASE: String = env::var("OPENAI_API_BASE").unwrap_or_else(|_| DEFAULT_API_BASE.to_string());
    pub static ref CHAT_MODEL: String = env::var("DEALER_CHAT_MODEL").unwrap_or_else(|_| DEFAULT_MODEL.to_string());
    pub static ref PERSONA: String = env::var("DEALER_CHAT_PERSONA").unwrap_or_else(|_| "dealership".to_string());
    pub static ref REQUEST_TIMEOUT_SECS: u64 = env::var("DEALER_CHAT_TIMEOUT_SECS")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(DEFAULT_TIMEOUT_SECS);
    // Unset means replies are passed through untouched.
    pub static ref MAX_REPLY_CHARS: Option<usize> = env::var("DEALER_CHAT_MAX_REPLY_CHARS")
        .ok()
        .and_then(|v| v.parse().ok());
    pub static ref PDF_VISION: bool = env::var("DEALER_CHAT_PDF_VISION")
        .map(|v| matches!(v.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on"))
        .unwrap_or(false);
}
