use std::time::Duration;

use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, instrument, warn};

use crate::constants;
use crate::error::CompletionError;
use crate::image_describer::ImageDescriber;
use crate::prompt::{Persona, PromptAssembler};

/// Connection settings for the chat-completion provider.
#[derive(Debug, Clone)]
pub struct CompletionConfig {
    pub api_base: String,
    pub api_key: String,
    pub model: String,
    pub timeout: Duration,
}

impl CompletionConfig {
    pub fn from_env() -> Self {
        Self {
            api_base: constants::OPENAI_API_BASE.clone(),
            api_key: constants::OPENAI_API_KEY.clone(),
            model: constants::CHAT_MODEL.clone(),
            timeout: Duration::from_secs(*constants::REQUEST_TIMEOUT_SECS),
        }
    }
}

// Structures matching the OpenAI-compatible /chat/completions endpoint
#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    temperature: f32,
    messages: Vec<ChatMessage<'a>>,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: MessageContent<'a>,
}

#[derive(Serialize)]
#[serde(untagged)]
enum MessageContent<'a> {
    Text(&'a str),
    Parts(Vec<ContentPart<'a>>),
}

#[derive(Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentPart<'a> {
    Text { text: &'a str },
    ImageUrl { image_url: ImageUrl<'a> },
    File { file: FileData<'a> },
}

#[derive(Serialize)]
struct ImageUrl<'a> {
    url: &'a str,
}

#[derive(Serialize)]
struct FileData<'a> {
    filename: &'a str,
    file_data: &'a str,
}

#[derive(Deserialize, Debug)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize, Debug)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Deserialize, Debug)]
struct ResponseMessage {
    content: Option<String>,
}

/// Thin wrapper over one shared HTTP client; clones share the connection pool.
#[derive(Debug, Clone)]
pub struct CompletionClient {
    http: Client,
    config: CompletionConfig,
}

impl CompletionClient {
    pub fn new(config: CompletionConfig) -> Result<Self, CompletionError> {
        let http = Client::builder().timeout(config.timeout).build()?;
        Ok(Self { http, config })
    }

    /// Sends a single user prompt with temperature pinned to zero.
    pub async fn complete_text(&self, prompt: &str) -> Result<String, CompletionError> {
        self.send(vec![ChatMessage {
            role: "user",
            content: MessageContent::Text(prompt),
        }])
        .await
    }

    /// Sends an instruction together with an image given as a data URL.
    pub async fn complete_with_image(
        &self,
        instruction: &str,
        image_data_url: &str,
    ) -> Result<String, CompletionError> {
        self.send(vec![ChatMessage {
            role: "user",
            content: MessageContent::Parts(vec![
                ContentPart::Text { text: instruction },
                ContentPart::ImageUrl {
                    image_url: ImageUrl {
                        url: image_data_url,
                    },
                },
            ]),
        }])
        .await
    }

    /// Sends an instruction together with a whole document given as a data URL.
    pub async fn complete_with_file(
        &self,
        instruction: &str,
        filename: &str,
        file_data_url: &str,
    ) -> Result<String, CompletionError> {
        self.send(vec![ChatMessage {
            role: "user",
            content: MessageContent::Parts(vec![
                ContentPart::Text { text: instruction },
                ContentPart::File {
                    file: FileData {
                        filename,
                        file_data: file_data_url,
                    },
                },
            ]),
        }])
        .await
    }

    #[instrument(skip_all, fields(model = %self.config.model))]
    async fn send(&self, messages: Vec<ChatMessage<'_>>) -> Result<String, CompletionError> {
        if self.config.api_key.is_empty() {
            return Err(CompletionError::MissingApiKey);
        }

        let url = format!(
            "{}/chat/completions",
            self.config.api_base.trim_end_matches('/')
        );
        let request_payload = ChatRequest {
            model: &self.config.model,
            temperature: 0.0,
            messages,
        };

        let response = self
            .http
            .post(&url)
            .bearer_auth(&self.config.api_key)
            .json(&request_payload)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "Failed to read error body".to_string());
            error!(%status, %body, "Completion API request failed");
            return Err(CompletionError::Api { status, body });
        }

        let chat_response = response.json::<ChatResponse>().await?;
        let content = chat_response
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or(CompletionError::EmptyResponse)?;

        debug!(chars = content.chars().count(), "Received completion");
        Ok(content)
    }
}

/// Answers questions in the configured persona and describes uploaded images.
///
/// Built once per process; the HTTP client inside is shared with the describer.
#[derive(Debug)]
pub struct Assistant {
    client: CompletionClient,
    prompts: PromptAssembler,
    describer: ImageDescriber,
    max_reply_chars: Option<usize>,
    pdf_vision: bool,
}

impl Assistant {
    pub fn new(client: CompletionClient, persona: Persona) -> Self {
        Self {
            describer: ImageDescriber::new(client.clone()),
            client,
            prompts: PromptAssembler::new(persona),
            max_reply_chars: None,
            pdf_vision: false,
        }
    }

    /// Truncate replies longer than `limit` characters.
    pub fn with_max_reply_chars(mut self, limit: Option<usize>) -> Self {
        self.max_reply_chars = limit;
        self
    }

    /// Send uploaded PDFs to the model as well, for handwriting and layout.
    pub fn with_pdf_vision(mut self, enabled: bool) -> Self {
        self.pdf_vision = enabled;
        self
    }

    pub fn pdf_vision(&self) -> bool {
        self.pdf_vision
    }

    pub fn persona(&self) -> Persona {
        self.prompts.persona()
    }

    pub fn describer(&self) -> &ImageDescriber {
        &self.describer
    }

    #[instrument(skip_all, fields(persona = %self.prompts.persona(), context_chars = context.len()))]
    pub async fn ask(&self, question: &str, context: &str) -> Result<String, CompletionError> {
        let prompt = self.prompts.render(question, context)?;
        let reply = self.client.complete_text(&prompt).await?;
        Ok(self.enforce_reply_limit(reply))
    }

    /// [`ask`](Self::ask) with failures rendered as the `"Error: ..."` text shown in chat.
    pub async fn ask_for_display(&self, question: &str, context: &str) -> String {
        match self.ask(question, context).await {
            Ok(reply) => reply,
            Err(e) => {
                warn!(error = %e, "Completion failed");
                format!("Error: {}", e)
            }
        }
    }

    fn enforce_reply_limit(&self, reply: String) -> String {
        match self.max_reply_chars {
            Some(limit) if reply.chars().count() > limit => {
                debug!(limit, "Truncating reply");
                reply.chars().take(limit).collect()
            }
            _ => reply,
        }
    }
}
