// Session loop shared by the web UI and the terminal chat.

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::context::ExtractedContext;
use crate::error::ExtractError;
use crate::extractor::{self, MediaType, UploadedFile};
use crate::llm_interaction::Assistant;
use crate::Conversation;

/// Canned questions offered as one-click buttons.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuickAction {
    BookTestDrive,
    ViewModels,
    Financing,
    TradeIn,
}

impl QuickAction {
    pub const ALL: [QuickAction; 4] = [
        QuickAction::BookTestDrive,
        QuickAction::ViewModels,
        QuickAction::Financing,
        QuickAction::TradeIn,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            Self::BookTestDrive => "Book A Test Drive",
            Self::ViewModels => "View Available Models",
            Self::Financing => "Ask About Financing",
            Self::TradeIn => "Trade In My Car",
        }
    }

    pub fn slug(&self) -> &'static str {
        match self {
            Self::BookTestDrive => "test-drive",
            Self::ViewModels => "models",
            Self::Financing => "financing",
            Self::TradeIn => "trade-in",
        }
    }

    /// The user message the button submits.
    pub fn message(&self) -> &'static str {
        match self {
            Self::BookTestDrive => "I want to book a test drive.",
            Self::ViewModels => "What car models do you have available?",
            Self::Financing => "What financing options do you offer?",
            Self::TradeIn => "I want to trade in my current car.",
        }
    }

    pub fn from_slug(slug: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|action| action.slug() == slug)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UserInput {
    Text(String),
    Quick(QuickAction),
}

impl UserInput {
    /// The message to append, or `None` when the input is blank.
    pub fn message_text(&self) -> Option<&str> {
        match self {
            Self::Text(text) if text.trim().is_empty() => None,
            Self::Text(text) => Some(text.as_str()),
            Self::Quick(action) => Some(action.message()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Submitting,
}

/// One turn of the chat: ask, then append the user message and the reply.
///
/// Both messages land together after the completion resolves, so a turn that
/// is abandoned mid-request leaves the store as it was. Blank input is a no-op.
/// Completion failures become a failed-tagged bot message, so every accepted
/// input adds exactly two messages.
pub async fn advance(
    conversation: &mut Conversation,
    input: &UserInput,
    context: &str,
    assistant: &Assistant,
) {
    let Some(question) = input.message_text() else {
        return;
    };

    let reply = assistant.ask(question, context).await;
    conversation.push_user(question);
    match reply {
        Ok(reply) => conversation.push_bot(reply),
        Err(e) => {
            warn!(error = %e, "Completion failed, recording error reply");
            conversation.push_failed_bot(format!("Error: {}", e));
        }
    }
}

/// Holds the session in `Submitting` and puts it back to `Idle` on drop,
/// including when the submitting future is cancelled.
struct SubmittingGuard<'a>(&'a mut SessionState);

impl<'a> SubmittingGuard<'a> {
    fn enter(state: &'a mut SessionState) -> Self {
        *state = SessionState::Submitting;
        Self(state)
    }
}

impl Drop for SubmittingGuard<'_> {
    fn drop(&mut self) {
        *self.0 = SessionState::Idle;
    }
}

/// Conversation plus upload context for a single interactive user.
#[derive(Debug)]
pub struct Session {
    id: Uuid,
    conversation: Conversation,
    context: ExtractedContext,
    state: SessionState,
    assistant: Arc<Assistant>,
}

impl Session {
    pub fn new(assistant: Arc<Assistant>) -> Self {
        Self {
            id: Uuid::new_v4(),
            conversation: Conversation::new(),
            context: ExtractedContext::default(),
            state: SessionState::Idle,
            assistant,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn conversation(&self) -> &Conversation {
        &self.conversation
    }

    pub fn context(&self) -> &ExtractedContext {
        &self.context
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn assistant(&self) -> &Assistant {
        &self.assistant
    }

    #[instrument(skip_all, fields(session = %self.id))]
    pub async fn submit(&mut self, input: UserInput) {
        if input.message_text().is_none() {
            return;
        }
        let context = self.context.render();
        {
            let _submitting = SubmittingGuard::enter(&mut self.state);
            advance(&mut self.conversation, &input, &context, &self.assistant).await;
        }
        info!(messages = self.conversation.len(), "Turn complete");
    }

    /// Replace the file part of the context. A file that cannot be read leaves
    /// no file context behind. With PDF vision on, PDFs also get a visual
    /// analysis from the model.
    #[instrument(skip_all, fields(session = %self.id, file = %file.name))]
    pub async fn attach_file(&mut self, file: &UploadedFile) -> Result<(), ExtractError> {
        let text = match extractor::extract(file) {
            Ok(text) => text,
            Err(e) => {
                warn!(error = %e, "Could not extract upload");
                self.context.clear_file();
                return Err(e);
            }
        };

        let text = if self.assistant.pdf_vision()
            && MediaType::from_mime(&file.media_type) == Some(MediaType::Pdf)
        {
            self.assistant
                .describer()
                .pdf_report(&file.name, &file.bytes, &text)
                .await
        } else {
            text
        };
        self.context.set_file(&file.name, text);
        Ok(())
    }

    /// Replace the image part of the context with the model's description.
    #[instrument(skip_all, fields(session = %self.id, size = image.len()))]
    pub async fn attach_image(&mut self, image: &[u8]) {
        let description = self.assistant.describer().describe_for_context(image).await;
        self.context.set_image_description(description);
    }
}

const HELP: &str = "Commands: /file PATH, /image PATH, /quick ACTION, /history, /quit";

/// Interactive terminal chat over stdin/stdout.
pub async fn run_chat(
    assistant: Arc<Assistant>,
    file: Option<&Path>,
    image: Option<&Path>,
) -> Result<()> {
    let mut session = Session::new(assistant);
    let mut stdout = tokio::io::stdout();
    info!(session = %session.id(), "Starting terminal chat session...");

    if let Some(path) = file {
        let notice = attach_file_from_path(&mut session, path).await;
        write_line(&mut stdout, &notice).await?;
    }
    if let Some(path) = image {
        let notice = attach_image_from_path(&mut session, path).await;
        write_line(&mut stdout, &notice).await?;
    }

    write_line(&mut stdout, HELP).await?;
    let actions = QuickAction::ALL
        .iter()
        .map(|a| format!("{} ({})", a.slug(), a.label()))
        .collect::<Vec<_>>()
        .join(", ");
    write_line(&mut stdout, &format!("Quick actions: {}", actions)).await?;

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        stdout.write_all(b"You: ").await?;
        stdout.flush().await?;
        let Some(line) = lines.next_line().await.context("Failed to read from stdin")? else {
            break;
        };
        let line = line.trim();

        let input = match line.split_once(' ').unwrap_or((line, "")) {
            ("/quit" | "/exit", _) => break,
            ("/history", _) => {
                write_line(&mut stdout, &session.conversation().transcript()).await?;
                continue;
            }
            ("/file", path) => {
                let notice = attach_file_from_path(&mut session, Path::new(path.trim())).await;
                write_line(&mut stdout, &notice).await?;
                continue;
            }
            ("/image", path) => {
                let notice = attach_image_from_path(&mut session, Path::new(path.trim())).await;
                write_line(&mut stdout, &notice).await?;
                continue;
            }
            ("/quick", slug) => match QuickAction::from_slug(slug.trim()) {
                Some(action) => {
                    write_line(&mut stdout, &format!("You: {}", action.message())).await?;
                    UserInput::Quick(action)
                }
                None => {
                    write_line(&mut stdout, &format!("Unknown quick action '{}'", slug.trim()))
                        .await?;
                    continue;
                }
            },
            _ => UserInput::Text(line.to_string()),
        };

        let before = session.conversation().len();
        session.submit(input).await;
        if session.conversation().len() > before {
            if let Some(reply) = session.conversation().last() {
                write_line(&mut stdout, &reply.render()).await?;
            }
        }
    }

    info!("Chat session finished.");
    Ok(())
}

async fn attach_file_from_path(session: &mut Session, path: &Path) -> String {
    let file = match UploadedFile::from_path(path) {
        Ok(file) => file,
        Err(e) => return format!("❌ Could not open {}: {}", path.display(), e),
    };
    match session.attach_file(&file).await {
        Ok(()) => format!("Uploaded file: {}", file.name),
        Err(e) => e.user_message(),
    }
}

async fn attach_image_from_path(session: &mut Session, path: &Path) -> String {
    match tokio::fs::read(path).await {
        Ok(bytes) => {
            session.attach_image(&bytes).await;
            format!("Uploaded image: {}", path.display())
        }
        Err(e) => format!("❌ Could not open {}: {}", path.display(), e),
    }
}

async fn write_line(stdout: &mut tokio::io::Stdout, text: &str) -> Result<()> {
    stdout.write_all(text.as_bytes()).await?;
    stdout.write_all(b"\n").await?;
    stdout.flush().await?;
    Ok(())
}
