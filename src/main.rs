use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};

use dealer_chat::chat;
use dealer_chat::constants;
use dealer_chat::extractor::{self, MediaType, UploadedFile};
use dealer_chat::llm_interaction::{Assistant, CompletionClient, CompletionConfig};
use dealer_chat::prompt::Persona;
use dealer_chat::web_server;

// Define the command-line interface structure using clap
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

// Define the available subcommands
#[derive(clap::Subcommand, Debug)]
enum Commands {
    /// Serve the chat web UI.
    Serve {
        #[arg(long, default_value_t = constants::DEFAULT_PORT, help = "Port for the web server.")]
        port: u16,
        #[command(flatten)]
        model: ModelArgs,
    },
    /// Chat with the assistant in the terminal.
    Chat {
        #[arg(long, help = "Document to use as context (txt, csv, pdf, docx).")]
        file: Option<PathBuf>,
        #[arg(long, help = "Image to analyse and use as context (png, jpg).")]
        image: Option<PathBuf>,
        #[command(flatten)]
        model: ModelArgs,
    },
    /// Print the text extracted from a document.
    Extract {
        path: PathBuf,
        #[arg(long, help = "Declared media type; guessed from the extension when omitted.")]
        media_type: Option<String>,
    },
}

/// Overrides for the environment-backed completion settings.
#[derive(clap::Args, Debug)]
struct ModelArgs {
    #[arg(long, help = "Completion model identifier.")]
    model: Option<String>,
    #[arg(long, help = "Base URL of the OpenAI-compatible API.")]
    api_base: Option<String>,
    #[arg(long, help = "Persona to answer as: dealership or assistant.")]
    persona: Option<Persona>,
    #[arg(long, help = "Request timeout in seconds.")]
    timeout_secs: Option<u64>,
    #[arg(long, help = "Truncate replies longer than this many characters.")]
    max_reply_chars: Option<usize>,
    #[arg(long, help = "Also send uploaded PDFs to the model for visual analysis.")]
    pdf_vision: bool,
}

impl ModelArgs {
    fn build_assistant(self) -> Result<Arc<Assistant>> {
        let mut config = CompletionConfig::from_env();
        if let Some(model) = self.model {
            config.model = model;
        }
        if let Some(api_base) = self.api_base {
            config.api_base = api_base;
        }
        if let Some(secs) = self.timeout_secs {
            config.timeout = Duration::from_secs(secs);
        }
        if config.api_key.is_empty() {
            error!("OPENAI_API_KEY is not set; every question will return an error reply");
        }

        let persona = match self.persona {
            Some(persona) => persona,
            None => constants::PERSONA
                .parse::<Persona>()
                .map_err(anyhow::Error::msg)
                .context("Invalid DEALER_CHAT_PERSONA")?,
        };
        let max_reply_chars = self.max_reply_chars.or(*constants::MAX_REPLY_CHARS);
        let pdf_vision = self.pdf_vision || *constants::PDF_VISION;

        info!(model = %config.model, %persona, pdf_vision, "Configuring assistant");
        let client = CompletionClient::new(config).context("Failed to build HTTP client")?;
        Ok(Arc::new(
            Assistant::new(client, persona)
                .with_max_reply_chars(max_reply_chars)
                .with_pdf_vision(pdf_vision),
        ))
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (for OPENAI_API_KEY and friends)
    dotenvy::dotenv().ok();

    // Reads log level from RUST_LOG (e.g., RUST_LOG=info,dealer_chat=debug)
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    info!("dealer-chat starting with command: {:?}", cli.command);

    match cli.command {
        Commands::Serve { port, model } => {
            let assistant = model.build_assistant()?;
            tokio::select! {
                res = web_server::start_web_server(port, assistant) => {
                    res.context("Web server stopped")?;
                }
                _ = tokio::signal::ctrl_c() => {
                    info!("Ctrl-C received, shutting down...");
                }
            }
        }
        Commands::Chat { file, image, model } => {
            let assistant = model.build_assistant()?;
            chat::run_chat(assistant, file.as_deref(), image.as_deref())
                .await
                .context("Chat session failed")?;
        }
        Commands::Extract { path, media_type } => {
            let mut upload = UploadedFile::from_path(&path)
                .with_context(|| format!("Failed to read {}", path.display()))?;
            if let Some(media_type) = media_type {
                upload.media_type = media_type;
            }
            if MediaType::from_mime(&upload.media_type).is_some_and(|m| m.is_image()) {
                anyhow::bail!("{} is an image; use `chat --image` to analyse it", path.display());
            }
            let text = extractor::extract(&upload)
                .with_context(|| format!("Failed to extract text from {}", path.display()))?;
            print!("{}", text);
        }
    }

    Ok(())
}
