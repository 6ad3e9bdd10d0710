use anyhow::{Context, Result};
use axum::{
    body::Bytes,
    extract::{DefaultBodyLimit, Multipart, Path, State},
    http::StatusCode,
    response::{Html, Redirect},
    routing::{get, post},
    serve, Form, Router,
};
use minijinja::Environment;
use serde::{Deserialize, Serialize};
use std::{net::SocketAddr, sync::Arc};
use tokio::sync::Mutex;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

use crate::chat::{QuickAction, Session, UserInput};
use crate::error::UNSUPPORTED_FILE_NOTICE;
use crate::extractor::{MediaType, UploadedFile};
use crate::llm_interaction::Assistant;

// Brochures and scanned receipts are routinely larger than axum's 2 MB default.
const MAX_UPLOAD_BYTES: usize = 25 * 1024 * 1024;

/// The single chat session served by this process plus a one-shot upload notice.
struct WebSession {
    session: Session,
    notice: Option<String>,
}

// Shared application state
#[derive(Clone)]
pub struct AppState {
    templates: Arc<Environment<'static>>,
    session: Arc<Mutex<WebSession>>,
}

impl AppState {
    pub fn new(assistant: Arc<Assistant>) -> Result<Self> {
        let templates = create_template_env().context("Failed to initialize template engine")?;
        Ok(Self {
            templates: Arc::new(templates),
            session: Arc::new(Mutex::new(WebSession {
                session: Session::new(assistant),
                notice: None,
            })),
        })
    }
}

#[derive(Deserialize)]
struct ChatForm {
    message: String,
}

#[derive(Serialize)]
struct QuickActionView {
    slug: &'static str,
    label: &'static str,
}

fn create_template_env() -> Result<Environment<'static>> {
    let mut env = Environment::new();
    env.add_template("index.html", include_str!("../templates/index.html"))?;
    Ok(env)
}

async fn index_handler(
    State(state): State<AppState>,
) -> Result<Html<String>, (StatusCode, Html<String>)> {
    let mut web = state.session.lock().await;
    let notice = web.notice.take();
    let session = &web.session;
    let quick_actions: Vec<QuickActionView> = QuickAction::ALL
        .iter()
        .map(|a| QuickActionView {
            slug: a.slug(),
            label: a.label(),
        })
        .collect();

    state
        .templates
        .get_template("index.html")
        .and_then(|tmpl| {
            tmpl.render(minijinja::context! {
                title => "Showroom Assistant",
                persona => session_persona(session),
                messages => session.conversation().messages(),
                quick_actions => quick_actions,
                file_name => session.context().file_name(),
                has_image => session.context().has_image(),
                notice => notice,
            })
        })
        .map(Html)
        .map_err(|e| {
            error!("Failed to render template: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Html(format!("Internal Server Error: {}", e)),
            )
        })
}

fn session_persona(session: &Session) -> String {
    session.assistant().persona().to_string()
}

async fn chat_handler(State(state): State<AppState>, Form(form): Form<ChatForm>) -> Redirect {
    let mut web = state.session.lock().await;
    web.session.submit(UserInput::Text(form.message)).await;
    Redirect::to("/")
}

async fn quick_action_handler(
    State(state): State<AppState>,
    Path(slug): Path<String>,
) -> Result<Redirect, (StatusCode, String)> {
    let action = QuickAction::from_slug(&slug).ok_or_else(|| {
        warn!(%slug, "Unknown quick action requested");
        (StatusCode::NOT_FOUND, format!("Unknown quick action: {}", slug))
    })?;
    let mut web = state.session.lock().await;
    web.session.submit(UserInput::Quick(action)).await;
    Ok(Redirect::to("/"))
}

/// One non-empty part of the upload form, read fully into memory.
struct UploadPart {
    field: String,
    file_name: String,
    content_type: String,
    bytes: Bytes,
}

async fn read_upload_parts(
    multipart: &mut Multipart,
) -> Result<Vec<UploadPart>, (StatusCode, String)> {
    let mut parts = Vec::new();
    while let Some(field) = multipart.next_field().await.map_err(bad_request)? {
        let field_name = field.name().unwrap_or_default().to_string();
        let file_name = field.file_name().unwrap_or_default().to_string();
        let content_type = field
            .content_type()
            .unwrap_or("application/octet-stream")
            .to_string();
        let bytes = field.bytes().await.map_err(bad_request)?;

        // Browsers submit an empty part for an untouched file input.
        if file_name.is_empty() && bytes.is_empty() {
            continue;
        }
        info!(field = %field_name, %file_name, %content_type, size = bytes.len(), "Received upload");
        parts.push(UploadPart {
            field: field_name,
            file_name,
            content_type,
            bytes,
        });
    }
    Ok(parts)
}

async fn upload_handler(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Redirect, (StatusCode, String)> {
    // The body is drained before locking so a slow upload never holds the session.
    let parts = read_upload_parts(&mut multipart).await?;

    let mut notices = Vec::new();
    let mut web = state.session.lock().await;
    for part in parts {
        match part.field.as_str() {
            "file" => {
                let upload = UploadedFile::new(part.file_name, part.content_type, part.bytes.to_vec());
                let notice = match web.session.attach_file(&upload).await {
                    Ok(()) => format!("Uploaded file: {}", upload.name),
                    Err(e) => e.user_message(),
                };
                notices.push(notice);
            }
            "image" => {
                if MediaType::from_mime(&part.content_type).is_some_and(|m| m.is_image()) {
                    web.session.attach_image(&part.bytes).await;
                    notices.push(format!("Uploaded image: {}", part.file_name));
                } else {
                    notices.push(UNSUPPORTED_FILE_NOTICE.to_string());
                }
            }
            other => warn!(field = other, "Ignoring unexpected upload field"),
        }
    }

    if !notices.is_empty() {
        web.notice = Some(notices.join(" · "));
    }
    Ok(Redirect::to("/"))
}

fn bad_request(e: axum::extract::multipart::MultipartError) -> (StatusCode, String) {
    warn!("Malformed upload: {}", e);
    (StatusCode::BAD_REQUEST, e.to_string())
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(index_handler))
        .route("/chat", post(chat_handler))
        .route("/quick/:action", post(quick_action_handler))
        .route("/upload", post(upload_handler))
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
        .with_state(state)
        .layer(TraceLayer::new_for_http()) // Add request logging
}

pub async fn start_web_server(port: u16, assistant: Arc<Assistant>) -> Result<()> {
    let app = router(AppState::new(assistant)?);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    info!("Web server listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .context(format!("Failed to bind to address {}", addr))?;

    serve(listener, app.into_make_service())
        .await
        .context("Web server failed")?;

    Ok(())
}
