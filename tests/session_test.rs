mod common;

use std::sync::Arc;
use std::time::Duration;

use dealer_chat::chat::{advance, QuickAction, Session, SessionState, UserInput};
use dealer_chat::error::CompletionError;
use dealer_chat::extractor::UploadedFile;
use dealer_chat::llm_interaction::{Assistant, CompletionClient, CompletionConfig};
use dealer_chat::prompt::Persona;
use dealer_chat::{Conversation, Role};
use serde_json::json;
use wiremock::matchers::{body_partial_json, body_string_contains, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn config(api_base: &str) -> CompletionConfig {
    CompletionConfig {
        api_base: api_base.to_string(),
        api_key: "test-key".to_string(),
        model: "gpt-4o".to_string(),
        timeout: Duration::from_secs(5),
    }
}

fn assistant(api_base: &str) -> Arc<Assistant> {
    let client = CompletionClient::new(config(api_base)).unwrap();
    Arc::new(Assistant::new(client, Persona::Dealership))
}

fn completion(content: &str) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({
        "id": "chatcmpl-1",
        "object": "chat.completion",
        "choices": [{
            "index": 0,
            "message": {"role": "assistant", "content": content},
            "finish_reason": "stop"
        }]
    }))
}

async fn mock_reply(server: &MockServer, content: &str) {
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(completion(content))
        .mount(server)
        .await;
}

#[test_log::test(tokio::test)]
async fn test_ask_sends_pinned_model_and_temperature() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .and(header("authorization", "Bearer test-key"))
        .and(body_partial_json(json!({"model": "gpt-4o", "temperature": 0.0})))
        .and(body_string_contains("What is the price of the Vios?"))
        .respond_with(completion("The Vios starts at PHP 722,000."))
        .expect(1)
        .mount(&server)
        .await;

    let reply = assistant(&server.uri())
        .ask("What is the price of the Vios?", "")
        .await
        .unwrap();
    assert_eq!(reply, "The Vios starts at PHP 722,000.");
}

#[tokio::test]
async fn test_reply_is_returned_verbatim() {
    let server = MockServer::start().await;
    mock_reply(&server, "  spaced reply\n").await;

    let reply = assistant(&server.uri()).ask("hi", "").await.unwrap();
    assert_eq!(reply, "  spaced reply\n");
}

#[tokio::test]
async fn test_api_error_status_is_typed() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(429).set_body_string("quota exceeded"))
        .mount(&server)
        .await;

    let err = assistant(&server.uri()).ask("hi", "").await.unwrap_err();
    match err {
        CompletionError::Api { status, body } => {
            assert_eq!(status.as_u16(), 429);
            assert_eq!(body, "quota exceeded");
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn test_missing_content_is_empty_response() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"choices": []})))
        .mount(&server)
        .await;

    let err = assistant(&server.uri()).ask("hi", "").await.unwrap_err();
    assert!(matches!(err, CompletionError::EmptyResponse));
}

#[tokio::test]
async fn test_network_failure_becomes_error_message() {
    // Nothing listens on the discard port, so the connection is refused.
    let assistant = assistant("http://127.0.0.1:9");
    let mut conversation = Conversation::new();
    advance(
        &mut conversation,
        &UserInput::Text("What is the price of the Vios?".to_string()),
        "",
        &assistant,
    )
    .await;

    assert_eq!(conversation.len(), 2);
    let last = conversation.last().unwrap();
    assert_eq!(last.role, Role::Bot);
    assert!(last.content.starts_with("Error: "), "got {:?}", last.content);
    assert!(last.failed);
}

#[tokio::test]
async fn test_quick_action_appends_canned_message_and_reply() {
    let server = MockServer::start().await;
    mock_reply(&server, "Sure! Which model would you like to drive?").await;

    let mut session = Session::new(assistant(&server.uri()));
    session.submit(UserInput::Quick(QuickAction::BookTestDrive)).await;

    let messages = session.conversation().messages();
    assert_eq!(messages.len(), 2);
    assert_eq!(messages[0].role, Role::User);
    assert_eq!(messages[0].content, "I want to book a test drive.");
    assert_eq!(messages[1].role, Role::Bot);
    assert!(!messages[1].failed);
    assert_eq!(session.state(), SessionState::Idle);
}

#[tokio::test]
async fn test_n_submissions_yield_2n_interleaved_messages() {
    let server = MockServer::start().await;
    mock_reply(&server, "ok").await;

    let mut session = Session::new(assistant(&server.uri()));
    let questions = ["first", "second", "third", "fourth"];
    for q in questions {
        session.submit(UserInput::Text(q.to_string())).await;
    }

    let messages = session.conversation().messages();
    assert_eq!(messages.len(), 2 * questions.len());
    for (i, q) in questions.iter().enumerate() {
        assert_eq!(messages[2 * i].role, Role::User);
        assert_eq!(messages[2 * i].content, *q);
        assert_eq!(messages[2 * i + 1].role, Role::Bot);
    }
}

#[tokio::test]
async fn test_abandoned_submit_keeps_history() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(body_string_contains("slow question"))
        .respond_with(completion("too late").set_delay(Duration::from_millis(500)))
        .with_priority(1)
        .mount(&server)
        .await;
    mock_reply(&server, "ok").await;

    let mut session = Session::new(assistant(&server.uri()));
    session.submit(UserInput::Text("first".to_string())).await;
    session.submit(UserInput::Text("second".to_string())).await;
    assert_eq!(session.conversation().len(), 4);

    let abandoned = tokio::time::timeout(
        Duration::from_millis(50),
        session.submit(UserInput::Text("slow question".to_string())),
    )
    .await;
    assert!(abandoned.is_err());

    assert_eq!(session.conversation().len(), 4);
    assert_eq!(session.conversation().messages()[2].content, "second");
    assert_eq!(session.state(), SessionState::Idle);

    session.submit(UserInput::Text("third".to_string())).await;
    let messages = session.conversation().messages();
    assert_eq!(messages.len(), 6);
    assert_eq!(messages[4].content, "third");
    assert_eq!(messages[5].content, "ok");
}

#[tokio::test]
async fn test_empty_submission_is_noop() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(completion("unused"))
        .expect(0)
        .mount(&server)
        .await;

    let mut session = Session::new(assistant(&server.uri()));
    session.submit(UserInput::Text(String::new())).await;
    session.submit(UserInput::Text("   ".to_string())).await;
    assert!(session.conversation().is_empty());
}

#[tokio::test]
async fn test_uploaded_file_text_reaches_prompt() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(body_string_contains("UPLOADED FILE (prices.csv)"))
        .and(body_string_contains("Vios XLE, 1000000"))
        .respond_with(completion("The Vios XLE is PHP 1,000,000."))
        .expect(1)
        .mount(&server)
        .await;

    let mut session = Session::new(assistant(&server.uri()));
    session
        .attach_file(&UploadedFile::new(
            "prices.csv",
            "text/csv",
            b"Vios XLE,1000000\n".to_vec(),
        ))
        .await
        .unwrap();
    session
        .submit(UserInput::Text("How much is the XLE?".to_string()))
        .await;

    assert_eq!(
        session.conversation().last().unwrap().content,
        "The Vios XLE is PHP 1,000,000."
    );
}

#[tokio::test]
async fn test_unsupported_upload_leaves_no_file_context() {
    let mut session = Session::new(assistant("http://127.0.0.1:9"));
    session
        .attach_file(&UploadedFile::new("a.txt", "text/plain", b"old".to_vec()))
        .await
        .unwrap();
    assert!(session
        .attach_file(&UploadedFile::new("b.zip", "application/zip", vec![0]))
        .await
        .is_err());
    assert!(session.context().file_name().is_none());
}

#[tokio::test]
async fn test_image_failure_degrades_context() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(500).set_body_string("vision offline"))
        .mount(&server)
        .await;

    let mut session = Session::new(assistant(&server.uri()));
    session.attach_image(b"\x89PNG\r\n\x1a\nrest").await;

    let rendered = session.context().render();
    assert!(rendered.starts_with("IMAGE ANALYSIS:\nError analyzing image: "));
    assert!(rendered.contains("vision offline"));
}

fn pdf_vision_assistant(api_base: &str) -> Arc<Assistant> {
    let client = CompletionClient::new(config(api_base)).unwrap();
    Arc::new(Assistant::new(client, Persona::Dealership).with_pdf_vision(true))
}

fn quote_pdf() -> UploadedFile {
    UploadedFile::new(
        "quote.pdf",
        "application/pdf",
        common::text_pdf(&[Some("Vios"), None, Some("Wigo")]),
    )
}

#[test_log::test(tokio::test)]
async fn test_pdf_vision_sends_document_and_labels_sections() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .and(body_string_contains(r#""type":"file""#))
        .and(body_string_contains(r#""filename":"quote.pdf""#))
        .and(body_string_contains("data:application/pdf;base64,JVBERi0"))
        .and(body_string_contains("Handwritten text"))
        .respond_with(completion(
            "--- PAGE 1 VISUAL ANALYSIS ---\nHandwritten note: discount approved",
        ))
        .expect(1)
        .mount(&server)
        .await;

    let mut session = Session::new(pdf_vision_assistant(&server.uri()));
    session.attach_file(&quote_pdf()).await.unwrap();

    let rendered = session.context().render();
    assert!(rendered.starts_with("UPLOADED FILE (quote.pdf):\nTEXT EXTRACTION:\n"));
    assert!(rendered.contains("Vios"));
    assert!(rendered.ends_with(
        "\n\nVISUAL ANALYSIS (with handwriting detection):\n\
         --- PAGE 1 VISUAL ANALYSIS ---\nHandwritten note: discount approved"
    ));
}

#[tokio::test]
async fn test_pdf_vision_failure_keeps_text_layer() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(500).set_body_string("vision offline"))
        .mount(&server)
        .await;

    let mut session = Session::new(pdf_vision_assistant(&server.uri()));
    session.attach_file(&quote_pdf()).await.unwrap();

    let rendered = session.context().render();
    assert!(rendered.contains("TEXT EXTRACTION:\n"));
    assert!(rendered.contains("Wigo"));
    assert!(rendered.contains(
        "VISUAL ANALYSIS (with handwriting detection):\nError analyzing PDF: \
         completion API returned 500 Internal Server Error: vision offline"
    ));
}

#[tokio::test]
async fn test_pdf_vision_off_sends_nothing() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(completion("unused"))
        .expect(0)
        .mount(&server)
        .await;

    let mut session = Session::new(assistant(&server.uri()));
    session.attach_file(&quote_pdf()).await.unwrap();

    let rendered = session.context().render();
    assert!(rendered.starts_with("UPLOADED FILE (quote.pdf):\n"));
    assert!(!rendered.contains("TEXT EXTRACTION"));
}
