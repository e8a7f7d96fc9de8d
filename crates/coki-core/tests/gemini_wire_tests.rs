//! Wire-format tests: a one-shot HTTP/1.1 server on loopback captures what
//! the Gemini client sends and replies with a canned body. No network access
//! or API key is needed.

use std::collections::HashMap;

use coki_core::{
    dispatch, ChatSession, ChatTransport, GeminiClient, ImageGenerator, ImageSize, SearchLink,
    ServiceError, SessionStatus, Turn, WebSearch, APOLOGY_TEXT,
};
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpListener;

#[derive(Debug)]
struct CapturedRequest {
    method: String,
    path: String,
    headers: HashMap<String, String>,
    body: Value,
}

/// Accept exactly one request, capture it and answer with `status` + `body`
async fn mock_server_once(
    status: u16,
    content_type: &'static str,
    resp_body: impl Into<String> + Send + 'static,
) -> (String, tokio::sync::oneshot::Receiver<CapturedRequest>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let (tx, rx) = tokio::sync::oneshot::channel::<CapturedRequest>();

    tokio::spawn(async move {
        let resp_body: String = resp_body.into();
        let (stream, _) = listener.accept().await.expect("accept");
        let (read_half, mut write_half) = stream.into_split();
        let mut reader = BufReader::new(read_half);

        let mut request_line = String::new();
        reader.read_line(&mut request_line).await.unwrap();
        let mut parts = request_line.trim().splitn(3, ' ');
        let method = parts.next().unwrap_or("").to_string();
        let path = parts.next().unwrap_or("").to_string();

        let mut headers = HashMap::new();
        let mut content_length = 0usize;
        loop {
            let mut line = String::new();
            reader.read_line(&mut line).await.unwrap();
            let trimmed = line.trim();
            if trimmed.is_empty() {
                break;
            }
            if let Some((k, v)) = trimmed.split_once(": ") {
                let key = k.to_lowercase();
                if key == "content-length" {
                    content_length = v.parse().unwrap_or(0);
                }
                headers.insert(key, v.to_string());
            }
        }

        let mut body_bytes = vec![0u8; content_length];
        reader.read_exact(&mut body_bytes).await.unwrap();
        let body = serde_json::from_slice(&body_bytes).unwrap_or(Value::Null);

        let _ = tx.send(CapturedRequest {
            method,
            path,
            headers,
            body,
        });

        let http_resp = format!(
            "HTTP/1.1 {status} OK\r\nContent-Type: {content_type}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
            resp_body.len(),
            resp_body,
        );
        let _ = write_half.write_all(http_resp.as_bytes()).await;
    });

    (format!("http://127.0.0.1:{port}"), rx)
}

fn sse_body(chunks: &[&str]) -> String {
    chunks.iter().map(|c| format!("data: {c}\r\n\r\n")).collect()
}

fn text_chunk(text: &str) -> String {
    serde_json::json!({
        "candidates": [{ "content": { "role": "model", "parts": [{ "text": text }] } }]
    })
    .to_string()
}

async fn run_chat(client: &GeminiClient, turns: &[Turn], message: &str) -> (Vec<String>, Result<(), ServiceError>) {
    let mut fragments = Vec::new();
    let mut on_fragment = |text: &str| fragments.push(text.to_string());
    let result = client.send(turns, message, &mut on_fragment).await;
    (fragments, result)
}

#[tokio::test]
async fn chat_streams_fragments_in_order() {
    let chunks = [text_chunk("Hi"), text_chunk(" there"), text_chunk("!")];
    let body = sse_body(&chunks.iter().map(String::as_str).collect::<Vec<_>>());
    let (base, req_rx) = mock_server_once(200, "text/event-stream", body).await;

    let client = GeminiClient::new("test-key").with_base_url(&base);
    let turns = vec![Turn::user("Hello")];
    let (fragments, result) = run_chat(&client, &turns, "Hello").await;

    result.unwrap();
    assert_eq!(fragments, vec!["Hi", " there", "!"]);

    let req = req_rx.await.unwrap();
    assert_eq!(req.method, "POST");
    assert_eq!(
        req.path,
        "/v1beta/models/gemini-3-pro-preview:streamGenerateContent?alt=sse"
    );
    assert_eq!(req.headers.get("x-goog-api-key").map(String::as_str), Some("test-key"));
    assert_eq!(
        req.body["contents"],
        serde_json::json!([{ "role": "user", "parts": [{ "text": "Hello" }] }])
    );
}

#[tokio::test]
async fn chat_sends_full_history() {
    let (base, req_rx) = mock_server_once(200, "text/event-stream", sse_body(&[text_chunk("ok").as_str()])).await;

    let client = GeminiClient::new("k").with_base_url(&base);
    let turns = vec![Turn::user("Hello"), Turn::model("Hi!"), Turn::user("Again")];
    let (_, result) = run_chat(&client, &turns, "Again").await;
    result.unwrap();

    let req = req_rx.await.unwrap();
    let contents = req.body["contents"].as_array().unwrap();
    assert_eq!(contents.len(), 3);
    assert_eq!(contents[1]["role"], "model");
    assert_eq!(contents[1]["parts"][0]["text"], "Hi!");
    assert_eq!(contents[2]["parts"][0]["text"], "Again");
}

#[tokio::test]
async fn chat_error_status_fails_without_fragments() {
    let body = r#"{"error":{"code":500,"message":"backend exploded","status":"INTERNAL"}}"#;
    let (base, _req_rx) = mock_server_once(500, "application/json", body).await;

    let client = GeminiClient::new("k").with_base_url(&base);
    let (fragments, result) = run_chat(&client, &[Turn::user("Ping")], "Ping").await;

    assert!(fragments.is_empty());
    match result {
        Err(ServiceError::Remote { status, message }) => {
            assert_eq!(status, 500);
            assert_eq!(message, "backend exploded");
        }
        other => panic!("unexpected result: {other:?}"),
    }
}

#[tokio::test]
async fn chat_malformed_chunk_fails_after_earlier_fragments() {
    let body = sse_body(&[text_chunk("partial").as_str(), "{oops"]);
    let (base, _req_rx) = mock_server_once(200, "text/event-stream", body).await;

    let client = GeminiClient::new("k").with_base_url(&base);
    let (fragments, result) = run_chat(&client, &[Turn::user("Hi")], "Hi").await;

    assert_eq!(fragments, vec!["partial"]);
    assert!(matches!(result, Err(ServiceError::Stream(_))));
}

#[tokio::test]
async fn chat_connection_refused_is_transport_error() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);

    let client = GeminiClient::new("k").with_base_url(&format!("http://127.0.0.1:{port}"));
    let (_, result) = run_chat(&client, &[Turn::user("Hi")], "Hi").await;

    assert!(matches!(result, Err(ServiceError::Transport(_))));
}

/// Drive one submission through `dispatch` and apply every event to `session`
async fn run_session(client: &GeminiClient, session: &mut ChatSession, message: &str) {
    let submission = session.submit(message).unwrap();
    let mut events = Vec::new();
    dispatch(client, submission, |event| events.push(event)).await;
    for event in events {
        session.apply(event);
    }
}

#[tokio::test]
async fn chat_dispatch_fills_session_transcript() {
    let chunks = [text_chunk("Hi"), text_chunk(" there!")];
    let body = sse_body(&chunks.iter().map(String::as_str).collect::<Vec<_>>());
    let (base, _req_rx) = mock_server_once(200, "text/event-stream", body).await;

    let client = GeminiClient::new("k").with_base_url(&base);
    let mut session = ChatSession::new();
    run_session(&client, &mut session, "Hello").await;

    assert_eq!(session.transcript(), &[Turn::user("Hello"), Turn::model("Hi there!")]);
    assert_eq!(session.status(), SessionStatus::Idle);
}

#[tokio::test]
async fn chat_dispatch_truncated_stream_apologises() {
    // Cut off in the middle of a JSON chunk, with no closing blank line
    let body = format!("data: {}\r\n\r\ndata: {{\"candidates\": [", text_chunk("partial"));
    let (base, _req_rx) = mock_server_once(200, "text/event-stream", body).await;

    let client = GeminiClient::new("k").with_base_url(&base);
    let mut session = ChatSession::new();
    run_session(&client, &mut session, "Hello").await;

    assert_eq!(session.transcript(), &[Turn::user("Hello"), Turn::model(APOLOGY_TEXT)]);
    assert_eq!(session.status(), SessionStatus::Idle);
}

#[tokio::test]
async fn chat_dispatch_refused_connection_apologises() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);

    let client = GeminiClient::new("k").with_base_url(&format!("http://127.0.0.1:{port}"));
    let mut session = ChatSession::new();
    run_session(&client, &mut session, "Hello").await;

    assert_eq!(session.transcript(), &[Turn::user("Hello"), Turn::model(APOLOGY_TEXT)]);
    assert_eq!(session.status(), SessionStatus::Idle);
}

#[tokio::test]
async fn search_returns_summary_and_deduped_links() {
    let body = serde_json::json!({
        "candidates": [{
            "content": { "parts": [{ "text": "Rust is a language." }] },
            "groundingMetadata": { "groundingChunks": [
                { "web": { "uri": "https://rust-lang.org", "title": "Rust" } },
                { "web": { "uri": "https://doc.rust-lang.org", "title": "Docs" } },
                { "web": { "uri": "https://rust-lang.org", "title": "Rust again" } }
            ]}
        }]
    })
    .to_string();
    let (base, req_rx) = mock_server_once(200, "application/json", body).await;

    let client = GeminiClient::new("k").with_base_url(&base);
    let outcome = client.search("what is rust").await.unwrap();

    assert_eq!(outcome.summary, "Rust is a language.");
    assert_eq!(
        outcome.links,
        vec![
            SearchLink::new("Rust", "https://rust-lang.org"),
            SearchLink::new("Docs", "https://doc.rust-lang.org"),
        ]
    );

    let req = req_rx.await.unwrap();
    assert_eq!(req.path, "/v1beta/models/gemini-2.5-flash:generateContent");
    assert_eq!(req.body["tools"], serde_json::json!([{ "googleSearch": {} }]));
    assert_eq!(req.body["contents"][0]["parts"][0]["text"], "what is rust");
}

#[tokio::test]
async fn search_without_text_uses_placeholder_summary() {
    let (base, _req_rx) = mock_server_once(200, "application/json", r#"{"candidates":[]}"#).await;

    let client = GeminiClient::new("k").with_base_url(&base);
    let outcome = client.search("nothing").await.unwrap();

    assert_eq!(outcome.summary, "No summary available.");
    assert!(outcome.links.is_empty());
}

#[tokio::test]
async fn image_decodes_inline_data() {
    let body = serde_json::json!({
        "candidates": [{ "content": { "parts": [
            { "text": "Here you go" },
            { "inlineData": { "mimeType": "image/png", "data": "iVBORw0K" } }
        ]}}]
    })
    .to_string();
    let (base, req_rx) = mock_server_once(200, "application/json", body).await;

    let client = GeminiClient::new("k").with_base_url(&base);
    let image = client.generate("a crystal city", ImageSize::TwoK).await.unwrap();

    assert_eq!(image.mime_type, "image/png");
    assert_eq!(image.data, vec![0x89, b'P', b'N', b'G', 0x0D, 0x0A]);

    let req = req_rx.await.unwrap();
    assert_eq!(req.path, "/v1beta/models/gemini-3-pro-image-preview:generateContent");
    assert_eq!(req.body["generationConfig"]["imageConfig"]["imageSize"], "2K");
    assert_eq!(req.body["generationConfig"]["imageConfig"]["aspectRatio"], "1:1");
}

#[tokio::test]
async fn image_without_inline_data_fails() {
    let body = r#"{"candidates":[{"content":{"parts":[{"text":"I cannot draw that"}]}}]}"#;
    let (base, _req_rx) = mock_server_once(200, "application/json", body).await;

    let client = GeminiClient::new("k").with_base_url(&base);
    let err = client.generate("x", ImageSize::OneK).await.unwrap_err();

    assert!(matches!(err, ServiceError::NoImageData));
}

#[tokio::test]
async fn image_not_found_is_authorization_error() {
    let body = r#"{"error":{"code":404,"message":"Requested entity was not found.","status":"NOT_FOUND"}}"#;
    let (base, _req_rx) = mock_server_once(404, "application/json", body).await;

    let client = GeminiClient::new("k").with_base_url(&base);
    let err = client.generate("x", ImageSize::FourK).await.unwrap_err();

    assert!(err.is_authorization());
}
