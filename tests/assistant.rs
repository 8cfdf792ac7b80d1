//! Wire-level tests for the text assistant: request shape, grounded answer
//! parsing, and error surfacing against a canned local HTTP endpoint.

use secrecy::SecretString;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

use agrivoice::{Assistant, Error, Location};

struct Captured {
    head: String,
    body: String,
}

/// Serve exactly one canned HTTP response and capture the request
async fn serve_once(status: &str, body: &str) -> (String, JoinHandle<Captured>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let response = format!(
        "HTTP/1.1 {status}\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{body}",
        body.len()
    );

    let handle = tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        let mut buf = Vec::new();
        let mut tmp = [0u8; 4096];
        loop {
            let n = socket.read(&mut tmp).await.unwrap();
            assert!(n > 0, "client closed before sending a full request");
            buf.extend_from_slice(&tmp[..n]);

            let Some(headers_end) = find(&buf, b"\r\n\r\n") else {
                continue;
            };
            let head = String::from_utf8_lossy(&buf[..headers_end]).to_string();
            let content_length = head
                .lines()
                .find_map(|line| {
                    let (name, value) = line.split_once(':')?;
                    name.eq_ignore_ascii_case("content-length")
                        .then(|| value.trim().parse::<usize>().ok())?
                })
                .unwrap_or(0);

            let body_start = headers_end + 4;
            if buf.len() >= body_start + content_length {
                socket.write_all(response.as_bytes()).await.unwrap();
                socket.shutdown().await.ok();
                let body = String::from_utf8_lossy(&buf[body_start..]).to_string();
                return Captured { head, body };
            }
        }
    });

    (format!("http://{addr}"), handle)
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|w| w == needle)
}

fn assistant(base_url: &str) -> Assistant {
    Assistant::new(
        SecretString::from("test-key".to_string()),
        base_url,
        "test-model",
        "You are a concise farm advisor.",
    )
}

const GROUNDED_RESPONSE: &str = r#"{
    "candidates": [{
        "content": { "parts": [{ "text": "Wheat futures rose this week." }] },
        "groundingMetadata": {
            "groundingChunks": [
                { "web": { "title": "USDA", "uri": "https://usda.gov/report" } },
                { "web": { "title": "USDA copy", "uri": "https://usda.gov/report" } }
            ]
        }
    }]
}"#;

#[tokio::test]
async fn ask_posts_to_the_model_endpoint_and_parses_the_answer() {
    let (base_url, server) = serve_once("200 OK", GROUNDED_RESPONSE).await;

    let answer = assistant(&base_url)
        .ask("How is wheat doing?", None)
        .await
        .unwrap();

    assert_eq!(answer.text, "Wheat futures rose this week.");
    assert_eq!(answer.sources.len(), 1);
    assert_eq!(answer.sources[0].uri, "https://usda.gov/report");

    let captured = server.await.unwrap();
    assert!(captured
        .head
        .starts_with("POST /v1beta/models/test-model:generateContent"));
    assert!(captured.head.to_lowercase().contains("x-goog-api-key: test-key"));
    assert!(captured.body.contains("google_search"));
    assert!(captured.body.contains("systemInstruction"));
    assert!(captured.body.contains("How is wheat doing?"));
}

#[tokio::test]
async fn location_is_prepended_to_the_question() {
    let (base_url, server) = serve_once("200 OK", GROUNDED_RESPONSE).await;

    let location = Location {
        lat: 10.5,
        lng: -3.25,
    };
    assistant(&base_url)
        .ask("What should I plant?", Some(location))
        .await
        .unwrap();

    let captured = server.await.unwrap();
    assert!(captured
        .body
        .contains("User current location: Latitude 10.5, Longitude -3.25."));
    assert!(captured.body.contains("What should I plant?"));
}

#[tokio::test]
async fn market_summary_asks_the_standing_question() {
    let (base_url, server) = serve_once("200 OK", GROUNDED_RESPONSE).await;

    assistant(&base_url).market_summary(None).await.unwrap();

    let captured = server.await.unwrap();
    assert!(captured.body.contains("agricultural market trends"));
    assert!(captured.body.contains("wheat, corn"));
}

#[tokio::test]
async fn api_failure_surfaces_as_an_assistant_error() {
    let (base_url, _server) = serve_once("500 Internal Server Error", "{}").await;

    let err = assistant(&base_url)
        .ask("anything", None)
        .await
        .unwrap_err();

    assert!(matches!(err, Error::Assistant(_)));
    assert!(err.to_string().contains("500"));
}

#[tokio::test]
async fn empty_response_falls_back_to_an_apology() {
    let (base_url, _server) = serve_once("200 OK", r#"{"candidates": []}"#).await;

    let answer = assistant(&base_url).ask("anything", None).await.unwrap();

    assert!(answer.text.starts_with("I'm sorry"));
    assert!(answer.sources.is_empty());
}
