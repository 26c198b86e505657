use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Mutex;

use crate::core::app::App;
use crate::core::session::ProfileSnapshot;
use crate::core::store::SessionStore;

pub fn test_profile() -> ProfileSnapshot {
    ProfileSnapshot::new("Assistant", "You are a helpful assistant.")
}

/// An app with no persistence and a resolved model.
pub fn create_test_app() -> App {
    let mut app = App::new(SessionStore::new(), Some("test-model".to_string()));
    app.begin_session(test_profile());
    app
}

#[derive(Debug, Clone)]
pub struct MockResponse {
    pub status: u16,
    pub body: String,
    pub delay: Duration,
}

impl MockResponse {
    pub fn json(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
            delay: Duration::ZERO,
        }
    }

    pub fn delayed(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

#[derive(Debug, Clone)]
pub struct CapturedRequest {
    pub request_line: String,
    pub body: Vec<u8>,
}

impl CapturedRequest {
    pub fn json(&self) -> serde_json::Value {
        serde_json::from_slice(&self.body).unwrap_or(serde_json::Value::Null)
    }
}

pub type CapturedRequests = Arc<Mutex<Vec<CapturedRequest>>>;

/// Serve the scripted responses in order, one connection each.
pub async fn spawn_mock_server(responses: Vec<MockResponse>) -> (String, CapturedRequests) {
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("listener should bind");
    let addr = listener.local_addr().expect("local addr should resolve");
    let captured: CapturedRequests = Arc::new(Mutex::new(Vec::new()));
    let captured_for_server = Arc::clone(&captured);

    tokio::spawn(async move {
        for scripted in responses {
            let Ok((mut stream, _)) = listener.accept().await else {
                return;
            };
            let Ok((request_line, body)) = read_http_request(&mut stream).await else {
                continue;
            };
            captured_for_server
                .lock()
                .await
                .push(CapturedRequest { request_line, body });

            if !scripted.delay.is_zero() {
                tokio::time::sleep(scripted.delay).await;
            }
            let response = format!(
                "HTTP/1.1 {} Mock\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                scripted.status,
                scripted.body.len(),
                scripted.body
            );
            let _ = stream.write_all(response.as_bytes()).await;
            let _ = stream.shutdown().await;
        }
    });

    (format!("http://{addr}"), captured)
}

async fn read_http_request(stream: &mut TcpStream) -> Result<(String, Vec<u8>), String> {
    let mut buffer = Vec::new();
    let mut header_end = None;
    while header_end.is_none() {
        let mut chunk = [0_u8; 1024];
        let read = stream
            .read(&mut chunk)
            .await
            .map_err(|err| err.to_string())?;
        if read == 0 {
            return Err("Unexpected EOF while reading HTTP headers".to_string());
        }
        buffer.extend_from_slice(&chunk[..read]);
        header_end = buffer
            .windows(4)
            .position(|window| window == b"\r\n\r\n")
            .map(|index| index + 4);
    }

    let header_end = header_end.expect("header end should exist");
    let header_text =
        std::str::from_utf8(&buffer[..header_end]).map_err(|err| err.to_string())?;
    let mut lines = header_text.split("\r\n").filter(|line| !line.is_empty());
    let request_line = lines
        .next()
        .ok_or_else(|| "Missing HTTP request line".to_string())?
        .to_string();

    let mut content_length = 0_usize;
    for line in lines {
        let mut parts = line.splitn(2, ':');
        let Some(name) = parts.next() else {
            continue;
        };
        let value = parts.next().unwrap_or_default().trim();
        if name.eq_ignore_ascii_case("content-length") {
            content_length = value.parse::<usize>().map_err(|err| err.to_string())?;
        }
    }

    let mut body = buffer[header_end..].to_vec();
    while body.len() < content_length {
        let mut chunk = vec![0_u8; content_length - body.len()];
        let read = stream
            .read(&mut chunk)
            .await
            .map_err(|err| err.to_string())?;
        if read == 0 {
            break;
        }
        body.extend_from_slice(&chunk[..read]);
    }

    Ok((request_line, body))
}

pub fn chat_completion_body(content: &str) -> String {
    serde_json::json!({
        "choices": [{
            "message": { "role": "assistant", "content": content },
            "finish_reason": "stop"
        }],
        "usage": { "prompt_tokens": 5, "completion_tokens": 3, "total_tokens": 8 }
    })
    .to_string()
}
