//! OpenAI-compatible chat-completions backend.
//!
//! Sends the full conversation with bearer-token auth and extracts the first
//! choice's message content.

use super::{CompletionBackend, ExchangeError};
use crate::message::Message;
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

/// Chat-completions backend over HTTPS.
pub struct OpenAIBackend {
    pub model: String,
    api_key: String,
    api_url: String,
    timeout: Duration,
    client: Client,
}

impl OpenAIBackend {
    /// Create a new backend. `timeout` bounds the whole exchange.
    pub fn new(
        model: String,
        api_key: String,
        api_url: String,
        timeout: Duration,
    ) -> Result<Self, ExchangeError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(ExchangeError::Client)?;

        Ok(Self {
            model,
            api_key,
            api_url,
            timeout,
            client,
        })
    }

    fn classify(&self, err: reqwest::Error) -> ExchangeError {
        if err.is_timeout() {
            ExchangeError::Timeout(self.timeout)
        } else {
            ExchangeError::Network(err)
        }
    }
}

#[async_trait]
impl CompletionBackend for OpenAIBackend {
    fn name(&self) -> &str {
        "openai"
    }

    async fn complete(&self, messages: &[Message]) -> Result<String, ExchangeError> {
        let request = ChatRequest {
            model: &self.model,
            messages,
        };
        debug!(
            "POST {} (model {}, {} messages)",
            self.api_url,
            self.model,
            messages.len()
        );

        let response = self
            .client
            .post(&self.api_url)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| self.classify(e))?;

        let status = response.status();
        let body = response.bytes().await.map_err(|e| self.classify(e))?;
        debug!("Completion endpoint answered {} ({} bytes)", status, body.len());

        parse_completion(status, &body)
    }
}

/// Classify a completion response into reply text or a specific error.
pub fn parse_completion(status: StatusCode, body: &[u8]) -> Result<String, ExchangeError> {
    if !status.is_success() {
        let message = serde_json::from_slice::<ErrorEnvelope>(body)
            .ok()
            .and_then(|e| e.error)
            .and_then(|e| e.message)
            .filter(|m| !m.trim().is_empty());
        return Err(match message {
            Some(message) => ExchangeError::Api {
                status: status.as_u16(),
                message,
            },
            None => ExchangeError::Status(status.to_string()),
        });
    }

    let response: ChatResponse =
        serde_json::from_slice(body).map_err(|e| ExchangeError::Decode(e.to_string()))?;

    let choice = response
        .choices
        .ok_or(ExchangeError::UnexpectedFormat("missing `choices`"))?
        .into_iter()
        .next()
        .ok_or(ExchangeError::UnexpectedFormat("no completion choices returned"))?;

    let content = choice
        .message
        .ok_or(ExchangeError::UnexpectedFormat("choice has no `message`"))?
        .content
        .ok_or(ExchangeError::UnexpectedFormat("message has no `content`"))?;

    Ok(content.trim().to_string())
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [Message],
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Option<Vec<ChatChoice>>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: Option<ChatMessage>,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: Option<ErrorDetail>,
}

#[derive(Debug, Deserialize)]
struct ErrorDetail {
    message: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    #[test]
    fn test_success_trims_first_choice() {
        let body = br#"{"choices":[{"message":{"role":"assistant","content":"  hi there\n"}},{"message":{"content":"second"}}]}"#;
        assert_eq!(parse_completion(StatusCode::OK, body).unwrap(), "hi there");
    }

    #[test]
    fn test_error_envelope_message() {
        let body = br#"{"error":{"message":"Incorrect API key provided","type":"invalid_request_error"}}"#;
        let err = parse_completion(StatusCode::UNAUTHORIZED, body).unwrap_err();
        assert!(matches!(err, ExchangeError::Api { status: 401, .. }));
        assert_eq!(err.to_string(), "Incorrect API key provided (HTTP 401)");
    }

    #[test]
    fn test_error_without_envelope_reports_status() {
        let err = parse_completion(StatusCode::BAD_GATEWAY, b"<html>bad gateway</html>").unwrap_err();
        assert_eq!(
            err.to_string(),
            "received non-success response status: 502 Bad Gateway"
        );
    }

    #[test]
    fn test_malformed_json() {
        let err = parse_completion(StatusCode::OK, b"not json").unwrap_err();
        assert!(matches!(err, ExchangeError::Decode(_)));
    }

    #[test]
    fn test_missing_fields() {
        let cases: [(&[u8], &str); 4] = [
            (&b"{}"[..], "missing `choices`"),
            (&br#"{"choices":[]}"#[..], "no completion choices returned"),
            (&br#"{"choices":[{}]}"#[..], "choice has no `message`"),
            (&br#"{"choices":[{"message":{"content":null}}]}"#[..], "message has no `content`"),
        ];
        for (body, expected) in cases {
            match parse_completion(StatusCode::OK, body) {
                Err(ExchangeError::UnexpectedFormat(msg)) => assert_eq!(msg, expected),
                other => panic!("unexpected result for {:?}: {:?}", body, other),
            }
        }
    }

    /// Backend for a local test server; ignores any proxy settings in the environment.
    fn local_backend(url: String, timeout: Duration) -> OpenAIBackend {
        OpenAIBackend {
            model: "gpt-4".to_string(),
            api_key: "sk-test".to_string(),
            api_url: url,
            timeout,
            client: Client::builder().no_proxy().timeout(timeout).build().unwrap(),
        }
    }

    /// Accept one connection, capture the raw request and answer with `response`.
    async fn one_shot_server(response: String) -> (String, tokio::task::JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("http://{}/v1/chat/completions", listener.local_addr().unwrap());
        let handle = tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let mut raw = Vec::new();
            let mut buf = [0u8; 4096];
            loop {
                let n = stream.read(&mut buf).await.unwrap();
                raw.extend_from_slice(&buf[..n]);
                let text = String::from_utf8_lossy(&raw).to_string();
                if let Some(end) = text.find("\r\n\r\n") {
                    let length = text[..end]
                        .lines()
                        .find_map(|l| {
                            let lower = l.to_ascii_lowercase();
                            lower
                                .strip_prefix("content-length:")
                                .map(|v| v.trim().parse::<usize>().unwrap())
                        })
                        .unwrap_or(0);
                    if raw.len() >= end + 4 + length {
                        break;
                    }
                }
                if n == 0 {
                    break;
                }
            }
            stream.write_all(response.as_bytes()).await.unwrap();
            stream.shutdown().await.unwrap();
            String::from_utf8_lossy(&raw).to_string()
        });
        (url, handle)
    }

    #[tokio::test]
    async fn test_complete_over_http() {
        let body = r#"{"choices":[{"message":{"content":"pong"}}]}"#;
        let response = format!(
            "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
            body.len(),
            body
        );
        let (url, server) = one_shot_server(response).await;

        let backend = local_backend(url, Duration::from_secs(5));
        let reply = backend
            .complete(&[Message::system("be brief"), Message::user("ping")])
            .await
            .unwrap();
        assert_eq!(reply, "pong");

        let request = server.await.unwrap();
        assert!(request.starts_with("POST /v1/chat/completions"));
        assert!(request.to_ascii_lowercase().contains("authorization: bearer sk-test"));
        let json_start = request.find("\r\n\r\n").unwrap() + 4;
        let sent: serde_json::Value = serde_json::from_str(&request[json_start..]).unwrap();
        assert_eq!(
            sent,
            serde_json::json!({
                "model": "gpt-4",
                "messages": [
                    {"role": "system", "content": "be brief"},
                    {"role": "user", "content": "ping"}
                ]
            })
        );
    }

    #[tokio::test]
    async fn test_timeout_is_classified() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("http://{}/", listener.local_addr().unwrap());
        let _server = tokio::spawn(async move {
            let (_stream, _) = listener.accept().await.unwrap();
            tokio::time::sleep(Duration::from_secs(10)).await;
        });

        let backend = local_backend(url, Duration::from_millis(200));
        let err = backend.complete(&[Message::user("ping")]).await.unwrap_err();
        assert!(matches!(err, ExchangeError::Timeout(_)), "got {:?}", err);
    }

    #[tokio::test]
    async fn test_connection_refused_is_network_error() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("http://{}/", listener.local_addr().unwrap());
        drop(listener);

        let backend = local_backend(url, Duration::from_secs(5));
        let err = backend.complete(&[Message::user("ping")]).await.unwrap_err();
        assert!(matches!(err, ExchangeError::Network(_)), "got {:?}", err);
        let source = std::error::Error::source(&err)
            .and_then(|s| s.downcast_ref::<reqwest::Error>())
            .expect("reqwest error kept as source");
        assert!(source.is_connect());
    }
}
