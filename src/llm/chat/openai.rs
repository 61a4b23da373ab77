use async_trait::async_trait;
use futures::StreamExt;
use log::debug;
use reqwest::Client as HttpClient;
use serde::{ Deserialize, Serialize };
use std::error::Error as StdError;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

use super::{ CompletionClient, FileUploader, TokenStream };
use crate::models::api::OutboundMessage;

pub struct OpenAIChatClient {
    http: HttpClient,
    base_url: String,
}

#[derive(Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: &'a [OutboundMessage],
    temperature: f32,
    stream: bool,
}

#[derive(Deserialize)]
struct StreamResponse {
    choices: Vec<StreamChoice>,
}

#[derive(Deserialize)]
struct StreamChoice {
    delta: StreamDelta,
    finish_reason: Option<String>,
}

#[derive(Deserialize)]
struct StreamDelta {
    content: Option<String>,
}

#[derive(Deserialize)]
struct FileUploadResponse {
    id: String,
}

impl OpenAIChatClient {
    pub fn new(base_url: String) -> Self {
        Self {
            http: HttpClient::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path)
    }
}

/// Pulls the human-readable message out of an OpenAI error body, falling
/// back to the raw body when it does not have the expected shape.
fn upstream_error_message(body: &str) -> String {
    serde_json
        ::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| {
            v.get("error")
                .and_then(|e| e.get("message"))
                .and_then(|m| m.as_str())
                .map(|m| m.to_string())
        })
        .unwrap_or_else(|| body.trim().to_string())
}

/// Reads the SSE body and forwards every non-empty content delta to `tx`.
/// Lines are buffered across chunk boundaries; unparseable data lines are
/// skipped. Stops when the receiver goes away.
async fn forward_sse_stream(
    resp: reqwest::Response,
    tx: mpsc::Sender<Result<String, Box<dyn StdError + Send + Sync>>>
) {
    let mut bytes = resp.bytes_stream();
    let mut pending = String::new();

    while let Some(chunk) = bytes.next().await {
        let chunk = match chunk {
            Ok(buf) => buf,
            Err(e) => {
                let _ = tx.send(Err(Box::new(e) as _)).await;
                return;
            }
        };

        pending.push_str(&String::from_utf8_lossy(&chunk));

        while let Some(pos) = pending.find('\n') {
            let line: String = pending.drain(..=pos).collect();
            let line = line.trim_end();

            if line.is_empty() {
                continue;
            }
            if line == "data: [DONE]" {
                return;
            }

            let data = match line.strip_prefix("data: ") {
                Some(data) => data,
                None => continue,
            };

            match serde_json::from_str::<StreamResponse>(data) {
                Ok(stream_resp) => {
                    for choice in stream_resp.choices {
                        if let Some(content) = choice.delta.content {
                            if !content.is_empty() && tx.send(Ok(content)).await.is_err() {
                                return;
                            }
                        }
                        if choice.finish_reason.as_deref() == Some("stop") {
                            return;
                        }
                    }
                }
                Err(e) => {
                    debug!("Skipping unparseable stream line: {} ({})", data, e);
                }
            }
        }
    }
}

#[async_trait]
impl CompletionClient for OpenAIChatClient {
    async fn generate(
        &self,
        api_key: &str,
        model: &str,
        messages: &[OutboundMessage]
    ) -> Result<TokenStream, Box<dyn StdError + Send + Sync>> {
        let req = ChatCompletionRequest {
            model,
            messages,
            temperature: 1.0,
            stream: true,
        };

        let resp = self.http
            .post(self.endpoint("chat/completions"))
            .bearer_auth(api_key)
            .json(&req)
            .send().await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(
                format!("OpenAI API error ({}): {}", status, upstream_error_message(&body)).into()
            );
        }

        let (tx, rx) = mpsc::channel(32);
        tokio::spawn(async move {
            forward_sse_stream(resp, tx).await;
        });

        Ok(Box::pin(ReceiverStream::new(rx)))
    }
}

#[async_trait]
impl FileUploader for OpenAIChatClient {
    async fn upload(
        &self,
        api_key: &str,
        file_name: &str,
        bytes: Vec<u8>
    ) -> Result<String, Box<dyn StdError + Send + Sync>> {
        let part = reqwest::multipart::Part::bytes(bytes).file_name(file_name.to_string());
        let form = reqwest::multipart::Form
            ::new()
            .text("purpose", "assistants")
            .part("file", part);

        let resp = self.http
            .post(self.endpoint("files"))
            .bearer_auth(api_key)
            .multipart(form)
            .send().await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(
                format!("OpenAI API error ({}): {}", status, upstream_error_message(&body)).into()
            );
        }

        let upload: FileUploadResponse = resp.json().await?;
        Ok(upload.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn upstream_error_message_prefers_the_nested_message() {
        let body = r#"{"error":{"message":"Incorrect API key provided","type":"invalid_request_error"}}"#;
        assert_eq!(upstream_error_message(body), "Incorrect API key provided");
    }

    #[test]
    fn upstream_error_message_falls_back_to_the_raw_body() {
        assert_eq!(upstream_error_message("bad gateway"), "bad gateway");
        assert_eq!(upstream_error_message("{\"error\":42}"), "{\"error\":42}");
    }

    #[test]
    fn chat_request_serializes_roles_lowercase() {
        use crate::models::chat::Role;

        let messages = vec![
            OutboundMessage::new(Role::System, "context"),
            OutboundMessage::new(Role::User, "hi")
        ];
        let req = ChatCompletionRequest {
            model: "gpt-4o-mini",
            messages: &messages,
            temperature: 1.0,
            stream: true,
        };
        let json = serde_json::to_value(&req).unwrap();
        assert_eq!(json["messages"][0]["role"], "system");
        assert_eq!(json["messages"][1]["role"], "user");
        assert_eq!(json["stream"], true);
    }
}
