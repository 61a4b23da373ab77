pub mod title;

use futures::StreamExt;
use std::error::Error as StdError;
use std::sync::Arc;
use thiserror::Error;

use crate::llm::chat::{ CompletionClient, TokenStream };
use crate::llm::find_model;
use crate::models::api::OutboundMessage;
use crate::models::chat::Role;

#[derive(Debug, Error)]
pub enum RelayError {
    #[error("API key not set")]
    Unauthorized,

    #[error("Invalid model specified: {0}")]
    InvalidModel(String),

    #[error("upstream completion request failed: {0}")]
    Upstream(#[source] Box<dyn StdError + Send + Sync>),
}

pub struct RelayRequest {
    pub messages: Vec<OutboundMessage>,
    pub model: String,
    pub file_id: Option<String>,
    pub api_key: String,
}

/// Forwards a chat request to the completion service and hands back the
/// token stream untouched apart from chunk framing. Holds no per-request
/// state; every call is independent.
pub struct CompletionRelay {
    client: Arc<dyn CompletionClient>,
}

impl CompletionRelay {
    pub fn new(client: Arc<dyn CompletionClient>) -> Self {
        Self { client }
    }

    /// Credential and model checks happen before the upstream is
    /// contacted. A `file_id` is injected as a synthetic leading system
    /// message; the attachment itself is never fetched or validated here.
    pub async fn open_stream(&self, request: RelayRequest) -> Result<TokenStream, RelayError> {
        if request.api_key.is_empty() {
            return Err(RelayError::Unauthorized);
        }

        let model = find_model(&request.model).ok_or_else(||
            RelayError::InvalidModel(request.model.clone())
        )?;

        let mut messages = Vec::with_capacity(request.messages.len() + 1);
        if let Some(file_id) = &request.file_id {
            messages.push(
                OutboundMessage::new(
                    Role::System,
                    &format!("Using the uploaded file with ID: {}", file_id)
                )
            );
        }
        messages.extend(request.messages);

        let stream = self.client
            .generate(&request.api_key, model.alias, &messages).await
            .map_err(RelayError::Upstream)?;

        Ok(drop_empty_chunks(stream))
    }
}

fn drop_empty_chunks(stream: TokenStream) -> TokenStream {
    Box::pin(
        stream.filter(|chunk| {
            let keep = !matches!(chunk, Ok(content) if content.is_empty());
            futures::future::ready(keep)
        })
    )
}

#[cfg(test)]
pub(crate) mod test_support {
    use async_trait::async_trait;
    use std::error::Error as StdError;
    use std::sync::Mutex;

    use crate::llm::chat::{ CompletionClient, TokenStream };
    use crate::models::api::OutboundMessage;

    #[derive(Clone, Debug)]
    pub struct RecordedCall {
        pub api_key: String,
        pub model: String,
        pub messages: Vec<OutboundMessage>,
    }

    /// Scripted stand-in for the completion service. Each chunk is either
    /// a token or the message of a mid-stream error; `fail_on_open`
    /// simulates a request that never produces a stream.
    pub struct FakeCompletionClient {
        chunks: Vec<Result<String, String>>,
        fail_on_open: bool,
        pub calls: Mutex<Vec<RecordedCall>>,
    }

    impl FakeCompletionClient {
        pub fn streaming(chunks: &[&str]) -> Self {
            Self {
                chunks: chunks
                    .iter()
                    .map(|c| Ok(c.to_string()))
                    .collect(),
                fail_on_open: false,
                calls: Mutex::new(Vec::new()),
            }
        }

        pub fn with_chunks(chunks: Vec<Result<String, String>>) -> Self {
            Self {
                chunks,
                fail_on_open: false,
                calls: Mutex::new(Vec::new()),
            }
        }

        pub fn failing() -> Self {
            Self {
                chunks: Vec::new(),
                fail_on_open: true,
                calls: Mutex::new(Vec::new()),
            }
        }

        pub fn call_count(&self) -> usize {
            self.calls.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl CompletionClient for FakeCompletionClient {
        async fn generate(
            &self,
            api_key: &str,
            model: &str,
            messages: &[OutboundMessage]
        ) -> Result<TokenStream, Box<dyn StdError + Send + Sync>> {
            self.calls.lock().unwrap().push(RecordedCall {
                api_key: api_key.to_string(),
                model: model.to_string(),
                messages: messages.to_vec(),
            });

            if self.fail_on_open {
                return Err("connection refused".into());
            }

            let items: Vec<Result<String, Box<dyn StdError + Send + Sync>>> = self.chunks
                .iter()
                .map(|chunk| {
                    match chunk {
                        Ok(token) => Ok(token.clone()),
                        Err(message) => Err(message.clone().into()),
                    }
                })
                .collect();

            Ok(Box::pin(tokio_stream::iter(items)))
        }
    }
}
