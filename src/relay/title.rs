use futures::StreamExt;
use std::error::Error as StdError;

use super::{ CompletionRelay, RelayRequest };
use crate::models::api::OutboundMessage;
use crate::models::chat::Role;

pub const FALLBACK_TITLE: &str = "New Chat";

const TITLE_MODEL_ID: &str = "gpt-4o-mini";
const MAX_TITLE_CHARS: usize = 40;
const TITLE_INSTRUCTION: &str =
    "Generate a concise chat title (max 40 chars) based on the conversation topics. \
     Output ONLY the title text with no quotes or additional text.";

/// Derives a short label from the first user messages of a conversation.
/// Issues one relay request and drains the whole stream before returning.
pub async fn generate(
    relay: &CompletionRelay,
    api_key: &str,
    user_messages: &[String]
) -> Result<String, Box<dyn StdError + Send + Sync>> {
    let topics = user_messages.join("\n");

    let request = RelayRequest {
        messages: vec![
            OutboundMessage::new(Role::System, TITLE_INSTRUCTION),
            OutboundMessage::new(Role::User, &topics)
        ],
        model: TITLE_MODEL_ID.to_string(),
        file_id: None,
        api_key: api_key.to_string(),
    };

    let mut stream = relay.open_stream(request).await?;
    let mut raw = String::new();
    while let Some(chunk) = stream.next().await {
        raw.push_str(&chunk?);
    }

    Ok(clean_title(&raw))
}

fn clean_title(raw: &str) -> String {
    let first_line = raw.trim().lines().next().unwrap_or("");
    let cleaned = first_line.trim_matches('"').trim_matches('\'').trim();

    if cleaned.is_empty() {
        FALLBACK_TITLE.to_string()
    } else {
        cleaned.chars().take(MAX_TITLE_CHARS).collect()
    }
}
