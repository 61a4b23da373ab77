use futures::StreamExt;
use log::warn;
use std::collections::HashMap;
use std::error::Error as StdError;
use std::path::PathBuf;
use std::sync::Arc;

use crate::config::settings::{ save_settings, Settings };
use crate::llm::chat::TokenStream;
use crate::models::api::OutboundMessage;
use crate::models::chat::{ Conversation, Message, Role };
use crate::relay::{ title, CompletionRelay, RelayError, RelayRequest };
use crate::store::{ ConversationStore, StoreError };

const FIRST_MESSAGE_TITLE_CHARS: usize = 30;
const TITLE_GENERATION_TURN: usize = 3;

/// Where a conversation's current title came from. Absent from the map
/// means untitled. A generated or manual title is never replaced by the
/// generator again.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum TitleOrigin {
    FirstMessage,
    Generated,
    Manual,
}

/// Owned client-side state: the conversation list, the active selection,
/// the selected model and the stored credential. Intended to be held by a
/// single UI binding; all mutations go through `&mut self` and run to
/// completion apart from awaits on the relay, the store and title
/// generation.
pub struct ChatSession {
    relay: Arc<CompletionRelay>,
    store: Arc<dyn ConversationStore>,
    settings: Settings,
    settings_path: PathBuf,
    conversations: Vec<Conversation>,
    active: Option<String>,
    title_origins: HashMap<String, TitleOrigin>,
}

impl ChatSession {
    pub fn new(
        relay: Arc<CompletionRelay>,
        store: Arc<dyn ConversationStore>,
        settings: Settings,
        settings_path: PathBuf
    ) -> Self {
        Self {
            relay,
            store,
            settings,
            settings_path,
            conversations: Vec::new(),
            active: None,
            title_origins: HashMap::new(),
        }
    }

    /// Replaces the in-memory list with the persisted one. Conversations
    /// that already carry a title are treated as titled for good, so
    /// historical threads are never re-titled.
    pub async fn load(&mut self) {
        self.conversations = self.store.list().await;
        self.title_origins.clear();
        for conversation in &self.conversations {
            if !conversation.title.is_empty() {
                self.title_origins.insert(conversation.id.clone(), TitleOrigin::Manual);
            }
        }
        self.active = None;
    }

    pub fn conversations(&self) -> &[Conversation] {
        &self.conversations
    }

    pub fn active_conversation(&self) -> Option<&Conversation> {
        let id = self.active.as_deref()?;
        self.conversations.iter().find(|c| c.id == id)
    }

    pub fn selected_model(&self) -> &str {
        &self.settings.selected_model
    }

    pub fn has_api_key(&self) -> bool {
        self.settings.api_key.as_deref().is_some_and(|k| !k.is_empty())
    }

    pub fn set_api_key(&mut self, api_key: Option<String>) {
        self.settings.api_key = api_key;
        self.persist_settings();
    }

    pub fn set_selected_model(&mut self, model_id: &str) {
        self.settings.selected_model = model_id.to_string();
        self.persist_settings();
    }

    /// Clears the active selection. The conversation entity itself is only
    /// materialized once the first message is appended.
    pub fn new_conversation(&mut self) {
        self.active = None;
    }

    pub fn select_conversation(&mut self, id: &str) {
        if self.conversations.iter().any(|c| c.id == id) {
            self.active = Some(id.to_string());
        }
    }

    /// Manual rename. Suppresses any later automatic title generation for
    /// this conversation.
    pub async fn set_title(&mut self, id: &str, title: &str) {
        let snapshot = match self.conversations.iter_mut().find(|c| c.id == id) {
            Some(conversation) => {
                conversation.title = title.to_string();
                conversation.clone()
            }
            None => {
                return;
            }
        };
        self.title_origins.insert(id.to_string(), TitleOrigin::Manual);
        self.persist(&snapshot).await;
    }

    /// Appends a message to the active conversation, materializing one if
    /// none is selected. Applies the first-user-message title rule, kicks
    /// off title generation on the third user message, and persists.
    /// Returns the new message's id.
    pub async fn append_message(&mut self, role: Role, content: &str) -> String {
        let active_id = match &self.active {
            Some(id) => id.clone(),
            None => {
                let conversation = Conversation::new();
                let id = conversation.id.clone();
                self.conversations.insert(0, conversation);
                self.active = Some(id.clone());
                id
            }
        };

        let message = Message::new(role, content);
        let message_id = message.id.clone();

        let mut needs_generated_title = false;
        let snapshot = {
            let title_origins = &mut self.title_origins;
            let conversation = self.conversations
                .iter_mut()
                .find(|c| c.id == active_id)
                .expect("active conversation exists");
            conversation.messages.push(message);

            if role == Role::User {
                let user_count = conversation.user_message_count();
                if user_count == 1 && conversation.title.is_empty() {
                    conversation.title = content.chars().take(FIRST_MESSAGE_TITLE_CHARS).collect();
                    title_origins.insert(active_id.clone(), TitleOrigin::FirstMessage);
                }
                let origin = title_origins.get(&active_id).copied();
                needs_generated_title =
                    user_count == TITLE_GENERATION_TURN &&
                    !matches!(origin, Some(TitleOrigin::Manual) | Some(TitleOrigin::Generated));
            }

            conversation.clone()
        };

        self.persist(&snapshot).await;

        if needs_generated_title {
            self.generate_conversation_title(&active_id).await;
        }

        message_id
    }

    /// In-place content replacement for the streaming assistant message.
    /// Intermediate partial updates skip persistence; the final update
    /// forces it.
    pub async fn update_message_content(
        &mut self,
        message_id: &str,
        content: &str,
        should_persist: bool
    ) {
        let mut snapshot = None;
        for conversation in &mut self.conversations {
            if let Some(message) = conversation.messages.iter_mut().find(|m| m.id == message_id) {
                message.content = content.to_string();
                if should_persist {
                    snapshot = Some(conversation.clone());
                }
                break;
            }
        }

        if let Some(conversation) = snapshot {
            self.persist(&conversation).await;
        }
    }

    /// Removes the conversation from the store and from memory. When the
    /// active conversation is deleted, selection falls back to the first
    /// remaining one, or to none.
    pub async fn delete_conversation(&mut self, id: &str) -> Result<(), StoreError> {
        self.store.delete(id).await?;

        self.conversations.retain(|c| c.id != id);
        self.title_origins.remove(id);
        if self.active.as_deref() == Some(id) {
            self.active = self.conversations.first().map(|c| c.id.clone());
        }

        Ok(())
    }

    /// Full send path: append the user message, open a relay stream for
    /// the whole thread and fold the reply into a fresh assistant message.
    /// Returns the final assistant text.
    pub async fn send_message(
        &mut self,
        content: &str,
        file_id: Option<String>
    ) -> Result<String, Box<dyn StdError + Send + Sync>> {
        let api_key = match &self.settings.api_key {
            Some(key) if !key.is_empty() => key.clone(),
            _ => {
                return Err(Box::new(RelayError::Unauthorized));
            }
        };

        self.append_message(Role::User, content).await;

        let outbound: Vec<OutboundMessage> = self
            .active_conversation()
            .map(|conversation| {
                conversation.messages
                    .iter()
                    .map(|m| OutboundMessage::new(m.role, &m.content))
                    .collect()
            })
            .unwrap_or_default();

        let request = RelayRequest {
            messages: outbound,
            model: self.settings.selected_model.clone(),
            file_id,
            api_key,
        };

        let stream = self.relay.open_stream(request).await?;
        self.stream_assistant_reply(stream).await
    }

    /// Consumes a token stream into a new assistant message: created empty
    /// once the stream is open, updated in place per chunk without
    /// persisting, persisted once on completion. A mid-stream error is
    /// returned and leaves the partial content unpersisted.
    pub async fn stream_assistant_reply(
        &mut self,
        mut stream: TokenStream
    ) -> Result<String, Box<dyn StdError + Send + Sync>> {
        let message_id = self.append_message(Role::Assistant, "").await;

        let mut content = String::new();
        while let Some(chunk) = stream.next().await {
            let token = chunk?;
            content.push_str(&token);
            self.update_message_content(&message_id, &content, false).await;
        }

        self.update_message_content(&message_id, &content, true).await;
        Ok(content)
    }

    /// Best effort: a failed generation falls back to the existing
    /// provisional title, or a fixed label, and never reaches the caller.
    async fn generate_conversation_title(&mut self, id: &str) {
        let api_key = self.settings.api_key.clone().unwrap_or_default();
        let user_messages: Vec<String> = match self.conversations.iter().find(|c| c.id == id) {
            Some(conversation) =>
                conversation.messages
                    .iter()
                    .filter(|m| m.role == Role::User)
                    .take(TITLE_GENERATION_TURN)
                    .map(|m| m.content.clone())
                    .collect(),
            None => {
                return;
            }
        };

        let generated = title::generate(&self.relay, &api_key, &user_messages).await;

        let snapshot = {
            let conversation = match self.conversations.iter_mut().find(|c| c.id == id) {
                Some(conversation) => conversation,
                None => {
                    return;
                }
            };
            match generated {
                Ok(label) => {
                    conversation.title = label;
                }
                Err(e) => {
                    warn!("Title generation failed for {}: {}", id, e);
                    if conversation.title.is_empty() {
                        conversation.title = title::FALLBACK_TITLE.to_string();
                    }
                }
            }
            conversation.clone()
        };

        self.title_origins.insert(id.to_string(), TitleOrigin::Generated);
        self.persist(&snapshot).await;
    }

    async fn persist(&self, conversation: &Conversation) {
        if let Err(e) = self.store.save(conversation).await {
            warn!("Failed to persist conversation {}: {}", conversation.id, e);
        }
    }

    fn persist_settings(&self) {
        if let Err(e) = save_settings(&self.settings_path, &self.settings) {
            warn!("Failed to persist settings to {}: {}", self.settings_path.display(), e);
        }
    }
}
