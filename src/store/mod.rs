pub mod json;

use async_trait::async_trait;
use log::info;
use std::error::Error;
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error as ThisError;

use crate::cli::Args;
use crate::models::chat::Conversation;

#[derive(Debug, ThisError)]
pub enum StoreError {
    #[error("conversation '{0}' not found")]
    NotFound(String),

    #[error("store I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("store serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

/// Persistence for conversations, one record per id. No transactional or
/// locking guarantees; there is a single logical writer.
#[async_trait]
pub trait ConversationStore: Send + Sync {
    /// Returns every persisted conversation. An unreadable backing
    /// location degrades to an empty collection rather than an error.
    async fn list(&self) -> Vec<Conversation>;

    /// Overwrites the record for `conversation.id`, creating the backing
    /// location if absent. Last write wins for the same id.
    async fn save(&self, conversation: &Conversation) -> Result<(), StoreError>;

    /// Removes the record, failing with [`StoreError::NotFound`] if it
    /// does not exist.
    async fn delete(&self, id: &str) -> Result<(), StoreError>;
}

pub fn initialize_store(
    args: &Args
) -> Result<Arc<dyn ConversationStore>, Box<dyn Error + Send + Sync>> {
    info!("Conversations will be stored in: {}", args.chats_dir);
    let store = json::JsonConversationStore::new(PathBuf::from(&args.chats_dir));
    Ok(Arc::new(store))
}
