use async_trait::async_trait;
use log::warn;
use std::path::{ Path, PathBuf };
use tokio::fs;

use super::{ ConversationStore, StoreError };
use crate::models::chat::Conversation;

/// File-per-conversation store: `<dir>/<id>.json`, pretty-printed, fully
/// rewritten on every save via a temp file and rename.
pub struct JsonConversationStore {
    chats_dir: PathBuf,
}

impl JsonConversationStore {
    pub fn new(chats_dir: PathBuf) -> Self {
        Self { chats_dir }
    }

    fn conversation_path(&self, id: &str) -> PathBuf {
        self.chats_dir.join(format!("{}.json", id))
    }

    async fn read_conversation(path: &Path) -> Result<Conversation, StoreError> {
        let content = fs::read_to_string(path).await?;
        Ok(serde_json::from_str(&content)?)
    }
}

#[async_trait]
impl ConversationStore for JsonConversationStore {
    async fn list(&self) -> Vec<Conversation> {
        if let Err(e) = fs::create_dir_all(&self.chats_dir).await {
            warn!("Unreadable chats directory {}: {}", self.chats_dir.display(), e);
            return Vec::new();
        }

        let mut entries = match fs::read_dir(&self.chats_dir).await {
            Ok(entries) => entries,
            Err(e) => {
                warn!("Failed to list chats directory {}: {}", self.chats_dir.display(), e);
                return Vec::new();
            }
        };

        let mut conversations = Vec::new();
        loop {
            let entry = match entries.next_entry().await {
                Ok(Some(entry)) => entry,
                Ok(None) => {
                    break;
                }
                Err(e) => {
                    warn!("Failed to walk chats directory: {}", e);
                    break;
                }
            };

            let path = entry.path();
            if path.extension().and_then(|s| s.to_str()) != Some("json") {
                continue;
            }

            match Self::read_conversation(&path).await {
                Ok(conversation) => conversations.push(conversation),
                Err(e) => {
                    warn!("Skipping unreadable conversation {}: {}", path.display(), e);
                }
            }
        }

        conversations
    }

    async fn save(&self, conversation: &Conversation) -> Result<(), StoreError> {
        fs::create_dir_all(&self.chats_dir).await?;

        let json = serde_json::to_string_pretty(conversation)?;
        let path = self.conversation_path(&conversation.id);
        let temp_path = path.with_extension("json.tmp");

        fs::write(&temp_path, json).await?;
        fs::rename(&temp_path, &path).await?;

        Ok(())
    }

    async fn delete(&self, id: &str) -> Result<(), StoreError> {
        let path = self.conversation_path(id);
        match fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(StoreError::NotFound(id.to_string()))
            }
            Err(e) => Err(StoreError::Io(e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::chat::{ Message, Role };
    use tempfile::tempdir;

    fn sample_conversation() -> Conversation {
        let mut conversation = Conversation::new();
        conversation.title = "Rust questions".to_string();
        conversation.messages.push(Message::new(Role::User, "What is a lifetime?"));
        conversation.messages.push(Message::new(Role::Assistant, "A region of validity."));
        conversation
    }

    #[tokio::test]
    async fn save_then_list_round_trips_the_record() {
        let dir = tempdir().unwrap();
        let store = JsonConversationStore::new(dir.path().to_path_buf());

        let conversation = sample_conversation();
        store.save(&conversation).await.unwrap();

        let listed = store.list().await;
        assert_eq!(listed, vec![conversation]);
    }

    #[tokio::test]
    async fn save_overwrites_the_record_for_the_same_id() {
        let dir = tempdir().unwrap();
        let store = JsonConversationStore::new(dir.path().to_path_buf());

        let mut conversation = sample_conversation();
        store.save(&conversation).await.unwrap();
        conversation.title = "Renamed".to_string();
        store.save(&conversation).await.unwrap();

        let listed = store.list().await;
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].title, "Renamed");
    }

    #[tokio::test]
    async fn delete_removes_the_record() {
        let dir = tempdir().unwrap();
        let store = JsonConversationStore::new(dir.path().to_path_buf());

        let conversation = sample_conversation();
        store.save(&conversation).await.unwrap();
        store.delete(&conversation.id).await.unwrap();

        assert!(store.list().await.is_empty());
    }

    #[tokio::test]
    async fn delete_of_a_missing_id_is_not_found() {
        let dir = tempdir().unwrap();
        let store = JsonConversationStore::new(dir.path().to_path_buf());

        match store.delete("no-such-id").await {
            Err(StoreError::NotFound(id)) => assert_eq!(id, "no-such-id"),
            other => panic!("expected NotFound, got {:?}", other.map(|_| ())),
        }
    }

    #[tokio::test]
    async fn unreadable_location_degrades_to_an_empty_list() {
        let dir = tempdir().unwrap();
        let blocker = dir.path().join("not-a-directory");
        fs::write(&blocker, "plain file").await.unwrap();

        // The chats path has a regular file as an ancestor, so it can
        // neither be created nor read.
        let store = JsonConversationStore::new(blocker.join("chats"));
        assert!(store.list().await.is_empty());
    }

    #[tokio::test]
    async fn corrupt_files_are_skipped() {
        let dir = tempdir().unwrap();
        let store = JsonConversationStore::new(dir.path().to_path_buf());

        let conversation = sample_conversation();
        store.save(&conversation).await.unwrap();
        fs::write(dir.path().join("broken.json"), "{not json").await.unwrap();

        let listed = store.list().await;
        assert_eq!(listed, vec![conversation]);
    }
}
