use chrono::Utc;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

use crate::error::ChatError;
use crate::models::{Conversation, Message, MessageRole, Source};
use crate::store::ConversationStore;

pub const TITLE_MAX_CHARS: usize = 50;

/// Derives a conversation title from its first user message. Computed once
/// at creation and never again.
pub fn derive_title(first_message: &str) -> String {
    let trimmed = first_message.trim();
    let mut title: String = trimmed.chars().take(TITLE_MAX_CHARS).collect();
    if trimmed.chars().count() > TITLE_MAX_CHARS {
        title.push_str("...");
    }
    title
}

/// Persists dialogue turns and owns the regenerate-last-answer transition,
/// the single sanctioned violation of append-only message history.
pub struct ConversationManager<S> {
    store: Arc<S>,
}

impl<S: ConversationStore> ConversationManager<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// Resolves an existing conversation or lazily creates a new thread
    /// titled after its first message.
    pub async fn resolve_or_create(
        &self,
        workspace_id: &str,
        conversation_id: Option<Uuid>,
        first_message: &str,
    ) -> Result<Conversation, ChatError> {
        if let Some(id) = conversation_id {
            return self
                .store
                .get_conversation(id)
                .await?
                .ok_or(ChatError::NotFound(id));
        }

        let conversation = Conversation {
            id: Uuid::new_v4(),
            workspace_id: workspace_id.to_string(),
            title: derive_title(first_message),
            updated_at: Utc::now(),
        };
        self.store.insert_conversation(&conversation).await?;
        info!(conversation_id = %conversation.id, "conversation created");
        Ok(conversation)
    }

    pub async fn append_user_turn(
        &self,
        conversation_id: Uuid,
        content: &str,
    ) -> Result<Message, ChatError> {
        self.append(conversation_id, MessageRole::User, content, Vec::new())
            .await
    }

    pub async fn append_assistant_turn(
        &self,
        conversation_id: Uuid,
        content: &str,
        sources: Vec<Source>,
    ) -> Result<Message, ChatError> {
        self.append(conversation_id, MessageRole::Assistant, content, sources)
            .await
    }

    async fn append(
        &self,
        conversation_id: Uuid,
        role: MessageRole,
        content: &str,
        sources: Vec<Source>,
    ) -> Result<Message, ChatError> {
        let message = Message {
            id: Uuid::new_v4(),
            conversation_id,
            role,
            content: content.to_string(),
            sources,
            created_at: Utc::now(),
        };
        self.store.append_message(&message).await?;
        self.store
            .touch_conversation(conversation_id, message.created_at)
            .await?;
        Ok(message)
    }

    /// Deletes the most recent assistant message and returns the user
    /// message it answered, whose content the caller re-runs the pipeline
    /// against. No new user turn is created. Any other tail state (empty
    /// conversation, regeneration invoked twice in a row) is invalid.
    pub async fn begin_regeneration(&self, conversation_id: Uuid) -> Result<String, ChatError> {
        let messages = self.store.list_messages(conversation_id).await?;

        let last = messages.last().ok_or_else(|| {
            ChatError::InvalidRegenerationState("conversation has no messages".to_string())
        })?;
        if last.role != MessageRole::Assistant {
            return Err(ChatError::InvalidRegenerationState(
                "last message is not an assistant turn".to_string(),
            ));
        }

        let last_user = messages[..messages.len() - 1]
            .iter()
            .rev()
            .find(|message| message.role == MessageRole::User)
            .ok_or_else(|| {
                ChatError::InvalidRegenerationState(
                    "no user turn precedes the assistant answer".to_string(),
                )
            })?;

        let query = last_user.content.clone();
        self.store.delete_message(last.id).await?;
        info!(conversation_id = %conversation_id, "assistant turn deleted for regeneration");
        Ok(query)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stores::MemoryStore;

    fn manager() -> ConversationManager<MemoryStore> {
        ConversationManager::new(Arc::new(MemoryStore::new()))
    }

    #[test]
    fn short_titles_are_kept_verbatim() {
        assert_eq!(derive_title("What is our leave policy?"), "What is our leave policy?");
    }

    #[test]
    fn long_titles_are_truncated_with_ellipsis() {
        let message = "x".repeat(80);
        let title = derive_title(&message);
        assert_eq!(title.chars().count(), TITLE_MAX_CHARS + 3);
        assert!(title.ends_with("..."));
    }

    #[test]
    fn exactly_max_length_titles_get_no_ellipsis() {
        let message = "y".repeat(TITLE_MAX_CHARS);
        assert_eq!(derive_title(&message), message);
    }

    #[tokio::test]
    async fn unknown_conversation_id_is_not_found() {
        let result = manager()
            .resolve_or_create("ws-1", Some(Uuid::new_v4()), "hello")
            .await;
        assert!(matches!(result, Err(ChatError::NotFound(_))));
    }

    #[tokio::test]
    async fn turns_bump_the_recency_timestamp() {
        let manager = manager();
        let conversation = manager
            .resolve_or_create("ws-1", None, "first question")
            .await
            .unwrap();

        manager
            .append_user_turn(conversation.id, "first question")
            .await
            .unwrap();

        let stored = manager
            .store
            .get_conversation(conversation.id)
            .await
            .unwrap()
            .unwrap();
        assert!(stored.updated_at >= conversation.updated_at);
    }

    #[tokio::test]
    async fn regeneration_replaces_exactly_the_last_assistant_turn() {
        let manager = manager();
        let conversation = manager.resolve_or_create("ws-1", None, "Q").await.unwrap();
        manager.append_user_turn(conversation.id, "Q").await.unwrap();
        manager
            .append_assistant_turn(conversation.id, "A1", Vec::new())
            .await
            .unwrap();

        let query = manager.begin_regeneration(conversation.id).await.unwrap();
        assert_eq!(query, "Q");

        manager
            .append_assistant_turn(conversation.id, "A2", Vec::new())
            .await
            .unwrap();

        let messages = manager.store.list_messages(conversation.id).await.unwrap();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].role, MessageRole::User);
        assert_eq!(messages[0].content, "Q");
        assert_eq!(messages[1].role, MessageRole::Assistant);
        assert_eq!(messages[1].content, "A2");
    }

    #[tokio::test]
    async fn regenerating_an_empty_conversation_is_invalid() {
        let manager = manager();
        let conversation = manager.resolve_or_create("ws-1", None, "Q").await.unwrap();

        let result = manager.begin_regeneration(conversation.id).await;
        assert!(matches!(
            result,
            Err(ChatError::InvalidRegenerationState(_))
        ));
    }

    #[tokio::test]
    async fn double_regeneration_without_a_new_answer_is_invalid() {
        let manager = manager();
        let conversation = manager.resolve_or_create("ws-1", None, "Q").await.unwrap();
        manager.append_user_turn(conversation.id, "Q").await.unwrap();
        manager
            .append_assistant_turn(conversation.id, "A1", Vec::new())
            .await
            .unwrap();

        manager.begin_regeneration(conversation.id).await.unwrap();
        let second = manager.begin_regeneration(conversation.id).await;

        assert!(matches!(
            second,
            Err(ChatError::InvalidRegenerationState(_))
        ));
    }
}
