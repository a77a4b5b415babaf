use std::collections::HashMap;

use copilot_core::{ConversationId, PendingClarification};
use tokio::sync::Mutex;

/// Pending clarification loops keyed by conversation id.
///
/// Each call takes the lock for a single read or write. Callers that read,
/// call an agent, then write are not atomic across those steps.
#[derive(Debug, Default)]
pub struct ConversationStore {
    pending: Mutex<HashMap<String, PendingClarification>>,
}

impl ConversationStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get(&self, id: &ConversationId) -> Option<PendingClarification> {
        self.pending.lock().await.get(id.as_str()).cloned()
    }

    pub async fn set(&self, id: &ConversationId, state: PendingClarification) {
        self.pending.lock().await.insert(id.as_str().to_string(), state);
    }

    pub async fn clear(&self, id: &ConversationId) {
        self.pending.lock().await.remove(id.as_str());
    }

    pub async fn len(&self) -> usize {
        self.pending.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.pending.lock().await.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use copilot_core::{AgentKey, ConversationId, PendingClarification};

    use super::ConversationStore;

    fn pending(question: &str) -> PendingClarification {
        PendingClarification {
            agent: AgentKey::Promotion,
            original_request: "show top promos".to_string(),
            last_question: question.to_string(),
        }
    }

    #[tokio::test]
    async fn set_overwrites_and_clear_removes() {
        let store = ConversationStore::new();
        let id = ConversationId("conv-1".to_string());

        assert_eq!(store.get(&id).await, None);

        store.set(&id, pending("which region?")).await;
        store.set(&id, pending("which quarter?")).await;
        assert_eq!(store.len().await, 1);
        assert_eq!(
            store.get(&id).await.map(|state| state.last_question),
            Some("which quarter?".to_string())
        );

        store.clear(&id).await;
        store.clear(&id).await;
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn entries_are_isolated_per_conversation() {
        let store = ConversationStore::new();
        let first = ConversationId("conv-a".to_string());
        let second = ConversationId("conv-b".to_string());

        store.set(&first, pending("which region?")).await;

        assert!(store.get(&second).await.is_none());
        store.clear(&second).await;
        assert!(store.get(&first).await.is_some());
    }
}
