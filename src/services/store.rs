use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use anyhow::{anyhow, Result};
use log::info;

use crate::models::conversation::{ConversationState, ConversationTurn};

/// Keyed, in-memory store of conversation state. Mutations are atomic per
/// conversation id: the outer map lock is held only to fetch or insert the
/// per-id entry, and the per-id lock guards the read-modify-write append.
/// Different ids never share a lock, so independent conversations proceed
/// without global serialization.
#[derive(Debug, Clone, Default)]
pub struct ConversationStore {
    conversations: Arc<Mutex<HashMap<String, Arc<Mutex<ConversationState>>>>>,
}

impl ConversationStore {
    pub fn new() -> Self {
        Self {
            conversations: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    fn entry(&self, conversation_id: &str) -> Result<Option<Arc<Mutex<ConversationState>>>> {
        let map = self
            .conversations
            .lock()
            .map_err(|_| anyhow!("Failed to acquire lock on conversation map"))?;
        Ok(map.get(conversation_id).cloned())
    }

    fn entry_or_create(
        &self,
        conversation_id: &str,
        user_id: Option<&str>,
    ) -> Result<Arc<Mutex<ConversationState>>> {
        let mut map = self
            .conversations
            .lock()
            .map_err(|_| anyhow!("Failed to acquire lock on conversation map"))?;
        Ok(map
            .entry(conversation_id.to_string())
            .or_insert_with(|| {
                Arc::new(Mutex::new(ConversationState::new(
                    conversation_id.to_string(),
                    user_id.map(|u| u.to_string()),
                )))
            })
            .clone())
    }

    /// Get a snapshot of a conversation's state, or `None` if unknown
    pub fn get_state(&self, conversation_id: &str) -> Result<Option<ConversationState>> {
        match self.entry(conversation_id)? {
            Some(entry) => {
                let state = entry
                    .lock()
                    .map_err(|_| anyhow!("Failed to acquire lock on conversation {}", conversation_id))?;
                Ok(Some(state.clone()))
            }
            None => Ok(None),
        }
    }

    /// Append a turn, creating the conversation if absent. Returns a snapshot
    /// of the updated state.
    pub fn update_state(
        &self,
        conversation_id: &str,
        turn: ConversationTurn,
        user_id: Option<&str>,
    ) -> Result<ConversationState> {
        let entry = self.entry_or_create(conversation_id, user_id)?;
        let mut state = entry
            .lock()
            .map_err(|_| anyhow!("Failed to acquire lock on conversation {}", conversation_id))?;
        state.append_turn(turn, user_id);
        Ok(state.clone())
    }

    /// Remove one conversation's state
    pub fn clear_state(&self, conversation_id: &str) -> Result<()> {
        let mut map = self
            .conversations
            .lock()
            .map_err(|_| anyhow!("Failed to acquire lock on conversation map"))?;
        if map.remove(conversation_id).is_some() {
            info!("Cleared conversation {}", conversation_id);
        }
        Ok(())
    }

    /// Remove all conversation state
    pub fn clear_all_states(&self) -> Result<()> {
        let mut map = self
            .conversations
            .lock()
            .map_err(|_| anyhow!("Failed to acquire lock on conversation map"))?;
        let count = map.len();
        map.clear();
        info!("Cleared all conversation state ({} conversations)", count);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::query::{Intent, QueryMetadata};
    use crate::models::response::AnsweredResult;
    use std::collections::BTreeSet;

    fn turn(query: &str, answer: &str) -> ConversationTurn {
        ConversationTurn::new(
            query.to_string(),
            AnsweredResult {
                final_answer: answer.to_string(),
                source_documents: Vec::new(),
                query_metadata: QueryMetadata {
                    original_query: query.to_string(),
                    rewritten_query: None,
                    intent: Intent::General,
                    count_type: None,
                    entity_types: BTreeSet::new(),
                },
                strategy_trace: Vec::new(),
                error: None,
            },
        )
    }

    #[test]
    fn creates_on_first_update_and_appends_in_order() {
        let store = ConversationStore::new();
        assert!(store.get_state("c1").unwrap().is_none());

        store.update_state("c1", turn("q1", "a1"), Some("u1")).unwrap();
        store.update_state("c1", turn("q2", "a2"), None).unwrap();
        let state = store.get_state("c1").unwrap().expect("state");

        assert_eq!(state.history.len(), 2);
        assert_eq!(state.history[0].user_query, "q1");
        assert_eq!(state.history[1].user_query, "q2");
        assert_eq!(state.user_id.as_deref(), Some("u1"));
    }

    #[test]
    fn user_id_is_never_overwritten() {
        let store = ConversationStore::new();
        store.update_state("c1", turn("q1", "a1"), Some("u1")).unwrap();
        store.update_state("c1", turn("q2", "a2"), Some("u2")).unwrap();
        let state = store.get_state("c1").unwrap().expect("state");
        assert_eq!(state.user_id.as_deref(), Some("u1"));
    }

    #[test]
    fn states_are_independent_per_id() {
        let store = ConversationStore::new();
        store.update_state("c1", turn("q1", "a1"), None).unwrap();
        store.update_state("c2", turn("q2", "a2"), None).unwrap();
        store.clear_state("c1").unwrap();
        assert!(store.get_state("c1").unwrap().is_none());
        assert!(store.get_state("c2").unwrap().is_some());
    }

    #[test]
    fn clear_all_removes_everything() {
        let store = ConversationStore::new();
        store.update_state("c1", turn("q", "a"), None).unwrap();
        store.update_state("c2", turn("q", "a"), None).unwrap();
        store.clear_all_states().unwrap();
        assert!(store.get_state("c1").unwrap().is_none());
        assert!(store.get_state("c2").unwrap().is_none());
    }

    #[tokio::test]
    async fn concurrent_appends_never_lose_an_update() {
        let store = ConversationStore::new();
        let mut handles = Vec::new();
        for i in 0..50 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                store
                    .update_state("shared", turn(&format!("q{}", i), "a"), None)
                    .unwrap();
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }
        let state = store.get_state("shared").unwrap().expect("state");
        assert_eq!(state.history.len(), 50);
    }
}
