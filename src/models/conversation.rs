use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::response::AnsweredResult;

/// One user/assistant exchange in a conversation. Immutable once appended.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationTurn {
    /// The user's natural language query
    pub user_query: String,
    /// The complete answer produced for the query
    pub answer: AnsweredResult,
    /// When this turn occurred
    pub timestamp: DateTime<Utc>,
}

impl ConversationTurn {
    pub fn new(user_query: String, answer: AnsweredResult) -> Self {
        Self {
            user_query,
            answer,
            timestamp: Utc::now(),
        }
    }
}

/// The state of one conversation, keyed by conversation id
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationState {
    /// Unique identifier for this conversation
    pub conversation_id: String,
    /// The user who owns the conversation; set once, never overwritten
    pub user_id: Option<String>,
    /// Chronological, append-only history of turns
    pub history: Vec<ConversationTurn>,
    /// When the conversation was last updated
    pub last_modified: DateTime<Utc>,
}

impl ConversationState {
    /// Create a new empty conversation state
    pub fn new(conversation_id: String, user_id: Option<String>) -> Self {
        Self {
            conversation_id,
            user_id,
            history: Vec::new(),
            last_modified: Utc::now(),
        }
    }

    /// Append a turn and bump `last_modified`. `user_id` is only adopted
    /// when the state does not carry one yet.
    pub fn append_turn(&mut self, turn: ConversationTurn, user_id: Option<&str>) {
        if self.user_id.is_none() {
            self.user_id = user_id.map(|u| u.to_string());
        }
        self.history.push(turn);
        self.last_modified = Utc::now();
    }
}
