use std::collections::HashMap;
use std::sync::Arc;

use super::session::ChatSession;
use crate::api::NodeClient;
use crate::config::Config;

/// Owns one `ChatSession` per open conversation plus the shared node
/// client. Sessions are created lazily on first access and dropped when the
/// conversation view closes; controllers receive the session explicitly
/// instead of locating state through globals.
pub struct SessionManager {
    client: Arc<NodeClient>,
    config: Config,
    sessions: HashMap<String, ChatSession>,
}

impl SessionManager {
    pub fn new(client: Arc<NodeClient>, config: Config) -> Self {
        Self {
            client,
            config,
            sessions: HashMap::new(),
        }
    }

    /// Session for the conversation, created fresh on first access.
    pub fn session(&mut self, conversation_id: &str) -> &mut ChatSession {
        self.sessions
            .entry(conversation_id.to_string())
            .or_insert_with(|| {
                ChatSession::new(conversation_id, Arc::clone(&self.client), &self.config)
            })
    }

    pub fn get(&self, conversation_id: &str) -> Option<&ChatSession> {
        self.sessions.get(conversation_id)
    }

    /// Drop the conversation's session (view unmounted). Its cursor and
    /// optimistic tail go with it; history reloads on next open.
    pub fn close(&mut self, conversation_id: &str) -> bool {
        self.sessions.remove(conversation_id).is_some()
    }

    pub fn open_conversations(&self) -> Vec<&str> {
        self.sessions.keys().map(String::as_str).collect()
    }
}
