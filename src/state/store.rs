use chrono::{DateTime, Utc};
use std::collections::HashSet;

use crate::error::StoreError;
use crate::types::{Message, MessageRole, MessageStatus};

/// Fields merged into the running assistant message as stream events arrive.
/// `content` carries the full accumulated text, not a delta.
#[derive(Debug, Clone, Default)]
pub struct AssistantPatch {
    pub content: Option<String>,
    pub status: Option<MessageStatus>,
}

impl AssistantPatch {
    pub fn content(text: impl Into<String>) -> Self {
        Self {
            content: Some(text.into()),
            status: None,
        }
    }

    pub fn status(status: MessageStatus) -> Self {
        Self {
            content: None,
            status: Some(status),
        }
    }
}

/// Ordered message history for one conversation: confirmed pages (oldest
/// first) plus a live tail holding optimistic and streaming entries.
#[derive(Default)]
pub struct MessageStore {
    pages: Vec<Vec<Message>>,
    tail: Vec<Message>,
    next_local_seq: u64,
}

impl MessageStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert an optimistic message at the tail. At most one optimistic
    /// entry per role may exist at any time.
    pub fn append_optimistic(&mut self, message: Message) -> Result<(), StoreError> {
        if self.optimistic_index(message.role).is_some() {
            return Err(StoreError::InvalidState { role: message.role });
        }
        self.tail.push(message);
        Ok(())
    }

    /// Swap the sentinel entry of `role` for its server-confirmed
    /// counterpart, keeping its position. Silently does nothing when no
    /// sentinel exists, which tolerates confirmation/stream races.
    pub fn replace_optimistic(&mut self, role: MessageRole, confirmed: Message) -> bool {
        match self.optimistic_index(role) {
            Some(index) => {
                self.tail[index] = confirmed;
                true
            }
            None => false,
        }
    }

    /// Drop the sentinel entry of `role`, used to roll back a rejected send.
    pub fn remove_optimistic(&mut self, role: MessageRole) -> bool {
        match self.optimistic_index(role) {
            Some(index) => {
                self.tail.remove(index);
                true
            }
            None => false,
        }
    }

    /// Merge `patch` into the assistant message currently in `Running`
    /// state. Terminal statuses never change again, so a patch arriving
    /// after the turn settled reports `NoActiveTurn`.
    pub fn patch_running_assistant(&mut self, patch: AssistantPatch) -> Result<(), StoreError> {
        let message = self
            .tail
            .iter_mut()
            .rev()
            .find(|message| message.is_running_assistant())
            .ok_or(StoreError::NoActiveTurn)?;

        if let Some(content) = patch.content {
            message.content = content;
        }
        if let Some(status) = patch.status {
            message.status = Some(status);
        }
        Ok(())
    }

    /// Insert a page of strictly older history before everything loaded so
    /// far. Messages already present (by id) are dropped first, so retried
    /// or duplicated fetches are no-ops rather than ordering violations.
    pub fn prepend_page(&mut self, older: Vec<Message>) -> Result<usize, StoreError> {
        let known: HashSet<String> = self.iter().map(|message| message.id.clone()).collect();
        let fresh: Vec<Message> = older
            .into_iter()
            .filter(|message| !known.contains(&message.id))
            .collect();
        if fresh.is_empty() {
            return Ok(0);
        }

        if let (Some(latest_incoming), Some(earliest_loaded)) = (
            fresh.last().map(|message| message.created_at),
            self.earliest_created_at(),
        ) {
            if latest_incoming >= earliest_loaded {
                return Err(StoreError::OutOfOrderPage);
            }
        }

        let count = fresh.len();
        self.pages.insert(0, fresh);
        Ok(count)
    }

    /// Flattened, deduplicated, chronological view. The first occurrence of
    /// an id wins; later duplicates (confirmed rows racing a merge) are
    /// skipped.
    pub fn messages(&self) -> Vec<Message> {
        let mut seen = HashSet::new();
        self.iter()
            .filter(|message| seen.insert(message.id.clone()))
            .cloned()
            .collect()
    }

    /// A settled turn that never got node confirmation (stop or failure
    /// while the node was unreachable) leaves its sentinel rows behind.
    /// Reassign them stable local ids so the rows stay visible as history
    /// and the sentinel slots are free for the next turn.
    pub fn promote_settled_tail(&mut self) -> bool {
        let assistant_settled = self.tail.iter().any(|message| {
            message.id == crate::types::OPTIMISTIC_ASSISTANT_MESSAGE_ID
                && message.status.is_some_and(MessageStatus::is_terminal)
        });
        if !assistant_settled {
            return false;
        }

        let seq = self.next_local_seq;
        self.next_local_seq += 1;
        for message in &mut self.tail {
            if message.id == crate::types::OPTIMISTIC_USER_MESSAGE_ID {
                message.id = format!("local-user-{seq}");
            } else if message.id == crate::types::OPTIMISTIC_ASSISTANT_MESSAGE_ID {
                message.id = format!("local-assistant-{seq}");
            }
        }
        true
    }

    pub fn contains_id(&self, id: &str) -> bool {
        self.iter().any(|message| message.id == id)
    }

    pub fn running_assistant(&self) -> Option<&Message> {
        self.tail
            .iter()
            .rev()
            .find(|message| message.is_running_assistant())
    }

    pub fn earliest_created_at(&self) -> Option<DateTime<Utc>> {
        self.iter().next().map(|message| message.created_at)
    }

    pub fn is_empty(&self) -> bool {
        self.pages.iter().all(Vec::is_empty) && self.tail.is_empty()
    }

    pub fn len(&self) -> usize {
        let mut seen = HashSet::new();
        self.iter()
            .filter(|message| seen.insert(message.id.as_str()))
            .count()
    }

    fn iter(&self) -> impl Iterator<Item = &Message> {
        self.pages.iter().flatten().chain(self.tail.iter())
    }

    fn optimistic_index(&self, role: MessageRole) -> Option<usize> {
        let sentinel = role.optimistic_id();
        self.tail.iter().position(|message| message.id == sentinel)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn confirmed(id: &str, role: MessageRole, content: &str, at_secs: i64) -> Message {
        Message {
            id: id.to_string(),
            role,
            content: content.to_string(),
            created_at: Utc.timestamp_opt(at_secs, 0).unwrap(),
            status: (role == MessageRole::Assistant).then_some(MessageStatus::Complete),
            attachments: Vec::new(),
            tool_calls: Vec::new(),
            metadata: Default::default(),
        }
    }

    #[test]
    fn test_append_optimistic_rejects_double_insert() {
        let mut store = MessageStore::new();
        store
            .append_optimistic(Message::optimistic_user("hi", Vec::new()))
            .expect("first insert");
        let error = store
            .append_optimistic(Message::optimistic_user("again", Vec::new()))
            .expect_err("second insert must fail");
        assert_eq!(
            error,
            StoreError::InvalidState {
                role: MessageRole::User
            }
        );

        store
            .append_optimistic(Message::assistant_placeholder())
            .expect("assistant placeholder is a different role");
    }

    #[test]
    fn test_replace_optimistic_keeps_position_and_tolerates_absence() {
        let mut store = MessageStore::new();
        store
            .append_optimistic(Message::optimistic_user("hi", Vec::new()))
            .unwrap();
        store
            .append_optimistic(Message::assistant_placeholder())
            .unwrap();

        assert!(store.replace_optimistic(
            MessageRole::User,
            confirmed("msg_1", MessageRole::User, "hi", 100)
        ));
        let view = store.messages();
        assert_eq!(view[0].id, "msg_1");
        assert_eq!(view[1].id, crate::types::OPTIMISTIC_ASSISTANT_MESSAGE_ID);

        // Second replacement has no sentinel left to replace.
        assert!(!store.replace_optimistic(
            MessageRole::User,
            confirmed("msg_dup", MessageRole::User, "hi", 101)
        ));
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn test_patch_running_assistant_requires_active_turn() {
        let mut store = MessageStore::new();
        assert_eq!(
            store.patch_running_assistant(AssistantPatch::content("x")),
            Err(StoreError::NoActiveTurn)
        );

        store
            .append_optimistic(Message::assistant_placeholder())
            .unwrap();
        store
            .patch_running_assistant(AssistantPatch::content("Hello"))
            .unwrap();
        store
            .patch_running_assistant(AssistantPatch::status(MessageStatus::Complete))
            .unwrap();

        let view = store.messages();
        assert_eq!(view[0].content, "Hello");
        assert_eq!(view[0].status, Some(MessageStatus::Complete));

        // Terminal: there is no running assistant anymore.
        assert_eq!(
            store.patch_running_assistant(AssistantPatch::content("late")),
            Err(StoreError::NoActiveTurn)
        );
        assert_eq!(store.messages()[0].content, "Hello");
    }

    #[test]
    fn test_prepend_page_orders_and_deduplicates() {
        let mut store = MessageStore::new();
        store
            .prepend_page(vec![
                confirmed("msg_3", MessageRole::User, "three", 300),
                confirmed("msg_4", MessageRole::Assistant, "four", 400),
            ])
            .expect("initial page");

        let older = vec![
            confirmed("msg_1", MessageRole::User, "one", 100),
            confirmed("msg_2", MessageRole::Assistant, "two", 200),
        ];
        assert_eq!(store.prepend_page(older.clone()).unwrap(), 2);

        // Same page again: every id is known, so nothing changes.
        assert_eq!(store.prepend_page(older).unwrap(), 0);

        let ids: Vec<String> = store.messages().into_iter().map(|m| m.id).collect();
        assert_eq!(ids, vec!["msg_1", "msg_2", "msg_3", "msg_4"]);
    }

    #[test]
    fn test_prepend_page_rejects_unordered_new_messages() {
        let mut store = MessageStore::new();
        store
            .prepend_page(vec![confirmed("msg_2", MessageRole::User, "two", 200)])
            .unwrap();

        let error = store
            .prepend_page(vec![confirmed("msg_9", MessageRole::User, "nine", 900)])
            .expect_err("newer page must not prepend");
        assert_eq!(error, StoreError::OutOfOrderPage);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_promote_settled_tail_frees_sentinel_slots() {
        let mut store = MessageStore::new();
        store
            .append_optimistic(Message::optimistic_user("doomed", Vec::new()))
            .unwrap();
        store
            .append_optimistic(Message::assistant_placeholder())
            .unwrap();

        // Still running: nothing to promote.
        assert!(!store.promote_settled_tail());

        store
            .patch_running_assistant(AssistantPatch::status(MessageStatus::Failed))
            .unwrap();
        assert!(store.promote_settled_tail());

        let view = store.messages();
        assert!(view.iter().all(|message| !message.is_optimistic()));
        assert_eq!(view[1].status, Some(MessageStatus::Failed));

        // Sentinel slots are free again for the next turn.
        store
            .append_optimistic(Message::optimistic_user("retry", Vec::new()))
            .unwrap();
        store
            .append_optimistic(Message::assistant_placeholder())
            .unwrap();
        assert_eq!(store.messages().len(), 4);
    }

    #[test]
    fn test_prepend_does_not_disturb_live_tail() {
        let mut store = MessageStore::new();
        store
            .prepend_page(vec![confirmed("msg_5", MessageRole::User, "five", 500)])
            .unwrap();
        store
            .append_optimistic(Message::optimistic_user("new", Vec::new()))
            .unwrap();
        store
            .append_optimistic(Message::assistant_placeholder())
            .unwrap();

        store
            .prepend_page(vec![confirmed("msg_4", MessageRole::User, "four", 400)])
            .unwrap();

        let view = store.messages();
        assert_eq!(view.len(), 4);
        assert_eq!(view[0].id, "msg_4");
        assert_eq!(view[1].id, "msg_5");
        assert!(view[2].is_optimistic());
        assert!(view[3].is_running_assistant());
    }
}
