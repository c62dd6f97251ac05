use tracing::warn;

use super::state::{ChatSession, SessionUpdate};
use crate::error::SessionError;

impl ChatSession {
    /// Fetch the newest page into an empty session. Idempotent: once loaded,
    /// further calls do nothing and older history goes through
    /// `load_previous_page`.
    pub async fn load_initial(&mut self) -> Result<usize, SessionError> {
        if self.cursor.loaded {
            return Ok(0);
        }
        self.fetch_older(None).await
    }

    /// Fetch the page strictly older than the oldest loaded one and prepend
    /// it. Serialized per conversation: a call while a fetch is in flight,
    /// or after history is exhausted, is a no-op. A failed fetch keeps the
    /// cursor so the UI can retry.
    pub async fn load_previous_page(&mut self) -> Result<usize, SessionError> {
        if !self.cursor.has_previous_page || self.cursor.is_fetching_previous_page {
            return Ok(0);
        }
        let cursor = self.cursor.oldest_cursor.clone();
        self.fetch_older(cursor).await
    }

    async fn fetch_older(&mut self, cursor: Option<String>) -> Result<usize, SessionError> {
        self.cursor.is_fetching_previous_page = true;
        let result = self
            .client
            .fetch_page(&self.conversation_id, cursor.as_deref())
            .await;
        self.cursor.is_fetching_previous_page = false;

        let page = match result {
            Ok(page) => page,
            Err(error) => {
                let reason = error.to_string();
                warn!(conversation = %self.conversation_id, %reason, "history fetch failed");
                self.emit(SessionUpdate::PaginationFailed {
                    reason: reason.clone(),
                });
                return Err(SessionError::Pagination { reason });
            }
        };

        self.cursor.loaded = true;

        if page.messages.is_empty() {
            self.cursor.has_previous_page = false;
            self.emit(SessionUpdate::HistoryExhausted);
            return Ok(0);
        }

        self.cursor.oldest_cursor = page.next_cursor.clone();
        if page.next_cursor.is_none() {
            self.cursor.has_previous_page = false;
            self.emit(SessionUpdate::HistoryExhausted);
        }

        let count = self.store.prepend_page(page.messages)?;
        if count > 0 {
            self.emit(SessionUpdate::MessagesChanged);
            self.emit(SessionUpdate::PageLoaded { count });
        }
        Ok(count)
    }
}
