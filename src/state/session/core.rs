use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use super::state::{ActiveTurn, ActiveTurnSlot, ChatSession, SessionUpdate, TurnState};
use crate::api::NodeClient;
use crate::error::SessionError;
use crate::types::{GenerationConfig, Message, MessageRole, SendPayload};

/// Per-turn options supplied by the UI alongside the message text.
#[derive(Debug, Clone, Default)]
pub struct SubmitOptions {
    pub attachments: Vec<serde_json::Value>,
    pub generation: GenerationConfig,
}

impl ChatSession {
    /// Run one user turn to its terminal state and return the final
    /// assistant content (partial content when the turn was stopped).
    ///
    /// Validation failures happen before any network call and mutate
    /// nothing. A send rejected by the node rolls both optimistic messages
    /// back and leaves the draft untouched so the user can retry.
    pub async fn submit(
        &mut self,
        content: impl Into<String>,
        options: SubmitOptions,
    ) -> Result<String, SessionError> {
        let content = content.into();
        let trimmed = content.trim();
        if trimmed.is_empty() {
            return Err(SessionError::EmptyContent);
        }
        let Some(agent) = self.selected_agent() else {
            return Err(SessionError::NoAgentSelected);
        };
        if self.turn.is_running() || self.store.running_assistant().is_some() {
            return Err(SessionError::TurnInProgress);
        }

        // A previous turn that settled without node confirmation still holds
        // the sentinel slots; keep its rows as local history.
        self.store.promote_settled_tail();

        self.store
            .append_optimistic(Message::optimistic_user(trimmed, options.attachments.clone()))?;
        self.emit(SessionUpdate::MessagesChanged);
        self.store.append_optimistic(Message::assistant_placeholder())?;
        self.set_turn(TurnState::Submitting);
        self.emit(SessionUpdate::MessagesChanged);

        let mut generation = options.generation.clone();
        generation.stream = generation.stream && self.client.supports_streaming();
        let streaming = generation.stream;
        let payload = SendPayload {
            content: trimmed.to_string(),
            attachments: options.attachments,
            tool_reference: self.tool_reference().map(str::to_string),
            agent,
            generation,
        };

        let job = match self.client.send_turn(&self.conversation_id, &payload).await {
            Ok(job) => job,
            Err(error) => {
                self.store.remove_optimistic(MessageRole::Assistant);
                self.store.remove_optimistic(MessageRole::User);
                self.set_turn(TurnState::Idle);
                self.emit(SessionUpdate::MessagesChanged);
                return Err(SessionError::Submission {
                    reason: error.to_string(),
                });
            }
        };

        let cancel = CancellationToken::new();
        *self.active_turn.lock().await = Some(ActiveTurn {
            job: job.clone(),
            cancel: cancel.clone(),
        });
        self.clear_draft();
        self.clear_tool_reference();
        self.emit(SessionUpdate::TurnStarted {
            job_id: job.job_id.clone(),
        });

        let outcome = if streaming {
            self.reconcile_stream(&job, &cancel).await
        } else {
            self.reconcile_poll(&cancel).await
        };

        *self.active_turn.lock().await = None;
        outcome
    }

    /// Handle for requesting cancellation while `submit` is driving a turn.
    pub fn stop_controller(&self) -> StopController {
        StopController {
            client: Arc::clone(&self.client),
            active_turn: Arc::clone(&self.active_turn),
        }
    }
}

/// Cancels the conversation's active job. Cloneable and independent of the
/// session borrow, so the UI can hold one while a turn is in flight.
#[derive(Clone)]
pub struct StopController {
    client: Arc<NodeClient>,
    active_turn: ActiveTurnSlot,
}

impl StopController {
    /// Request stop for the active job. Returns `Ok(false)` when no turn is
    /// running (a no-op). The running turn is only transitioned after the
    /// node acknowledges; a failed stop request leaves it untouched so the
    /// user can retry.
    pub async fn stop(&self) -> Result<bool, SessionError> {
        let active = self.active_turn.lock().await.clone();
        let Some(active) = active else {
            return Ok(false);
        };

        self.client
            .request_stop(&active.job)
            .await
            .map_err(|error| SessionError::Stop {
                reason: error.to_string(),
            })?;
        active.cancel.cancel();
        Ok(true)
    }
}
