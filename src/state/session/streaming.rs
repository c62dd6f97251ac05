use futures::StreamExt;
use tokio::time::{interval, timeout, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::state::{ChatSession, SessionUpdate, TurnState};
use crate::api::EventStreamParser;
use crate::error::{SessionError, StoreError};
use crate::state::store::AssistantPatch;
use crate::types::{JobHandle, Message, MessageRole, MessageStatus, Page, TurnEvent};

pub(super) enum EventOutcome {
    Continue,
    Completed,
    Failed { reason: String },
}

impl ChatSession {
    /// Drive the SSE event stream for one turn until a terminal status.
    /// Events apply in delivery order; anything arriving after the turn
    /// settled is dropped. A silent stream trips the watchdog instead of
    /// leaving the turn running forever.
    pub(super) async fn reconcile_stream(
        &mut self,
        job: &JobHandle,
        cancel: &CancellationToken,
    ) -> Result<String, SessionError> {
        self.set_turn(TurnState::AwaitingFirstToken);
        let mut stream = match self.client.open_event_stream(job).await {
            Ok(stream) => stream,
            Err(error) => return Err(self.settle_failed(error.to_string())),
        };
        let mut parser = EventStreamParser::new();
        let mut accumulated = String::new();

        loop {
            let step = tokio::select! {
                _ = cancel.cancelled() => return self.settle_stopped(accumulated),
                step = timeout(self.stream_watchdog, stream.next()) => step,
            };

            let chunk = match step {
                Err(_stalled) => {
                    return Err(self.settle_failed(format!(
                        "no stream event within {:?}",
                        self.stream_watchdog
                    )))
                }
                Ok(None) => {
                    return Err(
                        self.settle_failed("event stream ended before completion".to_string())
                    )
                }
                Ok(Some(Err(error))) => return Err(self.settle_failed(error.to_string())),
                Ok(Some(Ok(chunk))) => chunk,
            };

            let events = match parser.process(&chunk) {
                Ok(events) => events,
                Err(error) => return Err(self.settle_failed(error.to_string())),
            };

            for event in events {
                match self.apply_turn_event(&mut accumulated, event) {
                    EventOutcome::Continue => {}
                    EventOutcome::Completed => {
                        self.confirm_turn().await;
                        return Ok(accumulated);
                    }
                    EventOutcome::Failed { reason } => return Err(self.settle_failed(reason)),
                }
            }
        }
    }

    /// Apply one stream event to the running turn. Safe to call after the
    /// turn settled: late events are logged and dropped, never applied.
    pub(super) fn apply_turn_event(
        &mut self,
        accumulated: &mut String,
        event: TurnEvent,
    ) -> EventOutcome {
        if self.turn.is_terminal() {
            debug!(
                conversation = %self.conversation_id,
                "dropping stream event delivered after terminal status"
            );
            return EventOutcome::Continue;
        }

        match event {
            TurnEvent::PartialContent { text } => {
                accumulated.push_str(&text);
                match self
                    .store
                    .patch_running_assistant(AssistantPatch::content(accumulated.clone()))
                {
                    Ok(()) => {
                        self.set_turn(TurnState::Streaming);
                        self.emit(SessionUpdate::StreamDelta { text });
                        self.emit(SessionUpdate::MessagesChanged);
                    }
                    Err(StoreError::NoActiveTurn) => {
                        debug!(
                            conversation = %self.conversation_id,
                            "no running assistant for partial content; dropping"
                        );
                    }
                    Err(error) => {
                        warn!(%error, "unexpected store state while patching stream content");
                    }
                }
                EventOutcome::Continue
            }
            TurnEvent::Done => {
                self.settle_complete();
                EventOutcome::Completed
            }
            TurnEvent::Error { reason } => EventOutcome::Failed { reason },
            TurnEvent::Unknown => {
                debug!("ignoring unrecognized turn event");
                EventOutcome::Continue
            }
        }
    }

    /// Fallback for providers without incremental streaming: poll the newest
    /// page until the turn's assistant message leaves `Running`, then adopt
    /// the node-confirmed rows. Confirmed rows always win over locally
    /// accumulated content.
    pub(super) async fn reconcile_poll(
        &mut self,
        cancel: &CancellationToken,
    ) -> Result<String, SessionError> {
        self.set_turn(TurnState::AwaitingFirstToken);
        let mut ticker = interval(self.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut last_progress = Instant::now();
        let mut last_content_len = 0usize;

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    let content = self.running_content();
                    return self.settle_stopped(content);
                }
                _ = ticker.tick() => {}
            }

            if last_progress.elapsed() > self.stream_watchdog {
                return Err(self.settle_failed(format!(
                    "turn made no progress within {:?}",
                    self.stream_watchdog
                )));
            }

            let page = match self.client.fetch_page(&self.conversation_id, None).await {
                Ok(page) => page,
                Err(error) => return Err(self.settle_failed(error.to_string())),
            };

            if let Some(user) = page
                .messages
                .iter()
                .rev()
                .find(|message| message.role == MessageRole::User)
            {
                if self.adopt_confirmed(MessageRole::User, user) {
                    self.emit(SessionUpdate::MessagesChanged);
                }
            }

            let Some(assistant) = page
                .messages
                .iter()
                .rev()
                .find(|message| message.role == MessageRole::Assistant)
                .cloned()
            else {
                continue;
            };

            match assistant.status {
                Some(MessageStatus::Running) => {
                    if assistant.content.len() != last_content_len {
                        last_content_len = assistant.content.len();
                        last_progress = Instant::now();
                        if self
                            .store
                            .patch_running_assistant(AssistantPatch::content(
                                assistant.content.clone(),
                            ))
                            .is_ok()
                        {
                            self.set_turn(TurnState::Streaming);
                            self.emit(SessionUpdate::MessagesChanged);
                        }
                    }
                }
                terminal => {
                    // Rows without a status are legacy completions.
                    let status = terminal.unwrap_or(MessageStatus::Complete);
                    let content = assistant.content.clone();
                    if !self.adopt_confirmed(MessageRole::Assistant, &assistant) {
                        // Stale row: keep the sentinel but freeze its content.
                        let _ = self
                            .store
                            .patch_running_assistant(AssistantPatch::content(content.clone()));
                    }
                    return match status {
                        MessageStatus::Complete => {
                            self.settle_complete();
                            Ok(content)
                        }
                        MessageStatus::Stopped => self.settle_stopped(content),
                        MessageStatus::Failed | MessageStatus::Running => {
                            Err(self.settle_failed("node reported a failed turn".to_string()))
                        }
                    };
                }
            }
        }
    }

    /// After `Done`, supersede the optimistic pair with the node-confirmed
    /// rows. Best effort: when the refetch fails the streamed content
    /// stands and the sentinels remain until the next page load.
    pub(super) async fn confirm_turn(&mut self) {
        match self.client.fetch_page(&self.conversation_id, None).await {
            Ok(page) => {
                self.absorb_confirmed_tail(&page);
            }
            Err(error) => {
                warn!(%error, "could not refetch confirmed turn; keeping streamed content");
            }
        }
    }

    pub(super) fn absorb_confirmed_tail(&mut self, page: &Page) -> bool {
        let mut replaced = false;
        if let Some(user) = page
            .messages
            .iter()
            .rev()
            .find(|message| message.role == MessageRole::User)
        {
            replaced |= self.adopt_confirmed(MessageRole::User, user);
        }
        if let Some(assistant) = page.messages.iter().rev().find(|message| {
            message.role == MessageRole::Assistant
                && message.status.map_or(true, MessageStatus::is_terminal)
        }) {
            replaced |= self.adopt_confirmed(MessageRole::Assistant, assistant);
        }
        if replaced {
            self.emit(SessionUpdate::MessagesChanged);
        }
        replaced
    }

    /// Supersede the sentinel of `role` with a node-confirmed row. A row
    /// whose id is already loaded is a stale fetch and is not adopted.
    fn adopt_confirmed(&mut self, role: MessageRole, confirmed: &Message) -> bool {
        if self.store.contains_id(&confirmed.id) {
            return false;
        }
        self.store.replace_optimistic(role, confirmed.clone())
    }

    pub(super) fn settle_complete(&mut self) {
        if let Err(error) = self
            .store
            .patch_running_assistant(AssistantPatch::status(MessageStatus::Complete))
        {
            debug!(%error, "no running assistant left to complete");
        }
        self.set_turn(TurnState::Complete);
        self.emit(SessionUpdate::MessagesChanged);
        self.emit(SessionUpdate::TurnCompleted);
    }

    pub(super) fn settle_stopped(&mut self, accumulated: String) -> Result<String, SessionError> {
        if let Err(error) = self
            .store
            .patch_running_assistant(AssistantPatch::status(MessageStatus::Stopped))
        {
            debug!(%error, "no running assistant left to stop");
        }
        self.set_turn(TurnState::Stopped);
        self.emit(SessionUpdate::MessagesChanged);
        self.emit(SessionUpdate::TurnStopped);
        Ok(accumulated)
    }

    pub(super) fn settle_failed(&mut self, reason: String) -> SessionError {
        if let Err(error) = self
            .store
            .patch_running_assistant(AssistantPatch::status(MessageStatus::Failed))
        {
            debug!(%error, "no running assistant left to fail");
        }
        self.set_turn(TurnState::Failed);
        self.emit(SessionUpdate::MessagesChanged);
        self.emit(SessionUpdate::TurnFailed {
            reason: reason.clone(),
        });
        SessionError::Stream { reason }
    }

    fn running_content(&self) -> String {
        self.store
            .running_assistant()
            .map(|message| message.content.clone())
            .unwrap_or_default()
    }
}
