use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::api::NodeClient;
use crate::config::Config;
use crate::state::store::MessageStore;
use crate::types::{JobHandle, Message};

/// Explicit lifecycle of the current turn. Controllers maintain this
/// directly; it is never re-derived by scanning message content.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnState {
    Idle,
    Submitting,
    AwaitingFirstToken,
    Streaming,
    Complete,
    Stopped,
    Failed,
}

impl TurnState {
    pub fn is_running(self) -> bool {
        matches!(
            self,
            TurnState::Submitting | TurnState::AwaitingFirstToken | TurnState::Streaming
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            TurnState::Complete | TurnState::Stopped | TurnState::Failed
        )
    }
}

/// Notifications pushed to the embedding UI. `MessagesChanged` follows every
/// store mutation; the rest mark lifecycle edges.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionUpdate {
    MessagesChanged,
    StreamDelta { text: String },
    TurnStarted { job_id: String },
    TurnCompleted,
    TurnStopped,
    TurnFailed { reason: String },
    PageLoaded { count: usize },
    HistoryExhausted,
    PaginationFailed { reason: String },
}

/// Read-only projection handed to rendering code.
#[derive(Debug, Clone)]
pub struct SessionSnapshot {
    pub messages: Vec<Message>,
    pub has_previous_page: bool,
    pub is_fetching_previous_page: bool,
    pub is_submitting: bool,
}

#[derive(Debug, Clone)]
pub(super) struct PageCursor {
    pub has_previous_page: bool,
    pub is_fetching_previous_page: bool,
    /// Cursor token of the oldest loaded page; `None` means "newest page".
    pub oldest_cursor: Option<String>,
    pub loaded: bool,
}

impl Default for PageCursor {
    fn default() -> Self {
        Self {
            has_previous_page: true,
            is_fetching_previous_page: false,
            oldest_cursor: None,
            loaded: false,
        }
    }
}

/// The job currently generating plus its cancellation token. Shared with
/// `StopController` so a stop can land while `submit` drives the turn.
#[derive(Clone)]
pub(super) struct ActiveTurn {
    pub job: JobHandle,
    pub cancel: CancellationToken,
}

pub(super) type ActiveTurnSlot = Arc<tokio::sync::Mutex<Option<ActiveTurn>>>;

/// Per-conversation engine: owns the message store, the draft, the turn
/// lifecycle and the pagination cursor. All mutation goes through the
/// controller methods; rendering code only sees `snapshot()` and the
/// update channel.
pub struct ChatSession {
    pub(super) conversation_id: String,
    pub(super) client: Arc<NodeClient>,
    pub(super) store: MessageStore,
    pub(super) turn: TurnState,
    pub(super) cursor: PageCursor,
    pub(super) active_turn: ActiveTurnSlot,
    pub(super) update_tx: Option<mpsc::UnboundedSender<SessionUpdate>>,
    pub(super) poll_interval: Duration,
    pub(super) stream_watchdog: Duration,
    draft: String,
    agent: Option<String>,
    tool_reference: Option<String>,
}

impl ChatSession {
    pub fn new(conversation_id: impl Into<String>, client: Arc<NodeClient>, config: &Config) -> Self {
        Self {
            conversation_id: conversation_id.into(),
            client,
            store: MessageStore::new(),
            turn: TurnState::Idle,
            cursor: PageCursor::default(),
            active_turn: Arc::new(tokio::sync::Mutex::new(None)),
            update_tx: None,
            poll_interval: config.poll_interval,
            stream_watchdog: config.stream_watchdog,
            draft: String::new(),
            agent: None,
            tool_reference: None,
        }
    }

    #[cfg(test)]
    pub fn new_mock(conversation_id: &str, client: NodeClient) -> Self {
        let mut session = Self {
            conversation_id: conversation_id.to_string(),
            client: Arc::new(client),
            store: MessageStore::new(),
            turn: TurnState::Idle,
            cursor: PageCursor::default(),
            active_turn: Arc::new(tokio::sync::Mutex::new(None)),
            update_tx: None,
            poll_interval: Duration::from_millis(10),
            stream_watchdog: Duration::from_secs(5),
            draft: String::new(),
            agent: None,
            tool_reference: None,
        };
        session.set_agent("main/agent/default");
        session
    }

    /// Open the update channel. The previous receiver, if any, stops
    /// receiving; the latest subscriber wins.
    pub fn subscribe(&mut self) -> mpsc::UnboundedReceiver<SessionUpdate> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.update_tx = Some(tx);
        rx
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            messages: self.store.messages(),
            has_previous_page: self.cursor.has_previous_page,
            is_fetching_previous_page: self.cursor.is_fetching_previous_page,
            is_submitting: self.turn.is_running(),
        }
    }

    pub fn conversation_id(&self) -> &str {
        &self.conversation_id
    }

    pub fn turn_state(&self) -> TurnState {
        self.turn
    }

    pub fn messages(&self) -> Vec<Message> {
        self.store.messages()
    }

    pub fn draft(&self) -> &str {
        &self.draft
    }

    pub fn set_draft(&mut self, draft: impl Into<String>) {
        self.draft = draft.into();
    }

    pub fn agent(&self) -> Option<&str> {
        self.agent.as_deref()
    }

    pub fn set_agent(&mut self, agent: impl Into<String>) {
        self.agent = Some(agent.into());
    }

    pub fn clear_agent(&mut self) {
        self.agent = None;
    }

    pub fn tool_reference(&self) -> Option<&str> {
        self.tool_reference.as_deref()
    }

    /// Transient tool/workflow selection for the next turn; cleared once a
    /// send is accepted.
    pub fn set_tool_reference(&mut self, tool: impl Into<String>) {
        self.tool_reference = Some(tool.into());
    }

    pub(super) fn selected_agent(&self) -> Option<String> {
        self.agent.clone()
    }

    pub(super) fn clear_tool_reference(&mut self) {
        self.tool_reference = None;
    }

    pub(super) fn clear_draft(&mut self) {
        self.draft.clear();
    }

    pub(super) fn set_turn(&mut self, turn: TurnState) {
        self.turn = turn;
    }

    pub(super) fn emit(&self, update: SessionUpdate) {
        if let Some(tx) = &self.update_tx {
            let _ = tx.send(update);
        }
    }
}
