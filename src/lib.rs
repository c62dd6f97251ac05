//! Conversation session engine for a remote Shinkai AI node.
//!
//! One [`state::ChatSession`] per conversation owns the ordered message
//! history, the optimistic tail shown before the node confirms anything,
//! streaming reconciliation for the in-flight assistant turn, pagination of
//! older history, and stop-generation. UI surfaces read
//! [`state::SessionSnapshot`] and listen on the [`state::SessionUpdate`]
//! channel; all network I/O goes through [`api::NodeClient`].

pub mod api;
pub mod config;
pub mod error;
pub mod state;
pub mod types;

#[cfg(test)]
pub(crate) mod test_support;

pub use config::Config;
pub use error::{SessionError, StoreError};
pub use state::{
    ChatSession, SessionManager, SessionSnapshot, SessionUpdate, StopController, SubmitOptions,
};
