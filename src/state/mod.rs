pub mod manager;
pub mod session;
pub mod store;

pub use manager::SessionManager;
pub use session::{
    ChatSession, SessionSnapshot, SessionUpdate, StopController, SubmitOptions, TurnState,
};
pub use store::{AssistantPatch, MessageStore};
