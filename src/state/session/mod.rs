mod core;
mod pagination;
mod state;
mod streaming;


pub use self::core::{StopController, SubmitOptions};
pub use state::{ChatSession, SessionSnapshot, SessionUpdate, TurnState};
