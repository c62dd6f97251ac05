mod api;
mod message;

pub use api::{GenerationConfig, JobHandle, Page, SendPayload, TurnEvent};
pub use message::{
    Message, MessageMetadata, MessageRole, MessageStatus, OPTIMISTIC_ASSISTANT_MESSAGE_ID,
    OPTIMISTIC_USER_MESSAGE_ID,
};
