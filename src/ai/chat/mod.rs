mod core;
pub mod models;

pub use self::core::{
    CURSOR_MARKER, ChatSession, FALLBACK_REPLY, TurnEvent, TurnOutcome, TurnState,
};
pub use models::Transcript;
