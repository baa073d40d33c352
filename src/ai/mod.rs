pub mod chat;
pub mod personality;
pub mod prompt;

pub use personality::{DEFAULT_PERSONALITY, Personality, PersonalityError, PersonalityRegistry};
