//! The core models for managing a stateful chat with an LLM.
use crate::openai::Message;

/// Chronological history of a chat session. The system prompt is not
/// stored here; it's prefixed fresh on every request.
#[derive(Clone, Debug, Default)]
pub struct Transcript(Vec<Message>);

impl Transcript {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    pub fn new_with_messages(messages: Vec<Message>) -> Self {
        Self(messages)
    }

    /// Adds a message to the end. Role ordering is not validated.
    pub fn append(&mut self, msg: Message) {
        self.0.push(msg)
    }

    pub fn clear(&mut self) {
        self.0.clear()
    }

    /// Copy of the messages in order, for use as completion input.
    pub fn snapshot(&self) -> Vec<Message> {
        self.0.clone()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Message> {
        self.0.iter()
    }
}
