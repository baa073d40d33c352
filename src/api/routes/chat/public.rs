//! Public types for the chat API
use serde::{Deserialize, Serialize};

use crate::openai::Message;

#[derive(Deserialize)]
pub struct ChatRequest {
    pub session_id: String,
    pub message: String,
}

#[derive(Serialize, Deserialize)]
pub struct NewSessionResponse {
    pub session_id: String,
}

#[derive(Deserialize)]
pub struct SelectPersonalityRequest {
    pub personality: String,
}

#[derive(Serialize)]
pub struct ChatTranscriptResponse {
    pub session_id: String,
    pub personality: String,
    pub transcript: Vec<Message>,
}
