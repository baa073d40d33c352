use std::pin::Pin;

use futures_util::{Stream, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use thiserror::Error;

use crate::core::AppConfig;

#[derive(Clone, Copy, Serialize, Deserialize, Debug, PartialEq, Eq)]
pub enum Role {
    #[serde(rename = "system")]
    System,
    #[serde(rename = "assistant")]
    Assistant,
    #[serde(rename = "user")]
    User,
}

#[derive(Clone, Serialize, Deserialize, Debug, PartialEq)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn new(role: Role, content: &str) -> Self {
        Message {
            role,
            content: content.to_string(),
        }
    }
}

/// Any failure talking to the completion API. Transport, status and
/// parsing failures are all collapsed into this one type so a chat
/// turn only has a single failure path to handle.
#[derive(Debug, Error)]
pub enum CompletionError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("completion API returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("completion API reported an error: {0}")]
    Api(String),

    #[error("malformed completion chunk: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("invalid utf-8 in completion stream: {0}")]
    Encoding(#[from] std::string::FromUtf8Error),

    #[error("completion stream ended before the reply finished")]
    Truncated,
}

/// Text fragments of a completion in arrival order. Finite and not
/// restartable.
pub type FragmentStream = Pin<Box<dyn Stream<Item = Result<String, CompletionError>> + Send>>;

/// Something that can turn a list of messages into a streamed reply.
pub trait CompletionInvoker: Send + Sync {
    /// Returns the reply as a lazy stream. Nothing is sent over the
    /// network until the stream is first polled.
    fn invoke(&self, messages: Vec<Message>) -> FragmentStream;
}

/// Client for OpenAI compatible chat completion APIs (Groq, OpenAI,
/// local llama.cpp servers, etc).
#[derive(Clone, Debug)]
pub struct OpenAiClient {
    http: reqwest::Client,
    api_hostname: String,
    api_key: String,
    model: String,
    temperature: f32,
    max_tokens: u32,
}

impl OpenAiClient {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            api_hostname: config.openai_api_hostname.clone(),
            api_key: config.openai_api_key.clone(),
            model: config.openai_model.clone(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
        }
    }

    fn payload(&self, messages: &[Message]) -> Value {
        json!({
            "model": self.model,
            "messages": messages,
            "temperature": self.temperature,
            "max_tokens": self.max_tokens,
            "stream": true,
        })
    }
}

impl CompletionInvoker for OpenAiClient {
    fn invoke(&self, messages: Vec<Message>) -> FragmentStream {
        let payload = self.payload(&messages);
        completion_stream(
            self.http.clone(),
            payload,
            &self.api_hostname,
            &self.api_key,
        )
    }
}

#[derive(Debug, Default, Deserialize)]
struct Delta {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CompletionChunkChoice {
    #[serde(default)]
    delta: Delta,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CompletionChunk {
    #[serde(default)]
    choices: Vec<CompletionChunkChoice>,
    #[serde(default)]
    error: Option<Value>,
}

/// What a single SSE event carried.
#[derive(Debug, PartialEq)]
enum SseData {
    Chunk {
        content: Option<String>,
        finished: bool,
    },
    Done,
    Skip,
}

/// Joins the `data` fields of one event. Other fields (`event`, `id`,
/// `retry`) and comments are ignored.
fn event_data(event: &str) -> Option<String> {
    let normalized = event.replace("\r\n", "\n").replace('\r', "\n");
    let lines: Vec<&str> = normalized
        .split('\n')
        .filter_map(|line| line.strip_prefix("data:"))
        .map(|value| value.strip_prefix(' ').unwrap_or(value))
        .collect();
    if lines.is_empty() {
        None
    } else {
        Some(lines.join("\n"))
    }
}

fn parse_event(event: &str) -> Result<SseData, CompletionError> {
    let Some(data) = event_data(event) else {
        return Ok(SseData::Skip);
    };
    let data = data.trim();
    if data.is_empty() {
        return Ok(SseData::Skip);
    }
    if data == "[DONE]" {
        return Ok(SseData::Done);
    }

    let chunk = serde_json::from_str::<CompletionChunk>(data).inspect_err(|e| {
        tracing::error!("Parsing completion chunk failed for {}\nError:{}", data, e)
    })?;
    if let Some(err) = chunk.error {
        let msg = err["message"]
            .as_str()
            .map(String::from)
            .unwrap_or_else(|| err.to_string());
        return Err(CompletionError::Api(msg));
    }

    // Role-only and usage-only chunks carry no text
    let Some(choice) = chunk.choices.into_iter().next() else {
        return Ok(SseData::Skip);
    };
    Ok(SseData::Chunk {
        content: choice.delta.content.filter(|c| !c.is_empty()),
        finished: choice.finish_reason.is_some(),
    })
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|w| w == needle)
}

/// Pop the next complete SSE event off the front of `buffer`. Events
/// end with a blank line in any of the three line ending styles.
fn next_event(buffer: &mut Vec<u8>) -> Option<Vec<u8>> {
    let (end, sep_len) = [&b"\r\n\r\n"[..], b"\n\n", b"\r\r"]
        .iter()
        .filter_map(|sep| find(buffer, sep).map(|pos| (pos, sep.len())))
        .min_by_key(|(pos, _)| *pos)?;
    let event = buffer[..end].to_vec();
    buffer.drain(..end + sep_len);
    Some(event)
}

async fn error_for_status(
    response: reqwest::Response,
) -> Result<reqwest::Response, CompletionError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(CompletionError::Status {
        status: status.as_u16(),
        body,
    })
}

/// Streams a chat completion from `{api_hostname}/v1/chat/completions`
/// and yields each non-empty content delta.
pub fn completion_stream(
    http: reqwest::Client,
    payload: Value,
    api_hostname: &str,
    api_key: &str,
) -> FragmentStream {
    let url = format!("{}/v1/chat/completions", api_hostname.trim_end_matches('/'));
    let api_key = api_key.to_string();

    Box::pin(async_stream::try_stream! {
        let response = http
            .post(url)
            .bearer_auth(api_key)
            .header("Content-Type", "application/json")
            .json(&payload)
            .send()
            .await?;
        let response = error_for_status(response).await?;

        let mut stream = response.bytes_stream();
        // Raw bytes are buffered rather than decoded per network chunk
        // since both SSE events and multi-byte characters can be split
        // across HTTP/2 frames.
        let mut buffer: Vec<u8> = Vec::new();
        // Either `[DONE]` or a `finish_reason` means the reply is whole
        let mut finished = false;

        'outer: while let Some(chunk) = stream.next().await {
            buffer.extend_from_slice(&chunk?);

            while let Some(event) = next_event(&mut buffer) {
                let event = String::from_utf8(event)?;
                match parse_event(&event)? {
                    SseData::Chunk { content, finished: last } => {
                        if let Some(text) = content {
                            yield text;
                        }
                        finished |= last;
                    }
                    SseData::Done => {
                        finished = true;
                        buffer.clear();
                        break 'outer;
                    }
                    SseData::Skip => {}
                }
            }
        }

        // Flush an unterminated trailing event
        if !buffer.is_empty() {
            let event = String::from_utf8(std::mem::take(&mut buffer))?;
            match parse_event(&event)? {
                SseData::Chunk { content, finished: last } => {
                    if let Some(text) = content {
                        yield text;
                    }
                    finished |= last;
                }
                SseData::Done => finished = true,
                SseData::Skip => {}
            }
        }

        // A clean close after a finish reason is a complete reply even
        // without `[DONE]`
        if !finished {
            Err::<(), CompletionError>(CompletionError::Truncated)?;
        }
    })
}
