//! Router for the chat API

use std::sync::{Arc, RwLock};
use std::time::Duration;

use axum::{
    Router,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response, sse::Event, sse::KeepAlive, sse::Sse},
    routing::{get, post, put},
};
use tokio::sync::mpsc;
use tokio_stream::StreamExt as _;
use tokio_stream::wrappers::UnboundedReceiverStream;
use uuid::Uuid;

use super::public;
use crate::ai::PersonalityError;
use crate::ai::chat::TurnEvent;
use crate::api::public::ApiError;
use crate::api::state::AppState;

type SharedState = Arc<RwLock<AppState>>;

fn busy_response(session_id: &str) -> Response {
    (
        StatusCode::CONFLICT,
        format!("A reply is still in progress for session {}", session_id),
    )
        .into_response()
}

fn not_found_response(session_id: &str) -> Response {
    (
        StatusCode::NOT_FOUND,
        format!("Chat session {} not found", session_id),
    )
        .into_response()
}

/// Start a new chat session
async fn new_session(State(state): State<SharedState>) -> axum::Json<public::NewSessionResponse> {
    let session_id = Uuid::new_v4().to_string();
    state
        .write()
        .expect("Unable to write share state")
        .get_or_create_session(&session_id);

    axum::Json(public::NewSessionResponse { session_id })
}

/// Get the transcript of a chat session by ID
async fn chat_session(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> Result<Response, ApiError> {
    let session = state.write().expect("Unable to write share state").session(&id);
    let Some(session) = session else {
        return Ok(not_found_response(&id));
    };

    // Waits for any in-flight turn so the transcript is never half
    // written
    let session = session.lock().await;
    Ok(axum::Json(public::ChatTranscriptResponse {
        session_id: id,
        personality: session.personality_id().to_string(),
        transcript: session.transcript().snapshot(),
    })
    .into_response())
}

/// Clear the transcript of a chat session
async fn reset_session(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> Result<Response, ApiError> {
    let session = state.write().expect("Unable to write share state").session(&id);

    if let Some(session) = session {
        let Ok(mut session) = session.try_lock() else {
            return Ok(busy_response(&id));
        };
        session.reset();
        tracing::info!("Reset chat session {}", id);
    }

    Ok(StatusCode::NO_CONTENT.into_response())
}

/// Change the personality used for the next turns of a session
async fn select_personality(
    State(state): State<SharedState>,
    Path(id): Path<String>,
    axum::Json(payload): axum::Json<public::SelectPersonalityRequest>,
) -> Result<Response, ApiError> {
    let (session, registry) = {
        let mut shared_state = state.write().expect("Unable to write share state");
        (
            shared_state.session(&id),
            Arc::clone(&shared_state.registry),
        )
    };
    let Some(session) = session else {
        return Ok(not_found_response(&id));
    };

    let Ok(mut session) = session.try_lock() else {
        return Ok(busy_response(&id));
    };

    match session.select_personality(&registry, &payload.personality) {
        Ok(()) => Ok(StatusCode::NO_CONTENT.into_response()),
        Err(e @ PersonalityError::NotFound(_)) => {
            Ok((StatusCode::NOT_FOUND, e.to_string()).into_response())
        }
    }
}

/// Add a message to a chat session and stream the reply back as
/// server sent events, one JSON encoded `TurnEvent` per event
async fn chat_handler(
    State(state): State<SharedState>,
    axum::Json(payload): axum::Json<public::ChatRequest>,
) -> Result<Response, ApiError> {
    if payload.message.trim().is_empty() {
        return Ok((StatusCode::BAD_REQUEST, "Message must not be empty").into_response());
    }

    let (session, registry, invoker) = {
        let mut shared_state = state.write().expect("Unable to write share state");
        (
            shared_state.get_or_create_session(&payload.session_id),
            Arc::clone(&shared_state.registry),
            Arc::clone(&shared_state.invoker),
        )
    };

    // Only one turn per session at a time
    let Ok(mut session) = session.try_lock_owned() else {
        return Ok(busy_response(&payload.session_id));
    };

    let (tx, rx) = mpsc::unbounded_channel::<TurnEvent>();
    let sse_stream = UnboundedReceiverStream::new(rx).map(|event| Event::default().json_data(event));

    // The turn runs to completion even if the client goes away
    tokio::spawn(async move {
        let result = session
            .run_turn(&registry, invoker.as_ref(), &payload.message, |event| {
                // The receiver is gone if the client disconnected
                let _ = tx.send(event);
            })
            .await;

        if let Err(e) = result {
            tracing::error!("Chat turn for session {} failed: {}", payload.session_id, e);
        }
    });

    let resp = Sse::new(sse_stream)
        .keep_alive(
            KeepAlive::default()
                .text("keep-alive")
                .interval(Duration::from_secs(1)),
        )
        .into_response();

    Ok(resp)
}

/// Create the chat router
pub fn router() -> Router<SharedState> {
    Router::new()
        .route("/", post(chat_handler))
        .route("/sessions", post(new_session))
        .route("/{id}", get(chat_session).delete(reset_session))
        .route("/{id}/personality", put(select_personality))
}
