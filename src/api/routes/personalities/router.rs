//! Router for the personalities API

use std::sync::{Arc, RwLock};

use axum::{Router, extract::State, routing::get};

use super::public;
use crate::ai::DEFAULT_PERSONALITY;
use crate::api::state::AppState;

type SharedState = Arc<RwLock<AppState>>;

/// List the personalities available for selection
async fn personality_list(State(state): State<SharedState>) -> axum::Json<public::PersonalitiesResponse> {
    let (registry, model) = {
        let shared_state = state.read().expect("Unable to read share state");
        (
            Arc::clone(&shared_state.registry),
            shared_state.config.openai_model.clone(),
        )
    };

    axum::Json(public::PersonalitiesResponse {
        personalities: registry.list().to_vec(),
        default: DEFAULT_PERSONALITY.to_string(),
        model,
    })
}

/// Create the personalities router
pub fn router() -> Router<SharedState> {
    Router::new().route("/", get(personality_list))
}
