//! Public types for the personalities API
use serde::Serialize;

use crate::ai::Personality;

#[derive(Serialize)]
pub struct PersonalitiesResponse {
    pub personalities: Vec<Personality>,
    pub default: String,
    /// Model that replies are requested from
    pub model: String,
}
