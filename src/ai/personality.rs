//! The fixed set of assistant personalities. Each one is a preset tone
//! whose system prompt is prefixed to every completion request made
//! while it is selected.

use anyhow::Result;
use serde::Serialize;
use thiserror::Error;

use crate::ai::prompt::{Prompt, SystemPromptContext, templates};

pub const DEFAULT_PERSONALITY: &str = "Friendly";

#[derive(Debug, Error, PartialEq)]
pub enum PersonalityError {
    #[error("personality '{0}' not found")]
    NotFound(String),
}

/// Static definition of a personality before its prompt is rendered.
struct PersonalityDef {
    id: &'static str,
    name: &'static str,
    icon: &'static str,
    description: &'static str,
    tone: &'static str,
    characteristics: &'static [&'static str],
}

const PERSONALITIES: &[PersonalityDef] = &[
    PersonalityDef {
        id: "Friendly",
        name: "Friendly 😊",
        icon: "😊",
        description: "Warm and friendly, chat like friends",
        tone: "warm and friendly",
        characteristics: &[
            "Communicate with a warm, encouraging tone like a good friend",
            "Use positive and supportive language frequently",
            "Show understanding and support for learning difficulties",
            "Explain complex concepts in simple, easy-to-understand ways",
            "Use emojis appropriately to make conversations more engaging",
            "Care about the user's learning progress and feelings",
        ],
    },
    PersonalityDef {
        id: "Professional",
        name: "Professional 🎓",
        icon: "🎓",
        description: "Rigorous and professional, give accurate advice",
        tone: "professional and rigorous",
        characteristics: &[
            "Use professional, accurate terminology and expressions",
            "Provide structured, well-organized answers",
            "Focus on details and accuracy",
            "Give systematic learning suggestions and methods",
            "Reference reliable learning theories and methods",
            "Maintain an objective and professional attitude",
        ],
    },
    PersonalityDef {
        id: "Humorous",
        name: "Humorous 😄",
        icon: "😄",
        description: "Relaxed and humorous, interesting chat",
        tone: "relaxed and humorous",
        characteristics: &[
            "Communicate with a light and lively tone",
            "Add appropriate humor and interesting analogies",
            "Explain boring knowledge in fun ways",
            "Use emojis and witty remarks frequently",
            "Make the learning process fun and engaging",
            "But maintain accuracy on key knowledge points",
        ],
    },
];

#[derive(Clone, Debug, Serialize, PartialEq)]
pub struct Personality {
    pub id: String,
    pub name: String,
    pub icon: String,
    pub description: String,
    #[serde(skip)]
    pub system_prompt: String,
}

/// Immutable lookup table of personalities, built once at startup.
#[derive(Debug)]
pub struct PersonalityRegistry(Vec<Personality>);

impl PersonalityRegistry {
    pub fn new() -> Result<Self> {
        let registry = templates()?;
        let mut personalities = Vec::with_capacity(PERSONALITIES.len());

        for def in PERSONALITIES {
            let system_prompt = registry.render(
                &Prompt::StudyBuddySystem.to_string(),
                &SystemPromptContext {
                    tone: def.tone,
                    characteristics: def.characteristics,
                },
            )?;
            personalities.push(Personality {
                id: def.id.to_string(),
                name: def.name.to_string(),
                icon: def.icon.to_string(),
                description: def.description.to_string(),
                system_prompt,
            });
        }

        tracing::debug!("Loaded {} personalities", personalities.len());
        Ok(Self(personalities))
    }

    pub fn lookup(&self, id: &str) -> Result<&Personality, PersonalityError> {
        self.0
            .iter()
            .find(|p| p.id == id)
            .ok_or_else(|| PersonalityError::NotFound(id.to_string()))
    }

    /// All personalities in display order.
    pub fn list(&self) -> &[Personality] {
        &self.0
    }
}
