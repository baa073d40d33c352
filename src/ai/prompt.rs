//! Reusable prompts using Handlebars for templating. Strict mode is
//! on so a personality missing a field fails at startup instead of
//! rendering a half-empty system prompt.

use std::fmt;

use anyhow::Result;
use handlebars::Handlebars;
use serde::Serialize;

#[derive(Debug)]
pub enum Prompt {
    StudyBuddySystem,
}

impl fmt::Display for Prompt {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

impl From<Prompt> for String {
    fn from(item: Prompt) -> String {
        format!("{:?}", item)
    }
}

// Each characteristic starts on a new line so the prompt has no
// trailing newline
const STUDY_BUDDY_SYSTEM_PROMPT: &str = "You are a {{tone}} Study Buddy AI assistant. Your characteristics:{{#each characteristics}}
- {{this}}{{/each}}";

#[derive(Serialize)]
pub struct SystemPromptContext<'a> {
    pub tone: &'a str,
    pub characteristics: &'a [&'a str],
}

pub fn templates<'a>() -> Result<Handlebars<'a>> {
    let mut registry = Handlebars::new();
    registry.set_strict_mode(true);
    // Prompts are plain text, not HTML
    registry.register_escape_fn(handlebars::no_escape);
    registry
        .register_template_string(&Prompt::StudyBuddySystem.to_string(), STUDY_BUDDY_SYSTEM_PROMPT)?;
    Ok(registry)
}
