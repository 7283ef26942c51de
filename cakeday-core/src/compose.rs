//! Message composition: tones, fallback templates, and the composer seam.
//!
//! Two composers exist and one is picked when the app wires itself up:
//! `TemplateComposer` (deterministic) and `LlmComposer` (wraps any
//! `TextGenerator`, masking its failures with the template).

use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{CakedayError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageTone {
    Formal,
    Casual,
    Funny,
    Romantic,
}

impl MessageTone {
    pub const ALL: [MessageTone; 4] = [
        MessageTone::Formal,
        MessageTone::Casual,
        MessageTone::Funny,
        MessageTone::Romantic,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            MessageTone::Formal => "formal",
            MessageTone::Casual => "casual",
            MessageTone::Funny => "funny",
            MessageTone::Romantic => "romantic",
        }
    }
}

impl fmt::Display for MessageTone {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MessageTone {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "formal" => Ok(MessageTone::Formal),
            "casual" => Ok(MessageTone::Casual),
            "funny" => Ok(MessageTone::Funny),
            "romantic" => Ok(MessageTone::Romantic),
            other => Err(format!("unknown tone: {other}")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComposeRequest {
    pub tone: MessageTone,
    pub name: String,
    pub age: Option<u32>,
    pub hint: Option<String>,
}

/// Deterministic message used whenever generation is unavailable or fails.
pub fn fallback_message(tone: MessageTone, name: &str, age: Option<u32>) -> String {
    match tone {
        MessageTone::Formal => format!("Happy birthday, {name}. Wishing you a wonderful year ahead."),
        MessageTone::Casual => match age {
            Some(age) => format!("Happy birthday, {name}! You're now {age}. Hope it's a great one 🎉"),
            None => format!("Happy birthday, {name}! Hope it's a great one 🎉"),
        },
        MessageTone::Funny => format!(
            "HBD {name}! Another lap around the sun — level {} unlocked 🥳",
            age.unwrap_or(0)
        ),
        MessageTone::Romantic => format!("Happy birthday, {name} ❤️ So grateful for you—hope today is perfect."),
    }
}

/// Produces message text. Never fails: implementations fall back to a template.
#[async_trait]
pub trait MessageComposer: Send + Sync {
    async fn compose(&self, request: &ComposeRequest) -> String;
}

/// Raw text generation backend (a language model, usually). May fail.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    async fn generate(&self, instructions: &str, prompt: &str) -> Result<String>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct TemplateComposer;

#[async_trait]
impl MessageComposer for TemplateComposer {
    async fn compose(&self, request: &ComposeRequest) -> String {
        fallback_message(request.tone, &request.name, request.age)
    }
}

pub const COMPOSER_INSTRUCTIONS: &str = "You write short SMS birthday messages.

Rules:
- Use the requested tone: formal, casual, funny, or romantic.
- 1-2 sentences max.
- Address the person by name.
- Follow the user's notes on style and content.
- Output only the message text, no quotes, no meta commentary.";

pub fn build_prompt(request: &ComposeRequest) -> String {
    let age_line = match request.age {
        Some(age) => format!("They are turning {age}."),
        None => "Do not mention their age unless explicitly specified.".to_string(),
    };
    let mut prompt = format!(
        "Write a {} birthday text for {}.\n{}",
        request.tone, request.name, age_line
    );
    if let Some(hint) = request.hint.as_deref().map(str::trim).filter(|h| !h.is_empty()) {
        prompt.push_str(&format!("\nUser notes for style/content: \"{hint}\""));
    }
    prompt
}

pub struct LlmComposer<G: TextGenerator> {
    generator: G,
}

impl<G: TextGenerator> LlmComposer<G> {
    pub fn new(generator: G) -> Self {
        Self { generator }
    }
}

#[async_trait]
impl<G: TextGenerator> MessageComposer for LlmComposer<G> {
    async fn compose(&self, request: &ComposeRequest) -> String {
        let fallback = || fallback_message(request.tone, &request.name, request.age);

        match self.generator.generate(COMPOSER_INSTRUCTIONS, &build_prompt(request)).await {
            Ok(text) => {
                let text = text.trim().trim_matches('"').trim();
                if text.is_empty() {
                    warn!("generator returned empty text; using template");
                    fallback()
                } else {
                    text.to_string()
                }
            }
            Err(CakedayError::ComposerFailure(reason)) => {
                warn!(%reason, "generation failed; using template");
                fallback()
            }
            Err(e) => {
                warn!(error = %e, "generation failed; using template");
                fallback()
            }
        }
    }
}
