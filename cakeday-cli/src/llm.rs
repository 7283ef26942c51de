//! Remote text generation for birthday messages (OpenAI / Anthropic HTTP APIs).

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use cakeday_core::{CakedayError, LlmComposer, MessageComposer, TemplateComposer, TextGenerator};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::config::{LlmSection, ProviderKind};

const OPENAI_URL: &str = "https://api.openai.com/v1/chat/completions";
const ANTHROPIC_URL: &str = "https://api.anthropic.com/v1/messages";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(20);
const MAX_TOKENS: u32 = 120;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Provider {
    Anthropic,
    OpenAI,
}

impl Provider {
    fn key_var(self) -> &'static str {
        match self {
            Provider::Anthropic => "ANTHROPIC_API_KEY",
            Provider::OpenAI => "OPENAI_API_KEY",
        }
    }
}

pub struct HttpGenerator {
    provider: Provider,
    model: String,
    temperature: f32,
    api_key: String,
    client: reqwest::Client,
}

#[derive(Serialize)]
struct Msg<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Serialize)]
struct OpenAiReq<'a> {
    model: &'a str,
    messages: Vec<Msg<'a>>,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Serialize)]
struct AnthropicReq<'a> {
    model: &'a str,
    max_tokens: u32,
    temperature: f32,
    system: &'a str,
    messages: Vec<Msg<'a>>,
}

impl HttpGenerator {
    pub fn new(provider: Provider, model: impl Into<String>, temperature: f32, api_key: String) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .context("build http client")?;
        Ok(Self {
            provider,
            model: model.into(),
            temperature,
            api_key,
            client,
        })
    }

    fn openai_body<'a>(&'a self, instructions: &'a str, prompt: &'a str) -> OpenAiReq<'a> {
        OpenAiReq {
            model: &self.model,
            messages: vec![
                Msg {
                    role: "system",
                    content: instructions,
                },
                Msg {
                    role: "user",
                    content: prompt,
                },
            ],
            temperature: self.temperature,
            max_tokens: MAX_TOKENS,
        }
    }

    fn anthropic_body<'a>(&'a self, instructions: &'a str, prompt: &'a str) -> AnthropicReq<'a> {
        AnthropicReq {
            model: &self.model,
            max_tokens: MAX_TOKENS,
            temperature: self.temperature,
            system: instructions,
            messages: vec![Msg {
                role: "user",
                content: prompt,
            }],
        }
    }

    async fn openai_complete(&self, instructions: &str, prompt: &str) -> Result<String> {
        #[derive(Deserialize)]
        struct Resp {
            choices: Vec<Choice>,
        }

        #[derive(Deserialize)]
        struct Choice {
            message: MsgOut,
        }

        #[derive(Deserialize)]
        struct MsgOut {
            content: Option<String>,
        }

        let resp = self
            .client
            .post(OPENAI_URL)
            .header(AUTHORIZATION, format!("Bearer {}", self.api_key))
            .json(&self.openai_body(instructions, prompt))
            .send()
            .await
            .context("openai request")?;

        let status = resp.status();
        if !status.is_success() {
            let txt = resp.text().await.unwrap_or_default();
            bail!("openai error: {status} {txt}");
        }

        let out: Resp = resp.json().await.context("parse openai response")?;
        Ok(out
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .unwrap_or_default())
    }

    async fn anthropic_complete(&self, instructions: &str, prompt: &str) -> Result<String> {
        #[derive(Deserialize)]
        struct Resp {
            content: Vec<ContentBlock>,
        }

        #[derive(Deserialize)]
        struct ContentBlock {
            #[serde(rename = "type")]
            t: String,
            text: Option<String>,
        }

        let mut headers = HeaderMap::new();
        headers.insert("x-api-key", HeaderValue::from_str(&self.api_key)?);
        headers.insert("anthropic-version", HeaderValue::from_static("2023-06-01"));
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let resp = self
            .client
            .post(ANTHROPIC_URL)
            .headers(headers)
            .json(&self.anthropic_body(instructions, prompt))
            .send()
            .await
            .context("anthropic request")?;

        let status = resp.status();
        if !status.is_success() {
            let txt = resp.text().await.unwrap_or_default();
            bail!("anthropic error: {status} {txt}");
        }

        let out: Resp = resp.json().await.context("parse anthropic response")?;
        let mut s = String::new();
        for b in out.content {
            if b.t == "text" {
                if let Some(t) = b.text {
                    s.push_str(&t);
                }
            }
        }
        Ok(s)
    }
}

#[async_trait]
impl TextGenerator for HttpGenerator {
    async fn generate(&self, instructions: &str, prompt: &str) -> cakeday_core::Result<String> {
        debug!(provider = ?self.provider, model = %self.model, "requesting birthday message");
        let result = match self.provider {
            Provider::Anthropic => self.anthropic_complete(instructions, prompt).await,
            Provider::OpenAI => self.openai_complete(instructions, prompt).await,
        };
        result
            .map(|s| s.trim().to_string())
            .map_err(|e| CakedayError::ComposerFailure(format!("{e:#}")))
    }
}

/// Which composer `send` runs with; decided once at startup.
pub enum ComposerChoice {
    Template,
    Remote(HttpGenerator),
}

impl ComposerChoice {
    /// `api_key` is the value of the provider's key variable, if set.
    pub fn select(llm: &LlmSection, api_key: Option<String>) -> Result<Self> {
        let provider = match llm.provider {
            ProviderKind::None => return Ok(ComposerChoice::Template),
            ProviderKind::Openai => Provider::OpenAI,
            ProviderKind::Anthropic => Provider::Anthropic,
        };
        match api_key.filter(|k| !k.trim().is_empty()) {
            Some(key) => Ok(ComposerChoice::Remote(HttpGenerator::new(
                provider,
                llm.model.clone(),
                llm.temperature,
                key,
            )?)),
            None => {
                warn!(
                    "{} is not set; composing from templates instead of {:?}",
                    provider.key_var(),
                    provider
                );
                Ok(ComposerChoice::Template)
            }
        }
    }

    pub fn from_env(llm: &LlmSection) -> Result<Self> {
        let var = match llm.provider {
            ProviderKind::None => return Ok(ComposerChoice::Template),
            ProviderKind::Openai => Provider::OpenAI.key_var(),
            ProviderKind::Anthropic => Provider::Anthropic.key_var(),
        };
        Self::select(llm, std::env::var(var).ok())
    }

    pub fn into_composer(self) -> Arc<dyn MessageComposer> {
        match self {
            ComposerChoice::Template => Arc::new(TemplateComposer),
            ComposerChoice::Remote(generator) => Arc::new(LlmComposer::new(generator)),
        }
    }
}
