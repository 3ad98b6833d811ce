//! Answer synthesis over retrieved records.
//!
//! `AnswerSynthesizer` is the capability the workflow depends on.
//! `OpenAiSynthesizer` implements it against an OpenAI-compatible
//! Chat Completions endpoint in JSON mode.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio_retry::strategy::{jitter, ExponentialBackoff};
use tokio_retry::RetryIf;

use crate::config::SynthesisSettings;
use crate::embeddings::OpenAiErrorResponse;
use crate::models::{SearchHit, SynthesizedAnswer};

const SYSTEM_PROMPT: &str = r#"# Role and Purpose
You are an assistant helping a hiring team judge candidate suitability. Each retrieved record combines a job description, a candidate resume, interview questions and answers, and the recorded acceptance decision. Synthesize a clear, helpful answer to the user's question using only those records.

# Guidelines
1. Answer the question directly and concisely.
2. Use only information from the retrieved records. Do not invent qualifications, dates or outcomes.
3. If the records do not contain enough information to answer, say so and set enough_context to false.
4. Keep a neutral, professional tone.

# Output
Respond with a single JSON object with these keys:
- "thought_process": an array of short strings describing how you reached the answer
- "answer": the answer text, plain prose without markdown
- "enough_context": true if the records were sufficient, otherwise false"#;

#[async_trait]
pub trait AnswerSynthesizer: Send + Sync {
    async fn synthesize(
        &self,
        question: &str,
        context: &[SearchHit],
    ) -> Result<SynthesizedAnswer, SynthesisError>;

    fn name(&self) -> &str;
}

#[derive(Error, Debug)]
pub enum SynthesisError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error ({code}): {message}")]
    Api { code: u16, message: String },

    #[error("Model returned empty content")]
    EmptyContent,

    #[error("Could not parse model output: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Missing API key")]
    MissingApiKey,

    #[error("All {attempts} attempts failed")]
    RetryExhausted { attempts: usize },
}

impl SynthesisError {
    fn is_retryable(&self) -> bool {
        match self {
            SynthesisError::Http(_) => true,
            SynthesisError::Api { code, .. } => *code == 429 || *code >= 500,
            _ => false,
        }
    }
}

#[derive(Debug, Clone)]
pub struct SynthesizerConfig {
    pub api_key: String,
    pub base_url: String,
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
    pub max_retries: usize,
    pub retry_delay_ms: u64,
}

impl From<&SynthesisSettings> for SynthesizerConfig {
    fn from(settings: &SynthesisSettings) -> Self {
        Self {
            api_key: std::env::var("OPENAI_API_KEY").unwrap_or_default(),
            base_url: settings.base_url.clone(),
            model: settings.model.clone(),
            temperature: settings.temperature,
            max_tokens: settings.max_tokens,
            max_retries: settings.max_retries,
            retry_delay_ms: settings.retry_delay_ms,
        }
    }
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage>,
    temperature: f32,
    max_tokens: u32,
    response_format: ResponseFormat,
}

#[derive(Debug, Serialize)]
struct ChatMessage {
    role: &'static str,
    content: String,
}

#[derive(Debug, Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChatChoiceMessage {
    content: Option<String>,
}

/// Only `content` and `category` of each hit are shown to the model.
#[derive(Debug, Serialize)]
struct ContextEntry<'a> {
    content: &'a str,
    category: &'a str,
}

pub fn render_context(context: &[SearchHit]) -> Result<String, serde_json::Error> {
    let entries: Vec<ContextEntry<'_>> = context
        .iter()
        .map(|hit| ContextEntry {
            content: &hit.content,
            category: &hit.metadata.category,
        })
        .collect();
    serde_json::to_string_pretty(&entries)
}

#[derive(Debug, Clone)]
pub struct OpenAiSynthesizer {
    client: Client,
    config: SynthesizerConfig,
}

impl OpenAiSynthesizer {
    pub fn new(mut config: SynthesizerConfig) -> Result<Self, SynthesisError> {
        if config.api_key.is_empty() {
            return Err(SynthesisError::MissingApiKey);
        }
        config.base_url = config.base_url.trim_end_matches('/').to_string();

        let client = Client::builder()
            .timeout(Duration::from_secs(120))
            .build()?;

        Ok(Self { client, config })
    }

    fn build_messages(&self, question: &str, context_json: String) -> Vec<ChatMessage> {
        vec![
            ChatMessage {
                role: "system",
                content: SYSTEM_PROMPT.to_string(),
            },
            ChatMessage {
                role: "user",
                content: format!("# User question:\n{}", question),
            },
            ChatMessage {
                role: "assistant",
                content: format!("# Retrieved information:\n{}", context_json),
            },
        ]
    }

    async fn complete_once(&self, request: &ChatRequest<'_>) -> Result<String, SynthesisError> {
        let url = format!("{}/chat/completions", self.config.base_url);

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.config.api_key)
            .json(request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<OpenAiErrorResponse>(&body)
                .ok()
                .and_then(|e| e.error)
                .map(|e| e.message)
                .unwrap_or(body);
            tracing::warn!(code = status.as_u16(), message = %message, "Chat completion API error");
            return Err(SynthesisError::Api {
                code: status.as_u16(),
                message,
            });
        }

        let body: ChatResponse = response.json().await?;
        body.choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .filter(|c| !c.trim().is_empty())
            .ok_or(SynthesisError::EmptyContent)
    }
}

#[async_trait]
impl AnswerSynthesizer for OpenAiSynthesizer {
    async fn synthesize(
        &self,
        question: &str,
        context: &[SearchHit],
    ) -> Result<SynthesizedAnswer, SynthesisError> {
        let request = ChatRequest {
            model: &self.config.model,
            messages: self.build_messages(question, render_context(context)?),
            temperature: self.config.temperature,
            max_tokens: self.config.max_tokens,
            response_format: ResponseFormat {
                kind: "json_object",
            },
        };

        let retry_strategy = ExponentialBackoff::from_millis(self.config.retry_delay_ms)
            .max_delay(Duration::from_secs(10))
            .map(jitter)
            .take(self.config.max_retries);

        let content = match RetryIf::spawn(
            retry_strategy,
            || self.complete_once(&request),
            SynthesisError::is_retryable,
        )
        .await
        {
            Ok(c) => c,
            Err(e) if e.is_retryable() => {
                let attempts = self.config.max_retries + 1;
                tracing::error!(attempts, error = %e, "All synthesis retry attempts failed");
                return Err(SynthesisError::RetryExhausted { attempts });
            }
            Err(e) => return Err(e),
        };

        let answer: SynthesizedAnswer = serde_json::from_str(&content)?;
        tracing::debug!(
            enough_context = answer.enough_context,
            steps = answer.thought_process.len(),
            "Synthesized answer"
        );
        Ok(answer)
    }

    fn name(&self) -> &str {
        "openai-chat"
    }
}
