//! Natural-language interpretation
//!
//! Steps ask an [`Interpreter`] to classify or extract structured data from
//! a chat message. Every call reports the tokens it consumed so the
//! orchestrator can charge them against the sender's budget.

pub mod gemini;
pub mod prompts;

use std::collections::VecDeque;
use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;
use serde_json::Value;

use crate::utils::errors::{BillyError, Result};

pub use gemini::GeminiClient;

/// One interpretation call
#[derive(Debug, Clone, PartialEq)]
pub struct InferenceRequest {
    pub prompt_parts: Vec<String>,
    /// JSON schema for structured answers; `None` asks for plain text
    pub schema: Option<Value>,
    pub max_tokens: u32,
    pub temperature: f32,
}

impl InferenceRequest {
    pub fn new(prompt_parts: Vec<String>) -> Self {
        Self {
            prompt_parts,
            schema: None,
            max_tokens: 100,
            temperature: 0.0,
        }
    }

    pub fn with_schema(mut self, schema: Value) -> Self {
        self.schema = Some(schema);
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }
}

/// Answer plus the tokens it cost. `content` is a JSON string for plain text requests.
#[derive(Debug, Clone, PartialEq)]
pub struct Inference {
    pub tokens: u64,
    pub content: Value,
}

#[async_trait]
pub trait Interpreter: Send + Sync {
    async fn infer(&self, request: InferenceRequest) -> Result<Inference>;
}

#[derive(Debug)]
enum Scripted {
    Answer(Inference),
    Failure(String),
}

/// Replays queued answers in order and records every request.
///
/// Runs out with an interpretation error once the script is exhausted.
#[derive(Debug, Default)]
pub struct ScriptedInterpreter {
    script: Mutex<VecDeque<Scripted>>,
    requests: Mutex<Vec<InferenceRequest>>,
}

impl ScriptedInterpreter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_json(&self, tokens: u64, content: Value) -> &Self {
        self.push(Scripted::Answer(Inference { tokens, content }))
    }

    pub fn push_text(&self, tokens: u64, text: &str) -> &Self {
        self.push_json(tokens, Value::String(text.to_string()))
    }

    pub fn push_failure(&self, reason: &str) -> &Self {
        self.push(Scripted::Failure(reason.to_string()))
    }

    fn push(&self, entry: Scripted) -> &Self {
        self.script
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push_back(entry);
        self
    }

    /// Requests received so far
    pub fn requests(&self) -> Vec<InferenceRequest> {
        self.requests.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Answers not consumed yet
    pub fn remaining(&self) -> usize {
        self.script.lock().unwrap_or_else(PoisonError::into_inner).len()
    }
}

#[async_trait]
impl Interpreter for ScriptedInterpreter {
    async fn infer(&self, request: InferenceRequest) -> Result<Inference> {
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(request);

        let next = self
            .script
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front();

        match next {
            Some(Scripted::Answer(inference)) => Ok(inference),
            Some(Scripted::Failure(reason)) => Err(BillyError::Interpretation(reason)),
            None => Err(BillyError::Interpretation("No scripted answer left".to_string())),
        }
    }
}
