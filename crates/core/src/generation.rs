use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use std::collections::HashSet;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

use crate::error::ChatError;
use crate::models::{Answer, Candidate, Source};

pub const DEFAULT_GEN_MODEL: &str = "gpt-4o-mini";
pub const DEFAULT_GEN_TIMEOUT: Duration = Duration::from_secs(60);

/// Returned without consulting the oracle when retrieval produced no
/// acceptable context.
pub const NO_CONTEXT_ANSWER: &str =
    "I couldn't find any relevant information in the uploaded documents for this workspace.";

const SYSTEM_PROMPT: &str = "\
You are a helpful assistant for a proprietary document system.
Your goal is to answer the user's question based ONLY on the provided Context.

RULES:
1. Use the provided Context to answer.
2. If the answer is not in the Context, say \"I couldn't find information about this in the documents.\"
3. Do NOT invent information.
4. Always cite your sources when possible.
5. Format the output as JSON with \"answer\" and \"sources\" keys.
   - \"sources\" should be an array of objects: { documentName: string, page: number, quote: string }.
   - Pick the most relevant quote for the source.
";

#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("generation request failed: {0}")]
    Failed(String),

    #[error("generation request timed out after {0:?}")]
    Timeout(Duration),
}

impl From<GenerationError> for ChatError {
    fn from(error: GenerationError) -> Self {
        match error {
            GenerationError::Failed(details) => ChatError::GenerationFailed(details),
            GenerationError::Timeout(after) => ChatError::GenerationTimeout(after),
        }
    }
}

/// The generation oracle: opaque beyond its call contract. Implementations
/// must run in a maximally deterministic mode, since citations are
/// safety-relevant and re-runs should be reproducible.
#[async_trait]
pub trait GenerationBackend: Send + Sync {
    async fn complete(&self, system: &str, user: &str) -> Result<String, GenerationError>;
}

/// Client for an OpenAI-compatible chat completions endpoint, invoked at
/// zero temperature with JSON output enforced.
pub struct OpenAiGenerator {
    client: Client,
    base_url: String,
    api_key: Option<String>,
    model: String,
    timeout: Duration,
}

impl OpenAiGenerator {
    pub fn new(
        base_url: impl Into<String>,
        api_key: Option<String>,
        model: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, GenerationError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|error| GenerationError::Failed(error.to_string()))?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key,
            model: model.into(),
            timeout,
        })
    }
}

#[derive(Debug, Deserialize)]
struct CompletionResponse {
    choices: Vec<CompletionChoice>,
}

#[derive(Debug, Deserialize)]
struct CompletionChoice {
    message: CompletionMessage,
}

#[derive(Debug, Deserialize)]
struct CompletionMessage {
    content: Option<String>,
}

#[async_trait]
impl GenerationBackend for OpenAiGenerator {
    async fn complete(&self, system: &str, user: &str) -> Result<String, GenerationError> {
        let mut request = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .json(&json!({
                "model": self.model,
                "messages": [
                    { "role": "system", "content": system },
                    { "role": "user", "content": user },
                ],
                "response_format": { "type": "json_object" },
                "temperature": 0,
            }));

        if let Some(api_key) = &self.api_key {
            request = request.bearer_auth(api_key);
        }

        let response = request.send().await.map_err(|error| {
            if error.is_timeout() {
                GenerationError::Timeout(self.timeout)
            } else {
                GenerationError::Failed(error.to_string())
            }
        })?;

        if !response.status().is_success() {
            return Err(GenerationError::Failed(format!(
                "generation endpoint returned {}",
                response.status()
            )));
        }

        let payload: CompletionResponse = response
            .json()
            .await
            .map_err(|error| GenerationError::Failed(error.to_string()))?;

        payload
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| GenerationError::Failed("completion had no content".to_string()))
    }
}

/// The oracle's reply, parsed strictly before anything is returned to the
/// caller. Duck-typed passthrough of the reply is exactly the failure mode
/// this boundary exists to prevent.
#[derive(Debug, Deserialize)]
struct OracleReply {
    answer: String,
    sources: Vec<Source>,
}

/// Assembles a grounded prompt from ranked passages and validates the
/// oracle's structured reply against the supplied context.
pub struct AnswerGenerator<G> {
    backend: G,
}

impl<G: GenerationBackend> AnswerGenerator<G> {
    pub fn new(backend: G) -> Self {
        Self { backend }
    }

    pub async fn generate(
        &self,
        query: &str,
        candidates: &[Candidate],
    ) -> Result<Answer, ChatError> {
        if candidates.is_empty() {
            // No context: answering from nothing is exactly how oracles
            // invent sources, so the call is skipped outright.
            debug!("no candidates above threshold; skipping generation");
            return Ok(Answer {
                text: NO_CONTEXT_ANSWER.to_string(),
                sources: Vec::new(),
            });
        }

        let context = candidates
            .iter()
            .map(|candidate| {
                format!(
                    "[Document: {}, Page: {}]\n{}",
                    candidate.document_name, candidate.page, candidate.text
                )
            })
            .collect::<Vec<_>>()
            .join("\n\n---\n\n");

        let user_prompt = format!("Question: {query}\n\nContext:\n{context}");

        let reply = self.backend.complete(SYSTEM_PROMPT, &user_prompt).await?;
        let parsed: OracleReply = serde_json::from_str(&reply).map_err(|error| {
            ChatError::GenerationContractViolation(format!("unparseable reply: {error}"))
        })?;

        let known_documents: HashSet<&str> = candidates
            .iter()
            .map(|candidate| candidate.document_name.as_str())
            .collect();

        for source in &parsed.sources {
            if !known_documents.contains(source.document_name.as_str()) {
                return Err(ChatError::GenerationContractViolation(format!(
                    "cited document was not in the supplied context: {}",
                    source.document_name
                )));
            }
            if source.quote.trim().is_empty() {
                return Err(ChatError::GenerationContractViolation(
                    "citation with empty quote".to_string(),
                ));
            }
        }

        Ok(Answer {
            text: parsed.answer,
            sources: parsed.sources,
        })
    }
}
