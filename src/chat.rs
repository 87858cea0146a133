//! Chat orchestration and generation backends.
//!
//! A chat turn is: retrieve context → assemble a [`GenerationRequest`] →
//! call the [`Generator`] → on success, record the exchange in conversation
//! memory. A failed generation leaves memory untouched.
//!
//! # Providers
//!
//! | `generation.provider` | Backend |
//! |-----------------------|---------|
//! | `disabled` | [`DisabledGenerator`], every call fails |
//! | `openai` | [`OpenAiGenerator`], chat completions with retry |
//! | `echo` | [`EchoGenerator`], offline and deterministic |
//!
//! The OpenAI backend retries HTTP 429, 5xx, and network errors with
//! exponential backoff. Other 4xx responses fail immediately.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use persona_harness_core::models::{Role, Turn};
use persona_harness_core::retrieve::{ContextBundle, Retriever};
use persona_harness_core::seed::STYLE;
use persona_harness_core::{KnowledgeError, KnowledgeStore};
use serde::Serialize;
use tracing::{debug, info};

use crate::config::GenerationConfig;

/// Everything a backend needs to produce one reply.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GenerationRequest {
    pub system: String,
    pub history: Vec<Turn>,
    pub user: String,
}

#[async_trait]
pub trait Generator: Send + Sync {
    fn name(&self) -> &str;

    async fn generate(&self, request: &GenerationRequest) -> Result<String>;
}

pub struct DisabledGenerator;

#[async_trait]
impl Generator for DisabledGenerator {
    fn name(&self) -> &str {
        "disabled"
    }

    async fn generate(&self, _request: &GenerationRequest) -> Result<String> {
        bail!("generation disabled. Set [generation].provider in the config file")
    }
}

/// Replies with the prompt it was given. Useful offline.
pub struct EchoGenerator;

#[async_trait]
impl Generator for EchoGenerator {
    fn name(&self) -> &str {
        "echo"
    }

    async fn generate(&self, request: &GenerationRequest) -> Result<String> {
        Ok(format!("(echo) {}", request.user))
    }
}

/// Chat completions over the OpenAI HTTP API.
///
/// Requires the `OPENAI_API_KEY` environment variable.
pub struct OpenAiGenerator {
    config: GenerationConfig,
    api_key: String,
    client: reqwest::Client,
}

impl OpenAiGenerator {
    pub fn new(config: &GenerationConfig) -> Result<Self> {
        let api_key = std::env::var("OPENAI_API_KEY")
            .map_err(|_| anyhow!("OPENAI_API_KEY environment variable not set"))?;
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            config: config.clone(),
            api_key,
            client,
        })
    }

    fn request_body(&self, request: &GenerationRequest) -> serde_json::Value {
        let mut messages = vec![serde_json::json!({ "role": "system", "content": request.system })];
        for turn in &request.history {
            let role = match turn.role {
                Role::User => "user",
                Role::Assistant => "assistant",
            };
            messages.push(serde_json::json!({ "role": role, "content": turn.text }));
        }
        messages.push(serde_json::json!({ "role": "user", "content": request.user }));

        serde_json::json!({
            "model": self.config.model,
            "messages": messages,
            "temperature": self.config.temperature,
            "max_tokens": self.config.max_tokens,
        })
    }
}

#[async_trait]
impl Generator for OpenAiGenerator {
    fn name(&self) -> &str {
        "openai"
    }

    async fn generate(&self, request: &GenerationRequest) -> Result<String> {
        let url = format!("{}/chat/completions", self.config.base_url.trim_end_matches('/'));
        let body = self.request_body(request);
        let mut last_err = None;

        for attempt in 0..=self.config.max_retries {
            if attempt > 0 {
                // 1s, 2s, 4s, ... capped at 32s
                let delay = Duration::from_secs(1 << (attempt - 1).min(5));
                tokio::time::sleep(delay).await;
            }

            let resp = self
                .client
                .post(&url)
                .header("Authorization", format!("Bearer {}", self.api_key))
                .json(&body)
                .send()
                .await;

            match resp {
                Ok(response) => {
                    let status = response.status();
                    if status.is_success() {
                        let json: serde_json::Value = response.json().await?;
                        return parse_completion(&json);
                    }
                    let body_text = response.text().await.unwrap_or_default();
                    if status.as_u16() == 429 || status.is_server_error() {
                        last_err = Some(anyhow!("OpenAI API error {}: {}", status, body_text));
                        continue;
                    }
                    bail!("OpenAI API error {}: {}", status, body_text);
                }
                Err(e) => {
                    last_err = Some(e.into());
                    continue;
                }
            }
        }

        Err(last_err.unwrap_or_else(|| anyhow!("Generation failed after retries")))
    }
}

/// Extract `choices[0].message.content` from a chat completion.
fn parse_completion(json: &serde_json::Value) -> Result<String> {
    json.pointer("/choices/0/message/content")
        .and_then(|c| c.as_str())
        .map(|s| s.trim().to_string())
        .ok_or_else(|| anyhow!("Invalid OpenAI response: missing choices[0].message.content"))
}

/// Build the configured backend.
pub fn generator_from_config(config: &GenerationConfig) -> Result<Arc<dyn Generator>> {
    match config.provider.as_str() {
        "disabled" => Ok(Arc::new(DisabledGenerator)),
        "echo" => Ok(Arc::new(EchoGenerator)),
        "openai" => Ok(Arc::new(OpenAiGenerator::new(config)?)),
        other => bail!("Unknown generation provider: '{}'", other),
    }
}

/// Reply to one chat turn, with the context that grounded it.
#[derive(Debug, Clone, Serialize)]
pub struct ChatReply {
    pub reply: String,
    pub context: ContextBundle,
}

#[derive(Clone)]
pub struct ChatSession {
    store: Arc<KnowledgeStore>,
    retriever: Retriever,
    generator: Arc<dyn Generator>,
    persona_name: String,
}

impl ChatSession {
    pub fn new(
        store: Arc<KnowledgeStore>,
        retriever: Retriever,
        generator: Arc<dyn Generator>,
        persona_name: impl Into<String>,
    ) -> Self {
        Self {
            store,
            retriever,
            generator,
            persona_name: persona_name.into(),
        }
    }

    pub fn generator_name(&self) -> &str {
        self.generator.name()
    }

    /// Run one chat turn.
    ///
    /// The raw `message` and the reply are appended to memory only when
    /// generation succeeds.
    pub async fn chat(&self, message: &str, use_context: bool) -> Result<ChatReply> {
        let message = message.trim();
        if message.is_empty() {
            return Err(KnowledgeError::InvalidInput("message must not be empty".to_string()).into());
        }

        let context = if use_context {
            self.retriever.context_for(&self.store, message)
        } else {
            ContextBundle::default()
        };

        let request = GenerationRequest {
            system: self.system_prompt(),
            history: self.store.transcript(),
            user: user_prompt(message, &context),
        };
        debug!(
            context_items = context.len(),
            history = request.history.len(),
            "calling generator"
        );

        let reply = self.generator.generate(&request).await?;
        self.store
            .append_exchange(Turn::user(message), Turn::assistant(reply.clone()));
        info!(generator = self.generator.name(), "chat turn complete");

        Ok(ChatReply { reply, context })
    }

    /// Persona description: voice, vocabulary, and the stored concepts.
    pub fn system_prompt(&self) -> String {
        let mut prompt = format!(
            "You are {}, the investor, philanthropist, and philosopher. \
             Answer as {} would.\n\n",
            self.persona_name, self.persona_name
        );
        prompt.push_str("WRITING STYLE:\n");
        prompt.push_str(&format!("- Tone: {}\n", STYLE.tone));
        prompt.push_str(&format!(
            "- Vocabulary: use terms like {} and others\n",
            STYLE.vocabulary[..5.min(STYLE.vocabulary.len())].join(", ")
        ));
        prompt.push_str(&format!("- Sentence structure: {}\n", STYLE.sentence_structure));
        prompt.push_str(&format!("- Perspective: {}\n", STYLE.perspective));

        let concepts = self.store.concepts();
        if !concepts.is_empty() {
            prompt.push_str("\nKEY CONCEPTS:\n");
            for c in &concepts {
                prompt.push_str(&format!("- {}: {}\n", c.name, c.definition));
            }
        }
        prompt.push_str(
            "\nBe honest about the fallibility of human understanding and think \
             systemically and globally.",
        );
        prompt
    }
}

fn user_prompt(message: &str, context: &ContextBundle) -> String {
    if context.is_empty() {
        return message.to_string();
    }
    format!(
        "{}\nRespond to the user's question in your characteristic philosophical \
         and analytical style: {}",
        context.render(),
        message
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    struct Recording {
        seen: Mutex<Vec<GenerationRequest>>,
    }

    #[async_trait]
    impl Generator for Recording {
        fn name(&self) -> &str {
            "recording"
        }
        async fn generate(&self, request: &GenerationRequest) -> Result<String> {
            self.seen.lock().unwrap().push(request.clone());
            Ok("A considered answer.".to_string())
        }
    }

    fn session(generator: Arc<dyn Generator>) -> (Arc<KnowledgeStore>, ChatSession) {
        let store = Arc::new(KnowledgeStore::seeded(20));
        let chat = ChatSession::new(store.clone(), Retriever::default(), generator, "George Soros");
        (store, chat)
    }

    #[tokio::test]
    async fn successful_turn_appends_raw_exchange() {
        let recorder = Arc::new(Recording {
            seen: Mutex::new(Vec::new()),
        });
        let (store, chat) = session(recorder.clone());

        let reply = chat.chat("What is reflexivity?", true).await.unwrap();
        assert_eq!(reply.reply, "A considered answer.");
        assert_eq!(reply.context.concepts[0].name, "reflexivity");

        let transcript = store.transcript();
        assert_eq!(transcript.len(), 2);
        assert_eq!(transcript[0].text, "What is reflexivity?");
        assert_eq!(transcript[1].role, Role::Assistant);

        let seen = recorder.seen.lock().unwrap();
        assert!(seen[0].user.contains("Relevant concepts:"));
        assert!(seen[0].user.ends_with("What is reflexivity?"));
        assert!(seen[0].system.contains("George Soros"));
        assert!(seen[0].history.is_empty());
    }

    #[tokio::test]
    async fn history_is_passed_on_later_turns() {
        let recorder = Arc::new(Recording {
            seen: Mutex::new(Vec::new()),
        });
        let (_store, chat) = session(recorder.clone());
        chat.chat("first question", false).await.unwrap();
        chat.chat("second question", false).await.unwrap();
        let seen = recorder.seen.lock().unwrap();
        assert_eq!(seen[1].history.len(), 2);
        assert_eq!(seen[1].user, "second question");
    }

    #[tokio::test]
    async fn failed_generation_appends_nothing() {
        let (store, chat) = session(Arc::new(DisabledGenerator));
        assert!(chat.chat("hello there", true).await.is_err());
        assert!(store.transcript().is_empty());
    }

    #[tokio::test]
    async fn blank_message_rejected() {
        let (_store, chat) = session(Arc::new(EchoGenerator));
        let err = chat.chat("   ", true).await.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<KnowledgeError>(),
            Some(KnowledgeError::InvalidInput(_))
        ));
    }

    #[test]
    fn completion_parsing() {
        let json = serde_json::json!({
            "choices": [{ "message": { "role": "assistant", "content": " Markets are fallible. " } }]
        });
        assert_eq!(parse_completion(&json).unwrap(), "Markets are fallible.");
        assert!(parse_completion(&serde_json::json!({ "choices": [] })).is_err());
    }

    #[test]
    fn unknown_provider_rejected() {
        let config = GenerationConfig {
            provider: "mystery".to_string(),
            ..GenerationConfig::default()
        };
        assert!(generator_from_config(&config).is_err());
    }
}
