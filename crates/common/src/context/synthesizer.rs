//! Answer Synthesizer - turns an evidence span into a short answer
//!
//! Provides:
//! - Definition answers taken verbatim from the evidence
//! - Evidence-grounded generation through a chat completions service
//! - Truncated-evidence fallback when generation fails or times out

use super::query_parser::{Language, QueryAnalysis, QuestionType};
use crate::config::GenerationConfig;
use crate::errors::{AppError, Result};
use crate::metrics;
use crate::models::{EvidenceSpan, NOT_FOUND_ANSWER};
use crate::text;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;

/// Characters of evidence kept by the fallback answer
const FALLBACK_ANSWER_CHARS: usize = 100;

const SYSTEM_INSTRUCTION_JA: &str = "あなたは検索された根拠情報だけを使って質問に答えるアシスタントです。\
回答は必ず日本語で書き、1〜2文で簡潔にまとめてください。\
根拠情報に書かれていないことは答えないでください。";

const SYSTEM_INSTRUCTION_EN: &str = "You answer questions using only the retrieved evidence. \
Reply in English in one or two sentences. \
Do not state anything the evidence does not support.";

/// Failure of one completion call
#[derive(Error, Debug)]
pub enum GenerationError {
    #[error("completion timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    #[error("completion request failed: {0}")]
    Request(String),

    #[error("completion service returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("malformed completion response: {0}")]
    Malformed(String),

    #[error("completion was empty")]
    Empty,

    #[error("generation is disabled")]
    Disabled,
}

/// A text completion service
#[async_trait]
pub trait Generator: Send + Sync {
    /// Complete `user_prompt` under `system_instruction`, limited to
    /// `max_output_tokens`
    async fn complete(
        &self,
        system_instruction: &str,
        user_prompt: &str,
        max_output_tokens: u32,
    ) -> std::result::Result<String, GenerationError>;

    fn model_name(&self) -> &str;
}

/// LLM client configuration
#[derive(Debug, Clone)]
pub struct LLMConfig {
    /// API endpoint
    pub endpoint: String,

    /// API key
    pub api_key: String,

    /// Model name
    pub model: String,

    /// Timeout in seconds
    pub timeout_secs: u64,

    pub temperature: f32,
}

impl From<&GenerationConfig> for LLMConfig {
    fn from(config: &GenerationConfig) -> Self {
        Self {
            endpoint: config.endpoint.clone(),
            api_key: config.api_key.clone().unwrap_or_default(),
            model: config.model.clone(),
            timeout_secs: config.timeout_secs,
            temperature: config.temperature,
        }
    }
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    max_tokens: u32,
    temperature: f32,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatMessageResponse,
}

#[derive(Deserialize)]
struct ChatMessageResponse {
    content: Option<String>,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

/// OpenAI-compatible chat completions client
pub struct ChatCompletionGenerator {
    config: LLMConfig,
    client: reqwest::Client,
}

impl ChatCompletionGenerator {
    pub fn new(config: LLMConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| AppError::Internal {
                message: format!("Failed to create HTTP client: {}", e),
            })?;

        Ok(Self { config, client })
    }
}

#[async_trait]
impl Generator for ChatCompletionGenerator {
    async fn complete(
        &self,
        system_instruction: &str,
        user_prompt: &str,
        max_output_tokens: u32,
    ) -> std::result::Result<String, GenerationError> {
        let request = ChatRequest {
            model: &self.config.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: system_instruction,
                },
                ChatMessage {
                    role: "user",
                    content: user_prompt,
                },
            ],
            max_tokens: max_output_tokens,
            temperature: self.config.temperature,
        };

        let response = self
            .client
            .post(&self.config.endpoint)
            .bearer_auth(&self.config.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    GenerationError::Timeout {
                        timeout_ms: self.config.timeout_secs * 1000,
                    }
                } else {
                    GenerationError::Request(e.to_string())
                }
            })?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(GenerationError::Status { status, body });
        }

        let chat_response: ChatResponse = response
            .json()
            .await
            .map_err(|e| GenerationError::Malformed(e.to_string()))?;

        chat_response
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or(GenerationError::Empty)
    }

    fn model_name(&self) -> &str {
        &self.config.model
    }
}

/// Generator used when no completion service is configured; every
/// non-definition answer takes the fallback path
pub struct DisabledGenerator;

#[async_trait]
impl Generator for DisabledGenerator {
    async fn complete(&self, _: &str, _: &str, _: u32) -> std::result::Result<String, GenerationError> {
        Err(GenerationError::Disabled)
    }

    fn model_name(&self) -> &str {
        "disabled"
    }
}

/// Create a generator based on configuration
pub fn create_generator(config: &GenerationConfig) -> Result<Arc<dyn Generator>> {
    match config.provider.as_str() {
        "openai" => {
            if config.api_key.as_deref().map_or(true, str::is_empty) {
                return Err(AppError::Configuration {
                    message: "generation.api_key (or OPENAI_API_KEY) is required for the openai provider"
                        .to_string(),
                });
            }
            Ok(Arc::new(ChatCompletionGenerator::new(LLMConfig::from(config))?))
        }
        "disabled" | "none" => {
            tracing::warn!("Answer generation disabled, non-definition answers use evidence excerpts");
            Ok(Arc::new(DisabledGenerator))
        }
        other => Err(AppError::Configuration {
            message: format!("unknown generation provider '{}'", other),
        }),
    }
}

/// Which rule produced an answer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnswerPath {
    Definition,
    Generated,
    Fallback,
    NotFound,
}

impl AnswerPath {
    pub fn as_str(&self) -> &'static str {
        match self {
            AnswerPath::Definition => "definition",
            AnswerPath::Generated => "generated",
            AnswerPath::Fallback => "fallback",
            AnswerPath::NotFound => "not_found",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComposedAnswer {
    pub text: String,
    pub path: AnswerPath,
}

/// Composes the final answer from an evidence span
pub struct AnswerComposer {
    generator: Arc<dyn Generator>,
    max_tokens: u32,
    timeout: Duration,
}

impl AnswerComposer {
    pub fn new(generator: Arc<dyn Generator>, max_tokens: u32, timeout: Duration) -> Self {
        Self {
            generator,
            max_tokens,
            timeout,
        }
    }

    pub fn model_name(&self) -> &str {
        self.generator.model_name()
    }

    /// Compose an answer for `query` from `evidence`. Never fails.
    pub async fn compose(&self, evidence: &EvidenceSpan, query: &str) -> String {
        self.compose_analyzed(evidence, &QueryAnalysis::from_query(query))
            .await
            .text
    }

    pub async fn compose_analyzed(&self, evidence: &EvidenceSpan, analysis: &QueryAnalysis) -> ComposedAnswer {
        let answer = if evidence.text.trim().is_empty() {
            ComposedAnswer {
                text: NOT_FOUND_ANSWER.to_string(),
                path: AnswerPath::NotFound,
            }
        } else if analysis.question_type == QuestionType::Definition {
            ComposedAnswer {
                text: definition_answer(&evidence.text, analysis.language),
                path: AnswerPath::Definition,
            }
        } else {
            self.generate(evidence, analysis).await
        };

        metrics::record_answer(answer.path.as_str());
        answer
    }

    async fn generate(&self, evidence: &EvidenceSpan, analysis: &QueryAnalysis) -> ComposedAnswer {
        let (system_instruction, user_prompt) = build_prompt(&evidence.text, analysis);
        let start = Instant::now();

        let outcome = match tokio::time::timeout(
            self.timeout,
            self.generator.complete(system_instruction, &user_prompt, self.max_tokens),
        )
        .await
        {
            Ok(Ok(reply)) if reply.trim().is_empty() => Err(GenerationError::Empty),
            Ok(Ok(reply)) => Ok(reply.trim().to_string()),
            Ok(Err(e)) => Err(e),
            Err(_) => Err(GenerationError::Timeout {
                timeout_ms: self.timeout.as_millis() as u64,
            }),
        };

        let elapsed = start.elapsed().as_secs_f64();
        match outcome {
            Ok(text) => {
                metrics::record_generation(elapsed, self.generator.model_name(), true);
                ComposedAnswer {
                    text,
                    path: AnswerPath::Generated,
                }
            }
            Err(e) => {
                metrics::record_generation(elapsed, self.generator.model_name(), false);
                if !matches!(e, GenerationError::Disabled) {
                    tracing::warn!(
                        error = %e,
                        model = self.generator.model_name(),
                        "Answer generation failed, falling back to evidence excerpt"
                    );
                }
                ComposedAnswer {
                    text: fallback_answer(&evidence.text),
                    path: AnswerPath::Fallback,
                }
            }
        }
    }
}

/// First sentence of the evidence, terminated in the query's language
fn definition_answer(evidence: &str, language: Language) -> String {
    let first = text::split_sentences(evidence)
        .first()
        .map(|s| s.text.to_string())
        .unwrap_or_else(|| evidence.trim().to_string());

    if text::ends_with_terminator(&first) {
        first
    } else {
        format!("{}{}", first, language.full_stop())
    }
}

fn fallback_answer(evidence: &str) -> String {
    if text::char_len(evidence) > FALLBACK_ANSWER_CHARS {
        format!("{}...", text::char_slice(evidence, 0, FALLBACK_ANSWER_CHARS))
    } else {
        evidence.to_string()
    }
}

fn build_prompt(evidence: &str, analysis: &QueryAnalysis) -> (&'static str, String) {
    match analysis.language {
        Language::Japanese => (
            SYSTEM_INSTRUCTION_JA,
            format!(
                "根拠情報:\n{}\n\n質問: {}\n\n日本語で簡潔に回答してください。",
                evidence, analysis.text
            ),
        ),
        Language::English => (
            SYSTEM_INSTRUCTION_EN,
            format!(
                "Evidence:\n{}\n\nQuestion: {}\n\nAnswer concisely in English.",
                evidence, analysis.text
            ),
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    struct StaticGenerator {
        reply: String,
        prompts: Mutex<Vec<(String, String)>>,
    }

    impl StaticGenerator {
        fn new(reply: &str) -> Self {
            Self {
                reply: reply.to_string(),
                prompts: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl Generator for StaticGenerator {
        async fn complete(
            &self,
            system_instruction: &str,
            user_prompt: &str,
            _max_output_tokens: u32,
        ) -> std::result::Result<String, GenerationError> {
            self.prompts
                .lock()
                .unwrap()
                .push((system_instruction.to_string(), user_prompt.to_string()));
            Ok(self.reply.clone())
        }

        fn model_name(&self) -> &str {
            "static"
        }
    }

    struct FailingGenerator;

    #[async_trait]
    impl Generator for FailingGenerator {
        async fn complete(&self, _: &str, _: &str, _: u32) -> std::result::Result<String, GenerationError> {
            Err(GenerationError::Status {
                status: 503,
                body: "overloaded".to_string(),
            })
        }

        fn model_name(&self) -> &str {
            "failing"
        }
    }

    struct SlowGenerator;

    #[async_trait]
    impl Generator for SlowGenerator {
        async fn complete(&self, _: &str, _: &str, _: u32) -> std::result::Result<String, GenerationError> {
            tokio::time::sleep(Duration::from_secs(1)).await;
            Ok("遅すぎる回答".to_string())
        }

        fn model_name(&self) -> &str {
            "slow"
        }
    }

    fn composer(generator: Arc<dyn Generator>) -> AnswerComposer {
        AnswerComposer::new(generator, 150, Duration::from_secs(5))
    }

    fn span(text: &str) -> EvidenceSpan {
        EvidenceSpan::from_source(text, 0, text::char_len(text))
    }

    #[tokio::test]
    async fn test_definition_uses_evidence_without_generation() {
        let generator = Arc::new(StaticGenerator::new("使われないはず"));
        let composer = composer(generator.clone());
        let evidence = span("コンバインは、一台で穀物の収穫・脱穀・選別をする自走機能を有した農業機械です。");

        let answer = composer.compose_analyzed(&evidence, &QueryAnalysis::from_query("コンバインとは何ですか")).await;
        assert_eq!(answer.path, AnswerPath::Definition);
        assert_eq!(answer.text, evidence.text);
        assert!(generator.prompts.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_definition_appends_full_stop() {
        let composer = composer(Arc::new(DisabledGenerator));
        let answer = composer.compose(&span("コンバインは農業機械"), "コンバインとは").await;
        assert_eq!(answer, "コンバインは農業機械。");

        let answer = composer.compose(&span("A combine is a harvester"), "What is a combine?").await;
        assert_eq!(answer, "A combine is a harvester.");
    }

    #[tokio::test]
    async fn test_generated_answer_is_trimmed_and_prompt_is_japanese() {
        let generator = Arc::new(StaticGenerator::new("  普通型と自立型の2種類です。 \n"));
        let composer = composer(generator.clone());
        let evidence = span("日本で使われているコンバインは普通型と自立型の2種類に大別されます。");

        let answer = composer
            .compose_analyzed(&evidence, &QueryAnalysis::from_query("コンバインは何種類に大別されますか"))
            .await;
        assert_eq!(answer.path, AnswerPath::Generated);
        assert_eq!(answer.text, "普通型と自立型の2種類です。");

        let prompts = generator.prompts.lock().unwrap();
        let (system, user) = &prompts[0];
        assert!(system.contains("日本語"));
        assert!(user.contains(&evidence.text));
        assert!(user.contains("コンバインは何種類に大別されますか"));
    }

    #[tokio::test]
    async fn test_english_prompt() {
        let generator = Arc::new(StaticGenerator::new("Rice and wheat."));
        let composer = composer(generator.clone());
        composer
            .compose(&span("It handles rice, wheat and soybeans."), "Which crops does it handle?")
            .await;

        let prompts = generator.prompts.lock().unwrap();
        assert!(prompts[0].0.contains("English"));
        assert!(prompts[0].1.starts_with("Evidence:"));
    }

    #[tokio::test]
    async fn test_failure_falls_back_to_truncated_evidence() {
        let composer = composer(Arc::new(FailingGenerator));
        let long = "稲".repeat(150);
        let answer = composer.compose_analyzed(&span(&long), &QueryAnalysis::from_query("稲について")).await;
        assert_eq!(answer.path, AnswerPath::Fallback);
        assert_eq!(answer.text, format!("{}...", "稲".repeat(100)));

        let short = composer.compose(&span("稲を収穫する。"), "稲の収穫").await;
        assert_eq!(short, "稲を収穫する。");
    }

    #[tokio::test]
    async fn test_timeout_falls_back() {
        let composer = AnswerComposer::new(Arc::new(SlowGenerator), 150, Duration::from_millis(10));
        let answer = composer
            .compose_analyzed(&span("普通型は汎用性の農業機械です。"), &QueryAnalysis::from_query("普通型の特徴"))
            .await;
        assert_eq!(answer.path, AnswerPath::Fallback);
        assert_eq!(answer.text, "普通型は汎用性の農業機械です。");
    }

    #[tokio::test]
    async fn test_empty_reply_falls_back() {
        let composer = composer(Arc::new(StaticGenerator::new("   ")));
        let answer = composer
            .compose_analyzed(&span("自立型は日本独自の農業機械です。"), &QueryAnalysis::from_query("自立型の用途"))
            .await;
        assert_eq!(answer.path, AnswerPath::Fallback);
    }

    #[tokio::test]
    async fn test_empty_evidence_reports_not_found() {
        let composer = composer(Arc::new(DisabledGenerator));
        let answer = composer.compose(&EvidenceSpan::empty(), "コンバインとは何ですか").await;
        assert_eq!(answer, NOT_FOUND_ANSWER);
    }

    #[test]
    fn test_create_generator() {
        let mut config = GenerationConfig::default();
        config.api_key = None;
        assert!(matches!(create_generator(&config), Err(AppError::Configuration { .. })));

        config.provider = "disabled".to_string();
        assert_eq!(create_generator(&config).unwrap().model_name(), "disabled");

        config.provider = "openai".to_string();
        config.api_key = Some("sk-test".to_string());
        assert_eq!(create_generator(&config).unwrap().model_name(), "gpt-4o-mini");

        config.provider = "mystery".to_string();
        assert!(create_generator(&config).is_err());
    }
}
