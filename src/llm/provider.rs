use async_trait::async_trait;
use futures::stream::{self, BoxStream};
use futures::StreamExt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};

use crate::config::LLMConfig;
use crate::types::{AppError, AppResult, LLMMessage, LLMProvider, LLMRequest};

/// Raw text fragments from a provider, in generation order
pub type TokenStream = BoxStream<'static, AppResult<String>>;

/// Answer fragments as sent to the client. Failures have already been
/// folded into a readable fragment.
pub type AnswerStream = BoxStream<'static, String>;

pub const GENERATION_ERROR_MESSAGE: &str = "Error: Could not get a response from the model.";

const SYSTEM_PROMPT: &str = "You are an assistant for question-answering tasks.
Use the following pieces of retrieved context to answer the question.
If you don't know the answer, just say that you don't know.
Provide a concise answer.

Context:
{context}";

#[async_trait]
pub trait LLMAdapter: Send + Sync {
    async fn create_chat_completion_stream(&self, request: &LLMRequest) -> AppResult<TokenStream>;

    fn name(&self) -> &str;
}

pub fn build_adapter(config: &LLMConfig) -> Box<dyn LLMAdapter> {
    use crate::llm::google::GoogleAdapter;
    use crate::llm::openai::OpenAIAdapter;

    match (config.provider, config.base_url.as_deref()) {
        (LLMProvider::Google, None) => Box::new(GoogleAdapter::new(&config.api_key)),
        (LLMProvider::Google, Some(url)) => {
            Box::new(GoogleAdapter::with_base_url(&config.api_key, url))
        }
        (LLMProvider::OpenAI, None) => Box::new(OpenAIAdapter::new(&config.api_key)),
        (LLMProvider::OpenRouter, None) => Box::new(OpenAIAdapter::openrouter(&config.api_key)),
        (provider, Some(url)) => Box::new(OpenAIAdapter::with_base_url(
            &config.api_key,
            url,
            &provider.to_string(),
        )),
    }
}

/// Produces a streamed answer to a question, grounded in the given context.
#[async_trait]
pub trait AnswerGenerator: Send + Sync {
    async fn generate(&self, context: &str, question: &str) -> AnswerStream;
}

pub struct LlmAnswerGenerator {
    adapter: Arc<dyn LLMAdapter>,
    model: String,
    temperature: f32,
    timeout: Duration,
}

impl LlmAnswerGenerator {
    pub fn new(adapter: Arc<dyn LLMAdapter>, config: &LLMConfig, timeout: Duration) -> Self {
        Self {
            adapter,
            model: config.model.clone(),
            temperature: config.temperature,
            timeout,
        }
    }

    pub fn build_request(&self, context: &str, question: &str) -> LLMRequest {
        LLMRequest {
            model: self.model.clone(),
            messages: vec![LLMMessage::user(question)],
            temperature: Some(self.temperature),
            system_instruction: Some(SYSTEM_PROMPT.replace("{context}", context)),
        }
    }
}

#[async_trait]
impl AnswerGenerator for LlmAnswerGenerator {
    async fn generate(&self, context: &str, question: &str) -> AnswerStream {
        let request = self.build_request(context, question);
        info!(
            provider = %self.adapter.name(),
            model = %self.model,
            context_chars = context.len(),
            "Streaming answer from model"
        );

        let started = tokio::time::timeout(
            self.timeout,
            self.adapter.create_chat_completion_stream(&request),
        )
        .await;

        match started {
            Ok(Ok(tokens)) => degrade_errors(tokens),
            Ok(Err(e)) => {
                error!(error = %e, "Error starting model stream");
                error_fragment()
            }
            Err(_) => {
                let e = AppError::Timeout(format!(
                    "model did not respond within {}s",
                    self.timeout.as_secs()
                ));
                error!(error = %e, "Error starting model stream");
                error_fragment()
            }
        }
    }
}

fn error_fragment() -> AnswerStream {
    stream::once(async { GENERATION_ERROR_MESSAGE.to_string() }).boxed()
}

/// Pass fragments through until the first error, which becomes the final
/// fragment. Empty fragments are dropped.
pub fn degrade_errors(tokens: TokenStream) -> AnswerStream {
    stream::unfold(Some(tokens), |state| async move {
        let mut tokens = state?;
        loop {
            match tokens.next().await {
                Some(Ok(text)) if text.is_empty() => continue,
                Some(Ok(text)) => return Some((text, Some(tokens))),
                Some(Err(e)) => {
                    error!(error = %e, "Error streaming from model");
                    return Some((GENERATION_ERROR_MESSAGE.to_string(), None));
                }
                None => return None,
            }
        }
    })
    .boxed()
}
