// OpenAI-compatible chat completions adapter (OpenAI, OpenRouter)
// Streaming and SSE framing are handled by async-openai; this maps the deltas to text fragments.

use crate::llm::provider::{LLMAdapter, TokenStream};
use crate::types::{AppError, AppResult, LLMRequest};
use async_openai::config::OpenAIConfig;
use async_openai::error::OpenAIError;
use async_openai::types::chat::{
    ChatCompletionRequestAssistantMessageArgs, ChatCompletionRequestMessage,
    ChatCompletionRequestSystemMessageArgs, ChatCompletionRequestUserMessageArgs,
    CreateChatCompletionRequest, CreateChatCompletionRequestArgs,
    CreateChatCompletionStreamResponse,
};
use async_openai::Client;
use async_trait::async_trait;
use futures::StreamExt;

const OPENAI_API_BASE: &str = "https://api.openai.com/v1";
const OPENROUTER_API_BASE: &str = "https://openrouter.ai/api/v1";

pub struct OpenAIAdapter {
    client: Client<OpenAIConfig>,
    provider_name: String,
}

impl OpenAIAdapter {
    pub fn new(api_key: &str) -> Self {
        Self::with_base_url(api_key, OPENAI_API_BASE, "openai")
    }

    pub fn openrouter(api_key: &str) -> Self {
        Self::with_base_url(api_key, OPENROUTER_API_BASE, "openrouter")
    }

    pub fn with_base_url(api_key: &str, base_url: &str, provider_name: &str) -> Self {
        let config = OpenAIConfig::new()
            .with_api_key(api_key)
            .with_api_base(base_url.trim_end_matches('/'));

        Self {
            client: Client::with_config(config),
            provider_name: provider_name.to_string(),
        }
    }

    fn api_error(&self, e: OpenAIError) -> AppError {
        AppError::LLMApi(format!("{} API error: {}", self.provider_name, e))
    }

    fn build_request(&self, request: &LLMRequest) -> AppResult<CreateChatCompletionRequest> {
        let mut messages: Vec<ChatCompletionRequestMessage> =
            Vec::with_capacity(request.messages.len() + 1);

        if let Some(system) = &request.system_instruction {
            messages.push(
                ChatCompletionRequestSystemMessageArgs::default()
                    .content(system.as_str())
                    .build()
                    .map_err(|e| self.api_error(e))?
                    .into(),
            );
        }

        for message in &request.messages {
            let content = message.content.as_str();
            let built: ChatCompletionRequestMessage = match message.role.as_str() {
                "system" => ChatCompletionRequestSystemMessageArgs::default()
                    .content(content)
                    .build()
                    .map_err(|e| self.api_error(e))?
                    .into(),
                "assistant" => ChatCompletionRequestAssistantMessageArgs::default()
                    .content(content)
                    .build()
                    .map_err(|e| self.api_error(e))?
                    .into(),
                _ => ChatCompletionRequestUserMessageArgs::default()
                    .content(content)
                    .build()
                    .map_err(|e| self.api_error(e))?
                    .into(),
            };
            messages.push(built);
        }

        let mut builder = CreateChatCompletionRequestArgs::default();
        builder.model(request.model.as_str()).messages(messages);
        if let Some(temperature) = request.temperature {
            builder.temperature(temperature);
        }

        builder.build().map_err(|e| self.api_error(e))
    }

    /// Text carried by one streamed chunk, if any
    fn delta_text(chunk: CreateChatCompletionStreamResponse) -> Option<String> {
        chunk
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.delta.content)
            .filter(|text| !text.is_empty())
    }
}

#[async_trait]
impl LLMAdapter for OpenAIAdapter {
    async fn create_chat_completion_stream(&self, request: &LLMRequest) -> AppResult<TokenStream> {
        let body = self.build_request(request)?;

        let stream = self
            .client
            .chat()
            .create_stream(body)
            .await
            .map_err(|e| self.api_error(e))?;

        let provider_name = self.provider_name.clone();
        let tokens = stream.filter_map(move |item| {
            let result = match item {
                Ok(chunk) => Self::delta_text(chunk).map(Ok),
                Err(e) => Some(Err(AppError::LLMApi(format!(
                    "{} stream error: {}",
                    provider_name, e
                )))),
            };
            futures::future::ready(result)
        });

        Ok(tokens.boxed())
    }

    fn name(&self) -> &str {
        &self.provider_name
    }
}
