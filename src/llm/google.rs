// Google Gemini adapter (Generative Language API, streaming over SSE)
// API Reference: https://ai.google.dev/api/generate-content#method:-models.streamgeneratecontent

use crate::llm::provider::{LLMAdapter, TokenStream};
use crate::llm::sse::SseDecoder;
use crate::types::{AppError, AppResult, LLMRequest};
use async_trait::async_trait;
use futures::StreamExt;
use reqwest::Client;
use serde::{Deserialize, Serialize};

const GEMINI_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";

pub struct GoogleAdapter {
    client: Client,
    api_key: String,
    base_url: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiRequest {
    contents: Vec<GeminiContent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<GeminiContent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    generation_config: Option<GenerationConfig>,
}

#[derive(Serialize)]
struct GeminiContent {
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    parts: Vec<GeminiPart>,
}

#[derive(Serialize)]
struct GeminiPart {
    text: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    temperature: f32,
}

// Streamed response chunks
#[derive(Deserialize)]
struct GeminiStreamChunk {
    #[serde(default)]
    candidates: Vec<GeminiCandidate>,
}

#[derive(Deserialize)]
struct GeminiCandidate {
    #[serde(default)]
    content: Option<GeminiCandidateContent>,
}

#[derive(Deserialize)]
struct GeminiCandidateContent {
    #[serde(default)]
    parts: Vec<GeminiResponsePart>,
}

#[derive(Deserialize)]
struct GeminiResponsePart {
    #[serde(default)]
    text: Option<String>,
}

#[derive(Deserialize)]
struct GeminiErrorResponse {
    error: GeminiError,
}

#[derive(Deserialize)]
struct GeminiError {
    message: String,
    #[serde(default)]
    status: Option<String>,
}

impl GoogleAdapter {
    pub fn new(api_key: &str) -> Self {
        Self::with_base_url(api_key, GEMINI_API_BASE)
    }

    pub fn with_base_url(api_key: &str, base_url: &str) -> Self {
        Self {
            client: Client::new(),
            api_key: api_key.to_string(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    fn endpoint(&self, model: &str) -> String {
        format!("{}/models/{}:streamGenerateContent?alt=sse", self.base_url, model)
    }

    fn build_body(request: &LLMRequest) -> GeminiRequest {
        let mut system_parts: Vec<GeminiPart> = request
            .system_instruction
            .iter()
            .map(|text| GeminiPart { text: text.clone() })
            .collect();

        let mut contents = Vec::new();
        for message in &request.messages {
            let role = match message.role.as_str() {
                "system" => {
                    system_parts.push(GeminiPart {
                        text: message.content.clone(),
                    });
                    continue;
                }
                "assistant" => "model",
                _ => "user",
            };
            contents.push(GeminiContent {
                role: Some(role.to_string()),
                parts: vec![GeminiPart {
                    text: message.content.clone(),
                }],
            });
        }

        GeminiRequest {
            contents,
            system_instruction: (!system_parts.is_empty()).then(|| GeminiContent {
                role: None,
                parts: system_parts,
            }),
            generation_config: request
                .temperature
                .map(|temperature| GenerationConfig { temperature }),
        }
    }

    /// Text carried by one streamed event, if any
    fn parse_event(data: &str) -> AppResult<Option<String>> {
        let chunk: GeminiStreamChunk = serde_json::from_str(data)
            .map_err(|e| AppError::LLMApi(format!("Failed to parse Gemini stream chunk: {}", e)))?;

        let text: String = chunk
            .candidates
            .into_iter()
            .next()
            .and_then(|c| c.content)
            .map(|content| {
                content
                    .parts
                    .into_iter()
                    .filter_map(|p| p.text)
                    .collect()
            })
            .unwrap_or_default();

        Ok((!text.is_empty()).then_some(text))
    }
}

#[async_trait]
impl LLMAdapter for GoogleAdapter {
    async fn create_chat_completion_stream(&self, request: &LLMRequest) -> AppResult<TokenStream> {
        let body = Self::build_body(request);

        let response = self
            .client
            .post(self.endpoint(&request.model))
            .header("x-goog-api-key", &self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| AppError::LLMApi(format!("Gemini request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            if let Ok(error_response) = serde_json::from_str::<GeminiErrorResponse>(&error_text) {
                return Err(AppError::LLMApi(format!(
                    "Gemini API error ({}): {} (status: {:?})",
                    status, error_response.error.message, error_response.error.status
                )));
            }
            return Err(AppError::LLMApi(format!(
                "Gemini API error ({}): {}",
                status, error_text
            )));
        }

        // `None` marks the end of the body so a final unterminated line is still decoded
        let mut decoder = SseDecoder::new();
        let chunks = response
            .bytes_stream()
            .map(Some)
            .chain(futures::stream::once(async { None }));
        let stream = chunks.flat_map(move |chunk| {
            let items: Vec<AppResult<String>> = match chunk {
                Some(Ok(bytes)) => decoder
                    .push(&bytes)
                    .iter()
                    .filter_map(|data| Self::parse_event(data).transpose())
                    .collect(),
                Some(Err(e)) => vec![Err(AppError::LLMApi(format!("Gemini stream error: {}", e)))],
                None => decoder
                    .finish()
                    .and_then(|data| Self::parse_event(&data).transpose())
                    .into_iter()
                    .collect(),
            };
            futures::stream::iter(items)
        });

        Ok(stream.boxed())
    }

    fn name(&self) -> &str {
        "google"
    }
}
