// Type definitions, enums and the application error

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum LLMProvider {
    Google,
    OpenAI,
    OpenRouter,
}

impl LLMProvider {
    /// Environment variable holding the credential for this provider
    pub fn api_key_var(&self) -> &'static str {
        match self {
            LLMProvider::Google => "GOOGLE_API_KEY",
            LLMProvider::OpenAI => "OPENAI_API_KEY",
            LLMProvider::OpenRouter => "OPENROUTER_API_KEY",
        }
    }

    pub fn default_model(&self) -> &'static str {
        match self {
            LLMProvider::Google => "gemini-2.5-flash",
            LLMProvider::OpenAI => "gpt-4o-mini",
            LLMProvider::OpenRouter => "openai/gpt-4o-mini",
        }
    }
}

impl std::fmt::Display for LLMProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LLMProvider::Google => write!(f, "google"),
            LLMProvider::OpenAI => write!(f, "openai"),
            LLMProvider::OpenRouter => write!(f, "openrouter"),
        }
    }
}

impl FromStr for LLMProvider {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "google" | "gemini" => Ok(LLMProvider::Google),
            "openai" => Ok(LLMProvider::OpenAI),
            "openrouter" => Ok(LLMProvider::OpenRouter),
            other => Err(AppError::InvalidRequest(format!(
                "Unsupported LLM provider: {}",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct LLMRequest {
    pub model: String,
    pub messages: Vec<LLMMessage>,
    pub temperature: Option<f32>,
    pub system_instruction: Option<String>,
}

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct LLMMessage {
    pub role: String, // "user", "assistant", "system"
    pub content: String,
}

impl LLMMessage {
    pub fn new(role: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: role.into(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new("user", content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new("assistant", content)
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new("system", content)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Error processing {filename}: {message}")]
    Ingestion { filename: String, message: String },

    #[error("PDF error: {0}")]
    Pdf(String),

    #[error("Embedding error: {0}")]
    Embedding(String),

    #[error("Reranker error: {0}")]
    Reranker(String),

    #[error("Vector store error: {0}")]
    VectorStore(String),

    #[error("LLM API error: {0}")]
    LLMApi(String),

    #[error("Timed out: {0}")]
    Timeout(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Message exposed to HTTP clients. Validation errors carry their text as-is.
    pub fn detail(&self) -> String {
        match self {
            AppError::InvalidRequest(message) => message.clone(),
            other => other.to_string(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(error = %self, "Request failed");
        }
        (status, Json(serde_json::json!({ "detail": self.detail() }))).into_response()
    }
}

pub type AppResult<T> = std::result::Result<T, AppError>;
