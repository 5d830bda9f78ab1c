use axum::{
    extract::{Multipart, State},
    routing::post,
    Json, Router,
};
use tracing::info;

use crate::models::{AppState, FailedFile, FileOutcome, UploadResponse, UploadedFile};
use crate::pipeline::validate_upload;
use crate::types::{AppError, AppResult};

pub fn router() -> Router<AppState> {
    Router::new().route("/upload", post(upload_files))
}

/// POST /upload - ingest one or more PDFs
///
/// Every file is type-checked before any is parsed, so a non-PDF anywhere in
/// the request leaves the index untouched.
async fn upload_files(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> AppResult<Json<UploadResponse>> {
    let files = read_files(&mut multipart).await?;
    if files.is_empty() {
        return Err(AppError::InvalidRequest("No files were uploaded.".to_string()));
    }

    for file in &files {
        validate_upload(file)?;
    }

    let mut outcomes = Vec::with_capacity(files.len());
    for file in &files {
        outcomes.push(state.pipeline.ingest(file).await);
    }

    build_response(outcomes).map(Json)
}

async fn read_files(multipart: &mut Multipart) -> AppResult<Vec<UploadedFile>> {
    let mut files = Vec::new();

    while let Some(field) = multipart.next_field().await.map_err(|e| {
        AppError::InvalidRequest(format!("Failed to read multipart field: {}", e))
    })? {
        // Plain form values carry no filename
        let Some(filename) = field.file_name().map(str::to_string) else {
            continue;
        };
        let content_type = field.content_type().map(str::to_string);
        let data = field.bytes().await.map_err(|e| {
            AppError::InvalidRequest(format!("Failed to read file '{}': {}", filename, e))
        })?;

        info!(filename = %filename, bytes = data.len(), "Received upload");
        files.push(UploadedFile {
            filename,
            content_type,
            data,
        });
    }

    Ok(files)
}

fn build_response(outcomes: Vec<FileOutcome>) -> AppResult<UploadResponse> {
    let processed_files: Vec<String> = outcomes.iter().filter_map(FileOutcome::report_entry).collect();
    let mut failed_files: Vec<FailedFile> = outcomes
        .into_iter()
        .filter_map(|outcome| match outcome {
            FileOutcome::Failed { filename, error } => Some(FailedFile { filename, error }),
            _ => None,
        })
        .collect();

    if processed_files.is_empty() && !failed_files.is_empty() {
        let first = failed_files.remove(0);
        return Err(AppError::Ingestion {
            filename: first.filename,
            message: first.error,
        });
    }

    let message = if failed_files.is_empty() {
        "Files processed successfully"
    } else {
        "Some files could not be processed"
    };

    Ok(UploadResponse {
        message: message.to_string(),
        processed_files,
        failed_files,
    })
}
