//! API Routes
//!
//! - `POST /upload` - ingest PDF files (multipart)
//! - `POST /query` - ask a question, answer streamed as plain text
//! - `GET /health` - liveness and index size

pub mod files;
pub mod health;
pub mod query;

use axum::extract::DefaultBodyLimit;
use axum::Router;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::middleware::cors_layer;
use crate::models::AppState;

/// Create the main application router
pub fn create_router(state: AppState) -> Router {
    info!("Creating application router");

    let body_limit = DefaultBodyLimit::max(state.config.server.max_upload_bytes);
    let cors = cors_layer(&state.config.server.cors_allowed_origins);

    Router::new()
        .merge(files::router())
        .merge(query::router())
        .merge(health::router())
        .layer(body_limit)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{HealthResponse, UploadResponse};
    use crate::pipeline::NOT_FOUND_MESSAGE;
    use crate::testing::{build_pdf, test_state};
    use axum::body::{to_bytes, Body};
    use axum::http::{header, Request, StatusCode};
    use axum::response::Response;
    use tempfile::TempDir;
    use tower::ServiceExt;

    const BOUNDARY: &str = "pdf-rag-test-boundary";

    fn upload_request(files: &[(&str, &str, Vec<u8>)]) -> Request<Body> {
        let mut body = Vec::new();
        for (filename, content_type, data) in files {
            body.extend_from_slice(
                format!(
                    "--{}\r\nContent-Disposition: form-data; name=\"files\"; filename=\"{}\"\r\nContent-Type: {}\r\n\r\n",
                    BOUNDARY, filename, content_type
                )
                .as_bytes(),
            );
            body.extend_from_slice(data);
            body.extend_from_slice(b"\r\n");
        }
        body.extend_from_slice(format!("--{}--\r\n", BOUNDARY).as_bytes());

        Request::builder()
            .method("POST")
            .uri("/upload")
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={}", BOUNDARY),
            )
            .body(Body::from(body))
            .unwrap()
    }

    fn query_request(question: &str) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/query")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(
                serde_json::json!({ "question": question }).to_string(),
            ))
            .unwrap()
    }

    async fn body_text(response: Response) -> String {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    async fn body_json<T: serde::de::DeserializeOwned>(response: Response) -> T {
        serde_json::from_str(&body_text(response).await).unwrap()
    }

    async fn indexed_chunks(app: &Router) -> usize {
        let response = app
            .clone()
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        body_json::<HealthResponse>(response).await.indexed_chunks
    }

    #[tokio::test]
    async fn test_upload_then_query_streams_answer() {
        let dir = TempDir::new().unwrap();
        let (state, generator) = test_state(&dir).await;
        let app = create_router(state);

        let pdf = build_pdf(&["The capital of France is Paris."]);
        let response = app
            .clone()
            .oneshot(upload_request(&[("france.pdf", "application/pdf", pdf)]))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let upload: UploadResponse = body_json(response).await;
        assert_eq!(upload.message, "Files processed successfully");
        assert_eq!(upload.processed_files, vec!["france.pdf"]);

        let response = app
            .clone()
            .oneshot(query_request("What is the capital of France?"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers()[header::CONTENT_TYPE],
            "text/plain; charset=utf-8"
        );
        let answer = body_text(response).await;
        assert!(answer.contains("Paris"));
        assert_ne!(answer, NOT_FOUND_MESSAGE);
        assert_eq!(generator.calls().len(), 1);
    }

    #[tokio::test]
    async fn test_non_pdf_rejects_whole_request() {
        let dir = TempDir::new().unwrap();
        let (state, _) = test_state(&dir).await;
        let app = create_router(state);

        let response = app
            .clone()
            .oneshot(upload_request(&[
                ("france.pdf", "application/pdf", build_pdf(&["Paris."])),
                ("notes.txt", "text/plain", b"just some notes".to_vec()),
            ]))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body: serde_json::Value = body_json(response).await;
        assert_eq!(body["detail"], "File 'notes.txt' is not a PDF.");
        assert_eq!(indexed_chunks(&app).await, 0);
    }

    #[tokio::test]
    async fn test_blank_pdf_is_reported_as_skipped() {
        let dir = TempDir::new().unwrap();
        let (state, _) = test_state(&dir).await;
        let app = create_router(state);

        let response = app
            .clone()
            .oneshot(upload_request(&[("scan.pdf", "application/pdf", build_pdf(&[""]))]))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let upload: UploadResponse = body_json(response).await;
        assert_eq!(
            upload.processed_files,
            vec!["scan.pdf (skipped, no content found)"]
        );
        assert_eq!(indexed_chunks(&app).await, 0);
    }

    #[tokio::test]
    async fn test_corrupt_pdf_alongside_valid_one() {
        let dir = TempDir::new().unwrap();
        let (state, _) = test_state(&dir).await;
        let app = create_router(state);

        let response = app
            .clone()
            .oneshot(upload_request(&[
                ("broken.pdf", "application/pdf", b"%PDF-1.5 garbage".to_vec()),
                ("france.pdf", "application/pdf", build_pdf(&["The capital of France is Paris."])),
            ]))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let upload: UploadResponse = body_json(response).await;
        assert_eq!(upload.message, "Some files could not be processed");
        assert_eq!(upload.processed_files, vec!["france.pdf"]);
        assert_eq!(upload.failed_files.len(), 1);
        assert_eq!(upload.failed_files[0].filename, "broken.pdf");
        assert_eq!(indexed_chunks(&app).await, 1);
    }

    #[tokio::test]
    async fn test_only_corrupt_pdf_is_server_error() {
        let dir = TempDir::new().unwrap();
        let (state, _) = test_state(&dir).await;
        let app = create_router(state);

        let response = app
            .oneshot(upload_request(&[(
                "broken.pdf",
                "application/pdf",
                b"%PDF-1.5 garbage".to_vec(),
            )]))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body: serde_json::Value = body_json(response).await;
        let detail = body["detail"].as_str().unwrap();
        assert!(detail.starts_with("Error processing broken.pdf"));
    }

    #[tokio::test]
    async fn test_query_on_empty_index_returns_canned_message() {
        let dir = TempDir::new().unwrap();
        let (state, generator) = test_state(&dir).await;
        let app = create_router(state);

        let response = app
            .oneshot(query_request("What is the capital of France?"))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_text(response).await, NOT_FOUND_MESSAGE);
        assert!(generator.calls().is_empty());
    }

    #[tokio::test]
    async fn test_blank_question_is_client_error() {
        let dir = TempDir::new().unwrap();
        let (state, _) = test_state(&dir).await;
        let app = create_router(state);

        let response = app.oneshot(query_request("   ")).await.unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body: serde_json::Value = body_json(response).await;
        assert_eq!(body["detail"], "Question must not be empty.");
    }

    #[tokio::test]
    async fn test_malformed_query_body_has_json_detail() {
        let dir = TempDir::new().unwrap();
        let (state, generator) = test_state(&dir).await;
        let app = create_router(state);

        for body in ["{}", "not json"] {
            let request = Request::builder()
                .method("POST")
                .uri("/query")
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body))
                .unwrap();
            let response = app.clone().oneshot(request).await.unwrap();

            assert_eq!(response.status(), StatusCode::BAD_REQUEST);
            let detail: serde_json::Value = body_json(response).await;
            assert!(detail["detail"].as_str().is_some_and(|d| !d.is_empty()));
        }
        assert!(generator.calls().is_empty());
    }

    #[tokio::test]
    async fn test_health_reports_collection() {
        let dir = TempDir::new().unwrap();
        let (state, _) = test_state(&dir).await;
        let app = create_router(state);

        let response = app
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let health: HealthResponse = body_json(response).await;
        assert_eq!(health.status, "ok");
        assert_eq!(health.collection, "rag_app");
        assert_eq!(health.indexed_chunks, 0);
    }
}
