//! HTTP surface: upload validation, the document-type catalog and health.

use std::time::Instant;

use axum::{
    extract::{DefaultBodyLimit, Multipart, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use docsift_core::{DocumentTypeInfo, ExtractedFields, DOCUMENT_TYPES};
use docsift_ocr::{DocumentProcessor, PipelineError};
use serde::{Deserialize, Serialize};
use tower_http::cors::{Any, CorsLayer};
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info};
use uuid::Uuid;

/// Upload content types accepted before anything is decoded.
pub const ALLOWED_CONTENT_TYPES: &[&str] =
    &["image/jpeg", "image/png", "image/gif", "application/pdf"];

const DEFAULT_DOCUMENT_TYPE: &str = "general";

#[derive(Clone)]
struct AppState {
    processor: DocumentProcessor,
}

pub fn router(processor: DocumentProcessor, max_upload_bytes: usize) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health))
        .route("/api/documents/process", post(process_document))
        .route("/api/documents/supported-types", get(supported_types))
        // The tower-http limit below replaces axum's fixed 2 MiB default.
        .layer(DefaultBodyLimit::disable())
        .layer(RequestBodyLimitLayer::new(max_upload_bytes))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(AppState { processor })
}

// ── Responses ─────────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    service: &'static str,
    version: &'static str,
}

#[derive(Debug, Serialize)]
struct SupportedTypesResponse {
    supported_types: &'static [DocumentTypeInfo],
}

#[derive(Debug, Serialize)]
struct DocumentResponse {
    success: bool,
    filename: Option<String>,
    document_type: String,
    ocr_result: OcrSummary,
}

#[derive(Debug, Serialize)]
struct OcrSummary {
    text: String,
    confidence: f32,
    extracted_data: ExtractedFields,
    bounding_boxes_count: usize,
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    success: bool,
    error: String,
}

#[derive(Debug)]
struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn bad_request(message: impl Into<String>) -> Self {
        Self { status: StatusCode::BAD_REQUEST, message: message.into() }
    }
}

impl From<PipelineError> for ApiError {
    fn from(err: PipelineError) -> Self {
        let status = match &err {
            PipelineError::Decode(_) => StatusCode::UNPROCESSABLE_ENTITY,
            PipelineError::Recognition { .. } => StatusCode::BAD_GATEWAY,
            PipelineError::Timeout(_) => StatusCode::SERVICE_UNAVAILABLE,
            PipelineError::Join(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        Self { status, message: err.to_string() }
    }
}

impl From<axum::extract::multipart::MultipartError> for ApiError {
    fn from(err: axum::extract::multipart::MultipartError) -> Self {
        Self { status: err.status(), message: err.body_text() }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ErrorBody { success: false, error: self.message };
        (self.status, Json(body)).into_response()
    }
}

// ── Handlers ──────────────────────────────────────────────────────────────────

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        service: env!("CARGO_PKG_NAME"),
        version: env!("CARGO_PKG_VERSION"),
    })
}

async fn supported_types() -> Json<SupportedTypesResponse> {
    Json(SupportedTypesResponse { supported_types: DOCUMENT_TYPES })
}

#[derive(Debug, Deserialize)]
struct ProcessParams {
    document_type: Option<String>,
}

struct Upload {
    filename: Option<String>,
    content_type: Option<String>,
    bytes: Vec<u8>,
}

async fn process_document(
    State(state): State<AppState>,
    Query(params): Query<ProcessParams>,
    multipart: Multipart,
) -> Response {
    let request_id = Uuid::new_v4();
    match handle_upload(&state, params, multipart, request_id).await {
        Ok(body) => (StatusCode::OK, Json(body)).into_response(),
        Err(e) => {
            error!(
                request_id = %request_id,
                status = e.status.as_u16(),
                error = %e.message,
                "document processing failed"
            );
            e.into_response()
        }
    }
}

async fn handle_upload(
    state: &AppState,
    params: ProcessParams,
    mut multipart: Multipart,
    request_id: Uuid,
) -> Result<DocumentResponse, ApiError> {
    let mut upload = None;
    // A form field takes precedence over the query parameter.
    let mut document_type = params.document_type;

    while let Some(field) = multipart.next_field().await? {
        let name = field.name().map(str::to_owned);
        match name.as_deref() {
            Some("file") => {
                let filename = field.file_name().map(str::to_owned);
                let content_type = field.content_type().map(str::to_owned);
                let bytes = field.bytes().await?.to_vec();
                upload = Some(Upload { filename, content_type, bytes });
            }
            Some("document_type") => document_type = Some(field.text().await?),
            _ => {}
        }
    }

    let upload = upload.ok_or_else(|| ApiError::bad_request("Missing `file` field"))?;
    let content_type = upload.content_type.as_deref().unwrap_or("");
    if !ALLOWED_CONTENT_TYPES.contains(&content_type) {
        return Err(ApiError::bad_request(format!("Unsupported file type: {content_type}")));
    }
    let document_type = document_type.unwrap_or_else(|| DEFAULT_DOCUMENT_TYPE.to_string());

    info!(
        request_id = %request_id,
        filename = upload.filename.as_deref().unwrap_or("-"),
        content_type,
        bytes = upload.bytes.len(),
        document_type = %document_type,
        "processing document"
    );
    let start = Instant::now();
    let result = state.processor.process_document(&upload.bytes, &document_type).await?;
    info!(
        request_id = %request_id,
        confidence = result.confidence,
        total_ms = start.elapsed().as_secs_f64() * 1000.0,
        "document processed"
    );

    Ok(DocumentResponse {
        success: true,
        filename: upload.filename,
        document_type,
        ocr_result: OcrSummary {
            bounding_boxes_count: result.bounding_boxes.len(),
            text: result.text,
            confidence: result.confidence,
            extracted_data: result.extracted_data,
        },
    })
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{to_bytes, Body};
    use axum::http::{header, Request};
    use docsift_ocr::{
        DenseWord, FixedDenseEngine, FixedPolygonEngine, PipelineConfig, UnavailableEngine,
    };
    use image::{DynamicImage, GrayImage, ImageBuffer, Luma};
    use serde_json::Value;
    use std::io::Cursor;
    use tower::ServiceExt;

    const BOUNDARY: &str = "docsift-test-boundary";

    fn tiny_png() -> Vec<u8> {
        let img: GrayImage = ImageBuffer::from_fn(4, 4, |_, _| Luma([200u8]));
        let mut buf = Vec::new();
        DynamicImage::ImageLuma8(img)
            .write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)
            .unwrap();
        buf
    }

    fn word(text: &str, left: i32) -> DenseWord {
        DenseWord { text: text.into(), left, top: 0, width: 40, height: 12, confidence: 88.0 }
    }

    fn app() -> Router {
        let processor = DocumentProcessor::from_engines(
            FixedDenseEngine::new(vec![
                word("Invoice", 0),
                word("#INV-42", 50),
                word("Total:", 100),
                word("$120.00", 150),
            ]),
            FixedPolygonEngine::new(Vec::new()),
            PipelineConfig::default(),
        );
        router(processor, 1024 * 1024)
    }

    fn multipart_body(file: Option<(&str, &str, &[u8])>, document_type: Option<&str>) -> Vec<u8> {
        let mut body = Vec::new();
        if let Some((filename, content_type, bytes)) = file {
            body.extend_from_slice(
                format!(
                    "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"{filename}\"\r\nContent-Type: {content_type}\r\n\r\n"
                )
                .as_bytes(),
            );
            body.extend_from_slice(bytes);
            body.extend_from_slice(b"\r\n");
        }
        if let Some(kind) = document_type {
            body.extend_from_slice(
                format!(
                    "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"document_type\"\r\n\r\n{kind}\r\n"
                )
                .as_bytes(),
            );
        }
        body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());
        body
    }

    fn upload_request(uri: &str, body: Vec<u8>) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header(header::CONTENT_TYPE, format!("multipart/form-data; boundary={BOUNDARY}"))
            .header(header::CONTENT_LENGTH, body.len())
            .body(Body::from(body))
            .unwrap()
    }

    async fn send(app: Router, request: Request<Body>) -> (StatusCode, Value) {
        let response = app.oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let json = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, json)
    }

    #[tokio::test]
    async fn health_reports_service() {
        let request = Request::get("/health").body(Body::empty()).unwrap();
        let (status, json) = send(app(), request).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["status"], "healthy");
        assert_eq!(json["service"], "docsift-server");
    }

    #[tokio::test]
    async fn catalog_lists_all_types_with_credits() {
        let request = Request::get("/api/documents/supported-types").body(Body::empty()).unwrap();
        let (status, json) = send(app(), request).await;
        assert_eq!(status, StatusCode::OK);
        let types = json["supported_types"].as_array().unwrap();
        assert_eq!(types.len(), 4);
        assert_eq!(types[0]["type"], "invoice");
        assert_eq!(types[0]["credits_required"], 5);
        assert_eq!(types[2]["type"], "contract");
        assert_eq!(types[2]["credits_required"], 8);
    }

    #[tokio::test]
    async fn processes_invoice_upload() {
        let png = tiny_png();
        let body = multipart_body(Some(("scan.png", "image/png", &png[..])), Some("invoice"));
        let (status, json) = send(app(), upload_request("/api/documents/process", body)).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["success"], true);
        assert_eq!(json["filename"], "scan.png");
        assert_eq!(json["document_type"], "invoice");
        let ocr = &json["ocr_result"];
        assert_eq!(ocr["text"], "Invoice #INV-42 Total: $120.00");
        assert_eq!(ocr["bounding_boxes_count"], 4);
        assert_eq!(ocr["extracted_data"]["invoice_number"], "INV-42");
        assert_eq!(ocr["extracted_data"]["total_amount"].as_f64(), Some(120.0));
    }

    #[tokio::test]
    async fn document_type_can_come_from_query() {
        let png = tiny_png();
        let body = multipart_body(Some(("scan.png", "image/png", &png[..])), None);
        let request = upload_request("/api/documents/process?document_type=receipt", body);
        let (status, json) = send(app(), request).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["document_type"], "receipt");
        assert!(json["ocr_result"]["extracted_data"]["total_amount"].is_number());
    }

    #[tokio::test]
    async fn missing_type_defaults_to_general() {
        let png = tiny_png();
        let body = multipart_body(Some(("scan.png", "image/png", &png[..])), None);
        let (status, json) = send(app(), upload_request("/api/documents/process", body)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["document_type"], "general");
        assert_eq!(json["ocr_result"]["extracted_data"]["amounts"][0], "$120.00");
    }

    #[tokio::test]
    async fn rejects_unsupported_content_type() {
        let body = multipart_body(Some(("notes.txt", "text/plain", &b"hello"[..])), None);
        let (status, json) = send(app(), upload_request("/api/documents/process", body)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json["success"], false);
        assert_eq!(json["error"], "Unsupported file type: text/plain");
    }

    #[tokio::test]
    async fn rejects_missing_file() {
        let body = multipart_body(None, Some("invoice"));
        let (status, json) = send(app(), upload_request("/api/documents/process", body)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json["error"], "Missing `file` field");
    }

    #[tokio::test]
    async fn pdf_upload_is_unprocessable() {
        let body = multipart_body(
            Some(("doc.pdf", "application/pdf", &b"%PDF-1.7\n%\xe2\xe3\xcf\xd3\n"[..])),
            None,
        );
        let (status, json) = send(app(), upload_request("/api/documents/process", body)).await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(json["success"], false);
    }

    #[tokio::test]
    async fn both_engines_down_is_bad_gateway() {
        let processor = DocumentProcessor::from_engines(
            UnavailableEngine { feature: "tesseract" },
            UnavailableEngine { feature: "onnx" },
            PipelineConfig::default(),
        );
        let png = tiny_png();
        let body = multipart_body(Some(("scan.png", "image/png", &png[..])), None);
        let request = upload_request("/api/documents/process", body);
        let (status, json) = send(router(processor, 1024 * 1024), request).await;
        assert_eq!(status, StatusCode::BAD_GATEWAY);
        assert!(json["error"].as_str().unwrap().contains("onnx"));
    }

    #[tokio::test]
    async fn oversized_upload_is_rejected() {
        let processor = DocumentProcessor::from_engines(
            FixedDenseEngine::new(Vec::new()),
            FixedPolygonEngine::new(Vec::new()),
            PipelineConfig::default(),
        );
        let big = vec![0u8; 4096];
        let body = multipart_body(Some(("big.png", "image/png", &big[..])), None);
        let request = upload_request("/api/documents/process", body);
        let (status, _) = send(router(processor, 1024), request).await;
        assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
    }
}
