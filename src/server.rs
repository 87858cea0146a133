//! HTTP API.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET`  | `/health` | Status, version, generation provider |
//! | `GET`  | `/stats` | Knowledge store counts |
//! | `GET`  | `/documents` | Ingested document summaries |
//! | `GET`  | `/documents/{id}` | Full document record |
//! | `POST` | `/documents?name=<file>` | Ingest a raw PDF request body |
//! | `GET`  | `/concepts/search?query=` | Ranked concept matches |
//! | `POST` | `/concepts` | Add or merge a concept |
//! | `GET`  | `/quotes/random` | One random quote |
//! | `POST` | `/quotes` | Add a quote |
//! | `POST` | `/context` | Context bundle for a message |
//! | `POST` | `/chat` | One chat turn |
//! | `GET`  | `/memory` | Conversation transcript |
//! | `DELETE` | `/memory` | Clear the transcript |
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "unreadable_pdf", "message": "unreadable PDF: no text found" } }
//! ```
//!
//! Error codes: `bad_request` / `invalid_input` (400), `not_found` /
//! `empty_store` (404), `file_too_large` (413), `unreadable_pdf` (422),
//! `generation_failed` (502).
//!
//! # CORS
//!
//! All origins, methods, and headers are permitted.

use axum::{
    body::Bytes,
    extract::{rejection::BytesRejection, DefaultBodyLimit, Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use persona_harness_core::models::{
    DocumentRecord, DocumentSummary, KnowledgeStats, NewConcept, NewQuote, Quote, Turn,
};
use persona_harness_core::retrieve::ContextBundle;
use persona_harness_core::store::{ConceptMatch, ConceptWrite};
use persona_harness_core::KnowledgeError;
use serde::{Deserialize, Serialize};
use tower_http::cors::{Any, CorsLayer};
use tracing::info;

use crate::app::Harness;
use crate::chat::ChatReply;
use crate::config::Config;

/// Uploads may exceed the ingest ceiling by this much before the transport
/// rejects them, so slightly oversize files reach the `file_too_large` check.
const BODY_LIMIT_SLACK: usize = 1024 * 1024;

/// Starts the HTTP server on `[server].bind`. Runs until the process exits.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    serve(Harness::from_config(config.clone())?).await
}

/// Serve an already-built harness, e.g. one with preloaded documents.
pub async fn serve(harness: Harness) -> anyhow::Result<()> {
    let bind_addr = harness.config.server.bind.clone();
    let app = router(harness);

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    info!(bind = %bind_addr, "server listening");
    println!("Persona server listening on http://{}", bind_addr);
    axum::serve(listener, app).await?;

    Ok(())
}

/// Build the router. Exposed for in-process testing.
pub fn router(harness: Harness) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);
    let body_limit = harness.ingestor.max_bytes().saturating_add(BODY_LIMIT_SLACK);

    Router::new()
        .route("/health", get(handle_health))
        .route("/stats", get(handle_stats))
        .route("/documents", get(handle_list_documents).post(handle_upload))
        .route("/documents/{*id}", get(handle_get_document))
        .route("/concepts/search", get(handle_search_concepts))
        .route("/concepts", post(handle_add_concept))
        .route("/quotes/random", get(handle_random_quote))
        .route("/quotes", post(handle_add_quote))
        .route("/context", post(handle_context))
        .route("/chat", post(handle_chat))
        .route("/memory", get(handle_get_memory).delete(handle_clear_memory))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(cors)
        .with_state(harness)
}

// ============ Error response ============

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: String,
    message: String,
}

struct AppError {
    status: StatusCode,
    code: String,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code,
                message: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

impl From<KnowledgeError> for AppError {
    fn from(err: KnowledgeError) -> Self {
        let status = match err {
            KnowledgeError::UnreadablePdf { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            KnowledgeError::FileTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            KnowledgeError::EmptyStore => StatusCode::NOT_FOUND,
            KnowledgeError::InvalidInput(_) => StatusCode::BAD_REQUEST,
        };
        AppError {
            status,
            code: err.code().to_string(),
            message: err.to_string(),
        }
    }
}

fn bad_request(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::BAD_REQUEST,
        code: "bad_request".to_string(),
        message: message.into(),
    }
}

fn not_found(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::NOT_FOUND,
        code: "not_found".to_string(),
        message: message.into(),
    }
}

/// Domain errors keep their own status; anything else is a generation failure.
fn classify_chat_error(err: anyhow::Error) -> AppError {
    match err.downcast::<KnowledgeError>() {
        Ok(e) => e.into(),
        Err(other) => AppError {
            status: StatusCode::BAD_GATEWAY,
            code: "generation_failed".to_string(),
            message: format!("{:#}", other),
        },
    }
}

// ============ GET /health ============

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
    generator: String,
}

async fn handle_health(State(h): State<Harness>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        generator: h.chat.generator_name().to_string(),
    })
}

// ============ GET /stats ============

async fn handle_stats(State(h): State<Harness>) -> Json<KnowledgeStats> {
    Json(h.store.get_stats())
}

// ============ /documents ============

#[derive(Serialize)]
struct DocumentList {
    documents: Vec<DocumentSummary>,
}

async fn handle_list_documents(State(h): State<Harness>) -> Json<DocumentList> {
    Json(DocumentList {
        documents: h.store.list_documents(),
    })
}

async fn handle_get_document(
    State(h): State<Harness>,
    Path(id): Path<String>,
) -> Result<Json<DocumentRecord>, AppError> {
    h.store
        .get_document(&id)
        .map(Json)
        .ok_or_else(|| not_found(format!("no document with id: {}", id)))
}

#[derive(Deserialize)]
struct UploadParams {
    #[serde(default)]
    name: Option<String>,
}

#[derive(Serialize)]
struct UploadResponse {
    document: DocumentSummary,
    quotes: Vec<String>,
    concepts: Vec<String>,
}

async fn handle_upload(
    State(h): State<Harness>,
    Query(params): Query<UploadParams>,
    body: Result<Bytes, BytesRejection>,
) -> Result<(StatusCode, Json<UploadResponse>), AppError> {
    let body = body.map_err(|rejection| upload_rejection(rejection, h.ingestor.max_bytes()))?;
    let name = params.name.unwrap_or_default();
    let record = h.ingestor.ingest_bytes(&name, body.to_vec()).await?;
    h.persist();
    Ok((
        StatusCode::CREATED,
        Json(UploadResponse {
            document: record.summary(),
            quotes: record.quotes,
            concepts: record.concepts,
        }),
    ))
}

/// Bodies over the transport limit never reach the extractor; they still
/// answer with `file_too_large`.
fn upload_rejection(rejection: BytesRejection, limit: usize) -> AppError {
    if rejection.status() == StatusCode::PAYLOAD_TOO_LARGE {
        return AppError {
            status: StatusCode::PAYLOAD_TOO_LARGE,
            code: "file_too_large".to_string(),
            message: format!("upload exceeds the {} byte limit", limit),
        };
    }
    AppError {
        status: rejection.status(),
        code: "bad_request".to_string(),
        message: rejection.body_text(),
    }
}

// ============ /concepts ============

#[derive(Deserialize)]
struct SearchParams {
    #[serde(default)]
    query: String,
}

#[derive(Serialize)]
struct SearchResponse {
    results: Vec<ConceptMatch>,
}

async fn handle_search_concepts(
    State(h): State<Harness>,
    Query(params): Query<SearchParams>,
) -> Result<Json<SearchResponse>, AppError> {
    if params.query.trim().is_empty() {
        return Err(bad_request("query must not be empty"));
    }
    Ok(Json(SearchResponse {
        results: h.store.search_concepts(&params.query),
    }))
}

async fn handle_add_concept(
    State(h): State<Harness>,
    Json(input): Json<NewConcept>,
) -> Result<Json<ConceptWrite>, AppError> {
    let write = h.store.add_concept(input)?;
    h.persist();
    Ok(Json(write))
}

// ============ /quotes ============

async fn handle_random_quote(State(h): State<Harness>) -> Result<Json<Quote>, AppError> {
    Ok(Json(h.store.random_quote()?))
}

#[derive(Serialize)]
struct AddQuoteResponse {
    added: bool,
}

async fn handle_add_quote(
    State(h): State<Harness>,
    Json(input): Json<NewQuote>,
) -> Result<Json<AddQuoteResponse>, AppError> {
    let added = h.store.add_new_quote(input)?;
    if added {
        h.persist();
    }
    Ok(Json(AddQuoteResponse { added }))
}

// ============ POST /context ============

#[derive(Deserialize)]
struct ContextRequest {
    message: String,
    #[serde(default)]
    max_items: Option<usize>,
}

#[derive(Serialize)]
struct ContextResponse {
    context: ContextBundle,
    rendered: String,
}

async fn handle_context(
    State(h): State<Harness>,
    Json(req): Json<ContextRequest>,
) -> Result<Json<ContextResponse>, AppError> {
    if req.message.trim().is_empty() {
        return Err(bad_request("message must not be empty"));
    }
    let max_items = req
        .max_items
        .unwrap_or(h.config.retrieval.max_items);
    let context = h.retriever.build_context(&h.store, &req.message, max_items);
    let rendered = context.render();
    Ok(Json(ContextResponse { context, rendered }))
}

// ============ POST /chat ============

#[derive(Deserialize)]
struct ChatRequest {
    message: String,
    #[serde(default = "default_use_context")]
    use_context: bool,
}

fn default_use_context() -> bool {
    true
}

async fn handle_chat(
    State(h): State<Harness>,
    Json(req): Json<ChatRequest>,
) -> Result<Json<ChatReply>, AppError> {
    let reply = h
        .chat
        .chat(&req.message, req.use_context)
        .await
        .map_err(classify_chat_error)?;
    Ok(Json(reply))
}

// ============ /memory ============

#[derive(Serialize)]
struct MemoryResponse {
    turns: Vec<Turn>,
}

async fn handle_get_memory(State(h): State<Harness>) -> Json<MemoryResponse> {
    Json(MemoryResponse {
        turns: h.store.transcript(),
    })
}

async fn handle_clear_memory(State(h): State<Harness>) -> StatusCode {
    h.store.clear_memory();
    StatusCode::NO_CONTENT
}
