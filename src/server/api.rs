use axum::{
    body::{ Body, Bytes },
    extract::{ DefaultBodyLimit, Multipart, Path, State },
    http::{ header, StatusCode },
    response::{ IntoResponse, Response },
    routing::{ delete, get, post },
    Json,
    Router,
};
use futures::StreamExt;
use log::error;
use std::sync::Arc;
use tower_http::cors::{ Any, CorsLayer };

use crate::llm::chat::FileUploader;
use crate::llm::{ ModelSpec, AVAILABLE_MODELS };
use crate::models::api::{ ChatRequest, ErrorBody, SaveResponse, UploadResponse };
use crate::models::chat::Conversation;
use crate::relay::{ CompletionRelay, RelayError, RelayRequest };
use crate::store::{ ConversationStore, StoreError };

const MAX_UPLOAD_BYTES: usize = 25 * 1024 * 1024;

#[derive(Clone)]
pub struct AppState {
    relay: Arc<CompletionRelay>,
    store: Arc<dyn ConversationStore>,
    uploader: Arc<dyn FileUploader>,
    upload_api_key: Option<String>,
}

impl AppState {
    pub fn new(
        relay: Arc<CompletionRelay>,
        store: Arc<dyn ConversationStore>,
        uploader: Arc<dyn FileUploader>,
        upload_api_key: Option<String>
    ) -> Self {
        Self {
            relay,
            store,
            uploader,
            upload_api_key,
        }
    }
}

pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any);

    Router::new()
        .route("/api/chat", post(chat_handler))
        .route("/api/chats", get(list_chats_handler).post(save_chat_handler))
        .route("/api/chats/{id}", delete(delete_chat_handler))
        .route("/api/upload", post(upload_handler))
        .route("/api/models", get(models_handler))
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
        .layer(cors)
        .with_state(state)
}

fn error_response(status: StatusCode, error: String) -> Response {
    (status, Json(ErrorBody { error })).into_response()
}

fn relay_error_response(err: RelayError) -> Response {
    let status = match &err {
        RelayError::Unauthorized => StatusCode::UNAUTHORIZED,
        RelayError::InvalidModel(_) => StatusCode::BAD_REQUEST,
        RelayError::Upstream(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    error_response(status, err.to_string())
}

/// Streams completion tokens back as a chunked plain-text body. A failure
/// after the stream has started aborts the body mid-flight; everything
/// before that point comes back as a JSON error.
async fn chat_handler(State(state): State<AppState>, Json(req): Json<ChatRequest>) -> Response {
    let request = RelayRequest {
        messages: req.messages,
        model: req.model,
        file_id: req.file_id,
        api_key: req.api_key.unwrap_or_default(),
    };

    match state.relay.open_stream(request).await {
        Ok(stream) => {
            let body = Body::from_stream(stream.map(|chunk| chunk.map(Bytes::from)));
            (
                StatusCode::OK,
                [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
                body,
            ).into_response()
        }
        Err(e) => {
            error!("Relay request rejected: {}", e);
            relay_error_response(e)
        }
    }
}

async fn list_chats_handler(State(state): State<AppState>) -> Json<Vec<Conversation>> {
    Json(state.store.list().await)
}

async fn save_chat_handler(
    State(state): State<AppState>,
    Json(conversation): Json<Conversation>
) -> Response {
    match state.store.save(&conversation).await {
        Ok(()) => Json(SaveResponse { success: true }).into_response(),
        Err(e) => {
            error!("Failed to save conversation {}: {}", conversation.id, e);
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "Failed to save chat".to_string())
        }
    }
}

async fn delete_chat_handler(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    match state.store.delete(&id).await {
        Ok(()) => Json(SaveResponse { success: true }).into_response(),
        Err(StoreError::NotFound(_)) => {
            error_response(StatusCode::NOT_FOUND, format!("Chat '{}' not found", id))
        }
        Err(e) => {
            error!("Failed to delete conversation {}: {}", id, e);
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "Failed to delete chat".to_string())
        }
    }
}

/// Forwards the uploaded file to the completion service and answers with
/// the opaque file id. Uses the server-configured credential; the endpoint
/// never stores the file locally.
async fn upload_handler(State(state): State<AppState>, mut multipart: Multipart) -> Response {
    let api_key = match &state.upload_api_key {
        Some(key) if !key.is_empty() => key.clone(),
        _ => {
            return error_response(StatusCode::UNAUTHORIZED, "API key not set".to_string());
        }
    };

    let mut file: Option<(String, Vec<u8>)> = None;
    loop {
        let field = match multipart.next_field().await {
            Ok(Some(field)) => field,
            Ok(None) => {
                break;
            }
            Err(e) => {
                return error_response(StatusCode::BAD_REQUEST, e.to_string());
            }
        };

        if field.name() != Some("file") {
            continue;
        }

        let file_name = field.file_name().unwrap_or("upload").to_string();
        match field.bytes().await {
            Ok(bytes) => {
                file = Some((file_name, bytes.to_vec()));
            }
            Err(e) => {
                return error_response(StatusCode::BAD_REQUEST, e.to_string());
            }
        }
    }

    let Some((file_name, bytes)) = file else {
        return error_response(StatusCode::BAD_REQUEST, "No file provided".to_string());
    };

    match state.uploader.upload(&api_key, &file_name, bytes).await {
        Ok(file_id) => Json(UploadResponse { file_id }).into_response(),
        Err(e) => {
            error!("Upload forwarding failed: {}", e);
            error_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
        }
    }
}

async fn models_handler() -> Json<&'static [ModelSpec]> {
    Json(AVAILABLE_MODELS)
}
