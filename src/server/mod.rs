pub mod api;

use log::info;
use std::error::Error;
use std::sync::Arc;
use tokio::net::TcpListener;

use crate::llm::chat::FileUploader;
use crate::relay::CompletionRelay;
use crate::store::ConversationStore;

pub struct Server {
    addr: String,
    state: api::AppState,
}

impl Server {
    pub fn new(
        addr: String,
        relay: Arc<CompletionRelay>,
        store: Arc<dyn ConversationStore>,
        uploader: Arc<dyn FileUploader>,
        upload_api_key: Option<String>
    ) -> Self {
        Self {
            addr,
            state: api::AppState::new(relay, store, uploader, upload_api_key),
        }
    }

    pub async fn run(&self) -> Result<(), Box<dyn Error + Send + Sync>> {
        let app = api::build_router(self.state.clone());

        let listener = TcpListener::bind(&self.addr).await.map_err(|e|
            format!("Failed to bind HTTP server to {}: {}. Try a different port.", self.addr, e)
        )?;
        info!("HTTP server listening on: http://{}", self.addr);

        axum::serve(listener, app.into_make_service()).await?;
        Ok(())
    }
}
