pub mod cli;
pub mod config;
pub mod llm;
pub mod models;
pub mod relay;
pub mod server;
pub mod session;
pub mod store;

use log::info;
use std::error::Error;
use std::path::Path;
use std::sync::Arc;

use cli::Args;
use config::settings::load_settings;
use llm::chat::openai::OpenAIChatClient;
use relay::CompletionRelay;
use server::Server;

pub async fn run(args: Args) -> Result<(), Box<dyn Error + Send + Sync>> {
    let settings = load_settings(Path::new(&args.settings_path));
    let upload_api_key = args.openai_api_key
        .clone()
        .filter(|k| !k.is_empty())
        .or_else(|| settings.api_key.clone());

    info!("--- Core Configuration ---");
    info!("Server Address: {}", args.server_addr);
    info!("Chats Directory: {}", args.chats_dir);
    info!("Upstream Base URL: {}", args.openai_base_url);
    info!("Settings Path: {}", args.settings_path);
    info!("Upload Credential Configured: {}", upload_api_key.is_some());
    info!("-------------------------");

    let store = store::initialize_store(&args)?;
    let client = Arc::new(OpenAIChatClient::new(args.openai_base_url.clone()));
    let relay = Arc::new(CompletionRelay::new(client.clone()));

    let server = Server::new(
        args.server_addr.clone(),
        relay,
        store,
        client,
        upload_api_key
    );
    server.run().await
}
