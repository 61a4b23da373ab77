use clap::Parser;

#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Host address and port for the HTTP server to listen on.
    #[arg(long, env = "SERVER_ADDR", default_value = "127.0.0.1:4000")]
    pub server_addr: String,

    /// Directory where conversation files are stored, one JSON file per chat.
    #[arg(long, env = "CHATS_DIR", default_value = "data/chats")]
    pub chats_dir: String,

    /// Base URL of the OpenAI-compatible completion API.
    #[arg(long, env = "OPENAI_BASE_URL", default_value = "https://api.openai.com/v1")]
    pub openai_base_url: String,

    /// API key used when forwarding file uploads to the completion API.
    /// Chat requests carry their own key; this one only covers uploads.
    #[arg(long, env = "OPENAI_API_KEY")]
    pub openai_api_key: Option<String>,

    /// Path to the JSON file holding locally persisted client settings.
    #[arg(long, env = "SETTINGS_PATH", default_value = "data/settings.json")]
    pub settings_path: String,
}
