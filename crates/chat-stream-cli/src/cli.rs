use std::time::Duration;

use clap::{Parser, Subcommand};

use chat_stream_client::{ClientConfig, SessionOptions, TextEndPolicy};

/// Chat with a streaming analyst backend from the terminal
#[derive(Parser, Debug)]
#[command(name = "chat-stream")]
#[command(version)]
pub struct Cli {
    /// Chat session id
    #[arg(long, short, env = "CHAT_SESSION_ID")]
    pub session: String,

    /// API base url, including any base path
    #[arg(long, env = "CHAT_API_BASE_URL")]
    pub base_url: String,

    /// Bearer token
    #[arg(long, env = "CHAT_API_TOKEN", hide_env_values = true)]
    pub token: Option<String>,

    #[arg(long, env = "CHAT_API_CONNECT_TIMEOUT_SECS")]
    pub connect_timeout_secs: Option<u64>,

    #[arg(long, env = "CHAT_API_FETCH_TIMEOUT_SECS")]
    pub fetch_timeout_secs: Option<u64>,

    /// Cancel a turn that runs longer than this many seconds
    #[arg(long)]
    pub turn_timeout_secs: Option<u64>,

    /// Keep streamed assistant text in the transcript until the refetch
    #[arg(long)]
    pub synthesize_text: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Send one prompt and stream the answer
    Send {
        /// Prompt text; multiple words are joined with spaces
        #[arg(required = true, num_args = 1..)]
        prompt: Vec<String>,
    },
    /// Print the persisted transcript
    History,
}

impl Cli {
    pub fn client_config(&self) -> ClientConfig {
        let mut config = ClientConfig::new(self.base_url.trim());
        if let Some(token) = self.token.as_deref().filter(|t| !t.trim().is_empty()) {
            config = config.api_token(token.trim());
        }
        if let Some(secs) = self.connect_timeout_secs {
            config = config.connect_timeout(Duration::from_secs(secs));
        }
        if let Some(secs) = self.fetch_timeout_secs {
            config = config.fetch_timeout(Duration::from_secs(secs));
        }
        config
    }

    pub fn session_options(&self) -> SessionOptions {
        let mut options = SessionOptions::default();
        if let Some(secs) = self.turn_timeout_secs {
            options = options.turn_timeout(Duration::from_secs(secs));
        }
        if self.synthesize_text {
            options = options.text_end_policy(TextEndPolicy::Synthesize);
        }
        options
    }
}
