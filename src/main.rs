use std::net::SocketAddr;
use std::sync::Arc;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use livebridge::bridge::SessionRegistry;
use livebridge::config::{BridgeConfig, VoiceName};
use livebridge::describe::HttpDescriber;
use livebridge::server::{self, AppState};

#[derive(Parser, Debug)]
#[command(name = "livebridge", about = "Voice session bridge gateway")]
struct Cli {
    /// Bind address for the gateway.
    #[arg(long, default_value = "127.0.0.1")]
    host: String,

    /// Bind port for the gateway.
    #[arg(long, default_value_t = 8000)]
    port: u16,

    /// Prebuilt voice for synthesized output.
    #[arg(long, default_value = "Puck")]
    voice: String,

    /// Override the default system instruction.
    #[arg(long)]
    system_prompt: Option<String>,

    /// Disable the Google Search tool.
    #[arg(long)]
    no_search: bool,

    /// Override the voice-activity threshold (0.0 to 1.0).
    #[arg(long)]
    vad_threshold: Option<f32>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    let api_key = std::env::var("GEMINI_API_KEY")
        .map_err(|_| anyhow::anyhow!("GEMINI_API_KEY is not set"))?;

    let voice = VoiceName::from_str_code(&cli.voice).ok_or_else(|| {
        let known: Vec<&str> = VoiceName::all().iter().map(|v| v.as_str()).collect();
        anyhow::anyhow!("unknown voice {:?}, expected one of {}", cli.voice, known.join(", "))
    })?;

    let mut config = BridgeConfig {
        api_key,
        voice,
        search_enabled: !cli.no_search,
        ..BridgeConfig::default()
    };
    if let Some(prompt) = cli.system_prompt {
        config.system_prompt = prompt;
    }
    if let Some(threshold) = cli.vad_threshold {
        anyhow::ensure!(
            (0.0..=1.0).contains(&threshold),
            "--vad-threshold must be between 0.0 and 1.0"
        );
        config.gate.threshold = threshold;
    }

    let describer = HttpDescriber::new(config.api_key.clone(), config.model.clone());
    let state = AppState {
        config: Arc::new(config),
        registry: Arc::new(SessionRegistry::new()),
        describer: Arc::new(describer),
    };

    let addr: SocketAddr = format!("{}:{}", cli.host, cli.port).parse()?;
    server::serve(addr, state).await
}
