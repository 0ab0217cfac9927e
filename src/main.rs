use anyhow::Context;
use clap::{Parser, Subcommand};
use std::sync::Arc;
use story_agent::{
    config::{check_environment, load_config},
    health::{self, HealthState},
    llm::{LLMClient, OpenAILLM},
    server::{ServerConfig, SessionServer},
    session::{Providers, SessionIdentity},
    stt::create_stt,
    tts::{ElevenLabsTTS, TextToSpeech},
    vad::{silero_factory, VADConfig},
};
use tokio_util::sync::CancellationToken;

/// Voice storyteller: learns who it is talking to, then tells them a story
#[derive(Parser, Debug)]
#[command(name = "story-agent", version, about)]
struct Args {
    #[command(subcommand)]
    command: Option<Command>,

    /// WebSocket bind address (overrides STORY_AGENT_LISTEN)
    #[arg(long, global = true)]
    listen: Option<String>,

    /// Health server port (overrides PORT)
    #[arg(long, global = true)]
    health_port: Option<u16>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the agent (default)
    Serve,
    /// Validate the environment and exit
    Check,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    match args.command.unwrap_or(Command::Serve) {
        Command::Check => check(),
        Command::Serve => serve(args.listen, args.health_port).await,
    }
}

fn check() -> anyhow::Result<()> {
    let report = check_environment();

    if report.ci {
        println!("🔧 CI environment detected, missing keys are reported as warnings");
    }
    for var in &report.missing_required {
        println!("❌ {} is not set", var);
    }
    for var in &report.missing_optional {
        println!("⚠️  {} is not set (optional)", var);
    }
    for warning in &report.format_warnings {
        println!("⚠️  {}", warning);
    }

    if report.passed() {
        println!("✅ Environment check passed");
        Ok(())
    } else {
        println!("❌ Environment check failed");
        std::process::exit(1);
    }
}

async fn serve(listen: Option<String>, health_port: Option<u16>) -> anyhow::Result<()> {
    log::info!("🚀 Initializing story-agent");

    let (api_config, settings) = load_config().context("Failed to load configuration")?;

    let llm: Arc<dyn LLMClient> = Arc::new(
        OpenAILLM::new(api_config.openai_key().to_string())
            .context("Failed to initialize the language model client")?,
    );
    log::info!("🤖 LLM initialized");

    let stt = create_stt(&api_config).context("Failed to initialize speech-to-text")?;

    let tts: Option<Arc<dyn TextToSpeech>> = match api_config.elevenlabs_key() {
        Some(key) => {
            let tts = ElevenLabsTTS::new(key.to_string())
                .context("Failed to initialize text-to-speech")?;
            log::info!("🔊 TTS initialized");
            Some(Arc::new(tts))
        }
        None => {
            log::warn!("🔇 ELEVEN_API_KEY not set, sessions will be text-only");
            None
        }
    };

    let providers = Providers {
        llm,
        stt,
        tts,
        vad: VADConfig::default(),
        detector: silero_factory(),
    };

    let server_config = ServerConfig {
        listen_address: listen.unwrap_or_else(|| settings.listen_address.clone()),
        session_key: settings.session_key().map(str::to_string),
        identity: SessionIdentity {
            agent: settings.agent_name.clone(),
            room: settings.room_name.clone(),
        },
    };

    let shutdown = CancellationToken::new();

    let health_state = HealthState::new(settings.agent_name.clone());
    let health_port = health_port.unwrap_or(settings.health_port);
    let health_shutdown = shutdown.clone();
    let health_task = tokio::spawn(async move {
        if let Err(e) = health::serve(health_port, health_state, health_shutdown).await {
            log::warn!("Failed to start health server: {}", e);
        }
    });

    let signal_shutdown = shutdown.clone();
    tokio::spawn(async move {
        shutdown_signal().await;
        signal_shutdown.cancel();
    });

    println!("🎧 Waiting for listeners...");

    let result = SessionServer::new(server_config, providers)
        .run(shutdown.clone())
        .await
        .context("Session server failed");

    shutdown.cancel();
    let _ = health_task.await;

    println!("\n👋 Goodbye!");
    result
}

/// Waits for Ctrl+C or SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            log::error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                log::error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => log::info!("Received Ctrl+C, shutting down..."),
        _ = terminate => log::info!("Received SIGTERM, shutting down..."),
    }
}
