use std::path::PathBuf;
use std::sync::Arc;

use anyhow::anyhow;
use clap::{Parser, Subcommand};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::info;

use voice_tutor::{
    ConversationController, TutorConfig,
    core::realtime::{AudioSink, NullCaptureDevice, NullSink, OpenAITransportFactory, WavFileSink},
};

/// Voice Tutor - realtime spoken conversation practice
#[derive(Parser, Debug)]
#[command(name = "voice-tutor")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Path to configuration file (YAML)
    #[arg(short = 'c', long = "config", value_name = "FILE")]
    config: Option<PathBuf>,

    /// Subcommand to run
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// List the configured personas
    Personas,

    /// Print the instructions built for a persona
    Instructions {
        #[arg(short = 'p', long = "persona")]
        persona: String,

        /// Print the opening-line instructions instead
        #[arg(long)]
        opening: bool,
    },

    /// Hold a conversation; stdin lines are sent as typed messages
    Chat {
        #[arg(short = 'p', long = "persona")]
        persona: String,

        /// Record the tutor's audio to a WAV file
        #[arg(long = "record", value_name = "FILE")]
        record: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if it exists (must be done before config loading)
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt::init();

    // Must happen before any TLS connection is attempted
    rustls::crypto::ring::default_provider()
        .install_default()
        .map_err(|_| anyhow!("Failed to install default crypto provider"))?;

    let cli = Cli::parse();

    let config = if let Some(config_path) = cli.config {
        info!("Loading configuration from {}", config_path.display());
        TutorConfig::from_file(&config_path).map_err(|e| anyhow!(e.to_string()))?
    } else {
        TutorConfig::from_env().map_err(|e| anyhow!(e.to_string()))?
    };

    match cli.command {
        Commands::Personas => {
            for persona in &config.personas {
                println!(
                    "{:<12} {} {} ({}, voice {})",
                    persona.character_id,
                    persona.emoji,
                    persona.display_name,
                    persona.target_language,
                    persona.voice_id
                );
            }
            Ok(())
        }
        Commands::Instructions { persona, opening } => {
            let settings = config
                .persona(&persona)
                .ok_or_else(|| anyhow!("Unknown persona '{}'", persona))?;
            let builder = config.instruction_builder();
            if opening {
                println!("{}", builder.build_opening_line(settings));
            } else {
                println!("{}", builder.build(settings));
            }
            Ok(())
        }
        Commands::Chat { persona, record } => chat(config, persona, record).await,
    }
}

async fn chat(config: TutorConfig, persona: String, record: Option<PathBuf>) -> anyhow::Result<()> {
    let settings = config
        .persona(&persona)
        .cloned()
        .ok_or_else(|| anyhow!("Unknown persona '{}'", persona))?;

    let recorder = match &record {
        Some(path) => Some(Arc::new(WavFileSink::create(path)?)),
        None => None,
    };
    let sink: Arc<dyn AudioSink> = match &recorder {
        Some(recorder) => recorder.clone() as Arc<dyn AudioSink>,
        None => Arc::new(NullSink),
    };

    let token_provider = config.token_provider().map_err(|e| anyhow!(e))?;
    let transports = Arc::new(OpenAITransportFactory::new(
        config.realtime.clone(),
        Arc::new(NullCaptureDevice),
    ));

    let controller = ConversationController::new(
        token_provider,
        transports,
        sink,
        config.controller.clone(),
    )
    .with_instruction_builder(config.instruction_builder());

    controller.on_user_utterance(|u| println!("you> {}", u.text));
    controller.on_assistant_utterance(|u| println!("tutor> {}", u.text));
    controller.on_error(|e| eprintln!("error: {}", e));

    controller.start(settings).await?;
    println!("Connected. Type a message, /switch ID to change persona, /quit to leave.");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if line == "/quit" {
            break;
        }
        if let Some(id) = line.strip_prefix("/switch ") {
            match config.persona(id.trim()).cloned() {
                Some(next) => {
                    if let Err(e) = controller.switch_persona(next).await {
                        eprintln!("switch failed: {}", e);
                    }
                }
                None => eprintln!("unknown persona '{}'", id.trim()),
            }
            continue;
        }
        if let Err(e) = controller.send_text(line) {
            eprintln!("not sent: {}", e);
        }
    }

    controller.stop().await;

    if let Some(recorder) = recorder {
        recorder.finalize()?;
        println!("Saved recording to {}", recorder.path().display());
    }

    Ok(())
}
