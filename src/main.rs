use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "sermo", about = "Streaming speech transcription client")]
struct Cli {
    /// Path to the configuration file
    #[arg(short, long, default_value = "config.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Capture the microphone and print live transcripts until Ctrl-C
    Listen {
        /// Input device name, or "default"
        #[arg(short, long, default_value = "default")]
        device: String,
    },
    /// Transcribe a finished audio file and print the transcript
    Transcribe {
        /// Audio file (WAV or anything the decoder understands)
        path: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = sermo_core::AppConfig::load_from_file(&cli.config)
        .with_context(|| format!("failed to load config from {:?}", cli.config))?;

    let env_filter =
        EnvFilter::try_new(&config.general.log_level).unwrap_or_else(|_| EnvFilter::new("info"));

    let subscriber = tracing_subscriber::Registry::default().with(env_filter).with(
        tracing_subscriber::fmt::layer()
            .with_writer(std::io::stderr)
            .with_ansi(false),
    );

    tracing::subscriber::set_global_default(subscriber)
        .context("failed to set tracing subscriber")?;

    match cli.command {
        Command::Listen { device } => listen(&config, &device).await,
        Command::Transcribe { path } => transcribe(&config, &path).await,
    }
}

async fn listen(config: &sermo_core::AppConfig, device: &str) -> Result<()> {
    let backend = Arc::new(sermo_backend::RemoteBackend::from_config(&config.backend));
    let session = sermo_session::StreamingSession::new(backend);

    // Interim hypotheses go to stderr so stdout stays a clean transcript.
    session.subscribe(|event| match event {
        sermo_core::SpeechEvent::Partial(text) => eprintln!("  … {text}"),
        sermo_core::SpeechEvent::Final(text) => println!("{text}"),
    });

    session
        .start(config.session_config())
        .await
        .context("failed to start streaming session")?;

    let (chunk_tx, mut chunk_rx) = tokio::sync::mpsc::unbounded_channel();
    let mut capture = sermo_audio::CaptureSource::new(device);
    capture
        .start(config.general.sample_rate, chunk_tx)
        .with_context(|| format!("failed to open input device '{device}'"))?;

    tracing::info!("listening — press Ctrl-C to stop");

    loop {
        tokio::select! {
            chunk = chunk_rx.recv() => {
                match chunk {
                    Some(chunk) => session.send_audio(&chunk.bytes),
                    None => break,
                }
            }
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("stopping");
                break;
            }
        }
    }

    capture.stop();
    // The stopped capture flushes its sub-chunk tail; forward it before
    // draining the session.
    while let Ok(chunk) = chunk_rx.try_recv() {
        session.send_audio(&chunk.bytes);
    }
    session.stop().await;

    Ok(())
}

async fn transcribe(config: &sermo_core::AppConfig, path: &std::path::Path) -> Result<()> {
    let backend = sermo_backend::RemoteBackend::from_config(&config.backend);
    let options = config.transcription_options();

    tracing::info!(path = %path.display(), "transcribing file");
    let transcript = sermo_session::transcribe_file(&backend, path, &options)
        .await
        .with_context(|| format!("failed to transcribe {:?}", path))?;

    println!("{transcript}");
    Ok(())
}
