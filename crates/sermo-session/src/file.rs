use sermo_audio::{normalize, NormalizedAudio};
use sermo_backend::SpeechBackend;
use sermo_core::{
    BackendError, RecognitionResult, SessionConfig, TranscribeError, TranscriptionOptions,
};
use std::path::Path;

/// Transcribe a finished audio file.
///
/// The file is normalized to 16 kHz mono PCM16 and routed by duration:
/// at or under the sync threshold it goes through one single-shot
/// recognition call, above it through a long-running operation polled to
/// completion at a fixed interval. Both routes produce the same
/// `\n`-joined transcript format. The converter's temp artifact is removed
/// best-effort afterwards, on the error path too.
pub async fn transcribe_file(
    backend: &dyn SpeechBackend,
    path: &Path,
    options: &TranscriptionOptions,
) -> Result<String, TranscribeError> {
    let audio = normalize(path)?;
    let outcome = run_recognition(backend, &audio, options).await;
    audio.cleanup();
    let results = outcome?;
    Ok(join_transcripts(&results))
}

async fn run_recognition(
    backend: &dyn SpeechBackend,
    audio: &NormalizedAudio,
    options: &TranscriptionOptions,
) -> Result<Vec<RecognitionResult>, BackendError> {
    let config = SessionConfig {
        sample_rate: audio.sample_rate,
        language_code: options.language_code.clone(),
        punctuation: true,
        interim_results: false,
    };

    let duration = audio.duration();
    if duration <= options.sync_threshold {
        tracing::debug!(?duration, "short file, single-shot recognition");
        return backend.recognize(&config, &audio.pcm).await;
    }

    tracing::debug!(?duration, "long file, long-running recognition");
    let operation = backend.start_long_running(&config, &audio.pcm).await?;

    let mut attempts = 0u32;
    loop {
        tokio::time::sleep(options.poll_interval).await;
        attempts += 1;
        if let Some(results) = backend.poll_operation(&operation).await? {
            tracing::debug!(operation = %operation, attempts, "operation completed");
            return Ok(results);
        }
        if attempts >= options.poll_max_attempts {
            return Err(BackendError::OperationTimeout(format!(
                "operation {operation} still running after {attempts} polls"
            )));
        }
    }
}

/// Flatten every result's alternatives into one transcript per line.
fn join_transcripts(results: &[RecognitionResult]) -> String {
    results
        .iter()
        .flat_map(|r| r.alternatives.iter())
        .map(|a| a.transcript.as_str())
        .collect::<Vec<_>>()
        .join("\n")
}
