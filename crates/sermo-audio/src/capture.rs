use crate::device::DeviceManager;
use cpal::traits::{DeviceTrait, StreamTrait};
use cpal::{SampleRate, Stream, StreamConfig};
use sermo_core::{AudioChunk, AudioError};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;

/// Batches device-paced sample buffers into ~fixed-size PCM16LE chunks.
///
/// Runs inside the capture callback, so it only copies — no I/O.
struct ChunkAccumulator {
    pending: Vec<u8>,
    chunk_bytes: usize,
}

impl ChunkAccumulator {
    fn new(sample_rate: u32, chunk_millis: u32) -> Self {
        let chunk_bytes = (sample_rate as usize * chunk_millis as usize / 1000) * 2;
        Self {
            pending: Vec::with_capacity(chunk_bytes * 2),
            chunk_bytes,
        }
    }

    /// Copy `samples` out of the device buffer and return any full chunks.
    fn push(&mut self, samples: &[i16]) -> Vec<Vec<u8>> {
        for sample in samples {
            self.pending.extend_from_slice(&sample.to_le_bytes());
        }
        let mut chunks = Vec::new();
        while self.pending.len() >= self.chunk_bytes {
            chunks.push(self.pending.drain(..self.chunk_bytes).collect());
        }
        chunks
    }

    /// Take whatever partial chunk is still pending. `None` when the last
    /// push ended exactly on a chunk boundary.
    fn flush(&mut self) -> Option<Vec<u8>> {
        if self.pending.is_empty() {
            None
        } else {
            Some(std::mem::take(&mut self.pending))
        }
    }
}

/// Owns the microphone device handle and emits freshly-copied PCM16 chunks
/// roughly every 100 ms of captured audio.
///
/// The cpal stream handle is `!Send`; keep the source on the thread that
/// created it.
pub struct CaptureSource {
    device_name: String,
    stream: Option<Stream>,
    accumulator: Option<Arc<Mutex<ChunkAccumulator>>>,
    chunk_tx: Option<mpsc::UnboundedSender<AudioChunk>>,
    sample_rate: u32,
}

impl CaptureSource {
    pub fn new(device_name: &str) -> Self {
        Self {
            device_name: device_name.to_string(),
            stream: None,
            accumulator: None,
            chunk_tx: None,
            sample_rate: 0,
        }
    }

    /// Open the input device at exactly `sample_rate` Hz / mono / 16-bit and
    /// begin emitting chunks on `chunk_tx`.
    ///
    /// No fallback format negotiation is attempted: if the device cannot be
    /// opened at that format this fails with [`AudioError::DeviceUnavailable`]
    /// and the caller must pick a supported rate. Calling `start` while
    /// already capturing is a no-op.
    pub fn start(
        &mut self,
        sample_rate: u32,
        chunk_tx: mpsc::UnboundedSender<AudioChunk>,
    ) -> Result<(), AudioError> {
        if self.stream.is_some() {
            tracing::debug!("capture already running, start ignored");
            return Ok(());
        }

        let device = DeviceManager::new().get_input_device(&self.device_name)?;
        let config = StreamConfig {
            channels: 1,
            sample_rate: SampleRate(sample_rate),
            buffer_size: cpal::BufferSize::Default,
        };

        // Shared with `stop` so the sub-chunk tail can be flushed; the
        // callback holds the lock only while copying one device buffer.
        let accumulator = Arc::new(Mutex::new(ChunkAccumulator::new(sample_rate, 100)));
        let callback_acc = Arc::clone(&accumulator);
        let callback_tx = chunk_tx.clone();

        let err_callback = |err: cpal::StreamError| {
            tracing::error!("capture stream error: {}", err);
        };

        let stream = device
            .build_input_stream(
                &config,
                move |data: &[i16], _: &cpal::InputCallbackInfo| {
                    for bytes in callback_acc.lock().unwrap().push(data) {
                        // Unbounded send: the callback never blocks even
                        // when the consumer is stalled on network I/O.
                        let _ = callback_tx.send(AudioChunk { bytes, sample_rate });
                    }
                },
                err_callback,
                None,
            )
            .map_err(|e| map_build_error(e, sample_rate))?;

        stream
            .play()
            .map_err(|e| AudioError::DeviceUnavailable(format!("failed to start capture: {e}")))?;

        tracing::info!(sample_rate, device = %self.device_name, "capture started");
        self.stream = Some(stream);
        self.accumulator = Some(accumulator);
        self.chunk_tx = Some(chunk_tx);
        self.sample_rate = sample_rate;
        Ok(())
    }

    /// Halt the device and release its handle. Idempotent: a no-op when not
    /// capturing. Dropping the stream detaches the data callback; the
    /// partial chunk still pending is emitted as one final short chunk so
    /// the last fraction of a second of speech is not lost.
    pub fn stop(&mut self) {
        if let Some(stream) = self.stream.take() {
            let _ = stream.pause();
            drop(stream);

            if let (Some(accumulator), Some(chunk_tx)) =
                (self.accumulator.take(), self.chunk_tx.take())
            {
                if let Some(bytes) = accumulator.lock().unwrap().flush() {
                    tracing::debug!(len = bytes.len(), "flushing capture tail");
                    let _ = chunk_tx.send(AudioChunk {
                        bytes,
                        sample_rate: self.sample_rate,
                    });
                }
            }
            tracing::info!("capture stopped");
        }
    }

    pub fn is_capturing(&self) -> bool {
        self.stream.is_some()
    }
}

impl Drop for CaptureSource {
    fn drop(&mut self) {
        self.stop();
    }
}

fn map_build_error(err: cpal::BuildStreamError, sample_rate: u32) -> AudioError {
    match err {
        cpal::BuildStreamError::StreamConfigNotSupported => AudioError::DeviceUnavailable(
            format!("device does not support {sample_rate} Hz mono 16-bit capture"),
        ),
        cpal::BuildStreamError::DeviceNotAvailable => {
            AudioError::DeviceUnavailable("capture device disappeared".to_string())
        }
        other => AudioError::StreamBuild(other.to_string()),
    }
}
