use rubato::{FastFixedIn, PolynomialDegree, Resampler};
use sermo_core::FormatError;
use std::path::{Path, PathBuf};
use std::time::Duration;
use symphonia::core::audio::{AudioBufferRef, Signal};
use symphonia::core::codecs::CODEC_TYPE_NULL;
use symphonia::core::conv::FromSample;

/// Target format every recognition path expects.
pub const TARGET_SAMPLE_RATE: u32 = 16000;

/// Input frames per rubato call. Fixed quality knob — no adaptive logic.
const RESAMPLE_CHUNK: usize = 1024;

/// The result of [`normalize`]: 16 kHz mono PCM16LE in a newly-owned buffer.
///
/// When a conversion pass ran, the converted audio is also written to a temp
/// WAV whose lifetime the caller owns; [`cleanup`](Self::cleanup) removes it
/// best-effort.
#[derive(Debug)]
pub struct NormalizedAudio {
    pub pcm: Vec<u8>,
    pub sample_rate: u32,
    pub temp_wav: Option<PathBuf>,
}

impl NormalizedAudio {
    pub fn duration(&self) -> Duration {
        let samples = self.pcm.len() / 2;
        Duration::from_secs_f64(samples as f64 / self.sample_rate as f64)
    }

    /// Best-effort removal of the temp artifact. Failure to delete never
    /// fails the calling operation.
    pub fn cleanup(&self) {
        if let Some(path) = &self.temp_wav {
            if let Err(e) = std::fs::remove_file(path) {
                tracing::debug!("could not remove temp wav {:?}: {}", path, e);
            }
        }
    }
}

/// Normalize arbitrary input audio into 16 kHz / mono / 16-bit linear PCM.
///
/// A WAV already in the target format is read through byte-identically with
/// no re-encoding pass and no temp file. Anything else is decoded (any codec
/// symphonia knows), downmixed to mono, resampled, and re-encoded; the
/// source file is never mutated.
pub fn normalize(path: &Path) -> Result<NormalizedAudio, FormatError> {
    if let Some(audio) = try_wav_fast_path(path)? {
        tracing::debug!(?path, "already 16 kHz mono PCM16, skipping conversion");
        return Ok(audio);
    }

    let (samples, source_rate) = decode_to_mono_f32(path)?;
    tracing::debug!(
        ?path,
        source_rate,
        samples = samples.len(),
        "decoded, converting to {} Hz",
        TARGET_SAMPLE_RATE
    );

    let mono_16k = if source_rate == TARGET_SAMPLE_RATE {
        samples
    } else {
        resample(&samples, source_rate, TARGET_SAMPLE_RATE)?
    };

    let mut pcm = Vec::with_capacity(mono_16k.len() * 2);
    for sample in &mono_16k {
        let s = (sample.clamp(-1.0, 1.0) * 32767.0) as i16;
        pcm.extend_from_slice(&s.to_le_bytes());
    }

    let temp_wav = write_temp_wav(&pcm);
    Ok(NormalizedAudio {
        pcm,
        sample_rate: TARGET_SAMPLE_RATE,
        temp_wav,
    })
}

/// Returns the PCM data bytes directly when the file is a WAV already in the
/// target format; `None` hands off to the full decode path.
fn try_wav_fast_path(path: &Path) -> Result<Option<NormalizedAudio>, FormatError> {
    let mut reader = match hound::WavReader::open(path) {
        Ok(r) => r,
        Err(hound::Error::IoError(e)) => return Err(FormatError::Io(e)),
        // Not a parseable WAV container — let symphonia probe it.
        Err(_) => return Ok(None),
    };

    let spec = reader.spec();
    let already_target = spec.sample_rate == TARGET_SAMPLE_RATE
        && spec.channels == 1
        && spec.bits_per_sample == 16
        && spec.sample_format == hound::SampleFormat::Int;
    if !already_target {
        return Ok(None);
    }

    let mut pcm = Vec::new();
    for sample in reader.samples::<i16>() {
        let s = sample.map_err(map_hound)?;
        pcm.extend_from_slice(&s.to_le_bytes());
    }
    Ok(Some(NormalizedAudio {
        pcm,
        sample_rate: TARGET_SAMPLE_RATE,
        temp_wav: None,
    }))
}

fn map_hound(err: hound::Error) -> FormatError {
    match err {
        hound::Error::IoError(e) => FormatError::Io(e),
        other => FormatError::Unsupported(other.to_string()),
    }
}

fn conv_frames<T>(
    samples: &mut Vec<f32>,
    buf: &symphonia::core::audio::AudioBuffer<T>,
) where
    T: symphonia::core::sample::Sample,
    f32: FromSample<T>,
{
    let channels = buf.spec().channels.count();
    for frame in 0..buf.frames() {
        let mut acc = 0f32;
        for ch in 0..channels {
            acc += f32::from_sample(buf.chan(ch)[frame]);
        }
        samples.push(acc / channels as f32);
    }
}

/// Decode any symphonia-supported source to mono f32 at its native rate.
/// Multi-channel audio is downmixed by per-frame mean.
fn decode_to_mono_f32(path: &Path) -> Result<(Vec<f32>, u32), FormatError> {
    let src = std::fs::File::open(path)?;
    let mss = symphonia::core::io::MediaSourceStream::new(Box::new(src), Default::default());

    let hint = symphonia::core::probe::Hint::new();
    let probed = symphonia::default::get_probe()
        .format(&hint, mss, &Default::default(), &Default::default())
        .map_err(|e| FormatError::Unsupported(format!("could not probe container: {e}")))?;

    let mut format = probed.format;

    let track = format
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
        .ok_or_else(|| FormatError::Unsupported("no decodable audio tracks".to_string()))?;

    let mut decoder = symphonia::default::get_codecs()
        .make(&track.codec_params, &Default::default())
        .map_err(|_| FormatError::Unsupported("unsupported codec".to_string()))?;

    let track_id = track.id;
    let sample_rate = track
        .codec_params
        .sample_rate
        .ok_or_else(|| FormatError::Unsupported("source sample rate unknown".to_string()))?;

    let mut samples = Vec::new();
    while let Ok(packet) = format.next_packet() {
        if packet.track_id() != track_id {
            continue;
        }
        let decoded = decoder
            .decode(&packet)
            .map_err(|e| FormatError::Unsupported(format!("decode failed: {e}")))?;
        match decoded {
            AudioBufferRef::F32(data) => conv_frames(&mut samples, &data),
            AudioBufferRef::F64(data) => conv_frames(&mut samples, &data),
            AudioBufferRef::S8(data) => conv_frames(&mut samples, &data),
            AudioBufferRef::S16(data) => conv_frames(&mut samples, &data),
            AudioBufferRef::S24(data) => conv_frames(&mut samples, &data),
            AudioBufferRef::S32(data) => conv_frames(&mut samples, &data),
            AudioBufferRef::U8(data) => conv_frames(&mut samples, &data),
            AudioBufferRef::U16(data) => conv_frames(&mut samples, &data),
            AudioBufferRef::U24(data) => conv_frames(&mut samples, &data),
            AudioBufferRef::U32(data) => conv_frames(&mut samples, &data),
        }
    }

    if samples.is_empty() {
        return Err(FormatError::Unsupported(
            "source contained no audio frames".to_string(),
        ));
    }
    Ok((samples, sample_rate))
}

/// Fixed-ratio cubic resample of mono f32 audio. The tail is zero-padded to
/// a full rubato chunk, which adds at most ~64 ms of trailing silence.
fn resample(samples: &[f32], from_rate: u32, to_rate: u32) -> Result<Vec<f32>, FormatError> {
    let ratio = to_rate as f64 / from_rate as f64;
    let mut resampler = FastFixedIn::<f32>::new(
        ratio,
        1.0, // fixed ratio — no dynamic adjustment
        PolynomialDegree::Cubic,
        RESAMPLE_CHUNK,
        1, // mono
    )
    .map_err(|e| FormatError::Unsupported(format!("resampler init: {e}")))?;

    let max_out = resampler.output_frames_max();
    let mut output_buf = vec![vec![0f32; max_out]; 1];
    let mut result = Vec::with_capacity((samples.len() as f64 * ratio) as usize + max_out);

    let mut offset = 0;
    let mut padded = vec![0f32; RESAMPLE_CHUNK];
    while offset < samples.len() {
        let remaining = samples.len() - offset;
        let input: &[f32] = if remaining >= RESAMPLE_CHUNK {
            &samples[offset..offset + RESAMPLE_CHUNK]
        } else {
            padded[..remaining].copy_from_slice(&samples[offset..]);
            padded[remaining..].fill(0.0);
            &padded
        };

        let (_consumed, produced) = resampler
            .process_into_buffer(&[input], &mut output_buf, None)
            .map_err(|e| FormatError::Unsupported(format!("resample: {e}")))?;
        result.extend_from_slice(&output_buf[0][..produced]);
        offset += RESAMPLE_CHUNK;
    }

    Ok(result)
}

/// Write converted PCM to a temp WAV. Best-effort: a write failure is logged
/// and the caller simply gets no temp artifact.
fn write_temp_wav(pcm: &[u8]) -> Option<PathBuf> {
    let path = std::env::temp_dir().join(format!("sermo_{}.wav", uuid::Uuid::new_v4().simple()));
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate: TARGET_SAMPLE_RATE,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let write = || -> Result<(), hound::Error> {
        let mut writer = hound::WavWriter::create(&path, spec)?;
        for pair in pcm.chunks_exact(2) {
            writer.write_sample(i16::from_le_bytes([pair[0], pair[1]]))?;
        }
        writer.finalize()
    };

    match write() {
        Ok(()) => Some(path),
        Err(e) => {
            tracing::warn!("could not write temp wav: {}", e);
            None
        }
    }
}
