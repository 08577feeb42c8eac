//! Audio playback to speakers

use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU8, AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{SampleRate, StreamConfig};

use super::AudioSink;
use crate::{Error, Result};

/// Sample rate for playback (matches the synthesized WAV format)
const PLAYBACK_SAMPLE_RATE: u32 = 24000;

/// Highest volume knob position
pub const MAX_VOLUME: u8 = 10;

/// Shared volume knob, 0 (muted) to 10 (full)
#[derive(Debug, Clone)]
pub struct Volume(Arc<AtomicU8>);

impl Default for Volume {
    fn default() -> Self {
        Self(Arc::new(AtomicU8::new(MAX_VOLUME)))
    }
}

impl Volume {
    #[must_use]
    pub fn new(level: u8) -> Self {
        Self(Arc::new(AtomicU8::new(level.min(MAX_VOLUME))))
    }

    /// Set the knob, clamping to the valid range
    pub fn set(&self, level: u8) {
        let level = level.min(MAX_VOLUME);
        self.0.store(level, Ordering::Relaxed);
        tracing::info!(level, "volume changed");
    }

    #[must_use]
    pub fn get(&self) -> u8 {
        self.0.load(Ordering::Relaxed)
    }

    /// Linear gain for the current level
    #[must_use]
    pub fn gain(&self) -> f32 {
        f32::from(self.get()) / f32::from(MAX_VOLUME)
    }
}

/// Plays artifacts on the default output device
pub struct CpalSink {
    config: StreamConfig,
    volume: Volume,
}

impl CpalSink {
    /// Open the default output device
    ///
    /// # Errors
    ///
    /// Returns error if no output device or suitable config is available
    pub fn new(volume: Volume) -> Result<Self> {
        let host = cpal::default_host();

        let device = host
            .default_output_device()
            .ok_or_else(|| Error::Audio("no output device available".to_string()))?;

        let supported_config = device
            .supported_output_configs()
            .map_err(|e| Error::Audio(e.to_string()))?
            .find(|c| {
                c.channels() == 1
                    && c.min_sample_rate() <= SampleRate(PLAYBACK_SAMPLE_RATE)
                    && c.max_sample_rate() >= SampleRate(PLAYBACK_SAMPLE_RATE)
            })
            .or_else(|| {
                // Fallback: try stereo
                device.supported_output_configs().ok()?.find(|c| {
                    c.channels() == 2
                        && c.min_sample_rate() <= SampleRate(PLAYBACK_SAMPLE_RATE)
                        && c.max_sample_rate() >= SampleRate(PLAYBACK_SAMPLE_RATE)
                })
            })
            .ok_or_else(|| Error::Audio("no suitable output config found".to_string()))?;

        let config = supported_config
            .with_sample_rate(SampleRate(PLAYBACK_SAMPLE_RATE))
            .config();

        tracing::debug!(
            device = device.name().unwrap_or_default(),
            sample_rate = PLAYBACK_SAMPLE_RATE,
            channels = config.channels,
            "audio playback initialized"
        );

        Ok(Self { config, volume })
    }
}

#[async_trait]
impl AudioSink for CpalSink {
    async fn play(&self, path: &Path) -> Result<()> {
        let bytes = tokio::fs::read(path).await?;
        let (samples, rate) = decode_audio(&bytes)?;
        let samples = if rate == PLAYBACK_SAMPLE_RATE {
            samples
        } else {
            resample_audio(&samples, rate, PLAYBACK_SAMPLE_RATE)?
        };

        let config = self.config.clone();
        let gain = self.volume.gain();
        let path: PathBuf = path.to_path_buf();

        tokio::task::spawn_blocking(move || play_samples_blocking(&config, samples, gain))
            .await
            .map_err(|e| Error::Audio(format!("playback task failed: {e}")))??;

        tracing::debug!(path = %path.display(), "played artifact");
        Ok(())
    }
}

/// Sink for machines without an output device; logs and discards
#[derive(Debug, Default)]
pub struct NullSink;

#[async_trait]
impl AudioSink for NullSink {
    async fn play(&self, path: &Path) -> Result<()> {
        tracing::info!(path = %path.display(), "no audio output, skipping playback");
        Ok(())
    }
}

/// Play samples and block until the stream has drained
fn play_samples_blocking(config: &StreamConfig, samples: Vec<f32>, gain: f32) -> Result<()> {
    if samples.is_empty() || gain <= 0.0 {
        return Ok(());
    }

    let host = cpal::default_host();
    let device = host
        .default_output_device()
        .ok_or_else(|| Error::Audio("no output device".to_string()))?;

    let channels = usize::from(config.channels);
    let sample_count = samples.len();

    let samples = Arc::new(samples);
    let position = Arc::new(AtomicUsize::new(0));
    let finished = Arc::new(AtomicBool::new(false));

    let samples_clone = Arc::clone(&samples);
    let position_clone = Arc::clone(&position);
    let finished_clone = Arc::clone(&finished);

    let stream = device
        .build_output_stream(
            config,
            move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                let mut pos = position_clone.load(Ordering::Relaxed);

                for frame in data.chunks_mut(channels) {
                    let sample = samples_clone.get(pos).map_or_else(
                        || {
                            finished_clone.store(true, Ordering::Release);
                            0.0
                        },
                        |s| s * gain,
                    );

                    for out in frame.iter_mut() {
                        *out = sample;
                    }

                    if pos < samples_clone.len() {
                        pos += 1;
                    }
                }

                position_clone.store(pos, Ordering::Relaxed);
            },
            |err| {
                tracing::error!(error = %err, "audio playback error");
            },
            None,
        )
        .map_err(|e| Error::Audio(e.to_string()))?;

    stream.play().map_err(|e| Error::Audio(e.to_string()))?;

    let duration_ms = (sample_count as u64 * 1000) / u64::from(PLAYBACK_SAMPLE_RATE);

    // Poll for completion with timeout
    let start = Instant::now();
    let timeout = Duration::from_millis(duration_ms + 500);

    while !finished.load(Ordering::Acquire) {
        if start.elapsed() > timeout {
            tracing::warn!(samples = sample_count, "playback timed out");
            break;
        }
        std::thread::sleep(Duration::from_millis(50));
    }

    drop(stream);
    tracing::debug!(samples = sample_count, "playback complete");

    Ok(())
}

/// Decode a WAV or MP3 file into mono f32 samples and its sample rate
///
/// # Errors
///
/// Returns error if the bytes are neither a readable WAV nor MP3
pub fn decode_audio(data: &[u8]) -> Result<(Vec<f32>, u32)> {
    if data.starts_with(b"RIFF") {
        decode_wav(data)
    } else {
        decode_mp3(data)
    }
}

fn decode_wav(data: &[u8]) -> Result<(Vec<f32>, u32)> {
    let mut reader = hound::WavReader::new(Cursor::new(data))
        .map_err(|e| Error::Audio(format!("WAV decode error: {e}")))?;
    let spec = reader.spec();

    let interleaved: Vec<f32> = match spec.sample_format {
        hound::SampleFormat::Float => reader
            .samples::<f32>()
            .collect::<std::result::Result<_, _>>()
            .map_err(|e| Error::Audio(format!("WAV decode error: {e}")))?,
        hound::SampleFormat::Int => {
            #[allow(clippy::cast_precision_loss)]
            let scale = (1_i64 << (spec.bits_per_sample.saturating_sub(1))) as f32;
            reader
                .samples::<i32>()
                .map(|s| s.map(|v| to_f32(v) / scale))
                .collect::<std::result::Result<_, _>>()
                .map_err(|e| Error::Audio(format!("WAV decode error: {e}")))?
        }
    };

    Ok((downmix(&interleaved, usize::from(spec.channels)), spec.sample_rate))
}

#[allow(clippy::cast_precision_loss)]
fn to_f32(v: i32) -> f32 {
    v as f32
}

/// Decode MP3 bytes to f32 samples
fn decode_mp3(mp3_data: &[u8]) -> Result<(Vec<f32>, u32)> {
    let mut decoder = minimp3::Decoder::new(Cursor::new(mp3_data));
    let mut samples = Vec::new();
    let mut sample_rate = None;

    loop {
        match decoder.next_frame() {
            Ok(frame) => {
                sample_rate.get_or_insert(frame.sample_rate);
                let frame_samples: Vec<f32> =
                    frame.data.iter().map(|&s| f32::from(s) / 32768.0).collect();
                samples.extend(downmix(&frame_samples, frame.channels));
            }
            Err(minimp3::Error::Eof) => break,
            Err(e) => return Err(Error::Audio(format!("MP3 decode error: {e}"))),
        }
    }

    let rate = sample_rate
        .and_then(|r| u32::try_from(r).ok())
        .ok_or_else(|| Error::Audio("MP3 contained no frames".to_string()))?;
    Ok((samples, rate))
}

/// Average interleaved channels down to mono
fn downmix(interleaved: &[f32], channels: usize) -> Vec<f32> {
    if channels <= 1 {
        return interleaved.to_vec();
    }

    #[allow(clippy::cast_precision_loss)]
    let count = channels as f32;
    interleaved
        .chunks(channels)
        .map(|frame| frame.iter().sum::<f32>() / count)
        .collect()
}

/// Resample audio between sample rates
#[allow(clippy::cast_possible_truncation)]
fn resample_audio(samples: &[f32], from_rate: u32, to_rate: u32) -> Result<Vec<f32>> {
    use rubato::{FftFixedIn, Resampler};

    let chunk_size = 1024;
    let sub_chunks = 2;

    let mut resampler =
        FftFixedIn::<f64>::new(from_rate as usize, to_rate as usize, chunk_size, sub_chunks, 1)
            .map_err(|e| Error::Audio(format!("resampler init failed: {e}")))?;

    let input: Vec<f64> = samples.iter().map(|&s| f64::from(s)).collect();
    let mut output = Vec::new();

    for chunk in input.chunks(chunk_size) {
        // Pad the tail so the last partial chunk is not dropped
        let mut block = chunk.to_vec();
        block.resize(chunk_size, 0.0);

        let result = resampler
            .process(&[block], None)
            .map_err(|e| Error::Audio(format!("resample failed: {e}")))?;
        output.extend_from_slice(&result[0]);
    }

    Ok(output.iter().map(|&s| s as f32).collect())
}
