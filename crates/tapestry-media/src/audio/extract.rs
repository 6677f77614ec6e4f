//! Audio decoding and WAV output.

use std::path::Path;

use tracing::debug;

use super::AudioTrack;
use crate::command::{FfmpegCommand, FfmpegRunner};
use crate::error::{MediaError, MediaResult};

/// Sample rate of the WAV handed to transcription.
pub const TRANSCRIPTION_SAMPLE_RATE: u32 = 16_000;
/// Sample rate used for isolation and feature analysis.
pub const ANALYSIS_SAMPLE_RATE: u32 = 22_050;

/// Extract the audio stream of `input` as 16 kHz mono 16-bit WAV.
pub async fn extract_wav(
    input: impl AsRef<Path>,
    output: impl AsRef<Path>,
    runner: &FfmpegRunner,
) -> MediaResult<()> {
    let input = input.as_ref();
    let output = output.as_ref();

    let cmd = FfmpegCommand::new(input, output)
        .no_video()
        .mono_audio(TRANSCRIPTION_SAMPLE_RATE)
        .output_args(["-acodec", "pcm_s16le"]);

    runner.run(&cmd).await.map_err(|e| match e {
        // FFmpeg refuses to write an empty output when there is no audio stream
        MediaError::FfmpegFailed { .. } => MediaError::NoAudioData(input.to_path_buf()),
        other => other,
    })?;

    match tokio::fs::metadata(output).await {
        Ok(meta) if meta.len() > 44 => {
            debug!(input = %input.display(), output = %output.display(), "Extracted audio");
            Ok(())
        }
        _ => Err(MediaError::NoAudioData(input.to_path_buf())),
    }
}

/// Decode `input` to mono `f32` samples at `sample_rate`.
pub async fn load_track(
    input: impl AsRef<Path>,
    sample_rate: u32,
    runner: &FfmpegRunner,
) -> MediaResult<AudioTrack> {
    let input = input.as_ref();
    let cmd = FfmpegCommand::to_stdout(input)
        .no_video()
        .mono_audio(sample_rate)
        .format("f32le");

    let bytes = runner.run_to_bytes(&cmd).await?;
    let samples = decode_f32le(&bytes);
    if samples.is_empty() {
        return Err(MediaError::NoAudioData(input.to_path_buf()));
    }
    Ok(AudioTrack::new(samples, sample_rate))
}

fn decode_f32le(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(4)
        .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .collect()
}

/// Write `track` as 16-bit mono PCM.
pub fn write_wav(track: &AudioTrack, path: impl AsRef<Path>) -> MediaResult<()> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate: track.sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut writer = hound::WavWriter::create(path.as_ref(), spec)?;
    for &sample in &track.samples {
        let value = (sample.clamp(-1.0, 1.0) * i16::MAX as f32).round() as i16;
        writer.write_sample(value)?;
    }
    writer.finalize()?;
    Ok(())
}

/// Copy the `[start_secs, end_secs)` span of a 16-bit WAV into `output`.
///
/// Returns the number of samples written; an empty or out-of-range span
/// writes nothing and returns 0.
pub fn write_wav_segment(
    input: impl AsRef<Path>,
    output: impl AsRef<Path>,
    start_secs: f64,
    end_secs: f64,
) -> MediaResult<usize> {
    let mut reader = hound::WavReader::open(input.as_ref())?;
    let spec = reader.spec();
    let per_second = spec.sample_rate as f64 * spec.channels as f64;
    let start = (start_secs.max(0.0) * per_second) as usize;
    let end = (end_secs.max(0.0) * per_second) as usize;
    if end <= start {
        return Ok(0);
    }

    let samples = reader
        .samples::<i16>()
        .skip(start)
        .take(end - start)
        .collect::<Result<Vec<_>, _>>()?;
    if samples.is_empty() {
        return Ok(0);
    }

    let mut writer = hound::WavWriter::create(output.as_ref(), spec)?;
    for &sample in &samples {
        writer.write_sample(sample)?;
    }
    writer.finalize()?;
    Ok(samples.len())
}
