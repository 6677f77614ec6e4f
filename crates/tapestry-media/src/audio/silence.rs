//! Silence trimming and per-chunk loudness normalization.

use std::ops::Range;

use super::dsp::{dbfs, energy};
use super::AudioTrack;
use crate::error::{MediaError, MediaResult};

#[derive(Debug, Clone)]
pub struct SilenceConfig {
    /// Shortest run of quiet audio treated as silence
    pub min_silence_ms: u32,
    /// Silence threshold relative to the whole track's dBFS
    pub threshold_offset_db: f64,
    /// Audio kept on each side of a speech region
    pub keep_silence_ms: u32,
    /// Loudness each region is normalized to
    pub target_dbfs: f64,
}

impl Default for SilenceConfig {
    fn default() -> Self {
        Self {
            min_silence_ms: 300,
            threshold_offset_db: -40.0,
            keep_silence_ms: 100,
            target_dbfs: -15.0,
        }
    }
}

/// Drop silent stretches and normalize what remains.
///
/// Fails when the track holds no audible region; callers keep their input
/// in that case.
pub fn trim_silence(track: &AudioTrack, config: &SilenceConfig) -> MediaResult<AudioTrack> {
    let regions = nonsilent_regions(track, config);
    if regions.is_empty() {
        return Err(MediaError::analysis_failed("no non-silent audio found"));
    }

    let mut samples = Vec::with_capacity(track.samples.len());
    for region in regions {
        let chunk = &track.samples[region];
        let level = dbfs(chunk);
        if level.is_finite() {
            let gain = 10f64.powf((config.target_dbfs - level) / 20.0) as f32;
            samples.extend(chunk.iter().map(|s| (s * gain).clamp(-1.0, 1.0)));
        } else {
            samples.extend_from_slice(chunk);
        }
    }

    Ok(AudioTrack::new(samples, track.sample_rate))
}

/// Padded sample ranges of audible audio, in order and non-overlapping.
pub fn nonsilent_regions(track: &AudioTrack, config: &SilenceConfig) -> Vec<Range<usize>> {
    let overall = dbfs(&track.samples);
    if !overall.is_finite() {
        return Vec::new();
    }

    let ms = |value: u32| (track.sample_rate as u64 * value as u64 / 1000) as usize;
    let chunk_len = ms(config.min_silence_ms).max(1);
    let pad = ms(config.keep_silence_ms);
    let threshold = 10f64.powf((overall + config.threshold_offset_db) / 20.0);
    let len = track.samples.len();

    let mut regions: Vec<Range<usize>> = Vec::new();
    for (i, chunk) in track.samples.chunks(chunk_len).enumerate() {
        let rms = (energy(chunk) / chunk.len() as f64).sqrt();
        if rms < threshold {
            continue;
        }
        let start = (i * chunk_len).saturating_sub(pad);
        let end = (i * chunk_len + chunk.len() + pad).min(len);
        match regions.last_mut() {
            Some(last) if start <= last.end => last.end = end,
            _ => regions.push(start..end),
        }
    }
    regions
}
