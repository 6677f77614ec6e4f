//! Acoustic metrics over an isolated speech track.
//!
//! Every metric is defined for silent or empty input and reports 0.0 rather
//! than dividing by zero.

use std::sync::Arc;

use rustfft::num_complex::Complex32;
use rustfft::{Fft, FftPlanner};
use tapestry_models::{
    AudioFeatures, PitchMetrics, SpeechRateMetrics, VoiceQualityMetrics, VolumeMetrics,
};

use super::dsp::{frame_rms, mean_std, safe_ratio, Stft};
use super::AudioTrack;

const PITCH_MIN_HZ: f32 = 75.0;
const PITCH_MAX_HZ: f32 = 500.0;
const PITCH_FRAME_SECS: f32 = 0.04;
const PITCH_HOP_SECS: f32 = 0.01;
/// Normalized autocorrelation peak needed to call a frame voiced
const VOICING_THRESHOLD: f32 = 0.45;
/// Frames quieter than this fraction of the loudest frame are never voiced
const VOICING_ENERGY_FLOOR: f32 = 0.05;

const RMS_FRAME: usize = 2048;
const RMS_HOP: usize = 512;
const QUIET_FRACTION: f64 = 0.1;

const ONSET_WAIT_FRAMES: usize = 3;
const ONSET_DELTA: f32 = 0.07;

/// Compute all metrics for `track`.
pub fn analyze_track(track: &AudioTrack) -> AudioFeatures {
    let periods = voiced_periods(track);
    let rms = frame_rms(&track.samples, RMS_FRAME, RMS_HOP);

    AudioFeatures {
        pitch: pitch_metrics(&periods),
        volume: volume_metrics(&rms),
        speech_rate: speech_rate_metrics(track, &rms),
        voice_quality: voice_quality_metrics(&periods),
    }
}

/// Per-frame pitch estimate for a voiced frame.
#[derive(Debug, Clone, Copy)]
struct VoicedFrame {
    index: usize,
    f0: f64,
    /// Normalized autocorrelation at the pitch lag
    correlation: f64,
    peak: f64,
}

fn voiced_periods(track: &AudioTrack) -> Vec<VoicedFrame> {
    let sr = track.sample_rate as f32;
    let frame_len = (sr * PITCH_FRAME_SECS) as usize;
    let hop = (sr * PITCH_HOP_SECS).max(1.0) as usize;
    let min_lag = (sr / PITCH_MAX_HZ).floor().max(1.0) as usize;
    let max_lag = (sr / PITCH_MIN_HZ).ceil() as usize;
    if frame_len <= max_lag + 1 || track.samples.len() < frame_len {
        return Vec::new();
    }

    let frames: Vec<&[f32]> = track
        .samples
        .windows(frame_len)
        .step_by(hop)
        .collect();
    let loudest = frames
        .iter()
        .map(|f| frame_energy(f))
        .fold(0.0f32, f32::max);
    if loudest <= 0.0 {
        return Vec::new();
    }

    let autocorr = Autocorrelation::new(frame_len);
    frames
        .iter()
        .enumerate()
        .filter_map(|(index, frame)| {
            if frame_energy(frame) < loudest * VOICING_ENERGY_FLOOR {
                return None;
            }
            let ac = autocorr.compute(frame);
            if ac[0] <= 0.0 {
                return None;
            }
            let (lag, value) = (min_lag..=max_lag.min(ac.len() - 2))
                .map(|lag| (lag, ac[lag]))
                .max_by(|a, b| a.1.total_cmp(&b.1))?;
            // Lag is picked on the biased estimate; strength uses the unbiased one.
            let correlation = value / ac[0] * frame_len as f32 / (frame_len - lag) as f32;
            if correlation < VOICING_THRESHOLD {
                return None;
            }
            let refined = parabolic_peak(ac[lag - 1], ac[lag], ac[lag + 1]) + lag as f32;
            let peak = frame.iter().fold(0.0f32, |m, s| m.max(s.abs()));
            Some(VoicedFrame {
                index,
                f0: (sr / refined) as f64,
                correlation: correlation.min(1.0) as f64,
                peak: peak as f64,
            })
        })
        .collect()
}

fn frame_energy(frame: &[f32]) -> f32 {
    frame.iter().map(|s| s * s).sum::<f32>() / frame.len().max(1) as f32
}

/// Offset of the vertex of the parabola through three samples around a peak.
fn parabolic_peak(left: f32, center: f32, right: f32) -> f32 {
    let denom = left - 2.0 * center + right;
    if denom.abs() < f32::EPSILON {
        0.0
    } else {
        (0.5 * (left - right) / denom).clamp(-0.5, 0.5)
    }
}

/// FFT autocorrelation of a fixed-size frame with the mean removed.
struct Autocorrelation {
    size: usize,
    forward: Arc<dyn Fft<f32>>,
    inverse: Arc<dyn Fft<f32>>,
}

impl Autocorrelation {
    fn new(frame_len: usize) -> Self {
        let size = (2 * frame_len).next_power_of_two();
        let mut planner = FftPlanner::new();
        Self {
            size,
            forward: planner.plan_fft_forward(size),
            inverse: planner.plan_fft_inverse(size),
        }
    }

    fn compute(&self, frame: &[f32]) -> Vec<f32> {
        let mean = frame.iter().sum::<f32>() / frame.len().max(1) as f32;
        let mut buf = vec![Complex32::new(0.0, 0.0); self.size];
        for (slot, &s) in buf.iter_mut().zip(frame) {
            *slot = Complex32::new(s - mean, 0.0);
        }
        self.forward.process(&mut buf);
        for c in buf.iter_mut() {
            *c = Complex32::new(c.norm_sqr(), 0.0);
        }
        self.inverse.process(&mut buf);
        buf[..frame.len()].iter().map(|c| c.re).collect()
    }
}

fn pitch_metrics(voiced: &[VoicedFrame]) -> PitchMetrics {
    if voiced.is_empty() {
        return PitchMetrics::default();
    }
    let f0: Vec<f64> = voiced.iter().map(|v| v.f0).collect();
    let (mean, std) = mean_std(&f0);
    let min = f0.iter().copied().fold(f64::INFINITY, f64::min);
    let max = f0.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    PitchMetrics {
        mean,
        min,
        max,
        range: max - min,
        std,
        variability: safe_ratio(std, mean),
    }
}

fn volume_metrics(rms: &[f32]) -> VolumeMetrics {
    if rms.is_empty() {
        return VolumeMetrics::default();
    }
    let values: Vec<f64> = rms.iter().map(|&r| r as f64).collect();
    let (mean, std) = mean_std(&values);
    let max = values.iter().copied().fold(0.0, f64::max);
    let quiet = values.iter().filter(|&&v| v < QUIET_FRACTION * mean).count();
    VolumeMetrics {
        mean,
        max,
        std,
        dynamics: safe_ratio(std, mean),
        silence_ratio: quiet as f64 / values.len() as f64,
    }
}

fn speech_rate_metrics(track: &AudioTrack, rms: &[f32]) -> SpeechRateMetrics {
    let duration = track.duration_secs();
    if duration <= 0.0 {
        return SpeechRateMetrics::default();
    }

    let onsets = onset_count(&track.samples);

    let values: Vec<f64> = rms.iter().map(|&r| r as f64).collect();
    let (mean, _) = mean_std(&values);
    let mut pauses = Vec::new();
    let mut run = 0usize;
    for &v in &values {
        if v < QUIET_FRACTION * mean {
            run += 1;
        } else if run > 0 {
            pauses.push(run);
            run = 0;
        }
    }
    if run > 0 {
        pauses.push(run);
    }

    let frame_secs = RMS_HOP as f64 / track.sample_rate as f64;
    let avg_pause_duration = if pauses.is_empty() {
        0.0
    } else {
        pauses.iter().sum::<usize>() as f64 * frame_secs / pauses.len() as f64
    };

    SpeechRateMetrics {
        onsets_per_second: onsets as f64 / duration,
        pause_frequency: pauses.len() as f64 / duration,
        avg_pause_duration,
    }
}

/// Spectral-flux onsets with local-max peak picking.
fn onset_count(samples: &[f32]) -> usize {
    let spec = Stft::new(RMS_FRAME, RMS_HOP).forward(samples);
    let mags = spec.magnitudes();
    if mags.len() < 2 {
        return 0;
    }

    let mut flux = vec![0.0f32];
    for pair in mags.windows(2) {
        let rise: f32 = pair[1]
            .iter()
            .zip(&pair[0])
            .map(|(cur, prev)| (cur - prev).max(0.0))
            .sum();
        flux.push(rise);
    }
    let peak = flux.iter().copied().fold(0.0f32, f32::max);
    if peak <= 0.0 {
        return 0;
    }
    flux.iter_mut().for_each(|f| *f /= peak);

    let mut count = 0;
    let mut last: Option<usize> = None;
    for t in 0..flux.len() {
        let lo = t.saturating_sub(ONSET_WAIT_FRAMES);
        let hi = (t + ONSET_WAIT_FRAMES + 1).min(flux.len());
        let window = &flux[lo..hi];
        let local_max = window.iter().copied().fold(0.0f32, f32::max);
        let local_mean = window.iter().sum::<f32>() / window.len() as f32;
        let spaced = last.map_or(true, |l| t - l > ONSET_WAIT_FRAMES);
        if flux[t] > 0.0 && flux[t] >= local_max && flux[t] >= local_mean + ONSET_DELTA && spaced
        {
            count += 1;
            last = Some(t);
        }
    }
    count
}

fn voice_quality_metrics(voiced: &[VoicedFrame]) -> VoiceQualityMetrics {
    if voiced.is_empty() {
        return VoiceQualityMetrics::default();
    }

    let hnr_values: Vec<f64> = voiced
        .iter()
        .map(|v| {
            let r = v.correlation.clamp(1e-6, 0.999_999);
            10.0 * (r / (1.0 - r)).log10()
        })
        .collect();
    let (hnr, _) = mean_std(&hnr_values);

    let periods: Vec<f64> = voiced.iter().map(|v| 1.0 / v.f0).collect();
    let peaks: Vec<f64> = voiced.iter().map(|v| v.peak).collect();

    VoiceQualityMetrics {
        hnr,
        jitter: consecutive_perturbation(voiced, &periods),
        shimmer: consecutive_perturbation(voiced, &peaks),
    }
}

/// Mean absolute difference between adjacent voiced frames, relative to the mean.
fn consecutive_perturbation(voiced: &[VoicedFrame], values: &[f64]) -> f64 {
    let diffs: Vec<f64> = voiced
        .windows(2)
        .zip(values.windows(2))
        .filter(|(frames, _)| frames[1].index == frames[0].index + 1)
        .map(|(_, v)| (v[1] - v[0]).abs())
        .collect();
    if diffs.is_empty() {
        return 0.0;
    }
    let (mean, _) = mean_std(values);
    let (mean_diff, _) = mean_std(&diffs);
    safe_ratio(mean_diff, mean)
}
