//! Speech isolation.
//!
//! Pipeline: vocal band-pass, spectral-gate noise reduction, harmonic/percussive
//! separation, then an energy VAD mask over the harmonic part. When the mask
//! retains too little of the original energy the result is replaced by plain
//! noise reduction of the unfiltered input.

use tracing::debug;

use super::dsp::{
    butterworth_bandpass, energy, filtfilt, frame_rms, mean_std, median_filter, moving_average,
    safe_ratio, Spectrogram, Stft,
};
use super::AudioTrack;

/// How the noise floor is estimated per frequency bin.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoiseProfile {
    /// One floor per bin over the whole clip
    Stationary,
    /// Floor tracks the signal with a slow time average
    NonStationary,
}

#[derive(Debug, Clone)]
pub struct IsolationConfig {
    pub low_hz: f32,
    pub high_hz: f32,
    pub filter_order: usize,
    /// Fraction of gated energy removed by noise reduction
    pub prop_decrease: f32,
    pub n_fft: usize,
    pub hop: usize,
    /// Median kernel (frames / bins) for harmonic-percussive separation
    pub hpss_kernel: usize,
    /// VAD threshold = mean_factor * mean + std_factor * std of frame RMS
    pub vad_mean_factor: f64,
    pub vad_std_factor: f64,
    pub mask_smoothing_secs: f32,
    /// Below this speech/original energy ratio the masked result is discarded
    pub min_speech_ratio: f64,
}

impl Default for IsolationConfig {
    fn default() -> Self {
        Self {
            low_hz: 80.0,
            high_hz: 3000.0,
            filter_order: 4,
            prop_decrease: 0.8,
            n_fft: 2048,
            hop: 512,
            hpss_kernel: 31,
            vad_mean_factor: 0.5,
            vad_std_factor: 0.1,
            mask_smoothing_secs: 0.05,
            min_speech_ratio: 0.1,
        }
    }
}

/// Result of the primary isolation pass.
#[derive(Debug, Clone)]
pub struct IsolationOutcome {
    pub track: AudioTrack,
    pub speech_ratio: f64,
    pub used_fallback: bool,
}

/// Isolate speech from `track`.
pub fn isolate_speech(track: &AudioTrack, config: &IsolationConfig) -> IsolationOutcome {
    let sr = track.sample_rate as f32;
    let stft = Stft::new(config.n_fft, config.hop);

    let sections = butterworth_bandpass(config.low_hz, config.high_hz, sr, config.filter_order);
    let filtered = filtfilt(&sections, &track.samples);

    let denoised = reduce_noise(
        &filtered,
        track.sample_rate,
        &stft,
        NoiseProfile::NonStationary,
        config.prop_decrease,
    );

    let harmonic = harmonic_component(&denoised, &stft, config.hpss_kernel);
    let mask = speech_mask(&harmonic, track.sample_rate, config);
    let speech: Vec<f32> = harmonic.iter().zip(&mask).map(|(s, m)| s * m).collect();

    let speech_ratio = safe_ratio(energy(&speech), energy(&track.samples));
    debug!(speech_ratio, "Speech isolation energy ratio");

    if speech_ratio < config.min_speech_ratio {
        let fallback = reduce_noise(
            &track.samples,
            track.sample_rate,
            &stft,
            NoiseProfile::NonStationary,
            1.0,
        );
        return IsolationOutcome {
            track: AudioTrack::new(fallback, track.sample_rate),
            speech_ratio,
            used_fallback: true,
        };
    }

    IsolationOutcome {
        track: AudioTrack::new(speech, track.sample_rate),
        speech_ratio,
        used_fallback: false,
    }
}

/// Spectral-gate noise reduction.
pub fn reduce_noise(
    samples: &[f32],
    sample_rate: u32,
    stft: &Stft,
    profile: NoiseProfile,
    prop_decrease: f32,
) -> Vec<f32> {
    let mut spec = stft.forward(samples);
    if spec.frames.is_empty() {
        return samples.to_vec();
    }
    let mags = spec.magnitudes();
    let bins = spec.bins();
    let floor_gain = 1.0 - prop_decrease.clamp(0.0, 1.0);

    let mask: Vec<Vec<f32>> = match profile {
        NoiseProfile::Stationary => {
            // Gate at mean + 1.5 std of the per-bin dB level.
            let thresholds: Vec<f32> = (0..bins)
                .map(|k| {
                    let db: Vec<f64> = mags
                        .iter()
                        .map(|frame| 20.0 * (frame[k] as f64).max(1e-10).log10())
                        .collect();
                    let (mean, std) = mean_std(&db);
                    (mean + 1.5 * std) as f32
                })
                .collect();
            mags.iter()
                .map(|frame| {
                    frame
                        .iter()
                        .zip(&thresholds)
                        .map(|(&m, &t)| {
                            if 20.0 * m.max(1e-10).log10() > t {
                                1.0
                            } else {
                                0.0
                            }
                        })
                        .collect()
                })
                .collect()
        }
        NoiseProfile::NonStationary => {
            let window =
                ((2.0 * sample_rate as f32 / spec.hop as f32) as usize).clamp(1, mags.len().max(1));
            let mut mask = vec![vec![0.0f32; bins]; mags.len()];
            for k in 0..bins {
                let column: Vec<f32> = mags.iter().map(|frame| frame[k]).collect();
                let floor = moving_average(&column, window);
                for (t, (&m, &f)) in column.iter().zip(&floor).enumerate() {
                    let f = f.max(1e-10);
                    let above = (m - f) / f;
                    mask[t][k] = 1.0 / (1.0 + (-10.0 * (above - 2.0)).exp());
                }
            }
            mask
        }
    };

    apply_gain(&mut spec, |t, k| {
        let m = mask[t][k];
        m + (1.0 - m) * floor_gain
    });
    stft.inverse(&spec, samples.len())
}

/// Harmonic part of a median-filter harmonic/percussive split (soft masks).
pub fn harmonic_component(samples: &[f32], stft: &Stft, kernel: usize) -> Vec<f32> {
    let mut spec = stft.forward(samples);
    if spec.frames.is_empty() {
        return samples.to_vec();
    }
    let mags = spec.magnitudes();
    let bins = spec.bins();
    let frames = mags.len();

    // Harmonic: smooth across time within each bin.
    let mut harmonic = vec![vec![0.0f32; bins]; frames];
    for k in 0..bins {
        let column: Vec<f32> = mags.iter().map(|frame| frame[k]).collect();
        for (t, value) in median_filter(&column, kernel).into_iter().enumerate() {
            harmonic[t][k] = value;
        }
    }
    // Percussive: smooth across frequency within each frame.
    let percussive: Vec<Vec<f32>> = mags.iter().map(|frame| median_filter(frame, kernel)).collect();

    apply_gain(&mut spec, |t, k| {
        let h = harmonic[t][k] * harmonic[t][k];
        let p = percussive[t][k] * percussive[t][k];
        if h + p > 1e-20 {
            h / (h + p)
        } else {
            0.0
        }
    });
    stft.inverse(&spec, samples.len())
}

/// Smoothed 0..1 per-sample mask from frame-energy voice activity.
fn speech_mask(samples: &[f32], sample_rate: u32, config: &IsolationConfig) -> Vec<f32> {
    let rms = frame_rms(samples, config.n_fft, config.hop);
    let values: Vec<f64> = rms.iter().map(|&r| r as f64).collect();
    let (mean, std) = mean_std(&values);
    let threshold = config.vad_mean_factor * mean + config.vad_std_factor * std;

    let mut mask = vec![0.0f32; samples.len()];
    for (i, &r) in values.iter().enumerate() {
        if r > threshold {
            let start = (i * config.hop).min(samples.len());
            let end = (start + config.n_fft).min(samples.len());
            mask[start..end].iter_mut().for_each(|m| *m = 1.0);
        }
    }

    let window = (sample_rate as f32 * config.mask_smoothing_secs) as usize;
    moving_average(&mask, window)
        .into_iter()
        .map(|m| m.min(1.0))
        .collect()
}

fn apply_gain(spec: &mut Spectrogram, gain: impl Fn(usize, usize) -> f32) {
    for (t, frame) in spec.frames.iter_mut().enumerate() {
        for (k, bin) in frame.iter_mut().enumerate() {
            *bin *= gain(t, k);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f32::consts::PI;

    fn voiced(sr: u32, secs: f32) -> Vec<f32> {
        // Bursts of a 180 Hz tone with harmonics, separated by short gaps.
        (0..(sr as f32 * secs) as usize)
            .map(|i| {
                let t = i as f32 / sr as f32;
                let on = (t * 2.0).fract() < 0.7;
                if on {
                    0.4 * (2.0 * PI * 180.0 * t).sin() + 0.2 * (2.0 * PI * 360.0 * t).sin()
                } else {
                    0.0
                }
            })
            .collect()
    }

    #[test]
    fn test_silence_stays_silent() {
        let track = AudioTrack::new(vec![0.0; 22_050], 22_050);
        let outcome = isolate_speech(&track, &IsolationConfig::default());

        assert!(outcome.used_fallback);
        assert_eq!(outcome.speech_ratio, 0.0);
        assert_eq!(outcome.track.samples.len(), track.samples.len());
        assert!(outcome.track.samples.iter().all(|s| s.abs() < 1e-6));
    }

    #[test]
    fn test_voiced_signal_keeps_length_and_energy() {
        let track = AudioTrack::new(voiced(16_000, 2.0), 16_000);
        let outcome = isolate_speech(&track, &IsolationConfig::default());

        assert_eq!(outcome.track.samples.len(), track.samples.len());
        assert!(outcome.track.samples.iter().all(|s| s.is_finite()));
        assert!(energy(&outcome.track.samples) > 0.0);
    }

    #[test]
    fn test_fallback_is_non_stationary_reduction() {
        let track = AudioTrack::new(voiced(16_000, 1.0), 16_000);
        let config = IsolationConfig {
            min_speech_ratio: f64::INFINITY,
            ..IsolationConfig::default()
        };
        let outcome = isolate_speech(&track, &config);

        let stft = Stft::new(config.n_fft, config.hop);
        let expected = reduce_noise(
            &track.samples,
            track.sample_rate,
            &stft,
            NoiseProfile::NonStationary,
            1.0,
        );
        assert!(outcome.used_fallback);
        assert_eq!(outcome.track.samples, expected);
    }

    #[test]
    fn test_mask_is_capped() {
        let samples = voiced(16_000, 1.0);
        let mask = speech_mask(&samples, 16_000, &IsolationConfig::default());

        assert_eq!(mask.len(), samples.len());
        assert!(mask.iter().all(|&m| (0.0..=1.0).contains(&m)));
        assert!(mask.iter().any(|&m| m > 0.99));
    }

    #[test]
    fn test_stationary_reduction_passes_loud_tone() {
        let sr = 16_000;
        let mut samples: Vec<f32> = (0..sr)
            .map(|i| 0.001 * ((i * 7919 % 101) as f32 / 50.0 - 1.0))
            .collect();
        // The tone covers the last fifth so it sits well above the per-bin gate.
        let onset = sr * 4 / 5;
        for (i, s) in samples.iter_mut().enumerate().skip(onset) {
            *s += 0.5 * (2.0 * PI * 300.0 * i as f32 / sr as f32).sin();
        }
        let stft = Stft::new(1024, 256);
        let out = reduce_noise(&samples, sr as u32, &stft, NoiseProfile::Stationary, 1.0);

        let first = energy(&out[..sr / 2]);
        let second = energy(&out[onset + 1024..]);
        assert!(second > first * 100.0);
    }
}
