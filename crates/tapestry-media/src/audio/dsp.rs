//! Signal-processing building blocks for speech analysis.

use std::f32::consts::PI;
use std::sync::Arc;

use rustfft::num_complex::Complex32;
use rustfft::{Fft, FftPlanner};

/// Periodic Hann window.
pub fn hann(n: usize) -> Vec<f32> {
    (0..n)
        .map(|i| 0.5 - 0.5 * (2.0 * PI * i as f32 / n as f32).cos())
        .collect()
}

/// Complex spectrogram, `frames[t][bin]` with `n_fft / 2 + 1` bins per frame.
#[derive(Debug, Clone)]
pub struct Spectrogram {
    pub frames: Vec<Vec<Complex32>>,
    pub n_fft: usize,
    pub hop: usize,
}

impl Spectrogram {
    pub fn bins(&self) -> usize {
        self.n_fft / 2 + 1
    }

    pub fn magnitudes(&self) -> Vec<Vec<f32>> {
        self.frames
            .iter()
            .map(|frame| frame.iter().map(|c| c.norm()).collect())
            .collect()
    }
}

/// Centered short-time Fourier transform with a Hann window.
pub struct Stft {
    n_fft: usize,
    hop: usize,
    window: Vec<f32>,
    forward: Arc<dyn Fft<f32>>,
    inverse: Arc<dyn Fft<f32>>,
}

impl Stft {
    pub fn new(n_fft: usize, hop: usize) -> Self {
        let mut planner = FftPlanner::new();
        Self {
            n_fft,
            hop,
            window: hann(n_fft),
            forward: planner.plan_fft_forward(n_fft),
            inverse: planner.plan_fft_inverse(n_fft),
        }
    }

    pub fn forward(&self, signal: &[f32]) -> Spectrogram {
        let pad = self.n_fft / 2;
        let padded = reflect_pad(signal, pad);
        let n_frames = if signal.is_empty() {
            0
        } else {
            1 + signal.len() / self.hop
        };
        let bins = self.n_fft / 2 + 1;

        let mut frames = Vec::with_capacity(n_frames);
        let mut buf = vec![Complex32::new(0.0, 0.0); self.n_fft];
        for t in 0..n_frames {
            let start = t * self.hop;
            for (i, slot) in buf.iter_mut().enumerate() {
                let sample = padded.get(start + i).copied().unwrap_or(0.0);
                *slot = Complex32::new(sample * self.window[i], 0.0);
            }
            self.forward.process(&mut buf);
            frames.push(buf[..bins].to_vec());
        }

        Spectrogram {
            frames,
            n_fft: self.n_fft,
            hop: self.hop,
        }
    }

    /// Weighted overlap-add inverse, trimmed to `len` samples.
    pub fn inverse(&self, spec: &Spectrogram, len: usize) -> Vec<f32> {
        let pad = self.n_fft / 2;
        let total = pad * 2 + len.max(spec.frames.len().saturating_sub(1) * self.hop);
        let mut out = vec![0.0f32; total + self.n_fft];
        let mut norm = vec![0.0f32; total + self.n_fft];
        let mut buf = vec![Complex32::new(0.0, 0.0); self.n_fft];
        let scale = 1.0 / self.n_fft as f32;

        for (t, frame) in spec.frames.iter().enumerate() {
            for (k, slot) in buf.iter_mut().enumerate() {
                *slot = if k < frame.len() {
                    frame[k]
                } else {
                    frame[self.n_fft - k].conj()
                };
            }
            self.inverse.process(&mut buf);

            let start = t * self.hop;
            for i in 0..self.n_fft {
                let w = self.window[i];
                out[start + i] += buf[i].re * scale * w;
                norm[start + i] += w * w;
            }
        }

        (0..len)
            .map(|i| {
                let n = norm[i + pad];
                if n > 1e-8 {
                    out[i + pad] / n
                } else {
                    0.0
                }
            })
            .collect()
    }
}

fn reflect_pad(signal: &[f32], pad: usize) -> Vec<f32> {
    let n = signal.len();
    let mut out = Vec::with_capacity(n + 2 * pad);
    if n < 2 {
        out.resize(pad, 0.0);
        out.extend_from_slice(signal);
        out.resize(n + 2 * pad, 0.0);
        return out;
    }
    let reflect = |i: isize| -> f32 {
        let period = 2 * (n as isize - 1);
        let mut j = i.rem_euclid(period);
        if j >= n as isize {
            j = period - j;
        }
        signal[j as usize]
    };
    for i in -(pad as isize)..(n + pad) as isize {
        out.push(reflect(i));
    }
    out
}

/// Second-order IIR section (RBJ cookbook).
#[derive(Debug, Clone, Copy)]
pub struct Biquad {
    b0: f32,
    b1: f32,
    b2: f32,
    a1: f32,
    a2: f32,
}

impl Biquad {
    pub fn lowpass(cutoff: f32, sample_rate: f32, q: f32) -> Self {
        let w0 = 2.0 * PI * cutoff / sample_rate;
        let alpha = w0.sin() / (2.0 * q);
        let cos = w0.cos();
        let a0 = 1.0 + alpha;
        Self {
            b0: (1.0 - cos) / 2.0 / a0,
            b1: (1.0 - cos) / a0,
            b2: (1.0 - cos) / 2.0 / a0,
            a1: -2.0 * cos / a0,
            a2: (1.0 - alpha) / a0,
        }
    }

    pub fn highpass(cutoff: f32, sample_rate: f32, q: f32) -> Self {
        let w0 = 2.0 * PI * cutoff / sample_rate;
        let alpha = w0.sin() / (2.0 * q);
        let cos = w0.cos();
        let a0 = 1.0 + alpha;
        Self {
            b0: (1.0 + cos) / 2.0 / a0,
            b1: -(1.0 + cos) / a0,
            b2: (1.0 + cos) / 2.0 / a0,
            a1: -2.0 * cos / a0,
            a2: (1.0 - alpha) / a0,
        }
    }

    fn apply(&self, signal: &mut [f32]) {
        let (mut x1, mut x2, mut y1, mut y2) = (0.0f32, 0.0f32, 0.0f32, 0.0f32);
        for sample in signal.iter_mut() {
            let x0 = *sample;
            let y0 = self.b0 * x0 + self.b1 * x1 + self.b2 * x2 - self.a1 * y1 - self.a2 * y2;
            x2 = x1;
            x1 = x0;
            y2 = y1;
            y1 = y0;
            *sample = y0;
        }
    }
}

/// Q factors of the biquads making up an even-order Butterworth filter.
fn butterworth_qs(order: usize) -> Vec<f32> {
    let order = order.max(2) & !1;
    (1..=order / 2)
        .map(|k| {
            let theta = (2 * k - 1) as f32 * PI / (2 * order) as f32;
            1.0 / (2.0 * theta.cos())
        })
        .collect()
}

/// Butterworth band-pass as cascaded high-pass and low-pass sections.
pub fn butterworth_bandpass(low_hz: f32, high_hz: f32, sample_rate: f32, order: usize) -> Vec<Biquad> {
    let nyquist = sample_rate / 2.0;
    let qs = butterworth_qs(order);
    let mut sections = Vec::new();
    if low_hz > 0.0 && low_hz < nyquist {
        sections.extend(qs.iter().map(|&q| Biquad::highpass(low_hz, sample_rate, q)));
    }
    if high_hz > 0.0 && high_hz < nyquist * 0.99 {
        sections.extend(qs.iter().map(|&q| Biquad::lowpass(high_hz, sample_rate, q)));
    }
    sections
}

/// Zero-phase filtering: run the cascade forward, then backward.
pub fn filtfilt(sections: &[Biquad], signal: &[f32]) -> Vec<f32> {
    let mut out = signal.to_vec();
    for section in sections {
        section.apply(&mut out);
    }
    out.reverse();
    for section in sections {
        section.apply(&mut out);
    }
    out.reverse();
    out
}

/// Sliding median; at the edges the window shrinks and the lower median is used.
pub fn median_filter(values: &[f32], kernel: usize) -> Vec<f32> {
    let half = kernel / 2;
    let mut window = Vec::with_capacity(kernel);
    (0..values.len())
        .map(|i| {
            let lo = i.saturating_sub(half);
            let hi = (i + half + 1).min(values.len());
            window.clear();
            window.extend_from_slice(&values[lo..hi]);
            let mid = (window.len() - 1) / 2;
            let (_, median, _) = window.select_nth_unstable_by(mid, |a, b| a.total_cmp(b));
            *median
        })
        .collect()
}

/// Centered moving average with zero padding (`mode = "same"`).
pub fn moving_average(values: &[f32], window: usize) -> Vec<f32> {
    if window <= 1 || values.is_empty() {
        return values.to_vec();
    }
    let mut prefix = Vec::with_capacity(values.len() + 1);
    prefix.push(0.0f64);
    for &v in values {
        let last = prefix[prefix.len() - 1];
        prefix.push(last + v as f64);
    }
    let before = (window - 1) / 2;
    let after = window - 1 - before;
    (0..values.len())
        .map(|i| {
            let lo = i.saturating_sub(before);
            let hi = (i + after + 1).min(values.len());
            ((prefix[hi] - prefix[lo]) / window as f64) as f32
        })
        .collect()
}

/// Centered frame RMS with zero padding.
pub fn frame_rms(signal: &[f32], frame_len: usize, hop: usize) -> Vec<f32> {
    if signal.is_empty() || hop == 0 {
        return Vec::new();
    }
    let half = frame_len / 2;
    let n_frames = 1 + signal.len() / hop;
    (0..n_frames)
        .map(|t| {
            let center = t * hop;
            let lo = center.saturating_sub(half);
            let hi = (center + half).min(signal.len());
            let energy: f64 = signal[lo..hi].iter().map(|&s| (s as f64) * (s as f64)).sum();
            (energy / frame_len as f64).sqrt() as f32
        })
        .collect()
}

/// Population mean and standard deviation.
pub fn mean_std(values: &[f64]) -> (f64, f64) {
    if values.is_empty() {
        return (0.0, 0.0);
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let var = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
    (mean, var.sqrt())
}

/// `a / b`, or 0 when `b` is zero.
pub fn safe_ratio(a: f64, b: f64) -> f64 {
    if b.abs() < f64::EPSILON {
        0.0
    } else {
        a / b
    }
}

pub fn energy(signal: &[f32]) -> f64 {
    signal.iter().map(|&s| (s as f64) * (s as f64)).sum()
}

/// Loudness relative to full scale; `-inf` for digital silence.
pub fn dbfs(signal: &[f32]) -> f64 {
    if signal.is_empty() {
        return f64::NEG_INFINITY;
    }
    let rms = (energy(signal) / signal.len() as f64).sqrt();
    if rms <= 0.0 {
        f64::NEG_INFINITY
    } else {
        20.0 * rms.log10()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sine(freq: f32, sr: f32, secs: f32) -> Vec<f32> {
        (0..(sr * secs) as usize)
            .map(|i| (2.0 * PI * freq * i as f32 / sr).sin())
            .collect()
    }

    fn rms(x: &[f32]) -> f64 {
        (energy(x) / x.len() as f64).sqrt()
    }

    #[test]
    fn test_stft_round_trip() {
        let signal = sine(440.0, 16_000.0, 0.5);
        let stft = Stft::new(512, 128);
        let rebuilt = stft.inverse(&stft.forward(&signal), signal.len());

        assert_eq!(rebuilt.len(), signal.len());
        let max_err = signal
            .iter()
            .zip(&rebuilt)
            .map(|(a, b)| (a - b).abs())
            .fold(0.0f32, f32::max);
        assert!(max_err < 1e-3, "max error {}", max_err);
    }

    #[test]
    fn test_bandpass_keeps_voice_band() {
        let sr = 16_000.0;
        let sections = butterworth_bandpass(80.0, 3000.0, sr, 4);
        assert_eq!(sections.len(), 4);

        let pass = filtfilt(&sections, &sine(500.0, sr, 1.0));
        let stop = filtfilt(&sections, &sine(7000.0, sr, 1.0));
        let rumble = filtfilt(&sections, &sine(20.0, sr, 1.0));

        assert!(rms(&pass[2000..14000]) > 0.6);
        assert!(rms(&stop[2000..14000]) < 0.05);
        assert!(rms(&rumble[2000..14000]) < 0.1);
    }

    #[test]
    fn test_butterworth_qs() {
        let qs = butterworth_qs(4);
        assert!((qs[0] - 0.5412).abs() < 1e-3);
        assert!((qs[1] - 1.3066).abs() < 1e-3);
    }

    #[test]
    fn test_median_filter() {
        let out = median_filter(&[1.0, 9.0, 1.0, 1.0, 5.0, 5.0, 5.0], 3);
        assert_eq!(out, vec![1.0, 1.0, 1.0, 1.0, 5.0, 5.0, 5.0]);
    }

    #[test]
    fn test_moving_average_same_length() {
        let out = moving_average(&[0.0, 0.0, 3.0, 0.0, 0.0], 3);
        assert_eq!(out, vec![0.0, 1.0, 1.0, 1.0, 0.0]);
    }

    #[test]
    fn test_dbfs() {
        assert_eq!(dbfs(&[0.0; 10]), f64::NEG_INFINITY);
        assert!((dbfs(&[1.0; 10])).abs() < 1e-9);
        assert!((dbfs(&[0.1; 10]) + 20.0).abs() < 1e-6);
    }

    #[test]
    fn test_safe_ratio_and_mean_std() {
        assert_eq!(safe_ratio(1.0, 0.0), 0.0);
        let (mean, std) = mean_std(&[2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0]);
        assert_eq!(mean, 5.0);
        assert_eq!(std, 2.0);
    }
}
