//! Speech isolation and acoustic analysis.

pub mod dsp;
mod extract;
mod features;
mod isolation;
mod silence;

use std::path::{Path, PathBuf};

use tapestry_models::AudioFeatures;
use tracing::{debug, warn};

use crate::command::FfmpegRunner;
use crate::error::{MediaError, MediaResult};

pub use extract::{
    extract_wav, load_track, write_wav, write_wav_segment, ANALYSIS_SAMPLE_RATE,
    TRANSCRIPTION_SAMPLE_RATE,
};
pub use features::analyze_track;
pub use isolation::{isolate_speech, reduce_noise, IsolationConfig, IsolationOutcome, NoiseProfile};
pub use silence::{nonsilent_regions, trim_silence, SilenceConfig};

/// Mono PCM samples in `[-1, 1]`.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioTrack {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
}

impl AudioTrack {
    pub fn new(samples: Vec<f32>, sample_rate: u32) -> Self {
        Self {
            samples,
            sample_rate,
        }
    }

    pub fn duration_secs(&self) -> f64 {
        if self.sample_rate == 0 {
            0.0
        } else {
            self.samples.len() as f64 / self.sample_rate as f64
        }
    }
}

/// Output of [`AudioAnalyzer::analyze_file`].
#[derive(Debug, Clone)]
pub struct AudioAnalysis {
    pub features: AudioFeatures,
    /// Isolated speech written as WAV
    pub speech_path: PathBuf,
    /// The masked result was discarded for plain noise reduction
    pub used_fallback: bool,
    /// Silence trimming succeeded
    pub trimmed: bool,
}

/// Isolates speech from a media file and measures it.
#[derive(Debug, Clone, Default)]
pub struct AudioAnalyzer {
    isolation: IsolationConfig,
    silence: SilenceConfig,
    runner: FfmpegRunner,
}

impl AudioAnalyzer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_runner(mut self, runner: FfmpegRunner) -> Self {
        self.runner = runner;
        self
    }

    /// Decode `input`, isolate speech into `speech_out` and compute features
    /// on the written speech.
    pub async fn analyze_file(
        &self,
        input: impl AsRef<Path>,
        speech_out: impl AsRef<Path>,
    ) -> MediaResult<AudioAnalysis> {
        let input = input.as_ref();
        let speech_out = speech_out.as_ref().to_path_buf();

        let track = load_track(input, ANALYSIS_SAMPLE_RATE, &self.runner).await?;
        debug!(
            input = %input.display(),
            duration_secs = track.duration_secs(),
            "Loaded audio for analysis"
        );

        let isolation = self.isolation.clone();
        let silence = self.silence.clone();
        let out = speech_out.clone();
        let (features, used_fallback, trimmed) = tokio::task::spawn_blocking(move || {
            let outcome = isolate_speech(&track, &isolation);
            let (speech, trimmed) = match trim_silence(&outcome.track, &silence) {
                Ok(trimmed) => (trimmed, true),
                Err(e) => {
                    warn!("Silence trimming failed, keeping isolated track: {}", e);
                    (outcome.track, false)
                }
            };
            write_wav(&speech, &out)?;
            Ok::<_, MediaError>((analyze_track(&speech), outcome.used_fallback, trimmed))
        })
        .await
        .map_err(|e| MediaError::internal(format!("audio analysis task failed: {}", e)))??;

        Ok(AudioAnalysis {
            features,
            speech_path: speech_out,
            used_fallback,
            trimmed,
        })
    }
}
