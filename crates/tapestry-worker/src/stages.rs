//! Per-record pipeline stages.
//!
//! Every stage takes a record by value and returns it with its own fields
//! filled in. A stage whose input is missing (no local video, no transcript)
//! leaves its fields empty instead of failing.

use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tapestry_media::audio::extract_wav;
use tapestry_media::{
    extract_frame_at, extract_keyframes_from_file, probe_video, remove_file_if_exists,
    AudioAnalyzer, FfmpegRunner, KeyframeWindow, MediaResult,
};
use tapestry_ml_client::{FeatureGenerator, Transcriber};
use tapestry_models::PostRecord;

use crate::config::PipelineConfig;
use crate::logging::RecordLogger;
use crate::scoring::impact_score;

/// Dependencies shared by the feature stages.
pub struct Stages {
    features: FeatureGenerator,
    transcriber: Arc<dyn Transcriber>,
    audio: AudioAnalyzer,
    runner: FfmpegRunner,
    config: PipelineConfig,
}

impl Stages {
    pub fn new(
        features: FeatureGenerator,
        transcriber: Arc<dyn Transcriber>,
        config: PipelineConfig,
    ) -> Self {
        let runner = FfmpegRunner::new().with_timeout(config.ffmpeg_timeout_secs);
        Self {
            features,
            transcriber,
            audio: AudioAnalyzer::new().with_runner(runner.clone()),
            runner,
            config,
        }
    }

    pub fn score(&self, record: PostRecord, now: DateTime<Utc>) -> PostRecord {
        let score = impact_score(
            &record.engagement,
            record.create_time,
            now,
            &self.config.weights,
        );
        PostRecord {
            impact_score: Some(score),
            ..record
        }
    }

    /// Extract a WAV next to the video and transcribe it.
    pub async fn transcribe(&self, record: PostRecord, dir: &Path) -> PostRecord {
        let Some(video) = record.local_video_path.clone() else {
            return record;
        };
        let logger = RecordLogger::new(record.post_id.as_str(), "transcription");
        logger.log_start();

        let Some(wav) = artifact_path(dir, &record, ".wav") else {
            logger.log_failure("post id is not a valid file name");
            return record;
        };
        if let Err(e) = extract_wav(&video, &wav, &self.runner).await {
            logger.log_failure(&format!("audio extraction: {}", e));
            discard(&wav).await;
            return record;
        }

        let transcript = match self.transcriber.transcribe(&wav).await {
            Ok(text) => {
                logger.log_completion();
                Some(text)
            }
            Err(e) => {
                logger.log_failure(&e.to_string());
                None
            }
        };

        PostRecord {
            local_audio_path: Some(wav),
            transcript,
            ..record
        }
    }

    /// Creator and product presence over all keyframes.
    pub async fn style(&self, record: PostRecord) -> PostRecord {
        let Some(video) = record.local_video_path.clone() else {
            return record;
        };
        let logger = RecordLogger::new(record.post_id.as_str(), "style_features");
        logger.log_start();

        let keyframes = match self.keyframes(&video, None).await {
            Ok(keyframes) => keyframes,
            Err(e) => {
                logger.log_failure(&format!("keyframes: {}", e));
                return record;
            }
        };

        match self.features.style_features(&keyframes).await {
            Ok(style) => {
                logger.log_completion();
                PostRecord {
                    style: Some(style),
                    ..record
                }
            }
            Err(e) => {
                logger.log_failure(&e.to_string());
                record
            }
        }
    }

    /// Screen hook, audio hook and hook analysis from the hook frame.
    pub async fn hook(&self, record: PostRecord) -> PostRecord {
        let Some(video) = record.local_video_path.clone() else {
            return record;
        };
        let logger = RecordLogger::new(record.post_id.as_str(), "hook");
        logger.log_start();

        let frame = match extract_frame_at(
            &video,
            self.config.hook_frame_secs,
            self.config.frame_max_width,
        )
        .await
        {
            Ok(frame) => frame,
            Err(e) => {
                logger.log_failure(&format!("hook frame: {}", e));
                None
            }
        };

        let hook = self
            .features
            .hook_features(frame.as_ref(), record.transcript.as_deref())
            .await;
        logger.log_completion();

        PostRecord {
            hook: Some(hook),
            ..record
        }
    }

    /// Visual description of the opening seconds.
    pub async fn visual(&self, record: PostRecord) -> PostRecord {
        let Some(video) = record.local_video_path.clone() else {
            return record;
        };
        let logger = RecordLogger::new(record.post_id.as_str(), "visual_features");
        logger.log_start();

        let keyframes = match probe_video(&video).await {
            Ok(info) => {
                let window = info.duration.min(self.config.hook_window_secs);
                self.keyframes(&video, Some(window)).await
            }
            Err(e) => Err(e),
        };
        let keyframes = match keyframes {
            Ok(keyframes) => keyframes,
            Err(e) => {
                logger.log_failure(&format!("keyframes: {}", e));
                return record;
            }
        };

        match self.features.visual_features(&keyframes).await {
            Ok(visual) => {
                logger.log_completion();
                PostRecord {
                    visual: Some(visual),
                    ..record
                }
            }
            Err(e) => {
                logger.log_failure(&e.to_string());
                record
            }
        }
    }

    /// Isolate speech and measure it.
    pub async fn audio(&self, record: PostRecord, dir: &Path) -> PostRecord {
        let Some(video) = record.local_video_path.clone() else {
            return record;
        };
        let logger = RecordLogger::new(record.post_id.as_str(), "audio_features");
        logger.log_start();

        let Some(speech) = artifact_path(dir, &record, "_speech.wav") else {
            logger.log_failure("post id is not a valid file name");
            return record;
        };
        match self.audio.analyze_file(&video, &speech).await {
            Ok(analysis) => {
                if analysis.used_fallback {
                    logger.log_progress("speech mask kept too little, used plain noise reduction");
                }
                logger.log_completion();
                PostRecord {
                    audio: Some(analysis.features),
                    local_speech_path: Some(analysis.speech_path),
                    ..record
                }
            }
            Err(e) => {
                logger.log_failure(&e.to_string());
                discard(&speech).await;
                record
            }
        }
    }

    /// Categorical shooting style from the features gathered so far.
    pub async fn shooting_style(&self, record: PostRecord) -> PostRecord {
        if record.local_video_path.is_none() {
            return record;
        }
        let logger = RecordLogger::new(record.post_id.as_str(), "shooting_style");
        logger.log_start();

        let label = self
            .features
            .shooting_style(
                record.style.as_ref(),
                record.hook.as_ref(),
                record.visual.as_ref(),
                record.transcript.as_deref(),
            )
            .await;
        logger.log_completion();

        PostRecord {
            shooting_style: Some(label),
            ..record
        }
    }

    async fn keyframes(
        &self,
        video: &Path,
        max_duration_secs: Option<f64>,
    ) -> MediaResult<Vec<KeyframeWindow>> {
        extract_keyframes_from_file(
            video,
            self.config.keyframe_params(max_duration_secs),
            self.config.frame_max_width,
        )
        .await
    }
}

/// `dir/{post_id}{suffix}`, or `None` unless that name is a single plain
/// path component.
fn artifact_path(dir: &Path, record: &PostRecord, suffix: &str) -> Option<PathBuf> {
    let name = format!("{}{}", record.post_id, suffix);
    let mut components = Path::new(&name).components();
    match (components.next(), components.next()) {
        (Some(Component::Normal(file)), None) => Some(dir.join(file)),
        _ => None,
    }
}

async fn discard(path: &Path) {
    if let Err(e) = remove_file_if_exists(path).await {
        tracing::warn!(path = %path.display(), "Failed to remove partial artifact: {}", e);
    }
}
