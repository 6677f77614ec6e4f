//! On-demand analysis of a single stored video.
//!
//! The video is pulled from object storage into a scratch directory, split
//! into scene-change keyframes, and each keyframe is paired with the speech
//! heard in its window. The content service turns those moments into a
//! summary, and the summary plus the complete transcript into a screenplay.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use futures::stream::{self, StreamExt};
use serde_json::{json, Value};
use tapestry_media::audio::{extract_wav, write_wav_segment};
use tapestry_media::{
    extract_keyframes_from_file, remove_file_if_exists, FfmpegRunner, KeyframeWindow, MediaError,
};
use tapestry_ml_client::{FeatureGenerator, KeyframeMoment, Transcriber};
use tapestry_models::is_valid_post_id;
use tapestry_storage::{video_object_key, ObjectStore};
use tracing::{debug, warn};

use crate::config::PipelineConfig;
use crate::error::{WorkerError, WorkerResult};
use crate::logging::RecordLogger;

/// Summary and screenplay of one video.
#[derive(Debug, Clone, PartialEq)]
pub struct VideoAnalysis {
    pub summary: Value,
    pub screenplay: Value,
}

/// Video summaries, screenplays and edit recommendations.
pub struct Analyzer {
    store: Arc<dyn ObjectStore>,
    features: FeatureGenerator,
    transcriber: Arc<dyn Transcriber>,
    runner: FfmpegRunner,
    config: PipelineConfig,
}

impl Analyzer {
    pub fn new(
        store: Arc<dyn ObjectStore>,
        features: FeatureGenerator,
        transcriber: Arc<dyn Transcriber>,
        config: PipelineConfig,
    ) -> Self {
        Self {
            store,
            features,
            transcriber,
            runner: FfmpegRunner::new().with_timeout(config.ffmpeg_timeout_secs),
            config,
        }
    }

    /// Analyze the stored video of `post_id`.
    pub async fn analyze_post(
        &self,
        post_id: &str,
        caption: Option<&str>,
    ) -> WorkerResult<VideoAnalysis> {
        if !is_valid_post_id(post_id) {
            return Err(WorkerError::invalid_request(format!(
                "post_id {:?} may only contain ASCII letters, digits, '_' and '-'",
                post_id
            )));
        }

        let key = video_object_key(post_id)?;
        if !self.store.exists(&key).await? {
            return Err(WorkerError::not_found(format!(
                "No stored video for post {}",
                post_id
            )));
        }

        tokio::fs::create_dir_all(&self.config.work_dir).await?;
        let scratch = tempfile::Builder::new()
            .prefix("analysis-")
            .tempdir_in(&self.config.work_dir)?;
        let video = scratch.path().join(&key);

        let result = match self.store.download_file(&key, &video).await {
            Ok(()) => {
                self.analyze_video(post_id, &video, caption.unwrap_or_default(), scratch.path())
                    .await
            }
            Err(e) => Err(e.into()),
        };

        let scratch_path = scratch.path().to_path_buf();
        if let Err(e) = scratch.close() {
            warn!(dir = %scratch_path.display(), "Failed to remove analysis directory: {}", e);
        }
        result
    }

    async fn analyze_video(
        &self,
        post_id: &str,
        video: &Path,
        caption: &str,
        dir: &Path,
    ) -> WorkerResult<VideoAnalysis> {
        let logger = RecordLogger::new(post_id, "video_analysis");
        logger.log_start();

        let keyframes = extract_keyframes_from_file(
            video,
            self.config.keyframe_params(None),
            self.config.frame_max_width,
        )
        .await?;
        logger.log_progress(&format!("{} keyframes", keyframes.len()));

        let wav = dir.join("analysis.wav");
        let audio = match extract_wav(video, &wav, &self.runner).await {
            Ok(()) => Some(wav),
            Err(MediaError::NoAudioData(_)) => {
                logger.log_progress("no audio track, transcripts left empty");
                None
            }
            Err(e) => return Err(e.into()),
        };

        let transcript = match &audio {
            Some(wav) => self.transcribe_or_empty(wav).await,
            None => String::new(),
        };
        let moments = self.annotate(keyframes, audio.as_deref(), dir).await;

        let summary = self.features.summary(&moments, caption).await?;
        let screenplay = self.features.screenplay(&summary, &transcript).await?;
        logger.log_completion();

        Ok(VideoAnalysis {
            summary,
            screenplay,
        })
    }

    /// Pair every keyframe with the speech in its window.
    async fn annotate(
        &self,
        keyframes: Vec<KeyframeWindow>,
        audio: Option<&Path>,
        dir: &Path,
    ) -> Vec<KeyframeMoment> {
        stream::iter(keyframes)
            .map(|keyframe| async move {
                let transcript = match audio {
                    Some(wav) => self.window_transcript(wav, dir, &keyframe).await,
                    None => String::new(),
                };
                KeyframeMoment {
                    keyframe,
                    transcript,
                }
            })
            .buffered(self.config.max_parallel_records)
            .collect()
            .await
    }

    async fn window_transcript(&self, wav: &Path, dir: &Path, keyframe: &KeyframeWindow) -> String {
        let segment = dir.join(format!("window_{}.wav", keyframe.frame_number));
        let (start, end) = (keyframe.window_start, keyframe.window_end);

        let written = {
            let (wav, segment): (PathBuf, PathBuf) = (wav.to_path_buf(), segment.clone());
            tokio::task::spawn_blocking(move || write_wav_segment(&wav, &segment, start, end)).await
        };

        let transcript = match written {
            Ok(Ok(0)) => String::new(),
            Ok(Ok(samples)) => {
                debug!(window = keyframe.frame_number, samples, "Transcribing window");
                self.transcribe_or_empty(&segment).await
            }
            Ok(Err(e)) => {
                warn!(window = keyframe.frame_number, "Failed to cut audio window: {}", e);
                String::new()
            }
            Err(e) => {
                warn!(window = keyframe.frame_number, "Audio window task failed: {}", e);
                String::new()
            }
        };

        if let Err(e) = remove_file_if_exists(&segment).await {
            warn!(path = %segment.display(), "Failed to remove audio window: {}", e);
        }
        transcript
    }

    async fn transcribe_or_empty(&self, wav: &Path) -> String {
        match self.transcriber.transcribe(wav).await {
            Ok(text) => text,
            Err(e) => {
                warn!(path = %wav.display(), "Transcription failed: {}", e);
                String::new()
            }
        }
    }

    /// Edit recommendations for `low_performing`, judged against the
    /// `high_performing` examples.
    pub async fn suggest_edits(
        &self,
        high_performing: Vec<Value>,
        low_performing: Value,
    ) -> WorkerResult<String> {
        let comparison = json!({
            "high_performing": high_performing,
            "low_performing": low_performing,
        });
        Ok(self.features.suggest_edits(&comparison).await?)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use async_trait::async_trait;
    use tapestry_media::audio::write_wav;
    use tapestry_media::{AudioTrack, Frame};
    use tapestry_ml_client::{
        ContentBlock, ContentError, ContentGenerator, ContentResult, ModelTier, PromptLibrary,
    };

    use super::*;
    use crate::acquisition::fakes::MemoryStore;
    use crate::stages::fakes::Unavailable;

    /// Reports how many samples each WAV it is given holds.
    #[derive(Default)]
    struct SampleCounter {
        calls: Mutex<Vec<u32>>,
    }

    #[async_trait]
    impl Transcriber for SampleCounter {
        async fn transcribe(&self, wav_path: &Path) -> ContentResult<String> {
            let samples = hound::WavReader::open(wav_path)
                .map_err(|e| ContentError::malformed(e.to_string()))?
                .duration();
            self.calls.lock().unwrap().push(samples);
            Ok(format!("{} samples", samples))
        }
    }

    /// Answers every text request with a fixed reply.
    struct Editor;

    #[async_trait]
    impl ContentGenerator for Editor {
        async fn generate_text(&self, _: ModelTier, content: Vec<ContentBlock>) -> ContentResult<String> {
            match content.last() {
                Some(ContentBlock::Text { text }) if text.contains("low_performing") => {
                    Ok("1. Cut the intro.".into())
                }
                _ => Err(ContentError::malformed("unexpected request")),
            }
        }

        async fn generate_json(&self, _: ModelTier, _: Vec<ContentBlock>) -> ContentResult<Value> {
            Err(ContentError::malformed("unexpected request"))
        }
    }

    fn analyzer(
        store: MemoryStore,
        generator: Arc<dyn ContentGenerator>,
        transcriber: Arc<dyn Transcriber>,
        work_dir: &Path,
    ) -> Analyzer {
        Analyzer::new(
            Arc::new(store),
            FeatureGenerator::new(generator, PromptLibrary::builtin()),
            transcriber,
            PipelineConfig::default().with_work_dir(work_dir),
        )
    }

    fn window(frame_number: usize, window_start: f64, window_end: f64) -> KeyframeWindow {
        KeyframeWindow {
            frame_number,
            timestamp: window_end,
            image: Frame::filled(4, 4, [0, 0, 0]),
            window_start,
            window_end,
        }
    }

    #[tokio::test]
    async fn test_windows_are_transcribed_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let wav = dir.path().join("analysis.wav");
        write_wav(&AudioTrack::new(vec![0.1; 48_000], 16_000), &wav).unwrap();

        let counter = Arc::new(SampleCounter::default());
        let analyzer = analyzer(
            MemoryStore::default(),
            Arc::new(Unavailable),
            counter.clone(),
            dir.path(),
        );

        let moments = analyzer
            .annotate(
                vec![window(1, 0.0, 0.0), window(2, 0.0, 1.5), window(3, 1.5, 3.0)],
                Some(&wav),
                dir.path(),
            )
            .await;

        let transcripts: Vec<_> = moments.iter().map(|m| m.transcript.as_str()).collect();
        assert_eq!(transcripts, vec!["", "24000 samples", "24000 samples"]);
        assert_eq!(moments[2].keyframe.frame_number, 3);
        // The zero-length opening window never reaches the transcriber
        assert_eq!(counter.calls.lock().unwrap().len(), 2);
        // Only the full track remains
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 1);
    }

    #[tokio::test]
    async fn test_windows_without_audio_are_empty() {
        let dir = tempfile::tempdir().unwrap();
        let counter = Arc::new(SampleCounter::default());
        let analyzer = analyzer(
            MemoryStore::default(),
            Arc::new(Unavailable),
            counter.clone(),
            dir.path(),
        );

        let moments = analyzer
            .annotate(vec![window(1, 0.0, 2.0)], None, dir.path())
            .await;

        assert_eq!(moments[0].transcript, "");
        assert!(counter.calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_unknown_post_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let analyzer = analyzer(
            MemoryStore::default(),
            Arc::new(Unavailable),
            Arc::new(SampleCounter::default()),
            dir.path(),
        );

        let err = analyzer.analyze_post("404", None).await.unwrap_err();
        assert!(matches!(err, WorkerError::NotFound(_)));
        assert!(!err.is_client_error());
    }

    #[tokio::test]
    async fn test_path_like_post_id_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let store = MemoryStore::default();
        let analyzer = analyzer(
            store,
            Arc::new(Unavailable),
            Arc::new(SampleCounter::default()),
            dir.path(),
        );

        let err = analyzer
            .analyze_post("../../etc/passwd", Some("caption"))
            .await
            .unwrap_err();
        assert!(err.is_client_error());
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_unreadable_video_fails_and_cleans_up() {
        let dir = tempfile::tempdir().unwrap();
        let analyzer = analyzer(
            MemoryStore::with_object("tiktok_5.mp4", b"not a video"),
            Arc::new(Unavailable),
            Arc::new(SampleCounter::default()),
            dir.path(),
        );

        let err = analyzer.analyze_post("5", None).await.unwrap_err();
        assert!(matches!(err, WorkerError::Media(_)));
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_suggest_edits_sends_both_sides() {
        let dir = tempfile::tempdir().unwrap();
        let analyzer = analyzer(
            MemoryStore::default(),
            Arc::new(Editor),
            Arc::new(SampleCounter::default()),
            dir.path(),
        );

        let edits = analyzer
            .suggest_edits(
                vec![json!({ "post_id": "1", "impact_score": 900.0 })],
                json!({ "post_id": "2", "impact_score": 3.0 }),
            )
            .await
            .unwrap();
        assert_eq!(edits, "1. Cut the intro.");
    }
}
