//! Scene-change keyframe extraction.
//!
//! A frame becomes a keyframe when it differs from the frame before it by
//! more than `threshold` (mean absolute luma difference, 0-255) and at least
//! `min_interval_secs` has passed since the previous keyframe. The first and
//! last decoded frames are always kept.

use std::path::Path;

use tracing::debug;

use crate::error::MediaResult;
use crate::frames::{DecodeOptions, Frame, FrameStream};

/// Scene-change threshold on the 0-255 intensity scale.
pub const DEFAULT_SCENE_CHANGE_THRESHOLD: f64 = 20.0;
/// Minimum spacing between keyframes.
pub const DEFAULT_MIN_INTERVAL_SECS: f64 = 1.0;

/// Extraction parameters.
#[derive(Debug, Clone, Copy)]
pub struct KeyframeParams {
    pub fps: f64,
    pub min_interval_secs: f64,
    pub threshold: f64,
    /// Ignore frames past this point
    pub max_duration_secs: Option<f64>,
}

impl Default for KeyframeParams {
    fn default() -> Self {
        Self {
            fps: 30.0,
            min_interval_secs: DEFAULT_MIN_INTERVAL_SECS,
            threshold: DEFAULT_SCENE_CHANGE_THRESHOLD,
            max_duration_secs: None,
        }
    }
}

impl KeyframeParams {
    pub fn with_fps(mut self, fps: f64) -> Self {
        self.fps = fps;
        self
    }

    pub fn with_max_duration(mut self, secs: Option<f64>) -> Self {
        self.max_duration_secs = secs;
        self
    }
}

/// A keyframe and the slice of time it represents.
#[derive(Debug, Clone, PartialEq)]
pub struct KeyframeWindow {
    /// 1-based position in the keyframe list
    pub frame_number: usize,
    pub timestamp: f64,
    pub image: Frame,
    pub window_start: f64,
    pub window_end: f64,
}

/// Incremental extractor; feed frames in decode order with [`push`](Self::push).
#[derive(Debug)]
pub struct KeyframeExtractor {
    params: KeyframeParams,
    min_frame_interval: usize,
    max_frame: Option<usize>,
    index: usize,
    frames_since_last: usize,
    prev_luma: Option<Vec<u8>>,
    last: Option<(usize, Frame)>,
    picked: Vec<(usize, Frame)>,
}

impl KeyframeExtractor {
    pub fn new(params: KeyframeParams) -> Self {
        let fps = if params.fps.is_finite() && params.fps > 0.0 {
            params.fps
        } else {
            KeyframeParams::default().fps
        };
        let min_frame_interval = (fps * params.min_interval_secs.max(0.0)) as usize;
        let max_frame = params
            .max_duration_secs
            .map(|secs| (secs * fps) as usize)
            .filter(|&frames| frames > 0);

        Self {
            params: KeyframeParams { fps, ..params },
            min_frame_interval,
            max_frame,
            index: 0,
            frames_since_last: 0,
            prev_luma: None,
            last: None,
            picked: Vec::new(),
        }
    }

    /// Whether the duration cutoff has been reached.
    pub fn is_saturated(&self) -> bool {
        self.max_frame.is_some_and(|max| self.index >= max)
    }

    /// Feed the next frame. Returns `false` once further frames would be ignored.
    pub fn push(&mut self, frame: Frame) -> bool {
        if self.is_saturated() {
            return false;
        }

        let luma = frame.luma();
        let is_keyframe = match &self.prev_luma {
            None => true,
            Some(prev) => {
                self.frames_since_last >= self.min_frame_interval
                    && mean_abs_diff(prev, &luma) > self.params.threshold
            }
        };

        if is_keyframe {
            self.picked.push((self.index, frame.clone()));
            self.frames_since_last = 0;
        }

        self.prev_luma = Some(luma);
        self.last = Some((self.index, frame));
        self.index += 1;
        self.frames_since_last += 1;

        !self.is_saturated()
    }

    /// Close the sequence and build the windows.
    pub fn finish(mut self) -> Vec<KeyframeWindow> {
        if let Some((index, frame)) = self.last.take() {
            let already_picked = self.picked.last().is_some_and(|(i, _)| *i == index);
            if !already_picked {
                self.picked.push((index, frame));
            }
        }

        let fps = self.params.fps;
        let mut window_start = 0.0;
        self.picked
            .into_iter()
            .enumerate()
            .map(|(i, (index, image))| {
                let timestamp = index as f64 / fps;
                let window = KeyframeWindow {
                    frame_number: i + 1,
                    timestamp,
                    image,
                    window_start,
                    window_end: timestamp,
                };
                window_start = timestamp;
                window
            })
            .collect()
    }
}

/// Extract keyframes from an in-memory frame sequence.
pub fn extract_keyframes<I>(frames: I, params: KeyframeParams) -> Vec<KeyframeWindow>
where
    I: IntoIterator<Item = Frame>,
{
    let mut extractor = KeyframeExtractor::new(params);
    for frame in frames {
        if !extractor.push(frame) {
            break;
        }
    }
    extractor.finish()
}

/// Decode `path` and extract its keyframes. The stream's own frame rate
/// overrides `params.fps`.
pub async fn extract_keyframes_from_file(
    path: impl AsRef<Path>,
    params: KeyframeParams,
    max_width: Option<u32>,
) -> MediaResult<Vec<KeyframeWindow>> {
    let path = path.as_ref();
    let mut stream = FrameStream::open(
        path,
        DecodeOptions {
            max_width,
            start_secs: None,
            max_duration_secs: params.max_duration_secs,
        },
    )
    .await?;

    let mut extractor = KeyframeExtractor::new(params.with_fps(stream.fps()));
    while let Some(frame) = stream.next_frame().await? {
        if !extractor.push(frame) {
            break;
        }
    }

    let keyframes = extractor.finish();
    debug!(path = %path.display(), count = keyframes.len(), "Extracted keyframes");
    Ok(keyframes)
}

/// Mean absolute difference between two equally sized intensity planes.
pub fn mean_abs_diff(a: &[u8], b: &[u8]) -> f64 {
    if a.is_empty() || a.len() != b.len() {
        // Frames of different sizes cannot be compared pixel-wise.
        return if a.len() == b.len() { 0.0 } else { f64::MAX };
    }
    let total: u64 = a
        .iter()
        .zip(b)
        .map(|(&x, &y)| x.abs_diff(y) as u64)
        .sum();
    total as f64 / a.len() as f64
}
