//! Media handling for the ingestion pipeline.
//!
//! This crate provides:
//! - Type-safe FFmpeg command building and FFprobe inspection
//! - Frame decoding over an FFmpeg pipe and scene-change keyframe extraction
//! - Speech isolation and acoustic feature analysis
//! - Browser-driven media URL resolution and cookie-authenticated download

pub mod audio;
pub mod browser;
pub mod command;
pub mod download;
pub mod error;
pub mod frames;
pub mod fs_utils;
pub mod keyframes;
pub mod probe;

pub use audio::{AudioAnalysis, AudioAnalyzer, AudioTrack};
pub use browser::{
    BrowserLauncher, BrowserSession, ResolvedMedia, SessionCookie, WebDriverConfig,
    WebDriverLauncher,
};
pub use command::{FfmpegCommand, FfmpegRunner};
pub use download::{download_client, download_media};
pub use error::{MediaError, MediaResult};
pub use frames::{extract_frame_at, DecodeOptions, Frame, FrameStream};
pub use fs_utils::remove_file_if_exists;
pub use keyframes::{
    extract_keyframes, extract_keyframes_from_file, KeyframeExtractor, KeyframeParams,
    KeyframeWindow,
};
pub use probe::{probe_video, VideoInfo};
