//! Decoded video frames.
//!
//! Frames are pulled from FFmpeg as packed `rgb24` over a pipe, so only the
//! frames a caller keeps stay in memory.

use std::io::Cursor;
use std::path::Path;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use image::codecs::jpeg::JpegEncoder;
use image::ColorType;
use tokio::io::AsyncReadExt;
use tokio::process::{Child, ChildStdout};
use tracing::debug;

use crate::command::{FfmpegCommand, FfmpegRunner};
use crate::error::{MediaError, MediaResult};
use crate::probe::probe_video;

/// One packed RGB frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub width: u32,
    pub height: u32,
    /// Row-major `rgb24` pixels
    pub data: Vec<u8>,
}

impl Frame {
    pub fn new(width: u32, height: u32, data: Vec<u8>) -> MediaResult<Self> {
        let expected = width as usize * height as usize * 3;
        if data.len() != expected {
            return Err(MediaError::internal(format!(
                "frame buffer has {} bytes, expected {} for {}x{}",
                data.len(),
                expected,
                width,
                height
            )));
        }
        Ok(Self {
            width,
            height,
            data,
        })
    }

    /// A frame with every pixel set to `rgb`.
    pub fn filled(width: u32, height: u32, rgb: [u8; 3]) -> Self {
        let data = rgb
            .iter()
            .copied()
            .cycle()
            .take(width as usize * height as usize * 3)
            .collect();
        Self {
            width,
            height,
            data,
        }
    }

    /// Single-channel intensity using BT.601 weights.
    pub fn luma(&self) -> Vec<u8> {
        self.data
            .chunks_exact(3)
            .map(|px| {
                let y = 299 * px[0] as u32 + 587 * px[1] as u32 + 114 * px[2] as u32;
                ((y + 500) / 1000) as u8
            })
            .collect()
    }

    /// Encode as JPEG.
    pub fn to_jpeg(&self, quality: u8) -> MediaResult<Vec<u8>> {
        let mut buf = Cursor::new(Vec::new());
        JpegEncoder::new_with_quality(&mut buf, quality).encode(
            &self.data,
            self.width,
            self.height,
            ColorType::Rgb8,
        )?;
        Ok(buf.into_inner())
    }

    /// Encode as base64 JPEG, ready for an image content block.
    pub fn to_base64_jpeg(&self, quality: u8) -> MediaResult<String> {
        Ok(BASE64.encode(self.to_jpeg(quality)?))
    }
}

/// Decoding window and output size.
#[derive(Debug, Clone, Copy, Default)]
pub struct DecodeOptions {
    /// Downscale wider frames to this width, keeping aspect ratio
    pub max_width: Option<u32>,
    /// Seek before decoding
    pub start_secs: Option<f64>,
    /// Stop decoding after this many seconds
    pub max_duration_secs: Option<f64>,
}

/// Incremental frame reader over an FFmpeg pipe.
pub struct FrameStream {
    _child: Child,
    stdout: ChildStdout,
    width: u32,
    height: u32,
    fps: f64,
    duration: f64,
}

impl FrameStream {
    /// Probe `path` and start decoding.
    pub async fn open(path: impl AsRef<Path>, options: DecodeOptions) -> MediaResult<Self> {
        let path = path.as_ref();
        let info = probe_video(path).await?;
        if info.width == 0 || info.height == 0 {
            return Err(MediaError::InvalidVideo(format!(
                "{} has no frame size",
                path.display()
            )));
        }

        let (width, height) = scaled_size(info.width, info.height, options.max_width);

        let mut cmd = FfmpegCommand::to_stdout(path);
        if let Some(start) = options.start_secs {
            cmd = cmd.seek(start);
        }
        if let Some(limit) = options.max_duration_secs {
            cmd = cmd.duration(limit);
        }
        let cmd = cmd
            .no_audio()
            .video_filter(format!("scale={}:{}", width, height))
            .output_args(["-pix_fmt", "rgb24"])
            .format("rawvideo");

        let mut child = FfmpegRunner::new().spawn_streaming(&cmd)?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| MediaError::internal("ffmpeg stdout not captured"))?;

        debug!(
            path = %path.display(),
            width,
            height,
            fps = info.fps,
            "Opened frame stream"
        );

        Ok(Self {
            _child: child,
            stdout,
            width,
            height,
            fps: info.fps,
            duration: info.duration,
        })
    }

    pub fn fps(&self) -> f64 {
        self.fps
    }

    /// Container duration in seconds.
    pub fn duration(&self) -> f64 {
        self.duration
    }

    /// Read the next frame, or `None` once the stream is exhausted.
    pub async fn next_frame(&mut self) -> MediaResult<Option<Frame>> {
        let mut data = vec![0u8; self.width as usize * self.height as usize * 3];
        match self.stdout.read_exact(&mut data).await {
            Ok(_) => Ok(Some(Frame {
                width: self.width,
                height: self.height,
                data,
            })),
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

/// Decode the single frame at `secs`, if the video is that long.
pub async fn extract_frame_at(
    path: impl AsRef<Path>,
    secs: f64,
    max_width: Option<u32>,
) -> MediaResult<Option<Frame>> {
    let mut stream = FrameStream::open(
        path,
        DecodeOptions {
            max_width,
            start_secs: Some(secs),
            max_duration_secs: None,
        },
    )
    .await?;
    stream.next_frame().await
}

/// Even output dimensions no wider than `max_width`.
fn scaled_size(width: u32, height: u32, max_width: Option<u32>) -> (u32, u32) {
    match max_width {
        Some(max) if max > 0 && width > max => {
            let w = max & !1;
            let h = ((height as f64 * w as f64 / width as f64).round() as u32).max(2) & !1;
            (w.max(2), h)
        }
        _ => (width, height),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_luma_weights() {
        let frame = Frame::new(3, 1, vec![255, 0, 0, 0, 255, 0, 255, 255, 255]).unwrap();
        assert_eq!(frame.luma(), vec![76, 150, 255]);
    }

    #[test]
    fn test_new_rejects_short_buffer() {
        assert!(Frame::new(2, 2, vec![0; 5]).is_err());
    }

    #[test]
    fn test_jpeg_round_trip_dimensions() {
        let frame = Frame::filled(16, 8, [10, 200, 30]);
        let jpeg = frame.to_jpeg(95).unwrap();
        let decoded = image::load_from_memory(&jpeg).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (16, 8));
        assert!(!frame.to_base64_jpeg(95).unwrap().is_empty());
    }

    #[test]
    fn test_scaled_size() {
        assert_eq!(scaled_size(1080, 1920, Some(480)), (480, 852));
        assert_eq!(scaled_size(320, 240, Some(480)), (320, 240));
        assert_eq!(scaled_size(1001, 501, Some(101)), (100, 50));
        assert_eq!(scaled_size(1080, 1920, None), (1080, 1920));
    }
}
