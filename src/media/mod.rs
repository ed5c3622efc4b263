pub mod ffmpeg;
pub mod jpeg;
pub mod mimetype;
pub mod probe;

use std::path::PathBuf;
use image::RgbImage;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum MediaError {
    #[error("could not open video file {path:?}: {reason}")]
    SourceUnreadable { path: PathBuf, reason: String },

    #[error("unexpected ffprobe output: {0}")]
    Probe(String),

    #[error("failed to spawn {program}")]
    Spawn {
        program: &'static str,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Image(#[from] image::ImageError),
}

/// Properties of the first video stream in a container.
#[derive(Debug, Clone, PartialEq)]
pub struct StreamInfo {
    pub width: u32,
    pub height: u32,
    pub frame_rate: f64,
    pub frame_count: Option<u64>,
    pub duration: Option<f64>,
}

/// A read-once, sequential stream of decoded frames.
///
/// Decode errors are not distinguished from the end of the stream: both make
/// `next_frame` return `None`. Implementations release their underlying
/// resources on drop.
pub trait FrameSource {
    /// Frame rate reported by the container, in frames per second.
    fn frame_rate(&self) -> f64;

    /// Total number of frames, if the container reports one.
    fn frame_count(&self) -> Option<u64>;

    fn next_frame(&mut self) -> Option<RgbImage>;
}
