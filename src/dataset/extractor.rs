use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::{error, info};

use super::layout::DavisLayout;
use crate::media::ffmpeg::FfmpegDecoder;
use crate::media::jpeg::write_jpeg;
use crate::media::{FrameSource, MediaError};
use crate::utils::config::ExtractConfig;

const PROGRESS_EVERY: u64 = 100;

#[derive(Debug, Clone, PartialEq)]
pub enum ExtractOutcome {
    /// The video could not be opened. Reported, not an error.
    SourceUnreadable,
    Completed(ExtractSummary),
}

#[derive(Debug, Clone, PartialEq)]
pub struct ExtractSummary {
    pub frame_count: u64,
    pub frames_dir: PathBuf,
    pub manifest_path: PathBuf,
    /// Index and path the supplied first frame was written to.
    pub first_frame: Option<(u64, PathBuf)>,
    pub annotations_dir: PathBuf,
}

/// Extracts `config.video_path` with ffmpeg into the DAVIS layout.
pub fn extract_video(config: &ExtractConfig) -> Result<ExtractOutcome> {
    extract_frames(config, FfmpegDecoder::open)
}

/// Writes every frame of the source opened by `open` as
/// `<davis>/2017/JPEGImages/480p/<sequence>/<index:05>.jpg` and sets the
/// sequence as the only entry of `val.txt`.
///
/// A supplied first frame is written at `trunc(frame_rate)` before the stream is
/// decoded, so a decoded frame with the same index replaces it.
pub fn extract_frames<S, F>(config: &ExtractConfig, open: F) -> Result<ExtractOutcome>
where
    S: FrameSource,
    F: FnOnce(&Path) -> Result<S, MediaError>,
{
    let layout = DavisLayout::new(&config.davis_dir, &config.sequence_name);

    let frames_dir = layout.frames_dir();
    fs::create_dir_all(&frames_dir).with_context(|| format!("Failed to create {:?}", frames_dir))?;
    let image_sets_dir = layout.image_sets_dir();
    fs::create_dir_all(&image_sets_dir).with_context(|| format!("Failed to create {:?}", image_sets_dir))?;

    let manifest_path = layout.manifest_path();
    fs::write(&manifest_path, layout.sequence()).with_context(|| format!("Failed to write {:?}", manifest_path))?;

    let mut source = match open(&config.video_path) {
        Ok(source) => source,
        Err(MediaError::SourceUnreadable { path, reason }) => {
            error!("Error: Could not open video file {:?} ({})", path, reason);
            return Ok(ExtractOutcome::SourceUnreadable);
        }
        Err(e) => {
            error!("Error: Could not start decoding {:?}: {}", config.video_path, e);
            return Err(e).with_context(|| format!("Failed to open {:?}", config.video_path));
        }
    };

    let fps = source.frame_rate();
    info!("Video FPS: {}", fps);

    let first_frame = match &config.first_frame {
        Some(first_frame_path) => Some(write_first_frame(&layout, first_frame_path, fps)?),
        None => None,
    };

    let mut frame_count = 0u64;
    while let Some(frame) = source.next_frame() {
        let output_path = layout.frame_path(frame_count);
        write_jpeg(&frame, &output_path)
            .with_context(|| format!("Failed to write frame {:?}", output_path))?;

        frame_count += 1;
        if frame_count % PROGRESS_EVERY == 0 {
            info!("Processed {} frames...", frame_count);
        }
    }
    drop(source);

    let annotations_dir = layout.annotations_dir();
    info!("Done! Extracted {} frames to {:?}", frame_count, frames_dir);
    info!(
        "Note: Place your mask for the first frame (00000.png) in: {:?}",
        annotations_dir
    );

    Ok(ExtractOutcome::Completed(ExtractSummary {
        frame_count,
        frames_dir,
        manifest_path,
        first_frame,
        annotations_dir,
    }))
}

/// Index of the frame one second into a stream running at `fps`.
pub fn first_frame_index(fps: f64) -> u64 {
    // NaN and negative rates land on 0
    fps.max(0.0).trunc() as u64
}

fn write_first_frame(layout: &DavisLayout, first_frame_path: &Path, fps: f64) -> Result<(u64, PathBuf)> {
    let index = first_frame_index(fps);
    info!("Your FFMPEG frame from 1 second would be approximately frame {}", index);

    let image = image::open(first_frame_path)
        .with_context(|| format!("Failed to read first frame {:?}", first_frame_path))?;
    let output_path = layout.frame_path(index);
    write_jpeg(&image.to_rgb8(), &output_path)
        .with_context(|| format!("Failed to write first frame {:?}", output_path))?;
    info!("Saved your first frame as: {:?}", output_path);

    Ok((index, output_path))
}
