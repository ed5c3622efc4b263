use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::thread;

use anyhow::{anyhow, Context, Result};
use crossbeam::channel::bounded;
use image::DynamicImage;
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{debug, error, info, warn};

use super::annotate::draw_detections;
use super::engine::DetectionEngine;
use super::labels::class_name;
use super::pipeline::Detection;
use crate::ingest::scanner::{scan_sources, MediaSource};
use crate::media::ffmpeg::{FfmpegDecoder, FfmpegEncoder};
use crate::media::jpeg::save_image;
use crate::media::mimetype::MediaKind;
use crate::media::FrameSource;
use crate::utils::config::{self, DetectConfig};

#[derive(Debug, Default, Clone, PartialEq)]
pub struct RunSummary {
    pub save_dir: PathBuf,
    pub images: usize,
    pub videos: usize,
    pub frames: u64,
    pub detections: usize,
}

/// Runs detection over every image and video under `config.source`, saving
/// annotated media (and label files with `save_txt`) to `<project>/<name>`.
pub fn run(config: &DetectConfig) -> Result<RunSummary> {
    config.validate()?;
    let weights = config::resolve_weights(&config.weights)?;

    let save_dir = config.save_dir();
    fs::create_dir_all(&save_dir).with_context(|| format!("Failed to create {:?}", save_dir))?;
    if config.view_img {
        warn!("Displaying results is not supported; see {:?} instead", save_dir);
    }

    let engine = DetectionEngine::new(&weights, config.device)?;

    let (source_tx, source_rx) = bounded::<MediaSource>(64);
    let source_root = config.source.clone();
    let scanner_handle = thread::spawn(move || {
        debug!("Scanner started");
        let result = scan_sources(&source_root, source_tx);
        debug!("Scanner finished");
        result
    });

    let mut summary = RunSummary {
        save_dir: save_dir.clone(),
        ..RunSummary::default()
    };

    for source in source_rx {
        match source.kind {
            MediaKind::Image => {
                summary.detections += detect_image(&engine, config, &source.path, &save_dir)?;
                summary.images += 1;
            }
            MediaKind::Video => {
                let (frames, detections) = detect_video(&engine, config, &source.path, &save_dir)?;
                summary.frames += frames;
                summary.detections += detections;
                summary.videos += 1;
            }
            MediaKind::Other => {}
        }
    }

    scanner_handle
        .join()
        .map_err(|_| anyhow!("source scanner panicked"))?
        .inspect_err(|e| error!("Scanner failed: {}", e))?;

    info!(
        "Results saved to {:?}: {} images, {} videos ({} frames), {} detections",
        summary.save_dir, summary.images, summary.videos, summary.frames, summary.detections
    );
    if config.save_txt {
        info!("Labels saved to {:?}", save_dir.join("labels"));
    }
    Ok(summary)
}

fn detect_image(engine: &DetectionEngine, config: &DetectConfig, path: &Path, save_dir: &Path) -> Result<usize> {
    let image = image::open(path).with_context(|| format!("Failed to read image {:?}", path))?;
    let detections = engine.detect(&image, config.conf_thres, config.iou_thres)?;
    info!(
        "image {}: {}x{} {}",
        path.display(),
        image.width(),
        image.height(),
        describe(&detections, engine.class_names())
    );

    let mut annotated = image.into_rgb8();
    draw_detections(&mut annotated, &detections, engine.class_names(), config.hide_labels, config.hide_conf);
    let file_name = path.file_name().context("image source has no file name")?;
    let output_path = save_dir.join(file_name);
    save_image(&annotated, &output_path)
        .with_context(|| format!("Failed to write {:?}", output_path))?;

    if config.save_txt {
        write_labels(&label_path(save_dir, &stem(path), None), &detections)?;
    }
    Ok(detections.len())
}

fn detect_video(engine: &DetectionEngine, config: &DetectConfig, path: &Path, save_dir: &Path) -> Result<(u64, usize)> {
    let mut decoder = FfmpegDecoder::open(path).with_context(|| format!("Failed to open video {:?}", path))?;
    let info = decoder.info().clone();
    let stem = stem(path);
    let output_path = save_dir.join(format!("{}.mp4", stem));
    let mut encoder = FfmpegEncoder::create(&output_path, info.width, info.height, info.frame_rate)?;

    let progress = match decoder.frame_count() {
        Some(total) => ProgressBar::new(total),
        None => ProgressBar::new_spinner(),
    };
    progress.set_style(ProgressStyle::with_template("{msg} [{bar:40}] {pos}/{len} frames ({eta})")?);
    progress.set_message(stem.clone());

    let mut frames = 0u64;
    let mut detection_count = 0usize;
    while let Some(frame) = decoder.next_frame() {
        frames += 1;
        let image = DynamicImage::ImageRgb8(frame);
        let detections = engine.detect(&image, config.conf_thres, config.iou_thres)?;
        debug!("video {} frame {}: {}", path.display(), frames, describe(&detections, engine.class_names()));

        let mut annotated = image.into_rgb8();
        draw_detections(&mut annotated, &detections, engine.class_names(), config.hide_labels, config.hide_conf);
        encoder.write_frame(&annotated)?;

        if config.save_txt {
            write_labels(&label_path(save_dir, &stem, Some(frames)), &detections)?;
        }
        detection_count += detections.len();
        progress.inc(1);
    }
    progress.finish_and_clear();
    encoder.finish()?;

    info!(
        "video {}: {} frames at {}x{}, {} detections -> {:?}",
        path.display(),
        frames,
        info.width,
        info.height,
        detection_count,
        output_path
    );
    Ok((frames, detection_count))
}

fn stem(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| "source".to_string())
}

/// `labels/<stem>.txt` for images, `labels/<stem>_<frame>.txt` for video frames.
fn label_path(save_dir: &Path, stem: &str, frame: Option<u64>) -> PathBuf {
    let file_name = match frame {
        Some(frame) => format!("{}_{}.txt", stem, frame),
        None => format!("{}.txt", stem),
    };
    save_dir.join("labels").join(file_name)
}

/// Writes one label line per detection. An empty detection list still
/// produces an (empty) file.
fn write_labels(path: &Path, detections: &[Detection]) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).with_context(|| format!("Failed to create {:?}", parent))?;
    }
    let contents: String = detections
        .iter()
        .map(|d| format!("{}\n", d.label_line()))
        .collect();
    fs::write(path, contents).with_context(|| format!("Failed to write labels {:?}", path))
}

/// Per-class counts such as `2 person, 1 bus`.
fn describe(detections: &[Detection], names: &[String]) -> String {
    if detections.is_empty() {
        return "(no detections)".to_string();
    }
    let mut counts: BTreeMap<usize, usize> = BTreeMap::new();
    for detection in detections {
        *counts.entry(detection.class_id).or_default() += 1;
    }
    counts
        .into_iter()
        .map(|(class_id, count)| format!("{} {}", count, class_name(names, class_id)))
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ml::labels::coco_names;
    use crate::ml::pipeline::BoundingBox;

    fn detection(class_id: usize, confidence: f32) -> Detection {
        Detection {
            class_id,
            confidence,
            bbox: BoundingBox { x1: 0.0, y1: 0.0, x2: 4.0, y2: 2.0 },
        }
    }

    #[test]
    fn test_label_paths() {
        let save_dir = Path::new("runs/detect/exp");
        assert_eq!(label_path(save_dir, "bus", None), PathBuf::from("runs/detect/exp/labels/bus.txt"));
        assert_eq!(
            label_path(save_dir, "orchard", Some(12)),
            PathBuf::from("runs/detect/exp/labels/orchard_12.txt")
        );
        assert_eq!(stem(Path::new("data/images/bus.jpg")), "bus");
    }

    #[test]
    fn test_write_labels() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = label_path(dir.path(), "bus", None);

        write_labels(&path, &[detection(5, 0.75), detection(0, 0.5)])?;
        assert_eq!(fs::read_to_string(&path)?, "5 2.0 1.0 4.0 2.0 0.75\n0 2.0 1.0 4.0 2.0 0.5\n");

        write_labels(&path, &[])?;
        assert_eq!(fs::read_to_string(&path)?, "");
        Ok(())
    }

    #[test]
    fn test_describe_counts_per_class() {
        let names = coco_names();
        assert_eq!(describe(&[], &names), "(no detections)");
        let detections = [detection(5, 0.9), detection(0, 0.8), detection(0, 0.7)];
        assert_eq!(describe(&detections, &names), "2 person, 1 bus");
    }
}
