mod dataset;
mod ingest;
mod media;
mod ml;
mod utils;

use std::io;
use std::path::{Path, PathBuf};
use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use tracing::{debug, error, info};

use crate::dataset::extractor::{self, ExtractOutcome};
use crate::media::probe;
use crate::media::MediaError;
use crate::ml::runner;
use crate::utils::config::{Device, DetectConfig, ExtractConfig, DEFAULT_DAVIS_DIR};
use crate::utils::prompt::prompt_extract_config;

#[derive(Parser, Debug)]
#[command(author, version, about = "Object detection, stream probing and DAVIS frame extraction", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Extract every frame of a video into the DAVIS 2017 layout
    Extract(ExtractArgs),

    /// Print a video's frame rate, frame count and duration
    Probe {
        video: PathBuf,
    },

    /// Run object detection on images, videos or directories of both
    Detect(DetectArgs),
}

#[derive(Args, Debug)]
struct ExtractArgs {
    /// Input video file; prompts for all parameters when omitted
    video: Option<PathBuf>,

    /// DAVIS dataset directory
    #[arg(long, default_value = DEFAULT_DAVIS_DIR)]
    davis_dir: PathBuf,

    /// Name for this video sequence
    #[arg(long)]
    sequence_name: Option<String>,

    /// Frame pre-extracted at the 1 second mark (e.g. with ffmpeg)
    #[arg(long)]
    first_frame: Option<PathBuf>,

    /// Ask for every parameter on stdin
    #[arg(short, long)]
    interactive: bool,
}

#[derive(Args, Debug)]
struct DetectArgs {
    /// Model weights path (ONNX)
    #[arg(long, default_value = "yolov8n.onnx")]
    weights: PathBuf,

    /// Source path (image, video or directory)
    #[arg(long, default_value = "data/images")]
    source: PathBuf,

    /// Confidence threshold
    #[arg(long, default_value_t = 0.25)]
    conf_thres: f32,

    /// NMS IoU threshold
    #[arg(long, default_value_t = 0.45)]
    iou_thres: f32,

    /// Inference device, i.e. 0, cuda:0, cpu or mps (default: cuda if available)
    #[arg(long)]
    device: Option<Device>,

    /// Show results
    #[arg(long)]
    view_img: bool,

    /// Save results to <project>/<name>/labels/*.txt
    #[arg(long)]
    save_txt: bool,

    /// Save results to <project>/<name>
    #[arg(long, default_value = "runs/detect")]
    project: PathBuf,

    /// Save results to <project>/<name>
    #[arg(long, default_value = "exp")]
    name: String,

    /// Hide labels
    #[arg(long)]
    hide_labels: bool,

    /// Hide confidences
    #[arg(long)]
    hide_conf: bool,
}

impl From<DetectArgs> for DetectConfig {
    fn from(args: DetectArgs) -> Self {
        Self {
            weights: args.weights,
            source: args.source,
            conf_thres: args.conf_thres,
            iou_thres: args.iou_thres,
            device: args.device.unwrap_or(Device::Auto),
            view_img: args.view_img,
            save_txt: args.save_txt,
            project: args.project,
            name: args.name,
            hide_labels: args.hide_labels,
            hide_conf: args.hide_conf,
        }
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt::init();
    let cli = Cli::parse();

    match cli.command {
        Command::Extract(args) => run_extract(args),
        Command::Probe { video } => {
            run_probe(&video);
            Ok(())
        }
        Command::Detect(args) => {
            runner::run(&DetectConfig::from(args))?;
            Ok(())
        }
    }
}

fn run_extract(args: ExtractArgs) -> Result<()> {
    let config = match args.video {
        Some(video) if !args.interactive => ExtractConfig {
            video_path: video,
            davis_dir: args.davis_dir,
            sequence_name: args
                .sequence_name
                .context("--sequence-name is required unless running interactively")?,
            first_frame: args.first_frame,
        },
        _ => prompt_extract_config(&mut io::stdin().lock(), &mut io::stdout())?,
    };
    config.validate()?;

    info!("Extracting {:?} as sequence '{}'", config.video_path, config.sequence_name);
    match extractor::extract_video(&config)? {
        ExtractOutcome::SourceUnreadable => {}
        ExtractOutcome::Completed(summary) => {
            debug!(
                "Frames in {:?}, manifest {:?}, masks belong in {:?}",
                summary.frames_dir, summary.manifest_path, summary.annotations_dir
            );
            if let Some((index, path)) = summary.first_frame {
                if index < summary.frame_count {
                    info!("Frame {} from the video replaced your first frame at {:?}", index, path);
                }
            }
        }
    }
    Ok(())
}

fn run_probe(video: &Path) {
    match probe::probe_video(video) {
        Ok(report) => {
            println!("FPS: {}", report.fps);
            println!("Total frames: {}", report.frame_count);
            println!("Video duration: {:.2} seconds", report.duration);
        }
        Err(MediaError::SourceUnreadable { .. }) => {
            error!("Error: Could not open video file {}", video.display());
        }
        Err(e) => error!("An error occurred: {}", e),
    }
}
