use std::fs::File;
use std::io::{Write, BufRead, BufReader};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;
use anyhow::{Result, Context};
use thiserror::Error;
use tracing::{info, warn};

pub const DEFAULT_DAVIS_DIR: &str = "./DAVIS";
const WEIGHTS_ENV_KEY: &str = "DETECT_WEIGHTS_PATH";
const WEIGHTS_SEARCH_DEPTH: usize = 5;

#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("sequence name must not be empty")]
    EmptySequenceName,

    #[error("video path must not be empty")]
    EmptyVideoPath,

    #[error("first frame image {0:?} does not exist")]
    MissingFirstFrame(PathBuf),

    #[error("{name} must be within [0, 1], got {value}")]
    ThresholdOutOfRange { name: &'static str, value: f32 },

    #[error("unknown device selector '{0}' (expected '', 'cpu', 'cuda', 'cuda:N', 'N' or 'mps')")]
    UnknownDevice(String),

    #[error("could not find model weights '{0}' in nearby directories")]
    WeightsNotFound(String),
}

/// Everything the frame extractor needs, checked before any I/O starts.
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractConfig {
    pub video_path: PathBuf,
    pub davis_dir: PathBuf,
    pub sequence_name: String,
    pub first_frame: Option<PathBuf>,
}

impl ExtractConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.video_path.as_os_str().is_empty() {
            return Err(ConfigError::EmptyVideoPath);
        }
        if self.sequence_name.trim().is_empty() {
            return Err(ConfigError::EmptySequenceName);
        }
        if self.sequence_name.contains(['/', '\\']) {
            warn!(
                "Sequence name '{}' contains a path separator; frames will land in a nested directory",
                self.sequence_name
            );
        }
        if let Some(first_frame) = &self.first_frame {
            if !first_frame.is_file() {
                return Err(ConfigError::MissingFirstFrame(first_frame.clone()));
            }
        }
        Ok(())
    }
}

/// Options of the detection runner.
#[derive(Debug, Clone, PartialEq)]
pub struct DetectConfig {
    pub weights: PathBuf,
    pub source: PathBuf,
    pub conf_thres: f32,
    pub iou_thres: f32,
    pub device: Device,
    pub view_img: bool,
    pub save_txt: bool,
    pub project: PathBuf,
    pub name: String,
    pub hide_labels: bool,
    pub hide_conf: bool,
}

impl Default for DetectConfig {
    fn default() -> Self {
        Self {
            weights: PathBuf::from("yolov8n.onnx"),
            source: PathBuf::from("data/images"),
            conf_thres: 0.25,
            iou_thres: 0.45,
            device: Device::Auto,
            view_img: false,
            save_txt: false,
            project: PathBuf::from("runs/detect"),
            name: "exp".to_string(),
            hide_labels: false,
            hide_conf: false,
        }
    }
}

impl DetectConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (name, value) in [("conf-thres", self.conf_thres), ("iou-thres", self.iou_thres)] {
            if !(0.0..=1.0).contains(&value) {
                return Err(ConfigError::ThresholdOutOfRange { name, value });
            }
        }
        Ok(())
    }

    /// `<project>/<name>`
    pub fn save_dir(&self) -> PathBuf {
        self.project.join(&self.name)
    }
}

/// Inference device selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Device {
    /// CUDA when available, CPU otherwise.
    Auto,
    Cpu,
    Cuda(i32),
    CoreMl,
}

impl std::str::FromStr for Device {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let selector = s.trim().to_ascii_lowercase();
        let unknown = || ConfigError::UnknownDevice(s.to_string());

        match selector.as_str() {
            "" => Ok(Device::Auto),
            "cpu" => Ok(Device::Cpu),
            "cuda" => Ok(Device::Cuda(0)),
            "mps" | "coreml" => Ok(Device::CoreMl),
            other => {
                let ids = other.strip_prefix("cuda:").unwrap_or(other);
                // "0,1" selects several GPUs upstream; a single session uses the first.
                let first = ids.split(',').next().ok_or_else(unknown)?;
                first.trim().parse::<i32>().map(Device::Cuda).map_err(|_| unknown())
            }
        }
    }
}

/// Locates model weights.
/// Uses the path as given if it exists, then the `.env` cache, then searches
/// the filesystem and caches what it finds.
pub fn resolve_weights(requested: &Path) -> Result<PathBuf> {
    resolve_weights_with(requested, Path::new(".env"), &std::env::current_dir()?)
}

fn resolve_weights_with(requested: &Path, env_path: &Path, search_root: &Path) -> Result<PathBuf> {
    if requested.is_file() {
        return Ok(requested.to_path_buf());
    }

    let file_name = requested
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .ok_or_else(|| ConfigError::WeightsNotFound(requested.display().to_string()))?;

    // 1. Try the cached location
    if env_path.exists() {
        if let Ok(cached) = load_from_env(env_path) {
            if cached.is_file() && cached.file_name() == requested.file_name() {
                info!("Loaded weights path from {:?}", env_path);
                return Ok(cached);
            }
        }
    }

    // 2. Search the filesystem
    info!("Weights {:?} not found, searching nearby directories...", requested);
    let found = find_file(&file_name, search_root, WEIGHTS_SEARCH_DEPTH)
        .ok_or(ConfigError::WeightsNotFound(file_name))?;
    info!("Found weights: {:?}", found);

    // 3. Cache for next time
    save_to_env(env_path, &found)?;
    info!("Saved weights path to {:?}", env_path);

    Ok(found)
}

fn find_file(filename: &str, root: &Path, max_depth: usize) -> Option<PathBuf> {
    let search = |dir: &Path| {
        WalkDir::new(dir)
            .max_depth(max_depth)
            .into_iter()
            .filter_map(|e| e.ok())
            .find(|e| e.file_type().is_file() && e.file_name() == filename)
            .map(|e| e.path().to_path_buf())
    };

    // The parent covers running from a subdirectory of the project.
    search(root).or_else(|| root.parent().and_then(search))
}

fn load_from_env(path: &Path) -> Result<PathBuf> {
    let file = File::open(path)?;
    let reader = BufReader::new(file);

    for line in reader.lines() {
        let line = line?;
        if let Some((key, value)) = line.split_once('=') {
            if key.trim() == WEIGHTS_ENV_KEY {
                return Ok(PathBuf::from(value.trim()));
            }
        }
    }

    anyhow::bail!("{} missing from {:?}", WEIGHTS_ENV_KEY, path)
}

fn save_to_env(path: &Path, weights: &Path) -> Result<()> {
    let mut file = File::create(path).context("Failed to create .env file")?;
    writeln!(file, "{}={}", WEIGHTS_ENV_KEY, weights.display())?;
    Ok(())
}
