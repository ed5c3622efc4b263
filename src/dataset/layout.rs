use std::path::PathBuf;

const YEAR: &str = "2017";
const RESOLUTION: &str = "480p";
const MANIFEST_NAME: &str = "val.txt";

/// Paths of one sequence inside a DAVIS 2017 dataset root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DavisLayout {
    root: PathBuf,
    sequence: String,
}

impl DavisLayout {
    pub fn new(root: impl Into<PathBuf>, sequence: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            sequence: sequence.into(),
        }
    }

    pub fn sequence(&self) -> &str {
        &self.sequence
    }

    /// `<root>/2017/JPEGImages/480p/<sequence>`
    pub fn frames_dir(&self) -> PathBuf {
        self.root
            .join(YEAR)
            .join("JPEGImages")
            .join(RESOLUTION)
            .join(&self.sequence)
    }

    /// `<root>/2017/ImageSets/2017`
    pub fn image_sets_dir(&self) -> PathBuf {
        self.root.join(YEAR).join("ImageSets").join(YEAR)
    }

    pub fn manifest_path(&self) -> PathBuf {
        self.image_sets_dir().join(MANIFEST_NAME)
    }

    /// Where the first-frame mask belongs. Never created by this crate.
    pub fn annotations_dir(&self) -> PathBuf {
        self.root
            .join(YEAR)
            .join("Annotations")
            .join(RESOLUTION)
            .join(&self.sequence)
    }

    pub fn frame_path(&self, index: u64) -> PathBuf {
        self.frames_dir().join(frame_file_name(index))
    }
}

/// Zero-padded five digit JPEG name, e.g. `00042.jpg`.
pub fn frame_file_name(index: u64) -> String {
    format!("{:05}.jpg", index)
}
