use walkdir::{WalkDir, DirEntry};
use std::path::{Path, PathBuf};
use crossbeam::channel::Sender;
use anyhow::{bail, Result};
use tracing::debug;

use crate::media::mimetype::{detect_media_kind, MediaKind};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaSource {
    pub path: PathBuf,
    pub kind: MediaKind,
}

/// Sends every image and video under `root` (or `root` itself when it is a
/// file) down `tx`. Stops early once the receiver hangs up.
pub fn scan_sources(root: &Path, tx: Sender<MediaSource>) -> Result<()> {
    if root.is_file() {
        let kind = detect_media_kind(root)?;
        if kind == MediaKind::Other {
            bail!("{:?} is neither an image nor a video", root);
        }
        let _ = tx.send(MediaSource { path: root.to_path_buf(), kind });
        return Ok(());
    }
    if !root.is_dir() {
        bail!("source {:?} does not exist", root);
    }

    let walker = WalkDir::new(root).sort_by_file_name().into_iter();

    for entry in walker.filter_entry(|e| e.depth() == 0 || !is_hidden(e)) {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }
        let path = entry.into_path();
        match detect_media_kind(&path)? {
            MediaKind::Other => debug!("Skipping {:?}: not an image or video", path),
            kind => {
                if tx.send(MediaSource { path, kind }).is_err() {
                    break;
                }
            }
        }
    }
    Ok(())
}

fn is_hidden(entry: &DirEntry) -> bool {
    entry.file_name()
         .to_str()
         .map(|s| s.starts_with('.'))
         .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossbeam::channel::unbounded;
    use image::{Rgb, RgbImage};
    use std::fs;

    fn collect(root: &Path) -> Result<Vec<MediaSource>> {
        let (tx, rx) = unbounded();
        scan_sources(root, tx)?;
        Ok(rx.into_iter().collect())
    }

    #[test]
    fn test_scan_directory_skips_hidden_and_other_files() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let nested = dir.path().join("row_2");
        let hidden = dir.path().join(".cache");
        fs::create_dir_all(&nested)?;
        fs::create_dir_all(&hidden)?;

        let pixel = RgbImage::from_pixel(4, 4, Rgb([1, 2, 3]));
        pixel.save(dir.path().join("a.png"))?;
        pixel.save(nested.join("b.jpg"))?;
        pixel.save(hidden.join("c.jpg"))?;
        fs::write(dir.path().join("readme.txt"), "not media")?;

        let sources = collect(dir.path())?;
        let paths: Vec<PathBuf> = sources.iter().map(|s| s.path.clone()).collect();
        assert_eq!(paths, vec![dir.path().join("a.png"), nested.join("b.jpg")]);
        assert!(sources.iter().all(|s| s.kind == MediaKind::Image));
        Ok(())
    }

    #[test]
    fn test_scan_single_file() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let image = dir.path().join("bus.jpg");
        RgbImage::new(4, 4).save(&image)?;
        assert_eq!(
            collect(&image)?,
            vec![MediaSource { path: image.clone(), kind: MediaKind::Image }]
        );

        let text = dir.path().join("notes.txt");
        fs::write(&text, "hello")?;
        assert!(collect(&text).is_err());
        assert!(collect(&dir.path().join("missing")).is_err());
        Ok(())
    }
}
