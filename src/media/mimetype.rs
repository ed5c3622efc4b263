use std::path::Path;
use anyhow::{Result, Context};
use infer::MatcherType;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaKind {
    Image,
    Video,
    Other,
}

/// Classifies a file by sniffing its magic bytes.
pub fn detect_media_kind(path: &Path) -> Result<MediaKind> {
    let kind = infer::get_from_path(path)
        .with_context(|| format!("Failed to read {:?} for media type detection", path))?;

    Ok(match kind.map(|k| k.matcher_type()) {
        Some(MatcherType::Image) => MediaKind::Image,
        Some(MatcherType::Video) => MediaKind::Video,
        _ => MediaKind::Other,
    })
}
