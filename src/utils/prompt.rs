use std::io::{BufRead, Write};
use std::path::PathBuf;

use anyhow::{Context, Result};

use super::config::{ExtractConfig, DEFAULT_DAVIS_DIR};

/// Asks for every extraction parameter in turn and returns them as one config.
/// Nothing touches the filesystem until all answers are in.
pub fn prompt_extract_config<R: BufRead, W: Write>(input: &mut R, output: &mut W) -> Result<ExtractConfig> {
    let video_path = ask(input, output, "Enter the path to the input video file: ")?;
    let davis_dir = ask(
        input,
        output,
        &format!("Enter the path to the DAVIS dataset directory (default: {}): ", DEFAULT_DAVIS_DIR),
    )?;
    let sequence_name = ask(input, output, "Enter the name for this video sequence: ")?;
    let first_frame = ask(input, output, "Enter the path to your FFMPEG-extracted first frame (optional): ")?;

    Ok(ExtractConfig {
        video_path: PathBuf::from(video_path),
        davis_dir: PathBuf::from(if davis_dir.is_empty() { DEFAULT_DAVIS_DIR.to_string() } else { davis_dir }),
        sequence_name,
        first_frame: (!first_frame.is_empty()).then(|| PathBuf::from(first_frame)),
    })
}

fn ask<R: BufRead, W: Write>(input: &mut R, output: &mut W, question: &str) -> Result<String> {
    write!(output, "{}", question)?;
    output.flush()?;

    let mut line = String::new();
    input.read_line(&mut line).context("Failed to read answer from stdin")?;
    Ok(line.trim().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_prompt_applies_defaults() -> Result<()> {
        let mut input = Cursor::new("clip.mp4\n\norchard\n\n");
        let mut output = Vec::new();

        let config = prompt_extract_config(&mut input, &mut output)?;
        assert_eq!(config.video_path, PathBuf::from("clip.mp4"));
        assert_eq!(config.davis_dir, PathBuf::from("./DAVIS"));
        assert_eq!(config.sequence_name, "orchard");
        assert_eq!(config.first_frame, None);

        let asked = String::from_utf8(output)?;
        assert!(asked.starts_with("Enter the path to the input video file: "));
        assert!(asked.contains("(default: ./DAVIS)"));
        Ok(())
    }

    #[test]
    fn test_prompt_keeps_given_answers() -> Result<()> {
        let mut input = Cursor::new("  clip.mp4 \n/data/DAVIS\nrow_3\nframe_1s.jpg\n");
        let config = prompt_extract_config(&mut input, &mut Vec::new())?;
        assert_eq!(config.video_path, PathBuf::from("clip.mp4"));
        assert_eq!(config.davis_dir, PathBuf::from("/data/DAVIS"));
        assert_eq!(config.sequence_name, "row_3");
        assert_eq!(config.first_frame, Some(PathBuf::from("frame_1s.jpg")));
        Ok(())
    }

    #[test]
    fn test_prompt_on_closed_stdin_yields_empty_answers() -> Result<()> {
        let config = prompt_extract_config(&mut Cursor::new(""), &mut Vec::new())?;
        assert!(config.validate().is_err());
        Ok(())
    }
}
