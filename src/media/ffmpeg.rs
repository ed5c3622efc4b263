use std::io::{BufReader, Read, Write};
use std::path::Path;
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};

use image::RgbImage;
use serde::Deserialize;
use tracing::debug;

use super::{FrameSource, MediaError, StreamInfo};

#[derive(Debug, Deserialize)]
struct ProbeOutput {
    #[serde(default)]
    streams: Vec<ProbeStream>,
    format: Option<ProbeFormat>,
}

#[derive(Debug, Deserialize)]
struct ProbeStream {
    width: Option<u32>,
    height: Option<u32>,
    avg_frame_rate: Option<String>,
    r_frame_rate: Option<String>,
    nb_frames: Option<String>,
    duration: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ProbeFormat {
    duration: Option<String>,
}

/// Reads the properties of the first video stream of `path` with ffprobe.
pub fn probe_stream(path: &Path) -> Result<StreamInfo, MediaError> {
    let output = Command::new("ffprobe")
        .arg("-v")
        .arg("error")
        .arg("-select_streams")
        .arg("v:0")
        .arg("-show_entries")
        .arg("stream=width,height,avg_frame_rate,r_frame_rate,nb_frames,duration:format=duration")
        .arg("-of")
        .arg("json")
        .arg(path)
        .stdin(Stdio::null())
        .output()
        .map_err(|source| MediaError::Spawn { program: "ffprobe", source })?;

    if !output.status.success() {
        let reason = String::from_utf8_lossy(&output.stderr).trim().to_string();
        return Err(MediaError::SourceUnreadable {
            path: path.to_path_buf(),
            reason: if reason.is_empty() { "ffprobe exited with non-zero status".to_string() } else { reason },
        });
    }

    parse_probe_output(&output.stdout).map_err(|e| match e {
        MediaError::Probe(reason) => MediaError::SourceUnreadable {
            path: path.to_path_buf(),
            reason,
        },
        other => other,
    })
}

fn parse_probe_output(json: &[u8]) -> Result<StreamInfo, MediaError> {
    let probe: ProbeOutput = serde_json::from_slice(json)?;
    let stream = probe
        .streams
        .into_iter()
        .next()
        .ok_or_else(|| MediaError::Probe("no video stream".to_string()))?;

    let (width, height) = match (stream.width, stream.height) {
        (Some(w), Some(h)) if w > 0 && h > 0 => (w, h),
        _ => return Err(MediaError::Probe("video stream has no dimensions".to_string())),
    };

    let frame_rate = stream
        .avg_frame_rate
        .as_deref()
        .and_then(parse_rational)
        .or_else(|| stream.r_frame_rate.as_deref().and_then(parse_rational))
        .unwrap_or(0.0);

    let duration = stream
        .duration
        .as_deref()
        .and_then(|d| d.parse::<f64>().ok())
        .or_else(|| {
            probe
                .format
                .and_then(|f| f.duration)
                .and_then(|d| d.parse::<f64>().ok())
        });

    let frame_count = stream
        .nb_frames
        .as_deref()
        .and_then(|n| n.parse::<u64>().ok())
        .or_else(|| match duration {
            Some(d) if frame_rate > 0.0 => Some((d * frame_rate).round() as u64),
            _ => None,
        });

    Ok(StreamInfo {
        width,
        height,
        frame_rate,
        frame_count,
        duration,
    })
}

/// Parses an ffprobe rate such as `30000/1001`. Zero or undefined rates yield `None`.
fn parse_rational(value: &str) -> Option<f64> {
    let rate = match value.split_once('/') {
        Some((num, den)) => {
            let num: f64 = num.trim().parse().ok()?;
            let den: f64 = den.trim().parse().ok()?;
            if den == 0.0 {
                return None;
            }
            num / den
        }
        None => value.trim().parse().ok()?,
    };
    (rate.is_finite() && rate > 0.0).then_some(rate)
}

/// Sequential decoder backed by an `ffmpeg` child process emitting packed
/// `rgb24` frames on stdout.
pub struct FfmpegDecoder {
    child: Child,
    stdout: BufReader<ChildStdout>,
    info: StreamInfo,
    frame_len: usize,
    finished: bool,
}

impl FfmpegDecoder {
    pub fn open(path: &Path) -> Result<Self, MediaError> {
        let info = probe_stream(path)?;

        // -noautorotate keeps the output size equal to the probed size.
        let mut child = Command::new("ffmpeg")
            .arg("-nostdin")
            .arg("-v")
            .arg("error")
            .arg("-noautorotate")
            .arg("-i")
            .arg(path)
            .arg("-map")
            .arg("0:v:0")
            .arg("-vsync")
            .arg("passthrough")
            .arg("-f")
            .arg("rawvideo")
            .arg("-pix_fmt")
            .arg("rgb24")
            .arg("-")
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|source| MediaError::Spawn { program: "ffmpeg", source })?;

        let stdout = match child.stdout.take() {
            Some(stdout) => stdout,
            None => {
                let _ = child.kill();
                let _ = child.wait();
                return Err(MediaError::Io(std::io::Error::other("ffmpeg stdout was not captured")));
            }
        };

        let frame_len = info.width as usize * info.height as usize * 3;
        debug!("Decoding {:?} as {}x{} rgb24 ({} bytes per frame)", path, info.width, info.height, frame_len);

        Ok(Self {
            child,
            stdout: BufReader::new(stdout),
            info,
            frame_len,
            finished: false,
        })
    }

    pub fn info(&self) -> &StreamInfo {
        &self.info
    }
}

impl FrameSource for FfmpegDecoder {
    fn frame_rate(&self) -> f64 {
        self.info.frame_rate
    }

    fn frame_count(&self) -> Option<u64> {
        self.info.frame_count
    }

    fn next_frame(&mut self) -> Option<RgbImage> {
        if self.finished {
            return None;
        }
        let mut buffer = vec![0u8; self.frame_len];
        match self.stdout.read_exact(&mut buffer) {
            Ok(()) => RgbImage::from_raw(self.info.width, self.info.height, buffer),
            Err(e) => {
                debug!("ffmpeg stream ended: {}", e);
                self.finished = true;
                None
            }
        }
    }
}

impl Drop for FfmpegDecoder {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

/// Encodes `rgb24` frames into a video file through an `ffmpeg` child process.
pub struct FfmpegEncoder {
    child: Child,
    stdin: Option<ChildStdin>,
    width: u32,
    height: u32,
}

impl FfmpegEncoder {
    pub fn create(path: &Path, width: u32, height: u32, frame_rate: f64) -> Result<Self, MediaError> {
        let frame_rate = if frame_rate > 0.0 { frame_rate } else { 25.0 };

        let mut child = Command::new("ffmpeg")
            .arg("-y")
            .arg("-v")
            .arg("error")
            .arg("-f")
            .arg("rawvideo")
            .arg("-pix_fmt")
            .arg("rgb24")
            .arg("-s")
            .arg(format!("{}x{}", width, height))
            .arg("-r")
            .arg(format!("{}", frame_rate))
            .arg("-i")
            .arg("-")
            .arg("-pix_fmt")
            .arg("yuv420p")
            .arg(path)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|source| MediaError::Spawn { program: "ffmpeg", source })?;

        let stdin = child.stdin.take();
        Ok(Self {
            child,
            stdin,
            width,
            height,
        })
    }

    pub fn write_frame(&mut self, frame: &RgbImage) -> Result<(), MediaError> {
        if frame.width() != self.width || frame.height() != self.height {
            return Err(MediaError::Io(std::io::Error::other(format!(
                "frame is {}x{}, encoder expects {}x{}",
                frame.width(),
                frame.height(),
                self.width,
                self.height
            ))));
        }
        let stdin = self
            .stdin
            .as_mut()
            .ok_or_else(|| std::io::Error::other("ffmpeg stdin is closed"))?;
        stdin.write_all(frame.as_raw())?;
        Ok(())
    }

    /// Closes the input pipe and waits for ffmpeg to finish the container.
    pub fn finish(mut self) -> Result<(), MediaError> {
        drop(self.stdin.take());
        let status = self.child.wait()?;
        if !status.success() {
            return Err(MediaError::Io(std::io::Error::other(format!(
                "ffmpeg encoder exited with {}",
                status
            ))));
        }
        Ok(())
    }
}

impl Drop for FfmpegEncoder {
    fn drop(&mut self) {
        if self.stdin.take().is_some() {
            let _ = self.child.wait();
        }
    }
}


#[cfg(test)]
mod tests {
    use super::test_support::make_test_video;
    use super::*;

    #[test]
    fn test_parse_rational() {
        assert_eq!(parse_rational("30/1"), Some(30.0));
        assert_eq!(parse_rational("25"), Some(25.0));
        let ntsc = parse_rational("30000/1001").unwrap();
        assert!((ntsc - 29.97).abs() < 0.01);
        assert_eq!(parse_rational("0/0"), None);
        assert_eq!(parse_rational("0/1"), None);
        assert_eq!(parse_rational("garbage"), None);
    }

    #[test]
    fn test_parse_probe_output() {
        let json = br#"{
            "programs": [],
            "streams": [{
                "width": 854,
                "height": 480,
                "r_frame_rate": "30/1",
                "avg_frame_rate": "30/1",
                "duration": "3.000000",
                "nb_frames": "90"
            }],
            "format": { "duration": "3.021000" }
        }"#;
        let info = parse_probe_output(json).unwrap();
        assert_eq!(info.width, 854);
        assert_eq!(info.height, 480);
        assert_eq!(info.frame_rate, 30.0);
        assert_eq!(info.frame_count, Some(90));
        assert_eq!(info.duration, Some(3.0));
    }

    #[test]
    fn test_parse_probe_output_falls_back_to_format_duration() {
        // Matroska streams usually carry neither nb_frames nor a stream duration.
        let json = br#"{
            "streams": [{ "width": 64, "height": 48, "r_frame_rate": "25/1", "avg_frame_rate": "0/0" }],
            "format": { "duration": "2.000000" }
        }"#;
        let info = parse_probe_output(json).unwrap();
        assert_eq!(info.frame_rate, 25.0);
        assert_eq!(info.duration, Some(2.0));
        assert_eq!(info.frame_count, Some(50));
    }

    #[test]
    fn test_parse_probe_output_without_video_stream() {
        let json = br#"{ "streams": [] }"#;
        assert!(matches!(parse_probe_output(json), Err(MediaError::Probe(_))));
    }

    #[test]
    fn test_probe_missing_file_is_unreadable() {
        if !test_support::ffmpeg_available() {
            return;
        }
        let result = probe_stream(Path::new("/definitely/not/a/video.mp4"));
        assert!(matches!(result, Err(MediaError::SourceUnreadable { .. })));
    }

    #[test]
    fn test_decoder_reads_every_frame() {
        let dir = tempfile::tempdir().unwrap();
        let Some(video) = make_test_video(dir.path(), "testsrc.mkv", 2, 10) else {
            return;
        };

        let mut decoder = FfmpegDecoder::open(&video).unwrap();
        assert_eq!(decoder.frame_rate(), 10.0);
        assert_eq!(decoder.info().width, 64);

        let mut count = 0;
        while let Some(frame) = decoder.next_frame() {
            assert_eq!(frame.dimensions(), (64, 48));
            count += 1;
        }
        assert_eq!(count, 20);
        assert!(decoder.next_frame().is_none());
    }

    #[test]
    fn test_encoder_output_is_decodable() {
        let dir = tempfile::tempdir().unwrap();
        if !test_support::ffmpeg_available() {
            return;
        }
        let path = dir.path().join("out.mkv");
        let mut encoder = FfmpegEncoder::create(&path, 32, 32, 5.0).unwrap();
        for i in 0..5u8 {
            let frame = RgbImage::from_pixel(32, 32, image::Rgb([i * 40, 0, 0]));
            encoder.write_frame(&frame).unwrap();
        }
        assert!(encoder.write_frame(&RgbImage::new(8, 8)).is_err());
        encoder.finish().unwrap();

        let mut decoder = FfmpegDecoder::open(&path).unwrap();
        let mut count = 0;
        while decoder.next_frame().is_some() {
            count += 1;
        }
        assert_eq!(count, 5);
    }
}
