use std::path::Path;

use super::ffmpeg::probe_stream;
use super::{MediaError, StreamInfo};

#[derive(Debug, Clone, PartialEq)]
pub struct ProbeReport {
    pub fps: f64,
    pub frame_count: u64,
    /// Seconds, computed as `frame_count / fps`. Falls back to the container
    /// duration when the stream reports no rate.
    pub duration: f64,
}

impl From<&StreamInfo> for ProbeReport {
    fn from(info: &StreamInfo) -> Self {
        let frame_count = info.frame_count.unwrap_or(0);
        let duration = if info.frame_rate > 0.0 {
            frame_count as f64 / info.frame_rate
        } else {
            info.duration.unwrap_or(0.0)
        };
        Self {
            fps: info.frame_rate,
            frame_count,
            duration,
        }
    }
}

pub fn probe_video(path: &Path) -> Result<ProbeReport, MediaError> {
    let info = probe_stream(path)?;
    Ok(ProbeReport::from(&info))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media::ffmpeg::test_support::make_test_video;

    #[test]
    fn test_duration_is_frames_over_fps() {
        let info = StreamInfo {
            width: 640,
            height: 480,
            frame_rate: 30.0,
            frame_count: Some(90),
            duration: Some(3.02),
        };
        let report = ProbeReport::from(&info);
        assert_eq!(report.fps, 30.0);
        assert_eq!(report.frame_count, 90);
        assert_eq!(report.duration, 3.0);
    }

    #[test]
    fn test_zero_fps_uses_container_duration() {
        let info = StreamInfo {
            width: 640,
            height: 480,
            frame_rate: 0.0,
            frame_count: None,
            duration: Some(4.5),
        };
        let report = ProbeReport::from(&info);
        assert_eq!(report.frame_count, 0);
        assert_eq!(report.duration, 4.5);

        let unknown = StreamInfo { duration: None, ..info };
        assert_eq!(ProbeReport::from(&unknown).duration, 0.0);
    }

    #[test]
    fn test_probe_real_video() {
        let dir = tempfile::tempdir().unwrap();
        let Some(video) = make_test_video(dir.path(), "probe.mkv", 3, 10) else {
            return;
        };
        let report = probe_video(&video).unwrap();
        assert_eq!(report.fps, 10.0);
        assert_eq!(report.frame_count, 30);
        assert!((report.duration - 3.0).abs() < 1e-9);
    }
}
