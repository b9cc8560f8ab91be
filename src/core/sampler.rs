use crate::core::error::{Result, StoryboardError};

/// Margin kept clear at both ends of the video so automatic captures don't
/// land on black lead-in/lead-out frames.
pub const EDGE_MARGIN_MS: i64 = 1000;

/// Compute `steps` evenly spaced capture timestamps across a video of
/// `duration_ms` milliseconds, keeping [`EDGE_MARGIN_MS`] clear at each end.
///
/// The spacing formula divides by `steps - 1`, so fewer than two steps is
/// rejected, as is a duration too short to hold both margins.
pub fn sample(duration_ms: i64, steps: u32) -> Result<Vec<i64>> {
    if steps < 2 {
        return Err(StoryboardError::InvalidParameter(format!(
            "at least 2 capture steps required, got {}",
            steps
        )));
    }
    if duration_ms <= 0 {
        return Err(StoryboardError::InvalidParameter(format!(
            "video duration must be positive, got {} ms",
            duration_ms
        )));
    }
    let span = duration_ms - 2 * EDGE_MARGIN_MS;
    if span <= 0 {
        return Err(StoryboardError::InvalidParameter(format!(
            "video too short to sample: {} ms",
            duration_ms
        )));
    }

    let last = i64::from(steps) - 1;
    Ok((0..i64::from(steps))
        .map(|i| EDGE_MARGIN_MS + i * span / last)
        .collect())
}

/// A millisecond offset into the video, split into display fields.
///
/// The `token()` rendering is the canonical external key for a capture: it
/// names the screenshot file and is what `keyframes.txt` records. Tokens are
/// distinct for offsets that differ by at least 1 ms.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timecode {
    pub hours: i64,
    pub minutes: i64,
    pub seconds: i64,
    pub millis: i64,
}

impl Timecode {
    pub fn from_millis(offset_ms: i64) -> Self {
        let offset_ms = offset_ms.max(0);
        let total_seconds = offset_ms / 1000;
        Self {
            hours: total_seconds / 3600,
            minutes: (total_seconds % 3600) / 60,
            seconds: total_seconds % 60,
            millis: offset_ms % 1000,
        }
    }

    /// Filename-safe rendering: `HH.MM.SS.mmm`.
    pub fn token(&self) -> String {
        format!(
            "{:02}.{:02}.{:02}.{:03}",
            self.hours, self.minutes, self.seconds, self.millis
        )
    }

    /// `HH:MM:SS.mmm`, the form ffmpeg accepts for `-ss`.
    pub fn ffmpeg_position(&self) -> String {
        format!(
            "{:02}:{:02}:{:02}.{:03}",
            self.hours, self.minutes, self.seconds, self.millis
        )
    }
}

/// Canonical screenshot file name for a timestamp token.
pub fn screenshot_file_name(token: &str) -> String {
    format!("Screenshot={}=.jpg", token)
}

/// Recognizes files produced by [`screenshot_file_name`], used by the
/// composer's cleanup pass.
pub fn is_screenshot_file(file_name: &str) -> bool {
    file_name.starts_with("Screenshot=") && file_name.ends_with("=.jpg")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sample_reference_spacing() {
        // 30 s video, 4 steps: margin, then thirds of the remaining span.
        let times = sample(30000, 4).unwrap();
        assert_eq!(times, vec![1000, 10333, 19666, 29000]);
    }

    #[test]
    fn test_sample_bounds_and_monotonicity() {
        let duration = 3_600_000;
        let times = sample(duration, 30).unwrap();
        assert_eq!(times.len(), 30);
        assert!(times[0] >= EDGE_MARGIN_MS);
        assert!(*times.last().unwrap() <= duration - EDGE_MARGIN_MS);
        for pair in times.windows(2) {
            assert!(pair[0] < pair[1], "timestamps must increase: {:?}", pair);
        }
    }

    #[test]
    fn test_sample_two_steps_hits_both_margins() {
        let times = sample(10000, 2).unwrap();
        assert_eq!(times, vec![1000, 9000]);
    }

    #[test]
    fn test_sample_rejects_single_step() {
        assert!(matches!(
            sample(30000, 1),
            Err(StoryboardError::InvalidParameter(_))
        ));
        assert!(matches!(
            sample(30000, 0),
            Err(StoryboardError::InvalidParameter(_))
        ));
    }

    #[test]
    fn test_sample_rejects_bad_duration() {
        assert!(matches!(
            sample(0, 5),
            Err(StoryboardError::InvalidParameter(_))
        ));
        assert!(matches!(
            sample(-100, 5),
            Err(StoryboardError::InvalidParameter(_))
        ));
        // Too short to keep both margins clear.
        assert!(matches!(
            sample(1500, 5),
            Err(StoryboardError::InvalidParameter(_))
        ));
    }

    #[test]
    fn test_token_rendering() {
        // 65.5 s into the video.
        assert_eq!(Timecode::from_millis(65_500).token(), "00.01.05.500");
        assert_eq!(Timecode::from_millis(0).token(), "00.00.00.000");
        assert_eq!(Timecode::from_millis(3_661_042).token(), "01.01.01.042");
    }

    #[test]
    fn test_tokens_distinct_at_millisecond_granularity() {
        let a = Timecode::from_millis(1_234_567).token();
        let b = Timecode::from_millis(1_234_568).token();
        assert_ne!(a, b);
    }

    #[test]
    fn test_ffmpeg_position_rendering() {
        assert_eq!(Timecode::from_millis(65_500).ffmpeg_position(), "00:01:05.500");
    }

    #[test]
    fn test_screenshot_file_name_round_trip() {
        let name = screenshot_file_name("00.01.05.500");
        assert_eq!(name, "Screenshot=00.01.05.500=.jpg");
        assert!(is_screenshot_file(&name));
        assert!(!is_screenshot_file("Storyboard-video.mp4.jpg"));
        assert!(!is_screenshot_file("Screenshot=partial.png"));
    }
}
