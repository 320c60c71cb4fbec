//! Rendering segments as plain text and SRT.

use super::Segment;

/// Format seconds as `HH:MM:SS,mmm`. Every unit is floored.
///
/// Milliseconds are nudged by `1e-6` before flooring so that values like
/// `1.001` don't lose a millisecond to binary representation. Anything less
/// than a nanosecond under a millisecond boundary renders as the boundary.
///
/// ```
/// use murmur_core::format_timestamp;
/// assert_eq!(format_timestamp(3661.2345), "01:01:01,234");
/// ```
pub fn format_timestamp(seconds: f64) -> String {
    let seconds = if seconds.is_finite() && seconds > 0.0 {
        seconds
    } else {
        0.0
    };
    let whole = seconds.floor();
    let millis = (((seconds - whole) * 1000.0) + 1e-6).floor().min(999.0) as u64;
    let whole = whole as u64;

    let hours = whole / 3600;
    let minutes = (whole % 3600) / 60;
    let secs = whole % 60;
    format!("{hours:02}:{minutes:02}:{secs:02},{millis:03}")
}

/// Segment texts joined by a single space.
pub fn to_plain_text(segments: &[Segment]) -> String {
    segments
        .iter()
        .map(|s| s.text.trim())
        .filter(|t| !t.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

/// SubRip rendering: numbered blocks separated by a blank line.
pub fn to_srt(segments: &[Segment]) -> String {
    segments
        .iter()
        .enumerate()
        .map(|(i, s)| {
            format!(
                "{}\n{} --> {}\n{}\n",
                i + 1,
                format_timestamp(s.start),
                format_timestamp(s.end),
                s.text.trim()
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}
