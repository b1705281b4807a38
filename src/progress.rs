//! Percentage extraction from extraction-tool output lines
//!
//! yt-dlp reports progress as lines such as
//! `[download]  42.7% of ~ 12.30MiB at  1.21MiB/s ETA 00:09`. The extractor only
//! looks for the first numeric token glued to a `%` sign, so it works for any tool
//! that reports progress that way.

use regex::Regex;
use std::sync::LazyLock;

static PERCENT_TOKEN: LazyLock<Option<Regex>> = LazyLock::new(|| {
    Regex::new(r"[-+]?(?:\d+(?:\.\d+)?|\.\d+)%")
        .map_err(|e| tracing::error!(error = %e, "percent token pattern failed to compile"))
        .ok()
});

/// Stateless parser turning output lines into completion percentages
#[derive(Clone, Copy, Debug, Default)]
pub struct ProgressExtractor;

impl ProgressExtractor {
    /// Percentage in `[0, 100]` carried by the first `N%` token of `line`
    ///
    /// Returns `None` when the line has no such token, in which case callers must
    /// keep their previous progress.
    pub fn extract(line: &str) -> Option<f64> {
        let token = PERCENT_TOKEN.as_ref()?.find(line)?;
        let number = token.as_str().trim_end_matches('%');
        let value: f64 = number.parse().ok()?;
        if value.is_nan() {
            return None;
        }
        Some(value.clamp(0.0, 100.0))
    }

    /// Same as [`extract`](Self::extract) scaled to `[0, 1]`
    pub fn fraction(line: &str) -> Option<f64> {
        Self::extract(line).map(|percent| percent / 100.0)
    }
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lines_without_percent_yield_nothing() {
        for line in [
            "",
            "[youtube:tab] Downloading playlist PL123 - add --no-playlist to download just the video",
            "[download] Destination: My List/01 - Intro.webm",
            "50 percent done",
            "%",
            "abc%",
        ] {
            assert_eq!(ProgressExtractor::extract(line), None, "line: {line:?}");
        }
    }

    #[test]
    fn parses_yt_dlp_download_line() {
        let line = "[download]  42.7% of ~  12.30MiB at    1.21MiB/s ETA 00:09 (frag 3/10)";
        assert_eq!(ProgressExtractor::extract(line), Some(42.7));
    }

    #[test]
    fn integer_and_decimal_tokens() {
        assert_eq!(ProgressExtractor::extract("download 100%"), Some(100.0));
        assert_eq!(ProgressExtractor::extract("download 50.0%"), Some(50.0));
        assert_eq!(ProgressExtractor::extract("at .5% now"), Some(0.5));
        assert_eq!(ProgressExtractor::extract("0%"), Some(0.0));
    }

    #[test]
    fn first_token_wins() {
        assert_eq!(
            ProgressExtractor::extract("item 3 at 10% (overall 80%)"),
            Some(10.0)
        );
    }

    #[test]
    fn space_before_percent_is_not_a_token() {
        assert_eq!(ProgressExtractor::extract("about 50 % done"), None);
    }

    #[test]
    fn out_of_range_values_clamp() {
        assert_eq!(ProgressExtractor::extract("overshoot 150%"), Some(100.0));
        assert_eq!(ProgressExtractor::extract("weird -5%"), Some(0.0));
        assert_eq!(
            ProgressExtractor::extract("huge 99999999999999999999999%"),
            Some(100.0)
        );
    }

    #[test]
    fn fraction_is_percent_over_hundred() {
        for n in [0.0, 12.5, 33.3, 50.0, 99.9, 100.0] {
            let line = format!("[download] {n}% of 3.00MiB");
            let fraction = ProgressExtractor::fraction(&line).unwrap();
            assert!((fraction - n / 100.0).abs() < 1e-12, "n = {n}");
            assert!((0.0..=1.0).contains(&fraction));
        }
    }
}
