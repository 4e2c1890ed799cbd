//! Metadata extraction.
//!
//! The engine has no structured metadata API, so probing stages the file, asks
//! the engine to open it, and scrapes the diagnostic banner it prints. The
//! scraping lives in `parse_diagnostics`; callers only see `MetadataProbe`.

use async_trait::async_trait;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, LazyLock, Mutex};
use std::time::Duration;
use tracing::{debug, info};

use crate::bridge;
use crate::engine::{EngineHandle, ExecObserver};
use crate::error::{ClipsmithError, Result};

static DURATION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"Duration:\s*(\d+:\d{2}:\d{2}(?:\.\d+)?)").expect("duration pattern is valid")
});

static RESOLUTION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"Stream #\d+:\d+.*?Video:.*?\b(\d{2,5})x(\d{2,5})\b").expect("resolution pattern is valid")
});

static BITRATE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(\d+)\s*kb/s").expect("bitrate pattern is valid")
});

/// Facts about one input file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MediaMetadata {
    pub duration_seconds: f64,
    pub width: u32,
    pub height: u32,
    /// Zero when the engine did not report one
    pub bitrate_bps: u64,
    /// Size of the original input, not of anything the engine produced
    pub size_bytes: u64,
}

/// Fields recovered from diagnostic text
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedDiagnostics {
    pub duration_seconds: f64,
    pub width: u32,
    pub height: u32,
    pub bitrate_bps: u64,
}

/// Convert `HH:MM:SS[.fraction]` to seconds
pub fn clock_to_seconds(token: &str) -> Option<f64> {
    let mut parts = token.trim().splitn(3, ':');
    let hours: f64 = parts.next()?.parse().ok()?;
    let minutes: f64 = parts.next()?.parse().ok()?;
    let seconds: f64 = parts.next()?.parse().ok()?;
    if hours < 0.0 || !(0.0..60.0).contains(&minutes) || !(0.0..60.0).contains(&seconds) {
        return None;
    }
    Some(hours * 3600.0 + minutes * 60.0 + seconds)
}

/// Duration from the first `Duration:` token, if any
pub fn parse_duration(text: &str) -> Option<f64> {
    let caps = DURATION_RE.captures(text)?;
    clock_to_seconds(&caps[1])
}

fn parse_resolution(text: &str) -> Option<(u32, u32)> {
    text.lines().find_map(|line| {
        let caps = RESOLUTION_RE.captures(line)?;
        Some((caps[1].parse().ok()?, caps[2].parse().ok()?))
    })
}

fn parse_bitrate(text: &str) -> u64 {
    BITRATE_RE
        .captures(text)
        .and_then(|caps| caps[1].parse::<u64>().ok())
        .map(|kbps| kbps * 1000)
        .unwrap_or(0)
}

/// Recover duration, resolution and bitrate from an engine banner.
///
/// Duration and resolution are required; zero values count as missing.
pub fn parse_diagnostics(text: &str) -> Result<ParsedDiagnostics> {
    let duration_seconds = parse_duration(text)
        .ok_or_else(|| ClipsmithError::Extraction("no duration in probe output".to_string()))?;
    if duration_seconds <= 0.0 {
        return Err(ClipsmithError::Extraction("probe reported zero duration".to_string()));
    }

    let (width, height) = parse_resolution(text)
        .ok_or_else(|| ClipsmithError::Extraction("no video resolution in probe output".to_string()))?;
    if width == 0 || height == 0 {
        return Err(ClipsmithError::Extraction(format!(
            "probe reported invalid resolution {}x{}",
            width, height
        )));
    }

    Ok(ParsedDiagnostics {
        duration_seconds,
        width,
        height,
        bitrate_bps: parse_bitrate(text),
    })
}

/// Narrow seam for metadata extraction, so the banner scraping can be swapped
#[async_trait]
pub trait MetadataProbe: Send + Sync {
    async fn probe(&self, engine: &EngineHandle, bytes: &[u8]) -> Result<MediaMetadata>;
}

/// Probe by scraping the engine's diagnostic banner
pub struct DiagnosticProbe {
    timeout: Duration,
}

impl DiagnosticProbe {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    async fn run(&self, engine: &EngineHandle, name: &str, bytes: &[u8]) -> Result<ParsedDiagnostics> {
        bridge::stage(&**engine, name, bytes).await?;

        let banner = Arc::new(Mutex::new(String::new()));
        let sink = banner.clone();
        let observer = ExecObserver::new().on_log(move |line| {
            if let Ok(mut text) = sink.lock() {
                text.push_str(line);
                text.push('\n');
            }
        });

        let args = vec!["-hide_banner".to_string(), "-i".to_string(), name.to_string()];
        // Exits non-zero without an output file; only the banner matters
        match tokio::time::timeout(self.timeout, engine.exec(&args, &observer)).await {
            Ok(outcome) => {
                outcome?;
            }
            Err(_) => {
                return Err(ClipsmithError::ExecutionTimeout {
                    operation: "Metadata probe".to_string(),
                    seconds: self.timeout.as_secs(),
                });
            }
        }

        let text = banner.lock().map(|text| text.clone()).unwrap_or_default();
        debug!("Probe banner for {}:\n{}", name, text);
        parse_diagnostics(&text)
    }
}

#[async_trait]
impl MetadataProbe for DiagnosticProbe {
    async fn probe(&self, engine: &EngineHandle, bytes: &[u8]) -> Result<MediaMetadata> {
        if bytes.is_empty() {
            return Err(ClipsmithError::Validation("input file is empty".to_string()));
        }

        let name = bridge::unique_name("probe", None);
        let result = self.run(engine, &name, bytes).await;
        bridge::unstage(&**engine, &name).await;

        let parsed = result?;
        info!(
            "Probed {} bytes: {:.2}s {}x{} @ {} bps",
            bytes.len(),
            parsed.duration_seconds,
            parsed.width,
            parsed.height,
            parsed.bitrate_bps
        );

        Ok(MediaMetadata {
            duration_seconds: parsed.duration_seconds,
            width: parsed.width,
            height: parsed.height,
            bitrate_bps: parsed.bitrate_bps,
            size_bytes: bytes.len() as u64,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::testing::{FakeEngine, SAMPLE_BANNER};

    #[test]
    fn test_clock_to_seconds() {
        assert_eq!(clock_to_seconds("00:02:03.50"), Some(123.5));
        assert_eq!(clock_to_seconds("01:00:00"), Some(3600.0));
        assert_eq!(clock_to_seconds("N/A"), None);
        assert_eq!(clock_to_seconds("00:75:00.00"), None);
    }

    #[test]
    fn test_duration_from_banner() {
        let text = "  Duration: 00:02:03.50, start: 0.000000, bitrate: 1205 kb/s";
        assert_eq!(parse_duration(text), Some(123.5));
    }

    #[test]
    fn test_parse_full_banner() {
        let parsed = parse_diagnostics(SAMPLE_BANNER).unwrap();
        assert_eq!(parsed.duration_seconds, 30.0);
        assert_eq!((parsed.width, parsed.height), (1280, 720));
        assert_eq!(parsed.bitrate_bps, 2_150_000);
    }

    #[test]
    fn test_codec_tag_is_not_mistaken_for_resolution() {
        let text = "  Duration: 00:00:05.00, start: 0.000000, bitrate: N/A\n  \
            Stream #0:0(und): Video: vp9 (Profile 0), yuv420p(tv, bt709), 640x360, SAR 1:1 DAR 16:9, 25 fps";
        let parsed = parse_diagnostics(text).unwrap();
        assert_eq!((parsed.width, parsed.height), (640, 360));
        assert_eq!(parsed.bitrate_bps, 0);
    }

    #[test]
    fn test_missing_required_fields_fail() {
        let audio_only = "  Duration: 00:03:00.00, start: 0.000000, bitrate: 128 kb/s\n  \
            Stream #0:0: Audio: mp3, 44100 Hz, stereo, fltp, 128 kb/s";
        assert!(matches!(parse_diagnostics(audio_only), Err(ClipsmithError::Extraction(_))));

        let no_duration = "Stream #0:0: Video: h264, yuv420p, 1280x720";
        assert!(matches!(parse_diagnostics(no_duration), Err(ClipsmithError::Extraction(_))));

        let zero = "  Duration: 00:00:00.00, start: 0.000000\n  Stream #0:0: Video: h264, yuv420p, 1280x720";
        assert!(matches!(parse_diagnostics(zero), Err(ClipsmithError::Extraction(_))));
    }

    #[tokio::test]
    async fn test_probe_reports_input_size_and_cleans_up() {
        let engine = Arc::new(FakeEngine::new());
        let handle = EngineHandle::new(engine.clone());
        let probe = DiagnosticProbe::new(Duration::from_secs(2));

        let meta = probe.probe(&handle, &[7u8; 4096]).await.unwrap();
        assert_eq!(meta.size_bytes, 4096);
        assert_eq!(meta.duration_seconds, 30.0);
        assert!(engine.file_names().is_empty());
    }

    #[tokio::test]
    async fn test_unparseable_probe_still_cleans_up() {
        let engine = Arc::new(FakeEngine::new().with_banner("Invalid data found when processing input"));
        let handle = EngineHandle::new(engine.clone());
        let probe = DiagnosticProbe::new(Duration::from_secs(2));

        let err = probe.probe(&handle, b"garbage").await.unwrap_err();
        assert!(matches!(err, ClipsmithError::Extraction(_)));
        assert!(engine.file_names().is_empty());
    }

    #[tokio::test]
    async fn test_probe_timeout_cleans_up() {
        let engine = Arc::new(FakeEngine::new().with_exec_delay(Duration::from_secs(5)));
        let handle = EngineHandle::new(engine.clone());
        let probe = DiagnosticProbe::new(Duration::from_millis(50));

        let err = probe.probe(&handle, b"slow").await.unwrap_err();
        assert!(matches!(err, ClipsmithError::ExecutionTimeout { .. }));
        assert!(engine.file_names().is_empty());
    }
}
