// Transform executors
//
// - commands: engine argument builder
// - progress: percent reporting with monotonic guarantees
// - compress / trim / gif: per-transform validation and command construction
// - processor: the shared executor template, used directly and from the worker

pub mod commands;
pub mod compress;
pub mod gif;
pub mod processor;
pub mod progress;
pub mod trim;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

pub use commands::*;
pub use processor::*;
pub use progress::*;

use crate::error::ClipsmithError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CompressionLevel {
    /// Best quality, largest output
    Low,
    Medium,
    /// Smallest output, fastest encode
    High,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OutputFormat {
    Mp4,
    WebM,
}

impl OutputFormat {
    pub fn extension(self) -> &'static str {
        match self {
            OutputFormat::Mp4 => "mp4",
            OutputFormat::WebM => "webm",
        }
    }

    pub fn mime(self) -> &'static str {
        match self {
            OutputFormat::Mp4 => "video/mp4",
            OutputFormat::WebM => "video/webm",
        }
    }
}

pub const GIF_MIME: &str = "image/gif";

impl FromStr for CompressionLevel {
    type Err = ClipsmithError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "low" => Ok(CompressionLevel::Low),
            "medium" => Ok(CompressionLevel::Medium),
            "high" => Ok(CompressionLevel::High),
            _ => Err(ClipsmithError::Config(format!(
                "Invalid compression level '{}'. Valid levels: low, medium, high",
                s
            ))),
        }
    }
}

impl FromStr for OutputFormat {
    type Err = ClipsmithError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "mp4" => Ok(OutputFormat::Mp4),
            "webm" => Ok(OutputFormat::WebM),
            _ => Err(ClipsmithError::Config(format!(
                "Invalid output format '{}'. Valid formats: mp4, webm",
                s
            ))),
        }
    }
}

impl fmt::Display for CompressionLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CompressionLevel::Low => "low",
            CompressionLevel::Medium => "medium",
            CompressionLevel::High => "high",
        };
        f.write_str(name)
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

#[derive(Clone)]
pub struct CompressRequest {
    pub input: Vec<u8>,
    pub level: CompressionLevel,
    pub format: OutputFormat,
}

#[derive(Clone)]
pub struct TrimRequest {
    pub input: Vec<u8>,
    pub start_seconds: f64,
    pub end_seconds: f64,
    pub format: OutputFormat,
}

#[derive(Clone)]
pub struct GifRequest {
    pub input: Vec<u8>,
    pub fps: u32,
    pub width: u32,
    /// `None` keeps the source aspect ratio
    pub height: Option<u32>,
    pub start_seconds: f64,
    pub duration_seconds: f64,
}

/// Any of the three transforms
#[derive(Clone)]
pub enum TransformRequest {
    Compress(CompressRequest),
    Trim(TrimRequest),
    Gif(GifRequest),
}

impl TransformRequest {
    pub fn kind(&self) -> &'static str {
        match self {
            TransformRequest::Compress(_) => "compress",
            TransformRequest::Trim(_) => "trim",
            TransformRequest::Gif(_) => "gif",
        }
    }
}

/// Produced bytes; ownership passes to the caller
#[derive(Clone, PartialEq, Eq)]
pub struct TransformResult {
    pub bytes: Vec<u8>,
    pub mime: &'static str,
}

impl TransformResult {
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

impl fmt::Debug for TransformResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransformResult")
            .field("mime", &self.mime)
            .field("len", &self.bytes.len())
            .finish()
    }
}
