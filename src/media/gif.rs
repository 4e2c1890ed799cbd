use super::{GifRequest, MediaCommand};
use crate::config::LimitsConfig;
use crate::error::{ClipsmithError, Result};

pub const MIN_FPS: u32 = 1;
pub const MAX_FPS: u32 = 30;
pub const MIN_WIDTH: u32 = 100;

pub fn validate(request: &GifRequest, limits: &LimitsConfig) -> Result<()> {
    if !(MIN_FPS..=MAX_FPS).contains(&request.fps) {
        return Err(ClipsmithError::Validation(format!(
            "frame rate must be between {} and {} fps",
            MIN_FPS, MAX_FPS
        )));
    }
    if request.width < MIN_WIDTH || request.width > limits.gif_max_width {
        return Err(ClipsmithError::Validation(format!(
            "width must be between {} and {} pixels",
            MIN_WIDTH, limits.gif_max_width
        )));
    }
    if request.height == Some(0) {
        return Err(ClipsmithError::Validation("height must be positive".to_string()));
    }
    if !request.start_seconds.is_finite() || request.start_seconds < 0.0 {
        return Err(ClipsmithError::Validation("start time cannot be negative".to_string()));
    }
    if !request.duration_seconds.is_finite()
        || request.duration_seconds <= 0.0
        || request.duration_seconds > limits.gif_max_duration_secs
    {
        return Err(ClipsmithError::Validation(format!(
            "duration must be between 0 and {} seconds",
            limits.gif_max_duration_secs
        )));
    }
    Ok(())
}

pub fn validate_against_source(request: &GifRequest, source_duration: f64) -> Result<()> {
    if request.start_seconds >= source_duration {
        return Err(ClipsmithError::Validation(format!(
            "start time ({:.2}s) is past the end of the video ({:.2}s)",
            request.start_seconds, source_duration
        )));
    }
    Ok(())
}

/// Sample, scale with lanczos, then generate and apply an optimised palette
pub fn filter_graph(fps: u32, width: u32, height: Option<u32>) -> String {
    let height = height.map(|h| h.to_string()).unwrap_or_else(|| "-1".to_string());
    format!(
        "fps={},scale={}:{}:flags=lanczos,split[s0][s1];[s0]palettegen[p];[s1][p]paletteuse",
        fps, width, height
    )
}

pub fn gif_command(input: &str, output: &str, request: &GifRequest) -> MediaCommand {
    MediaCommand::new(format!("GIF ({} fps, {}px wide)", request.fps, request.width))
        .hide_banner()
        .seek(request.start_seconds)
        .duration(request.duration_seconds)
        .input(input)
        .video_filter(filter_graph(request.fps, request.width, request.height))
        .no_audio()
        .arg("-loop").arg("0")
        .overwrite()
        .output(output)
}
