use super::{MediaCommand, TrimRequest};
use crate::error::{ClipsmithError, Result};

/// Bounds checks that need no engine
pub fn validate_range(request: &TrimRequest) -> Result<()> {
    let (start, end) = (request.start_seconds, request.end_seconds);
    if !start.is_finite() || !end.is_finite() {
        return Err(ClipsmithError::Validation("trim times must be finite numbers".to_string()));
    }
    if start < 0.0 {
        return Err(ClipsmithError::Validation("start time cannot be negative".to_string()));
    }
    if start >= end {
        return Err(ClipsmithError::Validation(format!(
            "start time ({:.2}s) must be before end time ({:.2}s)",
            start, end
        )));
    }
    Ok(())
}

/// Checks against the probed source duration
pub fn validate_against_source(request: &TrimRequest, source_duration: f64) -> Result<()> {
    if request.end_seconds > source_duration {
        return Err(ClipsmithError::Validation(format!(
            "end time ({:.2}s) is past the end of the video ({:.2}s)",
            request.end_seconds, source_duration
        )));
    }
    Ok(())
}

/// Stream-copy cut; precision is bounded by keyframe placement in the source
pub fn trim_command(input: &str, output: &str, start: f64, end: f64) -> MediaCommand {
    MediaCommand::new(format!("Trim ({:.2}s to {:.2}s)", start, end))
        .hide_banner()
        .seek(start)
        .input(input)
        .duration(end - start)
        .copy_streams()
        .arg("-avoid_negative_ts").arg("make_zero")
        .overwrite()
        .output(output)
}
