/// Engine command line, built up argument by argument
#[derive(Debug, Clone, PartialEq)]
pub struct MediaCommand {
    pub args: Vec<String>,
    pub description: String,
}

impl MediaCommand {
    /// Create a new media processing command
    pub fn new<S: Into<String>>(description: S) -> Self {
        Self {
            args: Vec::new(),
            description: description.into(),
        }
    }

    /// Add an argument
    pub fn arg<S: Into<String>>(mut self, arg: S) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Suppress the build configuration banner
    pub fn hide_banner(self) -> Self {
        self.arg("-hide_banner")
    }

    /// Add input file (by engine file name)
    pub fn input<S: Into<String>>(self, name: S) -> Self {
        self.arg("-i").arg(name)
    }

    /// Add output file (by engine file name)
    pub fn output<S: Into<String>>(self, name: S) -> Self {
        self.arg(name)
    }

    /// Force overwrite output
    pub fn overwrite(self) -> Self {
        self.arg("-y")
    }

    /// Start offset; placed before `input` it seeks the input
    pub fn seek(self, seconds: f64) -> Self {
        self.arg("-ss").arg(seconds_arg(seconds))
    }

    /// Limit the output duration
    pub fn duration(self, seconds: f64) -> Self {
        self.arg("-t").arg(seconds_arg(seconds))
    }

    /// Set video codec
    pub fn video_codec<S: Into<String>>(self, codec: S) -> Self {
        self.arg("-c:v").arg(codec)
    }

    /// Set audio codec
    pub fn audio_codec<S: Into<String>>(self, codec: S) -> Self {
        self.arg("-c:a").arg(codec)
    }

    /// Copy every stream without re-encoding
    pub fn copy_streams(self) -> Self {
        self.arg("-c").arg("copy")
    }

    /// Set audio bitrate
    pub fn audio_bitrate<S: Into<String>>(self, bitrate: S) -> Self {
        self.arg("-b:a").arg(bitrate)
    }

    /// Disable audio
    pub fn no_audio(self) -> Self {
        self.arg("-an")
    }

    /// Add video filter
    pub fn video_filter<S: Into<String>>(self, filter: S) -> Self {
        self.arg("-vf").arg(filter)
    }

    /// Set pixel format
    pub fn pixel_format<S: Into<String>>(self, format: S) -> Self {
        self.arg("-pix_fmt").arg(format)
    }
}

/// Seconds with millisecond precision, as the engine expects them
pub fn seconds_arg(seconds: f64) -> String {
    format!("{:.3}", seconds)
}
