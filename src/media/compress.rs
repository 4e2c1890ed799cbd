use super::{CompressionLevel, MediaCommand, OutputFormat};

/// Quality/speed pair for H.264 (MP4)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct H264Preset {
    pub crf: u8,
    pub preset: &'static str,
}

/// Quality/speed pair for VP9 (WebM)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Vp9Preset {
    pub crf: u8,
    pub cpu_used: u8,
}

impl CompressionLevel {
    pub fn h264(self) -> H264Preset {
        match self {
            CompressionLevel::Low => H264Preset { crf: 23, preset: "medium" },
            CompressionLevel::Medium => H264Preset { crf: 28, preset: "fast" },
            CompressionLevel::High => H264Preset { crf: 33, preset: "veryfast" },
        }
    }

    pub fn vp9(self) -> Vp9Preset {
        match self {
            CompressionLevel::Low => Vp9Preset { crf: 31, cpu_used: 4 },
            CompressionLevel::Medium => Vp9Preset { crf: 36, cpu_used: 5 },
            CompressionLevel::High => Vp9Preset { crf: 41, cpu_used: 6 },
        }
    }
}

/// Re-encode `input` into `output` at the given level
pub fn compress_command(input: &str, output: &str, level: CompressionLevel, format: OutputFormat) -> MediaCommand {
    let command = MediaCommand::new(format!("Compress ({}, {})", level, format))
        .hide_banner()
        .input(input);

    let command = match format {
        OutputFormat::Mp4 => {
            let preset = level.h264();
            command
                .video_codec("libx264")
                .arg("-crf").arg(preset.crf.to_string())
                .arg("-preset").arg(preset.preset)
                .pixel_format("yuv420p")
                .audio_codec("aac")
                .audio_bitrate("128k")
                .arg("-movflags").arg("+faststart")
        }
        OutputFormat::WebM => {
            let preset = level.vp9();
            command
                .video_codec("libvpx-vp9")
                .arg("-crf").arg(preset.crf.to_string())
                .arg("-b:v").arg("0")
                .arg("-deadline").arg("realtime")
                .arg("-cpu-used").arg(preset.cpu_used.to_string())
                .audio_codec("libopus")
                .audio_bitrate("96k")
        }
    };

    command.overwrite().output(output)
}
