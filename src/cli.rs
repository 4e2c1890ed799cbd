use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,

    /// Configuration file path
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Run transforms on a worker thread with its own engine
    #[arg(long, global = true)]
    pub worker: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Load the engine and print its version
    Check,

    /// Print duration, resolution and bitrate of a media file
    Probe {
        /// Input media file
        #[arg(short, long)]
        input: PathBuf,

        /// Print metadata as JSON
        #[arg(long)]
        json: bool,
    },

    /// Re-encode a video at a smaller size
    Compress {
        /// Input video file
        #[arg(short, long)]
        input: PathBuf,

        /// Output file (defaults to <input>-compressed.<format>)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Compression level: low, medium, high
        #[arg(short, long, default_value = "medium")]
        level: String,

        /// Output container: mp4, webm
        #[arg(short, long, default_value = "mp4")]
        format: String,
    },

    /// Cut a time range out of a video without re-encoding
    Trim {
        /// Input video file
        #[arg(short, long)]
        input: PathBuf,

        /// Output file (defaults to <input>-trimmed.<format>)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Start time in seconds
        #[arg(short, long)]
        start: f64,

        /// End time in seconds
        #[arg(short, long)]
        end: f64,

        /// Output container: mp4, webm
        #[arg(short, long, default_value = "mp4")]
        format: String,
    },

    /// Turn a section of a video into an animated GIF
    Gif {
        /// Input video file
        #[arg(short, long)]
        input: PathBuf,

        /// Output file (defaults to <input>.gif)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Frames per second
        #[arg(long, default_value_t = 10)]
        fps: u32,

        /// Output width in pixels
        #[arg(long, default_value_t = 480)]
        width: u32,

        /// Output height in pixels (keeps aspect ratio when omitted)
        #[arg(long)]
        height: Option<u32>,

        /// Start time in seconds
        #[arg(short, long, default_value_t = 0.0)]
        start: f64,

        /// Clip length in seconds
        #[arg(short, long, default_value_t = 5.0)]
        duration: f64,
    },

    /// Load the engine and sweep its scratch directory of leftover working files.
    ///
    /// Each run gets a fresh scratch directory, so this is a diagnostic of the
    /// sweep itself; transforms already sweep when they finish.
    Cleanup,

    /// Write the default configuration to a file
    Config {
        /// Destination path
        #[arg(short, long, default_value = "clipsmith.toml")]
        output: PathBuf,
    },
}
