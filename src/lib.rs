//! Clipsmith - media transcoding over an embedded codec engine
//!
//! Loads an ffmpeg engine once per execution context and runs compress, trim
//! and GIF transforms against it, either directly or on a worker thread.

pub mod bridge;
pub mod cancel;
pub mod cli;
pub mod config;
pub mod engine;
pub mod error;
pub mod media;
pub mod probe;
pub mod worker;
