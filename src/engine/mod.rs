// Codec engine abstraction
//
// - Engine: one running codec instance with a private file namespace
// - EngineManager: lazy, shared, retry-safe loading of that instance
// - assets: locating and fetching the files an engine needs
// - ffmpeg: the native ffmpeg-backed engine and its loader

pub mod assets;
pub mod ffmpeg;
pub mod manager;

#[cfg(test)]
pub(crate) mod testing;

use async_trait::async_trait;
use std::fmt;
use std::ops::Deref;
use std::sync::Arc;

pub use assets::*;
pub use ffmpeg::*;
pub use manager::*;

use crate::config::EngineConfig;
use crate::error::Result;

type LogListener = Arc<dyn Fn(&str) + Send + Sync>;
type ProgressListener = Arc<dyn Fn(f64) + Send + Sync>;

/// Listeners attached to a single `exec` call.
///
/// Listeners live only as long as the call they are passed to.
#[derive(Clone, Default)]
pub struct ExecObserver {
    log: Option<LogListener>,
    progress: Option<ProgressListener>,
    expected_duration: Option<f64>,
}

impl ExecObserver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Receive every diagnostic line the engine emits
    pub fn on_log<F>(mut self, listener: F) -> Self
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        self.log = Some(Arc::new(listener));
        self
    }

    /// Receive the engine's native progress ratio (nominally 0.0..=1.0)
    pub fn on_progress<F>(mut self, listener: F) -> Self
    where
        F: Fn(f64) + Send + Sync + 'static,
    {
        self.progress = Some(Arc::new(listener));
        self
    }

    /// Length of the media the command produces, used to scale native progress
    pub fn with_expected_duration(mut self, seconds: f64) -> Self {
        self.expected_duration = Some(seconds);
        self
    }

    pub fn expected_duration(&self) -> Option<f64> {
        self.expected_duration
    }

    pub fn log(&self, line: &str) {
        if let Some(listener) = &self.log {
            listener(line);
        }
    }

    pub fn progress(&self, ratio: f64) {
        if let Some(listener) = &self.progress {
            listener(ratio);
        }
    }
}

/// Result of running a command inside the engine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExecOutcome {
    pub exit_code: i32,
}

impl ExecOutcome {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// A loaded codec engine.
///
/// File names are flat names inside the engine's private namespace; they never
/// contain path separators. Exec calls against one instance run one at a time.
#[async_trait]
pub trait Engine: Send + Sync {
    async fn write_file(&self, name: &str, data: &[u8]) -> Result<()>;

    async fn read_file(&self, name: &str) -> Result<Vec<u8>>;

    async fn delete_file(&self, name: &str) -> Result<()>;

    async fn list_files(&self) -> Result<Vec<String>>;

    /// Run the engine with command-line style arguments
    async fn exec(&self, args: &[String], observer: &ExecObserver) -> Result<ExecOutcome>;

    /// Human readable version banner
    fn version(&self) -> &str;
}

/// Produces engine instances; one load per call.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait EngineLoader: Send + Sync {
    async fn load(&self, config: &EngineConfig) -> Result<Arc<dyn Engine>>;
}

/// Shared handle to the engine instance owned by an `EngineManager`
#[derive(Clone)]
pub struct EngineHandle {
    engine: Arc<dyn Engine>,
}

impl EngineHandle {
    pub fn new(engine: Arc<dyn Engine>) -> Self {
        Self { engine }
    }

    /// True when both handles point at the same engine instance
    pub fn same_instance(&self, other: &EngineHandle) -> bool {
        Arc::ptr_eq(&self.engine, &other.engine)
    }
}

impl Deref for EngineHandle {
    type Target = dyn Engine;

    fn deref(&self) -> &Self::Target {
        self.engine.as_ref()
    }
}

impl fmt::Debug for EngineHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EngineHandle")
            .field("version", &self.engine.version())
            .finish()
    }
}
