use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use tempfile::TempDir;
use tokio::fs as async_fs;
use tokio::io::AsyncReadExt;
use tokio::process::Command;
use tokio::sync::Mutex;
use tracing::{debug, info, trace};

use super::{AssetFetcher, Engine, EngineLoader, ExecObserver, ExecOutcome, HttpFetcher, resolve_assets};
use crate::config::EngineConfig;
use crate::error::{ClipsmithError, Result};
use crate::probe::{clock_to_seconds, parse_duration};

/// Native ffmpeg engine.
///
/// Its private file namespace is a scratch directory that is removed together
/// with the engine. Commands run with that directory as working directory, so
/// staged names can be passed to ffmpeg as-is.
pub struct FfmpegEngine {
    binary: PathBuf,
    version: String,
    workdir: TempDir,
    // Downloaded assets must outlive the engine that runs them
    _assets: TempDir,
    exec_lock: Mutex<()>,
}

impl FfmpegEngine {
    pub fn workdir(&self) -> &Path {
        self.workdir.path()
    }

    fn path_for(&self, name: &str) -> Result<PathBuf> {
        let valid = !name.is_empty()
            && !name.starts_with('.')
            && !name.contains(['/', '\\'])
            && !name.contains("..");
        if !valid {
            return Err(ClipsmithError::Validation(format!(
                "'{}' is not a valid engine file name",
                name
            )));
        }
        Ok(self.workdir.path().join(name))
    }
}

#[async_trait]
impl Engine for FfmpegEngine {
    async fn write_file(&self, name: &str, data: &[u8]) -> Result<()> {
        let path = self.path_for(name)?;
        async_fs::write(&path, data).await?;
        Ok(())
    }

    async fn read_file(&self, name: &str) -> Result<Vec<u8>> {
        let path = self.path_for(name)?;
        Ok(async_fs::read(&path).await?)
    }

    async fn delete_file(&self, name: &str) -> Result<()> {
        let path = self.path_for(name)?;
        async_fs::remove_file(&path).await?;
        Ok(())
    }

    async fn list_files(&self) -> Result<Vec<String>> {
        let mut names = Vec::new();
        let mut entries = async_fs::read_dir(self.workdir.path()).await?;
        while let Some(entry) = entries.next_entry().await? {
            if let Some(name) = entry.file_name().to_str() {
                names.push(name.to_string());
            }
        }
        names.sort();
        Ok(names)
    }

    async fn exec(&self, args: &[String], observer: &ExecObserver) -> Result<ExecOutcome> {
        let _guard = self.exec_lock.lock().await;
        debug!("Executing engine command: {} {:?}", self.binary.display(), args);

        let mut child = Command::new(&self.binary)
            .args(args)
            .current_dir(self.workdir.path())
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;

        if let Some(mut stderr) = child.stderr.take() {
            let mut tracker = ProgressTracker::new(observer.expected_duration());
            let mut pending = Vec::with_capacity(512);
            let mut chunk = [0u8; 4096];

            loop {
                let read = stderr.read(&mut chunk).await?;
                if read == 0 {
                    break;
                }
                // ffmpeg terminates stats lines with '\r' and everything else with '\n'
                for &byte in &chunk[..read] {
                    if byte == b'\n' || byte == b'\r' {
                        emit_line(&pending, observer, &mut tracker);
                        pending.clear();
                    } else {
                        pending.push(byte);
                    }
                }
            }
            emit_line(&pending, observer, &mut tracker);
        }

        let status = child.wait().await?;
        let exit_code = status.code().unwrap_or(-1);
        debug!("Engine command exited with {}", exit_code);
        Ok(ExecOutcome { exit_code })
    }

    fn version(&self) -> &str {
        &self.version
    }
}

fn emit_line(raw: &[u8], observer: &ExecObserver, tracker: &mut ProgressTracker) {
    if raw.is_empty() {
        return;
    }
    let line = String::from_utf8_lossy(raw);
    trace!("engine: {}", line);
    observer.log(&line);
    if let Some(ratio) = tracker.observe(&line) {
        observer.progress(ratio);
    }
}

/// Derives a 0..1 ratio from `Duration:` and `time=` tokens in engine output
struct ProgressTracker {
    total: Option<f64>,
}

impl ProgressTracker {
    fn new(expected: Option<f64>) -> Self {
        Self {
            total: expected.filter(|d| *d > 0.0),
        }
    }

    fn observe(&mut self, line: &str) -> Option<f64> {
        if self.total.is_none() {
            if let Some(duration) = parse_duration(line).filter(|d| *d > 0.0) {
                self.total = Some(duration);
                return None;
            }
        }

        let start = line.find("time=")? + "time=".len();
        let token = line[start..].split_whitespace().next()?;
        let elapsed = clock_to_seconds(token)?;
        let total = self.total?;
        Some((elapsed / total).clamp(0.0, 1.0))
    }
}

/// Loads `FfmpegEngine` instances from the configured asset base
pub struct FfmpegLoader {
    fetcher: Arc<dyn AssetFetcher>,
}

impl FfmpegLoader {
    pub fn new() -> Result<Self> {
        Ok(Self::with_fetcher(Arc::new(HttpFetcher::new()?)))
    }

    pub fn with_fetcher(fetcher: Arc<dyn AssetFetcher>) -> Self {
        Self { fetcher }
    }
}

#[async_trait]
impl EngineLoader for FfmpegLoader {
    async fn load(&self, config: &EngineConfig) -> Result<Arc<dyn Engine>> {
        let asset_dir = tempfile::Builder::new().prefix("clipsmith-assets-").tempdir()?;
        let assets = resolve_assets(config, self.fetcher.as_ref(), asset_dir.path()).await?;

        let output = Command::new(&assets.binary)
            .arg("-version")
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|e| {
                ClipsmithError::EngineLoad(format!("Engine not runnable ({}): {}", assets.binary.display(), e))
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(ClipsmithError::EngineLoad(format!("Engine version check failed: {}", stderr)));
        }

        let version = String::from_utf8_lossy(&output.stdout)
            .lines()
            .next()
            .unwrap_or("unknown version")
            .to_string();

        let workdir = tempfile::Builder::new().prefix("clipsmith-vfs-").tempdir()?;
        info!("Engine {} using scratch directory {}", version, workdir.path().display());

        Ok(Arc::new(FfmpegEngine {
            binary: assets.binary,
            version,
            workdir,
            _assets: asset_dir,
            exec_lock: Mutex::new(()),
        }))
    }
}
