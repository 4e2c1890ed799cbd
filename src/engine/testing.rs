//! Scripted in-memory engine used by unit tests across the crate.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use super::{Engine, EngineLoader, ExecObserver, ExecOutcome};
use crate::config::EngineConfig;
use crate::error::{ClipsmithError, Result};

/// Banner for a 30 second 1280x720 H.264 clip
pub const SAMPLE_BANNER: &str = "\
Input #0, mov,mp4,m4a,3gp,3g2,mj2, from 'input-sample':
  Metadata:
    major_brand     : isom
  Duration: 00:00:30.00, start: 0.000000, bitrate: 2150 kb/s
  Stream #0:0[0x1](und): Video: h264 (High) (avc1 / 0x31637661), yuv420p(progressive), 1280x720 [SAR 1:1 DAR 16:9], 2016 kb/s, 30 fps, 30 tbr, 15360 tbn (default)
  Stream #0:1[0x2](und): Audio: aac (LC) (mp4a / 0x6134706D), 48000 Hz, stereo, fltp, 128 kb/s (default)
At least one output file must be specified";

/// In-memory engine whose exec behaviour is scripted per test.
///
/// Every exec emits `banner` as log lines. When the last argument names an
/// `output-*` file, `output` is written to it and `progress` ratios are reported.
pub struct FakeEngine {
    files: Mutex<HashMap<String, Vec<u8>>>,
    banner: String,
    output: Vec<u8>,
    progress: Vec<f64>,
    exit_code: i32,
    exec_delay: Option<Duration>,
    transform_delay: Option<Duration>,
    fail_writes: bool,
    fail_reads: bool,
    execs: Mutex<Vec<Vec<String>>>,
}

impl FakeEngine {
    pub fn new() -> Self {
        Self {
            files: Mutex::new(HashMap::new()),
            banner: SAMPLE_BANNER.to_string(),
            output: vec![0u8; 1024],
            progress: vec![0.25, 0.5, 0.75, 1.0],
            exit_code: 0,
            exec_delay: None,
            transform_delay: None,
            fail_writes: false,
            fail_reads: false,
            execs: Mutex::new(Vec::new()),
        }
    }

    pub fn with_banner(mut self, banner: &str) -> Self {
        self.banner = banner.to_string();
        self
    }

    pub fn with_output(mut self, output: Vec<u8>) -> Self {
        self.output = output;
        self
    }

    pub fn with_progress(mut self, progress: Vec<f64>) -> Self {
        self.progress = progress;
        self
    }

    pub fn with_exit_code(mut self, exit_code: i32) -> Self {
        self.exit_code = exit_code;
        self
    }

    pub fn with_exec_delay(mut self, delay: Duration) -> Self {
        self.exec_delay = Some(delay);
        self
    }

    /// Delay only commands that produce an output file
    pub fn with_transform_delay(mut self, delay: Duration) -> Self {
        self.transform_delay = Some(delay);
        self
    }

    pub fn failing_writes(mut self) -> Self {
        self.fail_writes = true;
        self
    }

    /// Reads of produced `output-*` files fail; the files still exist
    pub fn failing_reads(mut self) -> Self {
        self.fail_reads = true;
        self
    }

    pub fn file_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.files.lock().unwrap().keys().cloned().collect();
        names.sort();
        names
    }

    pub fn insert_file(&self, name: &str, data: &[u8]) {
        self.files.lock().unwrap().insert(name.to_string(), data.to_vec());
    }

    pub fn exec_count(&self) -> usize {
        self.execs.lock().unwrap().len()
    }

    pub fn exec_args(&self) -> Vec<Vec<String>> {
        self.execs.lock().unwrap().clone()
    }
}

#[async_trait]
impl Engine for FakeEngine {
    async fn write_file(&self, name: &str, data: &[u8]) -> Result<()> {
        if self.fail_writes {
            return Err(ClipsmithError::Io(std::io::Error::other("virtual filesystem full")));
        }
        self.insert_file(name, data);
        Ok(())
    }

    async fn read_file(&self, name: &str) -> Result<Vec<u8>> {
        if self.fail_reads && name.starts_with("output-") {
            return Err(ClipsmithError::Io(std::io::Error::other("input/output error")));
        }
        self.files
            .lock()
            .unwrap()
            .get(name)
            .cloned()
            .ok_or_else(|| ClipsmithError::Io(std::io::Error::from(std::io::ErrorKind::NotFound)))
    }

    async fn delete_file(&self, name: &str) -> Result<()> {
        match self.files.lock().unwrap().remove(name) {
            Some(_) => Ok(()),
            None => Err(ClipsmithError::Io(std::io::Error::from(std::io::ErrorKind::NotFound))),
        }
    }

    async fn list_files(&self) -> Result<Vec<String>> {
        Ok(self.file_names())
    }

    async fn exec(&self, args: &[String], observer: &ExecObserver) -> Result<ExecOutcome> {
        self.execs.lock().unwrap().push(args.to_vec());

        if let Some(delay) = self.exec_delay {
            tokio::time::sleep(delay).await;
        }
        let produces_output = args.iter().any(|a| a.starts_with("output-"));
        if let Some(delay) = self.transform_delay.filter(|_| produces_output) {
            tokio::time::sleep(delay).await;
        }

        for line in self.banner.lines() {
            observer.log(line);
        }

        if let Some(target) = args.last().filter(|name| name.starts_with("output-")) {
            for ratio in &self.progress {
                observer.progress(*ratio);
            }
            if self.exit_code == 0 {
                self.insert_file(target, &self.output);
            }
        }

        let exit_code = if produces_output {
            self.exit_code
        } else {
            // A bare `-i` probe always exits non-zero
            1
        };
        Ok(ExecOutcome { exit_code })
    }

    fn version(&self) -> &str {
        "fake-engine 1.0"
    }
}

/// Loader that hands out a fixed engine after an optional delay and counts loads
pub struct FakeLoader {
    engine: Arc<FakeEngine>,
    delay: Duration,
    failures_left: AtomicUsize,
    loads: AtomicUsize,
}

impl FakeLoader {
    pub fn new(engine: Arc<FakeEngine>) -> Self {
        Self {
            engine,
            delay: Duration::ZERO,
            failures_left: AtomicUsize::new(0),
            loads: AtomicUsize::new(0),
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Fail the first `count` loads
    pub fn failing(self, count: usize) -> Self {
        self.failures_left.store(count, Ordering::SeqCst);
        self
    }

    pub fn loads(&self) -> usize {
        self.loads.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl EngineLoader for FakeLoader {
    async fn load(&self, _config: &EngineConfig) -> Result<Arc<dyn Engine>> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(self.delay).await;

        let failing = self
            .failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(ClipsmithError::EngineLoad("asset fetch failed".to_string()));
        }

        let engine: Arc<dyn Engine> = self.engine.clone();
        Ok(engine)
    }
}

/// Engine config with timeouts short enough for tests
pub fn fast_config() -> EngineConfig {
    EngineConfig {
        load_timeout_secs: 2,
        probe_timeout_secs: 2,
        exec_timeout_secs: 2,
        ready_poll_attempts: 3,
        ready_poll_backoff_ms: 500,
        ..EngineConfig::default()
    }
}
