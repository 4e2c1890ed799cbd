use std::sync::Arc;
use tracing::{info, warn};

use super::{
    CompressRequest, GifRequest, MediaCommand, ProgressMapping, ProgressReporter, TransformRequest,
    TransformResult, TrimRequest, GIF_MIME, compress, gif, trim,
};
use crate::bridge;
use crate::cancel::CancellationToken;
use crate::config::LimitsConfig;
use crate::engine::{EngineHandle, EngineManager, ExecObserver};
use crate::error::{ClipsmithError, Result};
use crate::probe::{DiagnosticProbe, MediaMetadata, MetadataProbe};

/// Per-transform knobs for the shared pipeline
struct Plan {
    label: &'static str,
    extension: &'static str,
    mime: &'static str,
    mapping: ProgressMapping,
    /// Percent reported once the input is staged
    staged_percent: Option<f32>,
    /// Length of the produced media, for scaling native progress
    expected_duration: f64,
}

/// Runs transforms against the engine of one execution context.
///
/// The same executor serves direct calls and the worker thread; the worker
/// only adds message transport around it.
pub struct Transcoder {
    engines: EngineManager,
    probe: Arc<dyn MetadataProbe>,
    limits: LimitsConfig,
}

impl Transcoder {
    pub fn new(engines: EngineManager, limits: LimitsConfig) -> Self {
        let probe = Arc::new(DiagnosticProbe::new(engines.config().probe_timeout()));
        Self::with_probe(engines, probe, limits)
    }

    pub fn with_probe(engines: EngineManager, probe: Arc<dyn MetadataProbe>, limits: LimitsConfig) -> Self {
        Self { engines, probe, limits }
    }

    pub fn engines(&self) -> &EngineManager {
        &self.engines
    }

    pub async fn ensure_ready(&self) -> Result<EngineHandle> {
        self.engines.ensure_ready().await
    }

    /// Probe metadata for display or for validating a trim range
    pub async fn probe(&self, input: &[u8]) -> Result<MediaMetadata> {
        self.preflight(input)?;
        let engine = self.engines.ensure_ready().await?;
        self.probe.probe(&engine, input).await
    }

    pub async fn compress(
        &self,
        request: &CompressRequest,
        progress: &ProgressReporter,
        cancel: &CancellationToken,
    ) -> Result<TransformResult> {
        self.preflight(&request.input)?;
        let engine = self.engines.ensure_ready().await?;

        // A file whose duration cannot be read is not compressed blindly
        let metadata = self.probe.probe(&engine, &request.input).await?;

        let plan = Plan {
            label: "Compression",
            extension: request.format.extension(),
            mime: request.format.mime(),
            mapping: ProgressMapping::Full,
            staged_percent: None,
            expected_duration: metadata.duration_seconds,
        };
        let (level, format) = (request.level, request.format);
        self.run_pipeline(&engine, &request.input, plan, progress, cancel, |input, output| {
            compress::compress_command(input, output, level, format)
        })
        .await
    }

    pub async fn trim(
        &self,
        request: &TrimRequest,
        progress: &ProgressReporter,
        cancel: &CancellationToken,
    ) -> Result<TransformResult> {
        trim::validate_range(request)?;
        self.preflight(&request.input)?;
        let engine = self.engines.ensure_ready().await?;

        let metadata = self.probe.probe(&engine, &request.input).await?;
        trim::validate_against_source(request, metadata.duration_seconds)?;

        let plan = Plan {
            label: "Trim",
            extension: request.format.extension(),
            mime: request.format.mime(),
            mapping: ProgressMapping::Full,
            staged_percent: None,
            expected_duration: request.end_seconds - request.start_seconds,
        };
        let (start, end) = (request.start_seconds, request.end_seconds);
        self.run_pipeline(&engine, &request.input, plan, progress, cancel, |input, output| {
            trim::trim_command(input, output, start, end)
        })
        .await
    }

    pub async fn create_gif(
        &self,
        request: &GifRequest,
        progress: &ProgressReporter,
        cancel: &CancellationToken,
    ) -> Result<TransformResult> {
        gif::validate(request, &self.limits)?;
        self.preflight(&request.input)?;
        let engine = self.engines.ensure_ready().await?;

        let metadata = self.probe.probe(&engine, &request.input).await?;
        gif::validate_against_source(request, metadata.duration_seconds)?;

        let available = metadata.duration_seconds - request.start_seconds;
        let plan = Plan {
            label: "GIF creation",
            extension: "gif",
            mime: GIF_MIME,
            mapping: ProgressMapping::Range { start: 10.0, end: 90.0 },
            staged_percent: Some(10.0),
            expected_duration: request.duration_seconds.min(available),
        };
        self.run_pipeline(&engine, &request.input, plan, progress, cancel, |input, output| {
            gif::gif_command(input, output, request)
        })
        .await
    }

    /// Dispatch any transform
    pub async fn run(
        &self,
        request: &TransformRequest,
        progress: &ProgressReporter,
        cancel: &CancellationToken,
    ) -> Result<TransformResult> {
        match request {
            TransformRequest::Compress(r) => self.compress(r, progress, cancel).await,
            TransformRequest::Trim(r) => self.trim(r, progress, cancel).await,
            TransformRequest::Gif(r) => self.create_gif(r, progress, cancel).await,
        }
    }

    /// Remove leftover working files; a no-op before the engine is loaded
    pub async fn cleanup_all(&self) -> usize {
        match self.engines.current() {
            Ok(engine) => bridge::cleanup_all(&*engine).await,
            Err(_) => 0,
        }
    }

    fn preflight(&self, input: &[u8]) -> Result<()> {
        if input.is_empty() {
            return Err(ClipsmithError::Validation("input file is empty".to_string()));
        }
        if input.len() as u64 > self.limits.max_input_bytes {
            return Err(ClipsmithError::Validation(format!(
                "input is {} bytes; the limit is {} bytes",
                input.len(),
                self.limits.max_input_bytes
            )));
        }
        Ok(())
    }

    /// stage → exec → read, with both names released on every exit path
    async fn run_pipeline<F>(
        &self,
        engine: &EngineHandle,
        input: &[u8],
        plan: Plan,
        progress: &ProgressReporter,
        cancel: &CancellationToken,
        build: F,
    ) -> Result<TransformResult>
    where
        F: FnOnce(&str, &str) -> MediaCommand,
    {
        if cancel.is_cancelled() {
            return Err(ClipsmithError::Cancelled);
        }

        let input_name = bridge::unique_name("input", None);
        let output_name = bridge::unique_name("output", Some(plan.extension));
        let command = build(&input_name, &output_name);

        let result = self
            .execute(engine, input, &input_name, &output_name, &plan, command, progress, cancel)
            .await;
        bridge::release(&**engine, &[input_name, output_name]).await;

        match &result {
            Ok(output) => info!("{} produced {} bytes ({})", plan.label, output.len(), output.mime),
            Err(e) => warn!("{} failed: {}", plan.label, e),
        }
        result
    }

    #[allow(clippy::too_many_arguments)]
    async fn execute(
        &self,
        engine: &EngineHandle,
        input: &[u8],
        input_name: &str,
        output_name: &str,
        plan: &Plan,
        command: MediaCommand,
        progress: &ProgressReporter,
        cancel: &CancellationToken,
    ) -> Result<TransformResult> {
        let staged = bridge::stage(&**engine, input_name, input).await?;
        if let Some(percent) = plan.staged_percent {
            progress.report(percent);
        }

        if cancel.is_cancelled() {
            return Err(ClipsmithError::Cancelled);
        }

        info!("{}: {} ({} bytes in {})", plan.label, command.description, staged.byte_length, staged.name);
        let reporter = progress.clone();
        let mapping = plan.mapping;
        let observer = ExecObserver::new()
            .with_expected_duration(plan.expected_duration)
            .on_progress(move |ratio| reporter.native(ratio, mapping));

        let timeout = self.engines.config().exec_timeout();
        let outcome = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(ClipsmithError::Cancelled),
            result = tokio::time::timeout(timeout, engine.exec(&command.args, &observer)) => match result {
                Ok(outcome) => outcome?,
                Err(_) => {
                    return Err(ClipsmithError::ExecutionTimeout {
                        operation: plan.label.to_string(),
                        seconds: timeout.as_secs(),
                    });
                }
            },
        };

        if !outcome.success() {
            warn!("{} exited with code {}", plan.label, outcome.exit_code);
            return Err(ClipsmithError::ExecutionFailed(plan.label.to_string()));
        }

        let bytes = engine
            .read_file(output_name)
            .await
            .map_err(|e| ClipsmithError::OutputReadFailed(e.to_string()))?;
        if bytes.is_empty() {
            return Err(ClipsmithError::ExecutionFailed(plan.label.to_string()));
        }

        progress.finish();
        Ok(TransformResult { bytes, mime: plan.mime })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::engine::testing::{FakeEngine, FakeLoader, fast_config};
    use crate::media::{CompressionLevel, OutputFormat};
    use std::sync::Mutex;
    use std::time::Duration;
    use tokio_test::{assert_err, assert_ok};

    fn transcoder(engine: Arc<FakeEngine>) -> Transcoder {
        let loader = Arc::new(FakeLoader::new(engine));
        Transcoder::new(EngineManager::new(loader, fast_config()), LimitsConfig::default())
    }

    fn recorder() -> (ProgressReporter, Arc<Mutex<Vec<f32>>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        (ProgressReporter::new(move |e| sink.lock().unwrap().push(e.percent)), seen)
    }

    fn sample_input() -> Vec<u8> {
        vec![42u8; 64 * 1024]
    }

    fn compress_request() -> CompressRequest {
        CompressRequest {
            input: sample_input(),
            level: CompressionLevel::Medium,
            format: OutputFormat::Mp4,
        }
    }

    fn assert_monotonic_to_100(seen: &[f32]) {
        assert!(!seen.is_empty());
        assert!(seen.windows(2).all(|w| w[0] <= w[1]), "not monotonic: {:?}", seen);
        assert_eq!(seen.last().copied(), Some(100.0));
    }

    #[tokio::test]
    async fn test_compress_success() {
        let engine = Arc::new(FakeEngine::new().with_output(vec![1u8; 2048]));
        let transcoder = transcoder(engine.clone());
        let (progress, seen) = recorder();

        let result = transcoder
            .compress(&compress_request(), &progress, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(result.mime, "video/mp4");
        assert_eq!(result.len(), 2048);
        assert!(result.len() < sample_input().len());
        assert_monotonic_to_100(&seen.lock().unwrap());
        assert_eq!(*seen.lock().unwrap(), vec![25.0, 50.0, 75.0, 100.0]);
        assert!(engine.file_names().is_empty());

        // probe + compress
        assert_eq!(engine.exec_count(), 2);
        assert!(engine.exec_args()[1].contains(&"libx264".to_string()));
    }

    #[tokio::test]
    async fn test_compress_rejects_unreadable_input() {
        let engine = Arc::new(FakeEngine::new().with_banner("moov atom not found"));
        let transcoder = transcoder(engine.clone());

        let err = transcoder
            .compress(&compress_request(), &ProgressReporter::silent(), &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, ClipsmithError::Extraction(_)));
        // Only the probe ran
        assert_eq!(engine.exec_count(), 1);
        assert!(engine.file_names().is_empty());
    }

    #[tokio::test]
    async fn test_empty_output_is_execution_failure() {
        let engine = Arc::new(FakeEngine::new().with_output(Vec::new()).with_progress(vec![0.5]));
        let transcoder = transcoder(engine.clone());
        let (progress, seen) = recorder();

        let err = transcoder
            .compress(&compress_request(), &progress, &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, ClipsmithError::ExecutionFailed(_)));
        assert!(engine.file_names().is_empty());
        assert_eq!(*seen.lock().unwrap(), vec![50.0]);
    }

    #[tokio::test]
    async fn test_nonzero_exit_is_execution_failure() {
        let engine = Arc::new(FakeEngine::new().with_exit_code(1));
        let transcoder = transcoder(engine.clone());

        let err = transcoder
            .compress(&compress_request(), &ProgressReporter::silent(), &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, ClipsmithError::ExecutionFailed(_)));
        assert!(engine.file_names().is_empty());
    }

    #[tokio::test]
    async fn test_stage_failure_propagates() {
        let engine = Arc::new(FakeEngine::new().failing_writes());
        let transcoder = transcoder(engine.clone());

        let result = transcoder
            .compress(&compress_request(), &ProgressReporter::silent(), &CancellationToken::new())
            .await;
        let err = result.unwrap_err();
        assert!(matches!(err, ClipsmithError::ExecutionFailed(_)));
        assert_eq!(err.user_message(), "Processing failed. Please try again.");
        assert!(engine.file_names().is_empty());
    }

    #[tokio::test]
    async fn test_output_read_failure_cleans_up() {
        let engine = Arc::new(FakeEngine::new().failing_reads());
        let transcoder = transcoder(engine.clone());

        let err = transcoder
            .compress(&compress_request(), &ProgressReporter::silent(), &CancellationToken::new())
            .await
            .unwrap_err();
        match err {
            ClipsmithError::OutputReadFailed(reason) => assert!(reason.contains("input/output error")),
            other => panic!("expected read failure, got {:?}", other),
        }
        assert_eq!(engine.exec_count(), 2);
        assert!(engine.file_names().is_empty());
    }

    #[tokio::test]
    async fn test_exec_timeout_cleans_up() {
        let engine = Arc::new(FakeEngine::new().with_transform_delay(Duration::from_secs(10)));
        let config = EngineConfig {
            exec_timeout_secs: 1,
            ..fast_config()
        };
        let transcoder = Transcoder::new(
            EngineManager::new(Arc::new(FakeLoader::new(engine.clone())), config),
            LimitsConfig::default(),
        );

        let err = transcoder
            .compress(&compress_request(), &ProgressReporter::silent(), &CancellationToken::new())
            .await
            .unwrap_err();
        match err {
            ClipsmithError::ExecutionTimeout { operation, seconds } => {
                assert_eq!(operation, "Compression");
                assert_eq!(seconds, 1);
            }
            other => panic!("expected timeout, got {:?}", other),
        }
        assert!(engine.file_names().is_empty());
    }

    #[tokio::test]
    async fn test_trim_rejects_inverted_range_before_engine() {
        let engine = Arc::new(FakeEngine::new());
        let loader = Arc::new(FakeLoader::new(engine.clone()));
        let manager = EngineManager::new(loader.clone(), fast_config());
        let transcoder = Transcoder::new(manager, LimitsConfig::default());

        let request = TrimRequest {
            input: sample_input(),
            start_seconds: 10.0,
            end_seconds: 5.0,
            format: OutputFormat::Mp4,
        };
        let err = transcoder
            .trim(&request, &ProgressReporter::silent(), &CancellationToken::new())
            .await
            .unwrap_err();

        assert!(matches!(err, ClipsmithError::Validation(_)));
        assert_eq!(loader.loads(), 0);
        assert_eq!(engine.exec_count(), 0);
    }

    #[tokio::test]
    async fn test_trim_success() {
        let engine = Arc::new(FakeEngine::new());
        let transcoder = transcoder(engine.clone());
        let (progress, seen) = recorder();

        let request = TrimRequest {
            input: sample_input(),
            start_seconds: 5.0,
            end_seconds: 15.0,
            format: OutputFormat::Mp4,
        };
        let result = transcoder
            .trim(&request, &progress, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(result.mime, "video/mp4");
        assert_monotonic_to_100(&seen.lock().unwrap());
        let args = &engine.exec_args()[1];
        assert!(args.windows(2).any(|w| w[0] == "-c" && w[1] == "copy"));
        assert!(args.windows(2).any(|w| w[0] == "-t" && w[1] == "10.000"));
        assert!(engine.file_names().is_empty());
    }

    #[tokio::test]
    async fn test_trim_past_source_end() {
        let engine = Arc::new(FakeEngine::new());
        let transcoder = transcoder(engine.clone());

        let request = TrimRequest {
            input: sample_input(),
            start_seconds: 20.0,
            end_seconds: 45.0,
            format: OutputFormat::WebM,
        };
        let result = transcoder
            .trim(&request, &ProgressReporter::silent(), &CancellationToken::new())
            .await;
        assert!(matches!(result, Err(ClipsmithError::Validation(_))));
        assert_eq!(engine.exec_count(), 1);
    }

    #[tokio::test]
    async fn test_gif_progress_is_remapped() {
        let engine = Arc::new(FakeEngine::new().with_progress(vec![0.0, 0.5, 1.0]));
        let transcoder = transcoder(engine.clone());
        let (progress, seen) = recorder();

        let request = GifRequest {
            input: sample_input(),
            fps: 10,
            width: 320,
            height: None,
            start_seconds: 0.0,
            duration_seconds: 5.0,
        };
        let result = transcoder
            .create_gif(&request, &progress, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(result.mime, "image/gif");
        let seen = seen.lock().unwrap().clone();
        assert_eq!(seen, vec![10.0, 50.0, 90.0, 100.0]);
        assert!(engine.file_names().is_empty());
    }

    #[tokio::test]
    async fn test_gif_out_of_range_fps_rejected() {
        let engine = Arc::new(FakeEngine::new());
        let transcoder = transcoder(engine.clone());

        let request = GifRequest {
            input: sample_input(),
            fps: 60,
            width: 320,
            height: None,
            start_seconds: 0.0,
            duration_seconds: 5.0,
        };
        assert_err!(
            transcoder
                .create_gif(&request, &ProgressReporter::silent(), &CancellationToken::new())
                .await
        );
        assert_eq!(engine.exec_count(), 0);
    }

    #[tokio::test]
    async fn test_cancelled_before_exec_skips_engine_and_cleans_up() {
        let engine = Arc::new(FakeEngine::new());
        let transcoder = transcoder(engine.clone());
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = transcoder
            .compress(&compress_request(), &ProgressReporter::silent(), &cancel)
            .await
            .unwrap_err();
        assert!(matches!(err, ClipsmithError::Cancelled));
        // Only the probe ran
        assert_eq!(engine.exec_count(), 1);
        assert!(engine.file_names().is_empty());
    }

    #[tokio::test]
    async fn test_cancel_during_exec() {
        let engine = Arc::new(FakeEngine::new().with_transform_delay(Duration::from_secs(5)));
        let transcoder = transcoder(engine.clone());
        let cancel = CancellationToken::new();

        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            trigger.cancel();
        });

        let err = transcoder
            .compress(&compress_request(), &ProgressReporter::silent(), &cancel)
            .await
            .unwrap_err();
        assert!(matches!(err, ClipsmithError::Cancelled));
        assert_eq!(engine.exec_count(), 2);
        assert!(engine.file_names().is_empty());
    }

    #[tokio::test]
    async fn test_run_dispatch_and_cleanup_all() {
        let engine = Arc::new(FakeEngine::new());
        let transcoder = transcoder(engine.clone());

        assert_eq!(transcoder.cleanup_all().await, 0);

        let request = TransformRequest::Compress(compress_request());
        let result = assert_ok!(
            transcoder
                .run(&request, &ProgressReporter::silent(), &CancellationToken::new())
                .await
        );
        assert_eq!(result.mime, "video/mp4");

        engine.insert_file("output.gif", b"stale");
        assert_eq!(transcoder.cleanup_all().await, 1);
    }

    #[tokio::test]
    async fn test_oversized_input_rejected() {
        let engine = Arc::new(FakeEngine::new());
        let loader = Arc::new(FakeLoader::new(engine.clone()));
        let limits = LimitsConfig {
            max_input_bytes: 1024,
            ..LimitsConfig::default()
        };
        let transcoder = Transcoder::new(EngineManager::new(loader.clone(), fast_config()), limits);

        let result = transcoder.probe(&sample_input()).await;
        assert!(matches!(result, Err(ClipsmithError::Validation(_))));
        assert_eq!(loader.loads(), 0);
    }
}
