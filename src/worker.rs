use std::sync::Arc;
use std::thread::JoinHandle;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tracing::{debug, error, info};

use crate::cancel::CancellationToken;
use crate::config::Config;
use crate::engine::{EngineLoader, EngineManager};
use crate::error::{ClipsmithError, Result};
use crate::media::{
    CompressRequest, GifRequest, ProgressEvent, ProgressReporter, TransformResult, Transcoder,
    TrimRequest,
};

/// Messages accepted by the worker thread.
///
/// Input buffers are moved into the message; nothing is copied on the way in.
pub enum WorkerRequest {
    Init,
    Compress {
        request: CompressRequest,
        cancel: CancellationToken,
    },
    Trim {
        request: TrimRequest,
        cancel: CancellationToken,
    },
    Gif {
        request: GifRequest,
        cancel: CancellationToken,
    },
    Cleanup,
}

impl WorkerRequest {
    pub fn kind(&self) -> &'static str {
        match self {
            WorkerRequest::Init => "init",
            WorkerRequest::Compress { .. } => "compress",
            WorkerRequest::Trim { .. } => "trim",
            WorkerRequest::Gif { .. } => "gif",
            WorkerRequest::Cleanup => "cleanup",
        }
    }
}

/// Messages posted back by the worker thread.
///
/// Each request gets exactly one terminal response, optionally preceded by
/// `Progress` events.
#[derive(Debug)]
pub enum WorkerResponse {
    Initialized,
    Progress(ProgressEvent),
    Compressed(TransformResult),
    Trimmed(TransformResult),
    GifCreated(TransformResult),
    CleanedUp(usize),
    Error(ClipsmithError),
}

/// Transforms running on a dedicated thread with an engine of their own.
///
/// The worker never shares the caller's engine; it builds its own
/// `EngineManager` from the loader it is given and loads on `Init`.
pub struct MediaWorker {
    requests: UnboundedSender<WorkerRequest>,
    responses: UnboundedReceiver<WorkerResponse>,
    thread: JoinHandle<()>,
}

impl MediaWorker {
    pub fn spawn(loader: Arc<dyn EngineLoader>, config: Config) -> Result<Self> {
        let (request_tx, request_rx) = mpsc::unbounded_channel();
        let (response_tx, response_rx) = mpsc::unbounded_channel();

        let thread = std::thread::Builder::new()
            .name("media-worker".to_string())
            .spawn(move || {
                let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
                    Ok(runtime) => runtime,
                    Err(e) => {
                        error!("Media worker runtime failed to start: {}", e);
                        let _ = response_tx.send(WorkerResponse::Error(ClipsmithError::Io(e)));
                        return;
                    }
                };
                let engines = EngineManager::new(loader, config.engine.clone());
                let transcoder = Transcoder::new(engines, config.limits);
                runtime.block_on(serve(transcoder, request_rx, response_tx));
            })?;

        info!("Media worker started");
        Ok(Self {
            requests: request_tx,
            responses: response_rx,
            thread,
        })
    }

    /// Post a request without waiting for its response
    pub fn post(&self, request: WorkerRequest) -> Result<()> {
        self.requests
            .send(request)
            .map_err(|_| ClipsmithError::Worker("worker has exited".to_string()))
    }

    /// Next message from the worker; `None` once the worker has exited
    pub async fn next_response(&mut self) -> Option<WorkerResponse> {
        self.responses.recv().await
    }

    /// Load the worker's own engine
    pub async fn init(&mut self) -> Result<()> {
        self.post(WorkerRequest::Init)?;
        match self.drain(&ProgressReporter::silent()).await? {
            WorkerResponse::Initialized => Ok(()),
            other => Err(unexpected(other)),
        }
    }

    pub async fn compress(
        &mut self,
        request: CompressRequest,
        progress: &ProgressReporter,
        cancel: CancellationToken,
    ) -> Result<TransformResult> {
        self.post(WorkerRequest::Compress { request, cancel })?;
        match self.drain(progress).await? {
            WorkerResponse::Compressed(result) => Ok(result),
            other => Err(unexpected(other)),
        }
    }

    pub async fn trim(
        &mut self,
        request: TrimRequest,
        progress: &ProgressReporter,
        cancel: CancellationToken,
    ) -> Result<TransformResult> {
        self.post(WorkerRequest::Trim { request, cancel })?;
        match self.drain(progress).await? {
            WorkerResponse::Trimmed(result) => Ok(result),
            other => Err(unexpected(other)),
        }
    }

    pub async fn create_gif(
        &mut self,
        request: GifRequest,
        progress: &ProgressReporter,
        cancel: CancellationToken,
    ) -> Result<TransformResult> {
        self.post(WorkerRequest::Gif { request, cancel })?;
        match self.drain(progress).await? {
            WorkerResponse::GifCreated(result) => Ok(result),
            other => Err(unexpected(other)),
        }
    }

    /// Remove leftover working files from the worker's engine
    pub async fn cleanup(&mut self) -> Result<usize> {
        self.post(WorkerRequest::Cleanup)?;
        match self.drain(&ProgressReporter::silent()).await? {
            WorkerResponse::CleanedUp(removed) => Ok(removed),
            other => Err(unexpected(other)),
        }
    }

    /// Close the request channel and wait for the thread to finish.
    ///
    /// Blocks until any request already posted has been handled.
    pub fn terminate(self) -> Result<()> {
        drop(self.requests);
        self.thread
            .join()
            .map_err(|_| ClipsmithError::Worker("worker thread panicked".to_string()))?;
        info!("Media worker stopped");
        Ok(())
    }

    /// Forward progress until the terminal response arrives
    async fn drain(&mut self, progress: &ProgressReporter) -> Result<WorkerResponse> {
        loop {
            match self.next_response().await {
                Some(WorkerResponse::Progress(event)) => progress.report(event.percent),
                Some(WorkerResponse::Error(e)) => return Err(e),
                Some(response) => return Ok(response),
                None => return Err(ClipsmithError::Worker("worker has exited".to_string())),
            }
        }
    }
}

fn unexpected(response: WorkerResponse) -> ClipsmithError {
    ClipsmithError::Worker(format!("unexpected response: {:?}", response))
}

async fn serve(
    transcoder: Transcoder,
    mut requests: UnboundedReceiver<WorkerRequest>,
    responses: UnboundedSender<WorkerResponse>,
) {
    let mut initialized = false;

    while let Some(request) = requests.recv().await {
        debug!("Worker received {} request", request.kind());

        let reporter = {
            let responses = responses.clone();
            ProgressReporter::new(move |event| {
                let _ = responses.send(WorkerResponse::Progress(event));
            })
        };

        let response = match request {
            WorkerRequest::Init => match transcoder.ensure_ready().await {
                Ok(engine) => {
                    initialized = true;
                    info!("Worker engine ready ({})", engine.version());
                    WorkerResponse::Initialized
                }
                Err(e) => WorkerResponse::Error(e),
            },
            WorkerRequest::Cleanup => WorkerResponse::CleanedUp(transcoder.cleanup_all().await),
            _ if !initialized => WorkerResponse::Error(ClipsmithError::EngineNotReady),
            WorkerRequest::Compress { request, cancel } => {
                match transcoder.compress(&request, &reporter, &cancel).await {
                    Ok(result) => WorkerResponse::Compressed(result),
                    Err(e) => WorkerResponse::Error(e),
                }
            }
            WorkerRequest::Trim { request, cancel } => {
                match transcoder.trim(&request, &reporter, &cancel).await {
                    Ok(result) => WorkerResponse::Trimmed(result),
                    Err(e) => WorkerResponse::Error(e),
                }
            }
            WorkerRequest::Gif { request, cancel } => {
                match transcoder.create_gif(&request, &reporter, &cancel).await {
                    Ok(result) => WorkerResponse::GifCreated(result),
                    Err(e) => WorkerResponse::Error(e),
                }
            }
        };

        if responses.send(response).is_err() {
            debug!("Worker caller went away; stopping");
            break;
        }
    }

    let removed = transcoder.cleanup_all().await;
    debug!("Worker exiting after removing {} leftover files", removed);
}
