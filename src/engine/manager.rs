use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use super::{EngineHandle, EngineLoader};
use crate::config::EngineConfig;
use crate::error::{ClipsmithError, Result};

type LoadOutcome = std::result::Result<EngineHandle, String>;

/// Observable lifecycle state of the managed engine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    Uninitialized,
    Loading,
    Ready,
    Failed,
}

enum LoadState {
    Uninitialized,
    Loading(watch::Receiver<Option<LoadOutcome>>),
    Ready(EngineHandle),
    Failed(String),
}

struct Shared {
    loader: Arc<dyn EngineLoader>,
    config: EngineConfig,
    state: Mutex<LoadState>,
    load_attempts: AtomicU64,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, LoadState> {
        // State transitions never panic mid-update, so a poisoned lock is still consistent
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Owns the one engine instance of an execution context.
///
/// Construct one per context (the application root, or a worker thread) and
/// pass it to whoever needs the engine. Loading is lazy and shared: concurrent
/// `ensure_ready` calls observe the same in-flight load, and a failed load
/// leaves the manager ready to try again.
#[derive(Clone)]
pub struct EngineManager {
    shared: Arc<Shared>,
}

enum Role {
    Leader(watch::Receiver<Option<LoadOutcome>>),
    Follower(watch::Receiver<Option<LoadOutcome>>),
}

impl EngineManager {
    pub fn new(loader: Arc<dyn EngineLoader>, config: EngineConfig) -> Self {
        Self {
            shared: Arc::new(Shared {
                loader,
                config,
                state: Mutex::new(LoadState::Uninitialized),
                load_attempts: AtomicU64::new(0),
            }),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.shared.config
    }

    pub fn state(&self) -> EngineState {
        match &*self.shared.lock() {
            LoadState::Uninitialized => EngineState::Uninitialized,
            LoadState::Loading(_) => EngineState::Loading,
            LoadState::Ready(_) => EngineState::Ready,
            LoadState::Failed(_) => EngineState::Failed,
        }
    }

    /// Number of load attempts started so far
    pub fn load_attempts(&self) -> u64 {
        self.shared.load_attempts.load(Ordering::SeqCst)
    }

    /// The engine if it has already been loaded
    pub fn current(&self) -> Result<EngineHandle> {
        match &*self.shared.lock() {
            LoadState::Ready(handle) => Ok(handle.clone()),
            _ => Err(ClipsmithError::EngineNotReady),
        }
    }

    /// Return the loaded engine, loading it first if needed
    pub async fn ensure_ready(&self) -> Result<EngineHandle> {
        let role = {
            let mut state = self.shared.lock();
            let inflight = match &*state {
                LoadState::Ready(handle) => return Ok(handle.clone()),
                LoadState::Loading(rx) => Some(rx.clone()),
                LoadState::Uninitialized | LoadState::Failed(_) => None,
            };
            match inflight {
                Some(rx) => Role::Follower(rx),
                None => {
                    let (tx, rx) = watch::channel(None);
                    *state = LoadState::Loading(rx.clone());
                    drop(state);
                    self.spawn_load(tx);
                    Role::Leader(rx)
                }
            }
        };

        match role {
            Role::Leader(rx) => self.await_load(rx).await,
            Role::Follower(rx) => self.poll_inflight(rx).await,
        }
    }

    fn spawn_load(&self, tx: watch::Sender<Option<LoadOutcome>>) {
        let shared = self.shared.clone();
        let attempt = shared.load_attempts.fetch_add(1, Ordering::SeqCst) + 1;
        info!("Loading codec engine (attempt {})", attempt);

        // Run detached so the load completes even if the first caller goes away
        tokio::spawn(async move {
            let timeout = shared.config.load_timeout();
            let outcome: LoadOutcome =
                match tokio::time::timeout(timeout, shared.loader.load(&shared.config)).await {
                    Ok(Ok(engine)) => Ok(EngineHandle::new(engine)),
                    Ok(Err(ClipsmithError::EngineLoad(reason))) => Err(reason),
                    Ok(Err(e)) => Err(e.to_string()),
                    Err(_) => Err(format!(
                        "engine load timed out after {}s",
                        shared.config.load_timeout_secs
                    )),
                };

            {
                let mut state = shared.lock();
                *state = match &outcome {
                    Ok(handle) => {
                        info!("Codec engine ready: {}", handle.version());
                        LoadState::Ready(handle.clone())
                    }
                    Err(reason) => {
                        warn!("Codec engine load failed: {}", reason);
                        LoadState::Failed(reason.clone())
                    }
                };
            }

            tx.send_replace(Some(outcome));
        });
    }

    async fn await_load(&self, mut rx: watch::Receiver<Option<LoadOutcome>>) -> Result<EngineHandle> {
        match rx.wait_for(|outcome| outcome.is_some()).await {
            Ok(outcome) => match outcome.as_ref() {
                Some(Ok(handle)) => Ok(handle.clone()),
                Some(Err(reason)) => Err(ClipsmithError::EngineLoad(reason.clone())),
                None => Err(ClipsmithError::EngineLoad("engine load produced no result".to_string())),
            },
            Err(_) => {
                // Load task vanished without reporting (runtime shutdown or panic)
                let mut state = self.shared.lock();
                if matches!(&*state, LoadState::Loading(_)) {
                    *state = LoadState::Failed("engine load was interrupted".to_string());
                }
                Err(ClipsmithError::EngineLoad("engine load was interrupted".to_string()))
            }
        }
    }

    /// Wait on a load started by someone else, with a bounded, doubling poll budget
    async fn poll_inflight(&self, mut rx: watch::Receiver<Option<LoadOutcome>>) -> Result<EngineHandle> {
        let mut backoff = self.shared.config.ready_poll_backoff();
        let mut polls = 0;

        loop {
            if let Some(outcome) = rx.borrow_and_update().clone() {
                return outcome.map_err(ClipsmithError::EngineLoad);
            }
            if polls >= self.shared.config.ready_poll_attempts {
                break;
            }
            polls += 1;

            match tokio::time::timeout(backoff, rx.changed()).await {
                Ok(Ok(())) => continue,
                Ok(Err(_)) => break,
                Err(_) => {
                    debug!("Engine still loading after poll {} ({:?})", polls, backoff);
                    backoff *= 2;
                }
            }
        }

        if let Some(outcome) = rx.borrow().clone() {
            return outcome.map_err(ClipsmithError::EngineLoad);
        }
        match &*self.shared.lock() {
            LoadState::Failed(reason) => Err(ClipsmithError::EngineLoad(reason.clone())),
            LoadState::Ready(handle) => Ok(handle.clone()),
            _ => Err(ClipsmithError::EngineLoad(
                "timed out waiting for the engine to load".to_string(),
            )),
        }
    }
}
