use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};

/// Progress of one transform, in percent
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ProgressEvent {
    pub percent: f32,
}

pub type ProgressCallback = Arc<dyn Fn(ProgressEvent) + Send + Sync>;

/// How the engine's native 0..1 signal maps onto percent
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ProgressMapping {
    /// 0..1 → 0..100
    Full,
    /// 0..1 → start..end, leaving room for setup and teardown ticks
    Range { start: f32, end: f32 },
}

impl ProgressMapping {
    pub fn map(self, ratio: f64) -> f32 {
        let ratio = if ratio.is_finite() { ratio.clamp(0.0, 1.0) as f32 } else { 0.0 };
        match self {
            ProgressMapping::Full => ratio * 100.0,
            ProgressMapping::Range { start, end } => start + ratio * (end - start),
        }
    }
}

/// Forwards progress to a caller while keeping the sequence non-decreasing.
///
/// One reporter belongs to one operation.
#[derive(Clone)]
pub struct ProgressReporter {
    callback: Option<ProgressCallback>,
    last: Arc<Mutex<Option<f32>>>,
}

impl ProgressReporter {
    pub fn new<F>(callback: F) -> Self
    where
        F: Fn(ProgressEvent) + Send + Sync + 'static,
    {
        Self {
            callback: Some(Arc::new(callback)),
            last: Arc::new(Mutex::new(None)),
        }
    }

    /// Reporter that only tracks the latest value
    pub fn silent() -> Self {
        Self {
            callback: None,
            last: Arc::new(Mutex::new(None)),
        }
    }

    /// Report a percentage; values below the last reported one are dropped
    pub fn report(&self, percent: f32) {
        let percent = if percent.is_finite() { percent.clamp(0.0, 100.0) } else { return };

        {
            let Ok(mut last) = self.last.lock() else { return };
            if matches!(*last, Some(previous) if percent <= previous) {
                return;
            }
            *last = Some(percent);
        }

        if let Some(callback) = &self.callback {
            callback(ProgressEvent { percent });
        }
    }

    /// Report a native engine ratio through `mapping`
    pub fn native(&self, ratio: f64, mapping: ProgressMapping) {
        self.report(mapping.map(ratio));
    }

    pub fn finish(&self) {
        self.report(100.0);
    }

    pub fn last(&self) -> Option<f32> {
        self.last.lock().ok().and_then(|last| *last)
    }
}
