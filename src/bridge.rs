//! Moving bytes in and out of the engine's private file namespace.
//!
//! Every name staged for an operation must be released when that operation
//! ends, whether it succeeded or not. Release never fails: cleanup errors are
//! logged and dropped so they cannot replace the operation's own error.

use chrono::Utc;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::engine::Engine;
use crate::error::{ClipsmithError, Result};

/// Names used by single-file flows that predate unique naming
pub const WELL_KNOWN_FILES: [&str; 4] = ["input", "output.mp4", "output.webm", "output.gif"];

/// Prefixes of every name this crate stages
pub const STAGED_PREFIXES: [&str; 3] = ["input-", "output-", "probe-"];

/// A file staged into the engine for the duration of one operation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagedFile {
    pub name: String,
    pub byte_length: usize,
}

/// Collision-safe name: `<prefix>-<UTC timestamp>-<random>[.ext]`
pub fn unique_name(prefix: &str, extension: Option<&str>) -> String {
    let stamp = Utc::now().format("%Y%m%dT%H%M%S%3f");
    let random = Uuid::new_v4().simple().to_string();
    match extension {
        Some(ext) => format!("{}-{}-{}.{}", prefix, stamp, &random[..8], ext),
        None => format!("{}-{}-{}", prefix, stamp, &random[..8]),
    }
}

/// Write `bytes` into the engine under `name`
pub async fn stage(engine: &dyn Engine, name: &str, bytes: &[u8]) -> Result<StagedFile> {
    if let Err(e) = engine.write_file(name, bytes).await {
        warn!("Could not stage {} ({} bytes): {}", name, bytes.len(), e);
        return Err(ClipsmithError::ExecutionFailed(format!("Staging {}", name)));
    }
    debug!("Staged {} ({} bytes)", name, bytes.len());
    Ok(StagedFile {
        name: name.to_string(),
        byte_length: bytes.len(),
    })
}

/// Best-effort delete; the file may never have been written
pub async fn unstage(engine: &dyn Engine, name: &str) {
    match engine.delete_file(name).await {
        Ok(()) => debug!("Unstaged {}", name),
        Err(e) => debug!("Nothing to unstage for {}: {}", name, e),
    }
}

/// Unstage every name an operation reserved
pub async fn release(engine: &dyn Engine, names: &[String]) {
    for name in names {
        unstage(engine, name).await;
    }
}

/// Remove well-known working files and any staged leftovers.
///
/// Returns the number of files removed. Never fails.
pub async fn cleanup_all(engine: &dyn Engine) -> usize {
    let existing = match engine.list_files().await {
        Ok(names) => names,
        Err(e) => {
            warn!("Could not list engine files for cleanup: {}", e);
            return 0;
        }
    };

    let mut removed = 0;
    for name in existing {
        let leftover = WELL_KNOWN_FILES.contains(&name.as_str())
            || STAGED_PREFIXES.iter().any(|prefix| name.starts_with(prefix));
        if !leftover {
            continue;
        }
        match engine.delete_file(&name).await {
            Ok(()) => removed += 1,
            Err(e) => warn!("Failed to remove leftover engine file {}: {}", name, e),
        }
    }

    if removed > 0 {
        debug!("Removed {} leftover engine files", removed);
    }
    removed
}
