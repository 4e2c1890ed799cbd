use async_trait::async_trait;
use reqwest::Client;
use std::path::{Path, PathBuf};
use tokio::fs as async_fs;
use tracing::{debug, info};

use crate::config::EngineConfig;
use crate::error::{ClipsmithError, Result};

/// Where the engine's files come from, derived from `core_asset_base`
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AssetSource {
    /// Resolve the binary on the system PATH
    SystemPath,
    /// A local directory holding the assets
    Directory(PathBuf),
    /// An HTTP(S) base URL; assets are downloaded on load
    Remote(String),
}

impl AssetSource {
    pub fn from_base(base: &str) -> Self {
        let base = base.trim();
        if base.is_empty() {
            AssetSource::SystemPath
        } else if base.starts_with("http://") || base.starts_with("https://") {
            AssetSource::Remote(base.trim_end_matches('/').to_string())
        } else {
            AssetSource::Directory(PathBuf::from(base))
        }
    }
}

/// Fetches raw asset bytes from a URL
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait AssetFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>>;
}

/// `reqwest`-backed fetcher for CDN-hosted engine assets
pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    pub fn new() -> Result<Self> {
        let client = Client::builder()
            .user_agent(concat!("clipsmith/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(ClipsmithError::Http)?;

        Ok(Self { client })
    }
}

#[async_trait]
impl AssetFetcher for HttpFetcher {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>> {
        debug!("Fetching engine asset {}", url);
        let response = self.client.get(url).send().await?;

        if !response.status().is_success() {
            return Err(ClipsmithError::EngineLoad(format!(
                "Failed to fetch {}: HTTP {}",
                url,
                response.status()
            )));
        }

        let bytes = response.bytes().await?;
        Ok(bytes.to_vec())
    }
}

/// Locally runnable engine files
#[derive(Debug, Clone)]
pub struct ResolvedAssets {
    /// Program to spawn; a bare name is looked up on PATH
    pub binary: PathBuf,
    pub extras: Vec<PathBuf>,
}

/// Turn the configured asset base into files the engine can run from.
///
/// Remote assets are written under `asset_dir`, which the caller owns.
pub async fn resolve_assets(
    config: &EngineConfig,
    fetcher: &dyn AssetFetcher,
    asset_dir: &Path,
) -> Result<ResolvedAssets> {
    match AssetSource::from_base(&config.core_asset_base) {
        AssetSource::SystemPath => {
            if !config.extra_assets.is_empty() {
                return Err(ClipsmithError::Config(
                    "extra_assets require core_asset_base to be set".to_string(),
                ));
            }
            Ok(ResolvedAssets {
                binary: PathBuf::from(&config.core_binary),
                extras: Vec::new(),
            })
        }
        AssetSource::Directory(dir) => {
            let binary = dir.join(&config.core_binary);
            if !binary.is_file() {
                return Err(ClipsmithError::EngineLoad(format!(
                    "engine binary not found at {}",
                    binary.display()
                )));
            }

            let mut extras = Vec::new();
            for name in &config.extra_assets {
                let path = dir.join(name);
                if !path.is_file() {
                    return Err(ClipsmithError::EngineLoad(format!(
                        "engine asset not found at {}",
                        path.display()
                    )));
                }
                extras.push(path);
            }

            Ok(ResolvedAssets { binary, extras })
        }
        AssetSource::Remote(base) => {
            info!("Downloading engine assets from {}", base);
            async_fs::create_dir_all(asset_dir).await?;

            let binary = download(fetcher, &base, &config.core_binary, asset_dir).await?;
            mark_executable(&binary).await?;

            let mut extras = Vec::new();
            for name in &config.extra_assets {
                extras.push(download(fetcher, &base, name, asset_dir).await?);
            }

            Ok(ResolvedAssets { binary, extras })
        }
    }
}

async fn download(fetcher: &dyn AssetFetcher, base: &str, name: &str, dir: &Path) -> Result<PathBuf> {
    let url = format!("{}/{}", base, name);
    let bytes = fetcher.fetch(&url).await?;
    if bytes.is_empty() {
        return Err(ClipsmithError::EngineLoad(format!("asset {} is empty", url)));
    }

    let local_path = dir.join(name);
    async_fs::write(&local_path, &bytes).await?;
    debug!("Stored {} ({} bytes) at {}", name, bytes.len(), local_path.display());
    Ok(local_path)
}

#[cfg(unix)]
async fn mark_executable(path: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    async_fs::set_permissions(path, std::fs::Permissions::from_mode(0o755)).await?;
    Ok(())
}

#[cfg(not(unix))]
async fn mark_executable(_path: &Path) -> Result<()> {
    Ok(())
}
