//! Video download collaborator
//!
//! The actual rendition fetch is an opaque external tool; this module
//! owns what surrounds it: failure classification by output heuristics,
//! rotation over download cookies (an independent credential type from
//! API keys), bounded retries, and the download-progress ledger that
//! records which ids have a confirmed artifact.

use crate::config::{Config, DownloadConfig};
use crate::crawler::Shutdown;
use crate::store::SnapshotStore;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Mutex;
use std::time::Duration;
use thiserror::Error;

/// Output fragments that indicate the platform blocked the download
const BLOCKED_MARKERS: [&str; 7] = [
    "429",
    "blocked",
    "rate limit",
    "too many requests",
    "captcha",
    "sign in to confirm",
    "unavailable in your country",
];

/// Output fragments that indicate a timeout
const TIMEOUT_MARKERS: [&str; 4] = [
    "timeout",
    "timed out",
    "connection timed out",
    "socket timeout",
];

/// How a download attempt failed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DownloadFailure {
    /// The platform refused the request; rotating the cookie may help
    Blocked,
    /// The transfer stalled; rotating the cookie may help
    Timeout,
    /// Anything else; not retried
    Other,
}

/// Classifies tool output by case-insensitive substring heuristics
pub fn classify_failure(output: &str) -> DownloadFailure {
    let output = output.to_lowercase();
    if BLOCKED_MARKERS.iter().any(|m| output.contains(m)) {
        return DownloadFailure::Blocked;
    }
    if TIMEOUT_MARKERS.iter().any(|m| output.contains(m)) {
        return DownloadFailure::Timeout;
    }
    DownloadFailure::Other
}

/// A failed fetch, carrying the tool output for classification
#[derive(Debug, Error)]
#[error("rendition fetch failed: {output}")]
pub struct FetchFailure {
    pub output: String,
}

/// Opaque "fetch best available rendition" service
#[async_trait]
pub trait RenditionFetcher: Send + Sync {
    /// Downloads the best rendition of `video_id` into `dest_dir`,
    /// returning the local file path
    async fn fetch_best_rendition(
        &self,
        video_id: &str,
        dest_dir: &Path,
        cookie: Option<&Path>,
    ) -> Result<PathBuf, FetchFailure>;
}

/// Cyclic rotation over download cookie files
///
/// Unlike the API credential pool, cookies wrap around: a blocked cookie
/// may recover, so rotation cycles rather than retiring.
#[derive(Debug, Default)]
pub struct CookiePool {
    files: Vec<PathBuf>,
    current: Mutex<usize>,
}

impl CookiePool {
    pub fn new(files: Vec<PathBuf>) -> Self {
        Self {
            files,
            current: Mutex::new(0),
        }
    }

    /// Loads every file in a cookie directory
    pub fn from_dir(dir: &Path) -> std::io::Result<Self> {
        let mut files: Vec<PathBuf> = std::fs::read_dir(dir)?
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .filter(|path| path.is_file())
            .collect();
        files.sort();
        Ok(Self::new(files))
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    pub fn current_cookie(&self) -> Option<PathBuf> {
        let current = self.current.lock().unwrap();
        self.files.get(*current).cloned()
    }

    /// Advances to the next cookie, wrapping at the end
    pub fn rotate(&self) -> Option<PathBuf> {
        if self.files.is_empty() {
            return None;
        }
        let mut current = self.current.lock().unwrap();
        *current = (*current + 1) % self.files.len();
        tracing::info!("Rotated to download cookie #{}", *current + 1);
        self.files.get(*current).cloned()
    }
}

/// Downloads one video, rotating cookies on blocked/timeout failures
///
/// Attempts are bounded by the cookie count (at least one); an
/// unclassified failure is not retried.
pub async fn download_with_rotation(
    fetcher: &dyn RenditionFetcher,
    cookies: &CookiePool,
    video_id: &str,
    dest_dir: &Path,
) -> Result<PathBuf, FetchFailure> {
    let attempts = cookies.len().max(1);
    let mut last_output = String::new();

    for attempt in 0..attempts {
        let cookie = cookies.current_cookie();
        match fetcher
            .fetch_best_rendition(video_id, dest_dir, cookie.as_deref())
            .await
        {
            Ok(path) => return Ok(path),
            Err(failure) => {
                let class = classify_failure(&failure.output);
                last_output = failure.output;
                match class {
                    DownloadFailure::Blocked | DownloadFailure::Timeout
                        if attempt + 1 < attempts =>
                    {
                        tracing::warn!(
                            "Download of {} {} (attempt {}), rotating cookie",
                            video_id,
                            if class == DownloadFailure::Blocked {
                                "blocked"
                            } else {
                                "timed out"
                            },
                            attempt + 1
                        );
                        cookies.rotate();
                    }
                    _ => break,
                }
            }
        }
    }

    Err(FetchFailure {
        output: last_output,
    })
}

/// Rendition fetcher shelling out to a yt-dlp binary
pub struct YtDlpFetcher {
    binary: String,
    timeout: Duration,
}

impl YtDlpFetcher {
    pub fn new(config: &DownloadConfig) -> Self {
        Self {
            binary: config.binary.clone(),
            timeout: Duration::from_secs(config.timeout_secs),
        }
    }
}

#[async_trait]
impl RenditionFetcher for YtDlpFetcher {
    async fn fetch_best_rendition(
        &self,
        video_id: &str,
        dest_dir: &Path,
        cookie: Option<&Path>,
    ) -> Result<PathBuf, FetchFailure> {
        let output_template = dest_dir.join(format!("{}.%(ext)s", video_id));
        let url = format!("https://www.youtube.com/watch?v={}", video_id);

        let mut command = tokio::process::Command::new(&self.binary);
        command
            .arg("--no-playlist")
            .arg("-f")
            .arg("best")
            .arg("-o")
            .arg(&output_template)
            .arg(&url)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        if let Some(cookie) = cookie {
            command.arg("--cookies").arg(cookie);
        }

        let run = tokio::time::timeout(self.timeout, command.output()).await;
        let output = match run {
            Err(_) => {
                return Err(FetchFailure {
                    output: "download timed out".to_string(),
                })
            }
            Ok(Err(e)) => {
                return Err(FetchFailure {
                    output: format!("failed to spawn {}: {}", self.binary, e),
                })
            }
            Ok(Ok(output)) => output,
        };

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(FetchFailure {
                output: stderr.into_owned(),
            });
        }

        // yt-dlp picks the extension; find what it wrote
        let mut entries = tokio::fs::read_dir(dest_dir).await.map_err(|e| FetchFailure {
            output: e.to_string(),
        })?;
        while let Ok(Some(entry)) = entries.next_entry().await {
            let name = entry.file_name();
            if name.to_string_lossy().starts_with(video_id) {
                return Ok(entry.path());
            }
        }

        Err(FetchFailure {
            output: format!("no artifact produced for {}", video_id),
        })
    }
}

/// Works the download queue: every harvested id without a confirmed
/// artifact is fetched and recorded in the download ledger
pub async fn run_download_queue(
    config: &Config,
    store: &SnapshotStore,
    fetcher: &dyn RenditionFetcher,
    dest_dir: &Path,
    shutdown: &Shutdown,
) -> crate::Result<usize> {
    let cookies = match &config.download.cookies_dir {
        Some(dir) => CookiePool::from_dir(Path::new(dir))?,
        None => CookiePool::default(),
    };
    tracing::info!("Download queue: {} cookies available", cookies.len());

    let mut ledger = store.load_download_ledger()?;
    std::fs::create_dir_all(dest_dir)?;

    let mut queue = Vec::new();
    for category in &config.categories {
        if let Some(container) = store.load_category(&category.name)? {
            for (id, _record) in container.records() {
                if !ledger.contains(id) {
                    queue.push(id.clone());
                }
            }
        }
    }
    tracing::info!("Download queue: {} pending videos", queue.len());

    let mut downloaded = 0;
    for video_id in queue {
        if shutdown.is_triggered() {
            break;
        }

        match download_with_rotation(fetcher, &cookies, &video_id, dest_dir).await {
            Ok(path) => {
                tracing::info!("Downloaded {} to {}", video_id, path.display());
                ledger.record(&video_id);
                if let Err(e) = store.save_download_ledger(&ledger) {
                    tracing::warn!("Failed to persist download ledger: {}", e);
                }
                downloaded += 1;
            }
            Err(failure) => {
                tracing::warn!(
                    "Giving up on {} ({:?}): {}",
                    video_id,
                    classify_failure(&failure.output),
                    failure.output.lines().next().unwrap_or_default()
                );
            }
        }
    }

    Ok(downloaded)
}
