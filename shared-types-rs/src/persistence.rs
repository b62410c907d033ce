// shared-types-rs/src/persistence.rs
// Whole-file JSON persistence shared by the approval and investigation stores.
//
// Implementation notes:
// - Files are replaced wholesale: serialize, write a sibling temp file, rename.
// - Reads treat a missing or empty file as "nothing persisted yet".
// - Writes are coalesced by `DebouncedSaver`: each mutation re-arms a single
//   one-shot timer, so a burst of mutations produces one write. The write
//   itself runs on the blocking pool.

use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::warn;

/// Persistence error type.
#[derive(Debug, thiserror::Error)]
pub enum PersistError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

fn temp_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

/// Serializes `value` as pretty JSON and atomically replaces `path` with it.
///
/// `mode` is applied to the file on unix platforms (e.g. `0o600` for files
/// that hold commands awaiting approval).
pub fn write_json_file<T>(path: &Path, value: &T, mode: u32) -> Result<(), PersistError>
where
    T: Serialize + ?Sized,
{
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }

    let data = serde_json::to_vec_pretty(value)?;
    let tmp = temp_path(path);

    let mut options = OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(mode);
    }
    #[cfg(not(unix))]
    let _ = mode;

    {
        let mut file = options.open(&tmp)?;
        file.write_all(&data)?;
        file.sync_all()?;
    }

    // The open mode is masked by umask and ignored for pre-existing files.
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(&tmp, fs::Permissions::from_mode(mode))?;
    }

    fs::rename(&tmp, path)?;
    Ok(())
}

/// Reads and decodes a JSON file. Returns `Ok(None)` when the file does not
/// exist or is empty.
pub fn read_json_file<T>(path: &Path) -> Result<Option<T>, PersistError>
where
    T: DeserializeOwned,
{
    let data = match fs::read(path) {
        Ok(data) => data,
        Err(err) if err.kind() == ErrorKind::NotFound => return Ok(None),
        Err(err) => return Err(err.into()),
    };
    if data.iter().all(|b| b.is_ascii_whitespace()) {
        return Ok(None);
    }
    Ok(Some(serde_json::from_slice(&data)?))
}

/// One-shot, resettable save timer.
///
/// `schedule` always replaces the pending timer instead of stacking a second
/// one. Outside a tokio runtime there is nothing to drive the timer, so the
/// save runs inline.
pub struct DebouncedSaver {
    delay: Duration,
    timer: Mutex<Option<JoinHandle<()>>>,
}

impl DebouncedSaver {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            timer: Mutex::new(None),
        }
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Arms the timer; when it fires, `save` runs once on the blocking pool.
    pub fn schedule<F>(&self, save: F)
    where
        F: FnOnce() + Send + 'static,
    {
        let mut timer = self.timer.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(previous) = timer.take() {
            previous.abort();
        }

        match Handle::try_current() {
            Ok(handle) => {
                let delay = self.delay;
                *timer = Some(handle.spawn(async move {
                    tokio::time::sleep(delay).await;
                    if let Err(err) = tokio::task::spawn_blocking(save).await {
                        warn!(error = %err, "Debounced save did not complete");
                    }
                }));
            }
            Err(_) => {
                drop(timer);
                save();
            }
        }
    }

    /// Disarms the pending timer, if any. Returns whether a save was pending.
    pub fn cancel(&self) -> bool {
        let mut timer = self.timer.lock().unwrap_or_else(|e| e.into_inner());
        match timer.take() {
            Some(handle) => {
                let pending = !handle.is_finished();
                handle.abort();
                pending
            }
            None => false,
        }
    }

    pub fn is_pending(&self) -> bool {
        let timer = self.timer.lock().unwrap_or_else(|e| e.into_inner());
        timer.as_ref().map(|h| !h.is_finished()).unwrap_or(false)
    }
}

impl Drop for DebouncedSaver {
    fn drop(&mut self) {
        let timer = self.timer.get_mut().unwrap_or_else(|e| e.into_inner());
        if let Some(handle) = timer.take() {
            handle.abort();
        }
    }
}
