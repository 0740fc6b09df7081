//! File system helpers for durable writes on the data volume.

use std::io;
use std::path::Path;

use tokio::fs;
use tokio::io::AsyncWriteExt;

/// Replace `path` with `contents` so readers see either the old or the new
/// file, never a torn one.
pub async fn write_atomic(path: &Path, contents: &[u8]) -> io::Result<()> {
    let tmp = path.with_extension("tmp");

    let mut file = fs::File::create(&tmp).await?;
    file.write_all(contents).await?;
    file.flush().await?;
    file.sync_all().await?;
    drop(file);

    fs::rename(&tmp, path).await?;
    if let Some(parent) = path.parent() {
        sync_dir(parent).await;
    }
    Ok(())
}

/// Flush a directory entry change (rename, create) to disk. Not all platforms
/// allow opening directories, so failures are only logged.
pub async fn sync_dir(dir: &Path) {
    let result = match fs::File::open(dir).await {
        Ok(handle) => handle.sync_all().await,
        Err(e) => Err(e),
    };
    if let Err(e) = result {
        tracing::debug!(dir = %dir.display(), error = %e, "Directory sync skipped");
    }
}

/// `fs::remove_file` that treats a missing file as success.
pub async fn remove_if_exists(path: &Path) -> io::Result<()> {
    match fs::remove_file(path).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e),
    }
}

/// `fs::try_exists` collapsed to a bool.
pub async fn exists(path: &Path) -> bool {
    fs::try_exists(path).await.unwrap_or(false)
}
