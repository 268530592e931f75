//! File system utilities.

use std::path::Path;

use serde::Serialize;
use tokio::io::AsyncWriteExt;

use crate::error::Result;

/// Write bytes atomically (write to temp, then rename).
pub async fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }

    let tmp = path.with_extension("tmp");
    let mut file = tokio::fs::File::create(&tmp).await?;
    file.write_all(bytes).await?;
    file.flush().await?;
    file.sync_all().await?;
    drop(file);

    tokio::fs::rename(&tmp, path).await?;
    Ok(())
}

/// Save data to a JSON file with pretty printing, atomically.
pub async fn save_json<T: Serialize + ?Sized>(path: &Path, data: &T) -> Result<()> {
    let bytes = serde_json::to_vec_pretty(data)?;
    write_atomic(path, &bytes).await
}

/// Read a file, returning `None` if it does not exist.
pub async fn read_optional(path: &Path) -> Result<Option<Vec<u8>>> {
    match tokio::fs::read(path).await {
        Ok(bytes) => Ok(Some(bytes)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}
