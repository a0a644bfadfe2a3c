//! Temp-file-plus-rename credential persistence (§4.A step 4, §9's note on
//! the source's unsafe in-place write).

use helix_core::{HelixError, Result};
use std::path::Path;

/// Write `bytes` to `path` atomically: a temp file in the same directory,
/// fsync'd, then renamed over the original. `mode` is applied to the temp
/// file before the rename so the final file never has a wider window than
/// the original permissions (owner read/write only, per §6).
pub async fn write_atomic(path: &Path, bytes: &[u8], mode: u32) -> Result<()> {
    let dir = path.parent().ok_or_else(|| HelixError::Internal("credential path has no parent".into()))?;
    tokio::fs::create_dir_all(dir).await.map_err(|e| HelixError::Internal(e.to_string()))?;

    let tmp_path = dir.join(format!(".{}.tmp-{}", file_name(path), uuid::Uuid::new_v4()));

    {
        use tokio::io::AsyncWriteExt;
        let mut file =
            tokio::fs::File::create(&tmp_path).await.map_err(|e| HelixError::Internal(e.to_string()))?;
        file.write_all(bytes).await.map_err(|e| HelixError::Internal(e.to_string()))?;
        file.sync_all().await.map_err(|e| HelixError::Internal(e.to_string()))?;
        set_mode(&tmp_path, mode).await?;
    }

    tokio::fs::rename(&tmp_path, path).await.map_err(|e| HelixError::Internal(e.to_string()))?;
    Ok(())
}

fn file_name(path: &Path) -> String {
    path.file_name().and_then(|n| n.to_str()).unwrap_or("credentials").to_string()
}

#[cfg(unix)]
async fn set_mode(path: &Path, mode: u32) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    let perms = std::fs::Permissions::from_mode(mode);
    tokio::fs::set_permissions(path, perms).await.map_err(|e| HelixError::Internal(e.to_string()))
}

#[cfg(not(unix))]
async fn set_mode(_path: &Path, _mode: u32) -> Result<()> {
    Ok(())
}

/// Read a file's content plus its current Unix mode bits (`0` on
/// non-Unix, where the 0600 invariant isn't enforceable).
pub async fn read_with_mode(path: &Path) -> Result<(Vec<u8>, u32)> {
    let bytes = tokio::fs::read(path).await.map_err(|e| HelixError::Internal(e.to_string()))?;
    let mode = file_mode(path).await;
    Ok((bytes, mode))
}

#[cfg(unix)]
async fn file_mode(path: &Path) -> u32 {
    use std::os::unix::fs::PermissionsExt;
    tokio::fs::metadata(path).await.map(|m| m.permissions().mode() & 0o777).unwrap_or(0o600)
}

#[cfg(not(unix))]
async fn file_mode(_path: &Path) -> u32 {
    0o600
}
