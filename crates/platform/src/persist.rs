//! JSON state file for the simulated installer

use serde::de::DeserializeOwned;
use serde::Serialize;
use sideload_errors::Error;
use std::path::Path;
use tokio::fs;

/// Write `value` to `path` through a temporary file and a rename so readers
/// never observe a partial file.
pub async fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> Result<(), Error> {
    let payload = serde_json::to_vec_pretty(value)
        .map_err(|e| Error::internal(format!("failed to serialise platform state: {e}")))?;
    let tmp_path = path.with_extension("json.tmp");

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .await
            .map_err(|e| Error::io_with_path(&e, parent))?;
    }

    fs::write(&tmp_path, payload)
        .await
        .map_err(|e| Error::io_with_path(&e, &tmp_path))?;
    fs::rename(&tmp_path, path)
        .await
        .map_err(|e| Error::io_with_path(&e, path))?;

    Ok(())
}

/// Read `path`, returning `None` when it does not exist yet
pub async fn read_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>, Error> {
    let bytes = match fs::read(path).await {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(Error::io_with_path(&e, path)),
    };
    serde_json::from_slice(&bytes)
        .map(Some)
        .map_err(|e| Error::internal(format!("failed to parse {}: {e}", path.display())))
}
