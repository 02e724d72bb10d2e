use std::path::Path;

use serde_json::Value;

use super::error::ExportError;

/// Compact JSON text of the result, byte-for-byte what gets saved.
pub fn render(result: &Value) -> Result<String, ExportError> {
    Ok(serde_json::to_string(result)?)
}

/// Replace the file at `path` with `text`. Not atomic: a failed write may
/// leave a truncated file behind.
pub async fn write_result(path: &Path, text: &str) -> Result<(), ExportError> {
    tokio::fs::write(path, text)
        .await
        .map_err(|source| ExportError::Write {
            path: path.display().to_string(),
            source,
        })
}
