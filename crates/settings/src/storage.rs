use std::fs;
use std::io::{self, ErrorKind};
use std::path::Path;

use serde_json::Value;

use crate::store::SettingsError;

/// 讀取 JSON 設定檔；檔案不存在時回傳 `None`。 / Reads a JSON document, `None` when the file is absent.
///
/// A byte-order mark selects UTF-8, UTF-16LE or UTF-16BE and is stripped;
/// without one the bytes must be valid UTF-8.
pub(crate) fn read_document(path: &Path) -> Result<Option<Value>, SettingsError> {
    let bytes = match fs::read(path) {
        Ok(bytes) => bytes,
        Err(err) if err.kind() == ErrorKind::NotFound => return Ok(None),
        Err(source) => {
            return Err(SettingsError::Read {
                path: path.to_path_buf(),
                source,
            })
        }
    };

    let (text, encoding, had_errors) = encoding_rs::UTF_8.decode(&bytes);
    if had_errors {
        return Err(SettingsError::Decode {
            path: path.to_path_buf(),
            encoding: encoding.name(),
        });
    }

    serde_json::from_str(&text)
        .map(Some)
        .map_err(|source| SettingsError::Parse {
            path: path.to_path_buf(),
            source,
        })
}

/// 以 UTF-8（無 BOM）寫入 JSON 並回傳寫入內容。 / Writes pretty JSON as UTF-8 without a BOM and returns the payload.
pub(crate) fn write_document(path: &Path, document: &Value) -> Result<String, SettingsError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|source| SettingsError::CreateDir {
            path: parent.to_path_buf(),
            source,
        })?;
    }
    let payload =
        serde_json::to_string_pretty(document).map_err(|source| SettingsError::Serialize {
            path: path.to_path_buf(),
            source,
        })?;
    write_atomic(path, payload.as_bytes()).map_err(|source| SettingsError::Write {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(payload)
}

fn write_atomic(path: &Path, data: &[u8]) -> io::Result<()> {
    let tmp_path = path.with_extension("tmp");
    fs::write(&tmp_path, data)?;
    fs::rename(&tmp_path, path)?;
    Ok(())
}
