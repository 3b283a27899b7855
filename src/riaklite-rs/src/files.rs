use std::path::{Path, PathBuf};

use riaklite_core::models::MAX_FILE_BYTESIZE;

use crate::{ClientError, Result};

/// A local file that passed the upload checks
#[derive(Debug)]
pub(crate) struct UploadFile {
    pub path: PathBuf,
    pub key: String,
    pub contents: Vec<u8>,
}

/// Resolve, size-check and read a file for upload.
///
/// `key` defaults to the file name. Everything here happens before any
/// request is built.
pub(crate) async fn load_upload(path: &Path, key: Option<&str>) -> Result<UploadFile> {
    let path = tokio::fs::canonicalize(path)
        .await
        .map_err(|_| ClientError::FileUnreadable {
            path: path.to_path_buf(),
        })?;

    let metadata = tokio::fs::metadata(&path)
        .await
        .map_err(|_| ClientError::FileUnreadable { path: path.clone() })?;
    if !metadata.is_file() {
        return Err(ClientError::FileUnreadable { path });
    }

    if metadata.len() > MAX_FILE_BYTESIZE {
        return Err(ClientError::FileTooLarge {
            size: metadata.len(),
            max: MAX_FILE_BYTESIZE,
            path,
        });
    }

    let key = match key {
        Some(key) => key.to_string(),
        None => file_name(&path),
    };
    if key.is_empty() {
        return Err(ClientError::EmptyKey);
    }

    let contents = tokio::fs::read(&path)
        .await
        .map_err(|_| ClientError::FileUnreadable { path: path.clone() })?;

    Ok(UploadFile {
        path,
        key,
        contents,
    })
}

/// Open `path` for writing, truncating it, after checking its directory.
pub(crate) async fn create_download(path: &Path) -> Result<tokio::fs::File> {
    let dir = parent_dir(path);

    let writable = match tokio::fs::metadata(&dir).await {
        Ok(metadata) => metadata.is_dir() && !metadata.permissions().readonly(),
        Err(_) => false,
    };
    if !writable {
        return Err(ClientError::NotWritable { dir });
    }

    tokio::fs::File::create(path).await.map_err(|e| match e.kind() {
        std::io::ErrorKind::PermissionDenied => ClientError::NotWritable { dir },
        _ => ClientError::Io(e),
    })
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default()
}

fn parent_dir(path: &Path) -> PathBuf {
    match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir.to_path_buf(),
        _ => PathBuf::from("."),
    }
}
