use super::d2d::normalize_file_type;
use crate::constants::{DEFAULT_MATTE, UPLOAD_DATE_FORMAT};
use crate::error::{ClientError, Result};

use std::path::{Path, PathBuf};

/// Image to upload
#[derive(Debug, Clone, PartialEq)]
pub enum UploadSource {
    /// Read from disk, the extension sets the file type
    Path(PathBuf),
    Bytes(Vec<u8>),
}

impl From<PathBuf> for UploadSource {
    fn from(path: PathBuf) -> Self {
        UploadSource::Path(path)
    }
}

impl From<&Path> for UploadSource {
    fn from(path: &Path) -> Self {
        UploadSource::Path(path.to_path_buf())
    }
}

impl From<Vec<u8>> for UploadSource {
    fn from(bytes: Vec<u8>) -> Self {
        UploadSource::Bytes(bytes)
    }
}

impl From<&[u8]> for UploadSource {
    fn from(bytes: &[u8]) -> Self {
        UploadSource::Bytes(bytes.to_vec())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct UploadOptions {
    /// `None` uploads without a matte
    pub matte: Option<String>,
    pub portrait_matte: Option<String>,
    /// Used for byte sources, paths use their extension
    pub file_type: String,
    /// Defaults to now as `%Y:%m:%d %H:%M:%S`
    pub date: Option<String>,
}

impl Default for UploadOptions {
    fn default() -> Self {
        Self {
            matte: Some(DEFAULT_MATTE.into()),
            portrait_matte: Some(DEFAULT_MATTE.into()),
            file_type: "png".into(),
            date: None,
        }
    }
}

impl UploadOptions {
    pub fn with_matte<S: Into<String>>(mut self, matte: Option<S>) -> Self {
        self.matte = matte.map(Into::into);
        self
    }

    pub fn with_portrait_matte<S: Into<String>>(mut self, matte: Option<S>) -> Self {
        self.portrait_matte = matte.map(Into::into);
        self
    }

    pub fn with_file_type<S: Into<String>>(mut self, file_type: S) -> Self {
        self.file_type = file_type.into();
        self
    }

    pub fn with_date<S: Into<String>>(mut self, date: S) -> Self {
        self.date = Some(date.into());
        self
    }

    pub(crate) fn image_date(&self) -> String {
        match &self.date {
            Some(date) => date.clone(),
            None => chrono::Local::now().format(UPLOAD_DATE_FORMAT).to_string(),
        }
    }
}

/// Bytes ready to send
#[derive(Debug)]
pub(crate) struct Prepared {
    pub data: Vec<u8>,
    pub file_type: String,
}

fn file_type_of(path: &Path, fallback: &str) -> String {
    let ext = path
        .extension()
        .and_then(|ext| ext.to_str())
        .unwrap_or(fallback);
    normalize_file_type(ext)
}

fn checked(data: Vec<u8>, file_type: String) -> Result<Prepared> {
    if data.is_empty() {
        return Err(ClientError::InvalidUpload("image is empty".into()).into());
    }
    Ok(Prepared { data, file_type })
}

pub(crate) async fn prepare(source: UploadSource, options: &UploadOptions) -> Result<Prepared> {
    match source {
        UploadSource::Path(path) => {
            let file_type = file_type_of(&path, &options.file_type);
            log::debug!("Reading {} for upload", path.display());
            let data = tokio::fs::read(&path).await?;
            checked(data, file_type)
        }
        UploadSource::Bytes(data) => checked(data, normalize_file_type(&options.file_type)),
    }
}

pub(crate) fn prepare_blocking(source: UploadSource, options: &UploadOptions) -> Result<Prepared> {
    match source {
        UploadSource::Path(path) => {
            let file_type = file_type_of(&path, &options.file_type);
            let data = std::fs::read(&path)?;
            checked(data, file_type)
        }
        UploadSource::Bytes(data) => checked(data, normalize_file_type(&options.file_type)),
    }
}
