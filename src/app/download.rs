use std::path::PathBuf;

use thiserror::Error;

use crate::app::local_ref::{LocalRef, LocalRefs};
use crate::app::webhook::{SubmitError, decode_data_uri};

pub const DOWNLOAD_FILE_NAME: &str = "anuncio_anexo.png";

#[derive(Debug, Error)]
pub enum DownloadError {
    #[error("no se pudo guardar: {0}")]
    Io(#[from] std::io::Error),
    #[error("imagen en base64 no válida")]
    Base64,
    #[error("no se pudo descargar: {0}")]
    Fetch(#[from] SubmitError),
    #[error("la imagen ya no está disponible")]
    Missing,
}

#[derive(Clone, Debug)]
pub enum DownloadStatus {
    None,
    Fetching,
    Complete(PathBuf),
    Error(String),
}

impl DownloadStatus {
    pub fn is_busy(&self) -> bool {
        matches!(self, DownloadStatus::Fetching)
    }

    pub fn is_none(&self) -> bool {
        matches!(self, DownloadStatus::None)
    }
}

/// Where the bytes of a result reference come from.
#[derive(Debug, PartialEq)]
pub enum ResultSource {
    Ready(Vec<u8>),
    Remote(String),
}

pub fn resolve(result: &str, refs: &LocalRefs) -> Result<ResultSource, DownloadError> {
    if LocalRef::is_local(result) {
        let bytes = refs.bytes(result).ok_or(DownloadError::Missing)?;
        Ok(ResultSource::Ready(bytes.to_vec()))
    } else if result.starts_with("data:") {
        decode_data_uri(result)
            .map(ResultSource::Ready)
            .ok_or(DownloadError::Base64)
    } else {
        Ok(ResultSource::Remote(result.to_owned()))
    }
}

/// Asks where to save the image. `Ok(None)` means the dialog was cancelled.
pub fn save_with_dialog(bytes: &[u8]) -> Result<Option<PathBuf>, DownloadError> {
    let Some(path) = rfd::FileDialog::new()
        .set_title("Descargar imagen")
        .add_filter("png", &["png"])
        .set_file_name(DOWNLOAD_FILE_NAME)
        .save_file()
    else {
        return Ok(None);
    };
    std::fs::write(&path, bytes)?;
    log::info!("result saved to {}", path.display());
    Ok(Some(path))
}
