//! Acquisition of the trained parameters from disk or over HTTP.

use std::fmt;
use std::path::PathBuf;
use url::Url;

#[cfg(feature = "execute")]
pub use acquire::{Weights, acquire};

/// Where the checkpoint comes from. Chosen explicitly by configuration; there is
/// no fallback from one source to the other.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum WeightsSource {
    Local(PathBuf),
    Remote(Url),
}

impl WeightsSource {
    pub fn kind(&self) -> &'static str {
        match self {
            WeightsSource::Local(_) => "local",
            WeightsSource::Remote(_) => "remote",
        }
    }
}

impl fmt::Display for WeightsSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WeightsSource::Local(path) => write!(f, "{}", path.display()),
            WeightsSource::Remote(url) => write!(f, "{}", url),
        }
    }
}

#[cfg(feature = "execute")]
mod acquire {
    use super::WeightsSource;
    use crate::error::{ModelError, ModelResult};
    use futures::StreamExt;
    use std::path::{Path, PathBuf};
    use tempfile::NamedTempFile;
    use tokio::io::AsyncWriteExt;
    use url::Url;

    /// Weights ready to be loaded. A downloaded checkpoint lives in a temporary
    /// file that is deleted when this guard is dropped.
    #[derive(Debug)]
    pub enum Weights {
        Local(PathBuf),
        Downloaded(NamedTempFile),
    }

    impl Weights {
        pub fn path(&self) -> &Path {
            match self {
                Weights::Local(path) => path,
                Weights::Downloaded(file) => file.path(),
            }
        }
    }

    pub async fn acquire(source: &WeightsSource) -> ModelResult<Weights> {
        match source {
            WeightsSource::Local(path) => {
                match tokio::fs::metadata(path).await {
                    Ok(meta) if meta.is_file() => {}
                    Ok(_) => return Err(ModelError::WeightsNotFound(path.clone())),
                    Err(e) => return Err(metadata_error(path, e)),
                }
                tracing::info!(path = %path.display(), "Using local model weights");
                Ok(Weights::Local(path.clone()))
            }
            WeightsSource::Remote(url) => {
                let file = download(url, &std::env::temp_dir()).await?;
                Ok(Weights::Downloaded(file))
            }
        }
    }

    /// Stream `url` into a fresh temporary file under `dir`. On any failure the
    /// partial file is removed before returning.
    pub(crate) async fn download(url: &Url, dir: &Path) -> ModelResult<NamedTempFile> {
        let temp = tempfile::Builder::new()
            .prefix("paddy-weights-")
            .tempfile_in(dir)?;

        tracing::info!(%url, path = %temp.path().display(), "Downloading model weights");

        let response = reqwest::get(url.clone())
            .await
            .map_err(|e| download_error(url, e))?;

        if !response.status().is_success() {
            return Err(ModelError::Download {
                url: url.to_string(),
                message: format!("server responded with {}", response.status()),
            });
        }

        let mut file = tokio::fs::File::from_std(temp.reopen()?);
        let mut stream = response.bytes_stream();
        let mut downloaded = 0u64;

        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| download_error(url, e))?;
            file.write_all(&chunk).await?;
            downloaded += chunk.len() as u64;
        }
        file.flush().await?;

        tracing::info!(bytes = downloaded, "Model weights downloaded");
        Ok(temp)
    }

    /// Only a missing path counts as absent weights; anything else is surfaced as I/O.
    pub(crate) fn metadata_error(path: &Path, err: std::io::Error) -> ModelError {
        match err.kind() {
            std::io::ErrorKind::NotFound => ModelError::WeightsNotFound(path.to_path_buf()),
            _ => ModelError::Io(err),
        }
    }

    fn download_error(url: &Url, err: reqwest::Error) -> ModelError {
        ModelError::Download {
            url: url.to_string(),
            message: err.to_string(),
        }
    }
}
