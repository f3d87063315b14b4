use std::path::Path;
use std::time::Duration;

use reqwest::blocking::Client;

use crate::domain::entities::row::ImageRef;
use crate::usecase::ports::assets::{content_type_for, AssetError, ImageSource, LoadedImage};

/// Loads report images from attachments, local files and `http(s)` URLs.
pub struct ImageFetcher {
    client: Client,
}

impl ImageFetcher {
    pub fn new(timeout: Duration) -> Result<Self, AssetError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|err| AssetError::Unreachable {
                reference: "http client".to_string(),
                reason: err.to_string(),
            })?;
        Ok(Self { client })
    }

    fn fetch_url(&self, url: &str) -> Result<LoadedImage, AssetError> {
        let unreachable = |reason: String| AssetError::Unreachable {
            reference: url.to_string(),
            reason,
        };
        let response = self
            .client
            .get(url)
            .send()
            .map_err(|err| unreachable(err.to_string()))?;
        if !response.status().is_success() {
            return Err(unreachable(format!("status {}", response.status())));
        }
        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(|value| value.split(';').next().unwrap_or(value).trim().to_string())
            .or_else(|| content_type_for(url).map(str::to_string))
            .unwrap_or_default();
        let bytes = response
            .bytes()
            .map_err(|err| unreachable(err.to_string()))?
            .to_vec();
        checked(url, content_type, bytes)
    }
}

fn checked(reference: &str, content_type: String, bytes: Vec<u8>) -> Result<LoadedImage, AssetError> {
    if !content_type.starts_with("image/") {
        return Err(AssetError::NotAnImage {
            reference: reference.to_string(),
            content_type,
        });
    }
    Ok(LoadedImage {
        content_type,
        bytes,
    })
}

fn read_file(reference: &str, path: &Path) -> Result<LoadedImage, AssetError> {
    let bytes = std::fs::read(path).map_err(|err| AssetError::Unreachable {
        reference: reference.to_string(),
        reason: err.to_string(),
    })?;
    let content_type = content_type_for(reference).unwrap_or_default().to_string();
    checked(reference, content_type, bytes)
}

impl ImageSource for ImageFetcher {
    fn load(&self, image: &ImageRef) -> Result<LoadedImage, AssetError> {
        match image {
            ImageRef::Attached { file_name, bytes } => {
                let content_type = content_type_for(file_name).unwrap_or_default().to_string();
                checked(file_name, content_type, bytes.clone())
            }
            ImageRef::Stored(reference) => {
                if reference.starts_with("http://") || reference.starts_with("https://") {
                    self.fetch_url(reference)
                } else {
                    let path = reference.strip_prefix("file://").unwrap_or(reference);
                    read_file(reference, Path::new(path))
                }
            }
        }
    }
}
