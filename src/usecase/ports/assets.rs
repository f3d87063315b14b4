use thiserror::Error;

use crate::domain::entities::row::ImageRef;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AssetError {
    #[error("could not fetch {reference}: {reason}")]
    Unreachable { reference: String, reason: String },

    #[error("{reference} is not an image ({content_type})")]
    NotAnImage {
        reference: String,
        content_type: String,
    },
}

/// Image bytes ready to embed in a report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadedImage {
    pub content_type: String,
    pub bytes: Vec<u8>,
}

pub trait ImageSource {
    fn load(&self, image: &ImageRef) -> Result<LoadedImage, AssetError>;
}

/// Guesses an image content type from a file name or URL path.
pub fn content_type_for(name: &str) -> Option<&'static str> {
    let path = name.split(['?', '#']).next().unwrap_or(name);
    let ext = path.rsplit('.').next()?.to_ascii_lowercase();
    match ext.as_str() {
        "png" => Some("image/png"),
        "jpg" | "jpeg" => Some("image/jpeg"),
        "gif" => Some("image/gif"),
        "webp" => Some("image/webp"),
        "svg" => Some("image/svg+xml"),
        "bmp" => Some("image/bmp"),
        _ => None,
    }
}
