//! Image format detection and JPEG recompression
//!
//! Thin adapter over the `image` crate. The CPU-heavy decode and encode
//! steps run on the blocking thread pool so workers never stall the runtime.

pub mod codec;
pub mod mime;

pub use codec::{decode, encode_jpeg, normalize, Normalization};
pub use mime::detect_content_type;

use crate::{Error, Result};
use image::DynamicImage;

/// Decodes `bytes` off the async runtime.
pub async fn decode_blocking(bytes: Vec<u8>, normalization: Normalization) -> Result<DynamicImage> {
    tokio::task::spawn_blocking(move || decode(&bytes, &normalization))
        .await
        .map_err(|e| Error::Invariant(format!("Image decode task join error: {}", e)))?
}

/// Encodes `image` as JPEG at `quality` off the async runtime.
pub async fn encode_blocking(image: DynamicImage, quality: u8) -> Result<Vec<u8>> {
    tokio::task::spawn_blocking(move || encode_jpeg(&image, quality))
        .await
        .map_err(|e| Error::Encode(format!("Image encode task join error: {}", e)))?
}
