//! Preview encoding seam.
//!
//! The core treats raw sensor bytes and preview encoding as a black box:
//! `encode_preview` turns a raw capture into viewer-ready bytes plus the
//! header fields worth surfacing as metadata. Real codecs (FITS → JPEG with
//! header extraction) live outside this crate; the grayscale normalizer here
//! serves the simulator path, whose payloads are plain 8-bit samples.

use bytes::Bytes;

use crate::error::{CameraError, Result};
use crate::feed::Metadata;

/// Converts raw sensor bytes into an encoded preview plus metadata.
pub trait PreviewCodec: Send + Sync {
    fn encode_preview(&self, raw: &Bytes) -> Result<(Bytes, Metadata)>;
}

/// Min/max-normalizing 8-bit grayscale encoder.
///
/// Stretches the sample range to full scale, the standard first-look
/// treatment for sensor data whose dynamic range is unknown up front.
pub struct GrayscalePreviewCodec;

impl PreviewCodec for GrayscalePreviewCodec {
    fn encode_preview(&self, raw: &Bytes) -> Result<(Bytes, Metadata)> {
        if raw.is_empty() {
            return Err(CameraError::CaptureFailed("empty image payload".into()));
        }

        let min = *raw.iter().min().unwrap();
        let max = *raw.iter().max().unwrap();
        let span = max.saturating_sub(min).max(1) as u16;

        let stretched: Vec<u8> = raw
            .iter()
            .map(|&v| (((v - min) as u16 * 255) / span) as u8)
            .collect();

        let mut metadata = Metadata::new();
        metadata.insert("image_bytes".into(), raw.len().into());
        metadata.insert("sample_min".into(), min.into());
        metadata.insert("sample_max".into(), max.into());

        Ok((Bytes::from(stretched), metadata))
    }
}
