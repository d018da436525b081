//! hf-convert: image decode/encode behind a uniform conversion contract.
//!
//! The rest of the workspace only sees the [`Converter`] trait. The shipped
//! implementation, [`ImageConverter`], sniffs the input container, decodes it
//! (HEIF through `libheif-rs` when the `heif` feature is enabled, everything
//! else through the `image` crate), applies the alpha policy for the target
//! format, and encodes.

mod decode;
mod encode;

pub use decode::{detect_source, is_heif, DetectedSource};
pub use encode::composite_on_white;

use hf_core::{SourceFormat, TargetFormat};

/// Failure modes of a single conversion.
#[derive(Debug, thiserror::Error)]
pub enum ConvertError {
    /// The input bytes are not a decodable image.
    #[error("failed to decode input: {0}")]
    Decode(String),

    /// The requested target is outside the supported set.
    #[error("unsupported target format: {0}")]
    UnsupportedFormat(String),

    /// The encoder failed.
    #[error("failed to encode {format}: {message}")]
    Encode {
        format: TargetFormat,
        message: String,
    },
}

impl From<ConvertError> for hf_core::Error {
    fn from(e: ConvertError) -> Self {
        match e {
            ConvertError::Decode(msg) => hf_core::Error::Decode(msg),
            ConvertError::UnsupportedFormat(f) => hf_core::Error::UnsupportedFormat(f),
            ConvertError::Encode { format, message } => {
                hf_core::Error::Encode(format!("{format}: {message}"))
            }
        }
    }
}

/// Parse a client-supplied target format name.
pub fn parse_target(name: &str) -> Result<TargetFormat, ConvertError> {
    name.parse()
        .map_err(|_| ConvertError::UnsupportedFormat(name.to_string()))
}

/// Converts raw image bytes of a supported source format into a target format.
///
/// Implementations must be usable from the blocking thread pool, hence
/// `Send + Sync`.
pub trait Converter: Send + Sync {
    /// Convert `input` to `target`.
    ///
    /// `source_hint` is derived from the upload's filename and is consulted
    /// only when the bytes themselves do not identify the container.
    /// `quality` (1..=100) is passed through to encoders that honour it.
    fn convert(
        &self,
        input: &[u8],
        source_hint: Option<SourceFormat>,
        target: TargetFormat,
        quality: u8,
    ) -> Result<Vec<u8>, ConvertError>;
}

/// [`Converter`] backed by the `image` crate (and `libheif-rs` with `heif`).
#[derive(Debug, Default, Clone, Copy)]
pub struct ImageConverter;

impl ImageConverter {
    pub fn new() -> Self {
        Self
    }

    /// Whether this build can decode HEIC/HEIF containers.
    pub fn heif_enabled() -> bool {
        cfg!(feature = "heif")
    }
}

impl Converter for ImageConverter {
    fn convert(
        &self,
        input: &[u8],
        source_hint: Option<SourceFormat>,
        target: TargetFormat,
        quality: u8,
    ) -> Result<Vec<u8>, ConvertError> {
        let source = detect_source(input, source_hint)?;
        let decoded = decode::decode(input, source)?;
        tracing::debug!(
            ?source,
            width = decoded.width(),
            height = decoded.height(),
            color = ?decoded.color(),
            %target,
            "Decoded input image"
        );

        let prepared = encode::prepare_for(decoded, target);
        encode::encode(&prepared, target, quality.clamp(1, 100))
    }
}
