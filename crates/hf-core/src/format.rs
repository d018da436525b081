//! Image format enums shared by the converter and the HTTP layer.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::str::FromStr;

use crate::Error;

/// Output formats the service can encode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum TargetFormat {
    Jpeg,
    Png,
    Bmp,
    Webp,
}

impl TargetFormat {
    /// All supported targets, in the order they are advertised.
    pub const ALL: [TargetFormat; 4] = [
        TargetFormat::Jpeg,
        TargetFormat::Png,
        TargetFormat::Bmp,
        TargetFormat::Webp,
    ];

    /// Canonical lowercase name, also used as the output file extension.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Jpeg => "jpeg",
            Self::Png => "png",
            Self::Bmp => "bmp",
            Self::Webp => "webp",
        }
    }

    /// File extension for converted outputs (`<stem>.<extension>`).
    pub fn extension(&self) -> &'static str {
        self.as_str()
    }

    /// MIME type used for single-file responses.
    pub fn mime_type(&self) -> &'static str {
        match self {
            Self::Jpeg => "image/jpeg",
            Self::Png => "image/png",
            Self::Bmp => "image/bmp",
            Self::Webp => "image/webp",
        }
    }

    /// Whether the format can carry an alpha channel.
    ///
    /// Sources with transparency are composited onto white before encoding
    /// to a format that returns `false` here.
    pub fn supports_alpha(&self) -> bool {
        !matches!(self, Self::Jpeg)
    }

    /// Whether the encoder honours the quality parameter.
    pub fn uses_quality(&self) -> bool {
        matches!(self, Self::Jpeg)
    }
}

impl fmt::Display for TargetFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TargetFormat {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "jpeg" | "jpg" => Ok(Self::Jpeg),
            "png" => Ok(Self::Png),
            "bmp" => Ok(Self::Bmp),
            "webp" => Ok(Self::Webp),
            _ => Err(Error::UnsupportedFormat(s.to_string())),
        }
    }
}

/// Source container formats accepted for upload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceFormat {
    Heic,
    Heif,
}

impl SourceFormat {
    /// Derive the source format from a client-supplied filename.
    ///
    /// Matching is case-insensitive on the final extension only.
    pub fn from_filename(name: &str) -> Option<Self> {
        let ext = Path::new(name).extension()?.to_str()?.to_ascii_lowercase();
        match ext.as_str() {
            "heic" => Some(Self::Heic),
            "heif" => Some(Self::Heif),
            _ => None,
        }
    }
}

/// Validate that a filename carries an accepted source extension.
pub fn ensure_source_extension(name: &str) -> crate::Result<SourceFormat> {
    SourceFormat::from_filename(name).ok_or_else(|| {
        Error::Validation(format!(
            "Only HEIC/HEIF files are supported (got '{name}')"
        ))
    })
}

/// The stem of a client-supplied filename, used to name converted outputs.
///
/// Falls back to `"image"` when the name has no usable stem.
pub fn file_stem(name: &str) -> String {
    Path::new(name)
        .file_stem()
        .and_then(|s| s.to_str())
        .filter(|s| !s.is_empty())
        .unwrap_or("image")
        .to_string()
}
