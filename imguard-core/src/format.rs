//! Supported formats and the fixed encoder profile for each.

use std::{fmt, path::Path};

use serde::{Deserialize, Serialize};

/// Extensions the pipeline knows how to re-encode, lowercase.
pub const SUPPORTED_EXTENSIONS: &[&str] =
    &["avif", "gif", "jpg", "jpeg", "png", "webp"];

/// Output codec, derived from a file's extension.
#[derive(Clone, Copy, Debug, Hash, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// `.avif`
    Avif,
    /// `.gif`, every frame kept.
    Gif,
    /// `.jpg` and `.jpeg`
    Jpeg,
    /// `.png`
    Png,
    /// `.webp`
    WebP,
}

/// Fixed encoder options for one format. Lossless (or maximum quality)
/// everywhere; effort is maxed where the codec exposes it.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FormatProfile {
    /// Deflate settings.
    Png {
        /// Slowest, smallest deflate level.
        best_compression: bool,
        /// Choose the row filter per scanline.
        adaptive_filter: bool,
    },
    /// Baseline JPEG.
    Jpeg {
        /// 1..=100
        quality: u8,
    },
    /// Palette quantisation per frame.
    Gif {
        /// NeuQuant sampling speed, 1 is slowest and most faithful.
        speed: i32,
        /// Keep every frame, not just the first.
        all_frames: bool,
    },
    /// WebP through the pure-Rust encoder.
    WebP {
        /// Only lossless output is available.
        lossless: bool,
    },
    /// AV1 still image.
    Avif {
        /// 1 (slowest) to 10.
        speed: u8,
        /// 1..=100
        quality: u8,
    },
}

impl OutputFormat {
    /// Every format, in extension order.
    pub const ALL: [OutputFormat; 5] = [
        OutputFormat::Avif,
        OutputFormat::Gif,
        OutputFormat::Jpeg,
        OutputFormat::Png,
        OutputFormat::WebP,
    ];

    /// Case-insensitive lookup; `jpg` maps to the `jpeg` codec.
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_ascii_lowercase().as_str() {
            "avif" => Some(Self::Avif),
            "gif" => Some(Self::Gif),
            "jpg" | "jpeg" => Some(Self::Jpeg),
            "png" => Some(Self::Png),
            "webp" => Some(Self::WebP),
            _ => None,
        }
    }

    /// [`from_extension`](Self::from_extension) on the path's extension.
    pub fn from_path(path: &Path) -> Option<Self> {
        path.extension()
            .and_then(|ext| ext.to_str())
            .and_then(Self::from_extension)
    }

    /// Codec identifier as the encoder names it.
    pub fn codec_id(self) -> &'static str {
        match self {
            Self::Avif => "avif",
            Self::Gif => "gif",
            Self::Jpeg => "jpeg",
            Self::Png => "png",
            Self::WebP => "webp",
        }
    }

    /// Encoder options used for this format.
    pub fn profile(self) -> FormatProfile {
        match self {
            Self::Png => FormatProfile::Png {
                best_compression: true,
                adaptive_filter: true,
            },
            Self::Jpeg => FormatProfile::Jpeg { quality: 100 },
            Self::Gif => FormatProfile::Gif {
                speed: 1,
                all_frames: true,
            },
            Self::WebP => FormatProfile::WebP { lossless: true },
            Self::Avif => FormatProfile::Avif {
                speed: 5,
                quality: 100,
            },
        }
    }

    /// The matching `image` crate format.
    pub fn image_format(self) -> image::ImageFormat {
        match self {
            Self::Avif => image::ImageFormat::Avif,
            Self::Gif => image::ImageFormat::Gif,
            Self::Jpeg => image::ImageFormat::Jpeg,
            Self::Png => image::ImageFormat::Png,
            Self::WebP => image::ImageFormat::WebP,
        }
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.codec_id())
    }
}

/// True when `path` carries one of [`SUPPORTED_EXTENSIONS`], any case.
pub fn has_supported_extension(path: &Path) -> bool {
    OutputFormat::from_path(path).is_some()
}
