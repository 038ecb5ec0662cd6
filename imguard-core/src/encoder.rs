//! Encoder capability and the `image`-backed implementation.
//!
//! Encoding is synchronous and CPU bound; the transformer runs it on the
//! blocking pool and writes the returned bytes to the temp artifact itself.

use std::{
    fs::File,
    io::{self, BufReader},
    path::Path,
};

use image::{
    AnimationDecoder, DynamicImage, ImageError, ImageReader,
    codecs::{
        avif::AvifEncoder,
        gif::{GifDecoder, GifEncoder, Repeat},
        jpeg::JpegEncoder,
        png::{CompressionType, FilterType, PngDecoder, PngEncoder},
        webp::{WebPDecoder, WebPEncoder},
    },
};
use tracing::trace;

use crate::{
    error::EncodeError,
    format::{FormatProfile, OutputFormat},
};

/// Re-encodes one file into a fresh byte buffer.
pub trait Encoder: Send + Sync {
    /// Decode `source` and re-encode it as `format`. Must not write to
    /// disk.
    fn encode(
        &self,
        source: &Path,
        format: OutputFormat,
    ) -> Result<Vec<u8>, EncodeError>;
}

/// Encoder backed by the `image` crate, using the fixed
/// [`FormatProfile`] table.
#[derive(Clone, Copy, Debug, Default)]
pub struct ImageEncoder;

impl ImageEncoder {
    /// The stateless default encoder.
    pub fn new() -> Self {
        Self
    }
}

impl Encoder for ImageEncoder {
    fn encode(
        &self,
        source: &Path,
        format: OutputFormat,
    ) -> Result<Vec<u8>, EncodeError> {
        trace!(path = %source.display(), %format, "encoding");
        match format.profile() {
            FormatProfile::Gif { speed, all_frames } => {
                encode_gif(source, speed, all_frames)
            }
            profile => {
                reject_animation(source, format)?;
                let image = decode_still(source, format)?;
                encode_still(&image, profile)
            }
        }
    }
}

fn open(source: &Path) -> Result<BufReader<File>, EncodeError> {
    File::open(source).map(BufReader::new).map_err(|err| {
        EncodeError::Other(format!(
            "failed to open {}: {err}",
            source.display()
        ))
    })
}

fn decode_still(
    source: &Path,
    format: OutputFormat,
) -> Result<DynamicImage, EncodeError> {
    ImageReader::with_format(open(source)?, format.image_format())
        .decode()
        .map_err(decode_error)
}

/// Animated PNG and WebP would lose every frame but the first when decoded
/// as a still image; refuse them instead.
fn reject_animation(
    source: &Path,
    format: OutputFormat,
) -> Result<(), EncodeError> {
    match format {
        OutputFormat::Png => {
            let decoder =
                PngDecoder::new(open(source)?).map_err(decode_error)?;
            if decoder.is_apng().map_err(decode_error)? {
                return Err(EncodeError::Unsupported(
                    "animated PNG would lose frames".into(),
                ));
            }
        }
        OutputFormat::WebP => {
            let decoder =
                WebPDecoder::new(open(source)?).map_err(decode_error)?;
            if decoder.has_animation() {
                return Err(EncodeError::Unsupported(
                    "animated WebP would lose frames".into(),
                ));
            }
        }
        _ => {}
    }
    Ok(())
}

fn encode_still(
    image: &DynamicImage,
    profile: FormatProfile,
) -> Result<Vec<u8>, EncodeError> {
    let mut buf = Vec::new();
    let written = match profile {
        FormatProfile::Png {
            best_compression,
            adaptive_filter,
        } => {
            let compression = if best_compression {
                CompressionType::Best
            } else {
                CompressionType::Default
            };
            let filter = if adaptive_filter {
                FilterType::Adaptive
            } else {
                FilterType::NoFilter
            };
            image.write_with_encoder(PngEncoder::new_with_quality(
                &mut buf,
                compression,
                filter,
            ))
        }
        FormatProfile::Jpeg { quality } => {
            let image = without_alpha(image);
            image.write_with_encoder(JpegEncoder::new_with_quality(
                &mut buf, quality,
            ))
        }
        FormatProfile::WebP { lossless } => {
            if !lossless {
                return Err(EncodeError::Unsupported(
                    "lossy WebP encoding is not available".into(),
                ));
            }
            let image = to_8bit_rgb_or_rgba(image);
            image.write_with_encoder(WebPEncoder::new_lossless(&mut buf))
        }
        FormatProfile::Avif { speed, quality } => {
            let image = to_8bit_rgb_or_rgba(image);
            image.write_with_encoder(AvifEncoder::new_with_speed_quality(
                &mut buf, speed, quality,
            ))
        }
        FormatProfile::Gif { .. } => {
            return Err(EncodeError::Other(
                "gif goes through the frame encoder".into(),
            ));
        }
    };
    written.map_err(encode_error)?;
    Ok(buf)
}

fn encode_gif(
    source: &Path,
    speed: i32,
    all_frames: bool,
) -> Result<Vec<u8>, EncodeError> {
    let decoder = GifDecoder::new(open(source)?).map_err(decode_error)?;
    let mut frames = decoder
        .into_frames()
        .collect_frames()
        .map_err(decode_error)?;
    if !all_frames {
        frames.truncate(1);
    }
    if frames.is_empty() {
        return Err(EncodeError::Decode("gif has no frames".into()));
    }

    let mut buf = Vec::new();
    {
        let mut encoder = GifEncoder::new_with_speed(&mut buf, speed);
        encoder.set_repeat(Repeat::Infinite).map_err(encode_error)?;
        encoder.encode_frames(frames).map_err(encode_error)?;
        // Trailer is written when the encoder drops.
    }
    Ok(buf)
}

fn without_alpha(image: &DynamicImage) -> DynamicImage {
    match image {
        DynamicImage::ImageLuma8(_) | DynamicImage::ImageRgb8(_) => {
            image.clone()
        }
        DynamicImage::ImageLumaA8(_) | DynamicImage::ImageLuma16(_) => {
            DynamicImage::ImageLuma8(image.to_luma8())
        }
        _ => DynamicImage::ImageRgb8(image.to_rgb8()),
    }
}

fn to_8bit_rgb_or_rgba(image: &DynamicImage) -> DynamicImage {
    match image {
        DynamicImage::ImageRgb8(_) | DynamicImage::ImageRgba8(_) => {
            image.clone()
        }
        _ if image.color().has_alpha() => {
            DynamicImage::ImageRgba8(image.to_rgba8())
        }
        _ => DynamicImage::ImageRgb8(image.to_rgb8()),
    }
}

fn decode_error(err: ImageError) -> EncodeError {
    match err {
        ImageError::Decoding(err) => EncodeError::Decode(err.to_string()),
        ImageError::Unsupported(err) => {
            EncodeError::Unsupported(err.to_string())
        }
        ImageError::Limits(err) => EncodeError::Unsupported(err.to_string()),
        ImageError::IoError(err) if is_truncation(&err) => {
            EncodeError::Decode(err.to_string())
        }
        other => EncodeError::Other(other.to_string()),
    }
}

fn encode_error(err: ImageError) -> EncodeError {
    match err {
        ImageError::Unsupported(err) => {
            EncodeError::Unsupported(err.to_string())
        }
        other => EncodeError::Other(other.to_string()),
    }
}

fn is_truncation(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::UnexpectedEof | io::ErrorKind::InvalidData
    )
}
