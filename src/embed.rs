use anyhow::{Context, Result};
use flate2::write::ZlibEncoder;
use flate2::Compression;
use image::{GenericImageView, ImageFormat};
use std::io::Write;

use crate::ingest::SourceFile;
use crate::parse::parse_jpeg_header;

/// image data ready for insertion as a PDF XObject
pub enum PreparedImage {
    /// original JPEG stream, embedded with DCTDecode
    Jpeg {
        width: u32,
        height: u32,
        components: u8,
        /// true if CMYK values need inversion
        invert_cmyk: bool,
        data: Vec<u8>,
    },
    /// decoded pixels compressed with deflate
    Compressed {
        width: u32,
        height: u32,
        color_channels: u8,
        color: Vec<u8>,
        alpha: Option<Vec<u8>>,
    },
}

impl PreparedImage {
    pub fn dimensions(&self) -> (u32, u32) {
        match self {
            PreparedImage::Jpeg { width, height, .. }
            | PreparedImage::Compressed { width, height, .. } => (*width, *height),
        }
    }
}

pub(crate) fn deflate(
    level: Compression,
    capacity: usize,
    chunks: impl IntoIterator<Item = impl AsRef<[u8]>>,
) -> Result<Vec<u8>> {
    let mut enc = ZlibEncoder::new(Vec::with_capacity(capacity), level);
    for chunk in chunks {
        enc.write_all(chunk.as_ref())?;
    }
    Ok(enc.finish()?)
}

pub fn prepare_image(source: &SourceFile, level: Compression) -> Result<PreparedImage> {
    let path = source.path.display();

    if source.format == ImageFormat::Jpeg {
        let info = parse_jpeg_header(&source.bytes)
            .with_context(|| format!("Failed to parse JPEG header: {}", path))?;
        if matches!(info.components, 1 | 3 | 4) {
            // Adobe transform 0 is plain CMYK; YCCK or a missing marker means inverted
            let invert_cmyk = info.components == 4 && info.adobe_color_transform != Some(0);
            return Ok(PreparedImage::Jpeg {
                width: info.width,
                height: info.height,
                components: info.components,
                invert_cmyk,
                data: source.bytes.clone(),
            });
        }
        log::debug!(
            "{}: {} JPEG components, re-encoding instead of passthrough",
            path,
            info.components
        );
    }

    let img = image::load_from_memory_with_format(&source.bytes, source.format)
        .with_context(|| format!("Failed to decode image: {}", path))?;
    let (width, height) = img.dimensions();
    let pixel_count = (width as usize) * (height as usize);

    if img.color().has_alpha() {
        let rgba = img.into_rgba8();
        let pixels = rgba.as_raw();
        let color = deflate(
            level,
            pixel_count * 3 / 2,
            pixels.chunks_exact(4).map(|px| &px[..3]),
        )?;
        let alpha = deflate(
            level,
            pixel_count / 2,
            pixels.chunks_exact(4).map(|px| &px[3..4]),
        )?;
        Ok(PreparedImage::Compressed {
            width,
            height,
            color_channels: 3,
            color,
            alpha: Some(alpha),
        })
    } else if img.color().channel_count() == 1 {
        let gray = img.into_luma8();
        Ok(PreparedImage::Compressed {
            width,
            height,
            color_channels: 1,
            color: deflate(level, pixel_count / 2, [gray.as_raw()])?,
            alpha: None,
        })
    } else {
        let rgb = img.into_rgb8();
        Ok(PreparedImage::Compressed {
            width,
            height,
            color_channels: 3,
            color: deflate(level, pixel_count * 3 / 2, [rgb.as_raw()])?,
            alpha: None,
        })
    }
}
