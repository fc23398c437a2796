use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

/// accepted input extensions, lowercase
pub const IMAGE_EXTENSIONS: &[&str] = &[
    "jpg", "jpeg", "png", "webp", "bmp", "gif", "tiff", "tif",
];

pub fn has_image_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|ext| IMAGE_EXTENSIONS.contains(&ext.to_lowercase().as_str()))
}

/// parse an ordering string like "3,1-2" into 0-indexed positions
///
/// Each position may appear once. Positions left out are dropped from the list.
pub fn parse_order(s: &str, num_images: usize) -> Result<Vec<usize>> {
    let mut order = Vec::new();
    let push = |p: usize, order: &mut Vec<usize>| -> Result<()> {
        anyhow::ensure!(
            p >= 1 && p <= num_images,
            "Image {} out of bounds ({} image(s) loaded)",
            p,
            num_images
        );
        anyhow::ensure!(!order.contains(&(p - 1)), "Image {} listed more than once", p);
        order.push(p - 1);
        Ok(())
    };

    for part in s.split(',') {
        let part = part.trim();
        if part.is_empty() {
            continue;
        }
        if let Some((start, end)) = part.split_once('-') {
            let start: usize = start.trim().parse().context("Invalid image number in range")?;
            let end: usize = end.trim().parse().context("Invalid image number in range")?;
            // descending ranges reverse the run
            if start <= end {
                for p in start..=end {
                    push(p, &mut order)?;
                }
            } else {
                for p in (end..=start).rev() {
                    push(p, &mut order)?;
                }
            }
        } else {
            let p: usize = part.parse().context("Invalid image number")?;
            push(p, &mut order)?;
        }
    }
    anyhow::ensure!(!order.is_empty(), "No images selected");
    Ok(order)
}

fn is_glob_pattern(path: &Path) -> bool {
    path.to_str().is_some_and(|s| s.contains(['*', '?', '[']))
}

/// expand dirs and glob patterns in the input list into image files
///
/// Directory entries are sorted. Explicit files with a foreign extension are
/// skipped with a warning; an input list with no image left is an error.
pub fn expand_image_paths(paths: &[PathBuf]) -> Result<Vec<PathBuf>> {
    let mut result = Vec::new();
    for path in paths {
        if path.is_dir() {
            let mut entries: Vec<PathBuf> = std::fs::read_dir(path)
                .with_context(|| format!("Cannot read directory: {}", path.display()))?
                .filter_map(|e| e.ok())
                .map(|e| e.path())
                .filter(|p| p.is_file() && has_image_extension(p))
                .collect();
            entries.sort();
            if entries.is_empty() {
                log::warn!("No image files found in {}", path.display());
            }
            result.extend(entries);
        } else if !path.exists() && is_glob_pattern(path) {
            let pattern = path.to_string_lossy();
            let mut matches: Vec<PathBuf> = glob::glob(&pattern)
                .with_context(|| format!("Invalid glob pattern: {}", pattern))?
                .filter_map(|e| e.ok())
                .filter(|p| p.is_file() && has_image_extension(p))
                .collect();
            matches.sort();
            if matches.is_empty() {
                log::warn!("Pattern {} matched no image files", pattern);
            }
            result.extend(matches);
        } else if has_image_extension(path) {
            result.push(path.clone());
        } else {
            log::warn!("Skipping {}: not an accepted image type", path.display());
        }
    }
    anyhow::ensure!(
        !result.is_empty(),
        "No image files provided (accepted: {})",
        IMAGE_EXTENSIONS.join(", ")
    );
    Ok(result)
}

pub struct JpegInfo {
    pub width: u32,
    pub height: u32,
    pub components: u8,
    /// transform flag of the APP14 Adobe marker, if present
    pub adobe_color_transform: Option<u8>,
}

/// parse JPEG markers up to SOF for dimensions, component count and Adobe transform
pub fn parse_jpeg_header(data: &[u8]) -> Result<JpegInfo> {
    anyhow::ensure!(
        data.len() >= 2 && data[0] == 0xFF && data[1] == 0xD8,
        "Not a valid JPEG file"
    );
    let mut adobe_color_transform = None;
    let mut pos = 2;
    while pos + 4 < data.len() {
        if data[pos] != 0xFF {
            anyhow::bail!("Invalid JPEG marker at offset {}", pos);
        }
        let marker = data[pos + 1];
        if marker == 0xFF {
            pos += 1;
            continue;
        }
        // RST and standalone markers carry no length
        if marker == 0x00 || (0xD0..=0xD9).contains(&marker) {
            pos += 2;
            continue;
        }
        let len = u16::from_be_bytes([data[pos + 2], data[pos + 3]]) as usize;
        anyhow::ensure!(len >= 2, "Invalid JPEG segment length at offset {}", pos);

        // APP14 "Adobe": 5 byte id, version(2), flags0(2), flags1(2), transform(1)
        if marker == 0xEE && len >= 14 && pos + 2 + len <= data.len() {
            let seg = &data[pos + 4..pos + 2 + len];
            if seg.starts_with(b"Adobe") {
                adobe_color_transform = Some(seg[11]);
            }
        }

        // SOF0-SOF3, SOF5-SOF7, SOF9-SOF11, SOF13-SOF15 (skips DHT, JPG, DAC)
        if matches!(marker, 0xC0..=0xC3 | 0xC5..=0xC7 | 0xC9..=0xCB | 0xCD..=0xCF) {
            anyhow::ensure!(pos + 2 + len <= data.len() && len >= 8, "Truncated SOF");
            let height = u16::from_be_bytes([data[pos + 5], data[pos + 6]]) as u32;
            let width = u16::from_be_bytes([data[pos + 7], data[pos + 8]]) as u32;
            return Ok(JpegInfo {
                width,
                height,
                components: data[pos + 9],
                adobe_color_transform,
            });
        }
        pos += 2 + len;
    }
    anyhow::bail!("No SOF marker found in JPEG")
}
