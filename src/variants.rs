//! Image variant generation and EXIF capture dates.
//!
//! For each image post the build produces one re-encoded file per configured
//! width (`large`/`medium`/`small`), preserving aspect ratio, written beside
//! the post's slug path as `image-<width>.<ext>`. Decoding uses the `image`
//! crate, resizing is Lanczos3.
//!
//! ## Incremental skip rule
//!
//! A variant whose file already exists and is newer than the source image is
//! not regenerated. This is purely a local optimization: the sync engine
//! diffs by content signature, so a regenerated-but-identical variant is
//! still not treated as a change.
//!
//! ## EXIF
//!
//! [`capture_date`] extracts the capture timestamp (`DateTimeOriginal`,
//! falling back to `DateTime`) from embedded EXIF data. Absence of EXIF data
//! is not an error — the capture date is simply unset, and sorting falls
//! back to the post's `posted` metadata.
//!
//! ## Failure policy
//!
//! A decode failure is fatal for that post's build and is reported with the
//! source path. The orchestrator collects it and lets sibling posts finish.

use chrono::{DateTime, TimeZone, Utc};
use exif::{In, Tag};
use image::DynamicImage;
use image::imageops::FilterType;
use std::fs;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::config::ImagesConfig;
use crate::model::{Post, Variant};

#[derive(Error, Debug)]
pub enum VariantError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to decode {path}: {source}")]
    Decode {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },
    #[error("failed to encode {path}: {source}")]
    Encode {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },
    #[error("post has no image payload: {0}")]
    NotImage(PathBuf),
}

/// JPEG quality for re-encoded variants.
const JPEG_QUALITY: u8 = 90;

/// Extensions the generator accepts as post source images.
pub const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png"];

/// Whether a path looks like a supported source image.
pub fn is_image_file(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| {
            IMAGE_EXTENSIONS
                .iter()
                .any(|supported| ext.eq_ignore_ascii_case(supported))
        })
}

/// Generate every configured variant for an image post.
///
/// Writes `image-<width>.<ext>` files under `<output_root>/<slug>/` and
/// records the variant paths (relative to the output root) on the post.
/// The source is decoded at most once, and only if some variant is stale.
pub fn generate(
    post: &mut Post,
    output_root: &Path,
    images: &ImagesConfig,
) -> Result<(), VariantError> {
    let source = match &post.image {
        Some(image) => image.source.clone(),
        None => return Err(VariantError::NotImage(post.original_path.clone())),
    };
    // The discovery pass stats the source once; reuse that timestamp.
    let source_mtime = match post.mod_time {
        Some(mtime) => mtime,
        None => fs::metadata(&source)?.modified()?,
    };

    let targets: Vec<(Variant, u32, PathBuf)> = Variant::ALL
        .iter()
        .map(|&variant| {
            let width = images.width(variant);
            (variant, width, post.image_path_for_width(width))
        })
        .collect();

    fs::create_dir_all(output_root.join(&post.slug))?;

    let mut decoded: Option<DynamicImage> = None;
    for (_, width, relative) in &targets {
        let target = output_root.join(relative);
        if is_fresh(&target, source_mtime) {
            continue;
        }
        if decoded.is_none() {
            decoded = Some(decode(&source)?);
        }
        let Some(img) = decoded.as_ref() else {
            continue;
        };
        let resized = img.resize(*width, u32::MAX, FilterType::Lanczos3);
        encode(&resized, &target)?;
    }

    if let Some(payload) = post.image.as_mut() {
        for (variant, _, relative) in targets {
            payload.variants.insert(variant, relative);
        }
    }
    Ok(())
}

/// A variant file is fresh when it exists and is newer than the source.
fn is_fresh(target: &Path, source_mtime: std::time::SystemTime) -> bool {
    fs::metadata(target)
        .and_then(|meta| meta.modified())
        .is_ok_and(|mtime| mtime > source_mtime)
}

fn decode(source: &Path) -> Result<DynamicImage, VariantError> {
    image::open(source).map_err(|e| VariantError::Decode {
        path: source.to_path_buf(),
        source: e,
    })
}

fn encode(img: &DynamicImage, target: &Path) -> Result<(), VariantError> {
    let ext = target
        .extension()
        .and_then(|ext| ext.to_str())
        .unwrap_or("")
        .to_ascii_lowercase();

    match ext.as_str() {
        "jpg" | "jpeg" => {
            let file = fs::File::create(target)?;
            let writer = std::io::BufWriter::new(file);
            let encoder = image::codecs::jpeg::JpegEncoder::new_with_quality(writer, JPEG_QUALITY);
            // JPEG has no alpha channel
            img.to_rgb8()
                .write_with_encoder(encoder)
                .map_err(|e| VariantError::Encode {
                    path: target.to_path_buf(),
                    source: e,
                })
        }
        _ => img.save(target).map_err(|e| VariantError::Encode {
            path: target.to_path_buf(),
            source: e,
        }),
    }
}

/// Extract the EXIF capture timestamp from an image file, if present.
///
/// Prefers `DateTimeOriginal` over `DateTime`. Any read or parse problem
/// yields `None` — missing EXIF data is expected, not an error.
pub fn capture_date(path: &Path) -> Option<DateTime<Utc>> {
    let file = fs::File::open(path).ok()?;
    let mut reader = BufReader::new(file);
    let exif = exif::Reader::new().read_from_container(&mut reader).ok()?;

    [Tag::DateTimeOriginal, Tag::DateTime]
        .iter()
        .find_map(|&tag| {
            let field = exif.get_field(tag, In::PRIMARY)?;
            let exif::Value::Ascii(ref ascii) = field.value else {
                return None;
            };
            let datetime = exif::DateTime::from_ascii(ascii.first()?).ok()?;
            Utc.with_ymd_and_hms(
                i32::from(datetime.year),
                u32::from(datetime.month),
                u32::from(datetime.day),
                u32::from(datetime.hour),
                u32::from(datetime.minute),
                u32::from(datetime.second),
            )
            .single()
        })
}
