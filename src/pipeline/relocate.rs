//! Rebuild a scanned document as a clean image-only PDF and move it into place.
//!
//! Every rendered page becomes one JPEG XObject drawn full-page. The new
//! file is written to a temporary file beside the target and persisted
//! without clobbering; the source is removed only after that succeeds.

use std::io::{Cursor, Write};
use std::path::Path;

use image::ImageOutputFormat;
use lopdf::{dictionary, Document, Object, Stream};
use thiserror::Error;

use crate::pipeline::extraction::POINTS_PER_INCH;

#[derive(Error, Debug)]
pub enum RelocateError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("No pages to write")]
    NoPages,

    #[error("Page {page} image could not be converted: {reason}")]
    Image { page: usize, reason: String },

    #[error("PDF assembly failed: {0}")]
    Pdf(String),

    #[error("Target already exists: {0}")]
    TargetExists(std::path::PathBuf),
}

/// Assemble an image-only PDF from page PNGs rendered at `dpi`.
pub fn build_image_pdf(
    page_pngs: &[Vec<u8>],
    dpi: u32,
    jpeg_quality: u8,
) -> Result<Vec<u8>, RelocateError> {
    if page_pngs.is_empty() {
        return Err(RelocateError::NoPages);
    }

    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let mut kids = Vec::with_capacity(page_pngs.len());

    for (index, png) in page_pngs.iter().enumerate() {
        let (jpeg, width_px, height_px) = png_to_jpeg(png, jpeg_quality).map_err(|reason| {
            RelocateError::Image {
                page: index,
                reason,
            }
        })?;

        let mut image_stream = Stream::new(
            dictionary! {
                "Type" => Object::Name(b"XObject".to_vec()),
                "Subtype" => Object::Name(b"Image".to_vec()),
                "Width" => Object::Integer(width_px as i64),
                "Height" => Object::Integer(height_px as i64),
                "ColorSpace" => Object::Name(b"DeviceRGB".to_vec()),
                "BitsPerComponent" => Object::Integer(8),
                "Filter" => Object::Name(b"DCTDecode".to_vec()),
            },
            jpeg,
        );
        image_stream.allows_compression = false;
        let image_id = doc.add_object(Object::Stream(image_stream));

        let width_pt = to_points(width_px, dpi);
        let height_pt = to_points(height_px, dpi);

        let content = format!("q {width_pt} 0 0 {height_pt} 0 0 cm /Im0 Do Q");
        let content_id = doc.add_object(Object::Stream(Stream::new(
            dictionary! {},
            content.into_bytes(),
        )));

        let page_id = doc.add_object(dictionary! {
            "Type" => Object::Name(b"Page".to_vec()),
            "Parent" => Object::Reference(pages_id),
            "MediaBox" => vec![0.into(), 0.into(), width_pt.into(), height_pt.into()],
            "Contents" => Object::Reference(content_id),
            "Resources" => dictionary! {
                "XObject" => dictionary! {
                    "Im0" => Object::Reference(image_id),
                },
            },
        });
        kids.push(Object::Reference(page_id));
    }

    let count = kids.len() as i64;
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => Object::Name(b"Pages".to_vec()),
            "Kids" => kids,
            "Count" => Object::Integer(count),
        }),
    );

    let catalog_id = doc.add_object(dictionary! {
        "Type" => Object::Name(b"Catalog".to_vec()),
        "Pages" => Object::Reference(pages_id),
    });
    let producer = format!("{} {}", crate::config::APP_NAME, crate::config::APP_VERSION);
    let info_id = doc.add_object(dictionary! {
        "Producer" => Object::string_literal(producer),
    });
    doc.trailer.set("Root", Object::Reference(catalog_id));
    doc.trailer.set("Info", Object::Reference(info_id));

    let mut buf = Vec::new();
    doc.save_to(&mut buf)
        .map_err(|e| RelocateError::Pdf(e.to_string()))?;
    Ok(buf)
}

/// Pixels at `dpi` to whole PDF points, at least 1.
fn to_points(px: u32, dpi: u32) -> i64 {
    let points = (px as f32 * POINTS_PER_INCH / dpi.max(1) as f32).round() as i64;
    points.max(1)
}

fn png_to_jpeg(png: &[u8], quality: u8) -> Result<(Vec<u8>, u32, u32), String> {
    let decoded = image::load_from_memory(png).map_err(|e| e.to_string())?;
    let rgb = decoded.to_rgb8();
    let (width, height) = rgb.dimensions();
    let mut cursor = Cursor::new(Vec::new());
    image::DynamicImage::ImageRgb8(rgb)
        .write_to(&mut cursor, ImageOutputFormat::Jpeg(quality.clamp(1, 100)))
        .map_err(|e| e.to_string())?;
    Ok((cursor.into_inner(), width, height))
}

/// Write `pdf_bytes` to `target` and remove `source` afterwards.
///
/// On any failure before the persist the source is left untouched and no
/// partial target remains. A failure to delete the source after a
/// successful write is logged, not returned.
pub fn write_relocated(
    source: &Path,
    target: &Path,
    pdf_bytes: &[u8],
) -> Result<(), RelocateError> {
    let dir = target
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    std::fs::create_dir_all(dir)?;

    let mut tmp = tempfile::Builder::new()
        .prefix(".docsort-")
        .suffix(".pdf.part")
        .tempfile_in(dir)?;
    tmp.write_all(pdf_bytes)?;
    tmp.as_file().sync_all()?;

    tmp.persist_noclobber(target).map_err(|e| {
        if e.error.kind() == std::io::ErrorKind::AlreadyExists {
            RelocateError::TargetExists(target.to_path_buf())
        } else {
            RelocateError::Io(e.error)
        }
    })?;

    if source != target {
        if let Err(e) = std::fs::remove_file(source) {
            tracing::warn!(
                source = %source.display(),
                error = %e,
                "New file written but original could not be removed"
            );
        }
    }

    tracing::info!(
        source = %source.display(),
        target = %target.display(),
        bytes = pdf_bytes.len(),
        "Document relocated"
    );
    Ok(())
}
