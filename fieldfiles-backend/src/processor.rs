//! Image resizing and re-encoding
//!

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use fieldfiles_shared::{AttachmentError, ImageStyle};
use image::imageops::FilterType;
use image::{DynamicImage, ImageFormat, ImageReader};
use tracing::debug;

/// Bounds and output encoding for one resize. A 0 bound is unbounded.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ResizeOptions {
    pub width: u32,
    pub height: u32,
    /// Output format extension, `None` keeps the source format
    pub format: Option<String>,
}

impl From<&ImageStyle> for ResizeOptions {
    fn from(style: &ImageStyle) -> Self {
        Self {
            width: style.width,
            height: style.height,
            format: match style.format.trim() {
                "" => None,
                format => Some(format.to_lowercase()),
            },
        }
    }
}

#[async_trait]
pub trait ImageProcessor: Send + Sync {
    /// Reads `source`, fits it within the bounds and writes it to `dest`.
    async fn resize(
        &self,
        source: &Path,
        dest: &Path,
        options: &ResizeOptions,
    ) -> Result<(), AttachmentError>;
}

/// [`ImageProcessor`] on top of the `image` crate. Never upscales.
#[derive(Clone, Copy, Debug)]
pub struct RasterProcessor {
    filter: FilterType,
}

impl Default for RasterProcessor {
    fn default() -> Self {
        Self {
            filter: FilterType::Lanczos3,
        }
    }
}

impl RasterProcessor {
    pub fn new(filter: FilterType) -> Self {
        Self { filter }
    }
}

#[async_trait]
impl ImageProcessor for RasterProcessor {
    async fn resize(
        &self,
        source: &Path,
        dest: &Path,
        options: &ResizeOptions,
    ) -> Result<(), AttachmentError> {
        let source = source.to_path_buf();
        let dest = dest.to_path_buf();
        let options = options.clone();
        let filter = self.filter;
        tokio::task::spawn_blocking(move || resize_blocking(source, dest, options, filter))
            .await
            .map_err(|err| AttachmentError::Processor(format!("resize task failed: {err}")))?
    }
}

/// Size that fits `(width, height)` inside the bounds, keeping the aspect ratio.
pub fn fit_within(width: u32, height: u32, max_width: u32, max_height: u32) -> (u32, u32) {
    let max_width = if max_width == 0 { width } else { max_width.min(width) };
    let max_height = if max_height == 0 { height } else { max_height.min(height) };
    if width == 0 || height == 0 || (width <= max_width && height <= max_height) {
        return (width, height);
    }

    let ratio = f64::min(
        max_width as f64 / width as f64,
        max_height as f64 / height as f64,
    );
    (
        ((width as f64 * ratio).round() as u32).max(1),
        ((height as f64 * ratio).round() as u32).max(1),
    )
}

fn processor_error(path: &Path, err: impl std::fmt::Display) -> AttachmentError {
    AttachmentError::Processor(format!("{}: {err}", path.display()))
}

fn resize_blocking(
    source: PathBuf,
    dest: PathBuf,
    options: ResizeOptions,
    filter: FilterType,
) -> Result<(), AttachmentError> {
    let reader = ImageReader::open(&source)
        .map_err(|err| processor_error(&source, err))?
        .with_guessed_format()
        .map_err(|err| processor_error(&source, err))?;
    let source_format = reader.format();
    let img = reader.decode().map_err(|err| processor_error(&source, err))?;

    let format = match options.format.as_deref() {
        Some(ext) => ImageFormat::from_extension(ext)
            .ok_or_else(|| AttachmentError::Processor(format!("unsupported output format {ext:?}")))?,
        None => source_format
            .ok_or_else(|| processor_error(&source, "unrecognised image format"))?,
    };

    let (width, height) = fit_within(img.width(), img.height(), options.width, options.height);
    let img = if (width, height) != (img.width(), img.height()) {
        debug!(
            from_width = img.width(),
            from_height = img.height(),
            width,
            height,
            "Resizing image"
        );
        img.resize_exact(width, height, filter)
    } else {
        img
    };

    // some encoders only take 8 bit rgb(a)
    let img = match format {
        ImageFormat::Jpeg => DynamicImage::ImageRgb8(img.to_rgb8()),
        ImageFormat::WebP => DynamicImage::ImageRgba8(img.to_rgba8()),
        _ => img,
    };

    img.save_with_format(&dest, format)
        .map_err(|err| processor_error(&dest, err))
}
