use image::{DynamicImage, GrayImage, ImageBuffer, Luma, Rgb, Rgb32FImage, RgbImage, imageops};
use std::path::{Path, PathBuf};

/// Side length every raster is normalized to at load time.
pub const RASTER_SIZE: u32 = 256;

/// One member of a batch: its ordinal, a fixed-size RGB raster and the
/// reference it was loaded from. Immutable once built.
#[derive(Debug, Clone)]
pub struct Image {
    id: usize,
    raster: Rgb32FImage,
    source: PathBuf,
}

impl Image {
    /// Build from any decoded image, resizing to `RASTER_SIZE`².
    pub fn from_dynamic(id: usize, image: &DynamicImage, source: impl Into<PathBuf>) -> Self {
        Self::from_raster(id, image.to_rgb32f(), source)
    }

    pub fn from_rgb8(id: usize, image: &RgbImage, source: impl Into<PathBuf>) -> Self {
        Self::from_dynamic(id, &DynamicImage::ImageRgb8(image.clone()), source)
    }

    /// Build from a float raster with channels in [0, 1]. Rasters that are
    /// already `RASTER_SIZE`² are kept as-is.
    pub fn from_raster(id: usize, raster: Rgb32FImage, source: impl Into<PathBuf>) -> Self {
        let raster = if raster.dimensions() == (RASTER_SIZE, RASTER_SIZE) {
            raster
        } else {
            imageops::resize(
                &raster,
                RASTER_SIZE,
                RASTER_SIZE,
                imageops::FilterType::CatmullRom,
            )
        };
        Self {
            id,
            raster,
            source: source.into(),
        }
    }

    pub fn id(&self) -> usize {
        self.id
    }

    pub fn raster(&self) -> &Rgb32FImage {
        &self.raster
    }

    pub fn source(&self) -> &Path {
        &self.source
    }

    /// 8-bit RGB copy of the raster. Non-finite channels become 0.
    pub fn to_rgb8(&self) -> RgbImage {
        ImageBuffer::from_fn(self.raster.width(), self.raster.height(), |x, y| {
            let Rgb([r, g, b]) = *self.raster.get_pixel(x, y);
            Rgb([quantize(r), quantize(g), quantize(b)])
        })
    }

    /// 8-bit luminance using BT.601 weights.
    pub fn to_luma8(&self) -> GrayImage {
        ImageBuffer::from_fn(self.raster.width(), self.raster.height(), |x, y| {
            let Rgb([r, g, b]) = *self.raster.get_pixel(x, y);
            let luma = 0.299 * sanitize(r) + 0.587 * sanitize(g) + 0.114 * sanitize(b);
            Luma([quantize(luma)])
        })
    }
}

fn sanitize(value: f32) -> f32 {
    if value.is_finite() { value } else { 0.0 }
}

fn quantize(value: f32) -> u8 {
    (sanitize(value).clamp(0.0, 1.0) * 255.0).round() as u8
}
