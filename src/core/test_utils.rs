//! Synthetic rasters shared by the unit tests.

use crate::core::image::{Image, RASTER_SIZE};
use image::{ImageBuffer, Rgb, RgbImage};

fn mix(mut h: u32) -> u32 {
    h ^= h >> 16;
    h = h.wrapping_mul(0x7feb_352d);
    h ^= h >> 15;
    h = h.wrapping_mul(0x846c_a68b);
    h ^= h >> 16;
    h
}

fn cell(seed: u32, x: u32, y: u32) -> u32 {
    mix(mix(seed.wrapping_mul(0x9e37_79b1)) ^ mix(x.wrapping_add(mix(y))) ^ y) & 0xff
}

/// Blocky gray texture with per-pixel grain; distinct seeds give unrelated
/// images.
pub fn textured_rgb(seed: u32) -> RgbImage {
    ImageBuffer::from_fn(RASTER_SIZE, RASTER_SIZE, |x, y| {
        let block = cell(seed, x / 16, y / 16);
        let grain = cell(seed ^ 0x5bd1_e995, x, y);
        let value = ((block + grain) / 2) as u8;
        Rgb([value, value, value])
    })
}

pub fn flat_rgb(color: [u8; 3]) -> RgbImage {
    RgbImage::from_pixel(RASTER_SIZE, RASTER_SIZE, Rgb(color))
}

pub fn textured_image(id: usize, seed: u32) -> Image {
    Image::from_rgb8(id, &textured_rgb(seed), format!("img_{id}.png"))
}
