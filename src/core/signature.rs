use crate::core::cancel::CancelToken;
use crate::core::error::Result;
use crate::core::image::Image;
use image::{DynamicImage, imageops};
use image_hasher::{HashAlg, Hasher, HasherConfig};
use rayon::prelude::*;

/// Fixed-length perceptual signature. Bits are packed LSB-first; padding
/// bits in the final byte are always zero.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Signature {
    bytes: Box<[u8]>,
    bits: usize,
}

impl Signature {
    /// Take the first `bits` bits of an LSB-first packed buffer. Missing
    /// bytes read as zero.
    pub fn from_packed(packed: &[u8], bits: usize) -> Self {
        let mut bytes = vec![0u8; bits.div_ceil(8)];
        let copied = packed.len().min(bytes.len());
        bytes[..copied].copy_from_slice(&packed[..copied]);
        if bits % 8 != 0 {
            if let Some(last) = bytes.last_mut() {
                *last &= (1u8 << (bits % 8)) - 1;
            }
        }
        Self {
            bytes: bytes.into_boxed_slice(),
            bits,
        }
    }

    pub fn from_bits<I: IntoIterator<Item = bool>>(bits: I) -> Self {
        let mut bytes = Vec::new();
        let mut len = 0;
        for bit in bits {
            if len % 8 == 0 {
                bytes.push(0u8);
            }
            if bit {
                bytes[len / 8] |= 1 << (len % 8);
            }
            len += 1;
        }
        Self {
            bytes: bytes.into_boxed_slice(),
            bits: len,
        }
    }

    pub fn len(&self) -> usize {
        self.bits
    }

    pub fn is_empty(&self) -> bool {
        self.bits == 0
    }

    pub fn bit(&self, index: usize) -> bool {
        debug_assert!(index < self.bits);
        (self.bytes[index / 8] >> (index % 8)) & 1 == 1
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }
}

/// Turns a raster into an `hash_size`×`hash_size` bit DCT perceptual hash.
///
/// Coefficients are compared against their median, so about half of the
/// bits are set whatever the image content.
pub struct SignatureComputer {
    hash_size: u32,
    hasher: Hasher,
}

impl SignatureComputer {
    pub fn new(hash_size: u32) -> Self {
        let hasher = HasherConfig::new()
            .hash_size(hash_size, hash_size)
            .hash_alg(HashAlg::Median)
            .preproc_dct()
            .resize_filter(imageops::FilterType::Lanczos3)
            .to_hasher();
        Self { hash_size, hasher }
    }

    pub fn hash_size(&self) -> u32 {
        self.hash_size
    }

    pub fn bits(&self) -> usize {
        (self.hash_size as usize) * (self.hash_size as usize)
    }

    pub fn compute(&self, image: &Image) -> Signature {
        // to_rgb8 zeroes non-finite channels before anything is resampled
        let small = imageops::resize(
            &image.to_rgb8(),
            self.hash_size,
            self.hash_size,
            imageops::FilterType::Triangle,
        );
        let gray = DynamicImage::ImageRgb8(small).to_luma8();
        let hash = self.hasher.hash_image(&DynamicImage::ImageLuma8(gray));
        Signature::from_packed(hash.as_bytes(), self.bits())
    }

    /// Signatures for a whole batch, in batch order.
    pub fn compute_batch(&self, images: &[Image], cancel: &CancelToken) -> Result<Vec<Signature>> {
        images
            .par_iter()
            .map(|image| -> Result<Signature> {
                cancel.check()?;
                Ok(self.compute(image))
            })
            .collect()
    }
}
