//! Rolling weak checksum ("rsum") and its variable-width packing
//!
//! The checksum keeps two 16-bit accumulators over a window of `n` bytes:
//! - a = sum of all bytes
//! - b = n*byte[0] + (n-1)*byte[1] + ... + 1*byte[n-1]
//!
//! The packed 32-bit value is `(a << 16) | b`. Recipes store only the low
//! `width` bytes of that value, so lookups must mask the same way.

use crate::error::{Error, Result};

/// Smallest weak-sum width a recipe may use
pub const MIN_WEAK_WIDTH: usize = 2;

/// Largest weak-sum width a recipe may use
pub const MAX_WEAK_WIDTH: usize = 4;

/// Rolling checksum state for O(1) updates
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RollingChecksum {
    a: u16,
    b: u16,
    window_size: usize,
}

impl RollingChecksum {
    /// Compute the checksum of a full window directly
    pub fn new(window: &[u8]) -> Self {
        let mut a: u16 = 0;
        let mut b: u16 = 0;

        for &byte in window {
            a = a.wrapping_add(u16::from(byte));
            b = b.wrapping_add(a);
        }

        Self {
            a,
            b,
            window_size: window.len(),
        }
    }

    /// Get the current 32-bit checksum value
    #[inline]
    pub fn value(&self) -> u32 {
        (u32::from(self.a) << 16) | u32::from(self.b)
    }

    /// Size of the window this checksum covers
    pub fn window_size(&self) -> usize {
        self.window_size
    }

    /// Slide the window by one byte: `old_byte` leaves, `new_byte` enters
    #[inline]
    pub fn roll(&mut self, old_byte: u8, new_byte: u8) {
        let old = u16::from(old_byte);
        let new = u16::from(new_byte);

        self.a = self.a.wrapping_sub(old).wrapping_add(new);
        // b loses window_size copies of the old byte and gains the new a
        self.b = self
            .b
            .wrapping_sub((self.window_size as u16).wrapping_mul(old))
            .wrapping_add(self.a);
    }
}

/// Bit mask selecting the bytes a `width`-byte weak sum keeps
#[inline]
pub fn weak_mask(width: usize) -> u32 {
    match width {
        0 => 0,
        1..=3 => (1u32 << (8 * width)) - 1,
        _ => u32::MAX,
    }
}

/// Truncate a full checksum value to the key used for a `width`-byte recipe
#[inline]
pub fn truncate_weak(value: u32, width: usize) -> u32 {
    value & weak_mask(width)
}

/// Pack a checksum into `width` big-endian bytes (the trailing bytes of the
/// 4-byte encoding)
pub fn pack(value: u32, width: usize) -> Result<Vec<u8>> {
    check_width(width)?;
    Ok(value.to_be_bytes()[4 - width..].to_vec())
}

/// Inverse of [`pack`]: rebuild the truncated checksum value
pub fn unpack(bytes: &[u8]) -> Result<u32> {
    check_width(bytes.len())?;
    let mut full = [0u8; 4];
    full[4 - bytes.len()..].copy_from_slice(bytes);
    Ok(u32::from_be_bytes(full))
}

fn check_width(width: usize) -> Result<()> {
    if !(MIN_WEAK_WIDTH..=MAX_WEAK_WIDTH).contains(&width) {
        return Err(Error::recipe(format!(
            "weak checksum width {} outside {}..={}",
            width, MIN_WEAK_WIDTH, MAX_WEAK_WIDTH
        )));
    }
    Ok(())
}
