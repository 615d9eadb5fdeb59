//! 16-bit tile hash used by the GPU hash map.
//!
//! FNV-1a over the little-endian bytes of `(zoom: u32, x: u32, y: u32)`,
//! folded to 16 bits. The offset basis is seeded; the shader copy of this
//! function must use the same constants.

use crate::tile::Id;

pub const FNV_OFFSET_BASIS: u32 = 0x811c_9dc5;
pub const FNV_PRIME: u32 = 0x0100_0193;
pub const GPU_HASH_SEED: u32 = 3938;

#[inline]
fn fnv1a_word(mut h: u32, word: u32) -> u32 {
    for b in word.to_le_bytes() {
        h ^= u32::from(b);
        h = h.wrapping_mul(FNV_PRIME);
    }
    h
}

#[inline]
pub fn gpu_hash(id: &Id) -> u16 {
    let mut h = FNV_OFFSET_BASIS ^ GPU_HASH_SEED;
    h = fnv1a_word(h, id.zoom_level);
    h = fnv1a_word(h, id.coords.x);
    h = fnv1a_word(h, id.coords.y);
    ((h ^ (h >> 16)) & 0xffff) as u16
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tile::Scheme;

    #[test]
    fn known_colliding_pair() {
        let a = Id::new(11, 59333, 45444, Scheme::Tms);
        let b = Id::new(5, 20012, 35075, Scheme::Tms);
        assert_eq!(gpu_hash(&a), gpu_hash(&b));
        assert_eq!(gpu_hash(&a), 14789);
    }

    #[test]
    fn neighbours_differ() {
        let a = Id::new(1, 1, 1, Scheme::Tms);
        let b = Id::new(1, 2, 3, Scheme::Tms);
        assert_ne!(gpu_hash(&a), gpu_hash(&b));
    }
}
