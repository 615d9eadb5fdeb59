//! RGB8 elevation encoding: a uint24 in decimetres with a -1000 m datum.

#[inline]
pub fn decode_height_rgb(r: u8, g: u8, b: u8) -> f32 {
    let v = (u32::from(r) << 16) | (u32::from(g) << 8) | u32::from(b);
    v as f32 / 10.0 - 1000.0
}

/// Inverse of [`decode_height_rgb`], saturating outside the representable range.
#[inline]
pub fn encode_height_rgb(metres: f32) -> [u8; 3] {
    let v = ((metres + 1000.0) * 10.0).round().clamp(0.0, 16_777_215.0) as u32;
    [(v >> 16) as u8, (v >> 8) as u8, v as u8]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_reference_values() {
        assert_eq!(decode_height_rgb(0, 0, 0), -1000.0);
        // 3798.4 m, Grossglockner summit
        let [r, g, b] = encode_height_rgb(3798.4);
        assert!((decode_height_rgb(r, g, b) - 3798.4).abs() < 0.05);
        assert_eq!(encode_height_rgb(-5000.0), [0, 0, 0]);
    }
}
