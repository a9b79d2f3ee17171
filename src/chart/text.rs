use font8x8::{BASIC_FONTS, LATIN_FONTS, UnicodeFonts};
use image::{Rgb, RgbImage};

pub const GLYPH: i32 = 8;

/// Pixel width of `text` when drawn with [`draw_text`].
pub fn text_width(text: &str) -> i32 {
    text.chars().count() as i32 * GLYPH
}

/// Draw `text` with its top-left corner at (`x`, `y`) using the 8×8 bitmap
/// font. Characters without a glyph leave a blank cell. Pixels outside the
/// image are clipped.
pub fn draw_text(img: &mut RgbImage, x: i32, y: i32, text: &str, color: Rgb<u8>) {
    let (w, h) = (img.width() as i32, img.height() as i32);

    for (i, ch) in text.chars().enumerate() {
        let Some(glyph) = BASIC_FONTS.get(ch).or_else(|| LATIN_FONTS.get(ch)) else {
            continue;
        };
        let x0 = x + i as i32 * GLYPH;

        for (row, bits) in glyph.iter().enumerate() {
            for col in 0..8i32 {
                if bits & (1u8 << col) == 0 {
                    continue;
                }
                let (px, py) = (x0 + col, y + row as i32);
                if (0..w).contains(&px) && (0..h).contains(&py) {
                    img.put_pixel(px as u32, py as u32, color);
                }
            }
        }
    }
}
