//! Contact sheets: every sampled frame as a captioned thumbnail on one canvas.
//!
//! Tiles are laid out row-major. Each row is as tall as its tallest tile and
//! every column is as wide as the widest tile of the first row, so frames with
//! mixed aspect ratios still line up.

use anyhow::Result;
use font8x8::{UnicodeFonts, BASIC_FONTS};
use image::imageops::{self, FilterType};
use image::{Rgb, RgbImage};
use serde::Serialize;

use crate::encode::EncodedImage;
use crate::frame::Frame;

pub const DEFAULT_MAX_COLUMNS: u32 = 4;
pub const DEFAULT_THUMBNAIL_WIDTH: u32 = 320;

const BACKGROUND: Rgb<u8> = Rgb([18, 18, 20]);
const CAPTION_BAR_HEIGHT: u32 = 22;
const CAPTION_BAR_ALPHA: u32 = 180;
const CAPTION_COLOR: Rgb<u8> = Rgb([255, 255, 255]);
const CAPTION_LEFT: i64 = 6;
const CAPTION_FROM_BOTTOM: i64 = 20;
const GLYPH_SIZE: i64 = 8;
const GLYPH_SCALE: i64 = 2;

/// A composed contact sheet. Immutable once built.
#[derive(Clone, Debug, Serialize)]
pub struct ContactSheet {
    #[serde(flatten)]
    pub image: EncodedImage,
    pub tiles: usize,
    pub columns: u32,
    pub rows: u32,
    pub tile_width: u32,
    pub row_heights: Vec<u32>,
    pub captions: Vec<String>,
}

#[derive(Clone, Copy, Debug)]
pub struct ContactSheetBuilder {
    max_columns: u32,
    thumbnail_width: u32,
}

impl Default for ContactSheetBuilder {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_COLUMNS, DEFAULT_THUMBNAIL_WIDTH)
    }
}

impl ContactSheetBuilder {
    /// Both settings are raised to at least 1.
    pub fn new(max_columns: u32, thumbnail_width: u32) -> Self {
        Self {
            max_columns: max_columns.max(1),
            thumbnail_width: thumbnail_width.max(1),
        }
    }

    pub fn max_columns(&self) -> u32 {
        self.max_columns
    }

    pub fn thumbnail_width(&self) -> u32 {
        self.thumbnail_width
    }

    /// Compose `frames` into one PNG. `Ok(None)` when there is nothing to tile.
    pub fn build(&self, frames: &[Frame]) -> Result<Option<ContactSheet>> {
        if frames.is_empty() {
            return Ok(None);
        }

        let tiles: Vec<RgbImage> = frames.iter().map(|f| self.tile(f)).collect();
        let captions: Vec<String> = frames.iter().map(Frame::caption).collect();

        let columns = self.max_columns.min(tiles.len() as u32);
        let rows = (tiles.len() as u32).div_ceil(columns);
        let pitch = tiles
            .iter()
            .take(columns as usize)
            .map(RgbImage::width)
            .max()
            .unwrap_or(self.thumbnail_width);
        let row_heights: Vec<u32> = tiles
            .chunks(columns as usize)
            .map(|row| row.iter().map(RgbImage::height).max().unwrap_or(1))
            .collect();

        let canvas_height: u32 = row_heights.iter().sum();
        let mut canvas = RgbImage::from_pixel(pitch * columns, canvas_height, BACKGROUND);

        let mut y = 0i64;
        for (row, row_tiles) in tiles.chunks(columns as usize).enumerate() {
            for (col, tile) in row_tiles.iter().enumerate() {
                imageops::replace(&mut canvas, tile, col as i64 * pitch as i64, y);
            }
            y += row_heights[row] as i64;
        }

        log::debug!(
            "contact sheet {}x{} ({} tiles, {}x{} grid)",
            canvas.width(),
            canvas.height(),
            tiles.len(),
            columns,
            rows
        );

        Ok(Some(ContactSheet {
            image: EncodedImage::encode(&canvas)?,
            tiles: tiles.len(),
            columns,
            rows,
            tile_width: pitch,
            row_heights,
            captions,
        }))
    }

    fn tile(&self, frame: &Frame) -> RgbImage {
        let width = self.thumbnail_width;
        let height = thumbnail_height(frame.width(), frame.height(), width);
        let mut tile = imageops::resize(frame.image(), width, height, FilterType::Triangle);
        burn_caption(&mut tile, &frame.caption());
        tile
    }
}

/// `round(width * h / w)`, never below 1.
pub fn thumbnail_height(frame_width: u32, frame_height: u32, width: u32) -> u32 {
    if frame_width == 0 {
        return 1;
    }
    let scaled = (width as f64 * frame_height as f64 / frame_width as f64).round();
    (scaled as u32).max(1)
}

fn burn_caption(tile: &mut RgbImage, text: &str) {
    let (w, h) = tile.dimensions();
    let bar_top = h.saturating_sub(CAPTION_BAR_HEIGHT);
    let keep = 255 - CAPTION_BAR_ALPHA;
    for y in bar_top..h {
        for x in 0..w {
            let px = tile.get_pixel_mut(x, y);
            for c in px.0.iter_mut() {
                *c = ((*c as u32 * keep + 127) / 255) as u8;
            }
        }
    }

    let origin_y = h as i64 - CAPTION_FROM_BOTTOM;
    let advance = GLYPH_SIZE * GLYPH_SCALE;
    for (i, ch) in text.chars().enumerate() {
        let Some(glyph) = BASIC_FONTS.get(ch) else {
            continue;
        };
        draw_glyph(tile, &glyph, CAPTION_LEFT + i as i64 * advance, origin_y);
    }
}

fn draw_glyph(tile: &mut RgbImage, glyph: &[u8; 8], left: i64, top: i64) {
    let (w, h) = (tile.width() as i64, tile.height() as i64);
    for (row, bits) in glyph.iter().enumerate() {
        for col in 0..GLYPH_SIZE {
            if bits & (1 << col) == 0 {
                continue;
            }
            for dy in 0..GLYPH_SCALE {
                for dx in 0..GLYPH_SCALE {
                    let x = left + col * GLYPH_SCALE + dx;
                    let y = top + row as i64 * GLYPH_SCALE + dy;
                    if (0..w).contains(&x) && (0..h).contains(&y) {
                        tile.put_pixel(x as u32, y as u32, CAPTION_COLOR);
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frames(n: u64, w: u32, h: u32) -> Vec<Frame> {
        (0..n)
            .map(|i| {
                let image = RgbImage::from_pixel(w, h, Rgb([200, 120, (i * 20) as u8]));
                Frame::new(image, i * 25, i as f64)
            })
            .collect()
    }

    #[test]
    fn empty_input_is_none() {
        assert!(ContactSheetBuilder::default().build(&[]).unwrap().is_none());
    }

    #[test]
    fn grid_shape_follows_tile_count() {
        let builder = ContactSheetBuilder::new(4, 32);
        for (n, columns, rows) in [(1, 1, 1), (3, 3, 1), (4, 4, 1), (5, 4, 2), (9, 4, 3)] {
            let sheet = builder.build(&frames(n, 64, 48)).unwrap().unwrap();
            assert_eq!(sheet.tiles, n as usize);
            assert_eq!(sheet.columns, columns);
            assert_eq!(sheet.rows, rows);
            assert_eq!(sheet.image.width, 32 * columns);
            assert_eq!(sheet.image.height, 24 * rows);
            assert_eq!(sheet.captions.len(), n as usize);
        }
    }

    #[test]
    fn captions_use_index_and_timestamp() {
        let sheet = ContactSheetBuilder::new(2, 64)
            .build(&frames(2, 64, 64))
            .unwrap()
            .unwrap();
        assert_eq!(sheet.captions, vec!["Frame 0 - 0.0s", "Frame 25 - 1.0s"]);
    }

    #[test]
    fn caption_bar_darkens_tile_bottom() {
        let sheet = ContactSheetBuilder::new(1, 200)
            .build(&frames(1, 200, 100))
            .unwrap()
            .unwrap();
        let canvas = sheet.image.decode().unwrap();
        let top = canvas.get_pixel(150, 10);
        let bar = canvas.get_pixel(199, 99);
        assert_eq!(top.0[0], 200);
        assert!(bar.0[0] < 70, "bar pixel {:?}", bar);
        let has_text = (80..96).any(|y| (6..100).any(|x| *canvas.get_pixel(x, y) == CAPTION_COLOR));
        assert!(has_text);
    }

    #[test]
    fn mixed_aspect_rows_use_tallest_tile() {
        let mut input = frames(1, 100, 100);
        input.extend(frames(1, 100, 50));
        let sheet = ContactSheetBuilder::new(1, 40).build(&input).unwrap().unwrap();
        assert_eq!(sheet.row_heights, vec![40, 20]);
        assert_eq!(sheet.image.height, 60);
    }

    #[test]
    fn settings_below_one_are_raised() {
        let builder = ContactSheetBuilder::new(0, 0);
        assert_eq!(builder.max_columns(), 1);
        assert_eq!(builder.thumbnail_width(), 1);
        assert_eq!(thumbnail_height(1000, 1, 10), 1);
        assert_eq!(thumbnail_height(640, 480, 320), 240);
    }
}
