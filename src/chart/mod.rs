//! Line chart of buy/sell history with change points marked.
//!
//! Output depends only on the records and the renderer's dimensions, so the
//! PNG bytes are stable across runs.

pub mod text;

use crate::config::ChartConfig;
use crate::error::{WatchError, WatchResult};
use crate::models::PriceRecord;
use crate::utils::{VI_THOUSANDS, group_digits};
use image::{ImageFormat, Rgb, RgbImage};
use imageproc::drawing::{
    draw_filled_circle_mut, draw_filled_rect_mut, draw_hollow_rect_mut, draw_line_segment_mut,
};
use imageproc::rect::Rect;
use std::io::Cursor;

use self::text::{GLYPH, draw_text, text_width};

/// Half-span added on each side when every price in the window is equal.
pub const FLAT_SERIES_PADDING: i64 = 1_000_000;

const GRID_LINES: u32 = 5;
const LINE_HEIGHT: i32 = GLYPH + 2;

const BACKGROUND: Rgb<u8> = Rgb([0xff, 0xff, 0xff]);
const FRAME: Rgb<u8> = Rgb([0xcc, 0xcc, 0xcc]);
const GRID: Rgb<u8> = Rgb([0xee, 0xee, 0xee]);
const BUY: Rgb<u8> = Rgb([0x2e, 0xcc, 0x71]);
const SELL: Rgb<u8> = Rgb([0xe7, 0x4c, 0x3c]);
const GUIDE: Rgb<u8> = Rgb([0x95, 0xa5, 0xa6]);
const INK: Rgb<u8> = Rgb([0x33, 0x33, 0x33]);
const MUTED: Rgb<u8> = Rgb([0x99, 0x99, 0x99]);

// ── Series ────────────────────────────────────────────────────────────────────

/// Canonical buy and sell values, index-aligned with `history`.
pub fn parse_series(history: &[PriceRecord]) -> WatchResult<(Vec<i64>, Vec<i64>)> {
    let mut buys = Vec::with_capacity(history.len());
    let mut sells = Vec::with_capacity(history.len());

    for (index, rec) in history.iter().enumerate() {
        let buy = rec.buy_value().ok_or_else(|| WatchError::InvalidPriceData {
            index,
            value: rec.buy.clone(),
        })?;
        let sell = rec.sell_value().ok_or_else(|| WatchError::InvalidPriceData {
            index,
            value: rec.sell.clone(),
        })?;
        buys.push(buy);
        sells.push(sell);
    }

    Ok((buys, sells))
}

/// Indices `i >= 1` whose raw buy or sell token differs from record `i - 1`.
pub fn change_points(history: &[PriceRecord]) -> Vec<usize> {
    history
        .windows(2)
        .enumerate()
        .filter(|(_, pair)| !pair[1].same_price_as(&pair[0]))
        .map(|(i, _)| i + 1)
        .collect()
}

// ── Geometry ──────────────────────────────────────────────────────────────────

/// Value range of the y axis, never zero-width.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PriceScale {
    pub min: f64,
    pub max: f64,
}

impl PriceScale {
    pub fn covering(buys: &[i64], sells: &[i64]) -> Self {
        let all = buys.iter().chain(sells);
        let min = all.clone().copied().min().unwrap_or(0);
        let max = all.copied().max().unwrap_or(0);

        if min == max {
            // Widen in f64: the padding must not overflow near i64::MAX.
            let pad = FLAT_SERIES_PADDING as f64;
            Self { min: min as f64 - pad, max: max as f64 + pad }
        } else {
            Self { min: min as f64, max: max as f64 }
        }
    }
}

/// Maps record index and price onto raster coordinates inside the margins.
#[derive(Debug, Clone, Copy)]
pub struct PlotArea {
    pub left: f32,
    pub right: f32,
    pub top: f32,
    pub bottom: f32,
    pub scale: PriceScale,
}

impl PlotArea {
    pub fn new(width: u32, height: u32, margin: u32, scale: PriceScale) -> Self {
        Self {
            left: margin as f32,
            right: (width - margin) as f32,
            top: margin as f32,
            bottom: (height - margin) as f32,
            scale,
        }
    }

    /// `n` must be at least 2.
    pub fn x(&self, i: usize, n: usize) -> f32 {
        self.left + (i as f32 / (n - 1) as f32) * (self.right - self.left)
    }

    /// Higher prices sit closer to the top.
    pub fn y(&self, v: i64) -> f32 {
        let t = (v as f64 - self.scale.min) / (self.scale.max - self.scale.min);
        self.bottom - (t as f32) * (self.bottom - self.top)
    }
}

// ── Renderer ──────────────────────────────────────────────────────────────────

pub struct ChartRenderer {
    width: u32,
    height: u32,
    margin: u32,
    title: String,
}

impl Default for ChartRenderer {
    fn default() -> Self {
        Self::from_config(&ChartConfig::default())
    }
}

impl ChartRenderer {
    pub fn from_config(config: &ChartConfig) -> Self {
        Self {
            width: config.width,
            height: config.height,
            margin: config.margin,
            title: config.title.clone(),
        }
    }

    /// Render `history` as PNG bytes.
    pub fn render(&self, history: &[PriceRecord]) -> WatchResult<Vec<u8>> {
        let img = self.render_image(history)?;
        let mut buf = Cursor::new(Vec::new());
        img.write_to(&mut buf, ImageFormat::Png)?;
        Ok(buf.into_inner())
    }

    pub fn render_image(&self, history: &[PriceRecord]) -> WatchResult<RgbImage> {
        if history.len() < 2 {
            return Err(WatchError::InsufficientData { have: history.len() });
        }
        let (buys, sells) = parse_series(history)?;
        let plot = PlotArea::new(
            self.width,
            self.height,
            self.margin,
            PriceScale::covering(&buys, &sells),
        );

        let mut img = RgbImage::from_pixel(self.width, self.height, BACKGROUND);

        self.draw_grid(&mut img, &plot);
        draw_hollow_rect_mut(
            &mut img,
            Rect::at(plot.left as i32, plot.top as i32)
                .of_size(self.width - 2 * self.margin, self.height - 2 * self.margin),
            FRAME,
        );

        let changes = change_points(history);
        for &i in &changes {
            let x = plot.x(i, history.len());
            draw_line_segment_mut(&mut img, (x, plot.top), (x, plot.bottom), GUIDE);
        }

        draw_series(&mut img, &plot, &buys, BUY);
        draw_series(&mut img, &plot, &sells, SELL);

        for (ordinal, &i) in changes.iter().enumerate() {
            let x = plot.x(i, history.len());
            annotate(&mut img, &plot, ordinal, &history[i], x, buys[i], sells[i]);
        }

        self.draw_caption(&mut img, history.len());
        Ok(img)
    }

    fn draw_grid(&self, img: &mut RgbImage, plot: &PlotArea) {
        let span = plot.scale.max - plot.scale.min;
        for k in 1..GRID_LINES {
            let frac = k as f32 / GRID_LINES as f32;
            let y = plot.top + frac * (plot.bottom - plot.top);
            draw_line_segment_mut(img, (plot.left, y), (plot.right, y), GRID);

            let value = plot.scale.max - frac as f64 * span;
            draw_text(
                img,
                plot.left as i32 + 4,
                y as i32 - LINE_HEIGHT,
                &group_digits(value.round() as i64, VI_THOUSANDS),
                MUTED,
            );
        }
    }

    fn draw_caption(&self, img: &mut RgbImage, points: usize) {
        let baseline = (self.margin as i32 - GLYPH) / 2;
        let title = format!("{} ({} points)", self.title, points);
        draw_text(img, self.margin as i32, baseline, &title, INK);

        let legend_x = (self.width - self.margin) as i32 - text_width("BUY  SELL") - 24;
        for (offset, label, color) in [(0, "BUY", BUY), (text_width("BUY ") + 12, "SELL", SELL)] {
            let x = legend_x + offset;
            draw_filled_rect_mut(img, Rect::at(x, baseline).of_size(8, 8), color);
            draw_text(img, x + 12, baseline, label, INK);
        }
    }
}

/// Dots on both series plus a label block: time, then buy and sell. Blocks of
/// neighbouring change points are staggered over three rows.
fn annotate(
    img: &mut RgbImage,
    plot: &PlotArea,
    ordinal: usize,
    record: &PriceRecord,
    x: f32,
    buy: i64,
    sell: i64,
) {
    let cx = x.round() as i32;
    draw_filled_circle_mut(img, (cx, plot.y(buy).round() as i32), 4, BUY);
    draw_filled_circle_mut(img, (cx, plot.y(sell).round() as i32), 4, SELL);

    let lines = [
        (record.timestamp_local.clone(), INK),
        (format!("B {}", group_digits(buy, VI_THOUSANDS)), BUY),
        (format!("S {}", group_digits(sell, VI_THOUSANDS)), SELL),
    ];
    let block_w = lines.iter().map(|(s, _)| text_width(s)).max().unwrap_or(0);
    let block_h = LINE_HEIGHT * lines.len() as i32;

    let mut lx = cx + 4;
    if lx + block_w > plot.right as i32 {
        lx = cx - 4 - block_w;
    }
    let ly = plot.top as i32 + 4 + (ordinal % 3) as i32 * (block_h + 4);

    draw_filled_rect_mut(
        img,
        Rect::at(lx - 1, ly - 1).of_size(block_w as u32 + 2, block_h as u32 + 2),
        BACKGROUND,
    );
    for (row, (s, color)) in lines.iter().enumerate() {
        draw_text(img, lx, ly + row as i32 * LINE_HEIGHT, s, *color);
    }
}

/// Polyline through consecutive points, three pixels thick.
fn draw_series(img: &mut RgbImage, plot: &PlotArea, values: &[i64], color: Rgb<u8>) {
    let n = values.len();
    let points: Vec<(f32, f32)> = values
        .iter()
        .enumerate()
        .map(|(i, &v)| (plot.x(i, n), plot.y(v)))
        .collect();

    for seg in points.windows(2) {
        let ((x0, y0), (x1, y1)) = (seg[0], seg[1]);
        for (dx, dy) in [(0.0, 0.0), (0.0, -1.0), (0.0, 1.0), (-1.0, 0.0), (1.0, 0.0)] {
            draw_line_segment_mut(img, (x0 + dx, y0 + dy), (x1 + dx, y1 + dy), color);
        }
    }
}
