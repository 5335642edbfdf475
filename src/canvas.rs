use std::sync::Arc;

use image::{Rgba, RgbaImage, imageops};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::geometry::Rect;

// ============================================================================
// TILED IMAGE: sparse chunked RGBA storage for layer pixels
// ============================================================================

pub const CHUNK_SIZE: u32 = 64;

/// Largest pixel count a single buffer may hold.
const MAX_PIXELS: u64 = 256_000_000;

/// A pixel with zero alpha, returned by reference for missing chunks.
static TRANSPARENT_PIXEL: Rgba<u8> = Rgba([0, 0, 0, 0]);

/// Sparse tiled image backed by a flat `Vec<Option<Arc<RgbaImage>>>`.
///
/// Chunk coordinates map to a flat index via `cy * chunks_per_row + cx`.
/// Chunks are `Arc`-wrapped so cloning a buffer for an undo record only
/// bumps reference counts; writes go through `Arc::make_mut` and copy just
/// the touched chunk.
#[derive(Clone)]
pub struct TiledImage {
    width: u32,
    height: u32,
    chunks_per_row: u32,
    chunks: Vec<Option<Arc<RgbaImage>>>,
}

impl std::fmt::Debug for TiledImage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TiledImage")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("chunks", &self.chunk_count())
            .finish()
    }
}

impl PartialEq for TiledImage {
    fn eq(&self, other: &Self) -> bool {
        if self.width != other.width || self.height != other.height {
            return false;
        }
        (0..self.height).all(|y| (0..self.width).all(|x| self.get_pixel(x, y) == other.get_pixel(x, y)))
    }
}

impl TiledImage {
    // ---- construction -------------------------------------------------------

    /// Create an empty (fully transparent) tiled image.
    ///
    /// Sizes above `MAX_PIXELS` are kept but logged; only touched chunks are
    /// ever allocated.
    pub fn new(width: u32, height: u32) -> Self {
        if (width as u64) * (height as u64) > MAX_PIXELS {
            log::warn!("TiledImage::new: {}×{} exceeds {} pixels", width, height, MAX_PIXELS);
        }
        let chunks_per_row = width.div_ceil(CHUNK_SIZE);
        let chunks_per_col = height.div_ceil(CHUNK_SIZE);
        Self {
            width,
            height,
            chunks_per_row,
            chunks: vec![None; (chunks_per_row * chunks_per_col) as usize],
        }
    }

    /// Import from a flat `RgbaImage`. Only non-transparent chunks are stored;
    /// chunk conversion runs on the rayon pool.
    pub fn from_rgba_image(src: &RgbaImage) -> Self {
        let (width, height) = src.dimensions();
        let mut img = Self::new(width, height);

        let chunks_x = img.chunks_per_row as usize;
        let total_chunks = img.chunks.len();
        let src_raw = src.as_raw();

        let converted: Vec<(usize, Option<Arc<RgbaImage>>)> = (0..total_chunks)
            .into_par_iter()
            .map(|flat| {
                let base_x = (flat % chunks_x) as u32 * CHUNK_SIZE;
                let base_y = (flat / chunks_x) as u32 * CHUNK_SIZE;
                let cw = CHUNK_SIZE.min(width - base_x) as usize;
                let ch = CHUNK_SIZE.min(height - base_y);
                let stride = CHUNK_SIZE as usize * 4;
                let mut data = vec![0u8; stride * CHUNK_SIZE as usize];
                let mut has_content = false;

                for ly in 0..ch {
                    let src_start = ((base_y + ly) * width + base_x) as usize * 4;
                    let dst_start = ly as usize * stride;
                    let row = &src_raw[src_start..src_start + cw * 4];
                    data[dst_start..dst_start + cw * 4].copy_from_slice(row);
                    has_content |= row.chunks_exact(4).any(|px| px[3] != 0);
                }

                let chunk = if has_content {
                    RgbaImage::from_raw(CHUNK_SIZE, CHUNK_SIZE, data).map(Arc::new)
                } else {
                    None
                };
                (flat, chunk)
            })
            .collect();

        for (idx, chunk) in converted {
            img.chunks[idx] = chunk;
        }
        img
    }

    /// Flatten back to a contiguous `RgbaImage`.
    pub fn to_rgba_image(&self) -> RgbaImage {
        let mut out = RgbaImage::new(self.width, self.height);
        let out_stride = self.width as usize * 4;
        let out_raw: &mut [u8] = &mut out;
        for (cx, cy) in self.chunk_keys() {
            let Some(chunk) = self.get_chunk(cx, cy) else { continue };
            let base_x = cx * CHUNK_SIZE;
            let base_y = cy * CHUNK_SIZE;
            let cw = CHUNK_SIZE.min(self.width - base_x) as usize;
            let ch = CHUNK_SIZE.min(self.height - base_y) as usize;
            let chunk_stride = CHUNK_SIZE as usize * 4;
            for ly in 0..ch {
                let src = &chunk.as_raw()[ly * chunk_stride..ly * chunk_stride + cw * 4];
                let dst_start = (base_y as usize + ly) * out_stride + base_x as usize * 4;
                out_raw[dst_start..dst_start + cw * 4].copy_from_slice(src);
            }
        }
        out
    }

    // ---- geometry -----------------------------------------------------------

    /// Move every stored pixel through `map` into a new `new_w × new_h` image.
    /// Only populated chunks are visited, so sparse layers stay cheap.
    fn remapped<F>(&self, new_w: u32, new_h: u32, map: F) -> TiledImage
    where
        F: Fn(u32, u32) -> Option<(u32, u32)>,
    {
        let mut dst = TiledImage::new(new_w, new_h);
        for (cx, cy) in self.chunk_keys() {
            let Some(chunk) = self.get_chunk(cx, cy) else { continue };
            let base_x = cx * CHUNK_SIZE;
            let base_y = cy * CHUNK_SIZE;
            let cw = CHUNK_SIZE.min(self.width - base_x);
            let ch = CHUNK_SIZE.min(self.height - base_y);
            for ly in 0..ch {
                for lx in 0..cw {
                    let px = *chunk.get_pixel(lx, ly);
                    if px[3] == 0 {
                        continue;
                    }
                    if let Some((dx, dy)) = map(base_x + lx, base_y + ly) {
                        dst.put_pixel(dx, dy, px);
                    }
                }
            }
        }
        dst
    }

    pub fn flipped_horizontal(&self) -> TiledImage {
        let w = self.width;
        self.remapped(w, self.height, |x, y| Some((w - 1 - x, y)))
    }

    pub fn flipped_vertical(&self) -> TiledImage {
        let h = self.height;
        self.remapped(self.width, h, |x, y| Some((x, h - 1 - y)))
    }

    /// Rotate 90° clockwise (W×H → H×W).
    pub fn rotated_90cw(&self) -> TiledImage {
        let h = self.height;
        self.remapped(h, self.width, |x, y| Some((h - 1 - y, x)))
    }

    /// Rotate 90° counter-clockwise (W×H → H×W).
    pub fn rotated_90ccw(&self) -> TiledImage {
        let w = self.width;
        self.remapped(self.height, w, |x, y| Some((y, w - 1 - x)))
    }

    pub fn rotated_180(&self) -> TiledImage {
        let (w, h) = (self.width, self.height);
        self.remapped(w, h, |x, y| Some((w - 1 - x, h - 1 - y)))
    }

    /// New `new_w × new_h` image with this one's content placed at
    /// `(dst_x, dst_y)`. Content falling outside is dropped.
    pub fn shifted(&self, new_w: u32, new_h: u32, dst_x: i32, dst_y: i32) -> TiledImage {
        self.remapped(new_w, new_h, |x, y| {
            let nx = x as i32 + dst_x;
            let ny = y as i32 + dst_y;
            if nx < 0 || ny < 0 || nx as u32 >= new_w || ny as u32 >= new_h {
                None
            } else {
                Some((nx as u32, ny as u32))
            }
        })
    }

    /// Resample to a new size with the given filter.
    pub fn scaled(&self, new_w: u32, new_h: u32, interp: Interpolation) -> TiledImage {
        if new_w == self.width && new_h == self.height {
            return self.clone();
        }
        let flat = self.to_rgba_image();
        TiledImage::from_rgba_image(&imageops::resize(&flat, new_w.max(1), new_h.max(1), interp.to_filter()))
    }

    // ---- pixel access -------------------------------------------------------

    #[inline]
    fn flat_index(&self, cx: u32, cy: u32) -> usize {
        (cy * self.chunks_per_row + cx) as usize
    }

    /// Read a pixel (returns transparent for missing chunks or out of range).
    #[inline]
    pub fn get_pixel(&self, x: u32, y: u32) -> &Rgba<u8> {
        if x >= self.width || y >= self.height {
            return &TRANSPARENT_PIXEL;
        }
        let idx = self.flat_index(x / CHUNK_SIZE, y / CHUNK_SIZE);
        self.chunks[idx]
            .as_ref()
            .map(|c| c.get_pixel(x % CHUNK_SIZE, y % CHUNK_SIZE))
            .unwrap_or(&TRANSPARENT_PIXEL)
    }

    /// Write a pixel (creates the chunk on demand, COW-clones if shared).
    #[inline]
    pub fn put_pixel(&mut self, x: u32, y: u32, pixel: Rgba<u8>) {
        if x >= self.width || y >= self.height {
            return;
        }
        let idx = self.flat_index(x / CHUNK_SIZE, y / CHUNK_SIZE);
        if pixel[3] == 0 && self.chunks[idx].is_none() {
            return;
        }
        let arc = self.chunks[idx].get_or_insert_with(|| Arc::new(RgbaImage::new(CHUNK_SIZE, CHUNK_SIZE)));
        Arc::make_mut(arc).put_pixel(x % CHUNK_SIZE, y % CHUNK_SIZE, pixel);
    }

    /// Read-only access to a chunk (if it exists).
    pub fn get_chunk(&self, cx: u32, cy: u32) -> Option<&RgbaImage> {
        let idx = self.flat_index(cx, cy);
        self.chunks.get(idx).and_then(|c| c.as_deref())
    }

    /// Iterator over populated chunk coordinates.
    pub fn chunk_keys(&self) -> impl Iterator<Item = (u32, u32)> + '_ {
        let cpr = self.chunks_per_row;
        self.chunks
            .iter()
            .enumerate()
            .filter(|(_, slot)| slot.is_some())
            .map(move |(i, _)| ((i as u32) % cpr, (i as u32) / cpr))
    }

    pub fn chunk_count(&self) -> usize {
        self.chunks.iter().filter(|c| c.is_some()).count()
    }

    // ---- bulk operations ----------------------------------------------------

    /// Fill every pixel with `color`.
    pub fn fill(&mut self, color: Rgba<u8>) {
        if color[3] == 0 {
            self.clear();
            return;
        }
        let tile = Arc::new(RgbaImage::from_pixel(CHUNK_SIZE, CHUNK_SIZE, color));
        for slot in &mut self.chunks {
            *slot = Some(Arc::clone(&tile));
        }
    }

    /// Drop all chunks (make the image fully transparent).
    pub fn clear(&mut self) {
        for slot in &mut self.chunks {
            *slot = None;
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// Approximate memory usage in bytes. Chunks shared with another buffer
    /// (an undo record, a duplicate) only count their pointer.
    pub fn memory_bytes(&self) -> usize {
        let chunk_bytes = (CHUNK_SIZE * CHUNK_SIZE * 4) as usize;
        self.chunks
            .iter()
            .flatten()
            .map(|arc| if Arc::strong_count(arc) == 1 { chunk_bytes } else { std::mem::size_of::<usize>() * 2 })
            .sum()
    }

    /// Bounding rectangle of all pixels with non-zero alpha.
    pub fn content_bounds(&self) -> Option<Rect> {
        let mut bounds: Option<Rect> = None;
        for y in 0..self.height {
            for x in 0..self.width {
                if self.get_pixel(x, y)[3] != 0 {
                    let px = Rect::new(x as i32, y as i32, 1, 1);
                    bounds = Some(bounds.map_or(px, |b| b.union(&px)));
                }
            }
        }
        bounds
    }
}

// ============================================================================
// INTERPOLATION
// ============================================================================

#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Interpolation {
    None,
    #[default]
    Linear,
    Cubic,
    Lanczos,
}

impl Interpolation {
    pub fn to_filter(&self) -> imageops::FilterType {
        match self {
            Interpolation::None => imageops::FilterType::Nearest,
            Interpolation::Linear => imageops::FilterType::Triangle,
            Interpolation::Cubic => imageops::FilterType::CatmullRom,
            Interpolation::Lanczos => imageops::FilterType::Lanczos3,
        }
    }
}

// ============================================================================
// LAYER MODES
// ============================================================================

#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum LayerMode {
    #[default]
    Normal,
    Multiply,
    Screen,
    Overlay,
    Difference,
    Addition,
    Subtract,
    DarkenOnly,
    LightenOnly,
    Divide,
    Dodge,
    Burn,
    HardLight,
    SoftLight,
    GrainExtract,
    GrainMerge,
}

impl LayerMode {
    fn channel(&self, base: f32, top: f32) -> f32 {
        match self {
            LayerMode::Normal => top,
            LayerMode::Multiply => base * top,
            LayerMode::Screen => 1.0 - (1.0 - base) * (1.0 - top),
            LayerMode::Overlay => overlay(base, top),
            LayerMode::Difference => (base - top).abs(),
            LayerMode::Addition => (base + top).min(1.0),
            LayerMode::Subtract => (base - top).max(0.0),
            LayerMode::DarkenOnly => base.min(top),
            LayerMode::LightenOnly => base.max(top),
            LayerMode::Divide => if top <= 0.0 { 1.0 } else { (base / top).min(1.0) },
            LayerMode::Dodge => if top >= 1.0 { 1.0 } else { (base / (1.0 - top)).min(1.0) },
            LayerMode::Burn => if top <= 0.0 { 0.0 } else { (1.0 - (1.0 - base) / top).max(0.0) },
            LayerMode::HardLight => overlay(top, base),
            LayerMode::SoftLight => {
                let screen = 1.0 - (1.0 - base) * (1.0 - top);
                (1.0 - base) * base * top + base * screen
            }
            LayerMode::GrainExtract => (base - top + 0.5).clamp(0.0, 1.0),
            LayerMode::GrainMerge => (base + top - 0.5).clamp(0.0, 1.0),
        }
    }
}

fn overlay(base: f32, top: f32) -> f32 {
    if base < 0.5 {
        2.0 * base * top
    } else {
        1.0 - 2.0 * (1.0 - base) * (1.0 - top)
    }
}

/// Composite `top` over `base` with the given mode and opacity (0..1).
pub fn blend_pixel(base: Rgba<u8>, top: Rgba<u8>, mode: LayerMode, opacity: f32) -> Rgba<u8> {
    // Fully transparent top pixel: nothing to blend
    if top[3] == 0 || opacity <= 0.0 {
        return base;
    }
    if mode == LayerMode::Normal && opacity >= 1.0 && top[3] == 255 {
        return top;
    }

    let opacity = opacity.clamp(0.0, 1.0);
    let norm = |v: u8| v as f32 / 255.0;
    let base_a = norm(base[3]);
    let top_a = norm(top[3]) * opacity;

    let out_a = top_a + base_a * (1.0 - top_a);
    if out_a <= 0.0 {
        return Rgba([0, 0, 0, 0]);
    }

    let mut out = [0u8; 4];
    for c in 0..3 {
        let b = norm(base[c]);
        let t = norm(top[c]);
        // Against transparent backdrop the mode has nothing to act on
        let mixed = if base_a > 0.0 { mode.channel(b, t) } else { t };
        let v = (mixed * top_a + b * base_a * (1.0 - top_a)) / out_a;
        out[c] = (v * 255.0).round().clamp(0.0, 255.0) as u8;
    }
    out[3] = (out_a * 255.0).round().clamp(0.0, 255.0) as u8;
    Rgba(out)
}

/// Rec. 601 luma, the weighting used when color turns into mask values.
pub fn luminance(px: Rgba<u8>) -> u8 {
    (0.299 * px[0] as f32 + 0.587 * px[1] as f32 + 0.114 * px[2] as f32).round().clamp(0.0, 255.0) as u8
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sparse_until_written() {
        let mut img = TiledImage::new(130, 70);
        assert_eq!(img.chunk_count(), 0);
        img.put_pixel(129, 69, Rgba([1, 2, 3, 255]));
        assert_eq!(img.chunk_count(), 1);
        assert_eq!(*img.get_pixel(129, 69), Rgba([1, 2, 3, 255]));
        assert_eq!(*img.get_pixel(500, 0), Rgba([0, 0, 0, 0]));
    }

    #[test]
    fn oversized_images_keep_their_size() {
        let img = TiledImage::new(20_000, 20_000);
        assert_eq!((img.width(), img.height()), (20_000, 20_000));
        assert_eq!(img.chunk_count(), 0);
    }

    #[test]
    fn rgba_round_trip_keeps_pixels() {
        let mut flat = RgbaImage::new(70, 3);
        flat.put_pixel(65, 2, Rgba([9, 8, 7, 200]));
        let tiled = TiledImage::from_rgba_image(&flat);
        assert_eq!(tiled.to_rgba_image(), flat);
    }

    #[test]
    fn rotation_maps_corners() {
        let mut img = TiledImage::new(4, 2);
        img.put_pixel(0, 0, Rgba([255, 0, 0, 255]));
        let cw = img.rotated_90cw();
        assert_eq!((cw.width(), cw.height()), (2, 4));
        assert_eq!(cw.get_pixel(1, 0)[3], 255);
        let ccw = img.rotated_90ccw();
        assert_eq!(ccw.get_pixel(0, 3)[3], 255);
        assert_eq!(img.rotated_180().get_pixel(3, 1)[3], 255);
        assert_eq!(img.flipped_horizontal().get_pixel(3, 0)[3], 255);
        assert_eq!(img.flipped_vertical().get_pixel(0, 1)[3], 255);
    }

    #[test]
    fn shifted_drops_outside_content() {
        let mut img = TiledImage::new(4, 4);
        img.put_pixel(0, 0, Rgba([1, 1, 1, 255]));
        img.put_pixel(3, 3, Rgba([2, 2, 2, 255]));
        let moved = img.shifted(4, 4, 2, 2);
        assert_eq!(moved.get_pixel(2, 2)[0], 1);
        assert_eq!(moved.chunk_count(), 1);
        assert_eq!(moved.content_bounds(), Some(Rect::new(2, 2, 1, 1)));
    }

    #[test]
    fn blend_normal_and_multiply() {
        let base = Rgba([200, 100, 50, 255]);
        assert_eq!(blend_pixel(base, Rgba([10, 20, 30, 255]), LayerMode::Normal, 1.0), Rgba([10, 20, 30, 255]));
        assert_eq!(blend_pixel(base, Rgba([10, 20, 30, 0]), LayerMode::Multiply, 1.0), base);
        let white = Rgba([255, 255, 255, 255]);
        assert_eq!(blend_pixel(base, white, LayerMode::Multiply, 1.0), base);
    }
}
