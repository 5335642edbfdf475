// ============================================================================
// Drawables: items that own a pixel buffer
// ============================================================================
//
// Geometry changes are computed as a new `BufferState` first and applied
// afterwards, so callers can capture the old state for undo in between.

use image::{GrayImage, Luma, Rgba};

use crate::canvas::{Interpolation, TiledImage};
use crate::geometry::{ClipResult, Matrix3, Orientation, Rect, Rotation};
use crate::item::{ItemBase, Positioned};

/// Fill for uncovered areas of layers without an alpha channel.
const OPAQUE_BACKGROUND: Rgba<u8> = Rgba([255, 255, 255, 255]);

/// Pixel storage: full color for layers, 8-bit coverage for channels and masks.
#[derive(Clone, Debug, PartialEq)]
pub enum PixelBuffer {
    Color(TiledImage),
    Mask(GrayImage),
}

impl PixelBuffer {
    pub fn new_color(width: i32, height: i32) -> Self {
        PixelBuffer::Color(TiledImage::new(width.max(1) as u32, height.max(1) as u32))
    }

    pub fn new_mask(width: i32, height: i32) -> Self {
        PixelBuffer::Mask(GrayImage::new(width.max(1) as u32, height.max(1) as u32))
    }

    pub fn width(&self) -> i32 {
        match self {
            PixelBuffer::Color(t) => t.width() as i32,
            PixelBuffer::Mask(g) => g.width() as i32,
        }
    }

    pub fn height(&self) -> i32 {
        match self {
            PixelBuffer::Color(t) => t.height() as i32,
            PixelBuffer::Mask(g) => g.height() as i32,
        }
    }

    pub fn is_mask(&self) -> bool {
        matches!(self, PixelBuffer::Mask(_))
    }

    pub fn as_color(&self) -> Option<&TiledImage> {
        match self {
            PixelBuffer::Color(t) => Some(t),
            PixelBuffer::Mask(_) => None,
        }
    }

    pub fn as_color_mut(&mut self) -> Option<&mut TiledImage> {
        match self {
            PixelBuffer::Color(t) => Some(t),
            PixelBuffer::Mask(_) => None,
        }
    }

    pub fn as_mask(&self) -> Option<&GrayImage> {
        match self {
            PixelBuffer::Mask(g) => Some(g),
            PixelBuffer::Color(_) => None,
        }
    }

    pub fn as_mask_mut(&mut self) -> Option<&mut GrayImage> {
        match self {
            PixelBuffer::Mask(g) => Some(g),
            PixelBuffer::Color(_) => None,
        }
    }

    /// Coverage at a local pixel: mask value, or alpha for color buffers.
    pub fn coverage(&self, x: i32, y: i32) -> u8 {
        if x < 0 || y < 0 || x >= self.width() || y >= self.height() {
            return 0;
        }
        match self {
            PixelBuffer::Color(t) => t.get_pixel(x as u32, y as u32)[3],
            PixelBuffer::Mask(g) => g.get_pixel(x as u32, y as u32)[0],
        }
    }

    pub fn memory_bytes(&self) -> usize {
        match self {
            PixelBuffer::Color(t) => t.memory_bytes(),
            PixelBuffer::Mask(g) => g.as_raw().len(),
        }
    }

    /// New `new_w × new_h` buffer with the content placed at `(dx, dy)`.
    fn shifted(&self, new_w: i32, new_h: i32, dx: i32, dy: i32) -> PixelBuffer {
        let (nw, nh) = (new_w.max(1) as u32, new_h.max(1) as u32);
        match self {
            PixelBuffer::Color(t) => PixelBuffer::Color(t.shifted(nw, nh, dx, dy)),
            PixelBuffer::Mask(g) => {
                let mut out = GrayImage::new(nw, nh);
                for (x, y, px) in g.enumerate_pixels() {
                    let (nx, ny) = (x as i32 + dx, y as i32 + dy);
                    if nx >= 0 && ny >= 0 && (nx as u32) < nw && (ny as u32) < nh {
                        out.put_pixel(nx as u32, ny as u32, *px);
                    }
                }
                PixelBuffer::Mask(out)
            }
        }
    }

    fn scaled(&self, new_w: i32, new_h: i32, interp: Interpolation) -> PixelBuffer {
        let (nw, nh) = (new_w.max(1) as u32, new_h.max(1) as u32);
        match self {
            PixelBuffer::Color(t) => PixelBuffer::Color(t.scaled(nw, nh, interp)),
            PixelBuffer::Mask(g) => PixelBuffer::Mask(image::imageops::resize(g, nw, nh, interp.to_filter())),
        }
    }

    fn flipped(&self, orientation: Orientation) -> PixelBuffer {
        match (self, orientation) {
            (PixelBuffer::Color(t), Orientation::Horizontal) => PixelBuffer::Color(t.flipped_horizontal()),
            (PixelBuffer::Color(t), Orientation::Vertical) => PixelBuffer::Color(t.flipped_vertical()),
            (PixelBuffer::Mask(g), Orientation::Horizontal) => PixelBuffer::Mask(image::imageops::flip_horizontal(g)),
            (PixelBuffer::Mask(g), Orientation::Vertical) => PixelBuffer::Mask(image::imageops::flip_vertical(g)),
        }
    }

    fn rotated(&self, rotation: Rotation) -> PixelBuffer {
        match (self, rotation) {
            (PixelBuffer::Color(t), Rotation::Cw90) => PixelBuffer::Color(t.rotated_90cw()),
            (PixelBuffer::Color(t), Rotation::Ccw90) => PixelBuffer::Color(t.rotated_90ccw()),
            (PixelBuffer::Color(t), Rotation::Rotate180) => PixelBuffer::Color(t.rotated_180()),
            (PixelBuffer::Mask(g), Rotation::Cw90) => PixelBuffer::Mask(image::imageops::rotate90(g)),
            (PixelBuffer::Mask(g), Rotation::Ccw90) => PixelBuffer::Mask(image::imageops::rotate270(g)),
            (PixelBuffer::Mask(g), Rotation::Rotate180) => PixelBuffer::Mask(image::imageops::rotate180(g)),
        }
    }

    /// Inverse-map every destination pixel of `dst` (image coordinates)
    /// through `inverse` into this buffer placed at `src_origin`.
    fn transformed(&self, src_origin: (i32, i32), inverse: &Matrix3, dst: Rect, interp: Interpolation) -> PixelBuffer {
        let mut out = match self {
            PixelBuffer::Color(_) => PixelBuffer::new_color(dst.width, dst.height),
            PixelBuffer::Mask(_) => PixelBuffer::new_mask(dst.width, dst.height),
        };
        for ly in 0..dst.height.max(0) {
            for lx in 0..dst.width.max(0) {
                let (sx, sy) = inverse.transform_point((dst.x + lx) as f64 + 0.5, (dst.y + ly) as f64 + 0.5);
                let (sx, sy) = (sx - src_origin.0 as f64 - 0.5, sy - src_origin.1 as f64 - 0.5);
                match (&mut out, self) {
                    (PixelBuffer::Color(o), PixelBuffer::Color(src)) => {
                        let px = if interp == Interpolation::None {
                            sample_color_nearest(src, sx, sy)
                        } else {
                            sample_color_bilinear(src, sx, sy)
                        };
                        o.put_pixel(lx as u32, ly as u32, px);
                    }
                    (PixelBuffer::Mask(o), PixelBuffer::Mask(_)) => {
                        let v = self.coverage(sx.round() as i32, sy.round() as i32);
                        o.put_pixel(lx as u32, ly as u32, Luma([v]));
                    }
                    _ => {}
                }
            }
        }
        out
    }
}

fn sample_color_nearest(src: &TiledImage, x: f64, y: f64) -> Rgba<u8> {
    let (xi, yi) = (x.round() as i64, y.round() as i64);
    if xi < 0 || yi < 0 {
        return Rgba([0, 0, 0, 0]);
    }
    *src.get_pixel(xi as u32, yi as u32)
}

/// Bilinear sample against a transparent background.
fn sample_color_bilinear(src: &TiledImage, x: f64, y: f64) -> Rgba<u8> {
    let x0 = x.floor();
    let y0 = y.floor();
    let fx = (x - x0) as f32;
    let fy = (y - y0) as f32;
    let fetch = |xi: f64, yi: f64| -> [f32; 4] {
        if xi < 0.0 || yi < 0.0 {
            return [0.0; 4];
        }
        let p = src.get_pixel(xi as u32, yi as u32);
        // Premultiply so transparent neighbours don't bleed colour
        let a = p[3] as f32 / 255.0;
        [p[0] as f32 * a, p[1] as f32 * a, p[2] as f32 * a, p[3] as f32]
    };
    let p00 = fetch(x0, y0);
    let p10 = fetch(x0 + 1.0, y0);
    let p01 = fetch(x0, y0 + 1.0);
    let p11 = fetch(x0 + 1.0, y0 + 1.0);
    let mut acc = [0.0f32; 4];
    for c in 0..4 {
        let top = p00[c] * (1.0 - fx) + p10[c] * fx;
        let bottom = p01[c] * (1.0 - fx) + p11[c] * fx;
        acc[c] = top * (1.0 - fy) + bottom * fy;
    }
    let a = acc[3];
    if a <= 0.0 {
        return Rgba([0, 0, 0, 0]);
    }
    let un = 255.0 / a;
    Rgba([
        (acc[0] * un).round().clamp(0.0, 255.0) as u8,
        (acc[1] * un).round().clamp(0.0, 255.0) as u8,
        (acc[2] * un).round().clamp(0.0, 255.0) as u8,
        a.round().clamp(0.0, 255.0) as u8,
    ])
}

/// Everything a geometry change replaces: the buffer and where it sits.
#[derive(Clone, Debug)]
pub struct BufferState {
    pub buffer: PixelBuffer,
    pub offset_x: i32,
    pub offset_y: i32,
    pub has_alpha: bool,
}

impl BufferState {
    pub fn bounds(&self) -> Rect {
        Rect::new(self.offset_x, self.offset_y, self.buffer.width(), self.buffer.height())
    }

    /// Re-fit into `bounds`, keeping absolute pixel positions.
    fn clipped_to(self, bounds: Rect) -> BufferState {
        let buffer = self.buffer.shifted(
            bounds.width,
            bounds.height,
            self.offset_x - bounds.x,
            self.offset_y - bounds.y,
        );
        BufferState { buffer, offset_x: bounds.x, offset_y: bounds.y, has_alpha: self.has_alpha }
    }
}

// ============================================================================
// DRAWABLE
// ============================================================================

#[derive(Clone, Debug)]
pub struct Drawable {
    pub(crate) item: ItemBase,
    buffer: PixelBuffer,
    has_alpha: bool,
}

impl Positioned for Drawable {
    fn base(&self) -> &ItemBase {
        &self.item
    }

    fn base_mut(&mut self) -> &mut ItemBase {
        &mut self.item
    }
}

impl Drawable {
    pub(crate) fn new(mut item: ItemBase, buffer: PixelBuffer, has_alpha: bool) -> Self {
        item.width = buffer.width();
        item.height = buffer.height();
        let has_alpha = has_alpha || buffer.is_mask();
        Self { item, buffer, has_alpha }
    }

    pub fn buffer(&self) -> &PixelBuffer {
        &self.buffer
    }

    /// Direct pixel access. Callers must not change the buffer size.
    pub(crate) fn buffer_mut(&mut self) -> &mut PixelBuffer {
        &mut self.buffer
    }

    pub fn has_alpha(&self) -> bool {
        self.has_alpha
    }

    pub fn is_mask(&self) -> bool {
        self.buffer.is_mask()
    }

    pub(crate) fn set_offset(&mut self, x: i32, y: i32) {
        self.item.offset_x = x;
        self.item.offset_y = y;
    }

    /// Snapshot of buffer and placement.
    pub fn state(&self) -> BufferState {
        BufferState {
            buffer: self.buffer.clone(),
            offset_x: self.item.offset_x,
            offset_y: self.item.offset_y,
            has_alpha: self.has_alpha,
        }
    }

    /// Install a new buffer wholesale. Width/height follow the buffer.
    pub(crate) fn apply_state(&mut self, state: BufferState) {
        self.item.width = state.buffer.width();
        self.item.height = state.buffer.height();
        self.item.offset_x = state.offset_x;
        self.item.offset_y = state.offset_y;
        self.has_alpha = state.has_alpha || state.buffer.is_mask();
        self.buffer = state.buffer;
    }

    /// Swap the current state with `state`, used by undo records.
    pub(crate) fn swap_state(&mut self, state: &mut BufferState) {
        let mut current = BufferState {
            buffer: std::mem::replace(&mut self.buffer, PixelBuffer::new_mask(1, 1)),
            offset_x: self.item.offset_x,
            offset_y: self.item.offset_y,
            has_alpha: self.has_alpha,
        };
        std::mem::swap(&mut current, state);
        self.apply_state(current);
    }

    /// Paint uncovered pixels of an alpha-less color buffer opaque.
    fn flatten_uncovered(&self, mut state: BufferState) -> BufferState {
        if !self.has_alpha {
            if let PixelBuffer::Color(t) = &mut state.buffer {
                for y in 0..t.height() {
                    for x in 0..t.width() {
                        if t.get_pixel(x, y)[3] == 0 {
                            t.put_pixel(x, y, OPAQUE_BACKGROUND);
                        }
                    }
                }
            }
        }
        state
    }

    // ---- geometry -----------------------------------------------------------

    /// Change the canvas of this drawable to `new_w × new_h` with its origin
    /// moved by `-(off_x, off_y)`; pixels keep their image position.
    pub fn resized(&self, new_w: i32, new_h: i32, off_x: i32, off_y: i32) -> BufferState {
        let state = BufferState {
            buffer: self.buffer.shifted(new_w, new_h, off_x, off_y),
            offset_x: self.item.offset_x - off_x,
            offset_y: self.item.offset_y - off_y,
            has_alpha: self.has_alpha,
        };
        self.flatten_uncovered(state)
    }

    pub fn scaled(&self, new_w: i32, new_h: i32, new_off_x: i32, new_off_y: i32, interp: Interpolation) -> BufferState {
        BufferState {
            buffer: self.buffer.scaled(new_w, new_h, interp),
            offset_x: new_off_x,
            offset_y: new_off_y,
            has_alpha: self.has_alpha,
        }
    }

    /// Mirror about the image-space line `axis`.
    pub fn flipped(&self, orientation: Orientation, axis: f64, clip: ClipResult) -> BufferState {
        let bounds = self.bounds();
        let (ox, oy) = match orientation {
            Orientation::Horizontal => ((2.0 * axis - bounds.x2() as f64).round() as i32, bounds.y),
            Orientation::Vertical => (bounds.x, (2.0 * axis - bounds.y2() as f64).round() as i32),
        };
        let state = BufferState {
            buffer: self.buffer.flipped(orientation),
            offset_x: ox,
            offset_y: oy,
            has_alpha: self.has_alpha,
        };
        match clip {
            ClipResult::Adjust => state,
            ClipResult::Clip => self.flatten_uncovered(state.clipped_to(bounds)),
        }
    }

    /// Rotate about the image-space point `(cx, cy)`.
    pub fn rotated(&self, rotation: Rotation, cx: f64, cy: f64, clip: ClipResult) -> BufferState {
        let bounds = self.bounds();
        let new_bounds = rotation.apply_rect(&bounds, cx, cy);
        let state = BufferState {
            buffer: self.buffer.rotated(rotation),
            offset_x: new_bounds.x,
            offset_y: new_bounds.y,
            has_alpha: self.has_alpha,
        };
        match clip {
            ClipResult::Adjust => state,
            ClipResult::Clip => self.flatten_uncovered(state.clipped_to(bounds)),
        }
    }

    /// Apply an image-space transform. Singular matrices leave the drawable as is.
    pub fn transformed(&self, matrix: &Matrix3, interp: Interpolation, clip: ClipResult) -> BufferState {
        let bounds = self.bounds();
        let Some(inverse) = matrix.invert() else {
            log::warn!("transform: singular matrix ignored for {}", self.item.id);
            return self.state();
        };
        let dst = match clip {
            ClipResult::Adjust => matrix.transform_rect(&bounds),
            ClipResult::Clip => bounds,
        };
        let buffer = self.buffer.transformed((bounds.x, bounds.y), &inverse, dst, interp);
        BufferState { buffer, offset_x: dst.x, offset_y: dst.y, has_alpha: self.has_alpha }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::item::{ImageId, ItemId};

    fn mask_drawable(w: i32, h: i32) -> Drawable {
        let item = ItemBase::new(ItemId(1), ImageId::new(), "m", w, h);
        Drawable::new(item, PixelBuffer::new_mask(w, h), true)
    }

    #[test]
    fn mask_buffers_always_carry_alpha() {
        let item = ItemBase::new(ItemId(1), ImageId::new(), "m", 3, 2);
        let d = Drawable::new(item, PixelBuffer::new_mask(3, 2), false);
        assert!(d.has_alpha());
        assert_eq!((d.buffer().width(), d.buffer().height()), (3, 2));
    }

    #[test]
    fn resize_moves_origin_but_keeps_pixels_in_place() {
        let mut d = mask_drawable(4, 4);
        d.buffer_mut().as_mask_mut().unwrap().put_pixel(1, 1, Luma([255]));
        let state = d.resized(6, 6, 2, 2);
        assert_eq!((state.offset_x, state.offset_y), (-2, -2));
        assert_eq!(state.buffer.coverage(3, 3), 255);
        d.apply_state(state);
        assert_eq!((d.width(), d.height()), (6, 6));
    }

    #[test]
    fn swap_state_exchanges() {
        let mut d = mask_drawable(2, 2);
        let mut other = d.resized(3, 3, 0, 0);
        d.swap_state(&mut other);
        assert_eq!(d.width(), 3);
        assert_eq!(other.buffer.width(), 2);
    }

    #[test]
    fn flip_about_axis_moves_offset() {
        let mut d = mask_drawable(4, 2);
        d.set_offset(2, 0);
        let state = d.flipped(Orientation::Horizontal, 10.0, ClipResult::Adjust);
        assert_eq!(state.offset_x, 14);
        assert_eq!(state.buffer.width(), 4);
    }

    #[test]
    fn identity_transform_keeps_content() {
        let mut d = mask_drawable(3, 3);
        d.buffer_mut().as_mask_mut().unwrap().put_pixel(2, 0, Luma([200]));
        let state = d.transformed(&Matrix3::identity(), Interpolation::None, ClipResult::Adjust);
        assert_eq!(state.bounds(), d.bounds());
        assert_eq!(state.buffer, *d.buffer());
    }
}
