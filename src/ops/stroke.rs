// ============================================================================
// STROKE: paint outlines into a drawable
// ============================================================================

use image::Rgba;

use crate::canvas::{LayerMode, blend_pixel, luminance};
use crate::drawable::PixelBuffer;
use crate::error::EngineError;
use crate::geometry::BoundSeg;
use crate::image::Image;
use crate::item::{DrawableRef, Positioned};
use crate::ops;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StrokeOptions {
    pub color: Rgba<u8>,
    /// Square brush edge length in pixels.
    pub width: u32,
}

impl Default for StrokeOptions {
    fn default() -> Self {
        Self { color: Rgba([0, 0, 0, 255]), width: 1 }
    }
}

/// Pixels covered by a line from `(x0, y0)` to `(x1, y1)`, endpoints included.
fn line_pixels(x0: i32, y0: i32, x1: i32, y1: i32) -> Vec<(i32, i32)> {
    let (dx, dy) = ((x1 - x0).abs(), -(y1 - y0).abs());
    let (sx, sy) = (if x0 < x1 { 1 } else { -1 }, if y0 < y1 { 1 } else { -1 });
    let (mut x, mut y, mut err) = (x0, y0, dx + dy);
    let mut out = Vec::with_capacity((dx - dy + 1) as usize);
    loop {
        out.push((x, y));
        if x == x1 && y == y1 {
            break;
        }
        let e2 = 2 * err;
        if e2 >= dy {
            err += dy;
            x += sx;
        }
        if e2 <= dx {
            err += dx;
            y += sy;
        }
    }
    out
}

/// Paint `segs` (image coordinates) into `target` with a square brush. Paint
/// is masked by the selection unless the selection reports empty.
pub fn stroke_segments(
    image: &mut Image,
    target: DrawableRef,
    segs: &[BoundSeg],
    options: &StrokeOptions,
    description: &str,
) -> Result<(), EngineError> {
    let use_selection = !image.selection_mut().is_empty();
    let lock_alpha = match target {
        DrawableRef::Layer(id) => image.layer(id).is_some_and(|l| l.lock_alpha()),
        _ => false,
    };
    let d = image.drawable(target).ok_or(EngineError::NotAttached)?;
    let (ox, oy) = d.offset();
    let mut state = d.state();
    let selection = image.selection();
    let (w, h) = (state.buffer.width(), state.buffer.height());

    let half = (options.width.max(1) as i32 - 1) / 2;
    let extent = options.width.max(1) as i32;
    let mut touched = vec![false; (w.max(0) * h.max(0)) as usize];
    for seg in segs {
        for (px, py) in line_pixels(seg.x1, seg.y1, seg.x2, seg.y2) {
            for by in 0..extent {
                for bx in 0..extent {
                    let (ix, iy) = (px - half + bx, py - half + by);
                    let (lx, ly) = (ix - ox, iy - oy);
                    if lx < 0 || ly < 0 || lx >= w || ly >= h {
                        continue;
                    }
                    // Each pixel takes paint once per stroke
                    let slot = (ly * w + lx) as usize;
                    if touched[slot] {
                        continue;
                    }
                    touched[slot] = true;

                    let amount = if use_selection { selection.value(ix, iy) as f32 / 255.0 } else { 1.0 };
                    if amount <= 0.0 {
                        continue;
                    }
                    match &mut state.buffer {
                        PixelBuffer::Color(t) => {
                            let base = *t.get_pixel(lx as u32, ly as u32);
                            let mut out = blend_pixel(base, options.color, LayerMode::Normal, amount);
                            if lock_alpha || !state.has_alpha {
                                out[3] = base[3];
                            }
                            t.put_pixel(lx as u32, ly as u32, out);
                        }
                        PixelBuffer::Mask(m) => {
                            let px = m.get_pixel_mut(lx as u32, ly as u32);
                            let a = amount * options.color[3] as f32 / 255.0;
                            let v = px[0] as f32 * (1.0 - a) + luminance(options.color) as f32 * a;
                            px[0] = v.round().clamp(0.0, 255.0) as u8;
                        }
                    }
                }
            }
        }
    }

    ops::item::replace_state(image, target, state, true, description);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::ChannelOp;
    use crate::geometry::Rect;

    #[test]
    fn lines_include_both_ends() {
        assert_eq!(line_pixels(0, 0, 3, 0), vec![(0, 0), (1, 0), (2, 0), (3, 0)]);
        assert_eq!(line_pixels(2, 2, 2, 0), vec![(2, 2), (2, 1), (2, 0)]);
        assert_eq!(line_pixels(1, 1, 1, 1), vec![(1, 1)]);
    }

    #[test]
    fn selection_masks_paint() {
        let mut image = Image::new(6, 6);
        let layer = image.new_layer(6, 6, "L", true);
        let id = image.add_layer(layer, None, false);
        ops::selection::select_rect(&mut image, Rect::new(0, 0, 3, 6), ChannelOp::Replace, false);
        let seg = BoundSeg { x1: 0, y1: 2, x2: 5, y2: 2, open: true };
        stroke_segments(&mut image, DrawableRef::Layer(id), &[seg], &StrokeOptions::default(), "Stroke").unwrap();
        let buffer = image.layer(id).unwrap().drawable.buffer();
        assert_eq!(buffer.coverage(1, 2), 255);
        assert_eq!(buffer.coverage(4, 2), 0);
    }

    #[test]
    fn wide_brush_paints_channels() {
        let mut image = Image::new(6, 6);
        let channel = image.new_channel("Alpha", Rgba([0, 0, 0, 128]));
        let id = image.add_channel(channel, None, false);
        let seg = BoundSeg { x1: 3, y1: 0, x2: 3, y2: 5, open: true };
        let options = StrokeOptions { color: Rgba([255, 255, 255, 255]), width: 3 };
        stroke_segments(&mut image, DrawableRef::Channel(id), &[seg], &options, "Stroke").unwrap();
        let channel = image.channel(id).unwrap();
        assert_eq!(channel.value(2, 3), 255);
        assert_eq!(channel.value(4, 3), 255);
        assert_eq!(channel.value(0, 3), 0);
    }
}
