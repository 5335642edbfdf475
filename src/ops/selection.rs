// ============================================================================
// SELECTION: outline, load/save, extract, float, clear
// ============================================================================

use image::{GrayImage, Luma, Rgba};

use crate::canvas::TiledImage;
use crate::channel::ChannelOp;
use crate::drawable::{BufferState, PixelBuffer};
use crate::error::{EngineError, RegionAction};
use crate::event::ImageEvent;
use crate::geometry::{BoundSeg, Rect};
use crate::history::UndoKind;
use crate::image::Image;
use crate::item::{DrawableRef, ItemId, Positioned};
use crate::layer::MaskApplyMode;
use crate::ops;
use crate::ops::stroke::StrokeOptions;

// ============================================================================
// OUTLINE
// ============================================================================

/// Marching-ants outline as `(inner, outer)` segments in image coordinates.
///
/// With a floating selection the inner outline is the floating layer's shape.
/// Otherwise it is clipped to the image for an active channel, or to the
/// active layer's extent.
pub fn boundary(image: &mut Image) -> (Vec<BoundSeg>, Vec<BoundSeg>) {
    let image_rect = image.bounds();
    if let Some(fs) = image.floating_selection() {
        let (_, outer) = image.selection.channel.boundary(Rect::default());
        let inner = ops::floating_sel::boundary(image, fs);
        return (inner, outer);
    }
    match image.active_drawable() {
        Some(active) if active.is_channel_like() => image.selection.channel.boundary(image_rect),
        _ => match image.active_layer().and_then(|id| image.layer(id)) {
            Some(layer) => {
                let b = layer.bounds();
                let clamp_x = |v: i32| v.clamp(0, image_rect.width);
                let clamp_y = |v: i32| v.clamp(0, image_rect.height);
                let clip = Rect::from_corners(clamp_x(b.x), clamp_y(b.y), clamp_x(b.x2()), clamp_y(b.y2()));
                image.selection.channel.boundary(clip)
            }
            None => (Vec::new(), Vec::new()),
        },
    }
}

/// Drop cached outlines of the selection and any floating selection.
pub fn invalidate_boundary(image: &mut Image) {
    image.selection.channel.invalidate_boundary();
    if let Some(fs) = image.floating_selection() {
        ops::floating_sel::invalidate(image, fs);
    }
    image.emit(ImageEvent::SelectionInvalidated);
}

/// Empty as far as painting is concerned; always true while stroking.
pub fn is_empty(image: &mut Image) -> bool {
    image.selection.is_empty()
}

/// Bounding box of everything selected, `None` when nothing is.
pub fn bounds(image: &mut Image) -> Option<Rect> {
    image.selection.channel.content_bounds()
}

/// Selection bounds clamped to `target`, in its local coordinates. `None`
/// when nothing is selected; the rectangle may be degenerate.
pub fn mask_bounds(image: &mut Image, target: DrawableRef) -> Option<Rect> {
    if target == DrawableRef::Selection {
        return None;
    }
    let sel = image.selection.channel.content_bounds()?;
    let d = image.drawable(target)?;
    let (ox, oy) = d.offset();
    let (w, h) = (d.width(), d.height());
    let cx = |v: i32| (v - ox).clamp(0, w);
    let cy = |v: i32| (v - oy).clamp(0, h);
    Some(Rect::from_corners(cx(sel.x), cy(sel.y), cx(sel.x2()), cy(sel.y2())))
}

// ============================================================================
// STROKE
// ============================================================================

/// Paint the selection outline into `target`.
pub fn stroke(image: &mut Image, target: DrawableRef, options: &StrokeOptions) -> Result<(), EngineError> {
    if image.selection.channel.is_empty() {
        log::warn!("stroke: {}", EngineError::NoSelectionToStroke);
        return Err(EngineError::NoSelectionToStroke);
    }
    let image_rect = image.bounds();
    let (_, segs) = image.selection.channel.boundary(image_rect);

    image.selection.push_stroking();
    let result = ops::stroke::stroke_segments(image, target, &segs, options, "Stroke Selection");
    image.selection.pop_stroking();
    result
}

// ============================================================================
// SELECT
// ============================================================================

pub fn select_rect(image: &mut Image, rect: Rect, op: ChannelOp, push_undo: bool) {
    ops::channel::combine_rect(image, DrawableRef::Selection, rect, op, push_undo);
}

pub fn clear(image: &mut Image, push_undo: bool) {
    ops::channel::clear(image, DrawableRef::Selection, push_undo);
}

pub fn all(image: &mut Image, push_undo: bool) {
    ops::channel::all(image, DrawableRef::Selection, push_undo);
}

pub fn invert(image: &mut Image, push_undo: bool) {
    ops::channel::invert(image, DrawableRef::Selection, push_undo);
}

/// Replace the selection with the content of a canvas-sized channel.
pub fn load(image: &mut Image, source: DrawableRef, push_undo: bool) {
    debug_assert!(source.is_channel_like() && source != DrawableRef::Selection, "load needs a channel");
    let (w, h) = (image.width(), image.height());
    let Some(src) = image.drawable(source) else { return };
    debug_assert_eq!((src.width(), src.height()), (w, h), "channel to selection needs a canvas-sized channel");
    let src = src.buffer();
    let mut mask = GrayImage::new(w.max(1) as u32, h.max(1) as u32);
    for (x, y, px) in mask.enumerate_pixels_mut() {
        *px = Luma([src.coverage(x as i32, y as i32)]);
    }
    let state = BufferState { buffer: PixelBuffer::Mask(mask), offset_x: 0, offset_y: 0, has_alpha: true };
    ops::item::replace_state(image, DrawableRef::Selection, state, push_undo, "Channel to Selection");
}

/// Store the selection as a new hidden channel and return its id.
pub fn save(image: &mut Image) -> Option<ItemId> {
    let mut channel = ops::channel::duplicate(image, DrawableRef::Selection, "Selection Mask copy")?;
    channel.drawable.item.visible = false;
    Some(image.add_channel(channel, None, true))
}

// ============================================================================
// EXTRACT / FLOAT / CLEAR
// ============================================================================

/// Copy the selected part of `target` into a free-standing buffer placed in
/// image coordinates. With `cut`, the source loses those pixels; without a
/// selection the whole item is taken and, when cutting, removed.
pub fn extract(image: &mut Image, target: DrawableRef, cut: bool, add_alpha: bool) -> Result<BufferState, EngineError> {
    debug_assert!(target != DrawableRef::Selection, "extracting from the selection itself");
    let selected = mask_bounds(image, target);
    let Some(d) = image.drawable(target) else { return Err(EngineError::NotAttached) };
    let (ox, oy) = d.offset();
    let region = match selected {
        Some(r) if r.is_empty() => {
            log::warn!("extract: {}", RegionAction::CutOrCopy);
            return Err(EngineError::EmptyRegion(RegionAction::CutOrCopy));
        }
        Some(r) => r,
        None => Rect::new(0, 0, d.width(), d.height()),
    };
    let use_selection = selected.is_some();
    let add_alpha = add_alpha || use_selection;
    let selection = image.selection();
    let sel = |x: i32, y: i32| if use_selection { selection.value(x + ox, y + oy) as u32 } else { 255 };

    let (w, h) = (region.width as u32, region.height as u32);
    let buffer = match d.buffer() {
        PixelBuffer::Color(src) => {
            let mut out = TiledImage::new(w, h);
            for y in 0..h {
                for x in 0..w {
                    let (sx, sy) = (region.x + x as i32, region.y + y as i32);
                    let mut px = *src.get_pixel(sx as u32, sy as u32);
                    px[3] = ((px[3] as u32 * sel(sx, sy) + 127) / 255) as u8;
                    if px[3] != 0 {
                        out.put_pixel(x, y, px);
                    }
                }
            }
            PixelBuffer::Color(out)
        }
        PixelBuffer::Mask(src) if add_alpha => {
            let mut out = TiledImage::new(w, h);
            for y in 0..h {
                for x in 0..w {
                    let (sx, sy) = (region.x + x as i32, region.y + y as i32);
                    let v = src.get_pixel(sx as u32, sy as u32)[0];
                    let a = sel(sx, sy) as u8;
                    if a != 0 {
                        out.put_pixel(x, y, Rgba([v, v, v, a]));
                    }
                }
            }
            PixelBuffer::Color(out)
        }
        PixelBuffer::Mask(src) => PixelBuffer::Mask(image::imageops::crop_imm(src, region.x as u32, region.y as u32, w, h).to_image()),
    };
    let has_alpha = d.has_alpha() || add_alpha;
    let state = BufferState { buffer, offset_x: region.x + ox, offset_y: region.y + oy, has_alpha };

    if cut {
        if use_selection {
            edit_clear(image, target, true);
        } else {
            match target {
                DrawableRef::Layer(id) => image.remove_layer(id, true),
                DrawableRef::LayerMask(id) => ops::layer::apply_mask(image, id, MaskApplyMode::Discard, true),
                DrawableRef::Channel(id) => image.remove_channel(id, true),
                DrawableRef::Selection => {}
            }
        }
    }
    Ok(state)
}

/// Cut or copy the selection out of `target` into a new floating layer,
/// displaced by `(dx, dy)`.
pub fn float(image: &mut Image, target: DrawableRef, cut: bool, dx: i32, dy: i32) -> Result<ItemId, EngineError> {
    debug_assert!(image.is_attached(target), "float: {:?} not attached", target);
    match mask_bounds(image, target) {
        Some(r) if !r.is_empty() => {}
        _ => {
            log::warn!("float: {}", RegionAction::Float);
            return Err(EngineError::EmptyRegion(RegionAction::Float));
        }
    }

    image.history.begin_group(UndoKind::FsFloat, "Float Selection");
    let mut state = match extract(image, target, cut, true) {
        Ok(state) => state,
        Err(err) => {
            image.history.end_group();
            return Err(err);
        }
    };
    clear(image, true);

    state.offset_x += dx;
    state.offset_y += dy;
    let mut layer = image.new_layer(state.buffer.width(), state.buffer.height(), "Floated Layer", true);
    layer.drawable.apply_state(state);
    let id = ops::floating_sel::attach(image, layer, target);
    image.history.end_group();

    image.selection.channel.invalidate_boundary();
    log::info!("floated selection from {:?} as layer {}", target, id);
    Ok(id)
}

/// Erase the selected pixels of `target`, or all of it without a selection.
/// Layers without alpha, or with locked alpha, fall back to white.
pub fn edit_clear(image: &mut Image, target: DrawableRef, push_undo: bool) {
    let use_selection = !image.selection.is_empty();
    let lock_alpha = match target {
        DrawableRef::Layer(id) => image.layer(id).is_some_and(|l| l.lock_alpha()),
        _ => false,
    };
    let Some(d) = image.drawable(target) else { return };
    let (ox, oy) = d.offset();
    let mut state = d.state();
    let selection = image.selection();
    let amount = |x: i32, y: i32| if use_selection { selection.value(x + ox, y + oy) as u32 } else { 255 };
    let erase = state.has_alpha && !lock_alpha;

    match &mut state.buffer {
        PixelBuffer::Color(t) => {
            for y in 0..t.height() {
                for x in 0..t.width() {
                    let a = amount(x as i32, y as i32);
                    if a == 0 {
                        continue;
                    }
                    let px = *t.get_pixel(x, y);
                    let out = if erase {
                        let mut out = px;
                        out[3] = ((px[3] as u32 * (255 - a) + 127) / 255) as u8;
                        out
                    } else {
                        let mut white = Rgba([255, 255, 255, px[3]]);
                        for c in 0..3 {
                            white[c] = ((px[c] as u32 * (255 - a) + 255 * a + 127) / 255) as u8;
                        }
                        white
                    };
                    t.put_pixel(x, y, out);
                }
            }
        }
        PixelBuffer::Mask(m) => {
            for (x, y, px) in m.enumerate_pixels_mut() {
                let a = amount(x as i32, y as i32);
                px[0] = ((px[0] as u32 * (255 - a) + 127) / 255) as u8;
            }
        }
    }
    ops::item::replace_state(image, target, state, push_undo, "Clear");
}

/// Cut the selection out of `target` as one undo step.
pub fn cut(image: &mut Image, target: DrawableRef) -> Result<BufferState, EngineError> {
    image.history.begin_group(UndoKind::EditCut, "Cut");
    let result = extract(image, target, true, true);
    image.history.end_group();
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::item::Nameable;

    fn image_with_layer() -> (Image, ItemId) {
        let mut image = Image::new(10, 10);
        let mut layer = image.new_layer(10, 10, "L", true);
        if let Some(t) = layer.drawable.buffer_mut().as_color_mut() {
            t.fill(Rgba([0, 0, 255, 255]));
        }
        let id = image.add_layer(layer, None, false);
        (image, id)
    }

    #[test]
    fn stroking_hides_the_selection() {
        let (mut image, _) = image_with_layer();
        select_rect(&mut image, Rect::new(2, 2, 4, 4), ChannelOp::Replace, false);
        assert!(!is_empty(&mut image));
        image.selection_mut().push_stroking();
        assert!(is_empty(&mut image));
        image.selection_mut().pop_stroking();
        assert!(!is_empty(&mut image));
    }

    #[test]
    fn stroke_needs_a_selection() {
        let (mut image, id) = image_with_layer();
        let result = stroke(&mut image, DrawableRef::Layer(id), &StrokeOptions::default());
        assert_eq!(result, Err(EngineError::NoSelectionToStroke));
        assert_eq!(image.selection().stroking_count(), 0);
    }

    #[test]
    fn stroke_paints_outline_and_balances_counter() {
        let (mut image, id) = image_with_layer();
        select_rect(&mut image, Rect::new(2, 2, 4, 4), ChannelOp::Replace, false);
        let options = StrokeOptions { color: Rgba([255, 0, 0, 255]), width: 1 };
        stroke(&mut image, DrawableRef::Layer(id), &options).unwrap();
        assert_eq!(image.selection().stroking_count(), 0);
        let t = image.layer(id).unwrap().drawable.buffer().as_color().unwrap();
        assert_eq!(*t.get_pixel(2, 2), Rgba([255, 0, 0, 255]));
        assert_eq!(*t.get_pixel(4, 4), Rgba([0, 0, 255, 255]));
        assert_eq!(image.history().undo_description().as_deref(), Some("Stroke Selection"));
    }

    #[test]
    fn outline_follows_active_layer_extent() {
        let mut image = Image::new(10, 10);
        let layer = image.new_layer(4, 10, "Strip", true);
        let id = image.add_layer(layer, None, false);
        ops::item::translate(&mut image, DrawableRef::Layer(id), 8, 0, false);
        all(&mut image, false);
        let (inner, outer) = boundary(&mut image);
        let inner_bounds = crate::geometry::segments_bounds(&inner).unwrap();
        assert!(inner_bounds.x >= 8);
        assert_eq!(crate::geometry::segments_bounds(&outer), Some(Rect::new(0, 0, 10, 10)));
    }

    #[test]
    fn outline_tracks_floating_layer() {
        let (mut image, id) = image_with_layer();
        select_rect(&mut image, Rect::new(1, 1, 3, 3), ChannelOp::Replace, false);
        let fs = float(&mut image, DrawableRef::Layer(id), false, 5, 5).unwrap();
        select_rect(&mut image, Rect::new(0, 0, 2, 2), ChannelOp::Replace, false);
        let (inner, outer) = boundary(&mut image);
        assert_eq!(crate::geometry::segments_bounds(&inner), Some(image.layer(fs).unwrap().bounds()));
        assert_eq!(crate::geometry::segments_bounds(&outer), Some(Rect::new(0, 0, 2, 2)));
    }

    #[test]
    fn extract_without_selection_takes_everything() {
        let (mut image, id) = image_with_layer();
        ops::item::translate(&mut image, DrawableRef::Layer(id), 3, 1, false);
        let state = extract(&mut image, DrawableRef::Layer(id), false, false).unwrap();
        assert_eq!(state.bounds(), Rect::new(3, 1, 10, 10));
        assert!(image.layer(id).is_some());
    }

    #[test]
    fn cut_without_selection_removes_the_item() {
        let (mut image, id) = image_with_layer();
        cut(&mut image, DrawableRef::Layer(id)).unwrap();
        assert!(image.layer(id).is_none());
        image.undo();
        assert!(image.layer(id).is_some());
    }

    #[test]
    fn extract_outside_selection_is_refused() {
        let mut image = Image::new(10, 10);
        let layer = image.new_layer(3, 3, "Corner", true);
        let id = image.add_layer(layer, None, false);
        select_rect(&mut image, Rect::new(6, 6, 2, 2), ChannelOp::Replace, false);
        let err = extract(&mut image, DrawableRef::Layer(id), true, false).unwrap_err();
        assert_eq!(err.to_string(), "Unable to cut or copy because the selected region is empty.");
        assert!(image.layer(id).is_some());
    }

    #[test]
    fn float_cuts_and_clears_selection() {
        let (mut image, id) = image_with_layer();
        select_rect(&mut image, Rect::new(2, 3, 4, 2), ChannelOp::Replace, false);
        let fs = float(&mut image, DrawableRef::Layer(id), true, 1, 1).unwrap();
        let layer = image.layer(fs).unwrap();
        assert_eq!(layer.name(), "Floated Layer");
        assert_eq!(layer.bounds(), Rect::new(3, 4, 4, 2));
        assert_eq!(layer.floating_sel_host(), Some(DrawableRef::Layer(id)));
        assert!(image.selection().channel().drawable.buffer().as_mask().unwrap().pixels().all(|p| p[0] == 0));
        assert_eq!(image.layer(id).unwrap().drawable.buffer().coverage(2, 3), 0);
        assert_eq!(image.history().undo_kind(), Some(UndoKind::FsFloat));

        image.undo();
        assert!(image.floating_selection().is_none());
        assert_eq!(image.layer(id).unwrap().drawable.buffer().coverage(2, 3), 255);
        assert_eq!(image.selection_mut().channel.content_bounds(), Some(Rect::new(2, 3, 4, 2)));
    }

    #[test]
    fn float_without_selection_is_refused() {
        let (mut image, id) = image_with_layer();
        let err = float(&mut image, DrawableRef::Layer(id), false, 0, 0).unwrap_err();
        assert_eq!(err, EngineError::EmptyRegion(RegionAction::Float));
        assert_eq!(image.history().undo_count(), 0);
    }

    #[test]
    fn save_then_load_round_trips() {
        let (mut image, _) = image_with_layer();
        select_rect(&mut image, Rect::new(1, 1, 2, 2), ChannelOp::Replace, false);
        let saved = save(&mut image).unwrap();
        let channel = image.channel(saved).unwrap();
        assert_eq!(channel.name(), "Selection Mask copy");
        assert!(!channel.is_visible());
        clear(&mut image, true);
        load(&mut image, DrawableRef::Channel(saved), true);
        assert_eq!(image.selection_mut().channel.content_bounds(), Some(Rect::new(1, 1, 2, 2)));
        assert_eq!(image.history().undo_description().as_deref(), Some("Channel to Selection"));
    }
}
