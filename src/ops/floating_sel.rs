// ============================================================================
// FLOATING SELECTION: attach, anchor, convert, outline
// ============================================================================
//
// A floating selection is an ordinary layer whose `fs.host` names the
// drawable it will merge into. At most one exists per image.

use crate::canvas::{LayerMode, blend_pixel, luminance};
use crate::drawable::{BufferState, PixelBuffer};
use crate::error::EngineError;
use crate::event::ImageEvent;
use crate::geometry::BoundSeg;
use crate::history::UndoKind;
use crate::image::Image;
use crate::item::{Boundable, DrawableRef, ItemId, Positioned};
use crate::layer::Layer;
use crate::ops;
use crate::undo::FsToLayerUndo;

/// Snapshot of a floating layer taken before it leaves the stack, enough to
/// merge it into the host afterwards.
struct MergeFilter {
    state: BufferState,
    opacity: f64,
    mode: LayerMode,
}

// ============================================================================
// ATTACH / ANCHOR
// ============================================================================

/// Float `layer` over `host`. Any existing floating selection is anchored
/// first; if it was the intended host, the paste goes to whatever becomes
/// active after anchoring.
pub fn attach(image: &mut Image, mut layer: Layer, host: DrawableRef) -> ItemId {
    debug_assert!(image.layer(layer.id()).is_none(), "floating layer already attached");
    debug_assert!(image.is_attached(host), "floating selection host not attached");
    debug_assert_ne!(host, DrawableRef::Layer(layer.id()), "layer cannot float over itself");

    let mut host = host;
    if let Some(old) = image.floating_selection() {
        anchor(image, old);
        if host == DrawableRef::Layer(old) {
            match image.active_drawable() {
                Some(active) => host = active,
                None => {
                    debug_assert!(false, "no drawable left to paste into");
                    return layer.id();
                }
            }
        }
    }

    layer.lock_alpha = true;
    layer.fs.host = Some(host);
    layer.invalidate_fs_boundary();
    log::info!("floating selection {} attached to {:?}", layer.id(), host);
    image.add_layer(layer, None, true)
}

/// Merge the floating selection into its host and remove it.
pub fn anchor(image: &mut Image, fs_id: ItemId) {
    let Some(layer) = image.layer(fs_id) else {
        debug_assert!(false, "anchor: {} not attached", fs_id);
        return;
    };
    let Some(host) = layer.floating_sel_host() else {
        debug_assert!(false, "anchor: {} is not floating", fs_id);
        return;
    };

    let host_bounds = image.drawable(host).map(|d| d.bounds());
    let filter = match (layer.is_visible(), host_bounds) {
        (true, Some(hb)) if layer.bounds().intersects(&hb) => Some(MergeFilter {
            state: layer.drawable.state(),
            opacity: layer.opacity,
            mode: layer.mode,
        }),
        _ => None,
    };

    image.history.begin_group(UndoKind::FsAnchor, "Anchor Floating Selection");

    // Leave the stack before touching the host
    image.remove_layer(fs_id, true);

    if let Some(filter) = filter {
        merge(image, host, &filter);
    }

    image.history.end_group();
    ops::selection::invalidate_boundary(image);
    log::info!("floating selection {} anchored", fs_id);
}

/// Composite `filter` into `host` through the selection, if there is one.
fn merge(image: &mut Image, host: DrawableRef, filter: &MergeFilter) {
    let use_selection = !image.selection_mut().is_empty();
    let Some(drawable) = image.drawable(host) else { return };
    let (hx, hy) = drawable.offset();
    let mut state = drawable.state();
    let src = &filter.state;
    let selection = image.selection();

    let coverage = |ix: i32, iy: i32| -> f32 {
        let sel = if use_selection { selection.value(ix, iy) as f32 / 255.0 } else { 1.0 };
        filter.opacity as f32 * sel
    };

    let (sw, sh) = (src.buffer.width(), src.buffer.height());
    for sy in 0..sh {
        for sx in 0..sw {
            let (ix, iy) = (src.offset_x + sx, src.offset_y + sy);
            let (dx, dy) = (ix - hx, iy - hy);
            if dx < 0 || dy < 0 || dx >= state.buffer.width() || dy >= state.buffer.height() {
                continue;
            }
            let amount = coverage(ix, iy);
            if amount <= 0.0 {
                continue;
            }
            let top = match &src.buffer {
                PixelBuffer::Color(t) => *t.get_pixel(sx as u32, sy as u32),
                PixelBuffer::Mask(m) => {
                    let v = m.get_pixel(sx as u32, sy as u32)[0];
                    image::Rgba([v, v, v, 255])
                }
            };
            match &mut state.buffer {
                PixelBuffer::Color(dst) => {
                    let base = *dst.get_pixel(dx as u32, dy as u32);
                    let mut out = blend_pixel(base, top, filter.mode, amount);
                    if !state.has_alpha {
                        out[3] = 255;
                    }
                    dst.put_pixel(dx as u32, dy as u32, out);
                }
                PixelBuffer::Mask(dst) => {
                    let px = dst.get_pixel_mut(dx as u32, dy as u32);
                    let a = amount * top[3] as f32 / 255.0;
                    let v = px[0] as f32 * (1.0 - a) + luminance(top) as f32 * a;
                    px[0] = v.round().clamp(0.0, 255.0) as u8;
                }
            }
        }
    }

    ops::item::replace_state(image, host, state, true, "Anchor Floating Selection");
}

// ============================================================================
// CONVERSION & ACTIVATION
// ============================================================================

/// Turn the floating selection into an ordinary layer.
pub fn to_layer(image: &mut Image, fs_id: ItemId) -> Result<(), EngineError> {
    let layer = image.layer(fs_id).ok_or(EngineError::NotAttached)?;
    let Some(host) = layer.floating_sel_host() else {
        debug_assert!(false, "to_layer: {} is not floating", fs_id);
        return Ok(());
    };
    if host.is_channel_like() {
        log::warn!("to_layer: {}", EngineError::FloatingSelectionOnChannel);
        return Err(EngineError::FloatingSelectionOnChannel);
    }

    image.history.begin_group(UndoKind::FsToLayer, "Floating Selection to Layer");
    image.history.push(Box::new(FsToLayerUndo::new(fs_id, host)));
    if let Some(layer) = image.layer_mut(fs_id) {
        layer.fs.host = None;
        layer.invalidate_fs_boundary();
    }
    ops::item::set_visible(image, DrawableRef::Layer(fs_id), true, true);
    ops::layer::set_lock_alpha(image, fs_id, false, true);
    image.history.end_group();

    // Same name, new identity as a layer
    image.emit(ImageEvent::NameChanged(DrawableRef::Layer(fs_id)));
    image.update_full(DrawableRef::Layer(fs_id));
    image.emit(ImageEvent::FloatingSelectionChanged);
    ops::selection::invalidate_boundary(image);
    Ok(())
}

/// Make the floating selection's host the active target. The image keeps the
/// floating layer active until it leaves the stack, so this takes effect on
/// removal.
pub fn activate_drawable(image: &mut Image, fs_id: ItemId) {
    let Some(host) = image.layer(fs_id).and_then(|l| l.floating_sel_host()) else {
        debug_assert!(false, "activate_drawable: {} is not floating", fs_id);
        return;
    };
    activate_host(image, host);
}

pub(crate) fn activate_host(image: &mut Image, host: DrawableRef) {
    match host {
        DrawableRef::Layer(id) | DrawableRef::LayerMask(id) => image.set_active_layer(Some(id)),
        DrawableRef::Channel(id) => image.set_active_channel(Some(id)),
        DrawableRef::Selection => {}
    }
}

// ============================================================================
// OUTLINE
// ============================================================================

/// Outline of the floating layer in image coordinates, traced lazily.
pub fn boundary(image: &mut Image, fs_id: ItemId) -> Vec<BoundSeg> {
    match image.layer_mut(fs_id) {
        Some(layer) if layer.is_floating_sel() => layer.boundary(),
        _ => Vec::new(),
    }
}

/// Forget the traced outline and repaint the floating layer.
pub fn invalidate(image: &mut Image, fs_id: ItemId) {
    let Some(layer) = image.layer_mut(fs_id) else { return };
    layer.invalidate_fs_boundary();
    image.update_full(DrawableRef::Layer(fs_id));
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;

    fn image_with_background() -> (Image, ItemId) {
        let mut image = Image::new(8, 8);
        let layer = image.new_layer(8, 8, "Background", false);
        let id = image.add_layer(layer, None, false);
        (image, id)
    }

    fn red_patch(image: &mut Image, x: i32, y: i32) -> Layer {
        let mut layer = image.new_layer(2, 2, "Pasted Layer", true);
        if let Some(t) = layer.drawable.buffer_mut().as_color_mut() {
            t.fill(Rgba([255, 0, 0, 255]));
        }
        layer.drawable.set_offset(x, y);
        layer
    }

    #[test]
    fn attach_locks_alpha_and_activates() {
        let (mut image, bg) = image_with_background();
        let patch = red_patch(&mut image, 1, 1);
        let fs = attach(&mut image, patch, DrawableRef::Layer(bg));
        let layer = image.layer(fs).unwrap();
        assert!(layer.lock_alpha());
        assert_eq!(layer.floating_sel_host(), Some(DrawableRef::Layer(bg)));
        assert_eq!(image.floating_selection(), Some(fs));
        assert_eq!(image.active_layer(), Some(fs));
        // Only the floating layer may be active meanwhile
        image.set_active_layer(Some(bg));
        assert_eq!(image.active_layer(), Some(fs));
    }

    #[test]
    fn anchor_merges_into_host() {
        let (mut image, bg) = image_with_background();
        let patch = red_patch(&mut image, 3, 3);
        let fs = attach(&mut image, patch, DrawableRef::Layer(bg));
        anchor(&mut image, fs);
        assert!(image.floating_selection().is_none());
        assert_eq!(image.layers().len(), 1);
        let host = image.layer(bg).unwrap().drawable.buffer().as_color().unwrap();
        assert_eq!(*host.get_pixel(3, 3), Rgba([255, 0, 0, 255]));
        assert_eq!(*host.get_pixel(0, 0), Rgba([255, 255, 255, 255]));
        assert_eq!(image.active_layer(), Some(bg));
        assert_eq!(image.history().undo_description().as_deref(), Some("Anchor Floating Selection"));

        image.undo();
        assert_eq!(image.floating_selection(), Some(fs));
        let host = image.layer(bg).unwrap().drawable.buffer().as_color().unwrap();
        assert_eq!(*host.get_pixel(3, 3), Rgba([255, 255, 255, 255]));
    }

    #[test]
    fn second_attach_anchors_first() {
        let (mut image, bg) = image_with_background();
        let first = red_patch(&mut image, 0, 0);
        let first = attach(&mut image, first, DrawableRef::Layer(bg));
        let second = red_patch(&mut image, 5, 5);
        let second = attach(&mut image, second, DrawableRef::Layer(first));
        assert!(image.layer(first).is_none());
        let layer = image.layer(second).unwrap();
        assert_eq!(layer.floating_sel_host(), Some(DrawableRef::Layer(bg)));
    }

    #[test]
    fn channel_host_cannot_become_layer() {
        let (mut image, _) = image_with_background();
        let channel = image.new_channel("Alpha", Rgba([0, 0, 0, 128]));
        let ch = image.add_channel(channel, None, false);
        let patch = red_patch(&mut image, 0, 0);
        let fs = attach(&mut image, patch, DrawableRef::Channel(ch));
        let undo_count = image.history().undo_count();
        assert_eq!(to_layer(&mut image, fs), Err(EngineError::FloatingSelectionOnChannel));
        assert!(image.layer(fs).unwrap().is_floating_sel());
        assert_eq!(image.history().undo_count(), undo_count);
    }

    #[test]
    fn to_layer_is_one_step() {
        let (mut image, bg) = image_with_background();
        let patch = red_patch(&mut image, 0, 0);
        let fs = attach(&mut image, patch, DrawableRef::Layer(bg));
        image.drain_events();
        to_layer(&mut image, fs).unwrap();
        let layer = image.layer(fs).unwrap();
        assert!(!layer.is_floating_sel());
        assert!(!layer.lock_alpha());
        let events = image.drain_events();
        assert!(events.contains(&ImageEvent::NameChanged(DrawableRef::Layer(fs))));
        assert_eq!(image.history().undo_kind(), Some(UndoKind::FsToLayer));
        image.undo();
        assert_eq!(image.layer(fs).unwrap().floating_sel_host(), Some(DrawableRef::Layer(bg)));
    }

    #[test]
    fn removal_reactivates_the_host() {
        let (mut image, bg) = image_with_background();
        let channel = image.new_channel("Alpha", Rgba([0, 0, 0, 128]));
        let ch = image.add_channel(channel, None, false);
        let patch = red_patch(&mut image, 0, 0);
        let fs = attach(&mut image, patch, DrawableRef::Channel(ch));
        assert_eq!(image.active_channel(), None);
        // Channels stay inactive while something floats
        activate_drawable(&mut image, fs);
        assert_eq!(image.active_channel(), None);
        image.remove_layer(fs, true);
        assert_eq!(image.active_channel(), Some(ch));

        let patch = red_patch(&mut image, 0, 0);
        let fs = attach(&mut image, patch, DrawableRef::Layer(bg));
        anchor(&mut image, fs);
        assert_eq!(image.active_layer(), Some(bg));
        assert_eq!(image.active_channel(), None);
    }

    #[test]
    fn activation_goes_to_the_layer_or_mask_host() {
        let (mut image, bg) = image_with_background();
        let top = image.new_layer(8, 8, "Top", true);
        let top = image.add_layer(top, None, false);

        let patch = red_patch(&mut image, 0, 0);
        let fs = attach(&mut image, patch, DrawableRef::Layer(bg));
        activate_drawable(&mut image, fs);
        assert_eq!(image.active_layer(), Some(fs));
        image.remove_layer(fs, false);
        assert_eq!(image.active_layer(), Some(bg));
        assert_eq!(image.active_drawable(), Some(DrawableRef::Layer(bg)));

        let mask = ops::layer::create_mask(&mut image, bg, crate::layer::AddMaskType::White, None).unwrap();
        ops::layer::add_mask(&mut image, bg, mask, false).unwrap();
        let patch = red_patch(&mut image, 0, 0);
        let fs = attach(&mut image, patch, DrawableRef::LayerMask(bg));
        activate_drawable(&mut image, fs);
        assert_eq!(image.active_layer(), Some(fs));
        // The neighbour would be `top`; the host wins
        image.remove_layer(fs, false);
        assert_eq!(image.active_layer(), Some(bg));
        assert_eq!(image.active_drawable(), Some(DrawableRef::LayerMask(bg)));
    }

    #[test]
    fn opaque_outline_is_a_rectangle() {
        let (mut image, bg) = image_with_background();
        let mut patch = image.new_layer(3, 2, "Pasted Layer", false);
        patch.drawable.set_offset(2, 1);
        let fs = attach(&mut image, patch, DrawableRef::Layer(bg));
        let segs = boundary(&mut image, fs);
        assert_eq!(segs.len(), 4);
        assert_eq!(crate::geometry::segments_bounds(&segs), Some(crate::geometry::Rect::new(2, 1, 3, 2)));
    }
}
