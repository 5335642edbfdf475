// ============================================================================
// ITEM OPERATIONS: geometry, rename, visibility
// ============================================================================
//
// Geometry on a layer is mirrored onto its mask with identical arguments.
// Both start from the same bounds, so they end with the same bounds too.

use crate::canvas::Interpolation;
use crate::drawable::{BufferState, Drawable};
use crate::error::EngineError;
use crate::event::ImageEvent;
use crate::geometry::{ClipResult, Matrix3, Orientation, Rect, Rotation};
use crate::history::UndoKind;
use crate::image::Image;
use crate::item::{DrawableRef, Nameable, Positioned};
use crate::ops;
use crate::undo::{DrawableBufferUndo, ItemDisplaceUndo, ItemRenameUndo, ItemVisibilityUndo};

// ============================================================================
// POSITION
// ============================================================================

/// Move an item by `(dx, dy)`. A layer's mask follows.
pub fn translate(image: &mut Image, target: DrawableRef, dx: i32, dy: i32, push_undo: bool) {
    let Some((ox, oy)) = image.drawable(target).map(|d| d.offset()) else {
        debug_assert!(false, "translate: {:?} not attached", target);
        return;
    };
    if dx == 0 && dy == 0 {
        return;
    }
    if push_undo {
        image.history.push(Box::new(ItemDisplaceUndo::new(target, (ox, oy))));
    }
    set_offset(image, target, ox + dx, oy + dy);
}

/// Place an item at `(x, y)` without recording undo.
pub(crate) fn set_offset(image: &mut Image, target: DrawableRef, x: i32, y: i32) {
    // Masks only move together with their layer
    let target = match target {
        DrawableRef::LayerMask(id) => DrawableRef::Layer(id),
        other => other,
    };
    let Some(drawable) = image.drawable_mut(target) else { return };
    let old_bounds = drawable.bounds();
    drawable.set_offset(x, y);
    let new_bounds = drawable.bounds();

    if let DrawableRef::Layer(id) = target {
        if let Some(layer) = image.layer_mut(id) {
            layer.sync_mask();
            layer.invalidate_fs_boundary();
        }
        ops::layer::sync_nodes(image, id);
    }
    if let Some(channel) = image.channel_like_mut(target) {
        channel.invalidate_boundary();
    }
    image.update(target, old_bounds);
    image.update(target, new_bounds);
}

// ============================================================================
// BUFFER REPLACEMENT
// ============================================================================

/// Install `state` as the new content of `target`, recording the old one.
pub(crate) fn replace_state(
    image: &mut Image,
    target: DrawableRef,
    state: BufferState,
    push_undo: bool,
    description: &str,
) {
    let Some(drawable) = image.drawable_mut(target) else { return };
    let old_bounds = drawable.bounds();
    let old_state = push_undo.then(|| drawable.state());
    drawable.apply_state(state);
    if let Some(old_state) = old_state {
        image.history.push(Box::new(DrawableBufferUndo::new(target, old_state, description)));
    }
    after_buffer_change(image, target, old_bounds);
}

/// Bring caches, graph and listeners in line after pixels or geometry changed.
pub(crate) fn after_buffer_change(image: &mut Image, target: DrawableRef, old_bounds: Rect) {
    if let Some(channel) = image.channel_like_mut(target) {
        channel.invalidate_boundary();
    }
    match target {
        DrawableRef::Layer(id) => {
            if let Some(layer) = image.layer_mut(id) {
                layer.invalidate_fs_boundary();
            }
            ops::layer::sync_nodes(image, id);
        }
        DrawableRef::LayerMask(id) => ops::layer::sync_nodes(image, id),
        DrawableRef::Selection => ops::selection::invalidate_boundary(image),
        DrawableRef::Channel(_) => {}
    }
    image.update(target, old_bounds);
    image.update_full(target);
}

/// Apply `op` to `target` and, for a layer, to its mask as well.
fn geometry<F>(image: &mut Image, target: DrawableRef, push_undo: bool, description: &str, op: F)
where
    F: Fn(&Drawable) -> BufferState,
{
    let Some(state) = image.drawable(target).map(&op) else {
        debug_assert!(false, "{}: {:?} not attached", description, target);
        return;
    };
    let mask_state = match target {
        DrawableRef::Layer(id) => image.drawable(DrawableRef::LayerMask(id)).map(&op),
        _ => None,
    };

    let grouped = push_undo && mask_state.is_some();
    if grouped {
        image.history.begin_group(UndoKind::Misc, description);
    }
    replace_state(image, target, state, push_undo, description);
    if let (Some(mask_state), Some(id)) = (mask_state, target.layer_id()) {
        replace_state(image, DrawableRef::LayerMask(id), mask_state, push_undo, description);
        if let Some(layer) = image.layer_mut(id) {
            layer.sync_mask();
        }
    }
    if grouped {
        image.history.end_group();
    }
}

pub fn scale(
    image: &mut Image,
    target: DrawableRef,
    new_width: i32,
    new_height: i32,
    new_offset_x: i32,
    new_offset_y: i32,
    interpolation: Interpolation,
    push_undo: bool,
) {
    debug_assert!(new_width > 0 && new_height > 0, "scale to an empty size");
    if new_width <= 0 || new_height <= 0 {
        return;
    }
    geometry(image, target, push_undo, "Scale", |d| {
        d.scaled(new_width, new_height, new_offset_x, new_offset_y, interpolation)
    });
}

/// Change the canvas of an item to `new_width × new_height`, shifting its
/// content by `(offset_x, offset_y)`. Channels stay anchored at the origin.
pub fn resize(
    image: &mut Image,
    target: DrawableRef,
    new_width: i32,
    new_height: i32,
    offset_x: i32,
    offset_y: i32,
    push_undo: bool,
) {
    debug_assert!(new_width > 0 && new_height > 0, "resize to an empty size");
    if new_width <= 0 || new_height <= 0 {
        return;
    }
    let anchored = matches!(target, DrawableRef::Channel(_) | DrawableRef::Selection);
    geometry(image, target, push_undo, "Resize", |d| {
        let mut state = d.resized(new_width, new_height, offset_x, offset_y);
        if anchored {
            state.offset_x = 0;
            state.offset_y = 0;
        }
        state
    });
}

pub fn flip(image: &mut Image, target: DrawableRef, orientation: Orientation, axis: f64, clip: ClipResult, push_undo: bool) {
    geometry(image, target, push_undo, "Flip", |d| d.flipped(orientation, axis, clip));
}

pub fn rotate(image: &mut Image, target: DrawableRef, rotation: Rotation, cx: f64, cy: f64, clip: ClipResult, push_undo: bool) {
    geometry(image, target, push_undo, "Rotate", |d| d.rotated(rotation, cx, cy, clip));
}

pub fn transform(
    image: &mut Image,
    target: DrawableRef,
    matrix: &Matrix3,
    interpolation: Interpolation,
    clip: ClipResult,
    push_undo: bool,
) {
    geometry(image, target, push_undo, "Transform", |d| d.transformed(matrix, interpolation, clip));
}

// ============================================================================
// NAME & VISIBILITY
// ============================================================================

/// Rename an item. Masks refuse; a floating selection becomes a layer first.
pub fn rename(image: &mut Image, target: DrawableRef, name: &str, push_undo: bool) -> Result<(), EngineError> {
    if let DrawableRef::LayerMask(id) = target {
        let mask = image.layer(id).and_then(|l| l.mask()).ok_or(EngineError::NotAttached)?;
        mask.check_rename()?;
    }
    let floating = match target {
        DrawableRef::Layer(id) => image.layer(id).ok_or(EngineError::NotAttached)?.floating_sel_host(),
        _ => None,
    };
    if let Some(host) = floating {
        if host.is_channel_like() {
            log::warn!("rename: {}", EngineError::FloatingSelectionOnChannel);
            return Err(EngineError::FloatingSelectionOnChannel);
        }
    }
    let Some(current) = image.drawable(target).map(|d| d.item.name.clone()) else {
        return Err(EngineError::NotAttached);
    };

    let grouped = floating.is_some() && push_undo;
    if grouped {
        image.history.begin_group(UndoKind::ItemProperties, "Rename Layer");
    }
    if let (Some(_), Some(id)) = (floating, target.layer_id()) {
        if let Err(err) = ops::floating_sel::to_layer(image, id) {
            if grouped {
                image.history.end_group();
            }
            return Err(err);
        }
    }
    if current != name {
        if push_undo {
            image.history.push(Box::new(ItemRenameUndo::new(target, current)));
        }
        set_name_unchecked(image, target, name.to_string());
    }
    if grouped {
        image.history.end_group();
    }
    Ok(())
}

/// Store a name without checks; a layer's mask name follows.
pub(crate) fn set_name_unchecked(image: &mut Image, target: DrawableRef, name: String) {
    let Some(drawable) = image.drawable_mut(target) else { return };
    drawable.item.name = name;
    if let DrawableRef::Layer(id) = target {
        let has_mask = match image.layer_mut(id) {
            Some(layer) => {
                layer.sync_mask();
                layer.mask().is_some()
            }
            None => false,
        };
        if has_mask {
            image.emit(ImageEvent::NameChanged(DrawableRef::LayerMask(id)));
        }
    }
    image.emit(ImageEvent::NameChanged(target));
}

pub fn set_visible(image: &mut Image, target: DrawableRef, visible: bool, push_undo: bool) {
    let Some(drawable) = image.drawable(target) else {
        debug_assert!(false, "set_visible: {:?} not attached", target);
        return;
    };
    if drawable.is_visible() == visible {
        return;
    }
    if push_undo {
        image.history.push(Box::new(ItemVisibilityUndo::new(target, !visible)));
    }
    if let Some(drawable) = image.drawable_mut(target) {
        drawable.item.visible = visible;
    }
    if let DrawableRef::Layer(id) = target {
        if let Some(layer) = image.layer_mut(id) {
            layer.invalidate_fs_boundary();
        }
    }
    image.emit(ImageEvent::VisibilityChanged(target));
    image.update_full(target);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layer::AddMaskType;

    fn image_with_masked_layer() -> (Image, crate::item::ItemId) {
        let mut image = Image::new(20, 20);
        let layer = image.new_layer(8, 6, "L", true);
        let id = image.add_layer(layer, None, false);
        let mask = ops::layer::create_mask(&mut image, id, AddMaskType::White, None).unwrap();
        ops::layer::add_mask(&mut image, id, mask, false).unwrap();
        (image, id)
    }

    fn assert_mask_follows(image: &Image, id: crate::item::ItemId) {
        let layer = image.layer(id).unwrap();
        let mask = layer.mask().unwrap();
        assert_eq!(mask.bounds(), layer.bounds());
    }

    #[test]
    fn translate_moves_mask_and_undoes() {
        let (mut image, id) = image_with_masked_layer();
        translate(&mut image, DrawableRef::Layer(id), 3, -2, true);
        assert_eq!(image.layer(id).unwrap().offset(), (3, -2));
        assert_mask_follows(&image, id);
        image.undo();
        assert_eq!(image.layer(id).unwrap().offset(), (0, 0));
        assert_mask_follows(&image, id);
    }

    #[test]
    fn every_geometry_op_keeps_mask_in_step() {
        let (mut image, id) = image_with_masked_layer();
        let l = DrawableRef::Layer(id);
        scale(&mut image, l, 12, 9, 1, 1, Interpolation::Linear, true);
        assert_mask_follows(&image, id);
        resize(&mut image, l, 14, 10, 2, 1, true);
        assert_mask_follows(&image, id);
        flip(&mut image, l, Orientation::Vertical, 10.0, ClipResult::Adjust, true);
        assert_mask_follows(&image, id);
        rotate(&mut image, l, Rotation::Cw90, 10.0, 10.0, ClipResult::Adjust, true);
        assert_mask_follows(&image, id);
        transform(&mut image, l, &Matrix3::translation(2.0, 3.0), Interpolation::None, ClipResult::Adjust, true);
        assert_mask_follows(&image, id);
        while image.undo().is_some() {
            assert_mask_follows(&image, id);
        }
        assert_eq!(image.layer(id).unwrap().bounds(), Rect::new(0, 0, 8, 6));
    }

    #[test]
    fn masks_cannot_be_renamed() {
        let (mut image, id) = image_with_masked_layer();
        assert_eq!(
            rename(&mut image, DrawableRef::LayerMask(id), "x", true),
            Err(EngineError::CannotRenameMask)
        );
        rename(&mut image, DrawableRef::Layer(id), "Sky", true).unwrap();
        assert_eq!(image.layer(id).unwrap().mask().unwrap().name(), "Sky mask");
        image.undo();
        assert_eq!(image.layer(id).unwrap().mask().unwrap().name(), "L mask");
    }

    #[test]
    fn visibility_is_idempotent() {
        let (mut image, id) = image_with_masked_layer();
        let before = image.history().undo_count();
        set_visible(&mut image, DrawableRef::Layer(id), true, true);
        assert_eq!(image.history().undo_count(), before);
        set_visible(&mut image, DrawableRef::Layer(id), false, true);
        assert!(!image.layer(id).unwrap().is_visible());
        image.undo();
        assert!(image.layer(id).unwrap().is_visible());
    }
}
