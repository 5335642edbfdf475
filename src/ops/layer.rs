// ============================================================================
// LAYER OPERATIONS: masks, blend parameters, alpha, duplication
// ============================================================================

use image::{Luma, Rgba};

use crate::canvas::{LayerMode, luminance};
use crate::channel::{Channel, ChannelColor};
use crate::drawable::PixelBuffer;
use crate::error::EngineError;
use crate::event::ImageEvent;
use crate::graph::{LayerNodes, NodeOp, Pad};
use crate::history::UndoKind;
use crate::image::Image;
use crate::item::{DrawableRef, ItemId, Nameable, PixelOwning, Positioned};
use crate::layer::{AddMaskType, Layer, LayerMask, MaskApplyMode};
use crate::ops;
use crate::undo::{LayerProp, LayerPropUndo, MaskFlag, MaskFlagUndo, MaskStackUndo};

/// Display colour of layer masks.
const MASK_COLOR: ChannelColor = Rgba([0, 0, 0, 128]);

// ============================================================================
// MASK CREATION
// ============================================================================

/// Build an unattached mask sized and placed like the layer.
///
/// `channel` is the source for [`AddMaskType::Channel`] and ignored otherwise.
/// [`AddMaskType::AlphaTransfer`] moves the alpha into the mask and makes the
/// layer opaque, recording that change for undo.
pub fn create_mask(
    image: &mut Image,
    layer_id: ItemId,
    add_type: AddMaskType,
    channel: Option<ItemId>,
) -> Result<LayerMask, EngineError> {
    debug_assert!(add_type != AddMaskType::Channel || channel.is_some(), "channel mask without a channel");
    let (name, bounds) = {
        let layer = image.layer(layer_id).ok_or(EngineError::NotAttached)?;
        (LayerMask::mask_name(layer.name()), layer.bounds())
    };
    let id = image.alloc_id();
    let mut mask = Channel::new(id, image.id(), name, bounds.width, bounds.height, MASK_COLOR);
    mask.drawable.set_offset(bounds.x, bounds.y);

    match add_type {
        AddMaskType::White => mask.all(),
        AddMaskType::Black => mask.clear(),
        AddMaskType::Alpha | AddMaskType::AlphaTransfer => {
            let Some(layer) = image.layer(layer_id) else { return Err(EngineError::NotAttached) };
            if layer.has_alpha() {
                let src = layer.drawable.buffer();
                if let Some(dst) = mask.drawable.buffer_mut().as_mask_mut() {
                    for (x, y, px) in dst.enumerate_pixels_mut() {
                        *px = Luma([src.coverage(x as i32, y as i32)]);
                    }
                }
                mask.invalidate_boundary();

                if add_type == AddMaskType::AlphaTransfer {
                    let mut state = layer.drawable.state();
                    if let PixelBuffer::Color(tiles) = &mut state.buffer {
                        for y in 0..tiles.height() {
                            for x in 0..tiles.width() {
                                let mut px = *tiles.get_pixel(x, y);
                                px[3] = 255;
                                tiles.put_pixel(x, y, px);
                            }
                        }
                    }
                    ops::item::replace_state(image, DrawableRef::Layer(layer_id), state, true, "Transfer Alpha to Mask");
                }
            }
        }
        AddMaskType::Selection | AddMaskType::Channel => {
            let source = match (add_type, channel) {
                (AddMaskType::Selection, _) => Some(DrawableRef::Selection),
                (_, Some(cid)) => Some(DrawableRef::Channel(cid)),
                _ => None,
            };
            let overlap = bounds.intersect(&image.bounds());
            let src = source.and_then(|s| image.channel_like_mut(s)).and_then(|c| (!c.is_empty()).then_some(c));
            match (src, overlap) {
                (Some(src), Some(overlap)) => {
                    let (sx, sy) = src.offset();
                    if let Some(dst) = mask.drawable.buffer_mut().as_mask_mut() {
                        for y in overlap.y..overlap.y2() {
                            for x in overlap.x..overlap.x2() {
                                let v = src.value(x - sx, y - sy);
                                dst.put_pixel((x - bounds.x) as u32, (y - bounds.y) as u32, Luma([v]));
                            }
                        }
                    }
                    mask.invalidate_boundary();
                }
                _ => mask.clear(),
            }
        }
        AddMaskType::Copy => {
            let Some(layer) = image.layer(layer_id) else { return Err(EngineError::NotAttached) };
            let has_alpha = layer.has_alpha();
            if let (Some(src), Some(dst)) = (layer.drawable.buffer().as_color(), mask.drawable.buffer_mut().as_mask_mut()) {
                for (x, y, px) in dst.enumerate_pixels_mut() {
                    let p = *src.get_pixel(x, y);
                    let gray = luminance(p) as u32;
                    // Flatten against transparent black
                    let v = if has_alpha { gray * p[3] as u32 / 255 } else { gray };
                    *px = Luma([v as u8]);
                }
            }
            mask.invalidate_boundary();
        }
    }

    Ok(LayerMask { channel: mask, layer: layer_id })
}

// ============================================================================
// MASK ATTACH / DETACH
// ============================================================================

/// Attach `mask` to the layer. The mask starts applied and edited, not shown.
pub fn add_mask(image: &mut Image, layer_id: ItemId, mut mask: LayerMask, push_undo: bool) -> Result<(), EngineError> {
    let layer = image.layer(layer_id).ok_or(EngineError::NotAttached)?;
    debug_assert_eq!(mask.image_id(), image.id(), "mask belongs to another image");
    if layer.mask.is_some() {
        log::warn!("add_mask: {}", EngineError::LayerHasMask);
        return Err(EngineError::LayerHasMask);
    }
    if (layer.width(), layer.height()) != (mask.width(), mask.height()) {
        log::warn!("add_mask: {}", EngineError::MaskSizeMismatch);
        return Err(EngineError::MaskSizeMismatch);
    }

    if push_undo {
        image.history.push(Box::new(MaskStackUndo::added(layer_id, "Add Layer Mask")));
    }

    mask.layer = layer_id;
    mask.channel.drawable.item.removed = false;
    let Some(layer) = image.layer_mut(layer_id) else { return Err(EngineError::NotAttached) };
    layer.mask = Some(mask);
    layer.apply_mask = true;
    layer.edit_mask = true;
    layer.show_mask = false;
    layer.sync_mask();

    sync_nodes(image, layer_id);
    image.update_full(DrawableRef::Layer(layer_id));
    image.emit(ImageEvent::MaskChanged(layer_id));
    log::debug!("layer {}: mask added", layer_id);
    Ok(())
}

/// Remove the layer's mask, either compositing it into the layer's alpha or
/// dropping it. No-op without a mask.
pub fn apply_mask(image: &mut Image, layer_id: ItemId, mode: MaskApplyMode, push_undo: bool) {
    detach_mask(image, layer_id, mode, push_undo);
}

/// Worker behind [`apply_mask`]. Returns the detached mask unless an undo
/// record took ownership of it.
pub(crate) fn detach_mask(image: &mut Image, layer_id: ItemId, mode: MaskApplyMode, push_undo: bool) -> Option<LayerMask> {
    let layer = image.layer(layer_id)?;
    layer.mask.as_ref()?;
    debug_assert!(
        layer.has_alpha() || mode == MaskApplyMode::Discard || push_undo,
        "applying a mask needs alpha or undo"
    );

    let show = layer.show_mask;
    let apply = layer.apply_mask;
    let view_changed = show
        || (mode == MaskApplyMode::Apply && !apply)
        || (mode == MaskApplyMode::Discard && apply);

    let description = match mode {
        MaskApplyMode::Apply => "Apply Layer Mask",
        MaskApplyMode::Discard => "Delete Layer Mask",
    };
    if push_undo {
        image.history.begin_group(UndoKind::LayerApplyMask, description);
    }
    // Pixels floating over the mask have nowhere left to go
    if let Some(fs) = image.floating_selection_on(|host| host == DrawableRef::LayerMask(layer_id)) {
        image.remove_layer(fs, push_undo);
    }
    if push_undo {
        image.history.push(Box::new(MaskFlagUndo::new(layer_id, MaskFlag::Show, show, description)));
        image.history.push(Box::new(MaskFlagUndo::new(layer_id, MaskFlag::Apply, apply, description)));
    }

    let mut mask = image.layer_mut(layer_id)?.mask.take()?;

    if push_undo && mode == MaskApplyMode::Apply {
        add_alpha(image, layer_id);
    }

    if mode == MaskApplyMode::Apply {
        if let Some(layer) = image.layer(layer_id) {
            let mut state = layer.drawable.state();
            if let (PixelBuffer::Color(tiles), true) = (&mut state.buffer, state.has_alpha) {
                let src = mask.channel.drawable.buffer();
                for y in 0..tiles.height() {
                    for x in 0..tiles.width() {
                        let m = src.coverage(x as i32, y as i32) as u32;
                        let mut px = *tiles.get_pixel(x, y);
                        if m == 255 || px[3] == 0 {
                            continue;
                        }
                        px[3] = ((px[3] as u32 * m + 127) / 255) as u8;
                        tiles.put_pixel(x, y, px);
                    }
                }
            }
            let description = if push_undo { "Apply Layer Mask" } else { "" };
            ops::item::replace_state(image, DrawableRef::Layer(layer_id), state, push_undo, description);
        }
    }

    mask.channel.drawable.item.removed = true;
    if let Some(layer) = image.layer_mut(layer_id) {
        layer.apply_mask = false;
        layer.edit_mask = false;
        layer.show_mask = false;
    }

    let held = if push_undo {
        image.history.push(Box::new(MaskStackUndo::removed(layer_id, description, mask)));
        image.history.end_group();
        None
    } else {
        Some(mask)
    };

    sync_nodes(image, layer_id);
    if view_changed {
        image.update_full(DrawableRef::Layer(layer_id));
    }
    image.emit(ImageEvent::MaskChanged(layer_id));
    log::debug!("layer {}: mask removed ({:?})", layer_id, mode);
    held
}

// ============================================================================
// MASK FLAGS
// ============================================================================

pub fn set_apply_mask(image: &mut Image, layer_id: ItemId, apply: bool, push_undo: bool) {
    let Some(layer) = image.layer(layer_id) else { return };
    debug_assert!(layer.mask.is_some(), "set_apply_mask on a layer without mask");
    if layer.mask.is_none() || layer.apply_mask == apply {
        return;
    }
    if push_undo {
        let description = if apply { "Enable Layer Mask" } else { "Disable Layer Mask" };
        let record = MaskFlagUndo::new(layer_id, MaskFlag::Apply, layer.apply_mask, description);
        image.history.push(Box::new(record));
    }
    if let Some(layer) = image.layer_mut(layer_id) {
        layer.apply_mask = apply;
    }
    sync_nodes(image, layer_id);
    image.update_full(DrawableRef::Layer(layer_id));
    image.emit(ImageEvent::ApplyMaskChanged(layer_id));
}

/// Whether painting goes to the mask. Not recorded for undo.
pub fn set_edit_mask(image: &mut Image, layer_id: ItemId, edit: bool) {
    let Some(layer) = image.layer_mut(layer_id) else { return };
    debug_assert!(layer.mask.is_some(), "set_edit_mask on a layer without mask");
    if layer.mask.is_none() || layer.edit_mask == edit {
        return;
    }
    layer.edit_mask = edit;
    image.emit(ImageEvent::EditMaskChanged(layer_id));
}

pub fn set_show_mask(image: &mut Image, layer_id: ItemId, show: bool, push_undo: bool) {
    let Some(layer) = image.layer(layer_id) else { return };
    debug_assert!(layer.mask.is_some(), "set_show_mask on a layer without mask");
    if layer.mask.is_none() || layer.show_mask == show {
        return;
    }
    if push_undo {
        let record = MaskFlagUndo::new(layer_id, MaskFlag::Show, layer.show_mask, "Show Layer Mask");
        image.history.push(Box::new(record));
    }
    if let Some(layer) = image.layer_mut(layer_id) {
        layer.show_mask = show;
    }
    sync_nodes(image, layer_id);
    image.update_full(DrawableRef::Layer(layer_id));
    image.emit(ImageEvent::ShowMaskChanged(layer_id));
}

// ============================================================================
// BLEND PARAMETERS
// ============================================================================

pub fn set_opacity(image: &mut Image, layer_id: ItemId, opacity: f64, push_undo: bool) {
    let opacity = opacity.clamp(0.0, 1.0);
    let Some(layer) = image.layer(layer_id) else { return };
    if layer.opacity == opacity {
        return;
    }
    if push_undo {
        let record = LayerPropUndo::new(layer_id, LayerProp::Opacity(layer.opacity));
        image.history.push(Box::new(record));
    }
    if let Some(layer) = image.layer_mut(layer_id) {
        layer.opacity = opacity;
    }
    sync_nodes(image, layer_id);
    image.emit(ImageEvent::OpacityChanged(layer_id));
    image.update_full(DrawableRef::Layer(layer_id));
}

pub fn set_mode(image: &mut Image, layer_id: ItemId, mode: LayerMode, push_undo: bool) {
    let Some(layer) = image.layer(layer_id) else { return };
    if layer.mode == mode {
        return;
    }
    if push_undo {
        let record = LayerPropUndo::new(layer_id, LayerProp::Mode(layer.mode));
        image.history.push(Box::new(record));
    }
    if let Some(layer) = image.layer_mut(layer_id) {
        layer.mode = mode;
    }
    sync_nodes(image, layer_id);
    image.emit(ImageEvent::ModeChanged(layer_id));
    image.update_full(DrawableRef::Layer(layer_id));
}

pub fn set_lock_alpha(image: &mut Image, layer_id: ItemId, lock_alpha: bool, push_undo: bool) {
    let Some(layer) = image.layer(layer_id) else { return };
    debug_assert!(layer.can_lock_alpha(), "group layers cannot lock alpha");
    if !layer.can_lock_alpha() || layer.lock_alpha == lock_alpha {
        return;
    }
    if push_undo {
        let record = LayerPropUndo::new(layer_id, LayerProp::LockAlpha(layer.lock_alpha));
        image.history.push(Box::new(record));
    }
    if let Some(layer) = image.layer_mut(layer_id) {
        layer.lock_alpha = lock_alpha;
    }
    image.emit(ImageEvent::LockAlphaChanged(layer_id));
}

/// Give the layer an alpha channel. Content is unchanged.
pub fn add_alpha(image: &mut Image, layer_id: ItemId) {
    let Some(layer) = image.layer(layer_id) else { return };
    if layer.has_alpha() {
        return;
    }
    let mut state = layer.drawable.state();
    state.has_alpha = true;
    ops::item::replace_state(image, DrawableRef::Layer(layer_id), state, true, "Add Alpha Channel");
}

// ============================================================================
// DUPLICATION
// ============================================================================

/// Unattached copy of a layer with fresh ids. Never pushes undo.
pub fn duplicate(image: &mut Image, layer_id: ItemId) -> Option<Layer> {
    let src = image.layer(layer_id)?.clone();
    let id = image.alloc_id();
    let mask_id = src.mask.as_ref().map(|_| image.alloc_id());

    let mut copy = Layer::from_drawable(src.drawable.clone());
    copy.drawable.item.id = id;
    copy.drawable.item.name = format!("{} copy", src.name());
    copy.drawable.item.removed = false;
    copy.kind = src.kind;
    copy.parent = src.parent;
    copy.mode = src.mode;
    copy.opacity = src.opacity;
    if copy.can_lock_alpha() {
        copy.lock_alpha = src.lock_alpha;
    }
    if let (Some(mask), Some(mask_id)) = (src.mask.as_ref(), mask_id) {
        let channel = mask.channel.duplicate(mask_id, LayerMask::mask_name(copy.name()));
        copy.mask = Some(LayerMask { channel, layer: id });
        copy.apply_mask = src.apply_mask;
        copy.edit_mask = src.edit_mask;
        copy.show_mask = src.show_mask;
    }
    Some(copy)
}

// ============================================================================
// GRAPH WIRING
// ============================================================================

/// Bring a built layer's nodes in line with its offset, blend parameters and
/// mask flags. Layers whose nodes were never requested are left alone.
pub(crate) fn sync_nodes(image: &mut Image, layer_id: ItemId) {
    let Some(layer) = image.layers.iter_mut().find(|l| l.id() == layer_id) else { return };
    let LayerNodes::Built(mut set) = layer.nodes else { return };
    let graph = &mut image.graph;
    let (ox, oy) = layer.offset();

    graph.set_op(set.layer_offset, NodeOp::Translate { x: ox, y: oy });
    graph.set_op(set.mode, NodeOp::Mode { mode: layer.mode, opacity: layer.opacity });

    if layer.mask.is_some() {
        let mask_offset = match set.mask_offset {
            Some(node) => node,
            None => {
                let source = graph.create_node(NodeOp::Source(DrawableRef::LayerMask(layer_id)));
                let offset = graph.create_node(NodeOp::Translate { x: ox, y: oy });
                graph.connect(source, offset, Pad::Input);
                set.mask_source = Some(source);
                set.mask_offset = Some(offset);
                offset
            }
        };
        graph.set_op(mask_offset, NodeOp::Translate { x: ox, y: oy });
        if layer.show_mask {
            graph.connect(mask_offset, set.mode, Pad::Aux);
            graph.disconnect(set.mode, Pad::Aux2);
        } else {
            graph.connect(set.layer_offset, set.mode, Pad::Aux);
            if layer.apply_mask {
                graph.connect(mask_offset, set.mode, Pad::Aux2);
            } else {
                graph.disconnect(set.mode, Pad::Aux2);
            }
        }
    } else {
        set.mask_source = None;
        set.mask_offset = None;
        graph.connect(set.layer_offset, set.mode, Pad::Aux);
        graph.disconnect(set.mode, Pad::Aux2);
    }
    layer.nodes = LayerNodes::Built(set);
}
