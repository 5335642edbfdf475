// ============================================================================
// IMAGE RESIZE: canvas size changes with layer repositioning
// ============================================================================

use crate::event::ImageEvent;
use crate::geometry::{Orientation, Rect};
use crate::history::UndoKind;
use crate::image::Image;
use crate::item::{DrawableRef, ItemId, Positioned};
use crate::layer::LayerKind;
use crate::ops;
use crate::progress::Progress;
use crate::undo::{GuidesUndo, ImageSizeUndo, SamplePointsUndo, VectorsUndo};

/// Which layers are stretched to fill the new canvas.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum LayerSet {
    /// Layers only move.
    #[default]
    None,
    All,
    /// Layers exactly as large as the old canvas.
    ImageSized,
    Visible,
}

/// Resize the canvas without touching layer sizes.
pub fn resize(image: &mut Image, new_width: i32, new_height: i32, offset_x: i32, offset_y: i32, progress: &mut dyn Progress) {
    resize_with_layers(image, new_width, new_height, offset_x, offset_y, LayerSet::None, false, progress);
}

/// Resize the canvas to `new_width × new_height`, moving all content by
/// `(offset_x, offset_y)`. Layers picked by `layer_set` are resized to the
/// new canvas; text layers only with `resize_text_layers`.
#[allow(clippy::too_many_arguments)]
pub fn resize_with_layers(
    image: &mut Image,
    new_width: i32,
    new_height: i32,
    offset_x: i32,
    offset_y: i32,
    layer_set: LayerSet,
    resize_text_layers: bool,
    progress: &mut dyn Progress,
) {
    debug_assert!(new_width > 0 && new_height > 0, "resize to an empty canvas");
    if new_width <= 0 || new_height <= 0 {
        return;
    }
    let (old_width, old_height) = (image.width, image.height);
    log::info!("resize image {}x{} -> {}x{} by ({}, {})", old_width, old_height, new_width, new_height, offset_x, offset_y);

    // Picked against the old canvas, before anything moves
    let to_resize: Vec<ItemId> = image
        .layers
        .iter()
        .filter(|l| l.kind() != LayerKind::Group)
        .filter(|l| resize_text_layers || !l.is_text_layer())
        .filter(|l| match layer_set {
            LayerSet::None => false,
            LayerSet::All => true,
            LayerSet::ImageSized => (l.width(), l.height()) == (old_width, old_height),
            LayerSet::Visible => l.is_visible(),
        })
        .map(|l| l.id())
        .collect();

    let channels: Vec<ItemId> = image.channels.iter().map(|c| c.id()).collect();
    let layers: Vec<ItemId> = image.layers.iter().map(|l| l.id()).collect();
    let total = (channels.len() + image.vectors.len() + 1 + layers.len() + to_resize.len()).max(1) as f64;
    let mut done = 0.0;

    image.history.begin_group(UndoKind::ImageResize, "Resize Image");

    let record = ImageSizeUndo::new(image);
    image.history.push(Box::new(record));
    image.width = new_width;
    image.height = new_height;

    for id in channels {
        ops::item::resize(image, DrawableRef::Channel(id), new_width, new_height, offset_x, offset_y, true);
        advance(progress, &mut done, total);
    }

    let record = VectorsUndo::new(image);
    image.history.push(Box::new(record));
    for v in &mut image.vectors {
        v.resize(new_width, new_height, offset_x, offset_y);
        advance(progress, &mut done, total);
    }

    ops::item::resize(image, DrawableRef::Selection, new_width, new_height, offset_x, offset_y, true);
    advance(progress, &mut done, total);

    for &id in &layers {
        ops::item::translate(image, DrawableRef::Layer(id), offset_x, offset_y, true);
        advance(progress, &mut done, total);
    }

    for id in to_resize {
        let Some((lx, ly)) = image.layer(id).map(|l| l.offset()) else { continue };
        ops::item::resize(image, DrawableRef::Layer(id), new_width, new_height, lx, ly, true);
        advance(progress, &mut done, total);
    }

    let record = GuidesUndo::new(image);
    image.history.push(Box::new(record));
    image.guides.retain_mut(|g| {
        g.position += match g.orientation {
            Orientation::Horizontal => offset_y,
            Orientation::Vertical => offset_x,
        };
        let limit = match g.orientation {
            Orientation::Horizontal => new_height,
            Orientation::Vertical => new_width,
        };
        (0..=limit).contains(&g.position)
    });

    let record = SamplePointsUndo::new(image);
    image.history.push(Box::new(record));
    image.sample_points.retain_mut(|p| {
        p.x += offset_x;
        p.y += offset_y;
        (0..new_width).contains(&p.x) && (0..new_height).contains(&p.y)
    });

    image.history.end_group();

    let canvas = image.bounds();
    image.events.mark_dirty(canvas);
    image.emit(ImageEvent::SizeChanged {
        offset_x,
        offset_y,
        previous_width: old_width,
        previous_height: old_height,
    });
}

fn advance(progress: &mut dyn Progress, done: &mut f64, total: f64) {
    *done += 1.0;
    progress.set_value(*done / total);
}

/// Fit the canvas to the union of all layers.
pub fn resize_to_layers(image: &mut Image, progress: &mut dyn Progress) {
    let Some(union) = image.layers.iter().map(|l| l.bounds()).reduce(|a, b| a.union(&b)) else { return };
    if union.is_empty() {
        return;
    }
    resize(image, union.width, union.height, -union.x, -union.y, progress);
}

/// Fit the canvas to the selection bounds. No-op without a selection.
pub fn resize_to_selection(image: &mut Image, progress: &mut dyn Progress) {
    let Some(Rect { x, y, width, height }) = ops::selection::bounds(image) else { return };
    resize(image, width, height, -x, -y, progress);
}
